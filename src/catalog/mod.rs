//! Material catalog module
//!
//! Maps what a scan reads onto what the plant knows about it: supplier codes
//! from DataMatrix labels onto products, and tool-tag codes from QR codes
//! onto molds. Lookups sit outside the scan pipeline; extraction never fails
//! because a code is missing here.
//!
//! # Submodules
//!
//! - `lookup` - Catalog tables, TOML loading, and lookups

pub mod lookup;

pub use lookup::{Catalog, Product, Tool};
