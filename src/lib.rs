//! Material Scan Library
//!
//! Reads supplier labels (GS1 DataMatrix) and tool tags (QR) from a camera
//! feed, extracts the supplier code and lot number from label text, and maps
//! both onto the plant's material catalog.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - [`core`] - Scan sessions, the per-frame classifier, field extraction,
//!   configuration, and error handling
//! - [`device`] - Capture backend abstraction, device selection, and the
//!   replay backend
//! - [`catalog`] - Product and mold lookup tables
//! - [`cli`] - Command-line interface (only used by the binary)
//! - [`testdb`] - Mock camera and scan scenarios for testing without hardware
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use material_scan::catalog::Catalog;
//! use material_scan::core::scanner::Scanner;
//! use material_scan::device::{parse_script, CaptureDevice, ReplayBackend, Symbology};
//! use std::sync::{mpsc, Arc};
//!
//! fn main() -> anyhow::Result<()> {
//!     let script = parse_script("miss\ndatamatrix 010789123456788214640030101234567ABCDEFGH123")?;
//!     let backend = ReplayBackend::new(vec![CaptureDevice::new("cam0", "USB Camera")], script);
//!     let scanner = Scanner::new(Arc::new(backend));
//!
//!     let (tx, rx) = mpsc::channel();
//!     let _handle = scanner.scan(Symbology::DataMatrix, move |outcome| {
//!         let _ = tx.send(outcome);
//!     });
//!
//!     let id = rx.recv()??;
//!     println!("supplier {} lot {}", id.supplier_code, id.lot_formatted);
//!     if let Some(product) = Catalog::sample().product_for(&id) {
//!         println!("{} (SAP {})", product.description, product.sap);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Testing Without a Camera
//!
//! ```rust,no_run
//! use material_scan::testdb::ScenarioRunner;
//!
//! let summary = ScenarioRunner::new().run_all();
//! println!("Passed: {}/{}", summary.passed, summary.total);
//! ```

pub mod catalog;
pub mod cli;
pub mod core;
pub mod device;
pub mod testdb;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
