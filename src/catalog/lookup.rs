//! Product and mold lookup tables
//!
//! Catalog files are TOML, keyed by the code as it appears on the label:
//!
//! ```toml
//! [products.821464003]
//! description = "Carpete 598"
//! sap = "311010016.00"
//!
//! [tools."001"]
//! name = "Mold. Carpete 598"
//! ```
//!
//! Tool keys are quoted because the code is matched as text, leading zeros
//! included.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::core::error::{Result, ScanError};
use crate::core::extractor::ParsedIdentifier;

/// A raw material known by its supplier code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Human-readable product description
    pub description: String,
    /// Internal SAP material number
    pub sap: String,
}

/// A molding tool known by the code on its tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
}

/// Supplier-code and tool-code tables
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Catalog {
    pub products: BTreeMap<String, Product>,
    pub tools: BTreeMap<String, Tool>,
}

impl Catalog {
    /// Catalog shipped with the binary, used when no catalog file is configured
    pub fn sample() -> Self {
        let mut catalog = Self::default();
        catalog.products.insert(
            "821464003".to_string(),
            Product {
                description: "Carpete 598".to_string(),
                sap: "311010016.00".to_string(),
            },
        );
        catalog.products.insert(
            "741102005".to_string(),
            Product {
                description: "Carpete 226".to_string(),
                sap: "601020011.00".to_string(),
            },
        );
        catalog.tools.insert(
            "001".to_string(),
            Tool {
                name: "Mold. Carpete 598".to_string(),
            },
        );
        catalog
    }

    /// Parse a catalog from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ScanError::CatalogError(e.to_string()))
    }

    /// Load a catalog file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ScanError::CatalogError(format!("failed to read '{}': {}", path.display(), e))
        })?;

        let catalog = Self::from_toml(&content)?;
        debug!(
            "Loaded catalog from {}: {} products, {} tools",
            path.display(),
            catalog.products.len(),
            catalog.tools.len()
        );
        Ok(catalog)
    }

    /// Load the configured catalog, or the sample one when none is configured
    pub fn load_or_sample(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::sample()),
        }
    }

    /// Product for a scanned label.
    ///
    /// Labels too short to carry a full supplier code never match, even if a
    /// truncated code happens to be a catalog key. The lot plays no part.
    pub fn product_for(&self, identifier: &ParsedIdentifier) -> Option<&Product> {
        if !identifier.has_full_supplier() {
            return None;
        }
        self.products.get(&identifier.supplier_code)
    }

    /// Tool for the full text of a tool tag
    pub fn tool_for(&self, code: &str) -> Option<&Tool> {
        self.tools.get(code)
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty() && self.tools.is_empty()
    }
}
