//! CLI output utilities
//!
//! Human-readable and JSON rendering of scan results, plus the writer used
//! to tee log output into a file.

use std::io::Write;

use serde::Serialize;

use crate::catalog::{Catalog, Product, Tool};
use crate::core::extractor::ParsedIdentifier;
use crate::device::CaptureDevice;

/// What a finished scan produced, with its catalog match
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanReport {
    /// Supplier label
    Label {
        identifier: ParsedIdentifier,
        complete: bool,
        product: Option<Product>,
    },
    /// Tool tag
    Tool { code: String, tool: Option<Tool> },
}

impl ScanReport {
    pub fn label(identifier: ParsedIdentifier, catalog: &Catalog) -> Self {
        let product = catalog.product_for(&identifier).cloned();
        Self::Label {
            complete: identifier.is_complete(),
            identifier,
            product,
        }
    }

    pub fn tool(code: String, catalog: &Catalog) -> Self {
        let tool = catalog.tool_for(&code).cloned();
        Self::Tool { code, tool }
    }

    /// Plain-text lines for the terminal
    pub fn lines(&self) -> Vec<String> {
        match self {
            ScanReport::Label {
                identifier,
                complete,
                product,
            } => {
                let mut lines = vec![
                    format!("Supplier code: {}", identifier.supplier_code),
                    format!("Lot:           {}", identifier.lot_formatted),
                    format!("Lot (raw):     {}", identifier.lot_raw),
                ];
                if !complete {
                    lines.push("Warning: label is shorter than expected; fields may be partial".to_string());
                }
                match product {
                    Some(product) => {
                        lines.push(format!("Product:       {}", product.description));
                        lines.push(format!("SAP code:      {}", product.sap));
                    }
                    None => lines.push("Product:       (not in catalog)".to_string()),
                }
                lines
            }
            ScanReport::Tool { code, tool } => vec![
                format!("Tool code:     {}", code),
                match tool {
                    Some(tool) => format!("Mold:          {}", tool.name),
                    None => "Mold:          (not in catalog)".to_string(),
                },
            ],
        }
    }

    /// Print to stdout, as JSON or plain text
    pub fn print(&self, json: bool) -> serde_json::Result<()> {
        if json {
            println!("{}", serde_json::to_string_pretty(self)?);
        } else {
            for line in self.lines() {
                println!("{}", line);
            }
        }
        Ok(())
    }
}

/// One line per device, marking the one a scan would bind
pub fn device_lines(devices: &[CaptureDevice], selected: Option<&CaptureDevice>) -> Vec<String> {
    devices
        .iter()
        .enumerate()
        .map(|(i, device)| {
            let marker = if Some(device) == selected { "  <- scans bind this device" } else { "" };
            format!("[{}] {}{}", i + 1, device, marker)
        })
        .collect()
}

/// A writer that writes to both console (stderr) and a file
pub struct DualWriter {
    pub console: std::io::Stderr,
    pub file: std::fs::File,
}

impl Write for DualWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        // Write to console
        let _ = self.console.write(buf);
        // Write to file
        self.file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let _ = self.console.flush();
        self.file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::extractor::extract;

    const LABEL: &str = "010789123456788214640030101234567ABCDEFGH123";

    #[test]
    fn test_label_report_with_product() {
        let report = ScanReport::label(extract(LABEL), &Catalog::sample());
        let lines = report.lines();

        assert_eq!(lines[0], "Supplier code: 821464003");
        assert_eq!(lines[1], "Lot:           1234567.ABCDEFGH.123");
        assert!(lines.contains(&"Product:       Carpete 598".to_string()));
        assert!(lines.contains(&"SAP code:      311010016.00".to_string()));
    }

    #[test]
    fn test_short_label_report_warns() {
        let report = ScanReport::label(extract("0107891234"), &Catalog::sample());
        let lines = report.lines();

        assert!(lines.iter().any(|l| l.starts_with("Warning:")));
        assert_eq!(lines.last().unwrap(), "Product:       (not in catalog)");
    }

    #[test]
    fn test_tool_report() {
        let catalog = Catalog::sample();
        assert_eq!(
            ScanReport::tool("001".to_string(), &catalog).lines()[1],
            "Mold:          Mold. Carpete 598"
        );
        assert_eq!(
            ScanReport::tool("002".to_string(), &catalog).lines()[1],
            "Mold:          (not in catalog)"
        );
    }

    #[test]
    fn test_json_shape() {
        let report = ScanReport::label(extract(LABEL), &Catalog::sample());
        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(value["kind"], "label");
        assert_eq!(value["identifier"]["supplier_code"], "821464003");
        assert_eq!(value["complete"], true);
        assert_eq!(value["product"]["sap"], "311010016.00");

        let value = serde_json::to_value(ScanReport::tool("9".to_string(), &Catalog::sample())).unwrap();
        assert_eq!(value["kind"], "tool");
        assert!(value["tool"].is_null());
    }

    #[test]
    fn test_device_lines_mark_selection() {
        let devices = vec![
            CaptureDevice::new("front", "Front Camera"),
            CaptureDevice::new("back", "Back Camera"),
        ];
        let lines = device_lines(&devices, devices.last());

        assert_eq!(lines[0], "[1] Front Camera (front)");
        assert_eq!(lines[1], "[2] Back Camera (back)  <- scans bind this device");
    }
}
