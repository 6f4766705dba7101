//! Field extraction from decoded label text
//!
//! Supplier labels carry a GS1-style DataMatrix payload with the supplier code
//! and the lot number at fixed character positions:
//!
//! ```text
//! 0         1         2         3         4
//! 01234567890123456789012345678901234567890123
//!               [supplier]   [      lot       ]
//!               14      23   26              44
//! ```
//!
//! Extraction is total: input that is too short yields shorter (possibly
//! empty) fields instead of an error. Callers treat an incomplete supplier code
//! as "no match".

use serde::{Deserialize, Serialize};

/// Start of the supplier code (inclusive)
pub const SUPPLIER_START: usize = 14;
/// End of the supplier code (exclusive)
pub const SUPPLIER_END: usize = 23;
/// Start of the lot number (inclusive)
pub const LOT_START: usize = 26;
/// End of the lot number (exclusive)
pub const LOT_END: usize = 44;

/// Group widths of a formatted lot number; the last group takes the rest
const LOT_GROUPS: [usize; 2] = [7, 8];

/// Identifiers sliced out of a supplier label
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParsedIdentifier {
    /// Supplier code, 9 characters on a well-formed label
    pub supplier_code: String,
    /// Lot number as printed in the payload, 18 characters on a well-formed label
    pub lot_raw: String,
    /// Lot number with `.` group separators
    pub lot_formatted: String,
}

impl ParsedIdentifier {
    /// Whether both fields have their full width
    pub fn is_complete(&self) -> bool {
        self.has_full_supplier() && self.lot_raw.chars().count() == LOT_END - LOT_START
    }

    /// Whether the supplier code has its full width; a shorter one never matches
    pub fn has_full_supplier(&self) -> bool {
        self.supplier_code.chars().count() == SUPPLIER_END - SUPPLIER_START
    }
}

/// Slice the supplier code and lot number out of decoded label text
pub fn extract(text: &str) -> ParsedIdentifier {
    let supplier_code = slice_chars(text, SUPPLIER_START, SUPPLIER_END);
    let lot_raw = slice_chars(text, LOT_START, LOT_END);
    let lot_formatted = format_lot(&lot_raw);

    ParsedIdentifier {
        supplier_code,
        lot_raw,
        lot_formatted,
    }
}

/// Insert group separators into a lot number: 7 chars, 8 chars, the rest
///
/// An empty lot stays empty. Any other lot gets both separators, even when
/// the later groups are empty.
pub fn format_lot(lot: &str) -> String {
    if lot.is_empty() {
        return String::new();
    }

    let mut groups = Vec::with_capacity(LOT_GROUPS.len() + 1);
    let mut start = 0;
    for width in LOT_GROUPS {
        groups.push(slice_chars(lot, start, start + width));
        start += width;
    }
    groups.push(lot.chars().skip(start).collect());

    groups.join(".")
}

/// Character-based `text[start..end]`, clamped to the input length
fn slice_chars(text: &str, start: usize, end: usize) -> String {
    text.chars().skip(start).take(end.saturating_sub(start)).collect()
}

/// Tool tags use the whole decoded text, unmodified, as their key
pub fn extract_tool_code(text: &str) -> String {
    text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 14 chars of prefix, supplier, 3 chars of gap, lot
    const LABEL: &str = "010789123456788214640030101234567ABCDEFGH123";

    #[test]
    fn test_extract_well_formed_label() {
        let label = format!("{}X", LABEL);
        let id = extract(&label);

        assert_eq!(id.supplier_code, "821464003");
        assert_eq!(id.lot_raw, "1234567ABCDEFGH123");
        assert_eq!(id.lot_formatted, "1234567.ABCDEFGH.123");
        assert!(id.is_complete());
    }

    #[test]
    fn test_extract_uses_offsets_verbatim() {
        let id = extract("0000000000000821464003000000000001234567ABCDEFGHI123");

        assert_eq!(id.supplier_code, "214640030");
        assert_eq!(id.lot_raw, "00000001234567ABCD");
        assert_eq!(id.lot_formatted, "0000000.1234567A.BCD");
    }

    #[test]
    fn test_extract_matches_slices_for_long_inputs() {
        let inputs = [
            "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz",
            "00000000000000000000000000000000000000000000",
            "(01)09876543210(17)250101(10)LOT-0001-XYZ-ABCDEF",
        ];

        for input in inputs {
            assert!(input.len() >= LOT_END);
            let id = extract(input);
            assert_eq!(id.supplier_code, &input[14..23], "Failed for: {}", input);
            assert_eq!(id.lot_raw, &input[26..44], "Failed for: {}", input);
        }
    }

    #[test]
    fn test_extract_short_input_is_lenient() {
        let id = extract("");
        assert_eq!(id.supplier_code, "");
        assert_eq!(id.lot_raw, "");
        assert_eq!(id.lot_formatted, "");
        assert!(!id.is_complete());

        let id = extract("0123456789ABCDEFG");
        assert_eq!(id.supplier_code, "EFG");
        assert_eq!(id.lot_raw, "");
        assert_eq!(id.lot_formatted, "");
        assert!(!id.has_full_supplier());

        let id = extract("0123456789ABCDEFGHIJKLMNOPQR");
        assert_eq!(id.supplier_code, "EFGHIJKLM");
        assert_eq!(id.lot_raw, "QR");
        assert_eq!(id.lot_formatted, "QR..");
        assert!(id.has_full_supplier());
        assert!(!id.is_complete());
    }

    #[test]
    fn test_extract_multibyte_text_does_not_panic() {
        let text = "ÄÖÜäöüßÄÖÜäöüß821464003çç€1234567ABCDEFGH123";
        let id = extract(text);
        assert_eq!(id.supplier_code, "821464003");
        assert_eq!(id.lot_raw, "1234567ABCDEFGH123");
    }

    #[test]
    fn test_format_lot() {
        assert_eq!(format_lot(""), "");
        assert_eq!(format_lot("1234567ABCDEFGH123"), "1234567.ABCDEFGH.123");
        assert_eq!(format_lot("1234567"), "1234567..");
        assert_eq!(format_lot("1234567ABCDEFGH"), "1234567.ABCDEFGH.");
        assert_eq!(format_lot("12"), "12..");
    }

    #[test]
    fn test_format_lot_eighteen_chars_partitions_7_8_3() {
        let lots = ["AAAAAAABBBBBBBBCCC", "000000000000000000", "abcdefghijklmnopqr"];

        for lot in lots {
            let formatted = format_lot(lot);
            let groups: Vec<&str> = formatted.split('.').collect();
            assert_eq!(groups.len(), 3, "Failed for: {}", lot);
            assert_eq!(groups[0].len(), 7);
            assert_eq!(groups[1].len(), 8);
            assert_eq!(groups[2].len(), 3);
        }
    }

    #[test]
    fn test_extract_tool_code() {
        assert_eq!(extract_tool_code("001"), "001");
        assert_eq!(extract_tool_code(" 001"), " 001");
    }
}
