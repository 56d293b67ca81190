//! Asset record shapes
//!
//! [`AssetRecord`] is one parsed input line with every value still text.
//! [`EnrichedAssetRecord`] is what reaches the table: `ASSET_VALUE` is
//! numeric and `MINIMUM_DOWN_PAYMENT` has been derived from it.

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

/// Header reinserted in front of every data line before parsing.
pub const HEADER: &str = "ASSET_ID,ASSET_TYPE,MAKE,MODEL,YEAR,VIN,REGISTRATION_NO,ASSET_VALUE,STATUS";

/// Input columns, in header order.
pub const INPUT_COLUMNS: [&str; 9] = [
    "ASSET_ID",
    "ASSET_TYPE",
    "MAKE",
    "MODEL",
    "YEAR",
    "VIN",
    "REGISTRATION_NO",
    "ASSET_VALUE",
    "STATUS",
];

pub const ASSET_VALUE: &str = "ASSET_VALUE";
pub const MINIMUM_DOWN_PAYMENT: &str = "MINIMUM_DOWN_PAYMENT";

/// Output columns, in table order.
pub const OUTPUT_COLUMNS: [&str; 10] = [
    "ASSET_ID",
    "ASSET_TYPE",
    "MAKE",
    "MODEL",
    "YEAR",
    "VIN",
    "REGISTRATION_NO",
    "ASSET_VALUE",
    "STATUS",
    "MINIMUM_DOWN_PAYMENT",
];

/// One parsed input line. Fields absent from a short line default to empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AssetRecord {
    pub asset_id: String,
    pub asset_type: String,
    pub make: String,
    pub model: String,
    pub year: String,
    pub vin: String,
    pub registration_no: String,
    pub asset_value: Option<String>,
    pub status: String,
}

/// A row ready for the sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct EnrichedAssetRecord {
    pub asset_id: String,
    pub asset_type: String,
    pub make: String,
    pub model: String,
    pub year: String,
    pub vin: String,
    pub registration_no: String,
    pub asset_value: BigDecimal,
    pub status: String,
    pub minimum_down_payment: BigDecimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_matches_columns() {
        assert_eq!(HEADER.split(',').collect::<Vec<_>>(), INPUT_COLUMNS);
    }

    #[test]
    fn test_output_columns_extend_input() {
        assert_eq!(&OUTPUT_COLUMNS[..9], &INPUT_COLUMNS[..]);
        assert_eq!(OUTPUT_COLUMNS[9], MINIMUM_DOWN_PAYMENT);
        assert!(OUTPUT_COLUMNS.contains(&ASSET_VALUE));
    }
}
