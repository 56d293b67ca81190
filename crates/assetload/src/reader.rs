//! Source text reading
//!
//! The source object is read as text and split into physical lines. The first
//! physical line is discarded as a header, whatever it contains. Each
//! remaining line is then parsed on its own with the fixed [`HEADER`]
//! reinserted in front of it, so column names never depend on the file.
//!
//! Because parsing happens per physical line, a quoted field cannot span
//! lines.

use crate::error::ParseError;
use crate::record::{AssetRecord, HEADER, INPUT_COLUMNS};

/// Physical lines dropped from the top of every source.
pub const SKIPPED_HEADER_LINES: usize = 1;

/// Data lines of a source, header dropped. Accepts `\n` and `\r\n` endings.
pub fn data_lines(text: &str) -> Vec<String> {
    text.lines()
        .skip(SKIPPED_HEADER_LINES)
        .map(str::to_string)
        .collect()
}

/// 1-based line number in the source file for the data line at `index`.
pub fn physical_line(index: usize) -> usize {
    index + SKIPPED_HEADER_LINES + 1
}

/// Parse one data line into records using the fixed header.
pub fn parse_line(line: &str) -> Result<Vec<AssetRecord>, ParseError> {
    let chunk = format!("{}\n{}", HEADER, line);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(chunk.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| ParseError::Malformed(e.to_string()))?
        .clone();

    let mut records = Vec::new();
    for result in reader.records() {
        let raw = result.map_err(|e| ParseError::Malformed(e.to_string()))?;

        if raw.len() > INPUT_COLUMNS.len() {
            return Err(ParseError::TooManyFields {
                expected: INPUT_COLUMNS.len(),
                found: raw.len(),
            });
        }

        let record: AssetRecord = raw
            .deserialize(Some(&headers))
            .map_err(|e| ParseError::Malformed(e.to_string()))?;
        records.push(record);
    }

    Ok(records)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_data_lines_drops_first_line_only() {
        let text = "id,type\n1,Car\n\n2,Bike\r\n3,Boat";
        assert_eq!(data_lines(text), vec!["1,Car", "", "2,Bike", "3,Boat"]);
    }

    #[test]
    fn test_data_lines_discards_any_first_line() {
        // The first line is dropped even when it is data.
        let text = "1,Car,Toyota,Corolla,2020,VIN123,REG001,20000,ACTIVE\n";
        assert!(data_lines(text).is_empty());
        assert!(data_lines("").is_empty());
    }

    #[test]
    fn test_physical_line() {
        assert_eq!(physical_line(0), 2);
        assert_eq!(physical_line(9), 11);
    }

    #[test]
    fn test_parse_line_maps_fixed_header() {
        let records = parse_line("1,Car,Toyota,Corolla,2020,VIN123,REG001,20000,ACTIVE").unwrap();
        assert_eq!(records.len(), 1);

        let record = &records[0];
        assert_eq!(record.asset_id, "1");
        assert_eq!(record.registration_no, "REG001");
        assert_eq!(record.asset_value.as_deref(), Some("20000"));
        assert_eq!(record.status, "ACTIVE");
    }

    #[test]
    fn test_parse_line_quoted_field() {
        let records =
            parse_line(r#"2,Car,"Mercedes, Benz",C200,2021,VIN2,REG2,"45,000",ACTIVE"#).unwrap();
        assert_eq!(records[0].make, "Mercedes, Benz");
        assert_eq!(records[0].asset_value.as_deref(), Some("45,000"));
    }

    #[test]
    fn test_parse_line_blank() {
        assert!(parse_line("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_line_short_row_leaves_value_missing() {
        let records = parse_line("3,Car,Honda").unwrap();
        assert_eq!(records[0].make, "Honda");
        assert_eq!(records[0].asset_value, None);
        assert_eq!(records[0].status, "");
    }

    #[test]
    fn test_parse_line_empty_value_is_missing() {
        let records = parse_line("4,Car,Kia,Rio,2017,VIN4,REG4,,ACTIVE").unwrap();
        assert_eq!(records[0].asset_value, None);
    }

    #[test]
    fn test_parse_line_rejects_extra_fields() {
        let err = parse_line("5,Car,Kia,Rio,2017,VIN5,REG5,100,ACTIVE,EXTRA").unwrap_err();
        assert_eq!(
            err,
            ParseError::TooManyFields {
                expected: 9,
                found: 10
            }
        );
    }
}
