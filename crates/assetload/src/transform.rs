//! Row transformer
//!
//! Converts `ASSET_VALUE` from text to an exact decimal and derives
//! `MINIMUM_DOWN_PAYMENT = round(ASSET_VALUE * 0.10, 2)`.
//!
//! Arithmetic is exact decimal, never binary floating point, and rounding is
//! round-half-to-even at two decimal places: `1234.565` becomes `1234.56`,
//! `1234.575` becomes `1234.58`.

use bigdecimal::{BigDecimal, RoundingMode};
use std::str::FromStr;

use crate::error::ParseError;
use crate::reader;
use crate::record::{AssetRecord, EnrichedAssetRecord, ASSET_VALUE};

/// Decimal places kept on money columns.
pub const MONEY_SCALE: i64 = 2;

/// Rounding applied when cutting to [`MONEY_SCALE`].
pub const MONEY_ROUNDING: RoundingMode = RoundingMode::HalfEven;

/// Most digits a warehouse `numeric` holds before the decimal point.
pub const MAX_INTEGER_DIGITS: i64 = 131_072;

/// Most digits a warehouse `numeric` holds after the decimal point.
pub const MAX_FRACTION_DIGITS: i64 = 16_383;

/// Fraction of the asset value required up front: `0.10`.
pub fn down_payment_rate() -> BigDecimal {
    BigDecimal::new(10.into(), 2)
}

/// Parse the raw `ASSET_VALUE` text. Surrounding whitespace is ignored.
///
/// Exponent notation is accepted, but the value must fit a warehouse
/// `numeric` column. The range is checked on the parsed digits and exponent
/// before any arithmetic, since `1e20000000` is ten bytes of text and twenty
/// million digits once expanded.
pub fn parse_asset_value(raw: Option<&str>) -> Result<BigDecimal, ParseError> {
    let text = raw
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(ParseError::MissingField(ASSET_VALUE))?;

    let invalid = || ParseError::InvalidNumber {
        field: ASSET_VALUE,
        value: text.to_string(),
    };

    let value = BigDecimal::from_str(text).map_err(|_| invalid())?;

    let (_, scale) = value.as_bigint_and_exponent();
    let integer_digits = i64::try_from(value.digits())
        .unwrap_or(i64::MAX)
        .saturating_sub(scale);
    if scale > MAX_FRACTION_DIGITS || integer_digits > MAX_INTEGER_DIGITS {
        return Err(invalid());
    }

    Ok(value)
}

pub fn minimum_down_payment(asset_value: &BigDecimal) -> BigDecimal {
    (asset_value * &down_payment_rate()).with_scale_round(MONEY_SCALE, MONEY_ROUNDING)
}

/// Turn one parsed record into a table row.
pub fn enrich(record: AssetRecord) -> Result<EnrichedAssetRecord, ParseError> {
    let asset_value = parse_asset_value(record.asset_value.as_deref())?;
    let minimum_down_payment = minimum_down_payment(&asset_value);

    Ok(EnrichedAssetRecord {
        asset_id: record.asset_id,
        asset_type: record.asset_type,
        make: record.make,
        model: record.model,
        year: record.year,
        vin: record.vin,
        registration_no: record.registration_no,
        asset_value,
        status: record.status,
        minimum_down_payment,
    })
}

/// Parse one data line (header reinserted) and enrich every record on it.
///
/// This is the per-element stage handed to the execution engine. A blank line
/// yields no rows.
pub fn enrich_line(line: &str) -> Result<Vec<EnrichedAssetRecord>, ParseError> {
    reader::parse_line(line)?.into_iter().map(enrich).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn record_with_value(value: Option<&str>) -> AssetRecord {
        AssetRecord {
            asset_id: "1".to_string(),
            asset_type: "Car".to_string(),
            make: "Toyota".to_string(),
            model: "Corolla".to_string(),
            year: "2020".to_string(),
            vin: "VIN123".to_string(),
            registration_no: "REG001".to_string(),
            asset_value: value.map(str::to_string),
            status: "ACTIVE".to_string(),
        }
    }

    #[test]
    fn test_enrich_whole_value() {
        let row = enrich(record_with_value(Some("20000"))).unwrap();
        assert_eq!(row.asset_value, dec("20000.0"));
        assert_eq!(row.minimum_down_payment, dec("2000.0"));
        assert_eq!(row.minimum_down_payment.to_string(), "2000.00");
        assert_eq!(row.asset_id, "1");
        assert_eq!(row.status, "ACTIVE");
    }

    #[test]
    fn test_enrich_rounds_up_past_boundary() {
        let row = enrich(record_with_value(Some("99.99"))).unwrap();
        assert_eq!(row.minimum_down_payment, dec("10.0"));
    }

    #[test]
    fn test_rounding_is_half_to_even() {
        // 0.025 sits exactly on the midpoint; half-up would give 0.03.
        assert_eq!(minimum_down_payment(&dec("0.25")), dec("0.02"));
        assert_eq!(minimum_down_payment(&dec("0.35")), dec("0.04"));
        assert_eq!(minimum_down_payment(&dec("12345.65")), dec("1234.56"));
        assert_eq!(minimum_down_payment(&dec("12345.75")), dec("1234.58"));
        assert_eq!(minimum_down_payment(&dec("-0.25")), dec("-0.02"));
    }

    #[test]
    fn test_rounding_off_midpoint() {
        assert_eq!(minimum_down_payment(&dec("0.26")), dec("0.03"));
        assert_eq!(minimum_down_payment(&dec("0.24")), dec("0.02"));
        assert_eq!(minimum_down_payment(&dec("1e3")), dec("100"));
    }

    #[test]
    fn test_result_has_money_scale() {
        for value in ["1", "0.001", "123456789.123456789"] {
            let payment = minimum_down_payment(&dec(value));
            assert_eq!(payment.as_bigint_and_exponent().1, MONEY_SCALE);
        }
    }

    #[test]
    fn test_parse_asset_value_trims() {
        assert_eq!(parse_asset_value(Some(" 42.5 ")).unwrap(), dec("42.5"));
    }

    #[test]
    fn test_missing_asset_value() {
        assert_eq!(
            enrich(record_with_value(None)).unwrap_err(),
            ParseError::MissingField(ASSET_VALUE)
        );
        assert_eq!(
            enrich(record_with_value(Some("   "))).unwrap_err(),
            ParseError::MissingField(ASSET_VALUE)
        );
    }

    #[test]
    fn test_non_numeric_asset_value() {
        for bad in ["N/A", "12,000", "nan", "inf", "$100"] {
            match enrich(record_with_value(Some(bad))) {
                Err(ParseError::InvalidNumber { field, value }) => {
                    assert_eq!(field, ASSET_VALUE);
                    assert_eq!(value, bad);
                },
                other => panic!("{bad:?} should be rejected, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_out_of_range_exponent_rejected() {
        for huge in ["1e20000000", "1e-20000000", "1e131072", "1e-16384"] {
            match parse_asset_value(Some(huge)) {
                Err(ParseError::InvalidNumber { value, .. }) => assert_eq!(value, huge),
                other => panic!("{huge:?} should be rejected, got {other:?}"),
            }
        }

        let started = std::time::Instant::now();
        assert!(enrich_line("1,Car,T,C,2020,V,R,1e20000000,ACTIVE").is_err());
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
    }

    #[test]
    fn test_exponent_within_range_accepted() {
        assert_eq!(parse_asset_value(Some("2e4")).unwrap(), dec("20000"));
        assert_eq!(minimum_down_payment(&parse_asset_value(Some("2e4")).unwrap()), dec("2000"));
        assert!(parse_asset_value(Some("1e131071")).is_ok());
        assert!(parse_asset_value(Some("1e-16383")).is_ok());
        assert_eq!(minimum_down_payment(&dec("1e-16383")), dec("0"));
    }

    #[test]
    fn test_enrich_is_pure() {
        let record = record_with_value(Some("1234.56"));
        let first = enrich(record.clone()).unwrap();
        let second = enrich(record).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.minimum_down_payment, dec("123.46"));
    }

    #[test]
    fn test_enrich_line() {
        let rows = enrich_line("7,Truck,Volvo,FH16,2019,VIN777,REG777,150000.50,INACTIVE").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].asset_type, "Truck");
        assert_eq!(rows[0].minimum_down_payment, dec("15000.05"));

        assert!(enrich_line("").unwrap().is_empty());
        assert!(enrich_line("8,Van,Ford,Transit,2018,VIN8,REG8,N/A,ACTIVE").is_err());
    }
}
