//! Text rendering of wire values and per-type display widths.

use crate::error::{VqError, VqResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use postgres::types::{FromSql, Type};
use postgres::Row;
use std::error::Error;
use std::fmt::Write;
use tracing::debug;

const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Undecoded cell bytes. Accepts every type so a cell can always be shown.
struct RawValue<'a>(&'a [u8]);

impl<'a> FromSql<'a> for RawValue<'a> {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        Ok(RawValue(raw))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

/// Render cell `idx` of `row` as text, `None` for SQL NULL.
pub fn cell_text(row: &Row, idx: usize) -> VqResult<Option<String>> {
    let raw = row
        .try_get::<_, Option<RawValue>>(idx)
        .map_err(|e| VqError::QueryError(format!("Failed to read column {}: {}", idx + 1, e)))?;
    Ok(render_cell(row.columns()[idx].type_(), raw.map(|r| r.0)))
}

/// Render the binary wire form of a cell. Values the typed decoders reject
/// (out of range dates, unexpected payloads) still show up as raw text or hex.
pub fn render_cell(ty: &Type, raw: Option<&[u8]>) -> Option<String> {
    let raw = raw?;
    Some(typed_text(ty, raw).unwrap_or_else(|| {
        debug!("No typed rendering for a {} value of {} bytes", ty, raw.len());
        render_raw(raw)
    }))
}

fn decode<'a, T: FromSql<'a> + ToString>(ty: &Type, raw: &'a [u8]) -> Option<String> {
    T::from_sql(ty, raw).ok().map(|v| v.to_string())
}

fn typed_text(ty: &Type, raw: &[u8]) -> Option<String> {
    match *ty {
        Type::BOOL => decode::<bool>(ty, raw),
        Type::CHAR => decode::<i8>(ty, raw),
        Type::INT2 => decode::<i16>(ty, raw),
        Type::INT4 => decode::<i32>(ty, raw),
        Type::INT8 => decode::<i64>(ty, raw),
        Type::OID => decode::<u32>(ty, raw),
        Type::FLOAT4 => decode::<f32>(ty, raw),
        Type::FLOAT8 => decode::<f64>(ty, raw),
        Type::NUMERIC => render_numeric(raw),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            decode::<String>(ty, raw)
        }
        Type::DATE => match <[u8; 4]>::try_from(raw).map(i32::from_be_bytes) {
            Ok(i32::MAX) => Some("infinity".into()),
            Ok(i32::MIN) => Some("-infinity".into()),
            _ => decode::<NaiveDate>(ty, raw),
        },
        Type::TIME => decode::<NaiveTime>(ty, raw),
        Type::TIMESTAMP | Type::TIMESTAMPTZ => {
            match <[u8; 8]>::try_from(raw).map(i64::from_be_bytes) {
                Ok(i64::MAX) => Some("infinity".into()),
                Ok(i64::MIN) => Some("-infinity".into()),
                _ if *ty == Type::TIMESTAMP => decode::<NaiveDateTime>(ty, raw),
                _ => decode::<DateTime<Utc>>(ty, raw),
            }
        }
        Type::UUID => decode::<uuid::Uuid>(ty, raw),
        Type::JSON | Type::JSONB => decode::<serde_json::Value>(ty, raw),
        Type::BYTEA => Some(hex_literal(raw)),
        _ => None,
    }
}

/// Exact text of a binary NUMERIC: a header of digit count, weight, sign and
/// display scale, then base-10000 digits. `None` for a malformed payload.
pub fn render_numeric(raw: &[u8]) -> Option<String> {
    let word = |i: usize| -> Option<u16> {
        Some(u16::from_be_bytes([*raw.get(i)?, *raw.get(i + 1)?]))
    };
    let ndigits = usize::from(word(0)?);
    let weight = i32::from(word(2)? as i16);
    let sign = word(4)?;
    let dscale = usize::from(word(6)?);
    if raw.len() != 8 + 2 * ndigits {
        return None;
    }

    match sign {
        NUMERIC_NAN => return Some("NaN".into()),
        NUMERIC_PINF => return Some("Infinity".into()),
        NUMERIC_NINF => return Some("-Infinity".into()),
        NUMERIC_POS | NUMERIC_NEG => {}
        _ => return None,
    }

    let digits = (0..ndigits)
        .map(|i| word(8 + 2 * i).filter(|d| *d < 10_000))
        .collect::<Option<Vec<u16>>>()?;
    let group = |i: i32| -> u16 {
        usize::try_from(i)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };

    let mut text = String::new();
    if sign == NUMERIC_NEG {
        text.push('-');
    }
    if weight < 0 {
        text.push('0');
    } else {
        let _ = write!(text, "{}", group(0));
        for i in 1..=weight {
            let _ = write!(text, "{:04}", group(i));
        }
    }
    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut i = weight + 1;
        while fraction.len() < dscale {
            let _ = write!(fraction, "{:04}", group(i));
            i += 1;
        }
        fraction.truncate(dscale);
        text.push('.');
        text.push_str(&fraction);
    }
    Some(text)
}

fn hex_literal(bytes: &[u8]) -> String {
    format!("\\x{}", hex::encode(bytes))
}

/// Text-format payloads are shown as is, binary ones as a hex literal.
fn render_raw(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) if !s.chars().any(|c| c.is_control()) => s.to_string(),
        _ => hex_literal(bytes),
    }
}

/// Width a column of type `ty` needs to show its values without truncation.
/// Unbounded types fall back to `text_width`.
pub fn display_width(ty: &Type, text_width: usize) -> usize {
    match *ty {
        Type::CHAR => 1,
        Type::BOOL => 5,
        Type::INT2 => 6,
        Type::INT4 | Type::OID => 11,
        Type::INT8 => 20,
        Type::FLOAT4 => 15,
        Type::FLOAT8 => 24,
        Type::NUMERIC => 40,
        Type::DATE => 10,
        Type::TIME => 15,
        Type::TIMESTAMP => 26,
        Type::TIMESTAMPTZ => 30,
        Type::UUID => 36,
        _ => text_width,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Type::INT4, 11)]
    #[case(Type::INT8, 20)]
    #[case(Type::BOOL, 5)]
    #[case(Type::UUID, 36)]
    #[case(Type::VARCHAR, 32)]
    #[case(Type::TEXT, 32)]
    fn test_display_width(#[case] ty: Type, #[case] expected: usize) {
        assert_eq!(display_width(&ty, 32), expected);
    }

    #[rstest]
    fn test_timestamp_width_fits_rendering() {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_micro_opt(23, 59, 58, 123_456)
            .unwrap();
        assert_eq!(ts.to_string().chars().count(), display_width(&Type::TIMESTAMP, 0));
    }

    #[rstest]
    fn test_render_raw_text_payload() {
        assert_eq!(render_raw(b"192.168.0.1/32"), "192.168.0.1/32");
    }

    #[rstest]
    fn test_render_raw_binary_payload() {
        assert_eq!(render_raw(&[0x00, 0xff, 0x10]), "\\x00ff10");
    }

    #[rstest]
    #[case::beyond_28_digits(&[0, 1, 0, 8, 0, 0, 0, 0, 0, 1], "100000000000000000000000000000000")]
    #[case::nan(&[0, 0, 0, 0, 0xC0, 0, 0, 0], "NaN")]
    #[case::infinity(&[0, 0, 0, 0, 0xD0, 0, 0, 0], "Infinity")]
    #[case::negative_infinity(&[0, 0, 0, 0, 0xF0, 0, 0, 0], "-Infinity")]
    #[case::zero(&[0, 0, 0, 0, 0, 0, 0, 2], "0.00")]
    // -12.345: digits 12 and 3450, weight 0, scale 3
    #[case::negative_fraction(&[0, 2, 0, 0, 0x40, 0, 0, 3, 0, 12, 0x0D, 0x7A], "-12.345")]
    // 0.0005: one digit 5 at weight -1, scale 4
    #[case::small_fraction(&[0, 1, 0xFF, 0xFF, 0, 0, 0, 4, 0, 5], "0.0005")]
    // 20000.5: digits 2, 0, 5000 with weight 1
    #[case::inner_zero_group(&[0, 3, 0, 1, 0, 0, 0, 1, 0, 2, 0, 0, 0x13, 0x88], "20000.5")]
    fn test_render_numeric(#[case] raw: &[u8], #[case] expected: &str) {
        assert_eq!(render_numeric(raw).as_deref(), Some(expected));
    }

    #[rstest]
    #[case::short_header(&[0, 1, 0, 0])]
    #[case::missing_digits(&[0, 2, 0, 0, 0, 0, 0, 0, 0, 1])]
    #[case::digit_out_of_range(&[0, 1, 0, 0, 0, 0, 0, 0, 0x27, 0x10])]
    #[case::unknown_sign(&[0, 0, 0, 0, 0x12, 0x34, 0, 0])]
    fn test_render_numeric_rejects_malformed(#[case] raw: &[u8]) {
        assert_eq!(render_numeric(raw), None);
    }

    #[rstest]
    fn test_numeric_cell_keeps_all_digits() {
        let text = render_cell(&Type::NUMERIC, Some(&[0, 1, 0, 8, 0, 0, 0, 0, 0, 1])).unwrap();
        assert_eq!(text.len(), 33);
    }

    #[rstest]
    #[case::timestamp(Type::TIMESTAMP, i64::MAX.to_be_bytes().to_vec(), "infinity")]
    #[case::timestamptz(Type::TIMESTAMPTZ, i64::MIN.to_be_bytes().to_vec(), "-infinity")]
    #[case::date(Type::DATE, i32::MAX.to_be_bytes().to_vec(), "infinity")]
    #[case::date_minus(Type::DATE, i32::MIN.to_be_bytes().to_vec(), "-infinity")]
    fn test_infinite_dates(#[case] ty: Type, #[case] raw: Vec<u8>, #[case] expected: &str) {
        assert_eq!(render_cell(&ty, Some(&raw)).as_deref(), Some(expected));
    }

    #[rstest]
    fn test_undecodable_value_falls_back_to_hex() {
        assert_eq!(render_cell(&Type::INT4, Some(&[1, 2])).as_deref(), Some("\\x0102"));
    }

    #[rstest]
    fn test_typed_values() {
        assert_eq!(render_cell(&Type::INT4, Some(&42i32.to_be_bytes())).as_deref(), Some("42"));
        assert_eq!(render_cell(&Type::BOOL, Some(&[1])).as_deref(), Some("true"));
        assert_eq!(render_cell(&Type::VARCHAR, Some(b"abc")).as_deref(), Some("abc"));
        assert_eq!(render_cell(&Type::BYTEA, Some(&[0xde, 0xad])).as_deref(), Some("\\xdead"));
        assert_eq!(render_cell(&Type::INT4, None), None);
    }
}
