use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rusqlite::types::Value;
use std::str::FromStr;

/// Parse a pt-BR formatted money field ("1.234,56") into an exact 2dp amount.
/// Blank or malformed input falls back to `default` rather than erroring:
/// these values come from free-text form fields.
pub fn parse_brl(value: Option<&str>, default: Decimal) -> Decimal {
    let Some(raw) = value else {
        return default;
    };
    let cleaned = raw.trim().replace('.', "").replace(',', ".");
    if cleaned.is_empty() {
        return default;
    }
    match Decimal::from_str(&cleaned) {
        Ok(v) => quantize(v),
        Err(_) => default,
    }
}

/// Round to 2 decimal places (banker's rounding, same as the stored NUMERIC(10,2) scale).
pub fn quantize(value: Decimal) -> Decimal {
    value.round_dp(2)
}

/// Plain machine format with exactly two decimals: `150.00`.
pub fn format_plain(value: Decimal) -> String {
    format!("{:.2}", quantize(value))
}

/// pt-BR decimal separator, as used in the CSV export: `150,00`.
pub fn format_comma(value: Decimal) -> String {
    format_plain(value).replace('.', ",")
}

/// Coerce a SQLite value into a Decimal. Freshly written rows are TEXT, but
/// migrated columns may still hold INTEGER/REAL defaults.
pub fn decimal_from_sql(value: &Value) -> Decimal {
    match value {
        Value::Null => Decimal::ZERO,
        Value::Integer(i) => Decimal::from(*i),
        Value::Real(f) => quantize(Decimal::from_f64(*f).unwrap_or(Decimal::ZERO)),
        Value::Text(s) => quantize(Decimal::from_str(s).unwrap_or(Decimal::ZERO)),
        Value::Blob(_) => Decimal::ZERO,
    }
}
