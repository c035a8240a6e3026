//! Conversion of native values to a column's relational type

use docql_ir::{DataType, DocValue};

use crate::DecodeError;

/// Convert `value` to `target`. `Null` passes through every type; `Object`
/// and `Null` targets accept anything.
pub fn coerce(value: DocValue, target: DataType, column: &str) -> Result<DocValue, DecodeError> {
    if value.is_null() {
        return Ok(value);
    }
    let converted = match (target, &value) {
        (DataType::Object | DataType::Null, _) => Some(value.clone()),

        (DataType::String, DocValue::Text(_)) => Some(value.clone()),
        (DataType::String, DocValue::Bool(b)) => Some(DocValue::Text(b.to_string())),
        (DataType::String, DocValue::Int64(i)) => Some(DocValue::Text(i.to_string())),
        (DataType::String, DocValue::Float64(f)) => Some(DocValue::Text(f.to_string())),
        (DataType::String, DocValue::BigInt(s) | DocValue::BigDecimal(s)) => {
            Some(DocValue::Text(s.clone()))
        }

        (DataType::Boolean, DocValue::Bool(_)) => Some(value.clone()),
        (DataType::Boolean, DocValue::Text(s)) => match s.to_ascii_lowercase().as_str() {
            "true" => Some(DocValue::Bool(true)),
            "false" => Some(DocValue::Bool(false)),
            _ => None,
        },

        (DataType::Integer, _) => integral(&value)
            .filter(|i| i32::try_from(*i).is_ok())
            .map(DocValue::Int64),
        (DataType::Long, _) => integral(&value).map(DocValue::Int64),

        (DataType::Double, DocValue::Float64(_)) => Some(value.clone()),
        (DataType::Double, DocValue::Int64(i)) => Some(DocValue::Float64(*i as f64)),
        (DataType::Double, DocValue::BigInt(s) | DocValue::BigDecimal(s) | DocValue::Text(s)) => {
            s.trim().parse::<f64>().ok().map(DocValue::Float64)
        }

        (DataType::BigInteger, DocValue::BigInt(_)) => Some(value.clone()),
        (DataType::BigInteger, DocValue::Int64(i)) => Some(DocValue::BigInt(i.to_string())),
        (DataType::BigInteger, DocValue::Float64(f)) if f.fract() == 0.0 && f.is_finite() => {
            Some(DocValue::BigInt(format!("{:.0}", f)))
        }
        (DataType::BigInteger, DocValue::Text(s)) => {
            let t = s.trim();
            let digits = t.strip_prefix('-').unwrap_or(t);
            (!digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
                .then(|| DocValue::BigInt(t.to_string()))
        }

        (DataType::BigDecimal, DocValue::BigDecimal(_)) => Some(value.clone()),
        (DataType::BigDecimal, DocValue::Int64(i)) => Some(DocValue::BigDecimal(i.to_string())),
        (DataType::BigDecimal, DocValue::Float64(f)) if f.is_finite() => {
            Some(DocValue::BigDecimal(f.to_string()))
        }
        (DataType::BigDecimal, DocValue::BigInt(s)) => Some(DocValue::BigDecimal(s.clone())),
        (DataType::BigDecimal, DocValue::Text(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .map(|_| DocValue::BigDecimal(s.trim().to_string())),

        _ => None,
    };

    converted.ok_or_else(|| DecodeError::TypeMismatch {
        column: column.to_string(),
        value: value.to_string(),
        target: target.to_string(),
    })
}

// Whole-number view of a numeric or numeric-text value.
fn integral(value: &DocValue) -> Option<i64> {
    match value {
        DocValue::Int64(i) => Some(*i),
        DocValue::Float64(f) if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64 => {
            Some(*f as i64)
        }
        DocValue::Text(s) | DocValue::BigInt(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}
