//! Type inference for sampled document values

use docql_ir::{DataType, DocValue};

/// Relational type of a single document value
pub fn infer_type(value: &DocValue) -> DataType {
    match value {
        DocValue::Null => DataType::Null,
        DocValue::Bool(_) => DataType::Boolean,
        DocValue::Int64(i) if i32::try_from(*i).is_ok() => DataType::Integer,
        DocValue::Int64(_) => DataType::Long,
        DocValue::Float64(_) => DataType::Double,
        DocValue::BigInt(_) => DataType::BigInteger,
        DocValue::BigDecimal(_) => DataType::BigDecimal,
        DocValue::Text(_) => DataType::String,
        DocValue::Object(_) | DocValue::Array(_) => DataType::Object,
    }
}

/// Combine a column's current type with a newly observed one.
///
/// Null observations carry no information. Any other disagreement lands on
/// `Object`, which absorbs everything after it.
pub fn widen(current: DataType, observed: DataType) -> DataType {
    match (current, observed) {
        (current, DataType::Null) => current,
        (DataType::Null, observed) => observed,
        (current, observed) if current == observed => current,
        _ => DataType::Object,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docql_ir::DocObject;

    #[test]
    fn test_integer_width() {
        assert_eq!(infer_type(&DocValue::Int64(89123)), DataType::Integer);
        assert_eq!(infer_type(&DocValue::Int64(i64::from(i32::MAX) + 1)), DataType::Long);
        assert_eq!(infer_type(&DocValue::Int64(i64::from(i32::MIN))), DataType::Integer);
    }

    #[test]
    fn test_arbitrary_precision_numbers() {
        let doc: DocValue = serde_json::from_str(
            r#"{"Big": 123456789012345678901234567890, "Dec": 3.141592653589793238462643383279, "Price": 9.99}"#,
        )
        .unwrap();
        let obj = doc.as_object().unwrap();
        assert_eq!(infer_type(obj.get("Big").unwrap()), DataType::BigInteger);
        assert_eq!(infer_type(obj.get("Dec").unwrap()), DataType::BigDecimal);
        assert_eq!(infer_type(obj.get("Price").unwrap()), DataType::Double);
    }

    #[test]
    fn test_structured_values_are_opaque() {
        assert_eq!(infer_type(&DocValue::Object(DocObject::new())), DataType::Object);
        assert_eq!(infer_type(&DocValue::Array(vec![])), DataType::Object);
    }

    #[test]
    fn test_widen_rules() {
        assert_eq!(widen(DataType::Integer, DataType::Integer), DataType::Integer);
        assert_eq!(widen(DataType::Integer, DataType::Null), DataType::Integer);
        assert_eq!(widen(DataType::Null, DataType::String), DataType::String);
        assert_eq!(widen(DataType::Integer, DataType::String), DataType::Object);
        assert_eq!(widen(DataType::Integer, DataType::Long), DataType::Object);
    }

    #[test]
    fn test_widen_is_monotonic() {
        let all = [
            DataType::Null,
            DataType::String,
            DataType::Boolean,
            DataType::Integer,
            DataType::Long,
            DataType::Double,
            DataType::BigInteger,
            DataType::BigDecimal,
            DataType::Object,
        ];
        for observed in all {
            assert_eq!(widen(DataType::Object, observed), DataType::Object);
        }
    }
}
