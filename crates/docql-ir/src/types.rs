//! Type system for relational columns inferred from documents

use serde::{Deserialize, Serialize};
use std::fmt;

/// Column data type.
///
/// `Object` is the opaque supertype: any value fits, and a column that
/// reaches it never goes back to a scalar type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    // Special
    Null,

    // Primitives
    String,
    Boolean,
    Integer,
    Long,
    Double,
    BigInteger,
    BigDecimal,

    // Opaque
    Object,
}

impl DataType {
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Null => "null",
            DataType::String => "string",
            DataType::Boolean => "boolean",
            DataType::Integer => "integer",
            DataType::Long => "long",
            DataType::Double => "double",
            DataType::BigInteger => "biginteger",
            DataType::BigDecimal => "bigdecimal",
            DataType::Object => "object",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DataType::Integer
                | DataType::Long
                | DataType::Double
                | DataType::BigInteger
                | DataType::BigDecimal
        )
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
