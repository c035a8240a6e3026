//! Function registry
//!
//! Maps relational scalar function names to their native renderings. The
//! compiler consults the registry for every function call; names with no
//! entry pass through unchanged.

use docql_ir::DataType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Unsupported conversion target: {0}")]
    UnsupportedConversion(String),

    #[error("Arity mismatch for function {func}: expected {expected}, got {actual}")]
    ArityMismatch {
        func: String,
        expected: String,
        actual: usize,
    },
}

/// How a relational function is rendered natively
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rewrite {
    /// `NATIVE(args)`
    Rename { native: String },
    /// Arguments joined by an infix operator, e.g. `a || b`
    Infix { operator: String },
    /// `NATIVE(args)` with the second argument shifted from 1-based to 0-based
    ZeroBasedStart { native: String },
    /// Fixed native text, no arguments
    Constant { text: String },
    /// `DATE_PART_STR(arg, 'part')`
    DatePart { part: String },
    /// Target picked from the literal type name in the second argument
    Convert,
    /// `META(`keyspace`).id` from a literal keyspace name
    MetaId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionRewrite {
    pub name: String,
    pub rewrite: Rewrite,
    pub min_args: usize,
    /// `None` means variadic
    pub max_args: Option<usize>,
}

impl FunctionRewrite {
    pub fn check_arity(&self, actual: usize) -> Result<(), RegistryError> {
        let too_many = self.max_args.is_some_and(|max| actual > max);
        if actual < self.min_args || too_many {
            let expected = match self.max_args {
                Some(max) if max == self.min_args => max.to_string(),
                Some(max) => format!("{}..={}", self.min_args, max),
                None => format!("at least {}", self.min_args),
            };
            return Err(RegistryError::ArityMismatch {
                func: self.name.clone(),
                expected,
                actual,
            });
        }
        Ok(())
    }
}

pub struct FunctionRegistry {
    functions: HashMap<String, FunctionRewrite>,
    version: String,
}

impl FunctionRegistry {
    pub fn new(version: impl Into<String>) -> Self {
        let mut registry = Self {
            functions: HashMap::new(),
            version: version.into(),
        };
        registry.register_builtins();
        registry
    }

    fn register_builtins(&mut self) {
        // Straight renames
        for (name, native, min, max) in [
            ("lcase", "LOWER", 1, Some(1)),
            ("ucase", "UPPER", 1, Some(1)),
            ("ceiling", "CEIL", 1, Some(1)),
            ("log", "LN", 1, Some(1)),
            ("log10", "LOG", 1, Some(1)),
            ("rand", "RANDOM", 0, Some(1)),
            ("translate", "REPLACE", 3, Some(3)),
            ("locate", "POSITION", 2, Some(2)),
        ] {
            self.register(name, Rewrite::Rename { native: native.to_string() }, min, max);
        }

        self.register(
            "substring",
            Rewrite::ZeroBasedStart { native: "SUBSTR".to_string() },
            2,
            Some(3),
        );
        self.register("concat", Rewrite::Infix { operator: "||".to_string() }, 2, None);

        // Current date/time
        self.register(
            "curdate",
            Rewrite::Constant { text: "CLOCK_STR('2006-01-02')".to_string() },
            0,
            Some(0),
        );
        self.register("now", Rewrite::Constant { text: "NOW_STR()".to_string() }, 0, Some(0));

        // Date parts
        for (name, part) in [
            ("year", "year"),
            ("month", "month"),
            ("dayofmonth", "day"),
            ("hour", "hour"),
            ("minute", "minute"),
            ("second", "second"),
        ] {
            self.register(name, Rewrite::DatePart { part: part.to_string() }, 1, Some(1));
        }

        self.register("convert", Rewrite::Convert, 2, Some(2));
        self.register("cast", Rewrite::Convert, 2, Some(2));
        self.register("metaid", Rewrite::MetaId, 1, Some(1));
    }

    /// Register a rewrite; names are matched case-insensitively
    pub fn register(&mut self, name: &str, rewrite: Rewrite, min_args: usize, max_args: Option<usize>) {
        let key = name.to_ascii_lowercase();
        self.functions.insert(
            key.clone(),
            FunctionRewrite {
                name: key,
                rewrite,
                min_args,
                max_args,
            },
        );
    }

    pub fn lookup(&self, name: &str) -> Option<&FunctionRewrite> {
        self.functions.get(&name.to_ascii_lowercase())
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new("0.1.0")
    }
}

/// Native conversion function for a relational target type name
pub fn conversion_function(target: &str) -> Result<&'static str, RegistryError> {
    let lowered = target.to_ascii_lowercase();
    let native = match lowered.as_str() {
        "string" | "varchar" | "char" | "clob" => "TOSTRING",
        "boolean" => "TOBOOLEAN",
        "byte" | "short" | "integer" | "long" | "float" | "double" | "biginteger"
        | "bigdecimal" => "TONUMBER",
        "object" => "TOOBJECT",
        "array" => "TOARRAY",
        _ => return Err(RegistryError::UnsupportedConversion(target.to_string())),
    };
    Ok(native)
}

/// Result type of a conversion, for output type inference
pub fn conversion_type(target: &str) -> DataType {
    match target.to_ascii_lowercase().as_str() {
        "string" | "varchar" | "char" | "clob" => DataType::String,
        "boolean" => DataType::Boolean,
        "byte" | "short" | "integer" => DataType::Integer,
        "long" => DataType::Long,
        "float" | "double" => DataType::Double,
        "biginteger" => DataType::BigInteger,
        "bigdecimal" => DataType::BigDecimal,
        _ => DataType::Object,
    }
}
