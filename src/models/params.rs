//! Positional statement parameters and their literal encodings.
//!
//! Parameters are supplied positionally with a statement and encoded to text
//! before anything reaches the database. Validation happens up front so a
//! rejected call never touches a pooled connection.

use serde::{Deserialize, Serialize};

use crate::error::{AdapterError, AdapterResult};

/// Hard cap on the number of positional parameters per statement.
///
/// The binding path itself is arbitrary-arity; this constant is the only
/// place the cap lives.
pub const MAX_PARAMS: usize = 5;

/// A typed scalar parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    Text(String),
    /// 2-component vector, encoded as "(x,y)"
    Vec2(f64, f64),
    /// 3-component vector, encoded as "(x,y,z)"
    Vec3(f64, f64, f64),
}

impl ParamValue {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Vec2(..) => "vec2",
            Self::Vec3(..) => "vec3",
        }
    }

    /// Encode this value as a positional text literal.
    pub fn encode(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(v) => {
                if *v {
                    "true".to_string()
                } else {
                    "false".to_string()
                }
            }
            Self::Int(v) => v.to_string(),
            Self::Float(v) => v.to_string(),
            Self::Text(v) => v.clone(),
            Self::Vec2(x, y) => format!("({x},{y})"),
            Self::Vec3(x, y, z) => format!("({x},{y},{z})"),
        }
    }
}

/// Validate a parameter list and encode every value positionally.
///
/// Fails with `UnsupportedParameter` when the list exceeds [`MAX_PARAMS`].
/// Every supported variant has a defined encoding, so length is the only
/// rejection today; the check stays here so new variants gain a single
/// validation point.
pub fn encode_params(params: &[ParamValue]) -> AdapterResult<Vec<String>> {
    if params.len() > MAX_PARAMS {
        return Err(AdapterError::unsupported_parameter(format!(
            "too many parameters: {} (max {})",
            params.len(),
            MAX_PARAMS
        )));
    }
    Ok(params.iter().map(ParamValue::encode).collect())
}
