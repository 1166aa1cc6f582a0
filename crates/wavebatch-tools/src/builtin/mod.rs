pub mod array;
pub mod basic;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use wavebatch_core::error::ToolError;

/// Deserialize tool input, mapping failures to `InvalidInput`.
pub(crate) fn parse_input<T: DeserializeOwned>(input: Value) -> Result<T, ToolError> {
    serde_json::from_value(input).map_err(|e| ToolError::InvalidInput(e.to_string()))
}

/// JSON number for `x`, as an integer when it is one.
pub(crate) fn number(x: f64) -> Result<Value, ToolError> {
    if !x.is_finite() {
        return Err(ToolError::Domain(format!("result is not a finite number: {}", x)));
    }
    if x.fract() == 0.0 && x.abs() < 9.0e15 {
        return Ok(json!(x as i64));
    }
    Ok(json!(x))
}

/// Standard tool payload: the primary output lives under `"result"`.
pub(crate) fn payload(result: Value) -> Value {
    json!({ "result": result })
}
