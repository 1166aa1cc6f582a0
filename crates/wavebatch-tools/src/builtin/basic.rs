use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::{json, Value};

use wavebatch_core::error::ToolError;
use wavebatch_core::traits::Tool;

use super::{number, parse_input, payload};

#[derive(Deserialize)]
struct BinaryInput {
    a: f64,
    b: f64,
}

fn binary_schema(a: &str, b: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "a": { "type": "number", "description": a },
            "b": { "type": "number", "description": b }
        },
        "required": ["a", "b"]
    })
}

/// Declares a two-operand arithmetic tool.
macro_rules! binary_tool {
    ($ty:ident, $name:literal, $desc:literal, ($a:literal, $b:literal), $op:expr) => {
        pub struct $ty;

        impl Tool for $ty {
            fn name(&self) -> &str {
                $name
            }
            fn description(&self) -> &str {
                $desc
            }
            fn input_schema(&self) -> Value {
                binary_schema($a, $b)
            }
            fn invoke(&self, input: Value) -> BoxFuture<'_, Result<Value, ToolError>> {
                Box::pin(async move {
                    let p: BinaryInput = parse_input(input)?;
                    let f: fn(f64, f64) -> Result<f64, ToolError> = $op;
                    Ok(payload(number(f(p.a, p.b)?)?))
                })
            }
        }
    };
}

binary_tool!(AddTool, "add", "Add two numbers: a + b.", ("First addend", "Second addend"), |a, b| Ok(a + b));

binary_tool!(
    SubtractTool,
    "subtract",
    "Subtract two numbers: a - b.",
    ("Minuend", "Subtrahend"),
    |a, b| Ok(a - b)
);

binary_tool!(
    MultiplyTool,
    "multiply",
    "Multiply two numbers: a * b.",
    ("First factor", "Second factor"),
    |a, b| Ok(a * b)
);

binary_tool!(
    DivideTool,
    "divide",
    "Divide two numbers: a / b. Fails when b is zero.",
    ("Dividend", "Divisor"),
    |a, b| {
        if b == 0.0 {
            Err(ToolError::Domain("division by zero".into()))
        } else {
            Ok(a / b)
        }
    }
);

binary_tool!(
    PowerTool,
    "power",
    "Raise a to the power b.",
    ("Base", "Exponent"),
    |a, b| Ok(a.powf(b))
);

// ── PercentageTool ──────────────────────────────────────────────

pub struct PercentageTool;

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum PercentageOp {
    /// `percentage`% of `value`.
    Of,
    /// `value` increased by `percentage`%.
    Increase,
    /// `value` decreased by `percentage`%.
    Decrease,
    /// Change from `value` to `percentage` (read as the new value), in %.
    Change,
}

#[derive(Deserialize)]
struct PercentageInput {
    operation: PercentageOp,
    value: f64,
    percentage: f64,
}

impl Tool for PercentageTool {
    fn name(&self) -> &str {
        "percentage"
    }
    fn description(&self) -> &str {
        "Percentage calculations: of, increase, decrease, change."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "operation": { "type": "string", "enum": ["of", "increase", "decrease", "change"] },
                "value": { "type": "number", "description": "Base value" },
                "percentage": { "type": "number", "description": "Percentage, or the new value for 'change'" }
            },
            "required": ["operation", "value", "percentage"]
        })
    }
    fn invoke(&self, input: Value) -> BoxFuture<'_, Result<Value, ToolError>> {
        Box::pin(async move {
            let p: PercentageInput = parse_input(input)?;
            let result = match p.operation {
                PercentageOp::Of => p.value * p.percentage / 100.0,
                PercentageOp::Increase => p.value * (1.0 + p.percentage / 100.0),
                PercentageOp::Decrease => p.value * (1.0 - p.percentage / 100.0),
                PercentageOp::Change => {
                    if p.value == 0.0 {
                        return Err(ToolError::Domain(
                            "percentage change from zero is undefined".into(),
                        ));
                    }
                    (p.percentage - p.value) / p.value * 100.0
                }
            };
            Ok(payload(number(result)?))
        })
    }
}

// ── RoundTool ───────────────────────────────────────────────────

pub struct RoundTool;

#[derive(Deserialize)]
#[serde(untagged)]
enum Numbers {
    One(f64),
    Many(Vec<f64>),
}

#[derive(Deserialize)]
struct RoundInput {
    values: Numbers,
    #[serde(default = "default_decimals")]
    decimals: i32,
}

fn default_decimals() -> i32 {
    2
}

fn round_to(x: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (x * factor).round() / factor
}

impl Tool for RoundTool {
    fn name(&self) -> &str {
        "round"
    }
    fn description(&self) -> &str {
        "Round a number or list of numbers to a number of decimal places."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "values": { "description": "Number or array of numbers" },
                "decimals": { "type": "integer", "description": "Decimal places (default: 2)" }
            },
            "required": ["values"]
        })
    }
    fn invoke(&self, input: Value) -> BoxFuture<'_, Result<Value, ToolError>> {
        Box::pin(async move {
            let p: RoundInput = parse_input(input)?;
            let result = match p.values {
                Numbers::One(x) => number(round_to(x, p.decimals))?,
                Numbers::Many(xs) => Value::Array(
                    xs.into_iter()
                        .map(|x| number(round_to(x, p.decimals)))
                        .collect::<Result<_, _>>()?,
                ),
            };
            Ok(payload(result))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_returns_integer_result() {
        let out = AddTool.invoke(json!({"a": 2, "b": 2})).await.unwrap();
        assert_eq!(out, json!({"result": 4}));
    }

    #[tokio::test]
    async fn divide_by_zero_is_domain_error() {
        let err = DivideTool.invoke(json!({"a": 1, "b": 0})).await.unwrap_err();
        assert_eq!(err.kind(), "domain_error");
        assert_eq!(err.to_string(), "division by zero");
    }

    #[tokio::test]
    async fn missing_operand_is_invalid_input() {
        let err = MultiplyTool.invoke(json!({"a": 3})).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    #[tokio::test]
    async fn percentage_of() {
        let out = PercentageTool
            .invoke(json!({"operation": "of", "value": 100, "percentage": 15}))
            .await
            .unwrap();
        assert_eq!(out["result"], json!(15));
    }

    #[tokio::test]
    async fn percentage_change() {
        let out = PercentageTool
            .invoke(json!({"operation": "change", "value": 80, "percentage": 100}))
            .await
            .unwrap();
        assert_eq!(out["result"], json!(25));
    }

    #[tokio::test]
    async fn round_scalar_and_list() {
        let out = RoundTool
            .invoke(json!({"values": 3.14159, "decimals": 2}))
            .await
            .unwrap();
        assert_eq!(out["result"], json!(3.14));

        let out = RoundTool.invoke(json!({"values": [1.26, 2.0]})).await.unwrap();
        assert_eq!(out["result"], json!([1.26, 2]));
    }
}
