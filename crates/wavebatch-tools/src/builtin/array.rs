use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::{json, Value};

use wavebatch_core::error::ToolError;
use wavebatch_core::traits::Tool;

use super::{number, parse_input, payload};

#[derive(Deserialize)]
struct ValuesInput {
    values: Vec<f64>,
}

fn values_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "values": { "type": "array", "items": { "type": "number" } }
        },
        "required": ["values"]
    })
}

// ── SumTool ─────────────────────────────────────────────────────

pub struct SumTool;

impl Tool for SumTool {
    fn name(&self) -> &str {
        "sum"
    }
    fn description(&self) -> &str {
        "Sum of a list of numbers."
    }
    fn input_schema(&self) -> Value {
        values_schema()
    }
    fn invoke(&self, input: Value) -> BoxFuture<'_, Result<Value, ToolError>> {
        Box::pin(async move {
            let p: ValuesInput = parse_input(input)?;
            Ok(payload(number(p.values.iter().sum())?))
        })
    }
}

// ── MeanTool ────────────────────────────────────────────────────

pub struct MeanTool;

impl Tool for MeanTool {
    fn name(&self) -> &str {
        "mean"
    }
    fn description(&self) -> &str {
        "Arithmetic mean of a non-empty list of numbers."
    }
    fn input_schema(&self) -> Value {
        values_schema()
    }
    fn invoke(&self, input: Value) -> BoxFuture<'_, Result<Value, ToolError>> {
        Box::pin(async move {
            let p: ValuesInput = parse_input(input)?;
            if p.values.is_empty() {
                return Err(ToolError::Domain("mean of an empty list".into()));
            }
            let mean = p.values.iter().sum::<f64>() / p.values.len() as f64;
            Ok(json!({
                "result": number(mean)?,
                "count": p.values.len(),
            }))
        })
    }
}

// ── DotProductTool ──────────────────────────────────────────────

pub struct DotProductTool;

#[derive(Deserialize)]
struct DotInput {
    array1: Vec<f64>,
    array2: Vec<f64>,
}

impl Tool for DotProductTool {
    fn name(&self) -> &str {
        "dot_product"
    }
    fn description(&self) -> &str {
        "Dot product (sumproduct) of two equal-length arrays."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "array1": { "type": "array", "items": { "type": "number" } },
                "array2": { "type": "array", "items": { "type": "number" } }
            },
            "required": ["array1", "array2"]
        })
    }
    fn invoke(&self, input: Value) -> BoxFuture<'_, Result<Value, ToolError>> {
        Box::pin(async move {
            let p: DotInput = parse_input(input)?;
            if p.array1.len() != p.array2.len() {
                return Err(ToolError::Domain(format!(
                    "arrays differ in length: {} vs {}",
                    p.array1.len(),
                    p.array2.len()
                )));
            }
            let dot: f64 = p.array1.iter().zip(&p.array2).map(|(x, y)| x * y).sum();
            Ok(payload(number(dot)?))
        })
    }
}

// ── ArrayScaleTool ──────────────────────────────────────────────

pub struct ArrayScaleTool;

#[derive(Deserialize)]
struct ScaleInput {
    values: Vec<f64>,
    factor: f64,
}

impl Tool for ArrayScaleTool {
    fn name(&self) -> &str {
        "array_scale"
    }
    fn description(&self) -> &str {
        "Multiply every element of an array by a factor. Returns `values` as well as `result`."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "values": { "type": "array", "items": { "type": "number" } },
                "factor": { "type": "number" }
            },
            "required": ["values", "factor"]
        })
    }
    fn invoke(&self, input: Value) -> BoxFuture<'_, Result<Value, ToolError>> {
        Box::pin(async move {
            let p: ScaleInput = parse_input(input)?;
            let scaled = p
                .values
                .iter()
                .map(|x| number(x * p.factor))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(json!({
                "result": scaled.clone(),
                "values": scaled,
            }))
        })
    }
}
