// SPDX-License-Identifier: MIT OR Apache-2.0
//! Arithmetic expression evaluation.

use crate::{ToolError, ToolPlugin, object_schema, require_str};
use async_trait::async_trait;
use fabric_core::{ToolDescriptor, ToolProvider};
use std::collections::BTreeMap;

/// Longest expression accepted.
const MAX_EXPRESSION_LEN: usize = 1024;

/// Evaluate arithmetic/boolean expressions.
pub struct MathTool;

#[async_trait]
impl ToolPlugin for MathTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            tool_id: "math.calculate".into(),
            category: "math".into(),
            description: "Evaluate an arithmetic expression".into(),
            capabilities: BTreeMap::from([("evaluate".to_string(), "do_evaluate".to_string())]),
            provider: ToolProvider::Builtin,
            input_schemas: BTreeMap::from([(
                "evaluate".to_string(),
                object_schema(
                    &["expression"],
                    serde_json::json!({"expression": {"type": "string"}}),
                ),
            )]),
        }
    }

    async fn execute(
        &self,
        _capability: &str,
        params: &serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        let expression = require_str(params, "expression")?;
        if expression.len() > MAX_EXPRESSION_LEN {
            return Err(ToolError::new("EXPRESSION_TOO_LONG", "expression exceeds the length cap"));
        }

        let value = evalexpr::eval(expression)
            .map_err(|e| ToolError::new("EVALUATION_FAILED", e.to_string()))?;

        let result = match value {
            evalexpr::Value::Int(i) => serde_json::json!(i),
            evalexpr::Value::Float(f) => serde_json::json!(f),
            evalexpr::Value::Boolean(b) => serde_json::json!(b),
            evalexpr::Value::String(s) => serde_json::json!(s),
            evalexpr::Value::Empty => serde_json::Value::Null,
            other => serde_json::json!(format!("{other:?}")),
        };

        Ok(serde_json::json!({"result": result}))
    }
}
