//! Schema integration adapter.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::capabilities::SCHEMA_AGENT;
use crate::interfaces::adapter::{parse_payload, AdapterError, AgentAdapter, DispatchContext};
use crate::schema::{integrate_schema, SchemaObject};

#[derive(Debug, Deserialize)]
struct SchemaRequest {
    schema: SchemaObject,
}

#[derive(Debug, Default)]
pub struct SchemaAdapter;

#[async_trait]
impl AgentAdapter for SchemaAdapter {
    fn name(&self) -> &str {
        SCHEMA_AGENT
    }

    async fn invoke(&self, payload: Value, ctx: &DispatchContext) -> Result<Value, AdapterError> {
        let req: SchemaRequest = parse_payload(payload)?;
        let integrated = integrate_schema(&req.schema);
        log::debug!(
            "[{}] schema {} -> {} nodes, coherence {:.2}",
            ctx.trace_id,
            req.schema.nodes.len(),
            integrated.nodes.len(),
            integrated.coherence_score
        );
        Ok(json!({
            "coherenceScore": integrated.coherence_score,
            "schema": integrated,
        }))
    }
}
