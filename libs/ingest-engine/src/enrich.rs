use std::time::SystemTime;

use serde_json::Value;

use crate::clock::epoch_seconds;
use crate::error::EnrichError;

pub const DEFAULT_TENANT_FIELD: &str = "TenantId";
pub const DEFAULT_TIMESTAMP_FIELD: &str = "timestamp";

/// Stamp the tenant id and the enrichment time onto one JSON object.
///
/// Output is the compact JSON text of the enriched object followed by a
/// single `\n`. Existing `TenantId` / `timestamp` keys are overwritten.
pub fn enrich(payload: &[u8], tenant_id: &str, now: SystemTime) -> Result<String, EnrichError> {
    TenantStamp::default().apply(payload, tenant_id, now)
}

/// Stateless enrichment stage. One instance is shared by every worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantStamp {
    tenant_field: String,
    timestamp_field: String,
}

impl Default for TenantStamp {
    fn default() -> Self {
        Self::new(DEFAULT_TENANT_FIELD, DEFAULT_TIMESTAMP_FIELD)
    }
}

impl TenantStamp {
    pub fn new(tenant_field: impl Into<String>, timestamp_field: impl Into<String>) -> Self {
        Self {
            tenant_field: tenant_field.into(),
            timestamp_field: timestamp_field.into(),
        }
    }

    /// Enrich one payload. `tenant_id` is stamped verbatim, empty or not.
    pub fn apply(&self, payload: &[u8], tenant_id: &str, now: SystemTime) -> Result<String, EnrichError> {
        let text = std::str::from_utf8(payload)?;

        let mut object = match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                return Err(EnrichError::MalformedRecord(format!(
                    "expected object, got {}",
                    json_type(&other)
                )));
            }
            Err(e) => return Err(EnrichError::MalformedRecord(e.to_string())),
        };

        object.insert(self.tenant_field.clone(), Value::String(tenant_id.to_string()));
        object.insert(self.timestamp_field.clone(), Value::from(epoch_seconds(now)));

        let mut line = Value::Object(object).to_string();
        line.push('\n');
        Ok(line)
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
