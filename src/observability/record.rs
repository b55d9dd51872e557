//! Structured log record.
//!
//! Field names are part of the output contract consumed by dashboards:
//! lowercase, underscored, empty values omitted. `stack_trace` is always
//! present (null when unset).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Which layer of the application produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    App,
    Router,
    Usecase,
    External,
}

/// Details about a call to an external system.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalRecord {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub module: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub method: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub additional_info: Map<String, Value>,
}

/// One structured log entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub module: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub method: String,
    /// Elapsed time in nanoseconds.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub duration: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub session_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub client_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub request_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub request_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external: Option<ExternalRecord>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub additional_info: Map<String, Value>,
    #[serde(default)]
    pub stack_trace: Option<Map<String, Value>>,
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

/// Failure turning a record into log fields.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("record serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl LogRecord {
    /// Template carrying the service identity shared by every record.
    pub fn template(
        service: impl Into<String>,
        module: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            module: module.into(),
            version: version.into(),
            ..Self::default()
        }
    }

    /// Add one entry to `additional_info`.
    pub fn with_info(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.additional_info.insert(key.into(), value.into());
        self
    }

    /// Flattened top-level fields as they appear in the emitted log line.
    pub fn to_fields(&self) -> Result<Map<String, Value>, RecordError> {
        Ok(serde_json::from_value(serde_json::to_value(self)?)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_fields_omitted() {
        let fields = LogRecord::template("orders", "", "1.2.0").to_fields().unwrap();

        assert_eq!(
            Value::Object(fields),
            json!({
                "service": "orders",
                "version": "1.2.0",
                "stack_trace": null,
            })
        );
    }

    #[test]
    fn test_full_record_shape() {
        let mut record = LogRecord::template("orders", "http", "1.2.0")
            .with_info("resp_status", 201)
            .with_info("http_method", "POST");
        record.category = Some(Category::Router);
        record.method = "[POST] /orders".into();
        record.duration = 1_500_000;
        record.user_id = "u1".into();
        record.request_id = "req-1".into();
        record.external = Some(ExternalRecord {
            service: "payments".into(),
            ..ExternalRecord::default()
        });

        let fields = record.to_fields().unwrap();
        assert_eq!(fields["category"], "router");
        assert_eq!(fields["duration"], 1_500_000);
        assert_eq!(fields["user_id"], "u1");
        assert_eq!(fields["request_id"], "req-1");
        assert_eq!(fields["external"], json!({ "service": "payments" }));
        assert_eq!(fields["additional_info"]["resp_status"], 201);
        assert!(fields.get("session_id").is_none());
        assert!(fields.get("client_id").is_none());
        assert!(fields.contains_key("stack_trace"));
    }

    #[test]
    fn test_category_names() {
        let names: Vec<Value> = [Category::App, Category::Router, Category::Usecase, Category::External]
            .iter()
            .map(|c| serde_json::to_value(c).unwrap())
            .collect();
        assert_eq!(names, vec![json!("app"), json!("router"), json!("usecase"), json!("external")]);
    }
}
