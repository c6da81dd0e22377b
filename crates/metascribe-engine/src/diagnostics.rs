use metascribe_contracts::events::{EventLog, EventPayload};
use serde_json::Value;

pub const FAILURE_EVENT: &str = "generation_failed";

/// Everything known about one failed remote call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FailureReport {
    pub operation: String,
    pub status: Option<u16>,
    pub retry_after: Option<String>,
    pub raw_body: Option<String>,
    pub payload: Option<Value>,
}

impl FailureReport {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            ..Self::default()
        }
    }

    /// Raw text when present, otherwise the parsed payload pretty-printed.
    pub fn body_text(&self) -> String {
        if let Some(raw) = self.raw_body.as_deref().filter(|raw| !raw.is_empty()) {
            return raw.to_string();
        }
        self.payload
            .as_ref()
            .and_then(|payload| serde_json::to_string_pretty(payload).ok())
            .unwrap_or_default()
    }

    pub fn to_event(&self) -> EventPayload {
        let mut payload = EventPayload::new();
        payload.insert(
            "operation".to_string(),
            Value::String(self.operation.clone()),
        );
        payload.insert(
            "status".to_string(),
            self.status
                .map(|code| Value::Number(code.into()))
                .unwrap_or(Value::Null),
        );
        payload.insert(
            "retry_after".to_string(),
            Value::String(self.retry_after.clone().unwrap_or_default()),
        );
        payload.insert("body".to_string(), Value::String(self.body_text()));
        payload
    }
}

/// Sink for remote failures. Recording never fails the caller.
#[derive(Debug, Clone)]
pub struct DiagnosticsReporter {
    log: EventLog,
}

impl DiagnosticsReporter {
    pub fn new(log: EventLog) -> Self {
        Self { log }
    }

    pub fn disabled() -> Self {
        Self::new(EventLog::disabled())
    }

    pub fn report(&self, report: &FailureReport) {
        if let Err(err) = self.log.emit(FAILURE_EVENT, report.to_event()) {
            eprintln!(
                "metascribe: could not record {} failure: {err:#}",
                report.operation
            );
        }
    }
}
