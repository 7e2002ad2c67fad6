//! The sink boundary: where finished events leave the pipeline.
//!
//! The core only appends; durability, retries and backend selection belong
//! to the implementation behind the trait. Sinks are passed in explicitly
//! (no ambient globals) so tests can substitute an in-memory one.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::record::AnalysisRecord;

/// One header as received, order preserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// Everything that can be appended to the analysis log.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Service started.
    Start { timestamp: DateTime<Utc> },
    /// An inbound request was received (always logged, exploit or not).
    Request {
        timestamp: DateTime<Utc>,
        correlation_id: Uuid,
        client: String,
        client_port: u16,
        server_port: u16,
        request: String,
        headers: Vec<Header>,
    },
    /// A candidate exploit was detected and analyzed.
    Exploit {
        #[serde(flatten)]
        record: AnalysisRecord,
    },
    /// An internal failure worth the operator's attention.
    Error {
        timestamp: DateTime<Utc>,
        #[serde(skip_serializing_if = "Option::is_none")]
        correlation_id: Option<Uuid>,
        message: String,
    },
    /// Service stopped.
    End { timestamp: DateTime<Utc> },
}

impl Event {
    #[must_use]
    pub fn start() -> Self {
        Event::Start {
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn end() -> Self {
        Event::End {
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn error(correlation_id: Option<Uuid>, message: impl Into<String>) -> Self {
        Event::Error {
            timestamp: Utc::now(),
            correlation_id,
            message: message.into(),
        }
    }
}

/// Append-only destination for structured events. `append` must be safe to
/// call concurrently from many connection tasks; implementations do their
/// own locking.
pub trait Sink: Send + Sync {
    /// Append one event. Success means the event is durable as far as this
    /// backend can promise; the caller does not retry.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects or fails to persist the
    /// event.
    fn append(&self, event: &Event) -> crate::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_carry_a_type_tag() {
        let json = serde_json::to_value(Event::start()).unwrap();
        assert_eq!(json["type"], "start");

        let json = serde_json::to_value(Event::error(None, "boom")).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "boom");
        assert!(json.get("correlation_id").is_none());
    }

    #[test]
    fn exploit_event_flattens_the_record() {
        let deob = crate::expr::parse("${foo:bar}");
        let record = AnalysisRecord::build(Uuid::new_v4(), "request", &deob, None, vec![], None);
        let json = serde_json::to_value(Event::Exploit { record }).unwrap();

        assert_eq!(json["type"], "exploit");
        assert_eq!(json["location"], "request");
        assert_eq!(json["raw_payload"], "${foo:bar}");
    }

    #[test]
    fn request_event_preserves_header_order() {
        let event = Event::Request {
            timestamp: Utc::now(),
            correlation_id: Uuid::new_v4(),
            client: "203.0.113.7".to_string(),
            client_port: 54321,
            server_port: 8080,
            request: "GET / HTTP/1.1".to_string(),
            headers: vec![
                Header {
                    name: "Host".to_string(),
                    value: "victim".to_string(),
                },
                Header {
                    name: "User-Agent".to_string(),
                    value: "curl/8".to_string(),
                },
            ],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["headers"][0]["name"], "Host");
        assert_eq!(json["headers"][1]["name"], "User-Agent");
    }
}
