//! Detection driver: scan a request head for lookup expressions and run
//! each hit through the full analysis pipeline.

use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use lurepot_core::{expr, target, AnalysisRecord, Event, FetchOptions, ResolvedTarget, Sink};

use crate::http::RequestHead;

// Greedy on purpose: one candidate per field, spanning from the first
// opener to the last closing brace. Multiple expressions in one field
// collapse into a single candidate, a known trade-off that keeps the
// scanner total on adversarial input.
static CANDIDATE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$\{.*\}").unwrap());

/// Scans request heads and drives detection through deobfuscation, target
/// resolution, acquisition and reporting. Shared across connection tasks.
pub struct Detector {
    sink: Arc<dyn Sink>,
    fetch: FetchOptions,
}

impl Detector {
    #[must_use]
    pub fn new(sink: Arc<dyn Sink>, fetch: FetchOptions) -> Self {
        Self { sink, fetch }
    }

    /// Scan every field of a request head. The request line is scanned
    /// first, then headers in arrival order; each field is analyzed
    /// independently and produces its own exploit event.
    pub async fn scan_request(&self, correlation_id: Uuid, head: &RequestHead) {
        self.scan_field(correlation_id, "request", &head.request_line)
            .await;
        for header in &head.headers {
            let location = format!("header-{}", header.name);
            self.scan_field(correlation_id, &location, &header.value).await;
        }
    }

    async fn scan_field(&self, correlation_id: Uuid, location: &str, value: &str) {
        let Some(candidate) = CANDIDATE.find(value) else {
            return;
        };

        let deob = expr::parse(candidate.as_str());
        let resolved = target::resolve(&deob.flattened);
        let target_url = resolved.as_ref().map(ResolvedTarget::url_string);
        info!(
            %correlation_id,
            location,
            payload = %deob.flattened,
            target = target_url.as_deref().unwrap_or("none"),
            "lookup expression detected"
        );

        let (artifacts, error) = match &resolved {
            Some(t) if self.fetch.enabled => {
                let outcome = lurepot_fetch::fetch(t, &self.fetch).await;
                (outcome.artifacts, outcome.error)
            }
            _ => {
                debug!(%correlation_id, "payload retrieval skipped");
                (Vec::new(), None)
            }
        };

        let record =
            AnalysisRecord::build(correlation_id, location, &deob, resolved, artifacts, error);
        if let Err(e) = self.sink.append(&Event::Exploit { record }) {
            warn!(%correlation_id, error = %e, "failed to append exploit event");
        }
    }
}
