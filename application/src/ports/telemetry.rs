//! Telemetry port
//!
//! Call-site contract for query, target, model and tool observations.
//! Every method has an empty default so recorders only implement what
//! they care about.

use conductor_domain::{QueryKey, QueryPhase, Target, TokenUsage, ToolKind};
use std::time::Duration;

pub trait Telemetry: Send + Sync {
    fn query_started(&self, _query: &QueryKey, _targets: usize) {}

    fn query_finished(&self, _query: &QueryKey, _phase: QueryPhase, _elapsed: Duration) {}

    fn target_started(&self, _query: &QueryKey, _target: &Target) {}

    fn target_succeeded(&self, _query: &QueryKey, _target: &Target) {}

    fn target_failed(&self, _query: &QueryKey, _target: &Target, _error: &str) {}

    fn model_completed(&self, _model: &str, _usage: &TokenUsage) {}

    fn tool_started(&self, _tool: &str, _kind: ToolKind, _call_id: &str) {}

    fn tool_succeeded(&self, _tool: &str, _call_id: &str) {}

    fn tool_failed(&self, _tool: &str, _call_id: &str, _error: &str) {}
}

/// Recorder that drops every observation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

impl Telemetry for NoopTelemetry {}
