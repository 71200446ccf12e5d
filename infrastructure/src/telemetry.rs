//! Telemetry recorder that writes structured `tracing` events.

use conductor_application::ports::telemetry::Telemetry;
use conductor_domain::{QueryKey, QueryPhase, Target, TokenUsage, ToolKind};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl TracingTelemetry {
    pub fn new() -> Self {
        Self
    }
}

impl Telemetry for TracingTelemetry {
    fn query_started(&self, query: &QueryKey, targets: usize) {
        info!(query = %query, targets, "Query started");
    }

    fn query_finished(&self, query: &QueryKey, phase: QueryPhase, elapsed: Duration) {
        let elapsed_ms = elapsed.as_millis() as u64;
        match phase {
            QueryPhase::Error => warn!(query = %query, phase = %phase, elapsed_ms, "Query finished"),
            _ => info!(query = %query, phase = %phase, elapsed_ms, "Query finished"),
        }
    }

    fn target_started(&self, query: &QueryKey, target: &Target) {
        debug!(query = %query, target = %target, "Target started");
    }

    fn target_succeeded(&self, query: &QueryKey, target: &Target) {
        debug!(query = %query, target = %target, "Target succeeded");
    }

    fn target_failed(&self, query: &QueryKey, target: &Target, error: &str) {
        warn!(query = %query, target = %target, error, "Target failed");
    }

    fn model_completed(&self, model: &str, usage: &TokenUsage) {
        debug!(
            model,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            total_tokens = usage.total_tokens,
            "Model call completed"
        );
    }

    fn tool_started(&self, tool: &str, kind: ToolKind, call_id: &str) {
        debug!(tool, kind = %kind, call_id, "Tool call started");
    }

    fn tool_succeeded(&self, tool: &str, call_id: &str) {
        debug!(tool, call_id, "Tool call succeeded");
    }

    fn tool_failed(&self, tool: &str, call_id: &str, error: &str) {
        warn!(tool, call_id, error, "Tool call failed");
    }
}
