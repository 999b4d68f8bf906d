use incentive_core::audit::{AuditEvent, AuditSink};
use tracing::info;

/// Writes each audit event as one structured log line.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        info!(
            event_name = "audit.event",
            audit_event_id = %event.event_id,
            audit_event_type = %event.event_type,
            correlation_id = %event.correlation_id,
            deviation_id = event.deviation_id.as_ref().map_or("none", |id| id.0.as_str()),
            case_id = event.case_id.as_ref().map_or("none", |id| id.0.as_str()),
            actor = %event.actor,
            category = event.category.as_str(),
            outcome = event.outcome.as_str(),
            metadata = ?event.metadata,
            occurred_at = %event.occurred_at.to_rfc3339(),
            "audit event"
        );
    }
}
