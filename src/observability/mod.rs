//! Observability for the commit protocol
//!
//! - Structured JSON logging
//! - Per-handle counters
//! - Begin/complete scopes around protocol steps
//! - Durable audit trail of opens, applies and recoveries
//!
//! Observability never changes the outcome of the operation it observes.
//!
//! ```ignore
//! use flintdb::observability::{Logger, Event, log_event_with_fields};
//!
//! Logger::info("COMMIT_COMPLETE", &[("revision", "4")]);
//! log_event_with_fields(Event::RecoveryRestamped, &[("revision", "6")]);
//! ```

pub mod audit;
mod events;
mod logger;
mod metrics;
mod scope;

pub use audit::{
    AuditAction, AuditLog, AuditOutcome, AuditRecord, AuditTrail, FileAuditLog, MemoryAuditLog,
};
pub use events::Event;
pub use logger::{Logger, Severity, LOG_LEVEL_ENV};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use scope::{ObservationScope, Timer};

fn event_severity(event: Event) -> Severity {
    if event.is_fatal() {
        return Severity::Fatal;
    }
    match event {
        Event::OpenRetry | Event::LockContended | Event::RepairNeeded => Severity::Warn,
        Event::ApplyFailed => Severity::Error,
        Event::TableApplied | Event::OpenBegin => Severity::Trace,
        _ => Severity::Info,
    }
}

/// Log a protocol event
pub fn log_event(event: Event) {
    Logger::log(event_severity(event), event.as_str(), &[]);
}

/// Log a protocol event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event_severity(event), event.as_str(), fields);
}
