//! Observability
//!
//! - Structured logging (one JSON object per line)
//! - Typed protocol events with fixed severities
//! - Counter metrics
//!
//! Observability never changes protocol behavior and never fails the caller.
//!
//! ```ignore
//! use raidgroup::observability::{log_event_with_fields, Event, MetricsRegistry};
//!
//! log_event_with_fields(Event::CapacityApplied, &[("group", "rg-0"), ("capacity", "106496")]);
//!
//! let metrics = MetricsRegistry::new();
//! metrics.increment_episodes_committed();
//! ```

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};

pub fn log_event(event: Event) {
    Logger::log(event.severity(), event.as_str(), &[]);
}

pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event() {
        log_event(Event::ConfigLoaded);
        log_event_with_fields(Event::PeerContactLost, &[("group", "rg-0"), ("sp", "a")]);
    }
}
