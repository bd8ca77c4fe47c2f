//! Structured JSON logger
//!
//! - One log line = one event
//! - `event` and `severity` first, remaining keys sorted
//! - Synchronous, written to stderr so stdout stays free for command output
//! - Lines below the process-wide minimum severity are dropped

use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Per-I/O detail
    Trace = 0,
    Info = 1,
    /// Recoverable issues, rollbacks
    Warn = 2,
    Error = 3,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "trace" => Some(Severity::Trace),
            "info" => Some(Severity::Info),
            "warn" => Some(Severity::Warn),
            "error" => Some(Severity::Error),
            _ => None,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Severity::Trace,
            1 => Severity::Info,
            2 => Severity::Warn,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

static MIN_SEVERITY: AtomicU8 = AtomicU8::new(Severity::Info as u8);

pub struct Logger;

impl Logger {
    pub fn set_min_severity(severity: Severity) {
        MIN_SEVERITY.store(severity as u8, Ordering::Relaxed);
    }

    pub fn min_severity() -> Severity {
        Severity::from_u8(MIN_SEVERITY.load(Ordering::Relaxed))
    }

    pub fn enabled(severity: Severity) -> bool {
        severity >= Self::min_severity()
    }

    pub fn log(severity: Severity, event: &str, fields: &[(&str, &str)]) {
        if !Self::enabled(severity) {
            return;
        }
        Self::log_to_writer(severity, event, fields, &mut io::stderr());
    }

    fn log_to_writer<W: Write>(
        severity: Severity,
        event: &str,
        fields: &[(&str, &str)],
        writer: &mut W,
    ) {
        let mut line = Self::render(severity, event, fields);
        line.push('\n');
        // One write per line; a logging failure never reaches the caller.
        let _ = writer.write_all(line.as_bytes());
        let _ = writer.flush();
    }

    fn render(severity: Severity, event: &str, fields: &[(&str, &str)]) -> String {
        let mut sorted: Vec<_> = fields.iter().collect();
        sorted.sort_by_key(|(key, _)| *key);

        let mut output = String::with_capacity(128);
        output.push_str("{\"event\":");
        push_json_string(&mut output, event);
        output.push_str(",\"severity\":");
        push_json_string(&mut output, severity.as_str());
        for (key, value) in sorted {
            output.push(',');
            push_json_string(&mut output, key);
            output.push(':');
            push_json_string(&mut output, value);
        }
        output.push('}');
        output
    }

    pub fn trace(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Trace, event, fields);
    }

    pub fn info(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Info, event, fields);
    }

    pub fn warn(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Warn, event, fields);
    }

    pub fn error(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Error, event, fields);
    }
}

fn push_json_string(output: &mut String, value: &str) {
    match serde_json::to_string(value) {
        Ok(encoded) => output.push_str(&encoded),
        Err(_) => output.push_str("\"\""),
    }
}

#[cfg(test)]
pub fn capture_log(severity: Severity, event: &str, fields: &[(&str, &str)]) -> String {
    let mut buffer = Vec::new();
    Logger::log_to_writer(severity, event, fields, &mut buffer);
    String::from_utf8(buffer).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_encoding() {
        for severity in [Severity::Trace, Severity::Info, Severity::Warn, Severity::Error] {
            assert_eq!(Severity::from_u8(severity as u8), severity);
        }
        // Anything out of range filters like the highest level
        assert_eq!(Severity::from_u8(200), Severity::Error);
    }

    #[test]
    fn test_severity_from_name() {
        assert_eq!(Severity::from_name("WARN"), Some(Severity::Warn));
        assert_eq!(Severity::from_name("trace"), Some(Severity::Trace));
        assert_eq!(Severity::from_name("fatal"), None);
    }

    #[test]
    fn test_log_json_format() {
        let output = capture_log(
            Severity::Info,
            "CONFIG_CHANGE_STARTED",
            &[("group", "rg-0"), ("capacity", "106496")],
        );

        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["event"], "CONFIG_CHANGE_STARTED");
        assert_eq!(parsed["severity"], "INFO");
        assert_eq!(parsed["group"], "rg-0");
        assert_eq!(parsed["capacity"], "106496");
    }

    #[test]
    fn test_log_key_order() {
        let a = capture_log(Severity::Warn, "E", &[("sp", "a"), ("lba", "1"), ("group", "g")]);
        let b = capture_log(Severity::Warn, "E", &[("group", "g"), ("sp", "a"), ("lba", "1")]);
        assert_eq!(a, b);

        assert!(a.starts_with("{\"event\":\"E\",\"severity\":\"WARN\","));
        let group = a.find("\"group\"").unwrap();
        let lba = a.find("\"lba\"").unwrap();
        let sp = a.find("\"sp\"").unwrap();
        assert!(group < lba && lba < sp);
    }

    #[test]
    fn test_log_escapes_values() {
        let output = capture_log(Severity::Error, "E", &[("message", "bad \"lba\"\nnext")]);
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["message"], "bad \"lba\"\nnext");
        assert_eq!(output.matches('\n').count(), 1);
    }
}
