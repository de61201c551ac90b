//! Per-app progress lines for `bcx ingest`.
//!
//! One line when discovery is done, then one line per app as its worker
//! finishes, in completion order. Everything goes to stderr; the summary
//! on stdout is unaffected by the mode.

use std::io::Write;

#[derive(Clone, Debug)]
pub enum IngestProgressEvent {
    /// Input paths expanded to this many extraction files.
    Discovered { files: u64 },
    /// The `n`th app finished. `status` is the outcome or `rejected`.
    App {
        n: u64,
        total: u64,
        label: String,
        status: String,
    },
}

impl IngestProgressEvent {
    /// `ingest  12 / 1,040  Demo (inserted)`
    fn human_line(&self) -> String {
        match self {
            Self::Discovered { files } => {
                format!("ingest  discovered {} files", group_thousands(*files))
            }
            Self::App {
                n,
                total,
                label,
                status,
            } => format!(
                "ingest  {} / {}  {} ({})",
                group_thousands(*n),
                group_thousands(*total),
                label,
                status
            ),
        }
    }

    fn json_value(&self) -> serde_json::Value {
        match self {
            Self::Discovered { files } => serde_json::json!({
                "event": "progress",
                "phase": "discovered",
                "files": files,
            }),
            Self::App {
                n,
                total,
                label,
                status,
            } => serde_json::json!({
                "event": "progress",
                "phase": "ingesting",
                "n": n,
                "total": total,
                "app": label,
                "status": status,
            }),
        }
    }
}

/// Sink for ingest progress. Called from the collecting loop only, never
/// from workers.
pub trait IngestProgressReporter: Send + Sync {
    fn report(&self, event: IngestProgressEvent);
}

pub struct StderrProgress;

impl IngestProgressReporter for StderrProgress {
    fn report(&self, event: IngestProgressEvent) {
        emit(&event.human_line());
    }
}

/// JSON Lines on stderr.
pub struct JsonProgress;

impl IngestProgressReporter for JsonProgress {
    fn report(&self, event: IngestProgressEvent) {
        if let Ok(line) = serde_json::to_string(&event.json_value()) {
            emit(&line);
        }
    }
}

pub struct NoProgress;

impl IngestProgressReporter for NoProgress {
    fn report(&self, _event: IngestProgressEvent) {}
}

// A closed stderr must not abort ingestion.
fn emit(line: &str) {
    let mut err = std::io::stderr().lock();
    let _ = writeln!(err, "{}", line);
    let _ = err.flush();
}

/// Decimal digits grouped by three with commas.
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let head = digits.len() % 3;
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    out.push_str(&digits[..head]);
    for (i, group) in digits.as_bytes()[head..].chunks(3).enumerate() {
        if head > 0 || i > 0 {
            out.push(',');
        }
        out.extend(group.iter().map(|&b| b as char));
    }
    out
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// `human` on an interactive stderr, `off` when piped or redirected.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn IngestProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thousands_are_grouped() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(12_345), "12,345");
        assert_eq!(group_thousands(123_456), "123,456");
        assert_eq!(group_thousands(u64::MAX), "18,446,744,073,709,551,615");
    }

    #[test]
    fn app_event_renders_for_both_modes() {
        let event = IngestProgressEvent::App {
            n: 12,
            total: 1040,
            label: "Demo".to_string(),
            status: "inserted".to_string(),
        };
        assert_eq!(event.human_line(), "ingest  12 / 1,040  Demo (inserted)");

        let v = event.json_value();
        assert_eq!(v["phase"], "ingesting");
        assert_eq!(v["app"], "Demo");
        assert_eq!(v["total"], 1040);

        let found = IngestProgressEvent::Discovered { files: 3 };
        assert_eq!(found.human_line(), "ingest  discovered 3 files");
        assert_eq!(found.json_value()["files"], 3);
    }
}
