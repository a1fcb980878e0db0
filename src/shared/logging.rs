use serde_json::json;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const LOG_FILE_RELATIVE: &str = "logs/agentops.log";

pub fn event_log_path(state_root: &Path) -> PathBuf {
    state_root.join(LOG_FILE_RELATIVE)
}

/// Append-only JSON-lines event log.
///
/// Each line is `{"timestamp","level","event","message"}`. Write failures are
/// swallowed so logging never changes the outcome of the operation being logged.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    path: Option<PathBuf>,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn for_state_root(state_root: &Path) -> Self {
        Self::new(event_log_path(state_root))
    }

    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn info(&self, event: &str, message: impl AsRef<str>) {
        self.append("info", event, message.as_ref());
    }

    pub fn warn(&self, event: &str, message: impl AsRef<str>) {
        self.append("warn", event, message.as_ref());
    }

    pub fn error(&self, event: &str, message: impl AsRef<str>) {
        self.append("error", event, message.as_ref());
    }

    fn append(&self, level: &str, event: &str, message: &str) {
        let Some(path) = self.path.as_deref() else {
            return;
        };
        let payload = json!({
            "timestamp": super::time::now_secs(),
            "level": level,
            "event": event,
            "message": message,
        });
        let Ok(line) = serde_json::to_string(&payload) else {
            return;
        };
        if let Some(parent) = path.parent() {
            if fs::create_dir_all(parent).is_err() {
                return;
            }
        }
        let Ok(mut file) = fs::OpenOptions::new().create(true).append(true).open(path) else {
            return;
        };
        let _ = writeln!(file, "{line}");
    }
}
