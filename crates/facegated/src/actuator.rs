//! Unlock actuator. A granted access appends one line to a file or FIFO
//! that a door controller reads.

use std::io::Write;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct UnlockSink {
    path: Option<PathBuf>,
}

impl UnlockSink {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    /// Signal the lock. Write failures are logged; recognition carries on.
    pub fn unlock(&self, label: &str) {
        tracing::info!(label, "access granted; unlocking");
        let Some(path) = &self.path else {
            return;
        };
        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| writeln!(file, "{label}"));
        if let Err(e) = result {
            tracing::warn!(path = %path.display(), error = %e, "unlock signal failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlock_appends_label() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unlock");
        let sink = UnlockSink::new(Some(path.clone()));
        sink.unlock("alice");
        sink.unlock("bob");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "alice\nbob\n");
    }

    #[test]
    fn test_unlock_failure_is_not_fatal() {
        let sink = UnlockSink::new(Some(PathBuf::from("/nonexistent/dir/unlock")));
        sink.unlock("alice");
        UnlockSink::new(None).unlock("alice");
    }
}
