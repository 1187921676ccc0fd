//! Diagnostic page dumps.

use std::fs;
use std::path::{Path, PathBuf};

/// Write-once captures of pages that failed structurally or refused to
/// parse. The pipeline never reads these back; they exist for a human with
/// an editor.
#[derive(Debug, Clone)]
pub struct DumpDir {
    root: PathBuf,
}

impl DumpDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes `body` under a timestamped name carrying `label`, returning
    /// the path. Failures are logged and swallowed: diagnostics must not
    /// kill the run that needs diagnosing.
    pub fn write(&self, label: &str, body: &str) -> Option<PathBuf> {
        match self.try_write(label, body) {
            Ok(path) => {
                tracing::warn!("dumped page to {}", path.display());
                Some(path)
            }
            Err(e) => {
                tracing::warn!("could not dump page for {}: {}", label, e);
                None
            }
        }
    }

    fn try_write(&self, label: &str, body: &str) -> std::io::Result<PathBuf> {
        fs::create_dir_all(&self.root)?;
        let safe: String = label
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let name = format!("{}_{}.html", chrono::Utc::now().timestamp_millis(), safe);
        let path = self.root.join(name);
        fs::write(&path, body)?;
        Ok(path)
    }
}
