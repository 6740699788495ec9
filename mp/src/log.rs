//! Message log: every delivered payload, one per line

use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

pub struct MessageLog {
    path: PathBuf,
    file: File,
}

impl MessageLog {
    /// Create the log file if it does not exist yet; true if it was created
    pub async fn ensure_exists(path: &Path) -> Result<bool> {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Ok(false);
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create message log directory")?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .with_context(|| format!("Failed to create message log {}", path.display()))?;
        Ok(true)
    }

    /// Open for appending
    pub async fn open(path: &Path) -> Result<Self> {
        debug!(?path, "MessageLog::open: called");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .with_context(|| format!("Failed to open message log {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one payload and flush
    pub async fn append(&mut self, payload: &str) -> Result<()> {
        let mut line = String::with_capacity(payload.len() + 1);
        line.push_str(payload);
        line.push('\n');
        self.file
            .write_all(line.as_bytes())
            .await
            .context("Failed to write message log")?;
        self.file.flush().await.context("Failed to flush message log")?;
        Ok(())
    }
}
