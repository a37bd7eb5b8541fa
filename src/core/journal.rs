//! Append-only run journal with file-based persistence.
//!
//! Events are stored as newline-delimited JSON (JSONL) so an operator can
//! read a failed bootstrap with nothing more than `cat`.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use uuid::Uuid;

use crate::domain::{Event, Run};

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("corrupt journal line {line} in {path}: {source}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// File-backed run journal
#[derive(Debug, Clone)]
pub struct RunJournal {
    path: PathBuf,
}

impl RunJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path to the journal file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> JournalError {
        JournalError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Append an event to the log
    pub async fn append(&self, event: &Event) -> Result<(), JournalError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_err(e))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.io_err(e))?;

        let json = serde_json::to_string(event)?;
        file.write_all(format!("{}\n", json).as_bytes())
            .await
            .map_err(|e| self.io_err(e))?;
        file.flush().await.map_err(|e| self.io_err(e))?;

        Ok(())
    }

    /// Replay all events in order
    pub async fn replay(&self) -> Result<Vec<Event>, JournalError> {
        let file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_err(e)),
        };

        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut events = Vec::new();
        let mut line_no = 0;

        while let Some(line) = lines.next_line().await.map_err(|e| self.io_err(e))? {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            let event: Event =
                serde_json::from_str(&line).map_err(|source| JournalError::Corrupt {
                    path: self.path.clone(),
                    line: line_no,
                    source,
                })?;
            events.push(event);
        }

        Ok(events)
    }

    /// Events of a single run
    pub async fn events_for(&self, run_id: Uuid) -> Result<Vec<Event>, JournalError> {
        let events = self.replay().await?;
        Ok(events.into_iter().filter(|e| e.run_id == run_id).collect())
    }

    /// All runs reconstructed from the journal, most recent first
    pub async fn runs(&self) -> Result<Vec<Run>, JournalError> {
        let events = self.replay().await?;

        let mut order: Vec<Uuid> = Vec::new();
        for event in &events {
            if !order.contains(&event.run_id) {
                order.push(event.run_id);
            }
        }

        // The journal is append-only, so first appearance is start order
        order.reverse();

        let runs: Vec<Run> = order
            .into_iter()
            .filter_map(|run_id| {
                let run_events: Vec<Event> = events
                    .iter()
                    .filter(|e| e.run_id == run_id)
                    .cloned()
                    .collect();
                Run::from_events(&run_events)
            })
            .collect();

        Ok(runs)
    }
}
