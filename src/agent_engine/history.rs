use std::collections::VecDeque;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::agent_engine::state::ActionDescriptor;
use crate::errors::PilotResult;

/// Prior decisions fed back into each request.
pub const HISTORY_CAPACITY: usize = 10;

/// Bounded FIFO of executed decisions, oldest evicted first.
#[derive(Debug, Clone, Default)]
pub struct DecisionHistory {
    entries: VecDeque<ActionDescriptor>,
}

impl DecisionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, descriptor: ActionDescriptor) {
        if self.entries.len() == HISTORY_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(descriptor);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One wire-form JSON object per line, most recent first.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .rev()
            .map(|d| d.to_wire().to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub ts: i64,
    pub iteration: u32,
    /// The decision in the model's own field names.
    pub decision: serde_json::Value,
    /// What the executor reported doing, or why it did nothing.
    pub executed: Option<String>,
    pub error: Option<String>,
}

/// Append-only JSONL record of one run.
pub struct SessionTranscript {
    pub session_id: String,
    file_path: PathBuf,
}

impl SessionTranscript {
    /// A transcript in `dir`, or in the platform data directory.
    pub fn new(dir: Option<&Path>) -> Self {
        let session_id = uuid::Uuid::new_v4().to_string();
        let dir = dir.map(Path::to_path_buf).unwrap_or_else(data_dir_or_cwd);
        let file_path = dir.join(format!("session_{session_id}.jsonl"));
        Self {
            session_id,
            file_path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Append one entry as a JSON line.
    pub fn append(&self, entry: &TranscriptEntry) -> PilotResult<()> {
        if let Some(parent) = self.file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let line = serde_json::to_string(entry)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;
        writeln!(file, "{line}")?;
        tracing::debug!(
            path = %self.file_path.display(),
            iteration = entry.iteration,
            "transcript entry written"
        );
        Ok(())
    }
}

/// `<data_local_dir>/visionpilot/sessions`, or the working directory.
fn data_dir_or_cwd() -> PathBuf {
    match dirs::data_local_dir() {
        Some(base) => base.join("visionpilot").join("sessions"),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}
