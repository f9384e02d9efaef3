//! Bounded outcome history.
//!
//! A FIFO ring of past attempt outcomes, capacity 500 by default. The ring
//! feeds the confidence scorer's historical view and can be persisted as a
//! JSON array. The in-memory buffer is the source of truth between saves;
//! `save` writes to a temporary file in the target directory and renames it
//! over the destination, so a crash mid-write never leaves a truncated
//! history. Loading a missing file yields an empty buffer, not an error.

use std::collections::VecDeque;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::breaker::ErrorClass;
use crate::config::EngineConfig;
use crate::error::EngineError;

/// One recorded attempt outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    /// Lineage the attempt belonged to.
    pub patch_id: String,
    /// Error class of the attempt.
    pub class: ErrorClass,
    /// Whether the sandbox reported success.
    pub success: bool,
    /// Overall confidence at execution time.
    pub confidence: f64,
    /// When the outcome was recorded.
    pub timestamp: DateTime<Utc>,
}

/// Bounded FIFO history of outcomes.
#[derive(Debug, Clone)]
pub struct OutcomeMemory {
    capacity: usize,
    records: VecDeque<OutcomeRecord>,
}

impl OutcomeMemory {
    /// Creates an empty history with the given capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: VecDeque::new(),
        }
    }

    /// Creates an empty history from engine policy.
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::with_capacity(config.memory_capacity)
    }

    /// Number of retained outcomes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if no outcomes are retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Retained outcomes, oldest first.
    pub fn records(&self) -> impl Iterator<Item = &OutcomeRecord> {
        self.records.iter()
    }

    /// Appends an outcome, evicting the oldest entry on overflow.
    pub fn push(&mut self, record: OutcomeRecord) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
        debug_assert!(self.records.len() <= self.capacity);
    }

    /// Atomically writes the full buffer to `path` as a JSON array.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Persistence`] if the temporary file cannot be
    /// created, written, or renamed into place.
    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        let persist_err = |source: std::io::Error| EngineError::Persistence {
            path: path.display().to_string(),
            source,
        };

        let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
        let mut tmp = match dir {
            Some(dir) => tempfile::NamedTempFile::new_in(dir),
            None => tempfile::NamedTempFile::new(),
        }
        .map_err(persist_err)?;

        let json = serde_json::to_vec_pretty(&self.records.iter().collect::<Vec<_>>())
            .map_err(|e| persist_err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        tmp.write_all(&json).map_err(persist_err)?;
        tmp.flush().map_err(persist_err)?;
        tmp.persist(path).map_err(|e| persist_err(e.error))?;

        tracing::debug!(path = %path.display(), records = self.records.len(), "outcome history saved");
        Ok(())
    }

    /// Loads a history from `path`, truncating to `capacity` (oldest
    /// entries dropped first).
    ///
    /// A missing file yields an empty history.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Persistence`] if the file exists but cannot
    /// be read or parsed.
    pub fn load(path: &Path, capacity: usize) -> Result<Self, EngineError> {
        let persist_err = |source: std::io::Error| EngineError::Persistence {
            path: path.display().to_string(),
            source,
        };

        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::with_capacity(capacity));
            },
            Err(e) => return Err(persist_err(e)),
        };

        let parsed: Vec<OutcomeRecord> = serde_json::from_slice(&bytes)
            .map_err(|e| persist_err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;

        let mut memory = Self::with_capacity(capacity);
        for record in parsed {
            memory.push(record);
        }
        Ok(memory)
    }
}
