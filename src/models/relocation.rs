use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Phase of a data-folder relocation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RelocationPhase {
    Preparing,
    Copying,
    Finalizing,
    Completed,
    Failed,
}

impl RelocationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelocationPhase::Preparing => "preparing",
            RelocationPhase::Copying => "copying",
            RelocationPhase::Finalizing => "finalizing",
            RelocationPhase::Completed => "completed",
            RelocationPhase::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RelocationPhase::Completed | RelocationPhase::Failed)
    }
}

/// Progress of a relocation run, streamed to the UI after every change
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelocationStatus {
    pub phase: RelocationPhase,
    /// Path relative to the data root, e.g. `files/papers/smith2020/paper.pdf`
    pub current_file: Option<PathBuf>,
    pub total_files: u64,
    pub processed_files: u64,
    pub error: Option<String>,
}

impl RelocationStatus {
    pub fn preparing() -> Self {
        Self {
            phase: RelocationPhase::Preparing,
            current_file: None,
            total_files: 0,
            processed_files: 0,
            error: None,
        }
    }

    /// Percentage for progress bars, capped at 100
    pub fn percent(&self) -> u8 {
        if self.total_files == 0 {
            return if self.phase == RelocationPhase::Completed { 100 } else { 0 };
        }
        let pct = self.processed_files.saturating_mul(100) / self.total_files;
        pct.min(100) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_serializes_lowercase() {
        let json = serde_json::to_string(&RelocationPhase::Finalizing).unwrap();
        assert_eq!(json, "\"finalizing\"");
    }

    #[test]
    fn test_percent() {
        let mut status = RelocationStatus::preparing();
        assert_eq!(status.percent(), 0);

        status.phase = RelocationPhase::Copying;
        status.total_files = 3;
        status.processed_files = 1;
        assert_eq!(status.percent(), 33);

        status.phase = RelocationPhase::Completed;
        status.total_files = 0;
        status.processed_files = 0;
        assert_eq!(status.percent(), 100);
    }
}
