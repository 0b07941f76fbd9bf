use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a crawl run as recorded in the checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Error,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Error => "error",
            Self::Failed => "failed",
        }
    }

    /// Process exit code for a run that ended in this status
    ///
    /// A graceful interrupt exits with 130 so wrappers can tell it apart
    /// from a crash.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Running | Self::Completed => 0,
            Self::Interrupted => 130,
            Self::Error | Self::Failed => 1,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
