use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppStatus {
    #[default]
    Idle,
    Analyzing,
    Generating,
    Complete,
    Error,
}

impl AppStatus {
    /// A generation pipeline may only start from these states.
    pub fn can_start_generation(self) -> bool {
        matches!(self, AppStatus::Idle | AppStatus::Error)
    }

    pub fn is_in_flight(self) -> bool {
        matches!(self, AppStatus::Analyzing | AppStatus::Generating)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AppStatus::Idle => "IDLE",
            AppStatus::Analyzing => "ANALYZING",
            AppStatus::Generating => "GENERATING",
            AppStatus::Complete => "COMPLETE",
            AppStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for AppStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
