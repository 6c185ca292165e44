use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a message record in the processing/retry lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueStatus {
    /// Accepted, no processing attempt has completed yet
    Untried,
    /// A processor handled the message successfully
    Processed,
    /// Terminal failure: permanent error, no route, or retries exhausted
    Failed,
    /// Transient failure, waiting for the retry scheduler
    QueuedForRetry,
}

impl QueueStatus {
    pub const ALL: [QueueStatus; 4] = [
        Self::Untried,
        Self::Processed,
        Self::Failed,
        Self::QueuedForRetry,
    ];

    /// Check if this is a terminal state (no automatic transitions out)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Processed | Self::Failed)
    }

    /// Check if a processing attempt may start from this state
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Untried | Self::QueuedForRetry)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Untried => "UNTRIED",
            Self::Processed => "PROCESSED",
            Self::Failed => "FAILED",
            Self::QueuedForRetry => "QUEUED_FOR_RETRY",
        }
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for QueueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UNTRIED" => Ok(Self::Untried),
            "PROCESSED" => Ok(Self::Processed),
            "FAILED" => Ok(Self::Failed),
            "QUEUED_FOR_RETRY" => Ok(Self::QueuedForRetry),
            _ => Err(format!("Invalid queue status: {s}")),
        }
    }
}

/// Default state for new message records
impl Default for QueueStatus {
    fn default() -> Self {
        Self::Untried
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_check() {
        assert!(QueueStatus::Processed.is_terminal());
        assert!(QueueStatus::Failed.is_terminal());
        assert!(!QueueStatus::Untried.is_terminal());
        assert!(!QueueStatus::QueuedForRetry.is_terminal());
    }

    #[test]
    fn test_status_string_conversion() {
        for status in QueueStatus::ALL {
            assert_eq!(status.to_string().parse::<QueueStatus>().unwrap(), status);
        }
        assert!("queued".parse::<QueueStatus>().is_err());
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&QueueStatus::QueuedForRetry).unwrap();
        assert_eq!(json, "\"QUEUED_FOR_RETRY\"");

        let parsed: QueueStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, QueueStatus::QueuedForRetry);
    }
}
