use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Lifecycle of a remote generation job. Ordering follows the only legal
/// direction of travel; `Done` and `Error` share the terminal rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Error,
}

impl JobStatus {
    pub fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Running => 1,
            Self::Done | Self::Error => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    /// Whether moving from `self` to `next` keeps the state machine monotonic.
    pub fn can_advance_to(self, next: JobStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Error => "error",
        }
    }

    /// Maps the backend's status vocabulary. Unknown words mean the job is
    /// still being worked on.
    pub fn from_wire(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" | "queued" | "created" => Self::Pending,
            "done" | "completed" | "complete" | "succeeded" | "success" => Self::Done,
            "error" | "failed" | "failure" | "cancelled" | "canceled" => Self::Error,
            _ => Self::Running,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for JobStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for JobStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_wire(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::JobStatus;

    #[test]
    fn wire_vocabulary_maps_onto_four_states() {
        assert_eq!(JobStatus::from_wire("QUEUED"), JobStatus::Pending);
        assert_eq!(JobStatus::from_wire("processing"), JobStatus::Running);
        assert_eq!(JobStatus::from_wire("in_progress"), JobStatus::Running);
        assert_eq!(JobStatus::from_wire("completed"), JobStatus::Done);
        assert_eq!(JobStatus::from_wire("failed"), JobStatus::Error);
        assert_eq!(JobStatus::from_wire("something-new"), JobStatus::Running);
    }

    #[test]
    fn only_forward_moves_are_allowed() {
        assert!(JobStatus::Pending.can_advance_to(JobStatus::Running));
        assert!(JobStatus::Pending.can_advance_to(JobStatus::Done));
        assert!(JobStatus::Running.can_advance_to(JobStatus::Error));
        assert!(!JobStatus::Running.can_advance_to(JobStatus::Pending));
        assert!(!JobStatus::Running.can_advance_to(JobStatus::Running));
        assert!(!JobStatus::Done.can_advance_to(JobStatus::Error));
        assert!(!JobStatus::Error.can_advance_to(JobStatus::Done));
    }
}
