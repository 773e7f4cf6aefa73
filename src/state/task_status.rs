/// Per-ID task status reported in progress lines
use std::fmt;

/// How one ID's task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    /// A full record was produced
    Found,

    /// A deleted/access-denied entry was written as a minimal record
    RecordedRemoved,

    /// A deleted/access-denied/unparseable entry was added to the forbidden list
    Forbidden,

    /// The ID is past the last real entry
    BoundaryReached,

    /// Transport failure; the ID may succeed in a later run
    NetworkError,

    /// The blank-page ladder was exhausted
    BanSuspected,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Found => "found",
            Self::RecordedRemoved => "recorded_removed",
            Self::Forbidden => "skipped_forbidden",
            Self::BoundaryReached => "boundary_reached",
            Self::NetworkError => "network_error",
            Self::BanSuspected => "ban_suspected",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(TaskStatus::Forbidden.to_string(), "skipped_forbidden");
        assert_eq!(TaskStatus::Found.to_string(), "found");
    }
}
