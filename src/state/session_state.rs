/// Session status and phase definitions
///
/// A session only ever moves from `Running` to one of the terminal states.
use std::fmt;

/// Lifecycle status of a crawl session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    /// Tasks for the phase are still being issued or drained
    Running,

    /// All tasks produced an outcome; item-level failures are allowed
    Completed,

    /// A structural prerequisite of the phase failed
    Failed,
}

impl SessionStatus {
    /// Returns true if this is a terminal status
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }

    /// Returns true if a session may move from `self` to `next`
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        matches!(
            (self, next),
            (Self::Running, Self::Completed) | (Self::Running, Self::Failed)
        )
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Self::Running => 0,
            Self::Completed => 1,
            Self::Failed => 2,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Completed,
            2 => Self::Failed,
            _ => Self::Running,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Which part of the crawl a session covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhaseKind {
    /// Phase 1: category and listing discovery
    Listing,

    /// Phase 2 restricted to product snapshots
    Product,

    /// Phase 2 restricted to review pagination
    Review,

    /// Phase 2 with products followed by their reviews
    Combined,
}

impl PhaseKind {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Listing => "listing",
            Self::Product => "product",
            Self::Review => "review",
            Self::Combined => "combined",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "listing" => Some(Self::Listing),
            "product" => Some(Self::Product),
            "review" => Some(Self::Review),
            "combined" => Some(Self::Combined),
            _ => None,
        }
    }

    /// Returns true if product detail tasks run in this phase
    pub fn fetches_products(&self) -> bool {
        matches!(self, Self::Product | Self::Combined)
    }

    /// Returns true if review pagination tasks run in this phase
    pub fn fetches_reviews(&self) -> bool {
        matches!(self, Self::Review | Self::Combined)
    }
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
