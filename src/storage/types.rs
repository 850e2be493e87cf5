use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Another instance of the application has locked the database
    #[error("Another instance of curator appears to be running. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// A review decision that the lifecycle does not allow
    #[error("Cannot move item {item_id} from {from} to {to}")]
    InvalidTransition {
        item_id: String,
        from: CurationState,
        to: CurationState,
    },

    /// No curated item with this identity
    #[error("No curated item with id {0}")]
    NotFound(String),

    /// A stored state value outside the known lifecycle
    #[error("Unknown curation state value {0}")]
    InvalidState(i64),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5), SQLITE_LOCKED (6), SQLITE_CANTOPEN (14)
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::Other(err)
    }
}

// ============================================================================
// Curation Lifecycle
// ============================================================================

/// Review state of a curated item.
///
/// Stored as its integer discriminant. Only `Unscreened` is ever assigned by
/// the curation scheduler; every other state is an external review decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CurationState {
    Unscreened = 0,
    Approved = 1,
    Rejected = 2,
    Deferred = 3,
    Published = 4,
    Expired = 5,
}

impl CurationState {
    pub const ALL: [CurationState; 6] = [
        CurationState::Unscreened,
        CurationState::Approved,
        CurationState::Rejected,
        CurationState::Deferred,
        CurationState::Published,
        CurationState::Expired,
    ];

    pub fn as_i64(self) -> i64 {
        self as i64
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CurationState::Unscreened => "unscreened",
            CurationState::Approved => "approved",
            CurationState::Rejected => "rejected",
            CurationState::Deferred => "deferred",
            CurationState::Published => "published",
            CurationState::Expired => "expired",
        }
    }

    /// No further review decision applies.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CurationState::Rejected | CurationState::Published | CurationState::Expired
        )
    }

    /// Whether a reviewer may move an item from `self` to `to`.
    pub fn can_transition_to(self, to: CurationState) -> bool {
        use CurationState::*;
        match (self, to) {
            (Unscreened, Approved | Rejected | Deferred) => true,
            (Deferred, Approved | Rejected) => true,
            (Approved, Published) => true,
            (from, Expired) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl TryFrom<i64> for CurationState {
    type Error = DatabaseError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        CurationState::ALL
            .into_iter()
            .find(|s| s.as_i64() == value)
            .ok_or(DatabaseError::InvalidState(value))
    }
}

impl FromStr for CurationState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        CurationState::ALL
            .into_iter()
            .find(|state| state.as_str() == wanted)
            .ok_or_else(|| {
                format!(
                    "unknown state '{}' (expected one of: {})",
                    s,
                    CurationState::ALL.map(|s| s.as_str()).join(", ")
                )
            })
    }
}

impl fmt::Display for CurationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Input Types
// ============================================================================

/// An account resolved through the platform's user lookup, ready to store.
#[derive(Debug, Clone)]
pub struct NewSource {
    pub user_id: String,
    pub handle: String,
    pub display_name: Option<String>,
}

/// A quote to import. Deserializes from a `[[quote]]` TOML table.
#[derive(Debug, Clone, Deserialize)]
pub struct NewQuote {
    pub author: String,
    pub text: String,
    #[serde(default)]
    pub source: Option<String>,
}

/// Counts reported by [`super::Database::merge_selection`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Newly created `Unscreened` items
    pub inserted: usize,
    /// Still-`Unscreened` items whose `selected_at` was refreshed
    pub refreshed: usize,
    /// Items past `Unscreened`, left exactly as they were
    pub untouched: usize,
}

// ============================================================================
// Data Structures
// ============================================================================

/// A followed account.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Source {
    pub id: i64,
    pub user_id: String,
    pub handle: String,
    pub display_name: Option<String>,
    pub last_checked_at: Option<i64>,
}

/// A fetched post. Counters are `None` when the platform did not report them.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ContentItem {
    pub id: String,
    pub created_at: Option<String>,
    pub text: String,
    pub reply_count: Option<i64>,
    pub repost_count: Option<i64>,
    pub favorite_count: Option<i64>,
    pub quote_count: Option<i64>,
}

impl ContentItem {
    /// Engagement score: favorites plus reposts, absent counters as zero.
    pub fn score(&self) -> i64 {
        self.favorite_count
            .unwrap_or(0)
            .saturating_add(self.repost_count.unwrap_or(0))
    }
}

/// A content item selected for review, joined with its source and content.
#[derive(Debug, Clone)]
pub struct CuratedItem {
    pub id: i64,
    pub item_id: String,
    pub source_id: i64,
    pub handle: String,
    pub state: CurationState,
    pub selected_at: Option<i64>,
    pub checked_at: Option<i64>,
    pub published_at: Option<i64>,
    pub text: String,
    pub created_at: Option<String>,
    pub favorite_count: Option<i64>,
    pub repost_count: Option<i64>,
}

/// Internal row type for curated item queries; the state column is validated
/// on conversion.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct CuratedRow {
    pub id: i64,
    pub item_id: String,
    pub source_id: i64,
    pub handle: String,
    pub state: i64,
    pub selected_at: Option<i64>,
    pub checked_at: Option<i64>,
    pub published_at: Option<i64>,
    pub text: String,
    pub created_at: Option<String>,
    pub favorite_count: Option<i64>,
    pub repost_count: Option<i64>,
}

impl CuratedRow {
    pub(crate) fn into_curated(self) -> Result<CuratedItem, DatabaseError> {
        Ok(CuratedItem {
            id: self.id,
            item_id: self.item_id,
            source_id: self.source_id,
            handle: self.handle,
            state: CurationState::try_from(self.state)?,
            selected_at: self.selected_at,
            checked_at: self.checked_at,
            published_at: self.published_at,
            text: self.text,
            created_at: self.created_at,
            favorite_count: self.favorite_count,
            repost_count: self.repost_count,
        })
    }
}

/// A static quote for outbound publishing.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Quote {
    pub id: i64,
    pub author: String,
    pub text: String,
    pub source: Option<String>,
    pub last_published_at: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use CurationState::*;

    #[test]
    fn test_state_roundtrips_through_storage_value() {
        for state in CurationState::ALL {
            assert_eq!(CurationState::try_from(state.as_i64()).unwrap(), state);
        }
        assert!(matches!(
            CurationState::try_from(9),
            Err(DatabaseError::InvalidState(9))
        ));
    }

    #[test]
    fn test_state_parses_case_insensitively() {
        assert_eq!("Approved".parse::<CurationState>().unwrap(), Approved);
        assert_eq!(" deferred ".parse::<CurationState>().unwrap(), Deferred);
        assert!("maybe".parse::<CurationState>().is_err());
    }

    #[test]
    fn test_lifecycle_transitions() {
        assert!(Unscreened.can_transition_to(Approved));
        assert!(Unscreened.can_transition_to(Rejected));
        assert!(Unscreened.can_transition_to(Deferred));
        assert!(Deferred.can_transition_to(Approved));
        assert!(Approved.can_transition_to(Published));
        assert!(Approved.can_transition_to(Expired));
        assert!(Unscreened.can_transition_to(Expired));

        assert!(!Unscreened.can_transition_to(Published));
        assert!(!Approved.can_transition_to(Unscreened));
        assert!(!Published.can_transition_to(Expired));
        assert!(!Rejected.can_transition_to(Approved));
        assert!(!Expired.can_transition_to(Expired));
    }

    #[test]
    fn test_score_treats_absent_counters_as_zero() {
        let item = ContentItem {
            id: "1".into(),
            created_at: None,
            text: String::new(),
            reply_count: Some(100),
            repost_count: None,
            favorite_count: Some(4),
            quote_count: Some(100),
        };
        assert_eq!(item.score(), 4);
    }
}
