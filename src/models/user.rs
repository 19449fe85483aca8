//! User account model for storage and API.

use serde::{Deserialize, Serialize};

/// Which sides of a scan a user may stand on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Presents a reward code, earns points.
    User,
    /// Scans codes and awards points.
    Collector,
    /// Authorized for both sides.
    Both,
}

impl Role {
    /// Whether this role may submit scans.
    pub fn can_collect(self) -> bool {
        matches!(self, Role::Collector | Role::Both)
    }

    /// Wire name, matching the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Collector => "collector",
            Role::Both => "both",
        }
    }
}

/// User account stored under `user/<userId>`.
///
/// `points` is the single source of truth for the balance; it is mutated
/// only by the award path's credit or by session bootstrap/restore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    /// Stable unique user ID
    pub user_id: String,
    /// Display name
    pub name: String,
    /// Community/society the user belongs to (opaque to the core)
    pub society: Option<String>,
    /// Email address (opaque to the core)
    pub email: Option<String>,
    /// Role assigned by the identity collaborator
    pub role: Role,
    /// Reward point balance (non-negative)
    #[serde(default)]
    pub points: u64,
}
