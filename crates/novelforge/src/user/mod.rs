//! Users, roles, tiers and notification preferences.

mod service;
pub mod tier;

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::db::value::{impl_text_column, ParseEnumError};

pub use service::UserService;
pub use tier::{tier_formats, tier_priority};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Admin,
    User,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "ADMIN",
            UserRole::User => "USER",
        }
    }
}

impl FromStr for UserRole {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADMIN" => Ok(UserRole::Admin),
            "USER" => Ok(UserRole::User),
            other => Err(ParseEnumError::new("user role", other)),
        }
    }
}

impl_text_column!(UserRole);

/// Subscription tier. Drives job priority and the formats a full novel
/// download is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserTier {
    Basic,
    Premium,
    Vip,
}

impl UserTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserTier::Basic => "BASIC",
            UserTier::Premium => "PREMIUM",
            UserTier::Vip => "VIP",
        }
    }
}

impl fmt::Display for UserTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserTier {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BASIC" => Ok(UserTier::Basic),
            "PREMIUM" => Ok(UserTier::Premium),
            "VIP" => Ok(UserTier::Vip),
            other => Err(ParseEnumError::new("user tier", other)),
        }
    }
}

impl_text_column!(UserTier);

/// Events a user can opt in to receive mail for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotifyItem {
    JobRunning,
    JobSuccess,
    JobFailure,
    ArtifactReady,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub tier: UserTier,
    pub is_active: bool,
    pub notify: BTreeSet<NotifyItem>,
    pub created_at: i64,
}

impl User {
    pub fn new(name: &str, email: &str, role: UserRole, tier: UserTier) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            email: email.to_string(),
            role,
            tier,
            is_active: true,
            notify: BTreeSet::new(),
            created_at: crate::clock::now_millis(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Owners and administrators may mutate a job.
    pub fn can_manage(&self, owner_id: &str) -> bool {
        self.is_admin() || self.id == owner_id
    }

    pub fn wants(&self, item: NotifyItem) -> bool {
        self.is_active && self.notify.contains(&item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_manage() {
        let owner = User::new("a", "a@example.com", UserRole::User, UserTier::Basic);
        let other = User::new("b", "b@example.com", UserRole::User, UserTier::Basic);
        let admin = User::new("c", "c@example.com", UserRole::Admin, UserTier::Basic);

        assert!(owner.can_manage(&owner.id));
        assert!(!other.can_manage(&owner.id));
        assert!(admin.can_manage(&owner.id));
    }

    #[test]
    fn test_wants_respects_active_flag() {
        let mut user = User::new("a", "a@example.com", UserRole::User, UserTier::Vip);
        user.notify.insert(NotifyItem::JobSuccess);
        assert!(user.wants(NotifyItem::JobSuccess));
        assert!(!user.wants(NotifyItem::JobFailure));

        user.is_active = false;
        assert!(!user.wants(NotifyItem::JobSuccess));
    }

    #[test]
    fn test_tier_round_trip() {
        for tier in [UserTier::Basic, UserTier::Premium, UserTier::Vip] {
            assert_eq!(tier.as_str().parse::<UserTier>().unwrap(), tier);
        }
        assert!("GOLD".parse::<UserTier>().is_err());
    }
}
