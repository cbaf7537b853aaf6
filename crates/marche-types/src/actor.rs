//! Acting identities
//!
//! Identity and role are supplied by the authentication collaborator; the
//! engine only compares them.

use crate::{UserId, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Role of the acting identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Seller,
    Admin,
    /// Staff allowed to rule on disputes
    Adjudicator,
    /// Schedulers and webhooks
    System,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Self::Customer,
        Self::Seller,
        Self::Admin,
        Self::Adjudicator,
        Self::System,
    ];

    /// May rule on disputes
    pub fn can_adjudicate(&self) -> bool {
        matches!(self, Self::Admin | Self::Adjudicator)
    }

    pub fn is_staff(&self) -> bool {
        matches!(self, Self::Admin | Self::Adjudicator | Self::System)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Seller => "seller",
            Self::Admin => "admin",
            Self::Adjudicator => "adjudicator",
            Self::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownVariant {
                kind: "role",
                value: s.to_string(),
            })
    }
}

/// Who is performing an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn customer(user_id: UserId) -> Self {
        Self::new(user_id, Role::Customer)
    }

    pub fn seller(user_id: UserId) -> Self {
        Self::new(user_id, Role::Seller)
    }

    pub fn admin(user_id: UserId) -> Self {
        Self::new(user_id, Role::Admin)
    }

    pub fn adjudicator(user_id: UserId) -> Self {
        Self::new(user_id, Role::Adjudicator)
    }

    /// The scheduler identity. Same rules as any caller, no extra privilege.
    pub fn system() -> Self {
        Self::new(UserId::from_uuid(Uuid::nil()), Role::System)
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.role, self.user_id)
    }
}
