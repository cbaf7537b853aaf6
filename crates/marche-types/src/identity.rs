//! Identity types for the escrow engine
//!
//! All identity types are strongly typed wrappers around UUIDs to prevent
//! accidental mixing of an order id with an escrow id or a user id.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Macro to generate ID types with common implementations
macro_rules! define_id_type {
    ($name:ident, $prefix:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new random ID
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create from an existing UUID
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Parse from a string (with or without prefix)
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                let s = s.strip_prefix(concat!($prefix, "_")).unwrap_or(s);
                Ok(Self(Uuid::parse_str(s)?))
            }

            /// Get the inner UUID
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", $prefix, self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl AsRef<Uuid> for $name {
            fn as_ref(&self) -> &Uuid {
                &self.0
            }
        }
    };
}

define_id_type!(EscrowId, "escrow", "Unique identifier for an escrow transaction");
define_id_type!(OrderId, "order", "Identifier of the originating marketplace order");
define_id_type!(UserId, "user", "Identifier of a platform user (customer, seller, staff)");
define_id_type!(AuditEntryId, "audit", "Unique identifier for an audit log entry");

/// Wallet account that can receive a credit
///
/// User accounts are derived from the user id; the platform commission
/// account is a configured, well-known name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub String);

impl AccountId {
    /// Default name of the platform commission account
    pub const DEFAULT_PLATFORM: &'static str = "platform";

    /// Wallet account owned by a user
    pub fn for_user(user: &UserId) -> Self {
        Self(user.to_string())
    }

    /// Platform commission account with the default name
    pub fn platform() -> Self {
        Self(Self::DEFAULT_PLATFORM.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_display_and_parse() {
        let id = EscrowId::new();
        let shown = id.to_string();
        assert!(shown.starts_with("escrow_"));
        assert_eq!(EscrowId::parse(&shown).unwrap(), id);
        assert_eq!(EscrowId::parse(&id.0.to_string()).unwrap(), id);
    }

    #[test]
    fn test_ids_serialize_as_bare_uuid() {
        let id = OrderId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.0));
    }

    #[test]
    fn test_user_account() {
        let user = UserId::new();
        assert_eq!(AccountId::for_user(&user).as_str(), user.to_string());
        assert_eq!(AccountId::platform().as_str(), "platform");
    }
}
