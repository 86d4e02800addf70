//! Account roles.
//!
//! Every identity holds exactly one role, chosen at signup and stored on the
//! backend `profiles` record.

use serde::{Deserialize, Serialize};

/// Error returned when a role string is not one of the known roles.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct RoleError(pub String);

/// Account kind, one per identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Orders food from chefs and restaurants.
    Customer,
    /// Home chef selling dishes; must be vetted.
    Chef,
    /// Commercial kitchen renting space to chefs; must be vetted.
    KitchenPartner,
    /// Restaurant listing on the marketplace; must be vetted.
    Restaurant,
    /// Marketplace operator.
    Admin,
}

impl Role {
    /// All roles, in signup-form order.
    pub const ALL: [Self; 5] = [
        Self::Customer,
        Self::Chef,
        Self::KitchenPartner,
        Self::Restaurant,
        Self::Admin,
    ];

    /// Whether this role goes through an application review before its
    /// protected views unlock.
    #[must_use]
    pub const fn requires_application(self) -> bool {
        matches!(self, Self::Chef | Self::KitchenPartner | Self::Restaurant)
    }

    /// The snake_case name used by the backend.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Chef => "chef",
            Self::KitchenPartner => "kitchen_partner",
            Self::Restaurant => "restaurant",
            Self::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = RoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Self::Customer),
            "chef" => Ok(Self::Chef),
            "kitchen_partner" => Ok(Self::KitchenPartner),
            "restaurant" => Ok(Self::Restaurant),
            "admin" => Ok(Self::Admin),
            _ => Err(RoleError(s.to_owned())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_from_str() {
        for role in Role::ALL {
            assert_eq!(role.to_string().parse::<Role>().unwrap(), role);
        }
    }

    #[test]
    fn test_from_str_is_strict() {
        assert!("Chef".parse::<Role>().is_err());
        assert!("kitchen-partner".parse::<Role>().is_err());
        assert_eq!(
            "superuser".parse::<Role>(),
            Err(RoleError("superuser".to_owned()))
        );
    }

    #[test]
    fn test_vetted_roles() {
        assert!(Role::Chef.requires_application());
        assert!(Role::KitchenPartner.requires_application());
        assert!(Role::Restaurant.requires_application());
        assert!(!Role::Customer.requires_application());
        assert!(!Role::Admin.requires_application());
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&Role::KitchenPartner).unwrap();
        assert_eq!(json, "\"kitchen_partner\"");
    }
}
