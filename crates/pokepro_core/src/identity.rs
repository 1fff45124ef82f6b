use serde::{Deserialize, Serialize};
use std::fmt;

/// QQ user number as carried by OneBot.
pub type UserId = i64;
/// QQ group number as carried by OneBot.
pub type GroupId = i64;

/// Where an action happens: inside a group, or one-to-one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    Direct,
    Group(GroupId),
}

impl Scope {
    /// Collapse an optional group id into a scope. A missing or zero
    /// (or negative) group id is a direct scope.
    pub fn from_group(group_id: Option<GroupId>) -> Self {
        match group_id {
            Some(gid) if gid > 0 => Scope::Group(gid),
            _ => Scope::Direct,
        }
    }

    pub fn group_id(&self) -> Option<GroupId> {
        match self {
            Scope::Group(gid) => Some(*gid),
            Scope::Direct => None,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Scope::Group(_))
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Direct => write!(f, "direct"),
            Scope::Group(gid) => write!(f, "group:{}", gid),
        }
    }
}

/// Cooldown key: one user inside one scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    pub scope: Scope,
    pub user: UserId,
}

impl IdentityKey {
    pub fn new(scope: Scope, user: UserId) -> Self {
        Self { scope, user }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_and_zero_group_collapse_to_direct() {
        assert_eq!(Scope::from_group(None), Scope::Direct);
        assert_eq!(Scope::from_group(Some(0)), Scope::Direct);
        assert_eq!(Scope::from_group(Some(42)), Scope::Group(42));
    }

    #[test]
    fn test_identity_key_equality_by_value() {
        let a = IdentityKey::new(Scope::from_group(None), 7);
        let b = IdentityKey::new(Scope::from_group(Some(0)), 7);
        assert_eq!(a, b);
        assert_ne!(a, IdentityKey::new(Scope::Group(1), 7));
    }

    #[test]
    fn test_scope_display() {
        assert_eq!(Scope::Group(123).to_string(), "group:123");
        assert_eq!(Scope::Direct.to_string(), "direct");
    }
}
