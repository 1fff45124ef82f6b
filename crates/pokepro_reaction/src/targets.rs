//! Normalization of loosely typed poke targets.

use pokepro_core::UserId;
use serde::Deserialize;

/// A target as it arrives from upstream: a number, or text that may or may
/// not contain one.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RawTarget {
    Number(i64),
    Text(String),
}

impl From<i64> for RawTarget {
    fn from(v: i64) -> Self {
        RawTarget::Number(v)
    }
}

impl From<&str> for RawTarget {
    fn from(v: &str) -> Self {
        RawTarget::Text(v.to_string())
    }
}

impl From<String> for RawTarget {
    fn from(v: String) -> Self {
        RawTarget::Text(v)
    }
}

impl From<&i64> for RawTarget {
    fn from(v: &i64) -> Self {
        RawTarget::Number(*v)
    }
}

impl RawTarget {
    /// Non-negative integer value, if this entry carries one.
    pub fn as_user_id(&self) -> Option<UserId> {
        match self {
            RawTarget::Number(n) if *n >= 0 => Some(*n),
            RawTarget::Number(_) => None,
            RawTarget::Text(s) => {
                let s = s.trim();
                if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                s.parse().ok()
            }
        }
    }
}

/// Validated, duplicate-free user ids in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetSet(Vec<UserId>);

impl TargetSet {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, UserId> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[UserId] {
        &self.0
    }
}

impl<'a> IntoIterator for &'a TargetSet {
    type Item = &'a UserId;
    type IntoIter = std::slice::Iter<'a, UserId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Turn raw targets into a [`TargetSet`].
///
/// Non-numeric entries are dropped silently, `exclude_self` is removed, and
/// duplicates keep their first position. An empty result is valid.
pub fn normalize<I, T>(raw_targets: I, exclude_self: Option<UserId>) -> TargetSet
where
    I: IntoIterator<Item = T>,
    T: Into<RawTarget>,
{
    let mut out: Vec<UserId> = Vec::new();
    for raw in raw_targets {
        let Some(id) = raw.into().as_user_id() else {
            continue;
        };
        if exclude_self == Some(id) || out.contains(&id) {
            continue;
        }
        out.push(id);
    }
    TargetSet(out)
}

/// Convenience for a single scalar target.
pub fn normalize_one(raw: impl Into<RawTarget>, exclude_self: Option<UserId>) -> TargetSet {
    normalize(std::iter::once(raw.into()), exclude_self)
}
