//! Inbound notifications and the normalized poke view derived from them.

use crate::identity::{GroupId, Scope, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Flags attached to an event by this process, never by the platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventExtras {
    /// Set on events that were produced from a poke and pushed back into
    /// the pipeline, so they are not reacted to a second time.
    pub poke_handled: bool,
}

/// A raw notification as delivered by the platform, plus local extras.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub raw: Value,
    pub extras: EventExtras,
}

impl InboundEvent {
    pub fn new(raw: Value) -> Self {
        Self {
            raw,
            extras: EventExtras::default(),
        }
    }

    pub fn with_extras(raw: Value, extras: EventExtras) -> Self {
        Self { raw, extras }
    }
}

/// Who caused this poke to reach us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOrigin {
    /// Someone else poked.
    Peer,
    /// The platform echoing a poke the bot itself sent.
    SelfEcho,
    /// An event this process already handled and re-queued.
    Redispatched,
}

/// Normalized view of a OneBot `notice/notify/poke` notification.
#[derive(Debug, Clone, PartialEq)]
pub struct PokeEvent {
    pub time: i64,
    pub self_id: UserId,
    pub user_id: UserId,
    pub target_id: UserId,
    pub group_id: Option<GroupId>,
    pub raw_info: Vec<Value>,
    pub origin: EventOrigin,
}

impl PokeEvent {
    /// Parse an inbound event. Returns `None` for anything that is not a poke
    /// notification, including pokes missing `user_id` or `target_id`. Other
    /// malformed ids default to zero.
    pub fn parse(event: &InboundEvent) -> Option<Self> {
        let raw = event.raw.as_object()?;

        if raw.get("post_type").and_then(Value::as_str) != Some("notice") {
            return None;
        }
        if raw.get("notice_type").and_then(Value::as_str) != Some("notify") {
            return None;
        }
        if raw.get("sub_type").and_then(Value::as_str) != Some("poke") {
            return None;
        }

        let id = |key: &str| raw.get(key).and_then(value_as_i64).unwrap_or(0);
        let self_id = id("self_id");
        // Without both parties there is nobody to react to.
        let user_id = raw.get("user_id").and_then(value_as_i64)?;
        let target_id = raw.get("target_id").and_then(value_as_i64)?;
        let group_id = raw.get("group_id").and_then(value_as_i64).filter(|g| *g > 0);

        let origin = if event.extras.poke_handled {
            EventOrigin::Redispatched
        } else if user_id == self_id {
            EventOrigin::SelfEcho
        } else {
            EventOrigin::Peer
        };

        Some(Self {
            time: id("time"),
            self_id,
            user_id,
            target_id,
            group_id,
            raw_info: raw
                .get("raw_info")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            origin,
        })
    }

    /// The bot itself is the one being poked.
    pub fn is_self_poked(&self) -> bool {
        self.target_id == self.self_id
    }

    /// The bot sent this poke (echoed back by the platform).
    pub fn is_self_originated(&self) -> bool {
        self.user_id == self.self_id
    }

    pub fn is_group(&self) -> bool {
        self.scope().is_group()
    }

    pub fn scope(&self) -> Scope {
        Scope::from_group(self.group_id)
    }
}

/// OneBot implementations disagree on whether ids are numbers or strings.
fn value_as_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn poke_raw() -> Value {
        json!({
            "time": 1770684953,
            "self_id": 1959676873i64,
            "post_type": "notice",
            "notice_type": "notify",
            "sub_type": "poke",
            "target_id": 1959676873i64,
            "user_id": 2936169201i64,
            "group_id": 952212291,
            "raw_info": [
                {"col": "1", "nm": "", "type": "qq", "uid": "u_QmVcCfvoEUKZv6rb2WM7Lw"},
                {"txt": "的服务器", "type": "nor"}
            ]
        })
    }

    #[test]
    fn test_parse_group_poke() {
        let evt = PokeEvent::parse(&InboundEvent::new(poke_raw())).unwrap();
        assert_eq!(evt.user_id, 2936169201);
        assert_eq!(evt.group_id, Some(952212291));
        assert_eq!(evt.raw_info.len(), 2);
        assert!(evt.is_self_poked());
        assert!(!evt.is_self_originated());
        assert!(evt.is_group());
        assert_eq!(evt.origin, EventOrigin::Peer);
    }

    #[test]
    fn test_parse_rejects_other_notices() {
        let mut raw = poke_raw();
        raw["sub_type"] = json!("lucky_king");
        assert!(PokeEvent::parse(&InboundEvent::new(raw)).is_none());

        let msg = json!({"post_type": "message", "message_type": "group"});
        assert!(PokeEvent::parse(&InboundEvent::new(msg)).is_none());
        assert!(PokeEvent::parse(&InboundEvent::new(json!("poke"))).is_none());
    }

    #[test]
    fn test_private_poke_has_direct_scope() {
        let mut raw = poke_raw();
        raw.as_object_mut().unwrap().remove("group_id");
        let evt = PokeEvent::parse(&InboundEvent::new(raw)).unwrap();
        assert_eq!(evt.scope(), Scope::Direct);

        let mut raw = poke_raw();
        raw["group_id"] = json!(0);
        let evt = PokeEvent::parse(&InboundEvent::new(raw)).unwrap();
        assert!(!evt.is_group());
    }

    #[test]
    fn test_origin_classification() {
        let mut raw = poke_raw();
        raw["user_id"] = raw["self_id"].clone();
        let evt = PokeEvent::parse(&InboundEvent::new(raw.clone())).unwrap();
        assert_eq!(evt.origin, EventOrigin::SelfEcho);

        // The handled flag wins over identity comparison.
        let extras = EventExtras { poke_handled: true };
        let evt = PokeEvent::parse(&InboundEvent::with_extras(raw, extras)).unwrap();
        assert_eq!(evt.origin, EventOrigin::Redispatched);
    }

    #[test]
    fn test_missing_parties_are_not_a_poke() {
        for key in ["target_id", "user_id"] {
            let mut raw = poke_raw();
            raw.as_object_mut().unwrap().remove(key);
            assert!(PokeEvent::parse(&InboundEvent::new(raw)).is_none(), "{} missing", key);
        }
        let mut raw = poke_raw();
        raw["target_id"] = json!("nobody");
        assert!(PokeEvent::parse(&InboundEvent::new(raw)).is_none());
    }

    #[test]
    fn test_string_ids_are_accepted() {
        let mut raw = poke_raw();
        raw["user_id"] = json!("12345");
        raw["group_id"] = json!("678");
        let evt = PokeEvent::parse(&InboundEvent::new(raw)).unwrap();
        assert_eq!(evt.user_id, 12345);
        assert_eq!(evt.scope(), Scope::Group(678));
    }
}
