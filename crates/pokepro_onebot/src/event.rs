//! OneBot v11 wire types.

use pokepro_core::{GroupId, MemberInfo, Reply, UserId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;

/// One text frame received from the implementation.
#[derive(Debug, Clone)]
pub enum Frame {
    /// Reply to an action we sent, matched by `echo`.
    Response(ActionResponse),
    Heartbeat,
    /// Any other event, kept raw.
    Event(Value),
}

impl Frame {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(text)?;
        if value.get("post_type").is_none() && value.get("echo").is_some() {
            return Ok(Frame::Response(serde_json::from_value(value)?));
        }
        if value.get("post_type").and_then(Value::as_str) == Some("meta_event")
            && value.get("meta_event_type").and_then(Value::as_str) == Some("heartbeat")
        {
            return Ok(Frame::Heartbeat);
        }
        Ok(Frame::Event(value))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionRequest {
    pub action: String,
    pub params: Value,
    pub echo: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub retcode: i64,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub wording: String,
    #[serde(default)]
    pub echo: Option<Value>,
}

impl ActionResponse {
    pub fn is_ok(&self) -> bool {
        self.status == "ok" || (self.status != "failed" && self.retcode == 0)
    }

    /// Echo as a string, whichever JSON type the implementation returned.
    pub fn echo_key(&self) -> Option<String> {
        match self.echo.as_ref()? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    pub fn error_message(&self) -> String {
        if !self.wording.is_empty() {
            self.wording.clone()
        } else {
            self.message.clone()
        }
    }
}

/// One message segment, `{"type": ..., "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl Segment {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".into(),
            data: json!({ "text": text.into() }),
        }
    }

    pub fn face(id: i32) -> Self {
        Self {
            kind: "face".into(),
            data: json!({ "id": id.to_string() }),
        }
    }

    pub fn image(path: &Path) -> Self {
        let file = if path.is_absolute() {
            format!("file://{}", path.display())
        } else {
            match std::env::current_dir() {
                Ok(cwd) => format!("file://{}", cwd.join(path).display()),
                Err(_) => format!("file://{}", path.display()),
            }
        };
        Self {
            kind: "image".into(),
            data: json!({ "file": file }),
        }
    }

    fn data_str(&self, key: &str) -> Option<String> {
        match self.data.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Mentioned user of an `at` segment. `@全体成员` has no user.
    pub fn at_target(&self) -> Option<UserId> {
        if self.kind != "at" {
            return None;
        }
        self.data_str("qq")?.trim().parse().ok()
    }
}

/// Render a reply as a segment array.
pub fn render_reply(reply: &Reply) -> Vec<Segment> {
    match reply {
        Reply::Text(text) => vec![Segment::text(text.clone())],
        Reply::Image(path) => vec![Segment::image(path)],
        Reply::Faces { id, count } => (0..(*count).max(1)).map(|_| Segment::face(*id)).collect(),
    }
}

/// `message` may arrive as a segment array or as a CQ-code string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MessageBody {
    Segments(Vec<Segment>),
    Raw(String),
}

impl Default for MessageBody {
    fn default() -> Self {
        MessageBody::Raw(String::new())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Sender {
    pub user_id: Option<i64>,
    pub nickname: Option<String>,
    pub card: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageEvent {
    #[serde(default)]
    pub time: i64,
    pub self_id: UserId,
    pub message_type: String,
    #[serde(default)]
    pub sub_type: Option<String>,
    #[serde(default)]
    pub message_id: i64,
    pub user_id: UserId,
    #[serde(default)]
    pub group_id: Option<GroupId>,
    #[serde(default)]
    pub message: MessageBody,
    #[serde(default)]
    pub raw_message: String,
    #[serde(default)]
    pub sender: Sender,
}

impl MessageEvent {
    /// Parse a raw event value, `None` unless it is a message event.
    pub fn from_value(value: &Value) -> Option<Self> {
        if value.get("post_type").and_then(Value::as_str) != Some("message") {
            return None;
        }
        match serde_json::from_value(value.clone()) {
            Ok(ev) => Some(ev),
            Err(e) => {
                tracing::debug!("Unparseable message event: {}", e);
                None
            }
        }
    }

    /// Concatenated text segments, or the raw string form.
    pub fn plain_text(&self) -> String {
        match &self.message {
            MessageBody::Segments(segs) => segs
                .iter()
                .filter(|s| s.kind == "text")
                .filter_map(|s| s.data.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join(""),
            MessageBody::Raw(raw) => strip_cq_codes(raw),
        }
    }

    /// Every user mentioned with an `at` segment, in order.
    pub fn mentions(&self) -> Vec<UserId> {
        match &self.message {
            MessageBody::Segments(segs) => segs.iter().filter_map(Segment::at_target).collect(),
            MessageBody::Raw(raw) => cq_at_targets(raw),
        }
    }

    pub fn mentions_self(&self) -> bool {
        self.mentions().contains(&self.self_id)
    }
}

fn strip_cq_codes(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find("[CQ:") {
        out.push_str(&rest[..start]);
        match rest[start..].find(']') {
            Some(end) => rest = &rest[start + end + 1..],
            None => {
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn cq_at_targets(raw: &str) -> Vec<UserId> {
    raw.split("[CQ:at,qq=")
        .skip(1)
        .filter_map(|tail| {
            let end = tail.find([',', ']'])?;
            tail[..end].trim().parse().ok()
        })
        .collect()
}

/// Parse member/stranger info from an action's `data`.
pub fn member_info(data: &Value) -> MemberInfo {
    let field = |key: &str| data.get(key).and_then(Value::as_str).map(str::to_string);
    MemberInfo {
        card: field("card"),
        nickname: field("nickname"),
        nick: field("nick"),
    }
}

/// `user_id` of every entry in a member list.
pub fn member_ids(data: &Value) -> Vec<UserId> {
    data.as_array()
        .map(|members| members.iter().filter_map(|m| id_field(m, "user_id")).collect())
        .unwrap_or_default()
}

/// Sender ids of a `get_group_msg_history` result.
pub fn history_senders(data: &Value) -> Vec<UserId> {
    data.get("messages")
        .and_then(Value::as_array)
        .map(|msgs| {
            msgs.iter()
                .filter_map(|m| m.get("sender").and_then(|s| id_field(s, "user_id")))
                .collect()
        })
        .unwrap_or_default()
}

fn id_field(v: &Value, key: &str) -> Option<i64> {
    match v.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_frame_kinds() {
        let resp = Frame::parse(r#"{"status":"ok","retcode":0,"data":null,"echo":"abc"}"#).unwrap();
        match resp {
            Frame::Response(r) => {
                assert!(r.is_ok());
                assert_eq!(r.echo_key().as_deref(), Some("abc"));
            }
            other => panic!("unexpected {:?}", other),
        }

        let hb = Frame::parse(
            r#"{"post_type":"meta_event","meta_event_type":"heartbeat","time":1,"self_id":1,"interval":5000}"#,
        )
        .unwrap();
        assert!(matches!(hb, Frame::Heartbeat));

        let ev = Frame::parse(r#"{"post_type":"notice","notice_type":"notify","sub_type":"poke"}"#).unwrap();
        match ev {
            Frame::Event(v) => assert_eq!(v["post_type"], "notice"),
            other => panic!("unexpected {:?}", other),
        }

        assert!(Frame::parse("not json").is_err());
    }

    #[test]
    fn test_failed_response() {
        let r: ActionResponse = serde_json::from_str(
            r#"{"status":"failed","retcode":1200,"message":"","wording":"not admin","echo":7}"#,
        )
        .unwrap();
        assert!(!r.is_ok());
        assert_eq!(r.echo_key().as_deref(), Some("7"));
        assert_eq!(r.error_message(), "not admin");
    }

    #[test]
    fn test_render_reply() {
        assert_eq!(render_reply(&Reply::Text("hi".into())), vec![Segment::text("hi")]);
        let faces = render_reply(&Reply::Faces { id: 12, count: 3 });
        assert_eq!(faces.len(), 3);
        assert_eq!(faces[0].data["id"], "12");
        let img = render_reply(&Reply::Image(PathBuf::from("/data/meme/a.png")));
        assert_eq!(img[0].kind, "image");
        assert_eq!(img[0].data["file"], "file:///data/meme/a.png");
    }

    #[test]
    fn test_message_event_segments() {
        let v = json!({
            "post_type": "message",
            "message_type": "group",
            "self_id": 1000,
            "user_id": 7,
            "group_id": 55,
            "message": [
                {"type": "at", "data": {"qq": "1000"}},
                {"type": "text", "data": {"text": " 戳 "}},
                {"type": "at", "data": {"qq": 20}},
                {"type": "at", "data": {"qq": "all"}},
                {"type": "text", "data": {"text": "3"}}
            ],
            "raw_message": "",
            "sender": {"user_id": 7, "nickname": "n"}
        });
        let ev = MessageEvent::from_value(&v).unwrap();
        assert_eq!(ev.plain_text(), " 戳 3");
        assert_eq!(ev.mentions(), vec![1000, 20]);
        assert!(ev.mentions_self());
    }

    #[test]
    fn test_message_event_cq_string() {
        let v = json!({
            "post_type": "message",
            "message_type": "private",
            "self_id": 1000,
            "user_id": 7,
            "message": "[CQ:at,qq=1000] 戳我 [CQ:at,qq=42,name=x]",
        });
        let ev = MessageEvent::from_value(&v).unwrap();
        assert_eq!(ev.plain_text().trim(), "戳我");
        assert_eq!(ev.mentions(), vec![1000, 42]);
        assert!(MessageEvent::from_value(&json!({"post_type": "notice"})).is_none());
    }

    #[test]
    fn test_action_payload_helpers() {
        assert_eq!(member_ids(&json!([{"user_id": 1}, {"user_id": "2"}, {}])), vec![1, 2]);
        assert_eq!(
            history_senders(&json!({"messages": [{"sender": {"user_id": 5}}, {"sender": {}}]})),
            vec![5]
        );
        let info = member_info(&json!({"card": "", "nickname": "nick"}));
        assert_eq!(info.display_name(), Some("nick"));
    }
}
