//! JSON command set spoken over the WebSocket

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::capture::Frame;
use crate::error::SessionError;

/// Acknowledgement for `execute` and `result`.
pub const ACK: &str = "{}";

/// A decoded client request.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Metadata,
    Frame,
    CameraInfo,
    Execute(Value),
    Result(Value),
    /// Well-formed request with a name this server does not know
    Unknown(String),
}

#[derive(Deserialize)]
struct Envelope {
    request: String,
    #[serde(default)]
    body: Option<Value>,
}

impl Request {
    pub fn decode(text: &str) -> Result<Self, SessionError> {
        let envelope: Envelope =
            serde_json::from_str(text).map_err(|e| SessionError::BadRequest(e.to_string()))?;

        let request = match envelope.request.as_str() {
            "metadata" => Request::Metadata,
            "frame" => Request::Frame,
            "cameraInfo" => Request::CameraInfo,
            "execute" => Request::Execute(require_body(envelope.body, "execute")?),
            "result" => Request::Result(require_body(envelope.body, "result")?),
            _ => Request::Unknown(envelope.request),
        };
        Ok(request)
    }

    pub fn kind(&self) -> &str {
        match self {
            Request::Metadata => "metadata",
            Request::Frame => "frame",
            Request::CameraInfo => "cameraInfo",
            Request::Execute(_) => "execute",
            Request::Result(_) => "result",
            Request::Unknown(name) => name,
        }
    }
}

fn require_body(body: Option<Value>, request: &str) -> Result<Value, SessionError> {
    body.ok_or_else(|| SessionError::BadRequest(format!("{request} request without a body")))
}

/// One response message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Binary(Bytes),
}

/// Body of the `metadata` response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameDescription {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<&'static str>,
    pub width: u32,
    pub height: u32,
    pub layout: &'static str,
    pub data_type: &'static str,
    pub color_space: &'static str,
}

impl FrameDescription {
    pub fn of(frame: &Frame) -> Self {
        Self {
            format: frame.encoded.as_ref().map(|_| "jpg"),
            width: frame.width(),
            height: frame.height(),
            layout: "interleaved",
            data_type: "uint8",
            color_space: frame.format().color_space(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CameraInfo<'a> {
    pub id: &'a str,
    pub name: &'a str,
}

/// The action named by an `execute` body: `body.action` if present,
/// otherwise the whole body.
pub fn action_of(body: &Value) -> String {
    match body.get("action") {
        Some(action) => text_of(action),
        None => text_of(body),
    }
}

/// Strings verbatim, anything else as compact JSON.
pub fn text_of(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::PixelFormat;
    use serde_json::json;

    #[test]
    fn decodes_the_command_set() {
        assert_eq!(Request::decode(r#"{"request":"metadata"}"#), Ok(Request::Metadata));
        assert_eq!(Request::decode(r#"{"request":"frame","body":{}}"#), Ok(Request::Frame));
        assert_eq!(Request::decode(r#"{"request":"cameraInfo"}"#), Ok(Request::CameraInfo));
        assert_eq!(
            Request::decode(r#"{"request":"execute","body":{"action":"beep"}}"#),
            Ok(Request::Execute(json!({"action": "beep"})))
        );
        assert_eq!(
            Request::decode(r#"{"request":"result","body":"label"}"#),
            Ok(Request::Result(json!("label")))
        );
    }

    #[test]
    fn unknown_names_are_kept() {
        let request = Request::decode(r#"{"request":"reboot"}"#).unwrap();
        assert_eq!(request, Request::Unknown("reboot".into()));
        assert_eq!(request.kind(), "reboot");
    }

    #[test]
    fn malformed_requests_are_bad() {
        for text in [
            "not json",
            "[]",
            r#"{"body":{}}"#,
            r#"{"request":42}"#,
            r#"{"request":"execute"}"#,
            r#"{"request":"result","body":null}"#,
        ] {
            assert!(
                matches!(Request::decode(text), Err(SessionError::BadRequest(_))),
                "{text}"
            );
        }
    }

    #[test]
    fn action_extraction() {
        assert_eq!(action_of(&json!({"action": "open"})), "open");
        assert_eq!(action_of(&json!({"action": {"gpio": 3}})), r#"{"gpio":3}"#);
        assert_eq!(action_of(&json!("raw")), "raw");
        assert_eq!(action_of(&json!({"other": 1})), r#"{"other":1}"#);
    }

    #[test]
    fn description_field_order_and_names() {
        let frame = Frame::from_pixels(2, 1, PixelFormat::Argb32, vec![0; 8]).unwrap();
        let json = serde_json::to_string(&FrameDescription::of(&frame)).unwrap();
        assert_eq!(
            json,
            r#"{"width":2,"height":1,"layout":"interleaved","dataType":"uint8","colorSpace":"BGRA"}"#
        );

        let jpeg = frame.with_encoded(vec![0xFF, 0xD8]);
        let json = serde_json::to_value(FrameDescription::of(&jpeg)).unwrap();
        assert_eq!(json["format"], "jpg");
    }
}
