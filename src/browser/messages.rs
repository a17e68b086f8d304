use std::sync::atomic::{AtomicU64, Ordering};

use serde::Deserialize;
use tracing::warn;

static PARSE_FAILURES: AtomicU64 = AtomicU64::new(0);

/// Error object carried by a failed command response.
#[derive(Debug, Deserialize, Clone)]
pub struct ProtocolError {
    pub code: i64,
    pub message: String,
}

/// Raw deserializable shape covering both DevTools frame kinds.
/// Responses carry `id` plus `result`/`error`; events carry `method` plus `params`.
#[derive(Debug, Deserialize)]
struct RawFrame {
    pub id: Option<u64>,
    pub result: Option<serde_json::Value>,
    pub error: Option<ProtocolError>,
    pub method: Option<String>,
    pub params: Option<serde_json::Value>,
    /// Present when the frame belongs to a flattened target session.
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

/// One parsed DevTools frame.
#[derive(Debug, Clone)]
pub enum CdpFrame {
    /// Reply to a command we issued.
    Response {
        id: u64,
        result: std::result::Result<serde_json::Value, ProtocolError>,
    },
    /// Unsolicited notification (`Fetch.authRequired`, `Target.detachedFromTarget`, …).
    Event {
        method: String,
        params: serde_json::Value,
        session_id: Option<String>,
    },
}

/// Parse one WebSocket text frame. Unrecognized frames are counted and dropped.
pub fn parse_cdp_frame(raw: &str) -> Option<CdpFrame> {
    let msg = match serde_json::from_str::<RawFrame>(raw) {
        Ok(m) => m,
        Err(_) => {
            note_parse_failure(raw);
            return None;
        }
    };

    if let Some(id) = msg.id {
        let result = match msg.error {
            Some(err) => Err(err),
            None => Ok(msg.result.unwrap_or(serde_json::Value::Null)),
        };
        return Some(CdpFrame::Response { id, result });
    }

    match msg.method {
        Some(method) => Some(CdpFrame::Event {
            method,
            params: msg.params.unwrap_or(serde_json::Value::Null),
            session_id: msg.session_id,
        }),
        None => {
            note_parse_failure(raw);
            None
        }
    }
}

/// Build an outbound command frame.
pub fn build_command(
    id: u64,
    method: &str,
    params: serde_json::Value,
    session_id: Option<&str>,
) -> String {
    let mut frame = serde_json::json!({
        "id": id,
        "method": method,
        "params": params,
    });
    if let Some(session_id) = session_id {
        frame["sessionId"] = serde_json::Value::String(session_id.to_string());
    }
    frame.to_string()
}

fn note_parse_failure(raw: &str) {
    let count = PARSE_FAILURES.fetch_add(1, Ordering::Relaxed) + 1;
    if count <= 10 || count % 1000 == 0 {
        let sample: String = raw.chars().take(500).collect();
        warn!(count, "[CDP PARSE] unrecognized frame: {sample}");
    }
}

/// Pull the DevTools WebSocket URL out of one line of Chromium's stderr.
pub fn devtools_url_from_line(line: &str) -> Option<String> {
    line.split_once("DevTools listening on ")
        .map(|(_, url)| url.trim().to_string())
        .filter(|url| url.starts_with("ws://") || url.starts_with("wss://"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_successful_response() {
        let raw = r#"{"id":7,"result":{"frameId":"F1","loaderId":"L1"}}"#;
        match parse_cdp_frame(raw) {
            Some(CdpFrame::Response { id, result }) => {
                assert_eq!(id, 7);
                assert_eq!(result.unwrap()["frameId"], "F1");
            }
            other => panic!("expected Response, got {other:?}"),
        }
    }

    #[test]
    fn parses_error_response() {
        let raw = r#"{"id":3,"error":{"code":-32000,"message":"Cannot navigate to invalid URL"}}"#;
        match parse_cdp_frame(raw) {
            Some(CdpFrame::Response { id, result }) => {
                assert_eq!(id, 3);
                let err = result.unwrap_err();
                assert_eq!(err.code, -32000);
                assert!(err.message.contains("invalid URL"));
            }
            other => panic!("expected Response, got {other:?}"),
        }
    }

    #[test]
    fn parses_session_event() {
        let raw = r#"{"method":"Fetch.authRequired","params":{"requestId":"R1"},"sessionId":"S1"}"#;
        match parse_cdp_frame(raw) {
            Some(CdpFrame::Event { method, params, session_id }) => {
                assert_eq!(method, "Fetch.authRequired");
                assert_eq!(params["requestId"], "R1");
                assert_eq!(session_id.as_deref(), Some("S1"));
            }
            other => panic!("expected Event, got {other:?}"),
        }
    }

    #[test]
    fn response_without_result_is_null() {
        match parse_cdp_frame(r#"{"id":1}"#) {
            Some(CdpFrame::Response { result, .. }) => assert!(result.unwrap().is_null()),
            other => panic!("expected Response, got {other:?}"),
        }
    }

    #[test]
    fn garbage_returns_none() {
        assert!(parse_cdp_frame("not json").is_none());
        assert!(parse_cdp_frame(r#"{"totally":"unrelated"}"#).is_none());
    }

    #[test]
    fn command_frame_carries_session() {
        let frame = build_command(4, "Runtime.evaluate", serde_json::json!({"expression": "1"}), Some("S9"));
        let v: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(v["id"], 4);
        assert_eq!(v["method"], "Runtime.evaluate");
        assert_eq!(v["sessionId"], "S9");
        let frame = build_command(5, "Browser.close", serde_json::json!({}), None);
        let v: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert!(v.get("sessionId").is_none());
    }

    #[test]
    fn devtools_url_is_read_from_stderr_line() {
        let line = "DevTools listening on ws://127.0.0.1:40123/devtools/browser/abc-def";
        assert_eq!(
            devtools_url_from_line(line).as_deref(),
            Some("ws://127.0.0.1:40123/devtools/browser/abc-def")
        );
        assert!(devtools_url_from_line("[0101/000000.000:INFO] something else").is_none());
    }
}
