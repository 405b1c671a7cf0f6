use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Frames the client writes to the terminal socket. `input` is the only
/// message type the client ever sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Input { data: String },
}

/// Frames the console sends over the terminal socket.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Connected {
        #[serde(default)]
        pod_name: Option<String>,
        #[serde(default)]
        container_name: Option<String>,
    },
    Output {
        #[serde(default)]
        data: String,
    },
    Stdout {
        #[serde(default)]
        data: String,
    },
    ErrorOutput {
        #[serde(default)]
        data: String,
    },
    Stderr {
        #[serde(default)]
        data: String,
    },
    Error {
        #[serde(default)]
        message: String,
    },
}

/// One decoded inbound payload. Payloads that do not match a known frame are
/// preserved verbatim rather than dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Frame(ServerFrame),
    /// Valid JSON, but not a frame shape this client recognises.
    Unknown(Value),
    /// Not JSON at all.
    Raw(String),
}

pub fn decode(payload: &str) -> Inbound {
    match serde_json::from_str::<Value>(payload) {
        Ok(value) => match ServerFrame::deserialize(&value) {
            Ok(frame) => Inbound::Frame(frame),
            Err(_) => Inbound::Unknown(value),
        },
        Err(_) => Inbound::Raw(payload.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn input_frame_serializes_with_type_tag() {
        let frame = ClientFrame::Input {
            data: "ls -la\n".into(),
        };
        let encoded = serde_json::to_string(&frame).unwrap();
        assert_eq!(encoded, r#"{"type":"input","data":"ls -la\n"}"#);
    }

    #[test]
    fn decodes_output_variants() {
        assert_eq!(
            decode(r#"{"type":"output","data":"$ "}"#),
            Inbound::Frame(ServerFrame::Output { data: "$ ".into() })
        );
        assert_eq!(
            decode(r#"{"type":"stdout","data":"hi"}"#),
            Inbound::Frame(ServerFrame::Stdout { data: "hi".into() })
        );
        assert_eq!(
            decode(r#"{"type":"error_output","data":"oops"}"#),
            Inbound::Frame(ServerFrame::ErrorOutput { data: "oops".into() })
        );
        assert_eq!(
            decode(r#"{"type":"stderr","data":"oops"}"#),
            Inbound::Frame(ServerFrame::Stderr { data: "oops".into() })
        );
    }

    #[test]
    fn decodes_connected_with_and_without_names() {
        assert_eq!(
            decode(r#"{"type":"connected","pod_name":"pod-1","container_name":"main"}"#),
            Inbound::Frame(ServerFrame::Connected {
                pod_name: Some("pod-1".into()),
                container_name: Some("main".into()),
            })
        );
        assert_eq!(
            decode(r#"{"type":"connected"}"#),
            Inbound::Frame(ServerFrame::Connected {
                pod_name: None,
                container_name: None,
            })
        );
    }

    #[test]
    fn decodes_error_message() {
        assert_eq!(
            decode(r#"{"type":"error","message":"exec failed"}"#),
            Inbound::Frame(ServerFrame::Error {
                message: "exec failed".into(),
            })
        );
    }

    #[test]
    fn unknown_type_keeps_the_full_message() {
        let payload = r#"{"type":"resize","cols":80}"#;
        assert_eq!(
            decode(payload),
            Inbound::Unknown(json!({"type": "resize", "cols": 80}))
        );
    }

    #[test]
    fn non_json_payload_is_kept_raw() {
        assert_eq!(decode("hello"), Inbound::Raw("hello".into()));
    }
}
