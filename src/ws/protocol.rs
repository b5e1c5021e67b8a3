//! Tagged JSON messages exchanged over the shell WebSocket (spec §3).
//!
//! The original Neovim-RPC transport the teacher speaks is msgpack
//! arrays; this surface is plain tagged JSON instead, since clients are
//! ordinary browsers/xterm.js rather than a Neovim UI. Binary shell
//! output is base64-encoded so it survives a JSON text frame unchanged.
//! Every message, both directions, carries the session id it belongs to
//! — one socket can drive several concurrent sessions.

use base64::Engine;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Input {
        #[serde(rename = "sessionId")]
        session_id: String,
        data: String,
    },
    Resize {
        #[serde(rename = "sessionId")]
        session_id: String,
        cols: u16,
        rows: u16,
    },
    Ping {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
}

impl ClientMessage {
    pub fn session_id(&self) -> &str {
        match self {
            Self::Input { session_id, .. } => session_id,
            Self::Resize { session_id, .. } => session_id,
            Self::Ping { session_id } => session_id,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Output {
        #[serde(rename = "sessionId")]
        session_id: String,
        data: String,
    },
    Disconnect {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    Error {
        #[serde(rename = "sessionId")]
        session_id: String,
        text: String,
    },
    Pong {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
}

impl ServerMessage {
    pub fn output(session_id: &str, bytes: &[u8]) -> Self {
        Self::Output {
            session_id: session_id.to_string(),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }

    pub fn error(session_id: &str, text: impl Into<String>) -> Self {
        Self::Error {
            session_id: session_id.to_string(),
            text: text.into(),
        }
    }

    pub fn disconnect(session_id: &str) -> Self {
        Self::Disconnect {
            session_id: session_id.to_string(),
        }
    }

    pub fn pong(session_id: &str) -> Self {
        Self::Pong {
            session_id: session_id.to_string(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("ServerMessage always serializes")
    }
}

impl ClientMessage {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn decode_input(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
        base64::engine::general_purpose::STANDARD.decode(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_round_trips_through_base64() {
        let msg = ServerMessage::output("s1", b"hello\xffworld");
        let json = msg.to_json();
        assert!(json.contains("\"type\":\"output\""));
        assert!(json.contains("\"sessionId\":\"s1\""));
    }

    #[test]
    fn client_input_parses_and_decodes() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"ls -la\n");
        let raw = format!(r#"{{"type":"input","sessionId":"s1","data":"{encoded}"}}"#);
        let msg = ClientMessage::parse(&raw).unwrap();
        match msg {
            ClientMessage::Input { session_id, data } => {
                assert_eq!(session_id, "s1");
                assert_eq!(ClientMessage::decode_input(&data).unwrap(), b"ls -la\n");
            }
            _ => panic!("expected Input"),
        }
    }

    #[test]
    fn resize_message_parses() {
        let msg =
            ClientMessage::parse(r#"{"type":"resize","sessionId":"s1","cols":120,"rows":40}"#)
                .unwrap();
        match msg {
            ClientMessage::Resize {
                session_id,
                cols,
                rows,
            } => {
                assert_eq!(session_id, "s1");
                assert_eq!(cols, 120);
                assert_eq!(rows, 40);
            }
            _ => panic!("expected Resize"),
        }
    }

    #[test]
    fn unknown_message_type_fails_to_parse() {
        assert!(ClientMessage::parse(r#"{"type":"teleport","sessionId":"s1"}"#).is_err());
    }

    #[test]
    fn message_without_session_id_fails_to_parse() {
        assert!(ClientMessage::parse(r#"{"type":"ping"}"#).is_err());
    }
}
