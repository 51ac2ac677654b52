//! The wire vocabulary spoken over the WebSocket. One JSON object per
//! frame, tagged by `event` with the payload under `data`.

use serde::{Deserialize, Serialize};
use gangway_common::GangwayError;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PromptSpec {
    pub prompt: String,
    pub echo: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "action")]
pub enum AuthenticationAction {
    #[serde(rename = "request_auth")]
    RequestAuth,
    #[serde(rename = "keyboard-interactive")]
    KeyboardInteractive {
        name: String,
        instructions: String,
        prompts: Vec<PromptSpec>,
    },
    #[serde(rename = "auth_result")]
    AuthResult {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "authentication")]
    Authentication(AuthenticationAction),
    #[serde(rename = "permissions")]
    Permissions {
        #[serde(rename = "autoLog")]
        auto_log: bool,
        #[serde(rename = "allowReplay")]
        allow_replay: bool,
        #[serde(rename = "allowReconnect")]
        allow_reconnect: bool,
        #[serde(rename = "allowReauth")]
        allow_reauth: bool,
    },
    #[serde(rename = "getTerminal")]
    GetTerminal(bool),
    #[serde(rename = "updateUI")]
    UpdateUi { element: String, value: String },
    #[serde(rename = "data")]
    Data(String),
    #[serde(rename = "ssherror")]
    SshError(String),
    #[serde(rename = "ssh_auth_failure")]
    SshAuthFailure { error: String, method: String },
}

#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
pub struct AuthenticatePayload {
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(rename = "privateKey")]
    pub private_key: Option<String>,
    pub passphrase: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub term: Option<String>,
    pub rows: Option<f64>,
    pub cols: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
pub struct TerminalPayload {
    pub term: Option<String>,
    pub rows: Option<f64>,
    pub cols: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "authenticate")]
    Authenticate(AuthenticatePayload),
    #[serde(rename = "keyboard-interactive-response")]
    KeyboardInteractiveResponse(Vec<String>),
    #[serde(rename = "terminal")]
    Terminal(TerminalPayload),
    #[serde(rename = "resize")]
    Resize {
        rows: Option<f64>,
        cols: Option<f64>,
    },
    #[serde(rename = "data")]
    Data(String),
    #[serde(rename = "control")]
    Control(String),
    #[serde(rename = "disconnect")]
    Disconnect,
}

/// Parses one inbound text frame. Failures are protocol errors: logged by
/// the gateway, never surfaced verbatim, no state change.
pub fn parse_client_event(raw: &str) -> Result<ClientEvent, GangwayError> {
    serde_json::from_str(raw).map_err(|e| GangwayError::Protocol(e.to_string()))
}

pub fn encode_server_event(event: &ServerEvent) -> Result<String, GangwayError> {
    Ok(serde_json::to_string(event)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_authenticate() {
        let event = parse_client_event(
            r#"{"event":"authenticate","data":{"host":"h","port":22,"username":"u","password":"p"}}"#,
        )
        .unwrap();
        let ClientEvent::Authenticate(payload) = event else {
            panic!("wrong variant");
        };
        assert_eq!(payload.host.as_deref(), Some("h"));
        assert_eq!(payload.port, Some(22));
        assert_eq!(payload.username.as_deref(), Some("u"));
        assert_eq!(payload.password.as_deref(), Some("p"));
        assert_eq!(payload.private_key, None);
    }

    #[test]
    fn test_parse_disconnect_without_payload() {
        assert_eq!(
            parse_client_event(r#"{"event":"disconnect"}"#).unwrap(),
            ClientEvent::Disconnect
        );
    }

    #[test]
    fn test_parse_keyboard_interactive_response() {
        assert_eq!(
            parse_client_event(r#"{"event":"keyboard-interactive-response","data":["123456"]}"#)
                .unwrap(),
            ClientEvent::KeyboardInteractiveResponse(vec!["123456".to_owned()])
        );
    }

    #[test]
    fn test_malformed_frame_is_protocol_error() {
        assert!(parse_client_event("not json").is_err());
        assert!(parse_client_event(r#"{"event":"resize","data":{"rows":"NaN-ish"}}"#).is_err());
        assert!(parse_client_event(r#"{"event":"no-such-event"}"#).is_err());
    }

    #[test]
    fn test_encode_auth_result() {
        let encoded = encode_server_event(&ServerEvent::Authentication(
            AuthenticationAction::AuthResult {
                success: true,
                message: None,
            },
        ))
        .unwrap();
        assert_eq!(
            encoded,
            r#"{"event":"authentication","data":{"action":"auth_result","success":true}}"#
        );
    }

    #[test]
    fn test_encode_keyboard_interactive_request() {
        let encoded = encode_server_event(&ServerEvent::Authentication(
            AuthenticationAction::KeyboardInteractive {
                name: "SSH server".into(),
                instructions: String::new(),
                prompts: vec![PromptSpec {
                    prompt: "OTP:".into(),
                    echo: true,
                }],
            },
        ))
        .unwrap();
        assert!(encoded.contains(r#""action":"keyboard-interactive""#));
        assert!(encoded.contains(r#""prompt":"OTP:""#));
    }

    #[test]
    fn test_encode_permissions_field_names() {
        let encoded = encode_server_event(&ServerEvent::Permissions {
            auto_log: false,
            allow_replay: true,
            allow_reconnect: false,
            allow_reauth: true,
        })
        .unwrap();
        assert!(encoded.contains(r#""allowReplay":true"#));
        assert!(encoded.contains(r#""autoLog":false"#));
    }
}
