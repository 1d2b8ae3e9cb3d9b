//! Envelope - first-pass parse of an inbound frame.
//!
//! The dispatcher needs `type` and `token` before it knows whether the body
//! is well-formed for that type, so parsing happens in two steps: the
//! envelope, then [`Envelope::decode`] into a typed [`ClientMessage`].

use serde_json::{Map, Value};

use crate::{ClientMessage, MessageKind, WireError};

/// A JSON object with a string `type` field.
#[derive(Debug, Clone)]
pub struct Envelope {
    kind: String,
    fields: Map<String, Value>,
}

impl Envelope {
    /// Parse a text frame.
    ///
    /// Fails with [`WireError::Malformed`] if the frame is not JSON, not an
    /// object, or has no string `type`.
    pub fn parse(text: &str) -> Result<Self, WireError> {
        let value: Value = serde_json::from_str(text).map_err(|e| WireError::Malformed {
            reason: format!("invalid JSON: {e}"),
        })?;

        let Value::Object(fields) = value else {
            return Err(WireError::Malformed {
                reason: "frame is not a JSON object".to_string(),
            });
        };

        let kind = match fields.get("type") {
            Some(Value::String(kind)) => kind.clone(),
            Some(_) => {
                return Err(WireError::Malformed {
                    reason: "`type` is not a string".to_string(),
                })
            }
            None => {
                return Err(WireError::Malformed {
                    reason: "missing `type`".to_string(),
                })
            }
        };

        Ok(Self { kind, fields })
    }

    /// The declared `type`, verbatim.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The declared `type`, if it names a known request.
    pub fn message_kind(&self) -> Result<MessageKind, WireError> {
        self.kind.parse()
    }

    /// Whether this frame is an `AuthRequest`.
    pub fn is_auth_request(&self) -> bool {
        self.kind == MessageKind::AuthRequest.as_str()
    }

    /// The presented session token, if any (non-string tokens count as absent).
    pub fn token(&self) -> Option<&str> {
        self.fields.get("token").and_then(Value::as_str)
    }

    /// Decode into a typed request.
    ///
    /// Unknown `type` → [`WireError::UnknownType`]; missing or mistyped
    /// fields → [`WireError::Malformed`].
    pub fn decode(self) -> Result<ClientMessage, WireError> {
        self.message_kind()?;
        serde_json::from_value(Value::Object(self.fields)).map_err(|e| WireError::Malformed {
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_type_and_token() {
        let env = Envelope::parse(r#"{"type":"RequestEncryptedValue","token":"abc"}"#).unwrap();
        assert_eq!(env.kind(), "RequestEncryptedValue");
        assert_eq!(env.token(), Some("abc"));
        assert!(!env.is_auth_request());
        assert_eq!(
            env.message_kind().unwrap(),
            MessageKind::RequestEncryptedValue
        );
    }

    #[test]
    fn rejects_non_json() {
        let err = Envelope::parse("not json").unwrap_err();
        assert!(matches!(err, WireError::Malformed { .. }));
    }

    #[test]
    fn rejects_non_object() {
        assert!(matches!(
            Envelope::parse("[1,2,3]"),
            Err(WireError::Malformed { .. })
        ));
        assert!(matches!(
            Envelope::parse("\"AuthRequest\""),
            Err(WireError::Malformed { .. })
        ));
    }

    #[test]
    fn rejects_missing_or_non_string_type() {
        assert!(matches!(
            Envelope::parse(r#"{"token":"abc"}"#),
            Err(WireError::Malformed { .. })
        ));
        assert!(matches!(
            Envelope::parse(r#"{"type":7}"#),
            Err(WireError::Malformed { .. })
        ));
    }

    #[test]
    fn non_string_token_is_absent() {
        let env = Envelope::parse(r#"{"type":"RequestEncryptedValue","token":42}"#).unwrap();
        assert_eq!(env.token(), None);
    }

    #[test]
    fn unknown_type_parses_but_does_not_decode() {
        let env = Envelope::parse(r#"{"type":"FileChunk","token":"abc"}"#).unwrap();
        assert_eq!(env.kind(), "FileChunk");
        assert!(matches!(env.decode(), Err(WireError::UnknownType(_))));
    }

    #[test]
    fn missing_field_is_malformed() {
        let env = Envelope::parse(r#"{"type":"DecryptionRequest","token":"abc"}"#).unwrap();
        assert!(matches!(env.decode(), Err(WireError::Malformed { .. })));
    }

    #[test]
    fn decodes_auth_request() {
        let env =
            Envelope::parse(r#"{"type":"AuthRequest","username":"Node1","password":"pw"}"#)
                .unwrap();
        assert!(env.is_auth_request());
        match env.decode().unwrap() {
            ClientMessage::AuthRequest(req) => {
                assert_eq!(req.username, "Node1");
                assert_eq!(req.password, "pw");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
