//! Frappe response envelopes.
//!
//! Whitelisted methods answer `{"message": <value>}`. Failures carry
//! `exc_type` and `_server_messages`, a JSON-encoded list of JSON-encoded
//! message objects.

use serde::Deserialize;
use serde_json::Value;

use super::ClientError;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Envelope {
    pub message: Option<Value>,
    pub exc_type: Option<String>,
    pub exception: Option<String>,
    #[serde(rename = "_server_messages")]
    pub server_messages: Option<String>,
}

impl Envelope {
    /// Human-readable text of the server messages, joined by `; `.
    pub fn server_message_text(&self) -> Option<String> {
        let raw = self.server_messages.as_deref()?;
        let outer: Vec<String> = serde_json::from_str(raw).ok()?;
        let texts: Vec<String> = outer
            .iter()
            .map(|m| match serde_json::from_str::<Value>(m) {
                Ok(obj) => obj.get("message").and_then(Value::as_str).unwrap_or(m).to_string(),
                Err(_) => m.clone(),
            })
            .collect();
        (!texts.is_empty()).then(|| texts.join("; "))
    }

    fn into_error(self, status: u16) -> ClientError {
        let message = self.server_message_text().or_else(|| self.exception.clone());
        match (self.exc_type, message) {
            (Some(exc_type), Some(message)) => ClientError::Server { exc_type, message },
            (Some(exc_type), None) => ClientError::Server { message: exc_type.clone(), exc_type },
            (None, Some(message)) => ClientError::Server { exc_type: "Error".into(), message },
            (None, None) => ClientError::HttpError { status },
        }
    }
}

/// Turn a response status and body into the `message` value or an error.
pub(crate) fn parse_envelope(status: u16, body: &[u8]) -> Result<Value, ClientError> {
    let envelope: Envelope = match serde_json::from_slice(body) {
        Ok(envelope) => envelope,
        Err(_) if !(200..300).contains(&status) => return Err(ClientError::HttpError { status }),
        Err(e) => return Err(ClientError::Parse(e.to_string())),
    };

    if status == 401 || status == 403 {
        let message = envelope.server_message_text().unwrap_or_else(|| "not permitted".into());
        return Err(ClientError::AuthError(message));
    }
    if !(200..300).contains(&status) || envelope.exc_type.is_some() {
        return Err(envelope.into_error(status));
    }
    Ok(envelope.message.unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_unwrapped() {
        let body = json!({"message": {"name": "ACC-SINV-0001"}}).to_string();
        assert_eq!(parse_envelope(200, body.as_bytes()).unwrap(), json!({"name": "ACC-SINV-0001"}));
    }

    #[test]
    fn test_missing_message_is_null() {
        assert_eq!(parse_envelope(200, b"{}").unwrap(), Value::Null);
    }

    #[test]
    fn test_server_exception() {
        let inner = json!({"message": "Item A is out of stock", "indicator": "red"}).to_string();
        let body = json!({
            "exc_type": "ValidationError",
            "_server_messages": serde_json::to_string(&vec![inner]).unwrap(),
        })
        .to_string();

        match parse_envelope(417, body.as_bytes()) {
            Err(ClientError::Server { exc_type, message }) => {
                assert_eq!(exc_type, "ValidationError");
                assert_eq!(message, "Item A is out of stock");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_auth_failure() {
        let body = json!({"exc_type": "AuthenticationError"}).to_string();
        assert!(matches!(parse_envelope(401, body.as_bytes()), Err(ClientError::AuthError(_))));
    }

    #[test]
    fn test_non_json_error_body() {
        assert!(matches!(parse_envelope(502, b"<html>Bad Gateway</html>"), Err(ClientError::HttpError { status: 502 })));
        assert!(matches!(parse_envelope(200, b"<html>"), Err(ClientError::Parse(_))));
    }
}
