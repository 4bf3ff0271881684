//! The four-field wire envelope shared by every gateway message, and the
//! function wrappers used to parse and serialize it.
//!
//! Event payloads are carried as an opaque [`serde_json::Value`] rather than
//! as a statically typed domain enum: higher-level object modeling of chat
//! entities is not this crate's concern, so `d` is handed to the dispatch
//! sink untouched.

use serde::{Deserialize, Serialize};
use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
};

/// Inbound or outbound gateway message envelope.
///
/// `s` and `t` are only ever present on [`DISPATCH`] frames.
///
/// [`DISPATCH`]: crate::command::OpCode::Dispatch
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Envelope {
    /// Opcode identifying the purpose of the frame.
    pub op: u8,
    /// Payload, carried untouched.
    pub d: serde_json::Value,
    /// Sequence number, present on dispatches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    /// Dispatch event name, present on dispatches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

/// Parsing a gateway envelope out of a received message failed.
#[derive(Debug)]
pub struct EnvelopeParsingError {
    /// Type of error.
    pub(crate) kind: EnvelopeParsingErrorType,
    /// Source error if available.
    pub(crate) source: Option<Box<dyn Error + Send + Sync>>,
}

impl EnvelopeParsingError {
    /// Immutable reference to the type of error that occurred.
    #[must_use = "retrieving the type has no effect if left unused"]
    pub const fn kind(&self) -> &EnvelopeParsingErrorType {
        &self.kind
    }

    /// Consume the error, returning the source error if there is any.
    #[must_use = "consuming the error and retrieving the source has no effect if left unused"]
    pub fn into_source(self) -> Option<Box<dyn Error + Send + Sync>> {
        self.source
    }
}

impl Display for EnvelopeParsingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self.kind {
            EnvelopeParsingErrorType::Deserializing => {
                f.write_str("payload could not be deserialized as json")
            }
            EnvelopeParsingErrorType::NotAnObject => {
                f.write_str("decoded json root is not an object")
            }
        }
    }
}

impl Error for EnvelopeParsingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_ref()
            .map(|source| &**source as &(dyn Error + 'static))
    }
}

/// Type of [`EnvelopeParsingError`] that occurred.
#[derive(Debug)]
#[non_exhaustive]
pub enum EnvelopeParsingErrorType {
    /// The payload was not well-formed JSON.
    Deserializing,
    /// The payload was valid JSON but its root was not an object.
    NotAnObject,
}

/// Parse a decoded message into a gateway envelope.
///
/// # Errors
///
/// Returns [`EnvelopeParsingErrorType::Deserializing`] if `json` isn't valid
/// JSON at all.
///
/// Returns [`EnvelopeParsingErrorType::NotAnObject`] if `json` parses but its
/// root value isn't a JSON object; per the wire contract this must be
/// surfaced as a reidentify-requested termination with close code 1007.
pub fn parse(json: &[u8]) -> Result<Envelope, EnvelopeParsingError> {
    let value: serde_json::Value = serde_json::from_slice(json).map_err(|source| {
        tracing::error!("invalid JSON: {}", String::from_utf8_lossy(json));

        EnvelopeParsingError {
            kind: EnvelopeParsingErrorType::Deserializing,
            source: Some(Box::new(source)),
        }
    })?;

    if !value.is_object() {
        return Err(EnvelopeParsingError {
            kind: EnvelopeParsingErrorType::NotAnObject,
            source: None,
        });
    }

    serde_json::from_value(value).map_err(|source| EnvelopeParsingError {
        kind: EnvelopeParsingErrorType::Deserializing,
        source: Some(Box::new(source)),
    })
}

#[cfg(test)]
mod tests {
    use super::{parse, EnvelopeParsingErrorType};
    use static_assertions::assert_impl_all;
    use std::{error::Error, fmt::Debug};

    assert_impl_all!(EnvelopeParsingErrorType: Debug, Send, Sync);

    #[test]
    fn dispatch_envelope() {
        let json = br#"{"op":0,"d":{"session_id":"abc"},"s":1,"t":"READY"}"#;
        let envelope = parse(json).unwrap();

        assert_eq!(0, envelope.op);
        assert_eq!(Some(1), envelope.s);
        assert_eq!(Some("READY".to_owned()), envelope.t);
        assert_eq!("abc", envelope.d["session_id"]);
    }

    #[test]
    fn hello_envelope_has_no_sequence_or_type() {
        let json = br#"{"op":10,"d":{"heartbeat_interval":41250,"_trace":["a"]}}"#;
        let envelope = parse(json).unwrap();

        assert_eq!(10, envelope.op);
        assert!(envelope.s.is_none());
        assert!(envelope.t.is_none());
    }

    #[test]
    fn array_root_is_rejected() {
        let err = parse(b"[]").unwrap_err();
        assert!(matches!(err.kind(), EnvelopeParsingErrorType::NotAnObject));
    }

    #[test]
    fn invalid_json_is_rejected() -> Result<(), Box<dyn Error>> {
        let err = parse(b"not json").unwrap_err();
        assert!(matches!(err.kind(), EnvelopeParsingErrorType::Deserializing));
        Ok(())
    }
}
