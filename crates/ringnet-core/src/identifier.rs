//! Category-tagged identifiers.
//!
//! Identifier format: `scheme:payload`, where the scheme names the category.
//!
//! Supported categories:
//! - `vertex:d0u1` - a user or domain vertex
//! - `message:d0u1#0` - a protocol message
//!
//! The category is a zero-sized type parameter, so a vertex id can never be
//! compared with (or passed where the code expects) a message id.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::str::FromStr;

/// A namespace of identifiers.
pub trait Category: 'static {
    /// Scheme written in front of the payload (e.g., "vertex").
    const SCHEME: &'static str;
}

/// Zero-sized category markers.
pub mod tag {
    use super::Category;

    /// Vertex (user and domain) identifiers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum Vertex {}

    impl Category for Vertex {
        const SCHEME: &'static str = "vertex";
    }

    /// Message identifiers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum Message {}

    impl Category for Message {
        const SCHEME: &'static str = "message";
    }
}

/// Identifier of a user or domain vertex.
pub type VertexId = Identifier<tag::Vertex>;

/// Identifier of a protocol message.
pub type MessageId = Identifier<tag::Message>;

/// An opaque identifier in category `C`.
#[derive(Serialize, Deserialize)]
#[serde(try_from = "String", into = "String", bound = "C: Category")]
pub struct Identifier<C> {
    payload: String,
    category: PhantomData<fn() -> C>,
}

impl<C: Category> Identifier<C> {
    /// Create a new identifier from its payload.
    ///
    /// The payload is not checked. An empty one displays as `scheme:` and
    /// will not parse back; use [`Identifier::try_new`] for untrusted input.
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            category: PhantomData,
        }
    }

    /// Create a new identifier, rejecting an empty payload.
    pub fn try_new(payload: impl Into<String>) -> Result<Self, IdentifierParseError> {
        let payload = payload.into();
        if payload.is_empty() {
            return Err(IdentifierParseError::EmptyPayload);
        }
        Ok(Self::new(payload))
    }

    /// The scheme of this identifier's category.
    pub fn scheme(&self) -> &'static str {
        C::SCHEME
    }

    /// The payload (the part after `scheme:`).
    pub fn payload(&self) -> &str {
        &self.payload
    }
}

impl<C> Clone for Identifier<C> {
    fn clone(&self) -> Self {
        Self {
            payload: self.payload.clone(),
            category: PhantomData,
        }
    }
}

impl<C> PartialEq for Identifier<C> {
    fn eq(&self, other: &Self) -> bool {
        self.payload == other.payload
    }
}

impl<C> Eq for Identifier<C> {}

impl<C> Hash for Identifier<C> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.payload.hash(state);
    }
}

impl<C> PartialOrd for Identifier<C> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<C> Ord for Identifier<C> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.payload.cmp(&other.payload)
    }
}

impl<C: Category> fmt::Debug for Identifier<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({}:{})", C::SCHEME, self.payload)
    }
}

impl<C: Category> fmt::Display for Identifier<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", C::SCHEME, self.payload)
    }
}

impl<C: Category> FromStr for Identifier<C> {
    type Err = IdentifierParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, payload) = s
            .split_once(':')
            .ok_or_else(|| IdentifierParseError::MissingColon(s.to_string()))?;

        if scheme != C::SCHEME {
            return Err(IdentifierParseError::WrongCategory {
                expected: C::SCHEME,
                found: scheme.to_string(),
            });
        }
        Self::try_new(payload)
    }
}

impl<C: Category> TryFrom<String> for Identifier<C> {
    type Error = IdentifierParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl<C: Category> From<Identifier<C>> for String {
    fn from(id: Identifier<C>) -> Self {
        id.to_string()
    }
}

/// Error parsing an identifier string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierParseError {
    #[error("identifier must contain ':' separator, got: {0}")]
    MissingColon(String),
    #[error("expected a '{expected}' identifier, got scheme '{found}'")]
    WrongCategory {
        expected: &'static str,
        found: String,
    },
    #[error("identifier payload cannot be empty")]
    EmptyPayload,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_vertex() {
        let id: VertexId = "vertex:d0u1".parse().unwrap();
        assert_eq!(id.scheme(), "vertex");
        assert_eq!(id.payload(), "d0u1");
    }

    #[test]
    fn parse_rejects_other_category() {
        let err = "message:d0u1#0".parse::<VertexId>().unwrap_err();
        assert_eq!(
            err,
            IdentifierParseError::WrongCategory {
                expected: "vertex",
                found: "message".to_string(),
            }
        );
    }

    #[test]
    fn parse_rejects_missing_colon_and_empty_payload() {
        assert!(matches!(
            "d0u1".parse::<VertexId>(),
            Err(IdentifierParseError::MissingColon(_))
        ));
        assert_eq!(
            "message:".parse::<MessageId>().unwrap_err(),
            IdentifierParseError::EmptyPayload
        );
    }

    #[test]
    fn try_new_rejects_empty_payload() {
        assert_eq!(
            VertexId::try_new("").unwrap_err(),
            IdentifierParseError::EmptyPayload
        );
        let id = VertexId::try_new("d0u0").unwrap();
        assert_eq!(id.to_string().parse::<VertexId>().unwrap(), id);

        // Unchecked construction does not survive a round trip.
        let json = serde_json::to_string(&VertexId::new("")).unwrap();
        assert_eq!(json, "\"vertex:\"");
        assert!(serde_json::from_str::<VertexId>(&json).is_err());
    }

    #[test]
    fn roundtrip() {
        let id = MessageId::new("d1u0#3");
        let s = id.to_string();
        assert_eq!(s, "message:d1u0#3");
        let id2: MessageId = s.parse().unwrap();
        assert_eq!(id, id2);
    }

    #[test]
    fn serializes_as_text() {
        let id = VertexId::new("d2");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"vertex:d2\"");
        let back: VertexId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<MessageId>(&json).is_err());
    }
}
