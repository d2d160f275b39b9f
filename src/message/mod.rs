//! Protocol message model
//!
//! A message is a typed bag of named fields with a protocol version, a
//! direction, and optionally attached extensions. Each message type
//! declares a static field-descriptor table mapping its typed fields to
//! the flat string mapping that travels on the wire; no runtime type
//! inspection is involved.
//!
//! # Example
//!
//! ```
//! use authwire::message::{serialize, deserialize, ExtensionRegistry};
//! use authwire::message::oauth::UnauthorizedTokenRequest;
//! use authwire::message::ProtocolVersion;
//!
//! let request = UnauthorizedTokenRequest::new(
//!     ProtocolVersion::V1_0A,
//!     "my-consumer".into(),
//!     Some("https://consumer.example/ready".parse().unwrap()),
//! );
//! let fields = serialize(&request).unwrap();
//! assert_eq!(fields["oauth_consumer_key"], "my-consumer");
//!
//! let registry = ExtensionRegistry::new();
//! let back: UnauthorizedTokenRequest =
//!     deserialize(&fields, ProtocolVersion::V1_0A, &registry).unwrap();
//! assert_eq!(back, request);
//! ```

pub mod descriptor;
pub mod extensions;
pub mod oauth;
pub mod openid;

use std::collections::BTreeMap;

use crate::error::{AuthWireError, Result};

pub use descriptor::{
    FieldAccessor, FieldDescriptor, FieldEncoding, deserialize, encode_bool, encode_timestamp,
    parse_bool, parse_timestamp, serialize,
};
pub use extensions::{ExtensionDescriptor, ExtensionRegistry, MessageExtension, ParsedExtension};

/// Protocol versions recognized across the OAuth and OpenID message sets.
///
/// Ordering follows protocol evolution, so version gates can be expressed
/// as `min_version` comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProtocolVersion {
    /// OAuth 1.0
    V1_0,
    /// OAuth 1.0a (callback confirmation, verifier)
    V1_0A,
    /// OpenID 1.1
    V1_1,
    /// OpenID 2.0
    V2_0,
}

impl ProtocolVersion {
    /// Wire representation of the version
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V1_0 => "1.0",
            Self::V1_0A => "1.0a",
            Self::V1_1 => "1.1",
            Self::V2_0 => "2.0",
        }
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether a message travels toward the provider or back from it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Sent by the consumer/relying party
    Request,
    /// Returned by the provider
    Response,
}

/// Wire-level protections a message can require or a binding element can
/// supply.
///
/// Declaration order is the outgoing application order: expiration is
/// stamped first and the signature is computed last so it covers
/// everything; incoming processing runs in exact reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProtectionKind {
    /// Message lifetime stamping and checking
    Expiration,
    /// Nonce-based replay detection
    ReplayProtection,
    /// Signature-based tamper evidence
    TamperProtection,
}

/// A typed protocol message.
///
/// Implementations declare their wire shape through a static
/// [`FieldAccessor`] table; serialization and deserialization are driven
/// entirely by that table plus the message's declared version.
pub trait Message: Sized + Send + Sync {
    /// Human-readable message name for diagnostics
    fn message_name() -> &'static str;

    /// Which way this message type travels
    fn direction() -> Direction;

    /// The static field-descriptor table for this message type
    fn field_table() -> &'static [FieldAccessor<Self>];

    /// The protocol version this instance declares
    fn version(&self) -> ProtocolVersion;

    /// Construct a blank instance at the given version, ready to receive
    /// deserialized fields
    fn from_version(version: ProtocolVersion) -> Self;

    /// Unrecognized incoming fields, preserved verbatim
    fn extra_data(&self) -> &BTreeMap<String, String>;

    /// Mutable access to the preserved extra data
    fn extra_data_mut(&mut self) -> &mut BTreeMap<String, String>;

    /// Protections that must have been applied before an incoming
    /// instance of this type may be trusted
    fn required_protections() -> &'static [ProtectionKind] {
        &[]
    }

    /// Extensions attached to this instance
    fn extensions(&self) -> &[Box<dyn MessageExtension>] {
        &[]
    }

    /// Attach an extension to this instance.
    ///
    /// # Errors
    /// Returns a validation error for message types that do not carry
    /// extensions.
    fn attach_extension(&mut self, extension: Box<dyn MessageExtension>) -> Result<()> {
        let _ = extension;
        Err(AuthWireError::validation(format!(
            "{} does not accept extensions",
            Self::message_name()
        )))
    }
}
