//! Static field descriptors and the tolerant serializer
//!
//! Each message type declares its wire shape once, as a static table of
//! [`FieldAccessor`] entries. Serialization walks the table and the
//! attached extensions; deserialization is tolerant, preserving anything
//! it does not recognize as opaque extra data.

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::extensions::ExtensionRegistry;
use super::{Message, ProtocolVersion};
use crate::error::{AuthWireError, Result};

// ============================================================================
// Field Metadata
// ============================================================================

/// How a field value is encoded on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldEncoding {
    /// String passthrough
    Text,
    /// The fixed literal pair `true` / `false`
    Boolean,
    /// Absolute-URI text
    Uri,
    /// Decimal seconds since the Unix epoch
    Timestamp,
}

/// Per-field wire metadata, declared statically per message type
#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    /// Wire name of the field
    pub name: &'static str,
    /// Whether the field must be present at serialization time
    pub required: bool,
    /// Whether an empty value is acceptable
    pub allow_empty: bool,
    /// Minimum protocol version at which the field is recognized
    pub min_version: ProtocolVersion,
    /// Encoding rule applied to the value
    pub encoding: FieldEncoding,
}

/// A field descriptor paired with typed get/set accessors for one
/// message type.
///
/// The accessors are plain function pointers so the whole table can live
/// in a `static`.
pub struct FieldAccessor<M> {
    /// Wire metadata for the field
    pub descriptor: FieldDescriptor,
    /// Read the field from a message, already wire-encoded
    pub get: fn(&M) -> Option<String>,
    /// Parse a wire value into the message's typed field
    pub set: fn(&mut M, &str) -> Result<()>,
}

// ============================================================================
// Encoding Helpers
// ============================================================================

/// Encode a boolean as its wire literal
#[must_use]
pub fn encode_bool(value: bool) -> String {
    if value { "true" } else { "false" }.to_string()
}

/// Parse a wire boolean literal
///
/// # Errors
/// Returns a validation error for anything other than `true` / `false`.
pub fn parse_bool(value: &str) -> Result<bool> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(AuthWireError::validation(format!(
            "expected boolean literal, got {other:?}"
        ))),
    }
}

/// Encode a timestamp as decimal seconds since the Unix epoch
#[must_use]
pub fn encode_timestamp(time: SystemTime) -> String {
    time.duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
        .to_string()
}

/// Parse a decimal-seconds timestamp
///
/// # Errors
/// Returns a validation error if the value is not a decimal integer.
pub fn parse_timestamp(value: &str) -> Result<SystemTime> {
    let secs: u64 = value
        .parse()
        .map_err(|_| AuthWireError::validation(format!("invalid timestamp {value:?}")))?;
    Ok(UNIX_EPOCH + Duration::from_secs(secs))
}

fn validate_encoding(descriptor: &FieldDescriptor, value: &str) -> Result<()> {
    match descriptor.encoding {
        FieldEncoding::Text => Ok(()),
        FieldEncoding::Boolean => parse_bool(value).map(|_| ()),
        FieldEncoding::Timestamp => parse_timestamp(value).map(|_| ()),
        FieldEncoding::Uri => {
            let parsed: url::Url = value.parse().map_err(|_| {
                AuthWireError::validation_field("field is not an absolute URI", descriptor.name)
            })?;
            if parsed.cannot_be_a_base() {
                return Err(AuthWireError::validation_field(
                    "field is not an absolute URI",
                    descriptor.name,
                ));
            }
            Ok(())
        }
    }
}

fn insert_unique(fields: &mut BTreeMap<String, String>, name: String, value: String) -> Result<()> {
    if fields.contains_key(&name) {
        return Err(AuthWireError::validation_field(
            "field name collides within the flattened wire representation",
            name,
        ));
    }
    fields.insert(name, value);
    Ok(())
}

fn is_extension_marker(key: &str) -> bool {
    key.strip_prefix("ns.")
        .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
}

// ============================================================================
// Serialization
// ============================================================================

/// Serialize a typed message into its flat wire mapping.
///
/// Walks the message's declared fields plus every attached extension's
/// fields. Fields gated above the message's declared version are
/// excluded.
///
/// # Errors
/// Returns a validation error when a required field is unset, an
/// allow-empty constraint is violated, a value does not match its
/// declared encoding, or a field name collides across the base message
/// and its extensions.
pub fn serialize<M: Message + 'static>(message: &M) -> Result<BTreeMap<String, String>> {
    let version = message.version();
    let mut fields = BTreeMap::new();

    for accessor in M::field_table() {
        let d = &accessor.descriptor;
        if d.min_version > version {
            continue;
        }
        match (accessor.get)(message) {
            Some(value) => {
                if value.is_empty() && !d.allow_empty {
                    return Err(AuthWireError::validation_field(
                        "field may not be empty",
                        d.name,
                    ));
                }
                if !value.is_empty() {
                    validate_encoding(d, &value)?;
                }
                insert_unique(&mut fields, d.name.to_string(), value)?;
            }
            None if d.required => {
                return Err(AuthWireError::validation_field(
                    "required field is unset",
                    d.name,
                ));
            }
            None => {}
        }
    }

    for (ordinal, extension) in message.extensions().iter().enumerate() {
        insert_unique(
            &mut fields,
            format!("ns.{ordinal}"),
            extension.type_uri().to_string(),
        )?;
        for (name, value) in extension.serialize_fields() {
            insert_unique(&mut fields, name, value)?;
        }
    }

    for (name, value) in message.extra_data() {
        insert_unique(&mut fields, name.clone(), value.clone())?;
    }

    Ok(fields)
}

// ============================================================================
// Deserialization
// ============================================================================

/// Deserialize a flat wire mapping into a typed message.
///
/// Tolerant by design: fields matching no descriptor at the declared
/// version are preserved verbatim as extra data, and version-gated
/// fields present on an older-version message are treated the same way
/// rather than failing. Known extension type URIs found among the
/// `ns.<ordinal>` markers are attached through the registry; unknown
/// ones stay behind as opaque extra data.
///
/// # Errors
/// Returns a validation error naming the field when a required field is
/// absent or a recognized field fails to parse.
pub fn deserialize<M: Message + 'static>(
    fields: &BTreeMap<String, String>,
    version: ProtocolVersion,
    registry: &ExtensionRegistry,
) -> Result<M> {
    let mut message = M::from_version(version);
    let mut remaining = fields.clone();

    for accessor in M::field_table() {
        let d = &accessor.descriptor;
        if d.min_version > version {
            continue;
        }
        match remaining.remove(d.name) {
            Some(value) => {
                if value.is_empty() && !d.allow_empty {
                    return Err(AuthWireError::validation_field(
                        "field may not be empty",
                        d.name,
                    ));
                }
                (accessor.set)(&mut message, &value)?;
            }
            None if d.required => {
                return Err(AuthWireError::validation_field(
                    "required field is missing",
                    d.name,
                ));
            }
            None => {}
        }
    }

    let markers: Vec<(String, String)> = remaining
        .iter()
        .filter(|(key, _)| is_extension_marker(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    for (marker, type_uri) in markers {
        if let Some(parsed) = registry.create(&type_uri, &remaining)? {
            remaining.remove(&marker);
            for name in parsed.consumed {
                remaining.remove(*name);
            }
            message.attach_extension(parsed.extension)?;
        }
    }

    *message.extra_data_mut() = remaining;
    Ok(message)
}
