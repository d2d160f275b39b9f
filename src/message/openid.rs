//! OpenID association message types
//!
//! The associate handshake (plain and Diffie-Hellman variants), the
//! unsupported-type negotiation response, and the direct error response
//! every provider can substitute for a success. Also home to the UI-mode
//! extension, registered with the extension registry by its type URI.

use std::collections::BTreeMap;

use super::descriptor::{FieldAccessor, FieldDescriptor, FieldEncoding, encode_bool, parse_bool};
use super::extensions::{ExtensionDescriptor, MessageExtension};
use super::{Direction, Message, ProtocolVersion};
use crate::error::{AuthWireError, Result};
use crate::types::AssociationHandle;

/// Namespace value carried in the `ns` field of OpenID 2.0 messages
pub const OPENID2_NAMESPACE: &str = "http://specs.openid.net/auth/2.0";

/// Mode value for associate requests
pub const ASSOCIATE_MODE: &str = "associate";

/// Error code a provider returns when it rejects the requested
/// association or session type
pub const UNSUPPORTED_TYPE_CODE: &str = "unsupported-type";

// ============================================================================
// Associate Request
// ============================================================================

/// Request to establish a shared-secret association with a provider
///
/// This is the one message type in the set that accepts extensions.
#[derive(Debug)]
pub struct AssociateRequest {
    version: ProtocolVersion,
    /// Requested signature algorithm wire name (e.g. `HMAC-SHA256`)
    pub assoc_type: Option<String>,
    /// Requested key-exchange session wire name (e.g. `DH-SHA256`)
    pub session_type: Option<String>,
    /// Diffie-Hellman modulus, base64 btwoc, when overriding the default
    pub dh_modulus: Option<String>,
    /// Diffie-Hellman generator, base64 btwoc, when overriding the default
    pub dh_gen: Option<String>,
    /// The consumer's ephemeral public key, base64 btwoc
    pub dh_consumer_public: Option<String>,
    extensions: Vec<Box<dyn MessageExtension>>,
    extra_data: BTreeMap<String, String>,
}

impl AssociateRequest {
    /// Create an associate request for the given type pair
    #[must_use]
    pub fn new(version: ProtocolVersion, assoc_type: String, session_type: String) -> Self {
        Self {
            version,
            assoc_type: Some(assoc_type),
            session_type: Some(session_type),
            dh_modulus: None,
            dh_gen: None,
            dh_consumer_public: None,
            extensions: Vec::new(),
            extra_data: BTreeMap::new(),
        }
    }
}

static ASSOCIATE_REQUEST_FIELDS: [FieldAccessor<AssociateRequest>; 7] = [
    FieldAccessor {
        descriptor: FieldDescriptor {
            name: "ns",
            required: true,
            allow_empty: false,
            min_version: ProtocolVersion::V2_0,
            encoding: FieldEncoding::Uri,
        },
        get: |_| Some(OPENID2_NAMESPACE.to_string()),
        set: |m, v| {
            if v != OPENID2_NAMESPACE {
                return Err(AuthWireError::validation_field(
                    "unrecognized namespace",
                    "ns",
                ));
            }
            let _ = m;
            Ok(())
        },
    },
    FieldAccessor {
        descriptor: FieldDescriptor {
            name: "mode",
            required: true,
            allow_empty: false,
            min_version: ProtocolVersion::V1_1,
            encoding: FieldEncoding::Text,
        },
        get: |_| Some(ASSOCIATE_MODE.to_string()),
        set: |m, v| {
            if v != ASSOCIATE_MODE {
                return Err(AuthWireError::validation_field("unexpected mode", "mode"));
            }
            let _ = m;
            Ok(())
        },
    },
    FieldAccessor {
        descriptor: FieldDescriptor {
            name: "assoc_type",
            required: true,
            allow_empty: false,
            min_version: ProtocolVersion::V1_1,
            encoding: FieldEncoding::Text,
        },
        get: |m| m.assoc_type.clone(),
        set: |m, v| {
            m.assoc_type = Some(v.to_string());
            Ok(())
        },
    },
    FieldAccessor {
        descriptor: FieldDescriptor {
            name: "session_type",
            required: true,
            allow_empty: true,
            min_version: ProtocolVersion::V1_1,
            encoding: FieldEncoding::Text,
        },
        get: |m| m.session_type.clone(),
        set: |m, v| {
            m.session_type = Some(v.to_string());
            Ok(())
        },
    },
    FieldAccessor {
        descriptor: FieldDescriptor {
            name: "dh_modulus",
            required: false,
            allow_empty: false,
            min_version: ProtocolVersion::V1_1,
            encoding: FieldEncoding::Text,
        },
        get: |m| m.dh_modulus.clone(),
        set: |m, v| {
            m.dh_modulus = Some(v.to_string());
            Ok(())
        },
    },
    FieldAccessor {
        descriptor: FieldDescriptor {
            name: "dh_gen",
            required: false,
            allow_empty: false,
            min_version: ProtocolVersion::V1_1,
            encoding: FieldEncoding::Text,
        },
        get: |m| m.dh_gen.clone(),
        set: |m, v| {
            m.dh_gen = Some(v.to_string());
            Ok(())
        },
    },
    FieldAccessor {
        descriptor: FieldDescriptor {
            name: "dh_consumer_public",
            required: false,
            allow_empty: false,
            min_version: ProtocolVersion::V1_1,
            encoding: FieldEncoding::Text,
        },
        get: |m| m.dh_consumer_public.clone(),
        set: |m, v| {
            m.dh_consumer_public = Some(v.to_string());
            Ok(())
        },
    },
];

impl Message for AssociateRequest {
    fn message_name() -> &'static str {
        "associate request"
    }

    fn direction() -> Direction {
        Direction::Request
    }

    fn field_table() -> &'static [FieldAccessor<Self>] {
        &ASSOCIATE_REQUEST_FIELDS
    }

    fn version(&self) -> ProtocolVersion {
        self.version
    }

    fn from_version(version: ProtocolVersion) -> Self {
        Self {
            version,
            assoc_type: None,
            session_type: None,
            dh_modulus: None,
            dh_gen: None,
            dh_consumer_public: None,
            extensions: Vec::new(),
            extra_data: BTreeMap::new(),
        }
    }

    fn extra_data(&self) -> &BTreeMap<String, String> {
        &self.extra_data
    }

    fn extra_data_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.extra_data
    }

    fn extensions(&self) -> &[Box<dyn MessageExtension>] {
        &self.extensions
    }

    fn attach_extension(&mut self, extension: Box<dyn MessageExtension>) -> Result<()> {
        self.extensions.push(extension);
        Ok(())
    }
}

// ============================================================================
// Associate Responses
// ============================================================================

/// Successful associate response
#[derive(Debug, Clone, PartialEq)]
pub struct AssociateSuccessResponse {
    version: ProtocolVersion,
    /// Provider-issued opaque association handle
    pub assoc_handle: Option<AssociationHandle>,
    /// Granted signature algorithm wire name
    pub assoc_type: Option<String>,
    /// Granted session type wire name
    pub session_type: Option<String>,
    /// Association lifetime in seconds
    pub expires_in: Option<u64>,
    /// Plaintext MAC key, base64 (no-encryption sessions only)
    pub mac_key: Option<String>,
    /// Provider's ephemeral public key, base64 btwoc (DH sessions)
    pub dh_server_public: Option<String>,
    /// MAC key XOR-wrapped with the DH-derived digest, base64
    pub enc_mac_key: Option<String>,
    extra_data: BTreeMap<String, String>,
}

impl AssociateSuccessResponse {
    /// Create a success response skeleton for the granted type pair
    #[must_use]
    pub fn new(
        version: ProtocolVersion,
        assoc_handle: AssociationHandle,
        assoc_type: String,
        session_type: String,
        expires_in: u64,
    ) -> Self {
        Self {
            version,
            assoc_handle: Some(assoc_handle),
            assoc_type: Some(assoc_type),
            session_type: Some(session_type),
            expires_in: Some(expires_in),
            mac_key: None,
            dh_server_public: None,
            enc_mac_key: None,
            extra_data: BTreeMap::new(),
        }
    }
}

static ASSOCIATE_SUCCESS_FIELDS: [FieldAccessor<AssociateSuccessResponse>; 8] = [
    FieldAccessor {
        descriptor: FieldDescriptor {
            name: "ns",
            required: true,
            allow_empty: false,
            min_version: ProtocolVersion::V2_0,
            encoding: FieldEncoding::Uri,
        },
        get: |_| Some(OPENID2_NAMESPACE.to_string()),
        set: |m, v| {
            if v != OPENID2_NAMESPACE {
                return Err(AuthWireError::validation_field(
                    "unrecognized namespace",
                    "ns",
                ));
            }
            let _ = m;
            Ok(())
        },
    },
    FieldAccessor {
        descriptor: FieldDescriptor {
            name: "assoc_handle",
            required: true,
            allow_empty: false,
            min_version: ProtocolVersion::V1_1,
            encoding: FieldEncoding::Text,
        },
        get: |m| m.assoc_handle.as_ref().map(|h| h.as_str().to_string()),
        set: |m, v| {
            m.assoc_handle = Some(AssociationHandle::new(v));
            Ok(())
        },
    },
    FieldAccessor {
        descriptor: FieldDescriptor {
            name: "assoc_type",
            required: true,
            allow_empty: false,
            min_version: ProtocolVersion::V1_1,
            encoding: FieldEncoding::Text,
        },
        get: |m| m.assoc_type.clone(),
        set: |m, v| {
            m.assoc_type = Some(v.to_string());
            Ok(())
        },
    },
    FieldAccessor {
        descriptor: FieldDescriptor {
            name: "session_type",
            required: false,
            allow_empty: true,
            min_version: ProtocolVersion::V1_1,
            encoding: FieldEncoding::Text,
        },
        get: |m| m.session_type.clone(),
        set: |m, v| {
            m.session_type = Some(v.to_string());
            Ok(())
        },
    },
    FieldAccessor {
        descriptor: FieldDescriptor {
            name: "expires_in",
            required: true,
            allow_empty: false,
            min_version: ProtocolVersion::V1_1,
            encoding: FieldEncoding::Text,
        },
        get: |m| m.expires_in.map(|secs| secs.to_string()),
        set: |m, v| {
            m.expires_in = Some(v.parse().map_err(|_| {
                AuthWireError::validation_field("expected seconds count", "expires_in")
            })?);
            Ok(())
        },
    },
    FieldAccessor {
        descriptor: FieldDescriptor {
            name: "mac_key",
            required: false,
            allow_empty: false,
            min_version: ProtocolVersion::V1_1,
            encoding: FieldEncoding::Text,
        },
        get: |m| m.mac_key.clone(),
        set: |m, v| {
            m.mac_key = Some(v.to_string());
            Ok(())
        },
    },
    FieldAccessor {
        descriptor: FieldDescriptor {
            name: "dh_server_public",
            required: false,
            allow_empty: false,
            min_version: ProtocolVersion::V1_1,
            encoding: FieldEncoding::Text,
        },
        get: |m| m.dh_server_public.clone(),
        set: |m, v| {
            m.dh_server_public = Some(v.to_string());
            Ok(())
        },
    },
    FieldAccessor {
        descriptor: FieldDescriptor {
            name: "enc_mac_key",
            required: false,
            allow_empty: false,
            min_version: ProtocolVersion::V1_1,
            encoding: FieldEncoding::Text,
        },
        get: |m| m.enc_mac_key.clone(),
        set: |m, v| {
            m.enc_mac_key = Some(v.to_string());
            Ok(())
        },
    },
];

impl Message for AssociateSuccessResponse {
    fn message_name() -> &'static str {
        "associate success response"
    }

    fn direction() -> Direction {
        Direction::Response
    }

    fn field_table() -> &'static [FieldAccessor<Self>] {
        &ASSOCIATE_SUCCESS_FIELDS
    }

    fn version(&self) -> ProtocolVersion {
        self.version
    }

    fn from_version(version: ProtocolVersion) -> Self {
        Self {
            version,
            assoc_handle: None,
            assoc_type: None,
            session_type: None,
            expires_in: None,
            mac_key: None,
            dh_server_public: None,
            enc_mac_key: None,
            extra_data: BTreeMap::new(),
        }
    }

    fn extra_data(&self) -> &BTreeMap<String, String> {
        &self.extra_data
    }

    fn extra_data_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.extra_data
    }
}

/// Unsupported-type associate response
///
/// Carries the provider's preferred type pair so the consumer can retry
/// the negotiation once.
#[derive(Debug, Clone, PartialEq)]
pub struct AssociateUnsuccessfulResponse {
    version: ProtocolVersion,
    /// Human-readable rejection text
    pub error: Option<String>,
    /// Machine-readable error code (`unsupported-type`)
    pub error_code: Option<String>,
    /// Signature algorithm the provider prefers
    pub assoc_type: Option<String>,
    /// Session type the provider prefers
    pub session_type: Option<String>,
    extra_data: BTreeMap<String, String>,
}

impl AssociateUnsuccessfulResponse {
    /// Create an unsupported-type response naming the provider preference
    #[must_use]
    pub fn new(
        version: ProtocolVersion,
        error: String,
        assoc_type: Option<String>,
        session_type: Option<String>,
    ) -> Self {
        Self {
            version,
            error: Some(error),
            error_code: Some(UNSUPPORTED_TYPE_CODE.to_string()),
            assoc_type,
            session_type,
            extra_data: BTreeMap::new(),
        }
    }
}

static ASSOCIATE_UNSUCCESSFUL_FIELDS: [FieldAccessor<AssociateUnsuccessfulResponse>; 5] = [
    FieldAccessor {
        descriptor: FieldDescriptor {
            name: "ns",
            required: true,
            allow_empty: false,
            min_version: ProtocolVersion::V2_0,
            encoding: FieldEncoding::Uri,
        },
        get: |_| Some(OPENID2_NAMESPACE.to_string()),
        set: |m, v| {
            if v != OPENID2_NAMESPACE {
                return Err(AuthWireError::validation_field(
                    "unrecognized namespace",
                    "ns",
                ));
            }
            let _ = m;
            Ok(())
        },
    },
    FieldAccessor {
        descriptor: FieldDescriptor {
            name: "error",
            required: true,
            allow_empty: false,
            min_version: ProtocolVersion::V1_1,
            encoding: FieldEncoding::Text,
        },
        get: |m| m.error.clone(),
        set: |m, v| {
            m.error = Some(v.to_string());
            Ok(())
        },
    },
    FieldAccessor {
        descriptor: FieldDescriptor {
            name: "error_code",
            required: true,
            allow_empty: false,
            min_version: ProtocolVersion::V1_1,
            encoding: FieldEncoding::Text,
        },
        get: |m| m.error_code.clone(),
        set: |m, v| {
            m.error_code = Some(v.to_string());
            Ok(())
        },
    },
    FieldAccessor {
        descriptor: FieldDescriptor {
            name: "assoc_type",
            required: false,
            allow_empty: false,
            min_version: ProtocolVersion::V1_1,
            encoding: FieldEncoding::Text,
        },
        get: |m| m.assoc_type.clone(),
        set: |m, v| {
            m.assoc_type = Some(v.to_string());
            Ok(())
        },
    },
    FieldAccessor {
        descriptor: FieldDescriptor {
            name: "session_type",
            required: false,
            allow_empty: true,
            min_version: ProtocolVersion::V1_1,
            encoding: FieldEncoding::Text,
        },
        get: |m| m.session_type.clone(),
        set: |m, v| {
            m.session_type = Some(v.to_string());
            Ok(())
        },
    },
];

impl Message for AssociateUnsuccessfulResponse {
    fn message_name() -> &'static str {
        "associate unsuccessful response"
    }

    fn direction() -> Direction {
        Direction::Response
    }

    fn field_table() -> &'static [FieldAccessor<Self>] {
        &ASSOCIATE_UNSUCCESSFUL_FIELDS
    }

    fn version(&self) -> ProtocolVersion {
        self.version
    }

    fn from_version(version: ProtocolVersion) -> Self {
        Self {
            version,
            error: None,
            error_code: None,
            assoc_type: None,
            session_type: None,
            extra_data: BTreeMap::new(),
        }
    }

    fn extra_data(&self) -> &BTreeMap<String, String> {
        &self.extra_data
    }

    fn extra_data_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.extra_data
    }
}

// ============================================================================
// Direct Error Response
// ============================================================================

/// Machine-readable error a provider returns in place of any direct
/// response. Carries HTTP 400 semantics.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectErrorResponse {
    version: ProtocolVersion,
    /// Human-readable error text
    pub error: Option<String>,
    /// Contact address for the provider's administrator
    pub contact: Option<String>,
    /// Reference URI with more information
    pub reference: Option<String>,
    extra_data: BTreeMap<String, String>,
}

impl DirectErrorResponse {
    /// Create a direct error response
    #[must_use]
    pub fn new(version: ProtocolVersion, error: String) -> Self {
        Self {
            version,
            error: Some(error),
            contact: None,
            reference: None,
            extra_data: BTreeMap::new(),
        }
    }

    /// The HTTP status these responses travel with
    #[must_use]
    pub fn http_status(&self) -> u16 {
        400
    }
}

static DIRECT_ERROR_FIELDS: [FieldAccessor<DirectErrorResponse>; 4] = [
    FieldAccessor {
        descriptor: FieldDescriptor {
            name: "ns",
            required: true,
            allow_empty: false,
            min_version: ProtocolVersion::V2_0,
            encoding: FieldEncoding::Uri,
        },
        get: |_| Some(OPENID2_NAMESPACE.to_string()),
        set: |m, v| {
            if v != OPENID2_NAMESPACE {
                return Err(AuthWireError::validation_field(
                    "unrecognized namespace",
                    "ns",
                ));
            }
            let _ = m;
            Ok(())
        },
    },
    FieldAccessor {
        descriptor: FieldDescriptor {
            name: "error",
            required: true,
            allow_empty: false,
            min_version: ProtocolVersion::V1_1,
            encoding: FieldEncoding::Text,
        },
        get: |m| m.error.clone(),
        set: |m, v| {
            m.error = Some(v.to_string());
            Ok(())
        },
    },
    FieldAccessor {
        descriptor: FieldDescriptor {
            name: "contact",
            required: false,
            allow_empty: false,
            min_version: ProtocolVersion::V1_1,
            encoding: FieldEncoding::Text,
        },
        get: |m| m.contact.clone(),
        set: |m, v| {
            m.contact = Some(v.to_string());
            Ok(())
        },
    },
    FieldAccessor {
        descriptor: FieldDescriptor {
            name: "reference",
            required: false,
            allow_empty: false,
            min_version: ProtocolVersion::V1_1,
            encoding: FieldEncoding::Text,
        },
        get: |m| m.reference.clone(),
        set: |m, v| {
            m.reference = Some(v.to_string());
            Ok(())
        },
    },
];

impl Message for DirectErrorResponse {
    fn message_name() -> &'static str {
        "direct error response"
    }

    fn direction() -> Direction {
        Direction::Response
    }

    fn field_table() -> &'static [FieldAccessor<Self>] {
        &DIRECT_ERROR_FIELDS
    }

    fn version(&self) -> ProtocolVersion {
        self.version
    }

    fn from_version(version: ProtocolVersion) -> Self {
        Self {
            version,
            error: None,
            contact: None,
            reference: None,
            extra_data: BTreeMap::new(),
        }
    }

    fn extra_data(&self) -> &BTreeMap<String, String> {
        &self.extra_data
    }

    fn extra_data_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.extra_data
    }
}

// ============================================================================
// UI Mode Extension
// ============================================================================

/// Type URI of the UI-mode extension
pub const UI_EXTENSION_TYPE_URI: &str = "http://specs.openid.net/extensions/ui/1.0";

/// UI-mode extension request
///
/// Lets a relying party tell the provider how its authentication page is
/// hosted: a popup mode, the user's language priority list, and whether
/// the provider should display the relying party's icon.
#[derive(Debug, Clone, PartialEq)]
pub struct UiModeRequest {
    /// UI style the relying party is hosting the provider's page in
    pub mode: String,
    /// Comma-separated language priority list, e.g. `fr-CA,fr-FR,en-CA`
    pub language_preference: Option<String>,
    /// Whether the provider should display the relying party's icon
    pub icon: Option<bool>,
}

impl UiModeRequest {
    /// Create a popup-mode request
    #[must_use]
    pub fn popup() -> Self {
        Self {
            mode: "popup".to_string(),
            language_preference: None,
            icon: None,
        }
    }

    /// Registration record for the extension registry
    #[must_use]
    pub fn extension_descriptor() -> ExtensionDescriptor {
        ExtensionDescriptor {
            type_uri: UI_EXTENSION_TYPE_URI,
            field_names: &["ui.mode", "ui.lang", "ui.icon"],
            construct: |fields| {
                let mode = fields
                    .get("ui.mode")
                    .ok_or_else(|| {
                        AuthWireError::validation_field("required field is missing", "ui.mode")
                    })?
                    .clone();
                let icon = fields.get("ui.icon").map(|v| parse_bool(v)).transpose()?;
                Ok(Box::new(UiModeRequest {
                    mode,
                    language_preference: fields.get("ui.lang").cloned(),
                    icon,
                }))
            },
        }
    }
}

impl MessageExtension for UiModeRequest {
    fn type_uri(&self) -> &'static str {
        UI_EXTENSION_TYPE_URI
    }

    fn serialize_fields(&self) -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();
        fields.insert("ui.mode".to_string(), self.mode.clone());
        if let Some(ref lang) = self.language_preference {
            fields.insert("ui.lang".to_string(), lang.clone());
        }
        if let Some(icon) = self.icon {
            fields.insert("ui.icon".to_string(), encode_bool(icon));
        }
        fields
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
