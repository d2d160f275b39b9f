//! OAuth consumer message types
//!
//! The request/response pairs exchanged during the token lifecycle:
//! obtaining an unauthorized request token, finalizing user
//! authorization, exchanging for an access token, and addressing
//! protected resources. Signature, nonce, and timestamp fields are not
//! declared here; the binding element pipeline owns those.

use std::collections::BTreeMap;

use url::Url;

use super::descriptor::{FieldAccessor, FieldDescriptor, FieldEncoding, encode_bool, parse_bool};
use super::{Direction, Message, ProtectionKind, ProtocolVersion};
use crate::error::{AuthWireError, Result};
use crate::types::{ConsumerKey, TokenIdentifier};

const SIGNED_REQUEST_PROTECTIONS: &[ProtectionKind] = &[
    ProtectionKind::Expiration,
    ProtectionKind::ReplayProtection,
    ProtectionKind::TamperProtection,
];

fn parse_url(value: &str, field: &'static str) -> Result<Url> {
    value
        .parse()
        .map_err(|_| AuthWireError::validation_field("field is not an absolute URI", field))
}

// ============================================================================
// Request Token Exchange
// ============================================================================

/// Request for an unauthorized request token
#[derive(Debug, Clone, PartialEq)]
pub struct UnauthorizedTokenRequest {
    version: ProtocolVersion,
    /// The consumer requesting a token
    pub consumer_key: Option<ConsumerKey>,
    /// Where the provider should send the user after authorization.
    /// Recognized from OAuth 1.0a onward.
    pub callback: Option<Url>,
    extra_data: BTreeMap<String, String>,
}

impl UnauthorizedTokenRequest {
    /// Create a request for the given consumer
    #[must_use]
    pub fn new(version: ProtocolVersion, consumer_key: ConsumerKey, callback: Option<Url>) -> Self {
        Self {
            version,
            consumer_key: Some(consumer_key),
            callback,
            extra_data: BTreeMap::new(),
        }
    }
}

static UNAUTHORIZED_TOKEN_REQUEST_FIELDS: [FieldAccessor<UnauthorizedTokenRequest>; 2] = [
    FieldAccessor {
        descriptor: FieldDescriptor {
            name: "oauth_consumer_key",
            required: true,
            allow_empty: false,
            min_version: ProtocolVersion::V1_0,
            encoding: FieldEncoding::Text,
        },
        get: |m| m.consumer_key.as_ref().map(|k| k.as_str().to_string()),
        set: |m, v| {
            m.consumer_key = Some(ConsumerKey::new(v));
            Ok(())
        },
    },
    FieldAccessor {
        descriptor: FieldDescriptor {
            name: "oauth_callback",
            required: false,
            allow_empty: false,
            min_version: ProtocolVersion::V1_0A,
            encoding: FieldEncoding::Uri,
        },
        get: |m| m.callback.as_ref().map(Url::to_string),
        set: |m, v| {
            m.callback = Some(parse_url(v, "oauth_callback")?);
            Ok(())
        },
    },
];

impl Message for UnauthorizedTokenRequest {
    fn message_name() -> &'static str {
        "unauthorized token request"
    }

    fn direction() -> Direction {
        Direction::Request
    }

    fn field_table() -> &'static [FieldAccessor<Self>] {
        &UNAUTHORIZED_TOKEN_REQUEST_FIELDS
    }

    fn version(&self) -> ProtocolVersion {
        self.version
    }

    fn from_version(version: ProtocolVersion) -> Self {
        Self {
            version,
            consumer_key: None,
            callback: None,
            extra_data: BTreeMap::new(),
        }
    }

    fn extra_data(&self) -> &BTreeMap<String, String> {
        &self.extra_data
    }

    fn extra_data_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.extra_data
    }

    fn required_protections() -> &'static [ProtectionKind] {
        SIGNED_REQUEST_PROTECTIONS
    }
}

/// Provider response carrying a freshly issued, unauthorized token
#[derive(Debug, Clone, PartialEq)]
pub struct UnauthorizedTokenResponse {
    version: ProtocolVersion,
    /// The issued token identifier
    pub token: Option<TokenIdentifier>,
    /// The token secret paired with the identifier
    pub token_secret: Option<String>,
    /// Provider confirmation that it honored the callback parameter.
    /// Recognized from OAuth 1.0a onward.
    pub callback_confirmed: Option<bool>,
    extra_data: BTreeMap<String, String>,
}

impl UnauthorizedTokenResponse {
    /// Create a response carrying the issued pair
    #[must_use]
    pub fn new(version: ProtocolVersion, token: TokenIdentifier, token_secret: String) -> Self {
        Self {
            version,
            token: Some(token),
            token_secret: Some(token_secret),
            callback_confirmed: None,
            extra_data: BTreeMap::new(),
        }
    }
}

static UNAUTHORIZED_TOKEN_RESPONSE_FIELDS: [FieldAccessor<UnauthorizedTokenResponse>; 3] = [
    FieldAccessor {
        descriptor: FieldDescriptor {
            name: "oauth_token",
            required: true,
            allow_empty: false,
            min_version: ProtocolVersion::V1_0,
            encoding: FieldEncoding::Text,
        },
        get: |m| m.token.as_ref().map(|t| t.as_str().to_string()),
        set: |m, v| {
            m.token = Some(TokenIdentifier::new(v));
            Ok(())
        },
    },
    FieldAccessor {
        descriptor: FieldDescriptor {
            name: "oauth_token_secret",
            required: true,
            allow_empty: true,
            min_version: ProtocolVersion::V1_0,
            encoding: FieldEncoding::Text,
        },
        get: |m| m.token_secret.clone(),
        set: |m, v| {
            m.token_secret = Some(v.to_string());
            Ok(())
        },
    },
    FieldAccessor {
        descriptor: FieldDescriptor {
            name: "oauth_callback_confirmed",
            required: false,
            allow_empty: false,
            min_version: ProtocolVersion::V1_0A,
            encoding: FieldEncoding::Boolean,
        },
        get: |m| m.callback_confirmed.map(encode_bool),
        set: |m, v| {
            m.callback_confirmed = Some(parse_bool(v)?);
            Ok(())
        },
    },
];

impl Message for UnauthorizedTokenResponse {
    fn message_name() -> &'static str {
        "unauthorized token response"
    }

    fn direction() -> Direction {
        Direction::Response
    }

    fn field_table() -> &'static [FieldAccessor<Self>] {
        &UNAUTHORIZED_TOKEN_RESPONSE_FIELDS
    }

    fn version(&self) -> ProtocolVersion {
        self.version
    }

    fn from_version(version: ProtocolVersion) -> Self {
        Self {
            version,
            token: None,
            token_secret: None,
            callback_confirmed: None,
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
// User Authorization
// ============================================================================

/// The redirect that hands the request token to the resource owner
#[derive(Debug, Clone, PartialEq)]
pub struct UserAuthorizationRequest {
    version: ProtocolVersion,
    /// The request token being authorized
    pub token: Option<TokenIdentifier>,
    /// Pre-1.0a callback placement
    pub callback: Option<Url>,
    extra_data: BTreeMap<String, String>,
}

impl UserAuthorizationRequest {
    /// Create an authorization redirect for the given token
    #[must_use]
    pub fn new(version: ProtocolVersion, token: TokenIdentifier) -> Self {
        Self {
            version,
            token: Some(token),
            callback: None,
            extra_data: BTreeMap::new(),
        }
    }
}

static USER_AUTHORIZATION_REQUEST_FIELDS: [FieldAccessor<UserAuthorizationRequest>; 2] = [
    FieldAccessor {
        descriptor: FieldDescriptor {
            name: "oauth_token",
            required: true,
            allow_empty: false,
            min_version: ProtocolVersion::V1_0,
            encoding: FieldEncoding::Text,
        },
        get: |m| m.token.as_ref().map(|t| t.as_str().to_string()),
        set: |m, v| {
            m.token = Some(TokenIdentifier::new(v));
            Ok(())
        },
    },
    FieldAccessor {
        descriptor: FieldDescriptor {
            name: "oauth_callback",
            required: false,
            allow_empty: false,
            min_version: ProtocolVersion::V1_0,
            encoding: FieldEncoding::Uri,
        },
        get: |m| m.callback.as_ref().map(Url::to_string),
        set: |m, v| {
            m.callback = Some(parse_url(v, "oauth_callback")?);
            Ok(())
        },
    },
];

impl Message for UserAuthorizationRequest {
    fn message_name() -> &'static str {
        "user authorization request"
    }

    fn direction() -> Direction {
        Direction::Request
    }

    fn field_table() -> &'static [FieldAccessor<Self>] {
        &USER_AUTHORIZATION_REQUEST_FIELDS
    }

    fn version(&self) -> ProtocolVersion {
        self.version
    }

    fn from_version(version: ProtocolVersion) -> Self {
        Self {
            version,
            token: None,
            callback: None,
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

/// Callback parameters returned by the provider after the owner approves
#[derive(Debug, Clone, PartialEq)]
pub struct UserAuthorizationResponse {
    version: ProtocolVersion,
    /// The token the owner authorized
    pub token: Option<TokenIdentifier>,
    /// Verifier proving the owner completed authorization.
    /// Recognized from OAuth 1.0a onward.
    pub verifier: Option<String>,
    extra_data: BTreeMap<String, String>,
}

impl UserAuthorizationResponse {
    /// Create a callback response
    #[must_use]
    pub fn new(
        version: ProtocolVersion,
        token: TokenIdentifier,
        verifier: Option<String>,
    ) -> Self {
        Self {
            version,
            token: Some(token),
            verifier,
            extra_data: BTreeMap::new(),
        }
    }
}

static USER_AUTHORIZATION_RESPONSE_FIELDS: [FieldAccessor<UserAuthorizationResponse>; 2] = [
    FieldAccessor {
        descriptor: FieldDescriptor {
            name: "oauth_token",
            required: true,
            allow_empty: false,
            min_version: ProtocolVersion::V1_0,
            encoding: FieldEncoding::Text,
        },
        get: |m| m.token.as_ref().map(|t| t.as_str().to_string()),
        set: |m, v| {
            m.token = Some(TokenIdentifier::new(v));
            Ok(())
        },
    },
    FieldAccessor {
        descriptor: FieldDescriptor {
            name: "oauth_verifier",
            required: false,
            allow_empty: false,
            min_version: ProtocolVersion::V1_0A,
            encoding: FieldEncoding::Text,
        },
        get: |m| m.verifier.clone(),
        set: |m, v| {
            m.verifier = Some(v.to_string());
            Ok(())
        },
    },
];

impl Message for UserAuthorizationResponse {
    fn message_name() -> &'static str {
        "user authorization response"
    }

    fn direction() -> Direction {
        Direction::Response
    }

    fn field_table() -> &'static [FieldAccessor<Self>] {
        &USER_AUTHORIZATION_RESPONSE_FIELDS
    }

    fn version(&self) -> ProtocolVersion {
        self.version
    }

    fn from_version(version: ProtocolVersion) -> Self {
        Self {
            version,
            token: None,
            verifier: None,
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
// Access Token Exchange
// ============================================================================

/// Request exchanging an authorized request token for an access token
#[derive(Debug, Clone, PartialEq)]
pub struct AccessTokenRequest {
    version: ProtocolVersion,
    /// The consumer performing the exchange
    pub consumer_key: Option<ConsumerKey>,
    /// The authorized request token
    pub token: Option<TokenIdentifier>,
    /// Verifier obtained from the authorization callback.
    /// Recognized from OAuth 1.0a onward.
    pub verifier: Option<String>,
    extra_data: BTreeMap<String, String>,
}

impl AccessTokenRequest {
    /// Create an access-token exchange request
    #[must_use]
    pub fn new(
        version: ProtocolVersion,
        consumer_key: ConsumerKey,
        token: TokenIdentifier,
        verifier: Option<String>,
    ) -> Self {
        Self {
            version,
            consumer_key: Some(consumer_key),
            token: Some(token),
            verifier,
            extra_data: BTreeMap::new(),
        }
    }
}

static ACCESS_TOKEN_REQUEST_FIELDS: [FieldAccessor<AccessTokenRequest>; 3] = [
    FieldAccessor {
        descriptor: FieldDescriptor {
            name: "oauth_consumer_key",
            required: true,
            allow_empty: false,
            min_version: ProtocolVersion::V1_0,
            encoding: FieldEncoding::Text,
        },
        get: |m| m.consumer_key.as_ref().map(|k| k.as_str().to_string()),
        set: |m, v| {
            m.consumer_key = Some(ConsumerKey::new(v));
            Ok(())
        },
    },
    FieldAccessor {
        descriptor: FieldDescriptor {
            name: "oauth_token",
            required: true,
            allow_empty: false,
            min_version: ProtocolVersion::V1_0,
            encoding: FieldEncoding::Text,
        },
        get: |m| m.token.as_ref().map(|t| t.as_str().to_string()),
        set: |m, v| {
            m.token = Some(TokenIdentifier::new(v));
            Ok(())
        },
    },
    FieldAccessor {
        descriptor: FieldDescriptor {
            name: "oauth_verifier",
            required: false,
            allow_empty: false,
            min_version: ProtocolVersion::V1_0A,
            encoding: FieldEncoding::Text,
        },
        get: |m| m.verifier.clone(),
        set: |m, v| {
            m.verifier = Some(v.to_string());
            Ok(())
        },
    },
];

impl Message for AccessTokenRequest {
    fn message_name() -> &'static str {
        "access token request"
    }

    fn direction() -> Direction {
        Direction::Request
    }

    fn field_table() -> &'static [FieldAccessor<Self>] {
        &ACCESS_TOKEN_REQUEST_FIELDS
    }

    fn version(&self) -> ProtocolVersion {
        self.version
    }

    fn from_version(version: ProtocolVersion) -> Self {
        Self {
            version,
            consumer_key: None,
            token: None,
            verifier: None,
            extra_data: BTreeMap::new(),
        }
    }

    fn extra_data(&self) -> &BTreeMap<String, String> {
        &self.extra_data
    }

    fn extra_data_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.extra_data
    }

    fn required_protections() -> &'static [ProtectionKind] {
        SIGNED_REQUEST_PROTECTIONS
    }
}

/// Provider response carrying the terminal access token
#[derive(Debug, Clone, PartialEq)]
pub struct AccessTokenResponse {
    version: ProtocolVersion,
    /// The access token identifier
    pub token: Option<TokenIdentifier>,
    /// The access token secret
    pub token_secret: Option<String>,
    extra_data: BTreeMap<String, String>,
}

impl AccessTokenResponse {
    /// Create a response carrying the access token pair
    #[must_use]
    pub fn new(version: ProtocolVersion, token: TokenIdentifier, token_secret: String) -> Self {
        Self {
            version,
            token: Some(token),
            token_secret: Some(token_secret),
            extra_data: BTreeMap::new(),
        }
    }
}

static ACCESS_TOKEN_RESPONSE_FIELDS: [FieldAccessor<AccessTokenResponse>; 2] = [
    FieldAccessor {
        descriptor: FieldDescriptor {
            name: "oauth_token",
            required: true,
            allow_empty: false,
            min_version: ProtocolVersion::V1_0,
            encoding: FieldEncoding::Text,
        },
        get: |m| m.token.as_ref().map(|t| t.as_str().to_string()),
        set: |m, v| {
            m.token = Some(TokenIdentifier::new(v));
            Ok(())
        },
    },
    FieldAccessor {
        descriptor: FieldDescriptor {
            name: "oauth_token_secret",
            required: true,
            allow_empty: true,
            min_version: ProtocolVersion::V1_0,
            encoding: FieldEncoding::Text,
        },
        get: |m| m.token_secret.clone(),
        set: |m, v| {
            m.token_secret = Some(v.to_string());
            Ok(())
        },
    },
];

impl Message for AccessTokenResponse {
    fn message_name() -> &'static str {
        "access token response"
    }

    fn direction() -> Direction {
        Direction::Response
    }

    fn field_table() -> &'static [FieldAccessor<Self>] {
        &ACCESS_TOKEN_RESPONSE_FIELDS
    }

    fn version(&self) -> ProtocolVersion {
        self.version
    }

    fn from_version(version: ProtocolVersion) -> Self {
        Self {
            version,
            token: None,
            token_secret: None,
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
// Resource Requests
// ============================================================================

/// A signed request against a protected resource
///
/// Application parameters ride in [`Message::extra_data`]; the pipeline
/// adds the protection fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRequest {
    version: ProtocolVersion,
    /// The consumer making the call
    pub consumer_key: Option<ConsumerKey>,
    /// The access token authorizing the call
    pub token: Option<TokenIdentifier>,
    extra_data: BTreeMap<String, String>,
}

impl ResourceRequest {
    /// Create a resource request carrying the access token
    #[must_use]
    pub fn new(
        version: ProtocolVersion,
        consumer_key: ConsumerKey,
        token: TokenIdentifier,
    ) -> Self {
        Self {
            version,
            consumer_key: Some(consumer_key),
            token: Some(token),
            extra_data: BTreeMap::new(),
        }
    }

    /// Add an application parameter to the request
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_data.insert(name.into(), value.into());
        self
    }
}

static RESOURCE_REQUEST_FIELDS: [FieldAccessor<ResourceRequest>; 2] = [
    FieldAccessor {
        descriptor: FieldDescriptor {
            name: "oauth_consumer_key",
            required: true,
            allow_empty: false,
            min_version: ProtocolVersion::V1_0,
            encoding: FieldEncoding::Text,
        },
        get: |m| m.consumer_key.as_ref().map(|k| k.as_str().to_string()),
        set: |m, v| {
            m.consumer_key = Some(ConsumerKey::new(v));
            Ok(())
        },
    },
    FieldAccessor {
        descriptor: FieldDescriptor {
            name: "oauth_token",
            required: true,
            allow_empty: false,
            min_version: ProtocolVersion::V1_0,
            encoding: FieldEncoding::Text,
        },
        get: |m| m.token.as_ref().map(|t| t.as_str().to_string()),
        set: |m, v| {
            m.token = Some(TokenIdentifier::new(v));
            Ok(())
        },
    },
];

impl Message for ResourceRequest {
    fn message_name() -> &'static str {
        "resource request"
    }

    fn direction() -> Direction {
        Direction::Request
    }

    fn field_table() -> &'static [FieldAccessor<Self>] {
        &RESOURCE_REQUEST_FIELDS
    }

    fn version(&self) -> ProtocolVersion {
        self.version
    }

    fn from_version(version: ProtocolVersion) -> Self {
        Self {
            version,
            consumer_key: None,
            token: None,
            extra_data: BTreeMap::new(),
        }
    }

    fn extra_data(&self) -> &BTreeMap<String, String> {
        &self.extra_data
    }

    fn extra_data_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.extra_data
    }

    fn required_protections() -> &'static [ProtectionKind] {
        SIGNED_REQUEST_PROTECTIONS
    }
}
