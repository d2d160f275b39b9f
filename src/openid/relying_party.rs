//! Relying-party association management
//!
//! Drives the associate handshake over the channel: the Diffie-Hellman
//! (or plaintext) key exchange, the single renegotiation a provider's
//! unsupported-type answer is granted, and the store of established
//! associations keyed by provider endpoint. A handshake either completes
//! fully or stores nothing.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD};
use url::Url;

use super::association::{Association, SessionType};
use crate::channel::{Channel, Envelope};
use crate::crypto::AssociationAlgorithm;
use crate::crypto::dh::{DhKeyPair, mask_mac_key, parse_public};
use crate::error::{AuthWireError, Result};
use crate::message::openid::{
    AssociateRequest, AssociateSuccessResponse, AssociateUnsuccessfulResponse, UNSUPPORTED_TYPE_CODE,
    UiModeRequest,
};
use crate::message::ProtocolVersion;
use crate::transport::{HttpMethod, MessageEndpoint};

/// The algorithm/session pair a relying party asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssociationPreference {
    /// Preferred signature algorithm
    pub algorithm: AssociationAlgorithm,
    /// Preferred key-exchange session type
    pub session_type: SessionType,
}

impl Default for AssociationPreference {
    fn default() -> Self {
        Self {
            algorithm: AssociationAlgorithm::HmacSha256,
            session_type: SessionType::DhSha256,
        }
    }
}

enum Negotiation {
    Established(Association),
    Renegotiate(AssociationPreference),
}

/// Establishes and caches associations with providers
pub struct RelyingParty {
    channel: Channel,
    associations: Mutex<HashMap<String, Association>>,
}

impl RelyingParty {
    /// Create a relying party over a channel.
    ///
    /// Registers the UI-mode extension so providers advertising it get
    /// typed treatment on incoming messages.
    #[must_use]
    pub fn new(mut channel: Channel) -> Self {
        channel.register_extension(UiModeRequest::extension_descriptor());
        Self {
            channel,
            associations: Mutex::new(HashMap::new()),
        }
    }

    /// Establish an association with a provider.
    ///
    /// If the provider answers unsupported-type and names its own
    /// preference, the request is retried exactly once with that
    /// preference; a second mismatch is terminal.
    ///
    /// The association is stored only after the secret is fully derived
    /// and validated; an abandoned or failed handshake stores nothing.
    ///
    /// # Errors
    /// Returns protocol errors (including terminal renegotiation
    /// failure), transport errors, and validation errors for malformed
    /// provider responses.
    pub async fn associate(
        &self,
        provider: &MessageEndpoint,
        preference: AssociationPreference,
    ) -> Result<Association> {
        let association = match self.negotiate(provider, preference).await? {
            Negotiation::Established(association) => association,
            Negotiation::Renegotiate(counter) => {
                if counter == preference {
                    return Err(AuthWireError::protocol(
                        Some(UNSUPPORTED_TYPE_CODE.to_string()),
                        "provider rejected the association types it says it prefers",
                        None,
                        None,
                    ));
                }
                tracing::warn!(
                    requested_algorithm = preference.algorithm.wire_name(),
                    counter_algorithm = counter.algorithm.wire_name(),
                    "provider rejected association preference, retrying once"
                );
                match self.negotiate(provider, counter).await? {
                    Negotiation::Established(association) => association,
                    Negotiation::Renegotiate(_) => {
                        return Err(AuthWireError::protocol(
                            Some(UNSUPPORTED_TYPE_CODE.to_string()),
                            "provider rejected its own stated association preference",
                            None,
                            None,
                        ));
                    }
                }
            }
        };

        let mut associations = self
            .associations
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        associations.insert(provider.url.to_string(), association.clone());
        tracing::debug!(
            handle = %association.handle,
            algorithm = association.algorithm.wire_name(),
            "association established"
        );
        Ok(association)
    }

    async fn negotiate(
        &self,
        provider: &MessageEndpoint,
        preference: AssociationPreference,
    ) -> Result<Negotiation> {
        let mut request = AssociateRequest::new(
            ProtocolVersion::V2_0,
            preference.algorithm.wire_name().to_string(),
            preference.session_type.wire_name().to_string(),
        );
        let key_pair = preference
            .session_type
            .dh_hash()
            .map(|_| DhKeyPair::generate());
        if let Some(ref key_pair) = key_pair {
            request.dh_consumer_public = Some(key_pair.public_base64());
        }

        let envelope = self.channel.prepare(&request, provider, None)?;
        let (status, fields) = self
            .channel
            .request_fields(envelope, provider.methods)
            .await?;

        // Unsupported-type answers carry the provider's preference and
        // feed the single renegotiation; anything else error-shaped is
        // surfaced as a protocol error.
        if fields.get("error_code").map(String::as_str) == Some(UNSUPPORTED_TYPE_CODE) {
            let response: AssociateUnsuccessfulResponse = self.channel.open(
                Envelope::new(HttpMethod::Post, provider.url.clone(), fields, None),
                ProtocolVersion::V2_0,
            )?;
            let algorithm = match response.assoc_type.as_deref() {
                Some(name) => AssociationAlgorithm::from_wire_name(name)?,
                None => preference.algorithm,
            };
            let session_type = match response.session_type.as_deref() {
                Some(name) => SessionType::from_wire_name(name)?,
                None => preference.session_type,
            };
            return Ok(Negotiation::Renegotiate(AssociationPreference {
                algorithm,
                session_type,
            }));
        }
        if let Some(error) = Channel::direct_error(&fields) {
            return Err(error);
        }
        if !(200..300).contains(&status) {
            return Err(AuthWireError::transport(format!(
                "provider returned status {status}"
            )));
        }

        let response: AssociateSuccessResponse = self.channel.open(
            Envelope::new(HttpMethod::Post, provider.url.clone(), fields, None),
            ProtocolVersion::V2_0,
        )?;
        let association = Self::derive_association(&preference, key_pair.as_ref(), &response)?;
        Ok(Negotiation::Established(association))
    }

    fn derive_association(
        preference: &AssociationPreference,
        key_pair: Option<&DhKeyPair>,
        response: &AssociateSuccessResponse,
    ) -> Result<Association> {
        let granted_algorithm = AssociationAlgorithm::from_wire_name(
            response.assoc_type.as_deref().unwrap_or_default(),
        )?;
        let granted_session =
            SessionType::from_wire_name(response.session_type.as_deref().unwrap_or_default())?;
        if granted_algorithm != preference.algorithm || granted_session != preference.session_type {
            return Err(AuthWireError::protocol(
                None,
                format!(
                    "provider granted {}/{} but {}/{} was requested",
                    granted_algorithm.wire_name(),
                    granted_session.wire_name(),
                    preference.algorithm.wire_name(),
                    preference.session_type.wire_name()
                ),
                None,
                None,
            ));
        }

        let secret = match granted_session.dh_hash() {
            None => {
                let mac_key = response.mac_key.as_deref().ok_or_else(|| {
                    AuthWireError::validation_field("required field is missing", "mac_key")
                })?;
                STANDARD
                    .decode(mac_key)
                    .map_err(|_| AuthWireError::validation("mac_key is not valid base64"))?
            }
            Some(hash) => {
                let key_pair = key_pair.ok_or_else(|| {
                    AuthWireError::validation("provider granted a DH session that was not offered")
                })?;
                let server_public = response.dh_server_public.as_deref().ok_or_else(|| {
                    AuthWireError::validation_field("required field is missing", "dh_server_public")
                })?;
                let enc_mac_key = response.enc_mac_key.as_deref().ok_or_else(|| {
                    AuthWireError::validation_field("required field is missing", "enc_mac_key")
                })?;
                let wrapped = STANDARD
                    .decode(enc_mac_key)
                    .map_err(|_| AuthWireError::validation("enc_mac_key is not valid base64"))?;
                let shared = key_pair.shared_secret(&parse_public(server_public)?);
                mask_mac_key(&shared, &wrapped, hash)?
            }
        };

        let handle = response.assoc_handle.clone().ok_or_else(|| {
            AuthWireError::validation_field("required field is missing", "assoc_handle")
        })?;
        let expires_in = Duration::from_secs(response.expires_in.unwrap_or(0));
        Association::new(handle, secret, granted_algorithm, expires_in)
    }

    /// Look up a live association for a provider.
    ///
    /// Expired entries are dropped on access and `None` is returned; the
    /// caller must negotiate afresh.
    #[must_use]
    pub fn find(&self, provider: &Url) -> Option<Association> {
        let mut associations = self
            .associations
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let key = provider.to_string();
        let expired = associations
            .get(&key)
            .is_some_and(Association::is_expired);
        if expired {
            if let Some(association) = associations.remove(&key) {
                tracing::debug!(handle = %association.handle, "dropping expired association");
            }
            return None;
        }
        associations.get(&key).cloned()
    }

    /// The channel this relying party exchanges messages over
    #[must_use]
    pub fn channel(&self) -> &Channel {
        &self.channel
    }
}
