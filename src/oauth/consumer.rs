//! OAuth consumer state machine
//!
//! Drives the token lifecycle over the channel: request-token exchange,
//! finalizing user authorization, the one-shot access-token exchange,
//! and signed resource requests. Every network step is all-or-nothing:
//! a failed exchange leaves the stored state untouched.

use std::sync::Arc;

use typed_builder::TypedBuilder;
use url::Url;

use super::tokens::{IssuedToken, TokenState, TokenStore};
use crate::channel::Channel;
use crate::crypto::{SignatureMethod, SigningCredential};
use crate::error::{AuthWireError, Result};
use crate::message::oauth::{
    AccessTokenRequest, AccessTokenResponse, ResourceRequest, UnauthorizedTokenRequest,
    UnauthorizedTokenResponse, UserAuthorizationRequest, UserAuthorizationResponse,
};
use crate::message::{Message, ProtocolVersion, deserialize, serialize};
use crate::utils::decode_form;
use crate::transport::{MessageEndpoint, WireRequest};
use crate::types::ConsumerKey;

/// The endpoints and signing convention of one provider
#[derive(Debug, Clone)]
pub struct ServiceDescription {
    /// Endpoint issuing unauthorized request tokens
    pub request_token_endpoint: MessageEndpoint,
    /// Endpoint the resource owner is sent to for approval
    pub user_authorization_endpoint: Url,
    /// Endpoint exchanging authorized tokens for access tokens
    pub access_token_endpoint: MessageEndpoint,
    /// Signature method the provider expects
    pub signature_method: SignatureMethod,
}

/// Consumer configuration
#[derive(Debug, Clone, TypedBuilder)]
pub struct ConsumerOptions {
    /// The consumer's key
    pub consumer_key: ConsumerKey,
    /// The consumer's shared secret
    pub consumer_secret: String,
    /// Protocol version spoken with the provider
    #[builder(default = ProtocolVersion::V1_0A)]
    pub version: ProtocolVersion,
}

/// An OAuth consumer bound to one provider
pub struct Consumer {
    service: ServiceDescription,
    options: ConsumerOptions,
    channel: Channel,
    tokens: Arc<dyn TokenStore>,
}

impl Consumer {
    /// Create a consumer over a channel and token store
    #[must_use]
    pub fn new(
        service: ServiceDescription,
        options: ConsumerOptions,
        channel: Channel,
        tokens: Arc<dyn TokenStore>,
    ) -> Self {
        Self {
            service,
            options,
            channel,
            tokens,
        }
    }

    /// The token store backing this consumer
    #[must_use]
    pub fn tokens(&self) -> &Arc<dyn TokenStore> {
        &self.tokens
    }

    fn credential(&self, token_secret: &str) -> SigningCredential {
        SigningCredential::Consumer {
            key: self.options.consumer_key.clone(),
            consumer_secret: self.options.consumer_secret.clone(),
            token_secret: token_secret.to_string(),
            method: self.service.signature_method,
        }
    }

    /// Obtain an unauthorized request token from the provider.
    ///
    /// The request is signed with the consumer secret alone (the token
    /// secret is empty at this point). The issued token is stored only
    /// after the exchange fully succeeds.
    ///
    /// # Errors
    /// Returns transport, protocol, and protection failures unchanged;
    /// on any failure no state is recorded.
    pub async fn request_token(&self, callback: Option<Url>) -> Result<IssuedToken> {
        let message =
            UnauthorizedTokenRequest::new(self.options.version, self.options.consumer_key.clone(), callback);
        let response: UnauthorizedTokenResponse = self
            .channel
            .request(
                &message,
                &self.service.request_token_endpoint,
                Some(self.credential("")),
            )
            .await?;

        let token = response.token.ok_or_else(|| {
            AuthWireError::validation_field("required field is missing", "oauth_token")
        })?;
        let secret = response.token_secret.unwrap_or_default();

        let issued =
            IssuedToken::unauthorized(token, secret, self.options.consumer_key.clone());
        self.tokens.insert(issued.clone())?;
        tracing::debug!(token = %issued.token, "request token issued");
        Ok(issued)
    }

    /// The URL the resource owner must visit to approve the token
    ///
    /// # Errors
    /// Returns validation errors from serializing the redirect message.
    pub fn authorization_url(&self, token: &IssuedToken) -> Result<Url> {
        let message = UserAuthorizationRequest::new(self.options.version, token.token.clone());
        let fields = serialize(&message)?;
        let mut url = self.service.user_authorization_endpoint.clone();
        url.query_pairs_mut().extend_pairs(fields.iter());
        Ok(url)
    }

    /// Parse the query-string parameters of an authorization callback
    /// into a typed response.
    ///
    /// # Errors
    /// Returns a validation error when the callback is missing required
    /// fields.
    pub fn parse_authorization_callback(&self, query: &str) -> Result<UserAuthorizationResponse> {
        let fields = decode_form(query);
        deserialize(&fields, self.options.version, self.channel.registry())
    }

    /// Finalize authorization with the owner's callback parameters.
    ///
    /// Validates that the token returned by the callback matches the one
    /// issued earlier; a mismatch means token substitution and aborts
    /// without a state change.
    ///
    /// # Errors
    /// Returns a validation error on token mismatch and token state
    /// errors from the store.
    pub fn finalize_authorization(
        &self,
        issued: &IssuedToken,
        callback_token: &str,
        verifier: Option<String>,
    ) -> Result<IssuedToken> {
        if issued.token.as_str() != callback_token {
            return Err(AuthWireError::validation(format!(
                "authorization callback returned token {callback_token:?} but {:?} was issued",
                issued.token.as_str()
            )));
        }
        self.tokens
            .authorize(issued.token.as_str(), verifier.clone())?;
        tracing::debug!(token = %issued.token, "request token authorized");

        let mut authorized = issued.clone();
        authorized.state = TokenState::Authorized;
        authorized.verifier = verifier;
        Ok(authorized)
    }

    /// Exchange an authorized request token for the terminal access
    /// token.
    ///
    /// Signed with both the consumer secret and the request token's
    /// secret. Succeeds at most once per authorized token: the stored
    /// state is re-checked atomically when the exchange commits, so a
    /// second attempt fails even across concurrent callers.
    ///
    /// # Errors
    /// Returns a token state error when the token is unknown, not yet
    /// authorized, or already exchanged; network and protocol failures
    /// pass through with no state change.
    pub async fn exchange_access_token(&self, request_token: &str) -> Result<IssuedToken> {
        let stored = self
            .tokens
            .get(request_token)?
            .ok_or_else(|| AuthWireError::token_state(format!("unknown token {request_token:?}")))?;
        match stored.state {
            TokenState::Authorized => {}
            TokenState::Unauthorized => {
                return Err(AuthWireError::token_state(format!(
                    "token {request_token:?} has not been authorized by the resource owner"
                )));
            }
            TokenState::AccessGranted => {
                return Err(AuthWireError::token_state(format!(
                    "token {request_token:?} has already been exchanged"
                )));
            }
        }

        let message = AccessTokenRequest::new(
            self.options.version,
            self.options.consumer_key.clone(),
            stored.token.clone(),
            stored.verifier.clone(),
        );
        let response: AccessTokenResponse = self
            .channel
            .request(
                &message,
                &self.service.access_token_endpoint,
                Some(self.credential(&stored.secret)),
            )
            .await?;

        let token = response.token.ok_or_else(|| {
            AuthWireError::validation_field("required field is missing", "oauth_token")
        })?;
        let access = IssuedToken {
            token,
            secret: response.token_secret.unwrap_or_default(),
            state: TokenState::AccessGranted,
            consumer_key: self.options.consumer_key.clone(),
            verifier: None,
        };

        // Commit: consumes the request token atomically, refusing
        // re-entry if another exchange won the race.
        self.tokens.exchange(request_token, access.clone())?;
        tracing::debug!(token = %access.token, "access token granted");
        Ok(access)
    }

    /// Build a signed resource request carrying an access token.
    ///
    /// Delivery placement follows the endpoint's allowed methods; all
    /// placements are equivalent in protection semantics.
    ///
    /// # Errors
    /// Returns a token state error unless the token is an access token,
    /// plus serialization and signing failures.
    pub fn prepare_resource_request(
        &self,
        access: &IssuedToken,
        endpoint: &MessageEndpoint,
        parameters: &[(&str, &str)],
    ) -> Result<WireRequest> {
        if access.state != TokenState::AccessGranted {
            return Err(AuthWireError::token_state(format!(
                "token {:?} is not an access token",
                access.token.as_str()
            )));
        }

        let mut message = ResourceRequest::new(
            self.options.version,
            self.options.consumer_key.clone(),
            access.token.clone(),
        );
        for (name, value) in parameters {
            message.extra_data_mut().insert((*name).to_string(), (*value).to_string());
        }

        let envelope = self.channel.prepare(
            &message,
            endpoint,
            Some(self.credential(&access.secret)),
        )?;
        self.channel.place(envelope, endpoint.methods)
    }
}
