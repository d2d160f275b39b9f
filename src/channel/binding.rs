//! Binding element pipeline
//!
//! Ordered, composable transforms applied to outgoing messages and
//! reversed on incoming ones. Outgoing, expiration is stamped first and
//! the signature is computed last so it covers the stamp and every other
//! field; incoming, the signature is verified before anything downstream
//! is trusted.
//!
//! The pipeline is an immutable ordered list fixed at channel
//! construction; no element may be added or removed mid-exchange.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use url::Url;

use crate::crypto::base_string::{SIGNATURE_FIELD, signature_base_string};
use crate::crypto::nonce_gen::{DEFAULT_NONCE_LENGTH, generate_nonce};
use crate::crypto::signatures::SigningCredential;
use crate::error::{AuthWireError, ProtectionFailureReason, Result};
use crate::message::descriptor::{encode_timestamp, parse_timestamp};
use crate::message::ProtectionKind;
use crate::nonce::NonceStore;
use crate::transport::HttpMethod;

/// Wire field carrying the message timestamp
pub const TIMESTAMP_FIELD: &str = "oauth_timestamp";
/// Wire field carrying the replay nonce
pub const NONCE_FIELD: &str = "oauth_nonce";
/// Wire field naming the signature method
pub const SIGNATURE_METHOD_FIELD: &str = "oauth_signature_method";
/// Wire field naming the association that signed the message
pub const ASSOC_HANDLE_FIELD: &str = "assoc_handle";

// ============================================================================
// Envelope
// ============================================================================

/// A serialized message in flight through the pipeline
#[derive(Debug)]
pub struct Envelope {
    /// HTTP method the message will travel with
    pub http_method: HttpMethod,
    /// Endpoint the message is addressed to
    pub endpoint: Url,
    /// The flat wire mapping, mutated by the pipeline
    pub fields: BTreeMap<String, String>,
    /// Credential borrowed for this operation, when the exchange is
    /// signed
    pub credential: Option<SigningCredential>,
    /// Protections applied so far, in application order
    pub applied: Vec<ProtectionKind>,
}

impl Envelope {
    /// Create an envelope for a field mapping bound for an endpoint
    #[must_use]
    pub fn new(
        http_method: HttpMethod,
        endpoint: Url,
        fields: BTreeMap<String, String>,
        credential: Option<SigningCredential>,
    ) -> Self {
        Self {
            http_method,
            endpoint,
            fields,
            credential,
            applied: Vec::new(),
        }
    }

    /// Whether a protection has been applied to this envelope
    #[must_use]
    pub fn has_applied(&self, kind: ProtectionKind) -> bool {
        self.applied.contains(&kind)
    }
}

// ============================================================================
// Binding Element Trait
// ============================================================================

/// Which direction(s) an element participates in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingDirection {
    /// Applied to outgoing messages only
    Outgoing,
    /// Applied to incoming messages only
    Incoming,
    /// Applied both ways
    Both,
}

/// The non-failure outcomes of one element's pass over an envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingOutcome {
    /// The element had nothing to do for this envelope
    NotApplicable,
    /// The element performed its transform
    Applied,
}

/// A named, ordered wire-protection transform
pub trait BindingElement: Send + Sync {
    /// Element name for diagnostics
    fn name(&self) -> &'static str;

    /// The protection this element supplies, if any
    fn protection(&self) -> Option<ProtectionKind>;

    /// Direction(s) the element participates in
    fn direction(&self) -> BindingDirection {
        BindingDirection::Both
    }

    /// Apply the transform to an outgoing envelope
    ///
    /// # Errors
    /// Returns a protection failure with a typed reason.
    fn prepare(&self, envelope: &mut Envelope) -> Result<BindingOutcome>;

    /// Validate and remove the transform from an incoming envelope
    ///
    /// # Errors
    /// Returns a protection failure with a typed reason.
    fn process(&self, envelope: &mut Envelope) -> Result<BindingOutcome>;
}

// ============================================================================
// Expiration
// ============================================================================

/// Stamps outgoing messages with the current time and rejects incoming
/// messages older than the skew-adjusted maximum age
pub struct ExpirationElement {
    max_message_age: Duration,
    clock_skew: Duration,
}

impl ExpirationElement {
    /// Create an expiration element with the given lifetime and skew
    /// tolerance
    #[must_use]
    pub fn new(max_message_age: Duration, clock_skew: Duration) -> Self {
        Self {
            max_message_age,
            clock_skew,
        }
    }
}

impl BindingElement for ExpirationElement {
    fn name(&self) -> &'static str {
        "expiration"
    }

    fn protection(&self) -> Option<ProtectionKind> {
        Some(ProtectionKind::Expiration)
    }

    fn prepare(&self, envelope: &mut Envelope) -> Result<BindingOutcome> {
        // Only signed exchanges carry protection stamps.
        if envelope.credential.is_none() {
            return Ok(BindingOutcome::NotApplicable);
        }
        envelope
            .fields
            .insert(TIMESTAMP_FIELD.to_string(), encode_timestamp(SystemTime::now()));
        Ok(BindingOutcome::Applied)
    }

    fn process(&self, envelope: &mut Envelope) -> Result<BindingOutcome> {
        let Some(stamp) = envelope.fields.get(TIMESTAMP_FIELD) else {
            return Ok(BindingOutcome::NotApplicable);
        };
        let stamped = parse_timestamp(stamp)?;
        let now = SystemTime::now();

        // Stamped in the future beyond tolerable skew.
        if let Ok(ahead) = stamped.duration_since(now) {
            if ahead > self.clock_skew {
                return Err(AuthWireError::protection(ProtectionFailureReason::Expired));
            }
        }
        // Aged out; a message exactly at the maximum age is still good.
        if let Ok(age) = now.duration_since(stamped) {
            if age > self.max_message_age + self.clock_skew {
                return Err(AuthWireError::protection(ProtectionFailureReason::Expired));
            }
        }

        envelope.fields.remove(TIMESTAMP_FIELD);
        Ok(BindingOutcome::Applied)
    }
}

// ============================================================================
// Replay Protection
// ============================================================================

/// Stamps outgoing messages with a fresh nonce and checks incoming ones
/// against the nonce store
pub struct ReplayProtectionElement {
    store: Arc<dyn NonceStore>,
}

impl ReplayProtectionElement {
    /// Create a replay element backed by the given store
    #[must_use]
    pub fn new(store: Arc<dyn NonceStore>) -> Self {
        Self { store }
    }
}

impl BindingElement for ReplayProtectionElement {
    fn name(&self) -> &'static str {
        "replay-protection"
    }

    fn protection(&self) -> Option<ProtectionKind> {
        Some(ProtectionKind::ReplayProtection)
    }

    fn prepare(&self, envelope: &mut Envelope) -> Result<BindingOutcome> {
        if envelope.credential.is_none() {
            return Ok(BindingOutcome::NotApplicable);
        }
        envelope.fields.insert(
            NONCE_FIELD.to_string(),
            generate_nonce(DEFAULT_NONCE_LENGTH),
        );
        // The expiration element normally stamps first; cover for
        // pipelines configured without one.
        envelope
            .fields
            .entry(TIMESTAMP_FIELD.to_string())
            .or_insert_with(|| encode_timestamp(SystemTime::now()));
        Ok(BindingOutcome::Applied)
    }

    fn process(&self, envelope: &mut Envelope) -> Result<BindingOutcome> {
        let Some(nonce) = envelope.fields.get(NONCE_FIELD).cloned() else {
            return Ok(BindingOutcome::NotApplicable);
        };
        let context = envelope
            .credential
            .as_ref()
            .map(SigningCredential::identity)
            .ok_or(AuthWireError::protection(
                ProtectionFailureReason::MissingCredential,
            ))?;
        let timestamp = envelope
            .fields
            .get(TIMESTAMP_FIELD)
            .map(|stamp| parse_timestamp(stamp))
            .transpose()?
            .unwrap_or_else(SystemTime::now);

        self.store.check_and_record(&context, &nonce, timestamp)?;
        envelope.fields.remove(NONCE_FIELD);
        Ok(BindingOutcome::Applied)
    }
}

// ============================================================================
// Tamper Protection
// ============================================================================

/// Signs outgoing messages and verifies incoming signatures
/// byte-for-byte against the claimed credential
#[derive(Default)]
pub struct TamperProtectionElement;

impl TamperProtectionElement {
    /// Create a tamper-protection element
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl BindingElement for TamperProtectionElement {
    fn name(&self) -> &'static str {
        "tamper-protection"
    }

    fn protection(&self) -> Option<ProtectionKind> {
        Some(ProtectionKind::TamperProtection)
    }

    fn prepare(&self, envelope: &mut Envelope) -> Result<BindingOutcome> {
        let Some(credential) = envelope.credential.clone() else {
            return Ok(BindingOutcome::NotApplicable);
        };

        match &credential {
            SigningCredential::Consumer { .. } | SigningCredential::Rsa { .. } => {
                envelope.fields.insert(
                    SIGNATURE_METHOD_FIELD.to_string(),
                    credential.method_wire_name().to_string(),
                );
            }
            SigningCredential::Association { handle, .. } => {
                envelope
                    .fields
                    .insert(ASSOC_HANDLE_FIELD.to_string(), handle.as_str().to_string());
            }
        }

        let base = signature_base_string(
            envelope.http_method.as_str(),
            &envelope.endpoint,
            &envelope.fields,
        );
        let signature = credential.sign(&base)?;
        envelope
            .fields
            .insert(SIGNATURE_FIELD.to_string(), signature);
        Ok(BindingOutcome::Applied)
    }

    fn process(&self, envelope: &mut Envelope) -> Result<BindingOutcome> {
        let Some(claimed) = envelope.fields.get(SIGNATURE_FIELD).cloned() else {
            return Ok(BindingOutcome::NotApplicable);
        };
        let credential = envelope.credential.clone().ok_or(AuthWireError::protection(
            ProtectionFailureReason::MissingCredential,
        ))?;

        // The base string excludes the signature itself but covers
        // everything else exactly as the sender computed it.
        let base = signature_base_string(
            envelope.http_method.as_str(),
            &envelope.endpoint,
            &envelope.fields,
        );
        if !credential.verify(&base, &claimed)? {
            tracing::warn!(
                credential = %credential.identity(),
                "signature verification failed"
            );
            return Err(AuthWireError::protection(
                ProtectionFailureReason::InvalidSignature,
            ));
        }

        envelope.fields.remove(SIGNATURE_FIELD);
        envelope.fields.remove(SIGNATURE_METHOD_FIELD);
        if matches!(credential, SigningCredential::Association { .. }) {
            envelope.fields.remove(ASSOC_HANDLE_FIELD);
        }
        Ok(BindingOutcome::Applied)
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// The immutable, ordered list of binding elements a channel applies
pub struct Pipeline {
    /// Elements in outgoing application order
    elements: Vec<Arc<dyn BindingElement>>,
}

impl Pipeline {
    /// Build a pipeline from a set of elements.
    ///
    /// Elements are ordered canonically: expiration, then replay
    /// protection, then tamper protection last, so the signature covers
    /// the other stamps. Incoming processing runs the exact reverse.
    ///
    /// # Errors
    /// Returns an invalid-configuration error when two elements supply
    /// the same protection, or when replay protection is present without
    /// tamper protection (a replay check on an unverified message is
    /// meaningless).
    pub fn new(mut elements: Vec<Arc<dyn BindingElement>>) -> Result<Self> {
        let mut seen: Vec<ProtectionKind> = Vec::new();
        for element in &elements {
            if let Some(kind) = element.protection() {
                if seen.contains(&kind) {
                    return Err(AuthWireError::invalid_config(format!(
                        "duplicate binding element for protection {kind:?}"
                    )));
                }
                seen.push(kind);
            }
        }
        if seen.contains(&ProtectionKind::ReplayProtection)
            && !seen.contains(&ProtectionKind::TamperProtection)
        {
            return Err(AuthWireError::invalid_config(
                "replay protection requires tamper protection",
            ));
        }

        elements.sort_by_key(|element| element.protection());
        Ok(Self { elements })
    }

    /// Protections the pipeline supplies
    #[must_use]
    pub fn protections(&self) -> Vec<ProtectionKind> {
        self.elements
            .iter()
            .filter_map(|element| element.protection())
            .collect()
    }

    /// Run the pipeline over an outgoing envelope
    ///
    /// # Errors
    /// Propagates the first element failure.
    pub fn apply_outgoing(&self, envelope: &mut Envelope) -> Result<()> {
        for element in &self.elements {
            if matches!(element.direction(), BindingDirection::Incoming) {
                continue;
            }
            if element.prepare(envelope)? == BindingOutcome::Applied {
                tracing::debug!(element = element.name(), "outgoing protection applied");
                if let Some(kind) = element.protection() {
                    envelope.applied.push(kind);
                }
            }
        }
        Ok(())
    }

    /// Run the pipeline in reverse over an incoming envelope
    ///
    /// # Errors
    /// Propagates the first element failure.
    pub fn apply_incoming(&self, envelope: &mut Envelope) -> Result<()> {
        for element in self.elements.iter().rev() {
            if matches!(element.direction(), BindingDirection::Outgoing) {
                continue;
            }
            if element.process(envelope)? == BindingOutcome::Applied {
                tracing::debug!(element = element.name(), "incoming protection verified");
                if let Some(kind) = element.protection() {
                    envelope.applied.push(kind);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SignatureMethod;
    use crate::nonce::InMemoryNonceStore;
    use crate::types::ConsumerKey;

    const MAX_AGE: Duration = Duration::from_secs(300);
    const SKEW: Duration = Duration::from_secs(120);

    fn credential() -> SigningCredential {
        SigningCredential::Consumer {
            key: ConsumerKey::new("consumer1"),
            consumer_secret: "secret".to_string(),
            token_secret: String::new(),
            method: SignatureMethod::HmacSha1,
        }
    }

    fn pipeline(store: Arc<dyn NonceStore>) -> Pipeline {
        Pipeline::new(vec![
            Arc::new(TamperProtectionElement::new()),
            Arc::new(ExpirationElement::new(MAX_AGE, SKEW)),
            Arc::new(ReplayProtectionElement::new(store)),
        ])
        .unwrap()
    }

    fn envelope(fields: &[(&str, &str)]) -> Envelope {
        Envelope::new(
            HttpMethod::Post,
            "https://provider.example/rt".parse().unwrap(),
            fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            Some(credential()),
        )
    }

    #[test]
    fn test_duplicate_protection_rejected() {
        let err = Pipeline::new(vec![
            Arc::new(TamperProtectionElement::new()),
            Arc::new(TamperProtectionElement::new()),
        ]);
        assert!(err.is_err());
    }

    #[test]
    fn test_replay_without_tamper_rejected() {
        let store: Arc<dyn NonceStore> = Arc::new(InMemoryNonceStore::new(MAX_AGE + SKEW));
        let err = Pipeline::new(vec![Arc::new(ReplayProtectionElement::new(store))]);
        assert!(err.is_err());
    }

    #[test]
    fn test_outgoing_order_signs_last() {
        let store: Arc<dyn NonceStore> = Arc::new(InMemoryNonceStore::new(MAX_AGE + SKEW));
        let pipeline = pipeline(store);
        let mut env = envelope(&[("oauth_consumer_key", "consumer1")]);
        pipeline.apply_outgoing(&mut env).unwrap();

        assert!(env.fields.contains_key(SIGNATURE_FIELD));
        assert!(env.fields.contains_key(NONCE_FIELD));
        assert!(env.fields.contains_key(TIMESTAMP_FIELD));
        assert_eq!(
            env.applied,
            vec![
                ProtectionKind::Expiration,
                ProtectionKind::ReplayProtection,
                ProtectionKind::TamperProtection,
            ]
        );

        // The signature covers the nonce and timestamp: recomputing over
        // the signed fields (minus the signature) must match.
        let base = signature_base_string("POST", &env.endpoint, &env.fields);
        assert!(
            credential()
                .verify(&base, &env.fields[SIGNATURE_FIELD])
                .unwrap()
        );
    }

    #[test]
    fn test_round_trip_through_both_directions() {
        let store: Arc<dyn NonceStore> = Arc::new(InMemoryNonceStore::new(MAX_AGE + SKEW));
        let pipeline = pipeline(store);

        let mut env = envelope(&[("oauth_consumer_key", "consumer1")]);
        pipeline.apply_outgoing(&mut env).unwrap();

        let mut incoming = Envelope::new(
            HttpMethod::Post,
            env.endpoint.clone(),
            env.fields.clone(),
            Some(credential()),
        );
        pipeline.apply_incoming(&mut incoming).unwrap();

        // Protections validated and removed.
        assert!(!incoming.fields.contains_key(SIGNATURE_FIELD));
        assert!(!incoming.fields.contains_key(NONCE_FIELD));
        assert!(!incoming.fields.contains_key(TIMESTAMP_FIELD));
        assert_eq!(incoming.fields["oauth_consumer_key"], "consumer1");
    }

    #[test]
    fn test_tampered_field_rejected() {
        let store: Arc<dyn NonceStore> = Arc::new(InMemoryNonceStore::new(MAX_AGE + SKEW));
        let pipeline = pipeline(store);

        let mut env = envelope(&[("oauth_consumer_key", "consumer1")]);
        pipeline.apply_outgoing(&mut env).unwrap();

        let mut fields = env.fields.clone();
        fields.insert("oauth_consumer_key".to_string(), "attacker".to_string());
        let mut incoming =
            Envelope::new(HttpMethod::Post, env.endpoint.clone(), fields, Some(credential()));
        let err = pipeline.apply_incoming(&mut incoming).unwrap_err();
        assert_eq!(
            err.protection_reason(),
            Some(ProtectionFailureReason::InvalidSignature)
        );
    }

    #[test]
    fn test_replayed_envelope_rejected() {
        let store: Arc<dyn NonceStore> = Arc::new(InMemoryNonceStore::new(MAX_AGE + SKEW));
        let pipeline = pipeline(store);

        let mut env = envelope(&[("oauth_consumer_key", "consumer1")]);
        pipeline.apply_outgoing(&mut env).unwrap();

        let mut first = Envelope::new(
            HttpMethod::Post,
            env.endpoint.clone(),
            env.fields.clone(),
            Some(credential()),
        );
        pipeline.apply_incoming(&mut first).unwrap();

        let mut second = Envelope::new(
            HttpMethod::Post,
            env.endpoint.clone(),
            env.fields.clone(),
            Some(credential()),
        );
        let err = pipeline.apply_incoming(&mut second).unwrap_err();
        assert_eq!(
            err.protection_reason(),
            Some(ProtectionFailureReason::ReplayedMessage)
        );
    }

    #[test]
    fn test_expiration_boundary() {
        let element = ExpirationElement::new(MAX_AGE, SKEW);
        let endpoint: Url = "https://provider.example/rt".parse().unwrap();

        // Exactly max_age old: accepted.
        let at_limit = SystemTime::now() - MAX_AGE;
        let mut env = Envelope::new(
            HttpMethod::Post,
            endpoint.clone(),
            [(TIMESTAMP_FIELD.to_string(), encode_timestamp(at_limit))].into(),
            None,
        );
        assert_eq!(element.process(&mut env).unwrap(), BindingOutcome::Applied);

        // One second past max_age + skew: rejected.
        let beyond = SystemTime::now() - (MAX_AGE + SKEW + Duration::from_secs(1));
        let mut env = Envelope::new(
            HttpMethod::Post,
            endpoint,
            [(TIMESTAMP_FIELD.to_string(), encode_timestamp(beyond))].into(),
            None,
        );
        let err = element.process(&mut env).unwrap_err();
        assert_eq!(err.protection_reason(), Some(ProtectionFailureReason::Expired));
    }

    #[test]
    fn test_future_stamp_beyond_skew_rejected() {
        let element = ExpirationElement::new(MAX_AGE, SKEW);
        let future = SystemTime::now() + SKEW + Duration::from_secs(30);
        let mut env = Envelope::new(
            HttpMethod::Post,
            "https://provider.example/rt".parse().unwrap(),
            [(TIMESTAMP_FIELD.to_string(), encode_timestamp(future))].into(),
            None,
        );
        assert!(element.process(&mut env).is_err());
    }

    #[test]
    fn test_unsigned_outgoing_left_untouched() {
        let store: Arc<dyn NonceStore> = Arc::new(InMemoryNonceStore::new(MAX_AGE + SKEW));
        let pipeline = pipeline(store);
        let mut env = Envelope::new(
            HttpMethod::Post,
            "https://provider.example/rt".parse().unwrap(),
            BTreeMap::new(),
            None,
        );
        pipeline.apply_outgoing(&mut env).unwrap();
        assert!(env.fields.is_empty());
        assert!(env.applied.is_empty());
    }

    #[test]
    fn test_association_credential_stamps_handle() {
        use crate::crypto::AssociationAlgorithm;
        use crate::types::AssociationHandle;

        let assoc_credential = || SigningCredential::Association {
            handle: AssociationHandle::new("handle-7"),
            mac_key: vec![42u8; 32],
            algorithm: AssociationAlgorithm::HmacSha256,
        };

        let store: Arc<dyn NonceStore> = Arc::new(InMemoryNonceStore::new(MAX_AGE + SKEW));
        let pipeline = pipeline(store);
        let mut env = Envelope::new(
            HttpMethod::Post,
            "https://op.example/endpoint".parse().unwrap(),
            [("claimed_id".to_string(), "https://user.example/".to_string())].into(),
            Some(assoc_credential()),
        );
        pipeline.apply_outgoing(&mut env).unwrap();
        assert_eq!(env.fields[ASSOC_HANDLE_FIELD], "handle-7");
        assert!(env.fields.contains_key(SIGNATURE_FIELD));
        // Association signing does not use the OAuth method field.
        assert!(!env.fields.contains_key(SIGNATURE_METHOD_FIELD));

        let mut incoming = Envelope::new(
            HttpMethod::Post,
            env.endpoint.clone(),
            env.fields.clone(),
            Some(assoc_credential()),
        );
        pipeline.apply_incoming(&mut incoming).unwrap();
        assert!(!incoming.fields.contains_key(ASSOC_HANDLE_FIELD));
        assert_eq!(incoming.fields["claimed_id"], "https://user.example/");
    }

    #[test]
    fn test_unsigned_envelope_is_not_applicable() {
        let store: Arc<dyn NonceStore> = Arc::new(InMemoryNonceStore::new(MAX_AGE + SKEW));
        let pipeline = pipeline(store);
        // A direct response carries no protection fields; every element
        // passes it through untouched.
        let mut env = Envelope::new(
            HttpMethod::Post,
            "https://provider.example/rt".parse().unwrap(),
            [("oauth_token".to_string(), "abc".to_string())].into(),
            None,
        );
        pipeline.apply_incoming(&mut env).unwrap();
        assert!(env.applied.is_empty());
    }
}
