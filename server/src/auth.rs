//! Identity resolution for bearer tokens.
//!
//! Clients authenticate in-band by presenting a JWT. Tokens are issued by
//! three independent credential systems (end-user, contributor, operator),
//! each with its own HS256 secret and its own id claim key. The server never
//! issues tokens; it only verifies them.
//!
//! # Resolution algorithm
//!
//! The resolver holds an ordered list of `(domain, secret, id claim)`
//! verifiers with fixed precedence: end-user, then contributor, then
//! operator. A token is tried against each in turn:
//!
//! 1. If the signature does not verify under a domain's secret (or the token
//!    is expired), the next domain is tried.
//! 2. If the signature verifies but the domain's id claim is absent, the
//!    token is rejected as malformed — later domains are not consulted,
//!    since the signing secret already identifies the issuer.
//! 3. If no domain verifies the signature, the token is invalid.
//!
//! Precedence depends only on which secret validates, never on token
//! content, which keeps the chain testable independently of verification
//! internals.

use chrono::Utc;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::Value;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::config::Config;
use crate::types::{Principal, PrincipalDomain};

/// Claim key carrying the principal id, per domain.
const USER_ID_CLAIM: &str = "userId";
const CONTRIBUTOR_ID_CLAIM: &str = "contributorId";
const ADMIN_ID_CLAIM: &str = "adminId";

/// Errors that can occur during token resolution.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The token failed verification under every configured domain secret.
    ///
    /// Covers missing, garbled, wrongly-signed, and expired tokens alike;
    /// the caller cannot distinguish which, by design.
    #[error("invalid token")]
    InvalidToken,

    /// The signature verified for a domain, but the expected id claim was
    /// absent or not a usable identifier.
    #[error("token verified for domain '{domain}' but the '{claim}' claim is missing")]
    MalformedClaims {
        /// The domain whose secret verified the token.
        domain: PrincipalDomain,
        /// The claim key that was expected.
        claim: &'static str,
    },
}

impl AuthError {
    /// Returns `true` if no domain secret verified the token.
    #[must_use]
    pub fn is_invalid_token(&self) -> bool {
        matches!(self, Self::InvalidToken)
    }

    /// Returns `true` if the token verified but carried unusable claims.
    #[must_use]
    pub fn is_malformed_claims(&self) -> bool {
        matches!(self, Self::MalformedClaims { .. })
    }
}

/// Outcome of one domain's verification attempt.
enum VerifyAttempt {
    /// Signature did not verify (or token expired); try the next domain.
    NoMatch,
    /// Signature verified and the id claim was extracted.
    Resolved(Principal),
    /// Signature verified but the id claim is unusable; stop the chain.
    Malformed(AuthError),
}

/// A single entry in the resolution chain.
struct DomainVerifier {
    domain: PrincipalDomain,
    key: DecodingKey,
    id_claim: &'static str,
}

impl DomainVerifier {
    fn new(domain: PrincipalDomain, secret: &str, id_claim: &'static str) -> Self {
        Self {
            domain,
            key: DecodingKey::from_secret(secret.as_bytes()),
            id_claim,
        }
    }

    fn try_verify(&self, token: &str) -> VerifyAttempt {
        // Claims are schemaless across issuers, so decode into a raw map and
        // validate expiry by hand: `exp` is optional on these tokens.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims = Default::default();

        let claims = match decode::<serde_json::Map<String, Value>>(token, &self.key, &validation) {
            Ok(data) => data.claims,
            Err(_) => return VerifyAttempt::NoMatch,
        };

        if let Some(exp) = claims.get("exp").and_then(Value::as_i64) {
            if exp <= Utc::now().timestamp() {
                return VerifyAttempt::NoMatch;
            }
        }

        match claims.get(self.id_claim) {
            Some(Value::String(id)) if !id.is_empty() => {
                VerifyAttempt::Resolved(Principal::new(self.domain, id.clone()))
            }
            Some(Value::Number(id)) => {
                VerifyAttempt::Resolved(Principal::new(self.domain, id.to_string()))
            }
            _ => VerifyAttempt::Malformed(AuthError::MalformedClaims {
                domain: self.domain,
                claim: self.id_claim,
            }),
        }
    }
}

/// Resolves bearer tokens to principals across the three credential domains.
pub struct IdentityResolver {
    verifiers: Vec<DomainVerifier>,
}

impl IdentityResolver {
    /// Builds the resolver from the configured domain secrets.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self::from_secrets(
            &config.user_jwt_secret,
            &config.contributor_jwt_secret,
            &config.admin_jwt_secret,
        )
    }

    /// Builds the resolver from raw secrets, in precedence order.
    #[must_use]
    pub fn from_secrets(user: &str, contributor: &str, admin: &str) -> Self {
        Self {
            verifiers: vec![
                DomainVerifier::new(PrincipalDomain::User, user, USER_ID_CLAIM),
                DomainVerifier::new(
                    PrincipalDomain::Contributor,
                    contributor,
                    CONTRIBUTOR_ID_CLAIM,
                ),
                DomainVerifier::new(PrincipalDomain::Operator, admin, ADMIN_ID_CLAIM),
            ],
        }
    }

    /// Resolves a token to a principal.
    ///
    /// Pure: no registry mutation happens here — recording the resulting
    /// connection mapping is the caller's responsibility.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidToken`] if no domain secret verifies the token.
    /// - [`AuthError::MalformedClaims`] if a secret verifies it but the
    ///   domain's id claim is absent.
    pub fn authenticate(&self, token: &str) -> Result<Principal, AuthError> {
        for verifier in &self.verifiers {
            match verifier.try_verify(token) {
                VerifyAttempt::NoMatch => continue,
                VerifyAttempt::Resolved(principal) => {
                    tracing::debug!(
                        domain = %principal.domain,
                        principal_id = %principal.id,
                        "Token resolved"
                    );
                    return Ok(principal);
                }
                VerifyAttempt::Malformed(err) => return Err(err),
            }
        }

        Err(AuthError::InvalidToken)
    }
}

impl std::fmt::Debug for IdentityResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityResolver")
            .field("domains", &self.verifiers.len())
            .finish()
    }
}

/// Compares a presented publisher token against the configured one in
/// constant time.
///
/// Used to guard the event-ingest endpoint. Length differences short-circuit
/// inside `subtle` without revealing where the mismatch is.
pub fn validate_publisher_token(provided: &str, expected: &str) -> Result<(), AuthError> {
    if provided.as_bytes().ct_eq(expected.as_bytes()).into() {
        Ok(())
    } else {
        Err(AuthError::InvalidToken)
    }
}
