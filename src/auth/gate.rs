//! Bootstrap credential exchange and bearer token verification.
//!
//! A single configured credential is exchanged at login for an HS256 token
//! valid for seven days. Tokens are not stored server-side; every mutating
//! request presents one and has it verified before any handler runs.

use crate::config::{AuthConfig, DEFAULT_AUTH_KEY, DEFAULT_JWT_SECRET};
use crate::error::{AssetwayError, Result};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use subtle::ConstantTimeEq;

/// Lifetime of an issued token.
pub const TOKEN_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Identity recorded in tokens issued for the bootstrap credential.
const BOOTSTRAP_SUBJECT: &str = "bootstrap";

/// Claims carried by an issued token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Identity the token was issued to
    pub sub: String,
    /// Organization the identity acts for
    pub org: String,
    /// Issuing service
    pub iss: String,
    /// Issued at (unix timestamp)
    pub iat: u64,
    /// Expiration time (unix timestamp)
    pub exp: u64,
    /// Unique token id
    pub jti: String,
}

/// A freshly signed token and the claims it carries.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
}

/// Issues and verifies bearer tokens.
#[derive(Clone)]
pub struct AuthGate {
    credential_digest: [u8; 32],
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    organization: String,
}

impl AuthGate {
    pub fn new(config: &AuthConfig, issuer: &str, organization: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_issuer(&[issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        Self {
            credential_digest: digest(&config.key),
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            issuer: issuer.to_string(),
            organization: organization.to_string(),
        }
    }

    /// Exchange the bootstrap credential for a signed token.
    pub fn issue_token(&self, credential: &str) -> Result<IssuedToken> {
        self.issue_token_at(credential, unix_now()?)
    }

    /// Issue a token as if the current time were `issued_at` (unix seconds).
    pub fn issue_token_at(&self, credential: &str, issued_at: u64) -> Result<IssuedToken> {
        // Both sides are hashed first so the comparison length never depends on input.
        let matches: bool = digest(credential)[..]
            .ct_eq(&self.credential_digest[..])
            .into();
        if !matches {
            tracing::warn!(organization = %self.organization, "Rejected login attempt");
            return Err(AssetwayError::InvalidCredential);
        }

        let claims = Claims {
            sub: BOOTSTRAP_SUBJECT.to_string(),
            org: self.organization.clone(),
            iss: self.issuer.clone(),
            iat: issued_at,
            exp: issued_at + TOKEN_TTL.as_secs(),
            jti: uuid::Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AssetwayError::internal(format!("Failed to sign token: {}", e)))?;

        tracing::info!(
            organization = %claims.org,
            jti = %claims.jti,
            expires_at = claims.exp,
            "Issued token"
        );

        Ok(IssuedToken { token, claims })
    }

    /// Validate signature and expiry of a bearer token.
    pub fn verify(&self, bearer: Option<&str>) -> Result<Claims> {
        let token = bearer.ok_or(AssetwayError::MissingToken)?;

        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AssetwayError::ExpiredToken,
                _ => AssetwayError::invalid_token(e.to_string()),
            })
    }

    /// Names of secrets still set to their documented defaults.
    pub fn default_secrets(config: &AuthConfig) -> Vec<&'static str> {
        let mut found = Vec::new();
        if config.key == DEFAULT_AUTH_KEY {
            found.push("auth.key");
        }
        if config.secret == DEFAULT_JWT_SECRET {
            found.push("auth.secret");
        }
        found
    }

    /// Log a warning for each secret left at its default. Never fails startup.
    pub fn warn_on_default_secrets(config: &AuthConfig) -> Vec<&'static str> {
        let found = Self::default_secrets(config);
        for name in &found {
            tracing::warn!(
                setting = *name,
                "Secret is set to its documented default value; change it before exposing this service"
            );
        }
        found
    }
}

fn digest(value: &str) -> [u8; 32] {
    Sha256::digest(value.as_bytes()).into()
}

fn unix_now() -> Result<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| AssetwayError::internal(format!("System clock before unix epoch: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> AuthGate {
        let config = AuthConfig {
            key: "let-me-in".to_string(),
            secret: "signing-secret-for-tests".to_string(),
        };
        AuthGate::new(&config, "assetway", "local")
    }

    #[test]
    fn test_issue_then_verify() {
        let gate = gate();
        let issued = gate.issue_token("let-me-in").unwrap();

        let claims = gate.verify(Some(&issued.token)).unwrap();
        assert_eq!(claims, issued.claims);
        assert_eq!(claims.org, "local");
        assert_eq!(claims.exp - claims.iat, TOKEN_TTL.as_secs());
    }

    #[test]
    fn test_wrong_credential_rejected() {
        let gate = gate();
        assert!(matches!(
            gate.issue_token("let-me-in-please"),
            Err(AssetwayError::InvalidCredential)
        ));
        assert!(matches!(gate.issue_token(""), Err(AssetwayError::InvalidCredential)));
    }

    #[test]
    fn test_missing_token() {
        assert!(matches!(gate().verify(None), Err(AssetwayError::MissingToken)));
    }

    #[test]
    fn test_expired_token() {
        let gate = gate();
        let eight_days_ago = unix_now().unwrap() - 8 * 24 * 60 * 60;
        let issued = gate.issue_token_at("let-me-in", eight_days_ago).unwrap();

        assert!(matches!(
            gate.verify(Some(&issued.token)),
            Err(AssetwayError::ExpiredToken)
        ));
    }

    #[test]
    fn test_still_valid_within_window() {
        let gate = gate();
        let six_days_ago = unix_now().unwrap() - 6 * 24 * 60 * 60;
        let issued = gate.issue_token_at("let-me-in", six_days_ago).unwrap();
        assert!(gate.verify(Some(&issued.token)).is_ok());
    }

    #[test]
    fn test_garbage_token_invalid() {
        assert!(matches!(
            gate().verify(Some("not.a.token")),
            Err(AssetwayError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_token_signed_with_other_secret_invalid() {
        let other = AuthGate::new(
            &AuthConfig {
                key: "let-me-in".to_string(),
                secret: "a-different-secret".to_string(),
            },
            "assetway",
            "local",
        );
        let issued = other.issue_token("let-me-in").unwrap();

        assert!(matches!(
            gate().verify(Some(&issued.token)),
            Err(AssetwayError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_token_from_other_issuer_invalid() {
        let config = AuthConfig {
            key: "let-me-in".to_string(),
            secret: "signing-secret-for-tests".to_string(),
        };
        let other = AuthGate::new(&config, "another-service", "local");
        let issued = other.issue_token("let-me-in").unwrap();

        assert!(matches!(
            gate().verify(Some(&issued.token)),
            Err(AssetwayError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_algorithm_confusion_rejected() {
        let claims = Claims {
            sub: "bootstrap".to_string(),
            org: "local".to_string(),
            iss: "assetway".to_string(),
            iat: unix_now().unwrap(),
            exp: unix_now().unwrap() + 60,
            jti: "x".to_string(),
        };
        let token = encode(
            &Header::new(Algorithm::HS384),
            &claims,
            &EncodingKey::from_secret(b"signing-secret-for-tests"),
        )
        .unwrap();

        assert!(matches!(
            gate().verify(Some(&token)),
            Err(AssetwayError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_default_secret_detection() {
        let found = AuthGate::warn_on_default_secrets(&AuthConfig::default());
        assert_eq!(found, vec!["auth.key", "auth.secret"]);

        let config = AuthConfig {
            key: "custom".to_string(),
            secret: DEFAULT_JWT_SECRET.to_string(),
        };
        assert_eq!(AuthGate::default_secrets(&config), vec!["auth.secret"]);

        let config = AuthConfig {
            key: "custom".to_string(),
            secret: "custom-secret".to_string(),
        };
        assert!(AuthGate::default_secrets(&config).is_empty());
    }
}
