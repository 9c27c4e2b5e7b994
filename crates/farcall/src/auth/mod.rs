//! Per-member credential enforcement.
//!
//! The check order is: public members first (no validators consulted),
//! then the global off-switch, then the member's declared credential
//! family. For EITHER, the token is tried first and a success
//! short-circuits the key check.

mod keys;
mod token;

pub use keys::KeyValidator;
pub use token::{TokenError, TokenValidator, ValidatedToken};

use std::fmt;

use tracing::{debug, info, warn};

use crate::config::SecurityConfig;
use crate::error::{Error, Result};
use crate::member::{CredentialFamily, MemberDef};

/// Per-call credentials, populated by the metadata interceptor and
/// discarded when the call completes. Either or both may be absent.
#[derive(Clone, Default)]
pub struct CredentialContext {
    pub token: Option<String>,
    pub key: Option<String>,
}

impl CredentialContext {
    pub fn has_token(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.trim().is_empty())
    }

    pub fn has_key(&self) -> bool {
        self.key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

impl fmt::Debug for CredentialContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialContext")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("key", &self.key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Enforces the credential family declared on each secured member.
pub struct Authenticator {
    enabled: bool,
    token: Option<TokenValidator>,
    key: Option<KeyValidator>,
}

impl Authenticator {
    pub fn from_config(security: &SecurityConfig) -> Self {
        let token = security
            .token
            .enabled
            .then(|| TokenValidator::new(&security.token));
        let key = security
            .key
            .enabled
            .then(|| KeyValidator::new(security.key.keys.clone()));

        if token.is_none() && key.is_none() {
            warn!("farcall: no credential validators configured - secured members will reject every call while security is enabled");
        }

        Self { enabled: security.enabled, token, key }
    }

    /// Build an authenticator from already-constructed validators.
    pub fn new(enabled: bool, token: Option<TokenValidator>, key: Option<KeyValidator>) -> Self {
        Self { enabled, token, key }
    }

    /// Authorize one call against one resolved member.
    pub async fn authorize(&self, member: &MemberDef, creds: &CredentialContext) -> Result<()> {
        // Public members never consult a validator.
        if !member.secured {
            return Ok(());
        }
        // Operator turned security off globally.
        if !self.enabled {
            return Ok(());
        }

        let family = member.credential_family.unwrap_or(CredentialFamily::Either);
        debug!(
            "farcall: authorizing {} | family={family} | token={} | key={}",
            member.base_key(),
            creds.has_token(),
            creds.has_key(),
        );

        match family {
            CredentialFamily::TokenOnly => {
                // Only a token is accepted; a key alongside it is never used.
                if !creds.has_token() {
                    return Err(Error::NotAuthenticated(format!(
                        "member '{}' requires a bearer token (authorization header)",
                        member.member_name
                    )));
                }
                self.validate_token(member, creds.token.as_deref().unwrap_or_default())
                    .await
            }
            CredentialFamily::KeyOnly => {
                if !creds.has_key() {
                    return Err(Error::NotAuthenticated(format!(
                        "member '{}' requires an API key",
                        member.member_name
                    )));
                }
                self.validate_key(creds.key.as_deref().unwrap_or_default())
            }
            CredentialFamily::Either => {
                if !creds.has_token() && !creds.has_key() {
                    return Err(Error::NotAuthenticated(format!(
                        "member '{}' requires authentication; provide a bearer token or an API key",
                        member.member_name
                    )));
                }
                if creds.has_token()
                    && self
                        .try_token(member, creds.token.as_deref().unwrap_or_default())
                        .await
                {
                    return Ok(());
                }
                if creds.has_key() && self.try_key(creds.key.as_deref().unwrap_or_default()) {
                    return Ok(());
                }
                Err(Error::NotAuthenticated(
                    "invalid bearer token and invalid API key".to_owned(),
                ))
            }
        }
    }

    // ── Token family ──────────────────────────────────────────────────────

    async fn validate_token(&self, member: &MemberDef, token: &str) -> Result<()> {
        let Some(validator) = &self.token else {
            return Err(Error::MisconfiguredAuth("bearer-token"));
        };
        match validator.validate(token).await {
            Ok(validated) => {
                info!(
                    "farcall: authorized {} via bearer token (subject={})",
                    member.base_key(),
                    validated.subject.as_deref().unwrap_or("<none>"),
                );
                Ok(())
            }
            Err(err) => Err(Error::NotAuthenticated(format!("invalid bearer token: {err}"))),
        }
    }

    /// Returns true if the token validates; never errors.
    async fn try_token(&self, member: &MemberDef, token: &str) -> bool {
        let Some(validator) = &self.token else {
            return false;
        };
        match validator.validate(token).await {
            Ok(validated) => {
                info!(
                    "farcall: authorized {} via bearer token (subject={})",
                    member.base_key(),
                    validated.subject.as_deref().unwrap_or("<none>"),
                );
                true
            }
            Err(_) => false,
        }
    }

    // ── Key family ────────────────────────────────────────────────────────

    fn validate_key(&self, key: &str) -> Result<()> {
        let Some(validator) = &self.key else {
            return Err(Error::MisconfiguredAuth("API-key"));
        };
        if !validator.is_valid(key) {
            return Err(Error::NotAuthenticated("invalid API key".to_owned()));
        }
        Ok(())
    }

    /// Returns true if the key is in the configured set; never errors.
    fn try_key(&self, key: &str) -> bool {
        self.key.as_ref().is_some_and(|v| v.is_valid(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{KeyAuthConfig, SecurityConfig, TokenAuthConfig};
    use crate::member::{Handler, MemberKind, Outcome};
    use std::sync::Arc;

    fn member(secured: bool, family: Option<CredentialFamily>) -> MemberDef {
        MemberDef {
            container_name: "Vault".to_owned(),
            member_name: "open".to_owned(),
            kind: MemberKind::Callable,
            secured,
            credential_family: family,
            immutable: true,
            is_static: false,
            parameters: Vec::new(),
            return_type_name: "void".to_owned(),
            description: String::new(),
            handler: Handler::Callable {
                invoke: Arc::new(|_| Box::pin(async { Ok(Outcome::Accepted) })),
            },
        }
    }

    fn security(enabled: bool, token: bool, keys: Vec<String>) -> SecurityConfig {
        SecurityConfig {
            enabled,
            token: TokenAuthConfig { enabled: token, ..Default::default() },
            key: KeyAuthConfig {
                enabled: !keys.is_empty(),
                keys,
                ..Default::default()
            },
        }
    }

    fn creds(token: Option<&str>, key: Option<&str>) -> CredentialContext {
        CredentialContext {
            token: token.map(str::to_owned),
            key: key.map(str::to_owned),
        }
    }

    /// A token validator with one memoised valid token and no key set.
    fn seeded_token_validator(token: &str) -> TokenValidator {
        let validator = TokenValidator::new(&TokenAuthConfig::default());
        let now = chrono::Utc::now().timestamp();
        validator_seed(&validator, token, now);
        validator
    }

    fn validator_seed(validator: &TokenValidator, token: &str, now: i64) {
        // The memo cache is consulted before any key-set work, so a seeded
        // entry stands in for a previously validated token.
        validator.remember(token, Some("alice".to_owned()), Some(now + 600), now);
    }

    #[tokio::test]
    async fn test_public_member_skips_validators() {
        let auth = Authenticator::from_config(&security(true, false, Vec::new()));
        auth.authorize(&member(false, None), &creds(None, None))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_global_disable_allows_everything() {
        let auth = Authenticator::from_config(&security(false, false, Vec::new()));
        auth.authorize(
            &member(true, Some(CredentialFamily::TokenOnly)),
            &creds(None, None),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_key_only_accepts_configured_key() {
        let auth = Authenticator::from_config(&security(true, false, vec!["k1".into()]));
        auth.authorize(
            &member(true, Some(CredentialFamily::KeyOnly)),
            &creds(None, Some("k1")),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_key_only_rejects_missing_and_wrong_key() {
        let auth = Authenticator::from_config(&security(true, false, vec!["k1".into()]));
        let def = member(true, Some(CredentialFamily::KeyOnly));

        let err = auth.authorize(&def, &creds(None, None)).await.unwrap_err();
        assert!(matches!(err, Error::NotAuthenticated(_)));

        let err = auth
            .authorize(&def, &creds(None, Some("nope")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotAuthenticated(_)));
    }

    #[tokio::test]
    async fn test_key_only_ignores_token() {
        // A valid token must not satisfy a key-only member.
        let token = "seeded-token";
        let auth = Authenticator::new(
            true,
            Some(seeded_token_validator(token)),
            Some(KeyValidator::new(vec!["k1".into()])),
        );
        let err = auth
            .authorize(
                &member(true, Some(CredentialFamily::KeyOnly)),
                &creds(Some(token), None),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotAuthenticated(_)));
    }

    #[tokio::test]
    async fn test_token_only_accepts_valid_token() {
        let token = "seeded-token";
        let auth = Authenticator::new(true, Some(seeded_token_validator(token)), None);
        auth.authorize(
            &member(true, Some(CredentialFamily::TokenOnly)),
            &creds(Some(token), None),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_token_only_rejects_key_even_if_valid() {
        let auth = Authenticator::from_config(&security(true, true, vec!["k1".into()]));
        let err = auth
            .authorize(
                &member(true, Some(CredentialFamily::TokenOnly)),
                &creds(None, Some("k1")),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotAuthenticated(_)));
    }

    #[tokio::test]
    async fn test_token_only_rejects_malformed_token() {
        let auth = Authenticator::from_config(&security(true, true, Vec::new()));
        let err = auth
            .authorize(
                &member(true, Some(CredentialFamily::TokenOnly)),
                &creds(Some("garbage"), None),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotAuthenticated(_)));
    }

    #[tokio::test]
    async fn test_token_only_without_validator_is_misconfigured() {
        let auth = Authenticator::from_config(&security(true, false, vec!["k1".into()]));
        let err = auth
            .authorize(
                &member(true, Some(CredentialFamily::TokenOnly)),
                &creds(Some("some-token"), None),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MisconfiguredAuth(_)));
    }

    #[tokio::test]
    async fn test_either_requires_at_least_one() {
        let auth = Authenticator::from_config(&security(true, true, vec!["k1".into()]));
        let err = auth
            .authorize(
                &member(true, Some(CredentialFamily::Either)),
                &creds(None, None),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotAuthenticated(_)));
    }

    #[tokio::test]
    async fn test_either_token_short_circuits() {
        let token = "seeded-token";
        // No key validator at all: the token alone must succeed.
        let auth = Authenticator::new(true, Some(seeded_token_validator(token)), None);
        auth.authorize(
            &member(true, Some(CredentialFamily::Either)),
            &creds(Some(token), Some("ignored")),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_either_falls_back_to_key() {
        let auth = Authenticator::from_config(&security(true, true, vec!["k1".into()]));
        auth.authorize(
            &member(true, Some(CredentialFamily::Either)),
            &creds(Some("bad-token"), Some("k1")),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_either_both_invalid() {
        let auth = Authenticator::from_config(&security(true, true, vec!["k1".into()]));
        let err = auth
            .authorize(
                &member(true, Some(CredentialFamily::Either)),
                &creds(Some("bad-token"), Some("bad-key")),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotAuthenticated(_)));
    }

    #[tokio::test]
    async fn test_secured_without_family_defaults_to_either() {
        let auth = Authenticator::from_config(&security(true, false, vec!["k1".into()]));
        auth.authorize(&member(true, None), &creds(None, Some("k1")))
            .await
            .unwrap();
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let rendered = format!("{:?}", creds(Some("secret-token"), Some("secret-key")));
        assert!(!rendered.contains("secret-token"));
        assert!(!rendered.contains("secret-key"));
        assert!(rendered.contains("REDACTED"));
    }
}
