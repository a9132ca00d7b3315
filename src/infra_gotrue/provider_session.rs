//! Translation of GoTrue's wire shapes into the crate's `Session`.

use crate::domain_model::*;
use crate::domain_port::TokenStoreError;
use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::Deserialize;

/// Body of a successful `grant_type=refresh_token` response.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub user: Option<ProviderUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Error body. Older servers send `error`/`error_description`, newer ones
/// `error_code`/`msg`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderError {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
}

impl ProviderError {
    pub fn message(&self) -> String {
        self.msg
            .clone()
            .or_else(|| self.error_description.clone())
            .or_else(|| self.error_code.clone())
            .or_else(|| self.error.clone())
            .unwrap_or_else(|| "no error details".to_string())
    }

    /// Maps an error response to the store's error taxonomy.
    pub fn into_store_error(self, status: u16) -> TokenStoreError {
        let revoked = matches!(
            self.error_code.as_deref(),
            Some("refresh_token_not_found") | Some("refresh_token_already_used")
        ) || self.error.as_deref() == Some("invalid_grant");
        if revoked && (status == 400 || status == 401) {
            TokenStoreError::InvalidRefreshToken
        } else {
            TokenStoreError::Rejected {
                status,
                message: self.message(),
            }
        }
    }
}

/// Claims read from an access token without checking its signature.
#[derive(Debug, Deserialize)]
struct PeekedClaims {
    #[serde(default)]
    exp: Option<i64>,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

fn peek_claims(access_token: &str) -> Option<PeekedClaims> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();
    decode::<PeekedClaims>(access_token, &DecodingKey::from_secret(&[]), &validation)
        .ok()
        .map(|data| data.claims)
}

impl ProviderSession {
    /// Expiry comes from `expires_at`, then `expires_in` relative to
    /// `received_at`, then the access token's `exp` claim.
    pub fn into_session(self, received_at: DateTime<Utc>) -> Result<Session, TokenStoreError> {
        let claims = peek_claims(&self.access_token);

        let expires_at = self
            .expires_at
            .and_then(expires_at_from_epoch)
            .or_else(|| {
                self.expires_in
                    .and_then(|secs| received_at.checked_add_signed(TimeDelta::seconds(secs)))
            })
            .or_else(|| claims.as_ref()?.exp.and_then(expires_at_from_epoch))
            .ok_or_else(|| TokenStoreError::Decode("session carries no expiry".to_string()))?;

        let (id, email) = match (self.user, claims) {
            (Some(user), _) => (user.id, user.email),
            (None, Some(PeekedClaims { sub: Some(sub), email, .. })) => (sub, email),
            _ => return Err(TokenStoreError::Decode("session carries no user".to_string())),
        };
        let id = id
            .parse::<UserId>()
            .map_err(|e| TokenStoreError::Decode(format!("invalid user id: {e}")))?;

        Ok(Session::new(
            self.access_token,
            self.refresh_token,
            expires_at,
            SessionUser { id, email },
        ))
    }
}
