use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use thiserror::Error;
use uuid::Uuid;

use vidtide_db::models::UserRow;
use vidtide_db::{AccountStore, StoreError};
use vidtide_types::api::{AccessClaims, RefreshClaims};

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token issuance failed: {0}")]
    Issue(String),
    #[error("invalid token: {0}")]
    Invalid(String),
    #[error("token expired")]
    Expired,
    #[error("refresh token reused or superseded")]
    Reuse,
    #[error("{0}")]
    Unauthorized(String),
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Issues and verifies the access/refresh token pair.
///
/// Access tokens are stateless; refresh tokens additionally live in the
/// user's single refresh-token slot and rotate on every exchange, so any
/// previously issued refresh token dies the moment a new one is minted.
#[derive(Clone)]
pub struct TokenService {
    access_secret: String,
    refresh_secret: String,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
}

impl TokenService {
    pub fn new(
        access_secret: impl Into<String>,
        refresh_secret: impl Into<String>,
        access_ttl_secs: i64,
        refresh_ttl_secs: i64,
    ) -> Self {
        Self {
            access_secret: access_secret.into(),
            refresh_secret: refresh_secret.into(),
            access_ttl_secs,
            refresh_ttl_secs,
        }
    }

    /// Load the user, mint both tokens, persist the refresh token in the
    /// user's slot (overwriting any prior session) and return the pair.
    pub async fn issue_pair(
        &self,
        store: Arc<dyn AccountStore>,
        user_id: &str,
    ) -> Result<(TokenPair, UserRow), TokenError> {
        let user = {
            let store = store.clone();
            let id = user_id.to_string();
            blocking(move || store.find_by_id(&id)).await?
        }
        .ok_or_else(|| TokenError::Issue("user no longer exists".into()))?;

        let sub: Uuid = user
            .id
            .parse()
            .map_err(|e| TokenError::Issue(format!("corrupt user id '{}': {e}", user.id)))?;

        let access_token = self.mint_access(sub, &user)?;
        let refresh_token = self.mint_refresh(sub)?;

        {
            let store = store.clone();
            let id = user.id.clone();
            let token = refresh_token.clone();
            blocking(move || store.set_refresh_token(&id, Some(&token))).await?;
        }

        Ok((
            TokenPair {
                access_token,
                refresh_token,
            },
            user,
        ))
    }

    /// Signature + expiry check on an access token.
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        decode::<AccessClaims>(
            token,
            &DecodingKey::from_secret(self.access_secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(map_verify_error)
    }

    /// Exchange a refresh token for a fresh pair, rotating the stored value.
    ///
    /// The store-side compare-and-swap means a stale token loses even when
    /// two exchanges race on the same value: exactly one caller observes the
    /// swap succeed.
    pub async fn rotate(
        &self,
        store: Arc<dyn AccountStore>,
        presented: &str,
    ) -> Result<(TokenPair, UserRow), TokenError> {
        let claims = self.verify_refresh(presented)?;

        let user = {
            let store = store.clone();
            let id = claims.sub.to_string();
            blocking(move || store.find_by_id(&id)).await?
        }
        .ok_or_else(|| TokenError::Unauthorized("user no longer exists".into()))?;

        match user.refresh_token.as_deref() {
            None => {
                return Err(TokenError::Unauthorized("session has been invalidated".into()));
            }
            Some(stored) if stored != presented => return Err(TokenError::Reuse),
            Some(_) => {}
        }

        let access_token = self.mint_access(claims.sub, &user)?;
        let refresh_token = self.mint_refresh(claims.sub)?;

        let swapped = {
            let store = store.clone();
            let id = user.id.clone();
            let old = presented.to_string();
            let new = refresh_token.clone();
            blocking(move || store.swap_refresh_token(&id, &old, &new)).await?
        };
        if !swapped {
            // A concurrent exchange presented the same token and won the CAS.
            return Err(TokenError::Reuse);
        }

        Ok((
            TokenPair {
                access_token,
                refresh_token,
            },
            user,
        ))
    }

    /// Clear the refresh-token slot: every outstanding refresh token for the
    /// user becomes permanently unusable.
    pub async fn invalidate(
        &self,
        store: Arc<dyn AccountStore>,
        user_id: &str,
    ) -> Result<(), TokenError> {
        let id = user_id.to_string();
        blocking(move || store.set_refresh_token(&id, None)).await
    }

    fn mint_access(&self, sub: Uuid, user: &UserRow) -> Result<String, TokenError> {
        let claims = AccessClaims {
            sub,
            email: user.email.clone(),
            handle: user.handle.clone(),
            display_name: user.display_name.clone(),
            exp: expiry(self.access_ttl_secs),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.access_secret.as_bytes()),
        )
        .map_err(|e| TokenError::Issue(e.to_string()))
    }

    fn mint_refresh(&self, sub: Uuid) -> Result<String, TokenError> {
        let claims = RefreshClaims {
            sub,
            exp: expiry(self.refresh_ttl_secs),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.refresh_secret.as_bytes()),
        )
        .map_err(|e| TokenError::Issue(e.to_string()))
    }

    fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        decode::<RefreshClaims>(
            token,
            &DecodingKey::from_secret(self.refresh_secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(map_verify_error)
    }
}

fn expiry(ttl_secs: i64) -> usize {
    (Utc::now() + Duration::seconds(ttl_secs)).timestamp() as usize
}

fn map_verify_error(e: jsonwebtoken::errors::Error) -> TokenError {
    match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
        _ => TokenError::Invalid(e.to_string()),
    }
}

async fn blocking<T, F>(f: F) -> Result<T, TokenError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| TokenError::Issue(format!("blocking task failed: {e}")))?
        .map_err(|e| TokenError::Issue(e.to_string()))
}
