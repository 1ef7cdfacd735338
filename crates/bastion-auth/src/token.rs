//! HS256 access/refresh token issuance and verification.
//!
//! Both token kinds are signed JWTs carrying the same claim set; the
//! `type` claim tells them apart. Refresh tokens are additionally bound
//! to a session row through their SHA-256 digest.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use bastion_core::models::user::{PublicUser, UserRole};
use bastion_core::repository::Store;
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::session::SessionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Claims embedded in every token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (user ID).
    pub sub: Uuid,
    pub email: String,
    pub role: UserRole,
    /// Absent for platform admins.
    #[serde(rename = "tenantId", default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    /// Unique token ID.
    pub jti: String,
}

/// Access and refresh token handed out at login.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
    /// Refresh token lifetime in seconds.
    pub refresh_expires_in: u64,
}

/// Result of exchanging a refresh token.
#[derive(Debug, Clone)]
pub struct RefreshedAccess {
    pub access_token: String,
    pub expires_in: u64,
    pub session_id: Uuid,
    pub user_id: Uuid,
}

/// SHA-256 of a raw token, hex-encoded.
///
/// This is the value stored in the database as `session.token_hash`
/// and `password_reset_token.token_hash`.
pub fn hash_token(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

/// Signs and verifies tokens with the configured secret.
#[derive(Clone)]
pub struct TokenIssuer {
    config: AuthConfig,
}

impl TokenIssuer {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    fn claims_for(&self, user: &PublicUser, token_type: TokenType, ttl_secs: u64) -> TokenClaims {
        let now = Utc::now().timestamp();
        TokenClaims {
            sub: user.id,
            email: user.email.clone(),
            role: user.role,
            tenant_id: user.tenant_id,
            token_type,
            iss: self.config.jwt_issuer.clone(),
            iat: now,
            exp: now + ttl_secs as i64,
            jti: Uuid::new_v4().to_string(),
        }
    }

    fn sign(&self, claims: &TokenClaims) -> Result<String, AuthError> {
        let key = EncodingKey::from_secret(self.config.jwt_secret.as_bytes());
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &key)
            .map_err(|e| AuthError::internal("jwt encode", e))
    }

    fn verify(&self, token: &str, expected: TokenType) -> Result<TokenClaims, AuthError> {
        let key = DecodingKey::from_secret(self.config.jwt_secret.as_bytes());

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[&self.config.jwt_issuer]);
        validation.set_required_spec_claims(&["sub", "exp", "iat", "iss"]);

        let claims = jsonwebtoken::decode::<TokenClaims>(token, &key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!(error = %e, "Token rejected");
                AuthError::TokenExpiredOrMalformed
            })?;

        if claims.token_type != expected {
            return Err(AuthError::TokenExpiredOrMalformed);
        }
        Ok(claims)
    }

    /// Issue an access token and a refresh token for `user`.
    pub fn issue_pair(&self, user: &PublicUser, remember_me: bool) -> Result<TokenPair, AuthError> {
        let access_ttl = self.config.access_token_lifetime_secs;
        let refresh_ttl = self.config.refresh_lifetime_secs(remember_me);

        let access_token = self.sign(&self.claims_for(user, TokenType::Access, access_ttl))?;
        let refresh_token = self.sign(&self.claims_for(user, TokenType::Refresh, refresh_ttl))?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: access_ttl,
            refresh_expires_in: refresh_ttl,
        })
    }

    /// Verify signature, expiry, issuer and `type == access`.
    pub fn verify_access(&self, token: &str) -> Result<TokenClaims, AuthError> {
        self.verify(token, TokenType::Access)
    }

    /// Verify signature, expiry, issuer and `type == refresh`.
    pub fn verify_refresh(&self, token: &str) -> Result<TokenClaims, AuthError> {
        self.verify(token, TokenType::Refresh)
    }

    /// Read the claims of a token without checking its signature or
    /// expiry. Only for attributing audit entries; never for
    /// authorization.
    pub fn decode_unverified(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let payload = token
            .split('.')
            .nth(1)
            .ok_or(AuthError::TokenExpiredOrMalformed)?;
        let bytes = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| AuthError::TokenExpiredOrMalformed)?;
        serde_json::from_slice(&bytes).map_err(|_| AuthError::TokenExpiredOrMalformed)
    }

    /// Exchange a refresh token for a fresh access token.
    ///
    /// The refresh token must be bound to a live session of its
    /// subject. The refresh token itself is not rotated.
    pub async fn refresh<S: Store>(
        &self,
        refresh_token: &str,
        sessions: &SessionStore<S>,
    ) -> Result<RefreshedAccess, AuthError> {
        let claims = self.verify_refresh(refresh_token)?;

        let session = sessions
            .find_by_token(refresh_token)
            .await?
            .filter(|s| s.user_id == claims.sub && !s.is_expired_at(Utc::now()))
            .ok_or(AuthError::SessionNotFound)?;

        let ttl = self.config.access_token_lifetime_secs;
        let now = Utc::now().timestamp();
        let access = TokenClaims {
            token_type: TokenType::Access,
            iat: now,
            exp: now + ttl as i64,
            jti: Uuid::new_v4().to_string(),
            ..claims
        };
        let access_token = self.sign(&access)?;

        // A revoke between lookup and touch must still win.
        if !sessions.touch(session.id).await? {
            return Err(AuthError::SessionNotFound);
        }

        Ok(RefreshedAccess {
            access_token,
            expires_in: ttl,
            session_id: session.id,
            user_id: session.user_id,
        })
    }
}
