//! Access and refresh token issuance.
//!
//! Access tokens are signed JWTs (HS256, 24h). Refresh tokens are
//! opaque: `rt_<record-id>.<secret>`, where only a salted SHA-256 of
//! the secret is stored. Carrying the record id in the token makes
//! verification an O(1) lookup instead of a scan over salted hashes.
//! Rotation revokes the old record and inserts the new one in one
//! atomic store operation, so a crash between the two cannot leave the
//! session with zero or two live tokens.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::TrustConfig;
use crate::domain::{OrgId, PrincipalId, RefreshTokenRecord, SessionMeta};
use crate::infra::{RefreshTokenStore, Result, TrustError};

const REFRESH_PREFIX: &str = "rt_";

/// Claims carried by a signed access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Principal id.
    pub sub: String,
    /// Organization id.
    pub org: String,
    pub iss: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
    /// Always "access"; refresh tokens are not JWTs and must never
    /// pass access verification.
    pub token_type: String,
}

/// What a successful issue or rotation hands back. The refresh secret
/// exists only here; it is never stored or logged.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
    pub principal: PrincipalId,
    pub org: OrgId,
}

pub struct TokenIssuer {
    store: Arc<dyn RefreshTokenStore>,
    config: TrustConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
}

fn hash_secret(salt: &str, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

/// Url-safe secret with no `.` in its alphabet, so the token still
/// splits unambiguously on the first dot.
fn random_secret() -> String {
    let mut buf = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

/// Split `rt_<uuid>.<secret>` into its parts.
fn parse_refresh(token: &str) -> Result<(Uuid, &str)> {
    let rest = token
        .strip_prefix(REFRESH_PREFIX)
        .ok_or_else(|| TrustError::FormatInvalid("not a refresh token".to_string()))?;
    let (id, secret) = rest
        .split_once('.')
        .ok_or_else(|| TrustError::FormatInvalid("malformed refresh token".to_string()))?;
    let id = Uuid::parse_str(id)
        .map_err(|_| TrustError::FormatInvalid("malformed refresh token".to_string()))?;
    if secret.is_empty() {
        return Err(TrustError::FormatInvalid("malformed refresh token".to_string()));
    }
    Ok((id, secret))
}

impl TokenIssuer {
    pub fn new(
        secret: &[u8],
        issuer: impl Into<String>,
        store: Arc<dyn RefreshTokenStore>,
        config: TrustConfig,
    ) -> Self {
        Self {
            store,
            config,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: issuer.into(),
        }
    }

    /// Issue a fresh access/refresh pair for a session. Beyond the live
    /// cap the oldest refresh tokens are revoked, so a principal can
    /// hold at most `max_live_refresh_tokens` concurrent sessions.
    pub async fn issue_pair_at(
        &self,
        principal: PrincipalId,
        org: OrgId,
        session: SessionMeta,
        now: DateTime<Utc>,
    ) -> Result<TokenPair> {
        let pair = self.mint_pair(principal, org, session, now)?;
        self.store.insert(&pair.1).await?;
        self.prune_oldest(principal, now).await?;
        info!(principal = %principal, org = %org, "token pair issued");
        Ok(pair.0)
    }

    /// Rotate a refresh token: verify it, revoke it, and hand back a
    /// fresh pair. A rotated (or otherwise revoked) token always fails
    /// here, so a stolen-then-replayed token is caught.
    pub async fn rotate_at(
        &self,
        refresh_token: &str,
        session: SessionMeta,
        now: DateTime<Utc>,
    ) -> Result<TokenPair> {
        let (id, secret) = parse_refresh(refresh_token)?;
        let record = self.store.get(id).await?.ok_or(TrustError::NotFound {
            what: "refresh token",
            id: id.to_string(),
        })?;

        if hash_secret(&record.salt, secret) != record.token_hash {
            // Valid id with a wrong secret. Id prefix only in logs.
            warn!(token_id = %id, "refresh token failed hash verification");
            return Err(TrustError::FormatInvalid(
                "refresh token does not verify".to_string(),
            ));
        }
        if record.revoked_at.is_some() {
            warn!(token_id = %id, principal = %record.principal, "revoked refresh token replayed");
            return Err(TrustError::Revoked(format!("refresh token {id}")));
        }
        if record.expires_at <= now {
            return Err(TrustError::Expired(format!("refresh token {id}")));
        }

        let (pair, new_record) = self.mint_pair(record.principal, record.org, session, now)?;
        self.store.rotate(record.id, &new_record, now).await?;
        info!(principal = %record.principal, old = %record.id, new = %new_record.id, "refresh token rotated");
        Ok(pair)
    }

    /// Verify a signed access token and return its claims.
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.issuer]);

        let claims = decode::<AccessClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TrustError::Expired("access token".to_string()),
                _ => TrustError::FormatInvalid(format!("invalid access token: {e}")),
            })?
            .claims;

        if claims.token_type != "access" {
            return Err(TrustError::FormatInvalid(
                "not an access token".to_string(),
            ));
        }
        Ok(claims)
    }

    /// Revoke one refresh token presented by its holder.
    pub async fn revoke_at(&self, refresh_token: &str, now: DateTime<Utc>) -> Result<()> {
        let (id, secret) = parse_refresh(refresh_token)?;
        let record = self.store.get(id).await?.ok_or(TrustError::NotFound {
            what: "refresh token",
            id: id.to_string(),
        })?;
        if hash_secret(&record.salt, secret) != record.token_hash {
            return Err(TrustError::FormatInvalid(
                "refresh token does not verify".to_string(),
            ));
        }
        self.store.revoke(id, now).await
    }

    /// Revoke every live refresh token for a principal (logout
    /// everywhere, incident response). Returns how many.
    pub async fn revoke_all_at(&self, principal: PrincipalId, now: DateTime<Utc>) -> Result<u64> {
        let revoked = self.store.revoke_all(principal, now).await?;
        info!(principal = %principal, revoked, "all refresh tokens revoked");
        Ok(revoked)
    }

    fn mint_pair(
        &self,
        principal: PrincipalId,
        org: OrgId,
        session: SessionMeta,
        now: DateTime<Utc>,
    ) -> Result<(TokenPair, RefreshTokenRecord)> {
        let access_expires_at = now + self.config.access_token_ttl;
        let claims = AccessClaims {
            sub: principal.to_string(),
            org: org.to_string(),
            iss: self.issuer.clone(),
            exp: access_expires_at.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
            token_type: "access".to_string(),
        };
        let access_token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| TrustError::Internal(format!("jwt signing failed: {e}")))?;

        let id = Uuid::new_v4();
        let secret = random_secret();
        let salt = random_hex(16);
        let refresh_expires_at = now + self.config.refresh_token_ttl;
        let record = RefreshTokenRecord {
            id,
            principal,
            org,
            token_hash: hash_secret(&salt, &secret),
            salt,
            issued_at: now,
            expires_at: refresh_expires_at,
            revoked_at: None,
            superseded_by: None,
            session,
        };

        Ok((
            TokenPair {
                access_token,
                refresh_token: format!("{REFRESH_PREFIX}{id}.{secret}"),
                access_expires_at,
                refresh_expires_at,
                principal,
                org,
            },
            record,
        ))
    }

    async fn prune_oldest(&self, principal: PrincipalId, now: DateTime<Utc>) -> Result<()> {
        let live = self.store.live_for_principal(principal, now).await?;
        let cap = self.config.max_live_refresh_tokens;
        if live.len() <= cap {
            return Ok(());
        }
        // Oldest first; everything beyond the cap goes.
        for record in &live[..live.len() - cap] {
            self.store.revoke(record.id, now).await?;
            info!(principal = %principal, token_id = %record.id, "oldest session pruned");
        }
        Ok(())
    }
}
