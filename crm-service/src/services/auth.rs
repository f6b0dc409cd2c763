use chrono::{Duration, Utc};
use dashmap::DashMap;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::JwtConfig;

/// JWT service for token generation and validation
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry_hours: i64,
}

/// Claims carried by every API token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject (tenant ID)
    pub sub: String,
    pub email: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// JWT ID (for blacklisting)
    pub jti: String,
}

impl AccessTokenClaims {
    pub fn tenant_id(&self) -> Result<Uuid, anyhow::Error> {
        Uuid::parse_str(&self.sub).map_err(|e| anyhow::anyhow!("Invalid token subject: {}", e))
    }
}

impl JwtService {
    /// Create a new JWT service from a shared HS256 secret
    pub fn new(config: &JwtConfig) -> Result<Self, anyhow::Error> {
        if config.secret.is_empty() {
            return Err(anyhow::anyhow!("JWT secret must not be empty"));
        }

        tracing::info!(expiry_hours = config.expiry_hours, "JWT service initialized with HS256");

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            expiry_hours: config.expiry_hours,
        })
    }

    /// Generate an access token for a tenant
    pub fn generate_access_token(
        &self,
        tenant_id: Uuid,
        email: &str,
    ) -> Result<String, anyhow::Error> {
        let now = Utc::now();
        let exp = now + Duration::hours(self.expiry_hours);

        let claims = AccessTokenClaims {
            sub: tenant_id.to_string(),
            email: email.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let header = Header::new(Algorithm::HS256);
        let token = encode(&header, &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode access token: {}", e))?;

        Ok(token)
    }

    /// Validate and decode an access token
    pub fn validate_access_token(&self, token: &str) -> Result<AccessTokenClaims, anyhow::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        let token_data = decode::<AccessTokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| anyhow::anyhow!("Invalid access token: {}", e))?;

        Ok(token_data.claims)
    }

    pub fn expiry_seconds(&self) -> i64 {
        self.expiry_hours * 3600
    }
}

/// Revoked token ids, kept until the token would have expired anyway.
#[derive(Clone, Default)]
pub struct TokenBlacklist {
    revoked: Arc<DashMap<String, i64>>,
}

impl TokenBlacklist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn revoke(&self, claims: &AccessTokenClaims) {
        self.revoked.insert(claims.jti.clone(), claims.exp);
        self.purge_expired();
    }

    pub fn is_revoked(&self, jti: &str) -> bool {
        self.revoked.contains_key(jti)
    }

    /// Drop entries whose tokens have expired.
    pub fn purge_expired(&self) {
        let now = Utc::now().timestamp();
        self.revoked.retain(|_, exp| *exp > now);
    }

    pub fn len(&self) -> usize {
        self.revoked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revoked.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> JwtService {
        JwtService::new(&JwtConfig {
            secret: "test-secret-key".to_string(),
            expiry_hours: 1,
        })
        .expect("Failed to build JWT service")
    }

    #[test]
    fn issued_token_validates() {
        let jwt = service();
        let tenant_id = Uuid::new_v4();
        let token = jwt
            .generate_access_token(tenant_id, "owner@example.com")
            .unwrap();

        let claims = jwt.validate_access_token(&token).unwrap();
        assert_eq!(claims.tenant_id().unwrap(), tenant_id);
        assert_eq!(claims.email, "owner@example.com");
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let other = JwtService::new(&JwtConfig {
            secret: "another-secret".to_string(),
            expiry_hours: 1,
        })
        .unwrap();
        let token = other
            .generate_access_token(Uuid::new_v4(), "a@example.com")
            .unwrap();

        assert!(service().validate_access_token(&token).is_err());
        assert!(service().validate_access_token("garbage").is_err());
    }

    #[test]
    fn empty_secret_is_rejected() {
        let result = JwtService::new(&JwtConfig {
            secret: String::new(),
            expiry_hours: 1,
        });
        assert!(result.is_err());
    }

    #[test]
    fn blacklist_keeps_live_tokens_and_drops_expired() {
        let blacklist = TokenBlacklist::new();
        let now = Utc::now().timestamp();
        let live = AccessTokenClaims {
            sub: Uuid::new_v4().to_string(),
            email: "a@example.com".to_string(),
            exp: now + 600,
            iat: now,
            jti: "live".to_string(),
        };
        let stale = AccessTokenClaims {
            exp: now - 10,
            jti: "stale".to_string(),
            ..live.clone()
        };

        blacklist.revoke(&stale);
        blacklist.revoke(&live);

        assert!(blacklist.is_revoked("live"));
        assert!(!blacklist.is_revoked("stale"));
        assert_eq!(blacklist.len(), 1);
    }
}
