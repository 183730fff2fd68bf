/// Bearer tokens and authentication extractors
use crate::{
    account::Account,
    api::middleware::extract_bearer_token,
    config::AuthConfig,
    context::AppContext,
    error::{AppError, AppResult},
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Purpose of a token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT claims carried by both token kinds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Account id
    pub sub: String,
    pub phone: String,
    pub typ: TokenKind,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn account_id(&self) -> AppResult<i64> {
        self.sub
            .parse()
            .map_err(|_| AppError::Authentication("Invalid token subject".to_string()))
    }
}

/// Sign a token for an account
pub fn issue_token(
    account_id: i64,
    phone: &str,
    kind: TokenKind,
    config: &AuthConfig,
    now: DateTime<Utc>,
) -> AppResult<String> {
    let ttl = match kind {
        TokenKind::Access => Duration::hours(config.access_token_ttl_hours),
        TokenKind::Refresh => Duration::days(config.refresh_token_ttl_days),
    };

    let claims = Claims {
        sub: account_id.to_string(),
        phone: phone.to_string(),
        typ: kind,
        iss: config.issuer.clone(),
        iat: now.timestamp(),
        exp: (now + ttl).timestamp(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::Jwt(format!("Failed to sign token: {}", e)))
}

/// Verify signature, expiry, issuer and token kind
pub fn verify_token(token: &str, kind: TokenKind, config: &AuthConfig) -> AppResult<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[config.issuer.as_str()]);
    // Allow some clock skew
    validation.leeway = 60;

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    )
    .map_err(|e| {
        tracing::debug!("JWT verification failed: {}", e);
        match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                AppError::Authentication("Token has expired".to_string())
            }
            jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                AppError::Authentication("Invalid token signature".to_string())
            }
            _ => AppError::Authentication(format!("Invalid token: {}", e)),
        }
    })?;

    if data.claims.typ != kind {
        return Err(AppError::Authentication("Wrong token type".to_string()));
    }

    Ok(data.claims)
}

/// Authenticated caller, resolved from a verified access token
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub account_id: i64,
    pub account: Account,
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| AppError::Authentication("Missing authorization header".to_string()))?;

        let account = state.account_manager.validate_access_token(&token).await?;

        Ok(AuthContext {
            account_id: account.id,
            account,
        })
    }
}

/// Optional authenticated context - does not fail if no auth provided
#[derive(Debug, Clone)]
pub struct OptionalAuthContext {
    pub auth: Option<AuthContext>,
}

impl OptionalAuthContext {
    pub fn account_id(&self) -> Option<i64> {
        self.auth.as_ref().map(|a| a.account_id)
    }
}

#[async_trait]
impl FromRequestParts<AppContext> for OptionalAuthContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let auth = match extract_bearer_token(&parts.headers) {
            Some(token) => match state.account_manager.validate_access_token(&token).await {
                Ok(account) => Some(AuthContext {
                    account_id: account.id,
                    account,
                }),
                Err(_) => None,
            },
            None => None,
        };

        Ok(OptionalAuthContext { auth })
    }
}

/// Administrator: account flag or a phone listed in configuration
#[derive(Debug, Clone)]
pub struct AdminAuthContext {
    pub account_id: i64,
    pub account: Account,
}

#[async_trait]
impl FromRequestParts<AppContext> for AdminAuthContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let auth = AuthContext::from_request_parts(parts, state).await?;

        let is_configured_admin = state
            .config
            .authentication
            .admin_phones
            .contains(&auth.account.phone);

        if !auth.account.is_admin && !is_configured_admin {
            tracing::warn!("Account {} attempted an admin operation", auth.account_id);
            return Err(AppError::Forbidden("Admin role required".to_string()));
        }

        Ok(AdminAuthContext {
            account_id: auth.account_id,
            account: auth.account,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    fn auth_config() -> AuthConfig {
        ServerConfig::for_tests(std::path::PathBuf::from("./target/test-data")).authentication
    }

    #[test]
    fn test_issue_and_verify_access_token() {
        let config = auth_config();
        let token = issue_token(42, "237690000001", TokenKind::Access, &config, Utc::now()).unwrap();

        let claims = verify_token(&token, TokenKind::Access, &config).unwrap();
        assert_eq!(claims.account_id().unwrap(), 42);
        assert_eq!(claims.phone, "237690000001");
    }

    #[test]
    fn test_refresh_token_rejected_as_access() {
        let config = auth_config();
        let token = issue_token(1, "237690000001", TokenKind::Refresh, &config, Utc::now()).unwrap();

        let result = verify_token(&token, TokenKind::Access, &config);
        assert!(matches!(result, Err(AppError::Authentication(_))));
    }

    #[test]
    fn test_expired_token_rejected() {
        let config = auth_config();
        let issued = Utc::now() - Duration::days(2);
        let token = issue_token(1, "237690000001", TokenKind::Access, &config, issued).unwrap();

        assert!(verify_token(&token, TokenKind::Access, &config).is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let config = auth_config();
        let token = issue_token(1, "237690000001", TokenKind::Access, &config, Utc::now()).unwrap();

        let mut other = config.clone();
        other.jwt_secret = "another-secret-key-that-is-long-enough!!".to_string();
        assert!(verify_token(&token, TokenKind::Access, &other).is_err());
    }
}
