// =============================================================================
// GOOGLE SERVICE ACCOUNT AUTHENTICATION
// =============================================================================
//
// The Drive change feed is read as a service account. Share the label's Drive
// folders with the service account email, then configure ONE of:
//
// - `GOOGLE_SERVICE_ACCOUNT_KEY`  - path to the JSON key file
// - `GOOGLE_SERVICE_ACCOUNT_JSON` - the JSON content directly (for deployment)
//
// Access tokens are minted with a self-signed RS256 JWT (jwt-bearer grant)
// and cached until a minute before they expire.

use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

use super::drive_client::AccessTokenProvider;
use crate::core::drive::DriveError;

pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

/// Fields of the JSON key file we need.
#[derive(Debug, Clone, Deserialize)]
struct ServiceAccountCredentials {
    client_email: String,
    private_key: String,
    token_uri: String,
}

#[derive(Debug, Serialize)]
struct JwtClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: u64,
    exp: u64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    token: String,
    expires_at: SystemTime,
}

fn auth_err(e: impl std::fmt::Display) -> DriveError {
    DriveError::Auth(e.to_string())
}

pub struct ServiceAccountAuth {
    credentials: ServiceAccountCredentials,
    scope: String,
    client: Client,
    cached_token: RwLock<Option<CachedToken>>,
}

impl ServiceAccountAuth {
    pub async fn from_file(path: &str) -> Result<Self, DriveError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| DriveError::Auth(format!("{}: {}", path, e)))?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self, DriveError> {
        let credentials: ServiceAccountCredentials = serde_json::from_str(json).map_err(auth_err)?;
        Ok(Self {
            credentials,
            scope: DRIVE_SCOPE.to_string(),
            client: Client::new(),
            cached_token: RwLock::new(None),
        })
    }

    /// `Ok(None)` when neither variable is set, so Drive can stay disabled.
    pub async fn from_env() -> Result<Option<Self>, DriveError> {
        if let Ok(path) = std::env::var("GOOGLE_SERVICE_ACCOUNT_KEY") {
            return Self::from_file(&path).await.map(Some);
        }

        if let Ok(json) = std::env::var("GOOGLE_SERVICE_ACCOUNT_JSON") {
            return Self::from_json(&json).map(Some);
        }

        Ok(None)
    }

    pub fn client_email(&self) -> &str {
        &self.credentials.client_email
    }

    /// Gets a valid access token, minting a new one if necessary.
    pub async fn get_access_token(&self) -> Result<String, DriveError> {
        {
            let cached = self.cached_token.read().await;
            if let Some(token) = cached.as_ref() {
                if token.expires_at > SystemTime::now() + Duration::from_secs(60) {
                    return Ok(token.token.clone());
                }
            }
        }

        let (token, expires_in) = self.fetch_new_token().await?;

        let mut cached = self.cached_token.write().await;
        *cached = Some(CachedToken {
            token: token.clone(),
            expires_at: SystemTime::now() + Duration::from_secs(expires_in),
        });

        Ok(token)
    }

    async fn fetch_new_token(&self) -> Result<(String, u64), DriveError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(auth_err)?
            .as_secs();

        let claims = JwtClaims {
            iss: self.credentials.client_email.clone(),
            scope: self.scope.clone(),
            aud: self.credentials.token_uri.clone(),
            iat: now,
            exp: now + 3600,
        };

        let header = Header::new(Algorithm::RS256);
        let key = EncodingKey::from_rsa_pem(self.credentials.private_key.as_bytes())
            .map_err(auth_err)?;
        let jwt = encode(&header, &claims, &key).map_err(auth_err)?;

        let response = self
            .client
            .post(&self.credentials.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", jwt.as_str()),
            ])
            .send()
            .await
            .map_err(auth_err)?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(DriveError::Auth(format!(
                "Token exchange failed ({}): {}",
                status, text
            )));
        }

        let token_response: TokenResponse = response.json().await.map_err(auth_err)?;
        tracing::debug!("Minted Google access token for {}", self.credentials.client_email);
        Ok((
            token_response.access_token,
            token_response.expires_in.unwrap_or(3600),
        ))
    }
}

#[async_trait]
impl AccessTokenProvider for ServiceAccountAuth {
    async fn access_token(&self) -> Result<String, DriveError> {
        self.get_access_token().await
    }
}
