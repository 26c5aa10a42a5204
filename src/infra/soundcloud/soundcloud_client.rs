// =============================================================================
// SOUNDCLOUD CLIENT WITH OAUTH TOKEN LIFECYCLE
// =============================================================================
//
// The label connects ONE SoundCloud account through the authorization code
// flow. After that the bot acts on its behalf:
//
// 1. `/sc connect` hands out `build_auth_url()`
// 2. SoundCloud redirects to `{APP_URL}/soundcloud?code=...&state=...`
// 3. `exchange_code()` trades the code for an access/refresh token pair,
//    writes it to the TokenStore and re-reads it (storage is authoritative)
// 4. Every API call goes through `authed_fetch()` / `authed_multipart()`
//
// **Expiry handling:**
// We do not refresh ahead of `expires_at`. A 401/403 triggers exactly one
// refresh followed by exactly one retry. If the retry is still rejected the
// caller gets `AuthExpired` and the user has to reconnect. Concurrent 401s
// share a single refresh: whoever gets the refresh lock second sees that the
// token already changed and just retries.

use chrono::{Duration, Utc};
use reqwest::header::AUTHORIZATION;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};

use crate::core::soundcloud::{
    AccountSnapshot, CreatePlaylistParams, SoundCloudError, SoundCloudUser, TokenDocument,
    TokenState, TokenStore, UploadTrackParams, DEFAULT_TOKEN_TYPE, SOUNDCLOUD_TOKEN_KEY,
};

const AUTH_URL: &str = "https://secure.soundcloud.com/authorize";
const TOKEN_URL: &str = "https://api.soundcloud.com/oauth2/token";
const API_BASE: &str = "https://api.soundcloud.com";

/// Static client configuration. Endpoints are overridable for tests.
#[derive(Debug, Clone)]
pub struct SoundCloudConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub auth_url: String,
    pub token_url: String,
    pub api_base: String,
}

impl SoundCloudConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            auth_url: AUTH_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
            api_base: API_BASE.to_string(),
        }
    }

    /// Point token and API calls at another host (e.g. a mock server).
    #[allow(dead_code)]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        self.token_url = format!("{}/oauth2/token", base);
        self.api_base = base.to_string();
        self
    }
}

/// Response from the token endpoint, for both grant types.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
}

/// Method, query and JSON body of an authenticated request.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub query: Vec<(String, String)>,
    pub json: Option<serde_json::Value>,
}

impl Default for ApiRequest {
    fn default() -> Self {
        Self {
            method: Method::GET,
            query: Vec::new(),
            json: None,
        }
    }
}

fn http_err(e: reqwest::Error) -> SoundCloudError {
    SoundCloudError::Http(e.to_string())
}

fn is_auth_failure(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

fn expires_at(expires_in: Option<i64>) -> Option<chrono::DateTime<Utc>> {
    expires_in.map(|secs| Utc::now() + Duration::seconds(secs))
}

pub struct SoundCloudClient<S: TokenStore> {
    http: Client,
    config: SoundCloudConfig,
    store: S,
    state: RwLock<TokenState>,
    /// Single-flight guard around the refresh grant.
    refresh_lock: Mutex<()>,
}

impl<S: TokenStore> SoundCloudClient<S> {
    pub fn new(config: SoundCloudConfig, store: S) -> Self {
        Self {
            http: Client::new(),
            config,
            store,
            state: RwLock::new(TokenState::default()),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Snapshot of the in-memory credentials.
    pub async fn token_state(&self) -> TokenState {
        self.state.read().await.clone()
    }

    pub async fn is_connected(&self) -> bool {
        self.state.read().await.is_connected()
    }

    // -------------------------------------------------------------------------
    // OAuth handshake
    // -------------------------------------------------------------------------

    /// Authorization redirect URL. Pure, no I/O.
    pub fn build_auth_url(&self, state_param: Option<&str>) -> String {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query
            .append_pair("client_id", &self.config.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &self.config.redirect_uri);
        if let Some(state) = state_param.filter(|s| !s.is_empty()) {
            query.append_pair("state", state);
        }
        format!("{}?{}", self.config.auth_url, query.finish())
    }

    /// Trade a one-time authorization code for tokens, persist them and
    /// return what storage now holds.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenState, SoundCloudError> {
        let response = self
            .http
            .post(&self.config.token_url)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
                ("code", code),
            ])
            .send()
            .await
            .map_err(|e| SoundCloudError::TokenExchangeFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(SoundCloudError::TokenExchangeFailed(format!(
                "({}): {}",
                status.as_u16(),
                text
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| SoundCloudError::TokenExchangeFailed(e.to_string()))?;
        if token.access_token.is_empty() {
            return Err(SoundCloudError::TokenExchangeFailed(
                "token endpoint returned an empty access token".to_string(),
            ));
        }

        let token_type = token
            .token_type
            .unwrap_or_else(|| DEFAULT_TOKEN_TYPE.to_string());

        // The profile is display sugar, a failure here does not fail the connect.
        let account = match self
            .fetch_account_snapshot(&token_type, &token.access_token)
            .await
        {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                tracing::warn!("Could not fetch SoundCloud profile after connect: {}", err);
                None
            }
        };

        // An in-flight refresh must not land on top of the new account.
        let _guard = self.refresh_lock.lock().await;
        self.save_tokens(&TokenDocument {
            access_token: token.access_token,
            refresh_token: token.refresh_token.filter(|t| !t.is_empty()),
            token_type,
            scope: token.scope,
            expires_at: expires_at(token.expires_in),
            account,
        })
        .await?;
        self.hydrate().await?;

        let state = self.token_state().await;
        tracing::info!(
            username = ?state.account.as_ref().and_then(|a| a.username.as_deref()),
            "SoundCloud account connected"
        );
        Ok(state)
    }

    /// Fetch `/me` with an explicit token, outside the retry machinery.
    pub async fn fetch_account_snapshot(
        &self,
        token_type: &str,
        access_token: &str,
    ) -> Result<AccountSnapshot, SoundCloudError> {
        let response = self
            .http
            .get(self.url("/me"))
            .header(AUTHORIZATION, format!("{} {}", token_type, access_token))
            .send()
            .await
            .map_err(http_err)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SoundCloudError::Api { status, body });
        }

        let user: SoundCloudUser = response.json().await.map_err(http_err)?;
        Ok(user.into())
    }

    /// Mint a new access token from the stored refresh token.
    pub async fn refresh_access_token(&self) -> Result<(), SoundCloudError> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    /// Refresh after `stale` was rejected, unless someone already replaced it.
    async fn refresh_after_rejection(&self, stale: &str) -> Result<(), SoundCloudError> {
        let _guard = self.refresh_lock.lock().await;

        if self.state.read().await.access_token.as_deref() != Some(stale) {
            tracing::debug!("SoundCloud token already refreshed by a concurrent request");
            return Ok(());
        }
        self.refresh_locked().await
    }

    async fn refresh_locked(&self) -> Result<(), SoundCloudError> {
        let current = self.token_state().await;
        let refresh_token = current.refresh_token.clone().ok_or_else(|| {
            SoundCloudError::RefreshFailed("No refresh token available".to_string())
        })?;

        let response = self
            .http
            .post(&self.config.token_url)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| SoundCloudError::RefreshFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(SoundCloudError::RefreshFailed(format!(
                "{} {}",
                status, text
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| SoundCloudError::RefreshFailed(e.to_string()))?;
        if token.access_token.is_empty() {
            return Err(SoundCloudError::RefreshFailed(
                "token endpoint returned an empty access token".to_string(),
            ));
        }

        self.save_tokens(&TokenDocument {
            access_token: token.access_token,
            refresh_token: token
                .refresh_token
                .filter(|t| !t.is_empty())
                .or(Some(refresh_token)),
            token_type: token.token_type.unwrap_or(current.token_type),
            scope: token.scope.or(current.scope),
            expires_at: expires_at(token.expires_in),
            account: current.account,
        })
        .await?;
        self.hydrate().await?;

        tracing::info!("SoundCloud access token refreshed");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Persistence
    // -------------------------------------------------------------------------

    /// Load persisted credentials into memory. `false` if we never connected,
    /// in which case the in-memory state is left alone.
    pub async fn hydrate(&self) -> Result<bool, SoundCloudError> {
        let Some(doc) = self.store.load(SOUNDCLOUD_TOKEN_KEY).await? else {
            return Ok(false);
        };

        *self.state.write().await = TokenState::from(doc);
        Ok(true)
    }

    async fn save_tokens(&self, doc: &TokenDocument) -> Result<(), SoundCloudError> {
        self.store.upsert(SOUNDCLOUD_TOKEN_KEY, doc).await
    }

    // -------------------------------------------------------------------------
    // Authenticated requests
    // -------------------------------------------------------------------------

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base, path)
    }

    /// Current access token and the matching `Authorization` header value.
    async fn authorization(&self) -> Result<(String, String), SoundCloudError> {
        let state = self.state.read().await;
        let access = state
            .access_token
            .clone()
            .ok_or(SoundCloudError::NotConnected)?;
        let header = format!("{} {}", state.token_type, access);
        Ok((access, header))
    }

    /// Send a request built by `build`, refreshing and retrying once on 401/403.
    async fn send_with_refresh<F>(&self, build: F) -> Result<Response, SoundCloudError>
    where
        F: Fn(&str) -> RequestBuilder,
    {
        let (access, header) = self.authorization().await?;
        let mut response = build(&header).send().await.map_err(http_err)?;

        if is_auth_failure(response.status()) && self.state.read().await.refresh_token.is_some() {
            tracing::debug!(status = %response.status(), "SoundCloud rejected token, refreshing");
            if let Err(err) = self.refresh_after_rejection(&access).await {
                tracing::warn!("SoundCloud token refresh failed: {}", err);
            }

            let (_, header) = self.authorization().await?;
            response = build(&header).send().await.map_err(http_err)?;
        }

        let status = response.status();
        if is_auth_failure(status) {
            return Err(SoundCloudError::AuthExpired);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SoundCloudError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    /// Authenticated request against the API base.
    pub async fn authed_fetch(
        &self,
        path: &str,
        init: ApiRequest,
    ) -> Result<Response, SoundCloudError> {
        let url = self.url(path);
        self.send_with_refresh(|auth| {
            let mut request = self
                .http
                .request(init.method.clone(), &url)
                .header(AUTHORIZATION, auth);
            if !init.query.is_empty() {
                request = request.query(&init.query);
            }
            if let Some(body) = &init.json {
                request = request.json(body);
            }
            request
        })
        .await
    }

    /// Authenticated multipart request. Forms are single-use, so `make_form`
    /// builds a fresh one for the retry.
    pub async fn authed_multipart<F>(
        &self,
        path: &str,
        make_form: F,
        method: Method,
    ) -> Result<Response, SoundCloudError>
    where
        F: Fn() -> Form,
    {
        let url = self.url(path);
        self.send_with_refresh(|auth| {
            self.http
                .request(method.clone(), &url)
                .header(AUTHORIZATION, auth)
                .multipart(make_form())
        })
        .await
    }

    // -------------------------------------------------------------------------
    // Resources
    // -------------------------------------------------------------------------

    pub async fn get_me(&self) -> Result<SoundCloudUser, SoundCloudError> {
        let response = self.authed_fetch("/me", ApiRequest::default()).await?;
        response.json().await.map_err(http_err)
    }

    /// Upload a private track.
    pub async fn upload_track(
        &self,
        params: &UploadTrackParams,
    ) -> Result<serde_json::Value, SoundCloudError> {
        let bytes = tokio::fs::read(&params.filepath)
            .await
            .map_err(|e| SoundCloudError::File(format!("{}: {}", params.filepath.display(), e)))?;
        let file_name = params
            .filepath
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "track".to_string());

        let make_form = || {
            let mut form = Form::new()
                .text("track[title]", params.title.clone())
                .part(
                    "track[asset_data]",
                    Part::bytes(bytes.clone()).file_name(file_name.clone()),
                )
                .text("track[sharing]", "private")
                .text(
                    "track[downloadable]",
                    params.downloadable.unwrap_or(true).to_string(),
                )
                .text(
                    "track[streamable]",
                    params.streamable.unwrap_or(true).to_string(),
                );

            if let Some(genre) = &params.genre {
                form = form.text("track[genre]", genre.clone());
            }
            if !params.tag_list.is_empty() {
                form = form.text("track[tag_list]", params.tag_list.join(" "));
            }
            if let Some(description) = &params.description {
                form = form.text("track[description]", description.clone());
            }
            if let Some(release_date) = params.release_date {
                form = form.text("track[release_date]", release_date.to_rfc3339());
            }
            form
        };

        let response = self
            .authed_multipart("/tracks", make_form, Method::POST)
            .await?;
        response.json().await.map_err(http_err)
    }

    /// Create a private EP playlist from already uploaded tracks.
    pub async fn create_playlist(
        &self,
        params: &CreatePlaylistParams,
    ) -> Result<serde_json::Value, SoundCloudError> {
        let make_form = || {
            let mut form = Form::new()
                .text("playlist[title]", params.title.clone())
                .text("playlist[sharing]", "private")
                .text("playlist_type", "ep");

            if let Some(description) = &params.description {
                form = form.text("playlist[description]", description.clone());
            }
            if !params.tag_list.is_empty() {
                form = form.text("playlist[tag_list]", params.tag_list.join(" "));
            }
            for (i, id) in params.track_ids.iter().enumerate() {
                form = form.text(format!("playlist[tracks][{}][id]", i), id.to_string());
            }
            form
        };

        let response = self
            .authed_multipart("/playlists", make_form, Method::POST)
            .await?;
        let data: serde_json::Value = response.json().await.map_err(http_err)?;
        tracing::info!(id = ?data.get("id"), "SoundCloud playlist created");
        Ok(data)
    }
}
