// OAuth redirect target: `GET /soundcloud?code=...&state=...`

use axum::{
    extract::{Query, State},
    http::StatusCode,
};
use serde::Deserialize;

use crate::discord::Data;

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    /// Set by SoundCloud when the user declined.
    error: Option<String>,
}

pub async fn soundcloud_callback(
    State(data): State<Data>,
    Query(params): Query<CallbackParams>,
) -> (StatusCode, &'static str) {
    if let Some(error) = params.error.as_deref() {
        tracing::warn!(error, "SoundCloud authorization was declined");
        return (StatusCode::BAD_REQUEST, "SoundCloud authorization was declined.");
    }

    let state_ok = params
        .state
        .as_deref()
        .is_some_and(|state| data.oauth_states.consume(state));
    if !state_ok {
        tracing::warn!("SoundCloud callback with unknown or reused state");
        return (
            StatusCode::BAD_REQUEST,
            "This link has expired. Run /sc connect again.",
        );
    }

    let Some(code) = params.code.as_deref().filter(|c| !c.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Missing authorization code.");
    };

    match data.soundcloud.exchange_code(code).await {
        Ok(_) => (
            StatusCode::OK,
            "SoundCloud connected. You can close this tab.",
        ),
        Err(err) => {
            tracing::error!("SoundCloud code exchange failed: {}", err);
            (
                StatusCode::BAD_GATEWAY,
                "SoundCloud did not accept the login. Run /sc connect again.",
            )
        }
    }
}
