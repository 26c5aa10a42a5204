// Web layer - inbound HTTP the outside world calls us on.
//
// Two callers only: the browser coming back from SoundCloud's consent screen,
// and Google posting Drive change notifications. Handlers share the Discord
// `Data` so both sides see the same services.

use std::net::SocketAddr;

use axum::{
    routing::{get, post},
    Router,
};

use crate::config::{DRIVE_WEBHOOK_PATH, SOUNDCLOUD_CALLBACK_PATH};
use crate::discord::Data;

pub mod drive_webhook;
pub mod soundcloud_callback;

pub fn router(data: Data) -> Router {
    Router::new()
        .route("/api/", get(|| async { "OK" }))
        .route(
            SOUNDCLOUD_CALLBACK_PATH,
            get(soundcloud_callback::soundcloud_callback),
        )
        .route(DRIVE_WEBHOOK_PATH, post(drive_webhook::drive_changes))
        .with_state(data)
}

pub async fn serve(router: Router, port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Web server listening on http://{}", addr);

    axum::serve(listener, router).await?;
    Ok(())
}
