// Drive push notifications: `POST /api/google/changes`
//
// The notification body is empty, everything we need is in the `x-goog-*`
// headers. A non-2xx answer makes Google redeliver, so drain failures map to 500.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
};

use crate::core::drive::DriveNotification;
use crate::discord::Data;

fn notification_from(headers: &HeaderMap) -> DriveNotification {
    DriveNotification::from_headers(|name| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    })
}

pub async fn drive_changes(
    State(data): State<Data>,
    headers: HeaderMap,
) -> (StatusCode, &'static str) {
    let Some(drive) = data.drive.as_ref() else {
        return (StatusCode::SERVICE_UNAVAILABLE, "Drive sync disabled");
    };

    let notification = notification_from(&headers);
    tracing::info!(
        channel_id = ?notification.channel_id,
        resource_id = ?notification.resource_id,
        resource_state = ?notification.resource_state,
        message_number = ?notification.message_number,
        "Drive notification received"
    );

    match drive.handle_notification(&notification).await {
        Ok(report) => {
            tracing::debug!(changes = report.changes.len(), "Drive notification handled");
            (StatusCode::OK, "OK")
        }
        Err(err) => {
            tracing::error!("Drive sync failed: {}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, "ERR")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::router;
    use crate::web::test_support::{data, spawn};
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_notification_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-goog-channel-id", "chan-1".parse().unwrap());
        headers.insert("x-goog-resource-state", "change".parse().unwrap());
        headers.insert("x-goog-message-number", "12".parse().unwrap());

        let notification = notification_from(&headers);
        assert_eq!(notification.channel_id.as_deref(), Some("chan-1"));
        assert_eq!(notification.resource_state.as_deref(), Some("change"));
        assert_eq!(notification.message_number, Some(12));
        assert!(notification.resource_id.is_none());
    }

    async fn post_change(base: &str, state: &str) -> reqwest::Response {
        reqwest::Client::new()
            .post(format!("{}/api/google/changes", base))
            .header("x-goog-channel-id", "chan-1")
            .header("x-goog-resource-state", state)
            .send()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_disabled_drive_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn(router(data(&dir, "http://127.0.0.1:9", false).await)).await;

        assert_eq!(post_change(&base, "change").await.status(), 503);
    }

    #[tokio::test]
    async fn test_notification_drains_feed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/changes"))
            .and(query_param("pageToken", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "newStartPageToken": "6",
                "changes": [{ "fileId": "f1", "file": { "id": "f1", "name": "mix.wav" } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let data = data(&dir, &server.uri(), true).await;
        let drive = data.drive.clone().unwrap();
        drive.watcher().init_watch(Some("5".to_string())).await.unwrap();
        let base = spawn(router(data)).await;

        let response = post_change(&base, "change").await;
        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await.unwrap(), "OK");
        assert_eq!(drive.watcher().page_token().await.as_deref(), Some("6"));
    }

    #[tokio::test]
    async fn test_sync_handshake_does_not_drain() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/changes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let data = data(&dir, &server.uri(), true).await;
        data.drive
            .as_ref()
            .unwrap()
            .watcher()
            .init_watch(Some("5".to_string()))
            .await
            .unwrap();
        let base = spawn(router(data)).await;

        assert_eq!(post_change(&base, "sync").await.status(), 200);
    }

    #[tokio::test]
    async fn test_failed_drain_asks_for_redelivery() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/changes"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let data = data(&dir, &server.uri(), true).await;
        let drive = data.drive.clone().unwrap();
        drive.watcher().init_watch(Some("5".to_string())).await.unwrap();
        let base = spawn(router(data)).await;

        let response = post_change(&base, "change").await;
        assert_eq!(response.status(), 500);
        assert_eq!(response.text().await.unwrap(), "ERR");
        assert_eq!(drive.watcher().page_token().await.as_deref(), Some("5"));
    }
}
