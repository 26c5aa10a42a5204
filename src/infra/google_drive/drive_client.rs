use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use std::sync::Arc;

use crate::core::drive::{ChangePage, DriveChangesApi, DriveError, WatchChannel, WatchRequest};

const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Fields requested from `changes.list`. Keeps the payload down to what
/// `DriveChange` reads.
const CHANGE_FIELDS: &str = "nextPageToken,newStartPageToken,changes(changeType,fileId,removed,time,file(id,name,mimeType,parents,trashed))";

/// Source of bearer tokens for the Drive API.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String, DriveError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartPageTokenResponse {
    #[serde(default)]
    start_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelResponse {
    id: String,
    resource_id: String,
    /// Epoch milliseconds, sent as a string.
    #[serde(default)]
    expiration: Option<String>,
}

fn http_err(e: reqwest::Error) -> DriveError {
    DriveError::Http(e.to_string())
}

/// REST client for the Drive v3 change feed.
pub struct GoogleDriveClient {
    client: Client,
    auth: Arc<dyn AccessTokenProvider>,
    base_url: String,
}

impl GoogleDriveClient {
    pub fn new(auth: Arc<dyn AccessTokenProvider>) -> Self {
        Self::with_base_url(auth, DRIVE_API_BASE)
    }

    pub fn with_base_url(auth: Arc<dyn AccessTokenProvider>, base_url: &str) -> Self {
        Self {
            client: Client::new(),
            auth,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, DriveError> {
        let token = self.auth.access_token().await?;
        let response = request.bearer_auth(token).send().await.map_err(http_err)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(DriveError::Api { status, body });
        }
        Ok(response)
    }
}

#[async_trait]
impl DriveChangesApi for GoogleDriveClient {
    async fn get_start_page_token(&self) -> Result<Option<String>, DriveError> {
        let url = format!("{}/changes/startPageToken", self.base_url);
        let response = self
            .send(self.client.get(&url).query(&[("supportsAllDrives", "true")]))
            .await?;

        let body: StartPageTokenResponse = response.json().await.map_err(http_err)?;
        Ok(body.start_page_token)
    }

    async fn list_changes(&self, page_token: &str) -> Result<ChangePage, DriveError> {
        let url = format!("{}/changes", self.base_url);
        let response = self
            .send(self.client.get(&url).query(&[
                ("pageToken", page_token),
                ("pageSize", "100"),
                ("fields", CHANGE_FIELDS),
                ("includeItemsFromAllDrives", "true"),
                ("supportsAllDrives", "true"),
            ]))
            .await?;

        response.json().await.map_err(http_err)
    }

    async fn watch_changes(
        &self,
        page_token: &str,
        request: &WatchRequest,
    ) -> Result<WatchChannel, DriveError> {
        let url = format!("{}/changes/watch", self.base_url);
        let response = self
            .send(
                self.client
                    .post(&url)
                    .query(&[
                        ("pageToken", page_token),
                        ("includeItemsFromAllDrives", "true"),
                        ("supportsAllDrives", "true"),
                    ])
                    .json(request),
            )
            .await?;

        let channel: ChannelResponse = response.json().await.map_err(http_err)?;
        let expiration = parse_expiration(channel.expiration.as_deref(), &channel.id);
        Ok(WatchChannel {
            channel_id: channel.id,
            resource_id: channel.resource_id,
            expiration,
        })
    }

    async fn stop_channel(&self, channel_id: &str, resource_id: &str) -> Result<(), DriveError> {
        let url = format!("{}/channels/stop", self.base_url);
        self.send(self.client.post(&url).json(&serde_json::json!({
            "id": channel_id,
            "resourceId": resource_id,
        })))
        .await?;
        Ok(())
    }
}

/// Drive sends the expiration as epoch milliseconds in a string. An
/// unreadable value leaves the channel without a renewal deadline.
fn parse_expiration(raw: Option<&str>, channel_id: &str) -> Option<i64> {
    let raw = raw?;
    match raw.parse() {
        Ok(ms) => Some(ms),
        Err(err) => {
            tracing::warn!(
                channel_id,
                expiration = raw,
                "Unreadable Drive channel expiration, the channel will not be renewed before it lapses: {}",
                err
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct StaticToken;

    #[async_trait]
    impl AccessTokenProvider for StaticToken {
        async fn access_token(&self) -> Result<String, DriveError> {
            Ok("test-token".to_string())
        }
    }

    struct FailingToken;

    #[async_trait]
    impl AccessTokenProvider for FailingToken {
        async fn access_token(&self) -> Result<String, DriveError> {
            Err(DriveError::Auth("no key".to_string()))
        }
    }

    fn client(server: &MockServer) -> GoogleDriveClient {
        GoogleDriveClient::with_base_url(Arc::new(StaticToken), &server.uri())
    }

    #[tokio::test]
    async fn test_get_start_page_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/changes/startPageToken"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "startPageToken": "1234" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let token = client(&server).get_start_page_token().await.unwrap();
        assert_eq!(token.as_deref(), Some("1234"));
    }

    #[tokio::test]
    async fn test_missing_start_page_token_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/changes/startPageToken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        assert!(client(&server).get_start_page_token().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_changes_sends_cursor_and_page_size() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/changes"))
            .and(query_param("pageToken", "77"))
            .and(query_param("pageSize", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "newStartPageToken": "80",
                "changes": [{ "fileId": "f1", "file": { "id": "f1", "name": "a.wav" } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let page = client(&server).list_changes("77").await.unwrap();
        assert_eq!(page.new_start_page_token.as_deref(), Some("80"));
        assert_eq!(page.changes[0].file_id.as_deref(), Some("f1"));
    }

    #[tokio::test]
    async fn test_watch_changes_parses_string_expiration() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/changes/watch"))
            .and(query_param("pageToken", "10"))
            .and(body_json(json!({
                "id": "chan-1",
                "type": "web_hook",
                "address": "https://bot.example/api/google/changes"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "kind": "api#channel",
                "id": "chan-1",
                "resourceId": "res-9",
                "resourceUri": "https://www.googleapis.com/drive/v3/changes",
                "expiration": "1735689600000"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let request = WatchRequest::web_hook("chan-1", "https://bot.example/api/google/changes");
        let channel = client(&server).watch_changes("10", &request).await.unwrap();

        assert_eq!(channel.channel_id, "chan-1");
        assert_eq!(channel.resource_id, "res-9");
        assert_eq!(channel.expiration, Some(1_735_689_600_000));
    }

    #[tokio::test]
    async fn test_watch_changes_tolerates_unreadable_expiration() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/changes/watch"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "chan-1",
                "resourceId": "res-9",
                "expiration": "soon"
            })))
            .mount(&server)
            .await;

        let request = WatchRequest::web_hook("chan-1", "https://bot.example/api/google/changes");
        let channel = client(&server).watch_changes("10", &request).await.unwrap();

        assert_eq!(channel.channel_id, "chan-1");
        assert!(channel.expiration.is_none());
    }

    #[test]
    fn test_parse_expiration() {
        assert_eq!(parse_expiration(Some("1735689600000"), "c"), Some(1_735_689_600_000));
        assert_eq!(parse_expiration(Some("soon"), "c"), None);
        assert_eq!(parse_expiration(Some(""), "c"), None);
        assert_eq!(parse_expiration(None, "c"), None);
    }

    #[tokio::test]
    async fn test_stop_channel_posts_both_ids() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/channels/stop"))
            .and(body_json(json!({ "id": "chan-1", "resourceId": "res-9" })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).stop_channel("chan-1", "res-9").await.unwrap();
    }

    #[tokio::test]
    async fn test_non_success_carries_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/changes"))
            .respond_with(ResponseTemplate::new(404).set_body_string("invalid page token"))
            .mount(&server)
            .await;

        match client(&server).list_changes("bad").await.unwrap_err() {
            DriveError::Api { status, body } => {
                assert_eq!(status, 404);
                assert_eq!(body, "invalid page token");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_auth_failure_sends_nothing() {
        let server = MockServer::start().await;
        let client = GoogleDriveClient::with_base_url(Arc::new(FailingToken), &server.uri());

        assert!(matches!(
            client.get_start_page_token().await,
            Err(DriveError::Auth(_))
        ));
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
