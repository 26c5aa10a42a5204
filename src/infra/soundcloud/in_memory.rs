// In-memory TokenStore for tests. Clones share the same map so a test can keep
// a handle and inspect what the client wrote.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::core::soundcloud::{SoundCloudError, TokenDocument, TokenStore};

#[derive(Clone, Default)]
pub struct InMemoryTokenStore {
    docs: Arc<DashMap<String, TokenDocument>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with one document, as if a previous process connected.
    pub fn with_document(key: &str, doc: TokenDocument) -> Self {
        let store = Self::new();
        store.docs.insert(key.to_string(), doc);
        store
    }

    pub fn get(&self, key: &str) -> Option<TokenDocument> {
        self.docs.get(key).map(|doc| doc.clone())
    }

    pub fn remove(&self, key: &str) -> Option<TokenDocument> {
        self.docs.remove(key).map(|(_, doc)| doc)
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn load(&self, key: &str) -> Result<Option<TokenDocument>, SoundCloudError> {
        Ok(self.get(key))
    }

    async fn upsert(&self, key: &str, doc: &TokenDocument) -> Result<(), SoundCloudError> {
        self.docs.insert(key.to_string(), doc.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_replaces_document() {
        let store = InMemoryTokenStore::new();
        assert!(store.load("soundcloud").await.unwrap().is_none());

        let mut doc = TokenDocument {
            access_token: "a1".to_string(),
            refresh_token: None,
            token_type: "OAuth".to_string(),
            scope: None,
            expires_at: None,
            account: None,
        };
        store.upsert("soundcloud", &doc).await.unwrap();

        doc.access_token = "a2".to_string();
        store.upsert("soundcloud", &doc).await.unwrap();

        let loaded = store.load("soundcloud").await.unwrap().unwrap();
        assert_eq!(loaded.access_token, "a2");
    }
}
