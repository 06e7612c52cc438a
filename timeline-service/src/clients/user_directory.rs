//! User directory client.
//!
//! The fan-out consumer resolves author display names here when an event
//! arrives without one embedded. Lookups are batched; unknown IDs come back
//! in `not_found` rather than failing the whole call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::UserId;
use crate::error::{Result, ServiceError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserInfo {
    pub id: UserId,
    pub display_name: String,
}

/// Result of a batched directory lookup.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectoryLookup {
    pub users: HashMap<UserId, UserInfo>,
    #[serde(default)]
    pub not_found: Vec<UserId>,
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn batch_get_user_info(&self, user_ids: &[UserId]) -> Result<DirectoryLookup>;
}

#[derive(Debug, Serialize)]
struct BatchGetUserInfoRequest<'a> {
    user_ids: &'a [UserId],
}

/// JSON-over-HTTP user directory client.
#[derive(Clone)]
pub struct HttpUserDirectory {
    client: reqwest::Client,
    base_url: String,
}

impl HttpUserDirectory {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl UserDirectory for HttpUserDirectory {
    async fn batch_get_user_info(&self, user_ids: &[UserId]) -> Result<DirectoryLookup> {
        if user_ids.is_empty() {
            return Ok(DirectoryLookup::default());
        }

        let url = format!("{}/internal/v1/users/batch", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&BatchGetUserInfoRequest { user_ids })
            .send()
            .await?
            .error_for_status()
            .map_err(|e| ServiceError::Upstream(format!("user directory: {e}")))?;

        let lookup: DirectoryLookup = response.json().await.map_err(|e| {
            ServiceError::Upstream(format!("user directory returned bad body: {e}"))
        })?;
        Ok(lookup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_deserializes_users_and_not_found() {
        let json = r#"{
            "users": {"1": {"id": 1, "display_name": "Ada"}},
            "not_found": [2, 3]
        }"#;

        let lookup: DirectoryLookup = serde_json::from_str(json).unwrap();
        assert_eq!(lookup.users[&1].display_name, "Ada");
        assert_eq!(lookup.not_found, vec![2, 3]);
    }

    #[test]
    fn not_found_defaults_to_empty() {
        let json = r#"{"users": {}}"#;
        let lookup: DirectoryLookup = serde_json::from_str(json).unwrap();
        assert!(lookup.users.is_empty());
        assert!(lookup.not_found.is_empty());
    }
}
