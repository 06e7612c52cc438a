//! Post store client.
//!
//! The pull read path fetches every followed author's recent posts in one
//! batched round trip rather than one call per author.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::domain::{Post, UserId};
use crate::error::{Result, ServiceError};

#[async_trait]
pub trait PostStore: Send + Sync {
    /// Fetch up to `per_author_limit` recent posts for each author, keyed
    /// by author. Authors with no posts may be absent from the map.
    async fn batch_get_recent_posts(
        &self,
        author_ids: &[UserId],
        per_author_limit: usize,
    ) -> Result<HashMap<UserId, Vec<Post>>>;
}

#[derive(Debug, Serialize)]
struct BatchGetRecentPostsRequest<'a> {
    author_ids: &'a [UserId],
    per_author_limit: usize,
}

#[derive(Debug, Deserialize)]
struct BatchGetRecentPostsResponse {
    posts: HashMap<UserId, Vec<Post>>,
}

/// JSON-over-HTTP post store client.
#[derive(Clone)]
pub struct HttpPostStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPostStore {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl PostStore for HttpPostStore {
    async fn batch_get_recent_posts(
        &self,
        author_ids: &[UserId],
        per_author_limit: usize,
    ) -> Result<HashMap<UserId, Vec<Post>>> {
        if author_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let url = format!("{}/internal/v1/posts/recent/batch", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&BatchGetRecentPostsRequest {
                author_ids,
                per_author_limit,
            })
            .send()
            .await?
            .error_for_status()
            .map_err(|e| ServiceError::Upstream(format!("post store: {e}")))?;

        let body: BatchGetRecentPostsResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Upstream(format!("post store returned bad body: {e}")))?;

        debug!(
            authors = author_ids.len(),
            returned = body.posts.len(),
            "fetched recent posts"
        );
        Ok(body.posts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono::Utc;

    #[test]
    fn response_deserializes_integer_keys() {
        let json = r#"{
            "posts": {
                "42": [
                    {"id": 1, "author_id": 42, "content": "a", "created_at": "2024-05-01T12:00:00Z"}
                ],
                "43": []
            }
        }"#;

        let body: BatchGetRecentPostsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(body.posts.len(), 2);
        let posts = &body.posts[&42];
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].author_id, 42);
        assert_eq!(
            posts[0].created_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn request_serializes_author_ids() {
        let request = BatchGetRecentPostsRequest {
            author_ids: &[1, 2, 3],
            per_author_limit: 10,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["author_ids"], serde_json::json!([1, 2, 3]));
        assert_eq!(json["per_author_limit"], 10);
    }
}
