//! Clients for the external collaborators of the pipeline: the post store
//! (pull-path reads) and the user directory (author identity resolution).

pub mod post_store;
pub mod user_directory;

pub use post_store::{HttpPostStore, PostStore};
pub use user_directory::{DirectoryLookup, HttpUserDirectory, UserDirectory, UserInfo};

use std::time::Duration;

use crate::error::{Result, ServiceError};

/// Build the shared HTTP client with the configured per-request timeout.
pub fn http_client(request_timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(request_timeout)
        .build()
        .map_err(|e| ServiceError::Internal(format!("failed to build HTTP client: {e}")))
}
