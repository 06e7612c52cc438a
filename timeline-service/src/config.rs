/// Configuration management for timeline-service
///
/// Loads configuration from environment variables.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::timeline::Strategy;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application settings
    pub app: AppConfig,
    /// Redis configuration
    pub redis: RedisConfig,
    /// Kafka configuration
    pub kafka: KafkaConfig,
    /// Fan-out tuning
    pub fanout: FanoutConfig,
    /// Timeline read settings
    pub timeline: TimelineConfig,
    /// Upstream service endpoints
    pub upstream: UpstreamConfig,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application environment (dev, staging, prod)
    pub env: String,
    /// Server host to bind to
    pub host: String,
    /// HTTP port for health checks and the internal read endpoint
    pub http_port: u16,
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis URL (redis://host:port)
    pub url: String,
}

/// Kafka configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaConfig {
    /// Comma-separated broker list
    pub brokers: String,
    /// Topic carrying fan-out events
    pub fanout_topic: String,
    /// Consumer group for the fan-out consumer
    pub group_id: String,
}

/// Fan-out tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutConfig {
    /// Follower count at or above which push fan-out is skipped
    #[serde(default = "default_celebrity_threshold")]
    pub celebrity_threshold: u64,
    /// Audience batch size per fan-out event
    #[serde(default = "default_fanout_batch_size")]
    pub batch_size: usize,
}

/// Timeline read settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineConfig {
    /// Read strategy, fixed at startup
    pub strategy: Strategy,
    /// Default page size for timeline reads
    #[serde(default = "default_timeline_limit")]
    pub default_limit: usize,
    /// Hard cap on requested page size
    #[serde(default = "default_timeline_max_limit")]
    pub max_limit: usize,
    /// Cap on materialized entries kept per user
    #[serde(default = "default_max_entries_per_user")]
    pub max_entries_per_user: usize,
}

/// Upstream service endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the post store service
    pub post_store_url: String,
    /// Base URL of the user directory service
    pub user_directory_url: String,
    /// Per-request timeout for upstream RPC calls, in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

// Default values
fn default_celebrity_threshold() -> u64 {
    10_000
}

fn default_fanout_batch_size() -> usize {
    event_schema::MAX_TARGETS_PER_EVENT
}

fn default_timeline_limit() -> usize {
    20
}

fn default_timeline_max_limit() -> usize {
    100
}

fn default_max_entries_per_user() -> usize {
    800
}

fn default_request_timeout_secs() -> u64 {
    5
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let app = AppConfig {
            env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            http_port: std::env::var("PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8010),
        };

        let redis = RedisConfig {
            url: std::env::var("REDIS_URL")
                .context("REDIS_URL environment variable not set")?,
        };

        let kafka = KafkaConfig {
            brokers: std::env::var("KAFKA_BROKERS")
                .context("KAFKA_BROKERS environment variable not set")?,
            fanout_topic: std::env::var("KAFKA_FANOUT_TOPIC")
                .unwrap_or_else(|_| "timeline.fanout".to_string()),
            group_id: std::env::var("KAFKA_FANOUT_GROUP_ID")
                .unwrap_or_else(|_| "timeline-fanout-consumer".to_string()),
        };

        let fanout = FanoutConfig {
            celebrity_threshold: std::env::var("FANOUT_CELEBRITY_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_celebrity_threshold),
            batch_size: std::env::var("FANOUT_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_fanout_batch_size),
        };

        let timeline = TimelineConfig {
            strategy: std::env::var("TIMELINE_STRATEGY")
                .unwrap_or_else(|_| "hybrid".to_string())
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))
                .context("TIMELINE_STRATEGY must be push, pull or hybrid")?,
            default_limit: std::env::var("TIMELINE_DEFAULT_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_timeline_limit),
            max_limit: std::env::var("TIMELINE_MAX_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_timeline_max_limit),
            max_entries_per_user: std::env::var("TIMELINE_MAX_ENTRIES_PER_USER")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_max_entries_per_user),
        };

        let upstream = UpstreamConfig {
            post_store_url: std::env::var("POST_STORE_URL")
                .context("POST_STORE_URL environment variable not set")?,
            user_directory_url: std::env::var("USER_DIRECTORY_URL")
                .context("USER_DIRECTORY_URL environment variable not set")?,
            request_timeout_secs: std::env::var("UPSTREAM_REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_request_timeout_secs),
        };

        Ok(Config {
            app,
            redis,
            kafka,
            fanout,
            timeline,
            upstream,
        })
    }
}
