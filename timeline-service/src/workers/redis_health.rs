//! Redis connection keepalive.
//!
//! Pings Redis periodically so list/zset operations don't hit stale
//! connections ("broken pipe") after idle periods, and so the connection
//! manager's reconnect kicks in before a user-facing call fails.

use redis::aio::ConnectionManager;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct RedisHealthConfig {
    pub enabled: bool,
    pub check_interval: Duration,
}

impl Default for RedisHealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval: HEALTH_CHECK_INTERVAL,
        }
    }
}

async fn ping(conn: &ConnectionManager) -> redis::RedisResult<()> {
    let mut conn = conn.clone();
    redis::cmd("PING")
        .query_async::<_, String>(&mut conn)
        .await?;
    Ok(())
}

/// Run the keepalive loop forever.
pub async fn run(conn: ConnectionManager, config: RedisHealthConfig) {
    if !config.enabled {
        info!("redis health check disabled by configuration");
        return;
    }

    info!(
        interval_secs = config.check_interval.as_secs(),
        "starting redis health check"
    );

    // Let the rest of the process finish starting up first.
    sleep(Duration::from_secs(10)).await;

    let mut consecutive_failures = 0u32;
    let max_consecutive_failures = 5;

    loop {
        match ping(&conn).await {
            Ok(()) => {
                if consecutive_failures > 0 {
                    info!(
                        previous_failures = consecutive_failures,
                        "redis connection recovered"
                    );
                }
                consecutive_failures = 0;
                debug!("redis health check: ok");
            }
            Err(e) => {
                consecutive_failures += 1;
                if consecutive_failures >= max_consecutive_failures {
                    error!(
                        consecutive_failures,
                        error = %e,
                        "redis health check failing repeatedly"
                    );
                } else {
                    warn!(consecutive_failures, error = %e, "redis health check failed");
                }
            }
        }

        sleep(config.check_interval).await;
    }
}
