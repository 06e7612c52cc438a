use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use anyhow::{Context, Result};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::info;

use timeline_service::clients::{http_client, HttpPostStore, HttpUserDirectory, UserDirectory};
use timeline_service::config::Config;
use timeline_service::error::{ErrorKind, ServiceError};
use timeline_service::fanout::{
    FanoutConsumer, FanoutConsumerConfig, FanoutDecisionEngine, FanoutPublisher,
    KafkaEventPublisher,
};
use timeline_service::relationship::{RedisRelationshipStore, RelationshipStore};
use timeline_service::retry::{with_backoff, RetryConfig};
use timeline_service::timeline::{
    HybridTimeline, PullTimeline, PushTimeline, RedisTimelineStore, Strategy, TimelineStore,
    TimelineStrategy,
};
use timeline_service::workers::{FanoutOutbox, FanoutProcessor, OutboxWorker, RedisFanoutOutbox};

struct ReadState {
    strategy: Arc<dyn TimelineStrategy>,
    default_limit: usize,
    max_limit: usize,
}

#[derive(Deserialize)]
struct TimelineQuery {
    limit: Option<usize>,
}

async fn health() -> impl Responder {
    "OK"
}

async fn ready() -> impl Responder {
    "READY"
}

async fn metrics_endpoint() -> HttpResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        return HttpResponse::InternalServerError().body(format!("error: {e}"));
    }
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}

fn error_response(err: &ServiceError) -> HttpResponse {
    let body = serde_json::json!({ "error": err.to_string() });
    match err.kind() {
        ErrorKind::Validation => HttpResponse::BadRequest().json(body),
        ErrorKind::Conflict => HttpResponse::Conflict().json(body),
        ErrorKind::Dependency => HttpResponse::ServiceUnavailable().json(body),
        ErrorKind::Internal => HttpResponse::InternalServerError().json(body),
    }
}

/// Internal read endpoint exercising the public read contract. The product
/// HTTP surface lives in the gateway, not here.
async fn internal_timeline(
    path: web::Path<i64>,
    query: web::Query<TimelineQuery>,
    state: web::Data<ReadState>,
) -> HttpResponse {
    let user_id = path.into_inner();
    let limit = query
        .limit
        .unwrap_or(state.default_limit)
        .clamp(1, state.max_limit);

    match state.strategy.get_timeline(user_id, limit).await {
        Ok(page) => HttpResponse::Ok().json(page),
        Err(e) => error_response(&e),
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate =
            signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = terminate.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    info!("starting timeline-service");

    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        "configuration loaded: env={}, http_port={}, strategy={}",
        config.app.env, config.app.http_port, config.timeline.strategy
    );

    // Redis connection, retried with backoff at establishment only.
    let redis_client = redis::Client::open(config.redis.url.as_str())
        .context("Failed to create Redis client")?;
    let redis_conn = with_backoff(&RetryConfig::default(), "redis connect", || {
        let client = redis_client.clone();
        async move { redis::aio::ConnectionManager::new(client).await }
    })
    .await
    .context("Failed to connect to Redis")?;
    info!("redis connection established");

    // Stores
    let relationships: Arc<dyn RelationshipStore> =
        Arc::new(RedisRelationshipStore::new(redis_conn.clone()));
    let timelines: Arc<dyn TimelineStore> = Arc::new(RedisTimelineStore::new(
        redis_conn.clone(),
        config.timeline.max_entries_per_user,
    ));
    let outbox: Arc<dyn FanoutOutbox> = Arc::new(RedisFanoutOutbox::new(redis_conn.clone()));

    // Upstream clients
    let client = http_client(Duration::from_secs(config.upstream.request_timeout_secs))?;
    let posts = Arc::new(HttpPostStore::new(
        client.clone(),
        config.upstream.post_store_url.clone(),
    ));
    let directory: Arc<dyn UserDirectory> = Arc::new(HttpUserDirectory::new(
        client,
        config.upstream.user_directory_url.clone(),
    ));

    // Fan-out pipeline
    let events = Arc::new(KafkaEventPublisher::new(
        &config.kafka.brokers,
        config.kafka.fanout_topic.clone(),
    )?);
    let publisher = FanoutPublisher::new(relationships.clone(), events, config.fanout.batch_size);
    let engine = FanoutDecisionEngine::new(config.fanout.celebrity_threshold);
    let processor = FanoutProcessor::new(relationships.clone(), publisher, engine);
    let outbox_worker = OutboxWorker::new(redis_conn.clone(), processor);

    let consumer = FanoutConsumer::new(
        FanoutConsumerConfig {
            brokers: config.kafka.brokers.clone(),
            group_id: config.kafka.group_id.clone(),
            topic: config.kafka.fanout_topic.clone(),
        },
        directory.clone(),
        timelines.clone(),
    );

    // Read strategy, constructed once and held by reference.
    let strategy: Arc<dyn TimelineStrategy> = match config.timeline.strategy {
        Strategy::Push => Arc::new(PushTimeline::new(timelines.clone(), outbox.clone())),
        Strategy::Pull => Arc::new(PullTimeline::new(
            relationships.clone(),
            posts.clone(),
            directory.clone(),
        )),
        Strategy::Hybrid => Arc::new(HybridTimeline::new(
            PushTimeline::new(timelines.clone(), outbox.clone()),
            PullTimeline::new(relationships.clone(), posts.clone(), directory.clone()),
        )),
    };

    let read_state = web::Data::new(ReadState {
        strategy,
        default_limit: config.timeline.default_limit,
        max_limit: config.timeline.max_limit,
    });

    let http_addr = format!("{}:{}", config.app.host, config.app.http_port);
    info!("http listener: http://{}", http_addr);

    let mut join_set = JoinSet::new();

    let http_server = HttpServer::new(move || {
        App::new()
            .app_data(read_state.clone())
            .route("/health", web::get().to(health))
            .route("/ready", web::get().to(ready))
            .route("/metrics", web::get().to(metrics_endpoint))
            .route(
                "/internal/v1/timeline/{user_id}",
                web::get().to(internal_timeline),
            )
    })
    .bind(&http_addr)
    .context("Failed to bind HTTP server")?
    .run();

    join_set.spawn(async move {
        http_server
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))
    });

    join_set.spawn(async move {
        consumer.run().await;
        Ok(())
    });

    join_set.spawn(async move {
        outbox_worker.run().await;
        Ok(())
    });

    let health_conn = redis_conn.clone();
    join_set.spawn(async move {
        timeline_service::workers::redis_health::run(
            health_conn,
            timeline_service::workers::redis_health::RedisHealthConfig::default(),
        )
        .await;
        Ok(())
    });

    info!("timeline-service is running");

    tokio::select! {
        _ = shutdown_signal() => {
            info!("shutdown signal received");
        }
        Some(result) = join_set.join_next() => {
            match result {
                Ok(Ok(())) => info!("background task completed"),
                Ok(Err(e)) => {
                    tracing::error!("task failed: {:#}", e);
                    return Err(e);
                }
                Err(e) => {
                    tracing::error!("task panicked: {:#}", e);
                    return Err(anyhow::anyhow!("task panicked: {}", e));
                }
            }
        }
    }

    join_set.shutdown().await;
    info!("timeline-service shut down");
    Ok(())
}
