//! In-process fakes implementing the pipeline's store and client traits,
//! so the integration suite can exercise the real publisher, consumer and
//! strategies without Redis, Kafka or HTTP.

use async_trait::async_trait;
use event_schema::FanoutEvent;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use timeline_service::clients::{DirectoryLookup, PostStore, UserDirectory, UserInfo};
use timeline_service::domain::{Post, PostId, TimelineEntry, TimelinePage, UserId};
use timeline_service::error::{Result, ServiceError};
use timeline_service::fanout::EventPublisher;
use timeline_service::relationship::{
    clamp_limit, cursor, FollowersPage, RelationshipPage, RelationshipStore,
};
use timeline_service::timeline::store::{TimelineStore, TimelineWrite};
use timeline_service::workers::{FanoutJob, FanoutOutbox};

// ---------------------------------------------------------------------------
// Relationship store
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Graph {
    followers: HashMap<UserId, Vec<UserId>>,
    following: HashMap<UserId, Vec<UserId>>,
}

/// Mirrors the Redis store's semantics: two ordered indices, append on
/// follow, remove-by-value on unfollow.
#[derive(Default)]
pub struct InMemoryRelationshipStore {
    graph: Mutex<Graph>,
}

impl InMemoryRelationshipStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn page(list: &[UserId], limit: Option<usize>, cursor_token: &str) -> Result<RelationshipPage> {
        let limit = clamp_limit(limit);
        let offset = cursor::decode(cursor_token)? as usize;
        if offset >= list.len() {
            return Ok(RelationshipPage {
                user_ids: Vec::new(),
                next_cursor: None,
                has_more: false,
            });
        }
        let end = (offset + limit).min(list.len());
        let has_more = end < list.len();
        Ok(RelationshipPage {
            user_ids: list[offset..end].to_vec(),
            next_cursor: has_more.then(|| cursor::encode(end as u64)),
            has_more,
        })
    }
}

#[async_trait]
impl RelationshipStore for InMemoryRelationshipStore {
    async fn follow(&self, follower_id: UserId, target_id: UserId) -> Result<()> {
        if follower_id == target_id {
            return Err(ServiceError::SelfFollow);
        }
        let mut graph = self.graph.lock().unwrap();
        let followers = graph.followers.entry(target_id).or_default();
        if followers.contains(&follower_id) {
            return Err(ServiceError::AlreadyFollowing {
                follower_id,
                target_id,
            });
        }
        followers.push(follower_id);
        graph.following.entry(follower_id).or_default().push(target_id);
        Ok(())
    }

    async fn unfollow(&self, follower_id: UserId, target_id: UserId) -> Result<()> {
        let mut graph = self.graph.lock().unwrap();
        let followers = graph.followers.entry(target_id).or_default();
        let Some(position) = followers.iter().position(|id| *id == follower_id) else {
            return Err(ServiceError::NotFollowing {
                follower_id,
                target_id,
            });
        };
        followers.remove(position);
        let following = graph.following.entry(follower_id).or_default();
        if let Some(position) = following.iter().position(|id| *id == target_id) {
            following.remove(position);
        }
        Ok(())
    }

    async fn get_followers(
        &self,
        user_id: UserId,
        limit: Option<usize>,
        cursor: &str,
    ) -> Result<RelationshipPage> {
        let graph = self.graph.lock().unwrap();
        let list = graph.followers.get(&user_id).cloned().unwrap_or_default();
        Self::page(&list, limit, cursor)
    }

    async fn get_following(
        &self,
        user_id: UserId,
        limit: Option<usize>,
        cursor: &str,
    ) -> Result<RelationshipPage> {
        let graph = self.graph.lock().unwrap();
        let list = graph.following.get(&user_id).cloned().unwrap_or_default();
        Self::page(&list, limit, cursor)
    }

    async fn get_all_following(&self, user_id: UserId) -> Result<Vec<UserId>> {
        let graph = self.graph.lock().unwrap();
        Ok(graph.following.get(&user_id).cloned().unwrap_or_default())
    }

    async fn follower_count(&self, user_id: UserId) -> Result<u64> {
        let graph = self.graph.lock().unwrap();
        Ok(graph.followers.get(&user_id).map_or(0, |l| l.len() as u64))
    }

    async fn following_count(&self, user_id: UserId) -> Result<u64> {
        let graph = self.graph.lock().unwrap();
        Ok(graph.following.get(&user_id).map_or(0, |l| l.len() as u64))
    }

    async fn check_edge(&self, follower_id: UserId, target_id: UserId) -> Result<bool> {
        let graph = self.graph.lock().unwrap();
        Ok(graph
            .followers
            .get(&target_id)
            .is_some_and(|l| l.contains(&follower_id)))
    }

    async fn get_followers_page(
        &self,
        user_id: UserId,
        limit: usize,
        offset: u64,
    ) -> Result<FollowersPage> {
        let graph = self.graph.lock().unwrap();
        let list = graph.followers.get(&user_id).cloned().unwrap_or_default();
        let total_count = list.len() as u64;
        let start = (offset as usize).min(list.len());
        let end = (start + limit).min(list.len());
        Ok(FollowersPage {
            user_ids: list[start..end].to_vec(),
            total_count,
            has_more: end < list.len(),
        })
    }
}

// ---------------------------------------------------------------------------
// Timeline store
// ---------------------------------------------------------------------------

/// Rows keyed by (owner, post): re-upserting the same post for the same
/// owner overwrites the identical row, matching the Redis store's ZADD
/// idempotency.
#[derive(Default)]
pub struct InMemoryTimelineStore {
    rows: Mutex<HashMap<UserId, BTreeMap<PostId, TimelineEntry>>>,
}

impl InMemoryTimelineStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row_count(&self, owner_id: UserId) -> usize {
        self.rows
            .lock()
            .unwrap()
            .get(&owner_id)
            .map_or(0, |rows| rows.len())
    }
}

#[async_trait]
impl TimelineStore for InMemoryTimelineStore {
    async fn upsert_batch(&self, owner_ids: &[UserId], write: &TimelineWrite) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        for owner_id in owner_ids {
            rows.entry(*owner_id)
                .or_default()
                .insert(write.post_id, write.entry_for(*owner_id));
        }
        Ok(())
    }

    async fn read(&self, owner_id: UserId, limit: usize) -> Result<TimelinePage> {
        let rows = self.rows.lock().unwrap();
        let Some(owned) = rows.get(&owner_id) else {
            return Ok(TimelinePage::empty());
        };
        let mut entries: Vec<TimelineEntry> = owned.values().cloned().collect();
        entries.sort_by(|a, b| (b.created_at, b.post_id).cmp(&(a.created_at, a.post_id)));
        entries.truncate(limit);
        Ok(TimelinePage {
            entries,
            total: owned.len() as u64,
        })
    }
}

/// A push path that is down, for hybrid fallback tests.
pub struct FailingTimelineStore;

#[async_trait]
impl TimelineStore for FailingTimelineStore {
    async fn upsert_batch(&self, _: &[UserId], _: &TimelineWrite) -> Result<()> {
        Err(ServiceError::Storage(redis::RedisError::from((
            redis::ErrorKind::IoError,
            "materialized store unavailable",
        ))))
    }

    async fn read(&self, _: UserId, _: usize) -> Result<TimelinePage> {
        Err(ServiceError::Storage(redis::RedisError::from((
            redis::ErrorKind::IoError,
            "materialized store unavailable",
        ))))
    }
}

// ---------------------------------------------------------------------------
// Post store and user directory
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryPostStore {
    posts: Mutex<HashMap<UserId, Vec<Post>>>,
    unavailable: AtomicBool,
}

impl InMemoryPostStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, post: Post) {
        self.posts
            .lock()
            .unwrap()
            .entry(post.author_id)
            .or_default()
            .push(post);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl PostStore for InMemoryPostStore {
    async fn batch_get_recent_posts(
        &self,
        author_ids: &[UserId],
        per_author_limit: usize,
    ) -> Result<HashMap<UserId, Vec<Post>>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ServiceError::Upstream("post store unavailable".into()));
        }
        let posts = self.posts.lock().unwrap();
        let mut result = HashMap::new();
        for author_id in author_ids {
            if let Some(authored) = posts.get(author_id) {
                let mut recent = authored.clone();
                recent.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
                recent.truncate(per_author_limit);
                result.insert(*author_id, recent);
            }
        }
        Ok(result)
    }
}

#[derive(Default)]
pub struct InMemoryUserDirectory {
    names: Mutex<HashMap<UserId, String>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user_id: UserId, display_name: &str) {
        self.names
            .lock()
            .unwrap()
            .insert(user_id, display_name.to_string());
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn batch_get_user_info(&self, user_ids: &[UserId]) -> Result<DirectoryLookup> {
        let names = self.names.lock().unwrap();
        let mut lookup = DirectoryLookup::default();
        for user_id in user_ids {
            match names.get(user_id) {
                Some(name) => {
                    lookup.users.insert(
                        *user_id,
                        UserInfo {
                            id: *user_id,
                            display_name: name.clone(),
                        },
                    );
                }
                None => lookup.not_found.push(*user_id),
            }
        }
        Ok(lookup)
    }
}

// ---------------------------------------------------------------------------
// Event publisher and outbox
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct CollectingEventPublisher {
    pub events: Mutex<Vec<FanoutEvent>>,
}

impl CollectingEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<FanoutEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventPublisher for CollectingEventPublisher {
    async fn publish(&self, event: &FanoutEvent) -> Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryOutbox {
    pub jobs: Mutex<Vec<FanoutJob>>,
}

impl InMemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FanoutOutbox for InMemoryOutbox {
    async fn enqueue(&self, job: &FanoutJob) -> Result<()> {
        self.jobs.lock().unwrap().push(job.clone());
        Ok(())
    }
}
