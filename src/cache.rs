use crate::voting::PollTally;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Memoizes tally computations per poll. Injected at the call sites so the
/// in-memory implementation can be swapped for a distributed store.
/// Entries must be invalidated whenever a vote or a lifecycle transition is
/// written.
#[async_trait]
pub trait TallyCache: Send + Sync {
    async fn get(&self, poll_id: &str) -> Option<PollTally>;
    async fn put(&self, poll_id: &str, tally: PollTally);
    async fn invalidate(&self, poll_id: &str);
}

#[derive(Default)]
pub struct InMemoryTallyCache {
    entries: RwLock<HashMap<String, PollTally>>,
}

impl InMemoryTallyCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TallyCache for InMemoryTallyCache {
    async fn get(&self, poll_id: &str) -> Option<PollTally> {
        self.entries.read().await.get(poll_id).cloned()
    }

    async fn put(&self, poll_id: &str, tally: PollTally) {
        self.entries.write().await.insert(poll_id.to_string(), tally);
    }

    async fn invalidate(&self, poll_id: &str) {
        self.entries.write().await.remove(poll_id);
    }
}
