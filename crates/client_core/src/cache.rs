use std::{collections::HashMap, future::Future, sync::Arc, time::Duration};

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::{sync::Mutex, time::Instant};
use tracing::debug;

use crate::error::{ClientError, ClientResult};

pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(30);

type InflightFetch = Shared<BoxFuture<'static, ClientResult<Arc<Value>>>>;

struct CachedEntry {
    value: Arc<Value>,
    fetched_at: Instant,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CachedEntry>,
    inflight: HashMap<String, InflightFetch>,
}

/// Read-through cache for GET endpoints. Fresh entries are served locally,
/// concurrent fetches of one key share a single request, and failures are
/// never cached.
pub struct QueryCache {
    stale_after: Duration,
    state: Mutex<CacheState>,
}

impl QueryCache {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            stale_after,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    pub async fn fetch<T, F, Fut>(&self, key: &str, fetch: F) -> ClientResult<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = ClientResult<T>> + Send + 'static,
    {
        let shared = {
            let mut state = self.state.lock().await;
            if let Some(entry) = state.entries.get(key) {
                if entry.fetched_at.elapsed() < self.stale_after {
                    debug!("cache: hit key={key}");
                    return decode(&entry.value);
                }
            }

            match state.inflight.get(key) {
                Some(inflight) => {
                    debug!("cache: joining in-flight fetch key={key}");
                    inflight.clone()
                }
                None => {
                    debug!("cache: miss key={key}");
                    let request = fetch();
                    let shared = async move {
                        let value = request.await?;
                        Ok::<_, ClientError>(Arc::new(serde_json::to_value(value)?))
                    }
                    .boxed()
                    .shared();
                    state.inflight.insert(key.to_string(), shared.clone());
                    shared
                }
            }
        };

        let result = shared.clone().await;

        {
            let mut state = self.state.lock().await;
            let owns_inflight = state
                .inflight
                .get(key)
                .is_some_and(|current| current.ptr_eq(&shared));
            if owns_inflight {
                state.inflight.remove(key);
                if let Ok(value) = &result {
                    state.entries.insert(
                        key.to_string(),
                        CachedEntry {
                            value: Arc::clone(value),
                            fetched_at: Instant::now(),
                        },
                    );
                }
            }
        }

        decode(result?.as_ref())
    }

    /// Returns a cached value regardless of age.
    pub async fn peek<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let state = self.state.lock().await;
        let entry = state.entries.get(key)?;
        serde_json::from_value(entry.value.as_ref().clone()).ok()
    }

    /// Writes locally patched data back so the next read sees it.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> ClientResult<()> {
        let value = Arc::new(serde_json::to_value(value)?);
        let mut state = self.state.lock().await;
        state.entries.insert(
            key.to_string(),
            CachedEntry {
                value,
                fetched_at: Instant::now(),
            },
        );
        Ok(())
    }

    /// Drops the entry and detaches any in-flight fetch for the key, so a
    /// response started before a mutation is never stored.
    pub async fn invalidate(&self, key: &str) -> bool {
        let mut state = self.state.lock().await;
        let detached = state.inflight.remove(key).is_some();
        state.entries.remove(key).is_some() || detached
    }

    pub async fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut state = self.state.lock().await;
        state.inflight.retain(|key, _| !key.starts_with(prefix));
        let before = state.entries.len();
        state.entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before - state.entries.len();
        if removed > 0 {
            debug!("cache: invalidated prefix={prefix} entries={removed}");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(DEFAULT_STALE_AFTER)
    }
}

fn decode<T: DeserializeOwned>(value: &Value) -> ClientResult<T> {
    serde_json::from_value(value.clone()).map_err(|err| ClientError::Decode(err.to_string()))
}

/// Cache keys for the read endpoints.
pub mod keys {
    use shared::domain::{CharacterId, ProjectId, QuestionId, TextId};

    pub const PROJECTS: &str = "projects";
    pub const CHECKLISTS: &str = "checklists";

    pub fn texts(project_id: ProjectId) -> String {
        format!("texts:{project_id}")
    }

    pub fn characters(text_id: TextId) -> String {
        format!("characters:{text_id}")
    }

    pub fn characters_prefix() -> &'static str {
        "characters:"
    }

    pub fn checklist(character_id: CharacterId, slug: &str) -> String {
        format!("checklist:{character_id}:{slug}")
    }

    pub fn checklists_for_character(character_id: CharacterId) -> String {
        format!("checklist:{character_id}:")
    }

    pub fn history(character_id: CharacterId, question_id: QuestionId) -> String {
        format!("history:{character_id}:{question_id}")
    }
}

#[cfg(test)]
#[path = "tests/cache_tests.rs"]
mod tests;
