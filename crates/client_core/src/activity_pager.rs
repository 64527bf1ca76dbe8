//! Backward-paginated, deduplicated window over one job's activity feed.
//!
//! Items are kept newest-first. A reset load adopts the newest page; cursor
//! loads append older pages and skip any event id already in the window, which
//! absorbs page overlap caused by events inserted between requests.

use std::{collections::HashSet, sync::Arc};

use shared::{
    domain::{ActivityId, JobId},
    protocol::{ActivityEvent, ActivityQuery},
};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::transport::JobsApi;

pub const ACTIVITY_PAGE_SIZE: u32 = 20;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadRequest {
    pub cursor: Option<i64>,
    /// Only meaningful without a cursor: drop the current window first.
    pub reset: bool,
}

impl LoadRequest {
    pub fn reset() -> Self {
        Self {
            cursor: None,
            reset: true,
        }
    }

    pub fn initial() -> Self {
        Self::default()
    }

    pub fn after(cursor: i64) -> Self {
        Self {
            cursor: Some(cursor),
            reset: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded { added: usize },
    /// Another load was in flight, nothing is targeted, or nothing is left.
    Skipped,
    /// The pager was retargeted while the request was out.
    Stale,
    Failed(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityView {
    pub job_id: Option<JobId>,
    pub items: Vec<ActivityEvent>,
    pub cursor: Option<i64>,
    pub has_more: bool,
    pub loading_initial: bool,
    pub loading_more: bool,
    pub error: Option<String>,
}

#[derive(Default)]
struct PagerState {
    job_id: Option<JobId>,
    generation: u64,
    items: Vec<ActivityEvent>,
    seen: HashSet<ActivityId>,
    cursor: Option<i64>,
    loading_initial: bool,
    loading_more: bool,
    error: Option<String>,
}

impl PagerState {
    fn clear_window(&mut self) {
        self.items.clear();
        self.seen.clear();
        self.cursor = None;
    }

    fn append(&mut self, events: Vec<ActivityEvent>) -> usize {
        let before = self.items.len();
        for event in events {
            if self.seen.insert(event.id) {
                self.items.push(event);
            }
        }
        self.items.len() - before
    }
}

pub struct ActivityPager {
    api: Arc<dyn JobsApi>,
    state: Mutex<PagerState>,
}

impl ActivityPager {
    pub fn new(api: Arc<dyn JobsApi>) -> Self {
        Self {
            api,
            state: Mutex::new(PagerState::default()),
        }
    }

    pub fn for_job(api: Arc<dyn JobsApi>, job_id: JobId) -> Self {
        Self {
            api,
            state: Mutex::new(PagerState {
                job_id: Some(job_id),
                ..PagerState::default()
            }),
        }
    }

    /// Points the pager at `job_id` and forgets everything about the previous
    /// target, including loads still in flight.
    pub async fn retarget(&self, job_id: JobId) {
        let mut state = self.state.lock().await;
        let generation = state.generation + 1;
        *state = PagerState {
            job_id: Some(job_id),
            generation,
            ..PagerState::default()
        };
    }

    pub async fn detach(&self) {
        let mut state = self.state.lock().await;
        let generation = state.generation + 1;
        *state = PagerState {
            generation,
            ..PagerState::default()
        };
    }

    pub async fn snapshot(&self) -> ActivityView {
        let state = self.state.lock().await;
        ActivityView {
            job_id: state.job_id,
            items: state.items.clone(),
            cursor: state.cursor,
            has_more: state.cursor.is_some(),
            loading_initial: state.loading_initial,
            loading_more: state.loading_more,
            error: state.error.clone(),
        }
    }

    pub async fn has_more(&self) -> bool {
        self.state.lock().await.cursor.is_some()
    }

    /// Loads the next older page from the current cursor, if there is one.
    pub async fn load_more(&self) -> LoadOutcome {
        let cursor = self.state.lock().await.cursor;
        match cursor {
            Some(cursor) => self.load(LoadRequest::after(cursor)).await,
            None => LoadOutcome::Skipped,
        }
    }

    pub async fn load(&self, request: LoadRequest) -> LoadOutcome {
        let reset = request.reset && request.cursor.is_none();
        let (job_id, generation) = {
            let mut state = self.state.lock().await;
            let Some(job_id) = state.job_id else {
                return LoadOutcome::Skipped;
            };
            if state.loading_initial || state.loading_more {
                debug!(job_id = job_id.0, "activity load already in flight; skipping");
                return LoadOutcome::Skipped;
            }
            if request.cursor.is_some() {
                state.loading_more = true;
            } else {
                state.loading_initial = true;
                if reset {
                    state.clear_window();
                }
            }
            (job_id, state.generation)
        };

        let result = self
            .api
            .list_job_activity(
                job_id,
                ActivityQuery {
                    limit: ACTIVITY_PAGE_SIZE,
                    cursor_id: request.cursor,
                },
            )
            .await;

        let mut state = self.state.lock().await;
        if state.generation != generation {
            debug!(job_id = job_id.0, "dropping activity page for a previous target");
            return LoadOutcome::Stale;
        }
        if request.cursor.is_some() {
            state.loading_more = false;
        } else {
            state.loading_initial = false;
        }

        match result {
            Ok(page) => {
                if reset {
                    state.items.clear();
                    state.seen.clear();
                }
                let added = state.append(page.items);
                state.cursor = page.next_cursor;
                state.error = None;
                debug!(
                    job_id = job_id.0,
                    added,
                    total = state.items.len(),
                    next_cursor = ?state.cursor,
                    "activity page merged"
                );
                LoadOutcome::Loaded { added }
            }
            Err(failure) => {
                warn!(job_id = job_id.0, error = %failure, "activity load failed");
                state.error = Some(failure.message.clone());
                LoadOutcome::Failed(failure.message)
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/activity_pager_tests.rs"]
mod tests;
