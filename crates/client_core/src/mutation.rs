use std::{collections::HashMap, future::Future, sync::Arc};

use async_trait::async_trait;
use shared::{
    domain::{JobId, JobStatus},
    protocol::{Card, CardPatch, NewActivity},
};
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::{
    error::{ApiFailure, MutationError},
    events::{EngineEvent, EventSink},
    tags::dedupe_and_normalize,
    transport::JobsApi,
};

pub const STATUS_CHANGE_ACTIVITY: &str = "status_change";

/// Receives every summary change the coordinator makes: optimistic, confirmed
/// and reverted. The board cache is the main subscriber.
#[async_trait]
pub trait CardObserver: Send + Sync {
    async fn card_patched(&self, job_id: JobId, patch: &CardPatch);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Edit,
    StatusChange,
    Tags,
    Priority,
    /// Stamps the last action and optionally sets the next one.
    Momentum,
    ScheduleNextAction,
}

impl MutationKind {
    pub fn completes_follow_up(self) -> bool {
        matches!(self, Self::Momentum | Self::ScheduleNextAction)
    }
}

/// Snapshot held for exactly one in-flight patch per job.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMutation {
    pub entity_id: JobId,
    pub previous: Card,
    pub in_flight: bool,
}

#[derive(Default)]
struct CoordinatorState {
    records: HashMap<JobId, Card>,
    pending: HashMap<JobId, PendingMutation>,
}

pub struct CardMutationCoordinator {
    api: Arc<dyn JobsApi>,
    observers: RwLock<Vec<Arc<dyn CardObserver>>>,
    inner: Mutex<CoordinatorState>,
    events: EventSink,
}

impl CardMutationCoordinator {
    pub fn new(api: Arc<dyn JobsApi>) -> Arc<Self> {
        Self::with_events(api, EventSink::new())
    }

    pub fn with_events(api: Arc<dyn JobsApi>, events: EventSink) -> Arc<Self> {
        Arc::new(Self {
            api,
            observers: RwLock::new(Vec::new()),
            inner: Mutex::new(CoordinatorState::default()),
            events,
        })
    }

    pub fn api(&self) -> Arc<dyn JobsApi> {
        Arc::clone(&self.api)
    }

    pub fn events(&self) -> EventSink {
        self.events.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub async fn add_observer(&self, observer: Arc<dyn CardObserver>) {
        self.observers.write().await.push(observer);
    }

    /// Records server-fetched state as the known state of a job and forwards it
    /// to observers. Ignored while a patch for that job is in flight so the
    /// rollback snapshot stays valid.
    pub async fn track(&self, mut card: Card) {
        card.tags = dedupe_and_normalize(&card.tags);
        {
            let mut guard = self.inner.lock().await;
            if guard.pending.contains_key(&card.id) {
                debug!(job_id = card.id.0, "ignoring fetched card while a patch is in flight");
                return;
            }
            guard.records.insert(card.id, card.clone());
        }
        self.notify(card.id, &CardPatch::from_card(&card)).await;
    }

    pub async fn track_all(&self, cards: impl IntoIterator<Item = Card>) {
        for card in cards {
            self.track(card).await;
        }
    }

    pub async fn forget(&self, job_id: JobId) {
        let mut guard = self.inner.lock().await;
        if !guard.pending.contains_key(&job_id) {
            guard.records.remove(&job_id);
        }
    }

    pub async fn current(&self, job_id: JobId) -> Option<Card> {
        self.inner.lock().await.records.get(&job_id).cloned()
    }

    pub async fn pending(&self, job_id: JobId) -> Option<PendingMutation> {
        self.inner.lock().await.pending.get(&job_id).cloned()
    }

    pub async fn is_in_flight(&self, job_id: JobId) -> bool {
        self.inner.lock().await.pending.contains_key(&job_id)
    }

    async fn notify(&self, job_id: JobId, patch: &CardPatch) {
        let observers = self.observers.read().await.clone();
        for observer in observers {
            observer.card_patched(job_id, patch).await;
        }
    }

    pub async fn apply_patch(
        &self,
        job_id: JobId,
        patch: CardPatch,
        kind: MutationKind,
    ) -> Result<Card, MutationError> {
        let api = Arc::clone(&self.api);
        self.apply_with(job_id, patch, kind, |patch| async move {
            api.patch_job(job_id, &patch).await
        })
        .await
    }

    /// Optimistically applies `patch`, runs `request`, then either merges the
    /// server's answer over the optimistic state or restores the snapshot.
    ///
    /// A second call for a job that already has a patch in flight is rejected
    /// with [`MutationError::InFlight`] and changes nothing.
    pub async fn apply_with<F, Fut>(
        &self,
        job_id: JobId,
        mut patch: CardPatch,
        kind: MutationKind,
        request: F,
    ) -> Result<Card, MutationError>
    where
        F: FnOnce(CardPatch) -> Fut,
        Fut: Future<Output = Result<CardPatch, ApiFailure>>,
    {
        if let Some(tags) = patch.tags.take() {
            patch.tags = Some(dedupe_and_normalize(tags));
        }
        if patch.is_empty() {
            return Err(MutationError::Validation("nothing to change".to_string()));
        }

        let previous = {
            let mut guard = self.inner.lock().await;
            if guard.pending.contains_key(&job_id) {
                return Err(MutationError::InFlight(job_id));
            }
            let Some(previous) = guard.records.get(&job_id).cloned() else {
                return Err(MutationError::UnknownEntity(job_id));
            };
            let mut optimistic = previous.clone();
            patch.apply_to(&mut optimistic);
            guard.records.insert(job_id, optimistic);
            guard.pending.insert(
                job_id,
                PendingMutation {
                    entity_id: job_id,
                    previous: previous.clone(),
                    in_flight: true,
                },
            );
            previous
        };

        debug!(job_id = job_id.0, ?kind, "applied optimistic patch");
        self.notify(job_id, &patch).await;

        match request(patch.clone()).await {
            Ok(confirmed) => {
                let merged = {
                    let mut guard = self.inner.lock().await;
                    guard.pending.remove(&job_id);
                    let mut merged = guard.records.get(&job_id).cloned().unwrap_or_else(|| {
                        let mut optimistic = previous.clone();
                        patch.apply_to(&mut optimistic);
                        optimistic
                    });
                    confirmed.apply_to(&mut merged);
                    if kind.completes_follow_up() {
                        merged.needs_follow_up = false;
                    }
                    merged.tags = dedupe_and_normalize(&merged.tags);
                    guard.records.insert(job_id, merged.clone());
                    merged
                };

                self.notify(job_id, &CardPatch::from_card(&merged)).await;
                info!(job_id = job_id.0, ?kind, "job patch confirmed");
                self.events.emit(EngineEvent::CardSettled {
                    job_id,
                    card: merged.clone(),
                });
                Ok(merged)
            }
            Err(failure) => {
                {
                    let mut guard = self.inner.lock().await;
                    guard.pending.remove(&job_id);
                    guard.records.insert(job_id, previous.clone());
                }

                self.notify(job_id, &patch.revert_from(&previous)).await;
                warn!(job_id = job_id.0, ?kind, error = %failure, "job patch failed; rolled back");
                self.events.emit(EngineEvent::CardRolledBack {
                    job_id,
                    card: previous,
                });
                self.events.error(failure.message.clone());
                Err(MutationError::Request(failure))
            }
        }
    }

    /// Moves a job to `status` and records the transition in its activity
    /// feed. Moving to the current status is a no-op.
    pub async fn change_status(
        &self,
        job_id: JobId,
        status: JobStatus,
    ) -> Result<Card, MutationError> {
        let Some(current) = self.current(job_id).await else {
            return Err(MutationError::UnknownEntity(job_id));
        };
        if current.status == status {
            return Ok(current);
        }

        let card = self
            .apply_patch(job_id, CardPatch::status(status), MutationKind::StatusChange)
            .await?;

        let entry = NewActivity {
            kind: STATUS_CHANGE_ACTIVITY.to_string(),
            message: format!("Status moved to {status}"),
        };
        if let Err(failure) = self.api.create_job_activity(job_id, &entry).await {
            // The status change itself is committed; only the log entry is missing.
            warn!(job_id = job_id.0, error = %failure, "failed to record status transition");
            self.events.error(format!(
                "Status updated, but the activity entry failed: {}",
                failure.message
            ));
        }
        Ok(card)
    }
}

#[cfg(test)]
#[path = "tests/mutation_tests.rs"]
mod tests;
