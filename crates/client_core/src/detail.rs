//! One open job detail view: the job, its notes, interviews and activity.
//!
//! Card fields go through the [`CardMutationCoordinator`] and are predicted
//! locally. Notes, interviews and activity are not: after any successful
//! mutation the whole bundle is re-fetched and the activity feed reset-loaded.
//! Responses that arrive after the view moved to another job (or closed) are
//! dropped by comparing generations.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use shared::{
    domain::{InterviewId, JobId, JobStatus, NoteId, Priority},
    protocol::{
        Card, CardPatch, Interview, InterviewFields, InterviewPatch, JobDetailBundle, NewNote,
        Note,
    },
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    activity_pager::{ActivityPager, ActivityView, LoadOutcome, LoadRequest},
    drag::{self, DropResolution},
    error::{ApiFailure, DetailError, MutationError},
    events::{EngineEvent, EventSink},
    mutation::{CardMutationCoordinator, MutationKind},
    tags::{dedupe_and_normalize, normalize},
    transport::JobsApi,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MomentumAction {
    /// Also schedule a next action; requires `next_action_at`.
    pub schedule_next: bool,
    pub next_action_title: Option<String>,
    pub next_action_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailView {
    pub job_id: Option<JobId>,
    pub job: Option<Card>,
    pub notes: Vec<Note>,
    pub interviews: Vec<Interview>,
    pub loading: bool,
    pub error: Option<String>,
    pub activity: ActivityView,
}

#[derive(Default)]
struct DetailState {
    current: Option<JobId>,
    generation: u64,
    bundle: Option<JobDetailBundle>,
    loading: bool,
    error: Option<String>,
}

pub struct DetailBundleController {
    api: Arc<dyn JobsApi>,
    coordinator: Arc<CardMutationCoordinator>,
    pager: ActivityPager,
    events: EventSink,
    inner: Mutex<DetailState>,
}

impl DetailBundleController {
    pub fn new(coordinator: Arc<CardMutationCoordinator>) -> Self {
        let api = coordinator.api();
        Self {
            pager: ActivityPager::new(Arc::clone(&api)),
            events: coordinator.events(),
            api,
            coordinator,
            inner: Mutex::new(DetailState::default()),
        }
    }

    pub fn pager(&self) -> &ActivityPager {
        &self.pager
    }

    pub async fn current(&self) -> Option<JobId> {
        self.inner.lock().await.current
    }

    async fn is_current(&self, job_id: JobId) -> bool {
        self.inner.lock().await.current == Some(job_id)
    }

    async fn require_current(&self) -> Result<JobId, DetailError> {
        self.current().await.ok_or(DetailError::NotOpen)
    }

    /// Opens `job_id`: bundle first, then a reset load of its activity.
    pub async fn open(&self, job_id: JobId) -> Result<(), DetailError> {
        let generation = {
            let mut state = self.inner.lock().await;
            state.generation += 1;
            state.current = Some(job_id);
            state.bundle = None;
            state.error = None;
            state.loading = true;
            state.generation
        };
        self.pager.retarget(job_id).await;
        info!(job_id = job_id.0, "opening job detail");

        match self.fetch_bundle(job_id, generation).await {
            Ok(true) => {}
            Ok(false) => return Ok(()),
            Err(failure) => {
                self.events.error(failure.message.clone());
                return Err(failure.into());
            }
        }

        self.refresh_activity().await;
        Ok(())
    }

    pub async fn close(&self) {
        {
            let mut state = self.inner.lock().await;
            let generation = state.generation + 1;
            *state = DetailState {
                generation,
                ..DetailState::default()
            };
        }
        self.pager.detach().await;
    }

    /// Re-fetches the bundle of the open job.
    pub async fn refresh(&self) -> Result<(), DetailError> {
        let (job_id, generation) = {
            let mut state = self.inner.lock().await;
            let Some(job_id) = state.current else {
                return Err(DetailError::NotOpen);
            };
            state.loading = true;
            (job_id, state.generation)
        };

        match self.fetch_bundle(job_id, generation).await {
            Ok(_) => Ok(()),
            Err(failure) => {
                self.events.error(failure.message.clone());
                Err(failure.into())
            }
        }
    }

    /// Reset-reloads the activity feed of the open job.
    pub async fn refresh_activity(&self) -> LoadOutcome {
        let outcome = self.pager.load(LoadRequest::reset()).await;
        match &outcome {
            LoadOutcome::Failed(message) => self.events.error(message.clone()),
            LoadOutcome::Loaded { .. } => {
                let view = self.pager.snapshot().await;
                if let Some(job_id) = view.job_id {
                    self.events.emit(EngineEvent::ActivityReloaded {
                        job_id,
                        items: view.items.len(),
                    });
                }
            }
            LoadOutcome::Skipped | LoadOutcome::Stale => {}
        }
        outcome
    }

    pub async fn load_more_activity(&self) -> LoadOutcome {
        let outcome = self.pager.load_more().await;
        if let LoadOutcome::Failed(message) = &outcome {
            self.events.error(message.clone());
        }
        outcome
    }

    /// Returns whether the bundle was applied (false when it went stale).
    async fn fetch_bundle(&self, job_id: JobId, generation: u64) -> Result<bool, ApiFailure> {
        let result = self.api.get_job_details(job_id).await;

        let job = {
            let mut state = self.inner.lock().await;
            if state.generation != generation || state.current != Some(job_id) {
                debug!(job_id = job_id.0, "discarding stale job bundle");
                return Ok(false);
            }
            state.loading = false;
            match result {
                Ok(bundle) => {
                    let job = bundle.job.clone();
                    state.bundle = Some(bundle);
                    state.error = None;
                    job
                }
                Err(failure) => {
                    warn!(job_id = job_id.0, error = %failure, "job bundle fetch failed");
                    state.error = Some(failure.message.clone());
                    return Err(failure);
                }
            }
        };

        self.coordinator.track(job).await;
        self.events.emit(EngineEvent::BundleRefreshed { job_id });
        Ok(true)
    }

    pub async fn view(&self) -> DetailView {
        let (job_id, bundle, loading, error) = {
            let state = self.inner.lock().await;
            (
                state.current,
                state.bundle.clone(),
                state.loading,
                state.error.clone(),
            )
        };
        let job = match job_id {
            Some(job_id) => self
                .coordinator
                .current(job_id)
                .await
                .or_else(|| bundle.as_ref().map(|bundle| bundle.job.clone())),
            None => None,
        };
        let (notes, interviews) = bundle
            .map(|bundle| (bundle.notes, bundle.interviews))
            .unwrap_or_default();

        DetailView {
            job_id,
            job,
            notes,
            interviews,
            loading,
            error,
            activity: self.pager.snapshot().await,
        }
    }

    /// Post-success bookkeeping. A failing refresh leaves the mutation in place.
    async fn settle_success(&self, job_id: JobId, message: &str) {
        self.events.success(message);
        if !self.is_current(job_id).await {
            return;
        }
        if let Err(err) = self.refresh().await {
            debug!(job_id = job_id.0, error = %err, "refresh after mutation failed");
        }
        self.refresh_activity().await;
    }

    fn reject(&self, message: &str) -> DetailError {
        self.events.error(message);
        DetailError::Validation(message.to_string())
    }

    /// Request failures were already surfaced by the coordinator.
    fn report_mutation(&self, err: MutationError) -> DetailError {
        match &err {
            MutationError::Request(_) => {}
            other => self.events.error(other.to_string()),
        }
        err.into()
    }

    fn report_request(&self, failure: ApiFailure) -> DetailError {
        self.events.error(failure.message.clone());
        failure.into()
    }

    async fn patch_card(
        &self,
        patch: CardPatch,
        kind: MutationKind,
        success: &str,
    ) -> Result<Card, DetailError> {
        let job_id = self.require_current().await?;
        let card = self
            .coordinator
            .apply_patch(job_id, patch, kind)
            .await
            .map_err(|err| self.report_mutation(err))?;
        self.settle_success(job_id, success).await;
        Ok(card)
    }

    async fn current_card(&self, job_id: JobId) -> Result<Card, DetailError> {
        self.coordinator
            .current(job_id)
            .await
            .ok_or_else(|| self.report_mutation(MutationError::UnknownEntity(job_id)))
    }

    pub async fn change_status(&self, status: JobStatus) -> Result<Card, DetailError> {
        let job_id = self.require_current().await?;
        let card = self
            .coordinator
            .change_status(job_id, status)
            .await
            .map_err(|err| self.report_mutation(err))?;
        self.settle_success(job_id, "Status updated").await;
        Ok(card)
    }

    /// Executes a settled drag. When the dropped card is the open job, the
    /// bundle and activity are refreshed like any other status change.
    pub async fn commit_drop(
        &self,
        resolution: DropResolution,
    ) -> Result<Option<Card>, DetailError> {
        let card = drag::commit(resolution, &self.coordinator)
            .await
            .map_err(|err| self.report_mutation(err))?;
        if let Some(card) = &card {
            self.settle_success(card.id, "Status updated").await;
        }
        Ok(card)
    }

    pub async fn set_priority(&self, priority: Priority) -> Result<Card, DetailError> {
        self.patch_card(
            CardPatch::priority(priority),
            MutationKind::Priority,
            "Priority updated",
        )
        .await
    }

    /// Adds one tag. A tag already on the job is a no-op without a request.
    pub async fn add_tag(&self, raw: &str) -> Result<Card, DetailError> {
        let job_id = self.require_current().await?;
        let tag = normalize(raw);
        if tag.is_empty() {
            return Err(self.reject("Tag cannot be empty"));
        }
        let card = self.current_card(job_id).await?;
        if card.tags.contains(&tag) {
            debug!(job_id = job_id.0, %tag, "tag already present");
            return Ok(card);
        }
        let tags = dedupe_and_normalize(card.tags.iter().map(String::as_str).chain([tag.as_str()]));
        self.patch_card(CardPatch::tags(tags), MutationKind::Tags, "Tag added")
            .await
    }

    pub async fn remove_tag(&self, raw: &str) -> Result<Card, DetailError> {
        let job_id = self.require_current().await?;
        let tag = normalize(raw);
        let card = self.current_card(job_id).await?;
        if !card.tags.contains(&tag) {
            return Ok(card);
        }
        let tags: Vec<String> = card.tags.into_iter().filter(|t| *t != tag).collect();
        self.patch_card(CardPatch::tags(tags), MutationKind::Tags, "Tag removed")
            .await
    }

    pub async fn set_tags<I, S>(&self, raw: I) -> Result<Card, DetailError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tags = dedupe_and_normalize(raw);
        self.patch_card(CardPatch::tags(tags), MutationKind::Tags, "Tags updated")
            .await
    }

    /// Stamps "last action: now" and either schedules the next action or
    /// clears the one that was pending.
    pub async fn log_momentum(&self, action: MomentumAction) -> Result<Card, DetailError> {
        self.require_current().await?;
        if action.schedule_next && action.next_action_at.is_none() {
            return Err(self.reject("Pick a date for the next action"));
        }

        let mut patch = CardPatch {
            last_action_at: Some(Some(Utc::now())),
            needs_follow_up: Some(false),
            ..CardPatch::default()
        };
        if action.schedule_next {
            patch.next_action_at = Some(action.next_action_at);
            patch.next_action_title = Some(clean_title(action.next_action_title));
        } else {
            patch.next_action_at = Some(None);
            patch.next_action_title = Some(None);
        }
        self.patch_card(patch, MutationKind::Momentum, "Momentum logged")
            .await
    }

    pub async fn schedule_next_action(
        &self,
        title: Option<String>,
        at: Option<DateTime<Utc>>,
    ) -> Result<Card, DetailError> {
        self.require_current().await?;
        let Some(at) = at else {
            return Err(self.reject("Pick a date for the next action"));
        };
        let patch = CardPatch {
            next_action_at: Some(Some(at)),
            next_action_title: Some(clean_title(title)),
            ..CardPatch::default()
        };
        self.patch_card(patch, MutationKind::ScheduleNextAction, "Next action scheduled")
            .await
    }

    pub async fn add_note(&self, body: &str) -> Result<Note, DetailError> {
        let job_id = self.require_current().await?;
        let body = body.trim();
        if body.is_empty() {
            return Err(self.reject("Note cannot be empty"));
        }
        let note = self
            .api
            .add_note(
                job_id,
                &NewNote {
                    body: body.to_string(),
                },
            )
            .await
            .map_err(|failure| self.report_request(failure))?;
        self.settle_success(job_id, "Note added").await;
        Ok(note)
    }

    pub async fn delete_note(&self, note_id: NoteId) -> Result<(), DetailError> {
        let job_id = self.require_current().await?;
        self.api
            .delete_note(job_id, note_id)
            .await
            .map_err(|failure| self.report_request(failure))?;
        self.settle_success(job_id, "Note deleted").await;
        Ok(())
    }

    pub async fn create_interview(&self, fields: InterviewFields) -> Result<Interview, DetailError> {
        let job_id = self.require_current().await?;
        if fields.scheduled_at.is_none() {
            return Err(self.reject("Interview needs a scheduled time"));
        }
        let interview = self
            .api
            .create_interview(job_id, &fields)
            .await
            .map_err(|failure| self.report_request(failure))?;
        self.settle_success(job_id, "Interview added").await;
        Ok(interview)
    }

    pub async fn update_interview(
        &self,
        interview_id: InterviewId,
        patch: InterviewPatch,
    ) -> Result<Interview, DetailError> {
        let job_id = self.require_current().await?;
        let interview = self
            .api
            .patch_interview(job_id, interview_id, &patch)
            .await
            .map_err(|failure| self.report_request(failure))?;
        self.settle_success(job_id, "Interview updated").await;
        Ok(interview)
    }

    pub async fn delete_interview(&self, interview_id: InterviewId) -> Result<(), DetailError> {
        let job_id = self.require_current().await?;
        self.api
            .delete_interview(job_id, interview_id)
            .await
            .map_err(|failure| self.report_request(failure))?;
        self.settle_success(job_id, "Interview deleted").await;
        Ok(())
    }
}

fn clean_title(title: Option<String>) -> Option<String> {
    title
        .map(|title| title.trim().to_string())
        .filter(|title| !title.is_empty())
}

#[cfg(test)]
#[path = "tests/detail_tests.rs"]
mod tests;
