use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use shared::{
    domain::{ActivityId, InterviewId, JobId, JobStatus, NoteId, Priority},
    protocol::{
        ActivityEvent, ActivityPage, ActivityQuery, Card, CardPatch, Interview, InterviewFields,
        InterviewPatch, JobDetailBundle, NewActivity, NewNote, Note,
    },
};
use tokio::sync::broadcast;

use crate::{
    error::ApiFailure,
    events::{EngineEvent, Toast, ToastKind},
    transport::{ApiResult, JobsApi},
};

pub fn ts(minutes: i64) -> DateTime<Utc> {
    let base: DateTime<Utc> = "2024-01-01T00:00:00Z".parse().expect("timestamp");
    base + Duration::minutes(minutes)
}

pub fn sample_card(id: i64, status: JobStatus) -> Card {
    Card {
        id: JobId(id),
        status,
        company_name: format!("Company {id}"),
        job_title: "Backend Engineer".to_string(),
        location: Some("Remote".to_string()),
        priority: Priority::Normal,
        tags: Vec::new(),
        last_action_at: None,
        next_action_at: None,
        next_action_title: None,
        needs_follow_up: false,
        updated_at: Some(ts(0)),
    }
}

pub fn event(id: i64) -> ActivityEvent {
    ActivityEvent {
        id: ActivityId(id),
        kind: "note".to_string(),
        message: format!("event {id}"),
        created_at: ts(id),
    }
}

/// Events `from` down to `to`, newest first.
pub fn events_desc(from: i64, to: i64) -> Vec<ActivityEvent> {
    (to..=from).rev().map(event).collect()
}

pub fn drain_toasts(rx: &mut broadcast::Receiver<EngineEvent>) -> Vec<Toast> {
    let mut toasts = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let EngineEvent::Toast(toast) = event {
            toasts.push(toast);
        }
    }
    toasts
}

pub fn error_messages(toasts: &[Toast]) -> Vec<String> {
    toasts
        .iter()
        .filter(|toast| toast.kind == ToastKind::Error)
        .map(|toast| toast.message.clone())
        .collect()
}

#[derive(Default)]
struct FakeState {
    jobs: HashMap<JobId, Card>,
    activity: HashMap<JobId, Vec<ActivityEvent>>,
    notes: HashMap<JobId, Vec<Note>>,
    interviews: HashMap<JobId, Vec<Interview>>,
    scripted_pages: VecDeque<ActivityPage>,
    failures: HashMap<&'static str, ApiFailure>,
    server_overrides: CardPatch,
    calls: Vec<&'static str>,
    patches: Vec<(JobId, CardPatch)>,
    activity_queries: Vec<(JobId, ActivityQuery)>,
    next_id: i64,
}

impl FakeState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        1000 + self.next_id
    }
}

/// In-memory backend. Every call yields once before answering so concurrent
/// callers interleave the way they would over a network.
#[derive(Default)]
pub struct FakeJobsApi {
    state: Mutex<FakeState>,
}

impl FakeJobsApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake api lock")
    }

    pub fn insert_job(&self, card: Card) {
        self.lock().jobs.insert(card.id, card);
    }

    pub fn job(&self, job_id: JobId) -> Option<Card> {
        self.lock().jobs.get(&job_id).cloned()
    }

    pub fn insert_note(&self, job_id: JobId, body: &str) -> Note {
        let mut state = self.lock();
        let note = Note {
            id: NoteId(state.next_id()),
            body: body.to_string(),
            created_at: ts(0),
        };
        state.notes.entry(job_id).or_default().insert(0, note.clone());
        note
    }

    pub fn notes(&self, job_id: JobId) -> Vec<Note> {
        self.lock().notes.get(&job_id).cloned().unwrap_or_default()
    }

    pub fn seed_activity(&self, job_id: JobId, count: i64) {
        let events = if count > 0 { events_desc(count, 1) } else { Vec::new() };
        self.lock().activity.insert(job_id, events);
    }

    /// Simulates an event written by someone else between page requests.
    pub fn push_activity(&self, job_id: JobId, message: &str) -> ActivityEvent {
        let mut state = self.lock();
        let feed = state.activity.entry(job_id).or_default();
        let id = feed.first().map(|event| event.id.0 + 1).unwrap_or(1);
        let event = ActivityEvent {
            id: ActivityId(id),
            kind: "note".to_string(),
            message: message.to_string(),
            created_at: ts(id),
        };
        feed.insert(0, event.clone());
        event
    }

    pub fn script_page(&self, items: Vec<ActivityEvent>, next_cursor: Option<i64>) {
        self.lock()
            .scripted_pages
            .push_back(ActivityPage { items, next_cursor });
    }

    pub fn fail(&self, op: &'static str, message: &str) {
        self.lock().failures.insert(op, ApiFailure::new(message));
    }

    pub fn fail_with_status(&self, op: &'static str, status: u16, message: &str) {
        self.lock()
            .failures
            .insert(op, ApiFailure::with_status(status, message));
    }

    pub fn recover(&self, op: &'static str) {
        self.lock().failures.remove(op);
    }

    /// Values the server imposes on every confirmed patch.
    pub fn override_response(&self, patch: CardPatch) {
        self.lock().server_overrides = patch;
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, op: &str) -> usize {
        self.lock().calls.iter().filter(|call| **call == op).count()
    }

    pub fn patches(&self) -> Vec<(JobId, CardPatch)> {
        self.lock().patches.clone()
    }

    pub fn activity_queries(&self) -> Vec<(JobId, ActivityQuery)> {
        self.lock().activity_queries.clone()
    }

    async fn enter(&self, op: &'static str) -> ApiResult<()> {
        tokio::task::yield_now().await;
        let mut state = self.lock();
        state.calls.push(op);
        match state.failures.get(op) {
            Some(failure) => Err(failure.clone()),
            None => Ok(()),
        }
    }
}

fn not_found(what: &str) -> ApiFailure {
    ApiFailure::with_status(404, format!("{what} not found"))
}

#[async_trait]
impl JobsApi for FakeJobsApi {
    async fn list_jobs(&self) -> ApiResult<Vec<Card>> {
        self.enter("list_jobs").await?;
        let mut cards: Vec<Card> = self.lock().jobs.values().cloned().collect();
        cards.sort_by_key(|card| card.id);
        Ok(cards)
    }

    async fn patch_job(&self, job_id: JobId, patch: &CardPatch) -> ApiResult<CardPatch> {
        self.enter("patch_job").await?;
        let mut state = self.lock();
        state.patches.push((job_id, patch.clone()));
        let overrides = state.server_overrides.clone();
        let card = state.jobs.get_mut(&job_id).ok_or_else(|| not_found("job"))?;
        patch.apply_to(card);
        overrides.apply_to(card);
        Ok(CardPatch::from_card(card))
    }

    async fn list_job_activity(
        &self,
        job_id: JobId,
        query: ActivityQuery,
    ) -> ApiResult<ActivityPage> {
        self.enter("list_job_activity").await?;
        let mut state = self.lock();
        state.activity_queries.push((job_id, query));
        if let Some(page) = state.scripted_pages.pop_front() {
            return Ok(page);
        }

        let older: Vec<ActivityEvent> = state
            .activity
            .get(&job_id)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|event| query.cursor_id.map_or(true, |cursor| event.id.0 < cursor))
            .collect();
        let limit = query.limit as usize;
        let has_more = older.len() > limit;
        let items: Vec<ActivityEvent> = older.into_iter().take(limit).collect();
        let next_cursor = if has_more {
            items.last().map(|event| event.id.0)
        } else {
            None
        };
        Ok(ActivityPage { items, next_cursor })
    }

    async fn create_job_activity(
        &self,
        job_id: JobId,
        activity: &NewActivity,
    ) -> ApiResult<ActivityEvent> {
        self.enter("create_job_activity").await?;
        let mut event = self.push_activity(job_id, &activity.message);
        event.kind = activity.kind.clone();
        if let Some(stored) = self
            .lock()
            .activity
            .get_mut(&job_id)
            .and_then(|feed| feed.first_mut())
        {
            stored.kind = activity.kind.clone();
        }
        Ok(event)
    }

    async fn add_note(&self, job_id: JobId, note: &NewNote) -> ApiResult<Note> {
        self.enter("add_note").await?;
        Ok(self.insert_note(job_id, &note.body))
    }

    async fn delete_note(&self, job_id: JobId, note_id: NoteId) -> ApiResult<()> {
        self.enter("delete_note").await?;
        let mut state = self.lock();
        let notes = state.notes.entry(job_id).or_default();
        let before = notes.len();
        notes.retain(|note| note.id != note_id);
        if notes.len() == before {
            return Err(not_found("note"));
        }
        Ok(())
    }

    async fn create_interview(
        &self,
        job_id: JobId,
        fields: &InterviewFields,
    ) -> ApiResult<Interview> {
        self.enter("create_interview").await?;
        let mut state = self.lock();
        let interview = Interview {
            id: InterviewId(state.next_id()),
            scheduled_at: fields.scheduled_at,
            stage: fields.stage.clone(),
            kind: fields.kind.clone(),
            location: fields.location.clone(),
            interviewer: fields.interviewer.clone(),
            status: fields.status.unwrap_or_default(),
            notes: fields.notes.clone(),
        };
        state
            .interviews
            .entry(job_id)
            .or_default()
            .push(interview.clone());
        Ok(interview)
    }

    async fn patch_interview(
        &self,
        job_id: JobId,
        interview_id: InterviewId,
        patch: &InterviewPatch,
    ) -> ApiResult<Interview> {
        self.enter("patch_interview").await?;
        let mut state = self.lock();
        let interview = state
            .interviews
            .entry(job_id)
            .or_default()
            .iter_mut()
            .find(|interview| interview.id == interview_id)
            .ok_or_else(|| not_found("interview"))?;
        if let Some(at) = patch.scheduled_at {
            interview.scheduled_at = Some(at);
        }
        if let Some(status) = patch.status {
            interview.status = status;
        }
        if let Some(notes) = &patch.notes {
            interview.notes = Some(notes.clone());
        }
        if let Some(stage) = &patch.stage {
            interview.stage = Some(stage.clone());
        }
        Ok(interview.clone())
    }

    async fn delete_interview(&self, job_id: JobId, interview_id: InterviewId) -> ApiResult<()> {
        self.enter("delete_interview").await?;
        let mut state = self.lock();
        let interviews = state.interviews.entry(job_id).or_default();
        let before = interviews.len();
        interviews.retain(|interview| interview.id != interview_id);
        if interviews.len() == before {
            return Err(not_found("interview"));
        }
        Ok(())
    }

    async fn get_job_details(&self, job_id: JobId) -> ApiResult<JobDetailBundle> {
        self.enter("get_job_details").await?;
        let state = self.lock();
        let job = state.jobs.get(&job_id).cloned().ok_or_else(|| not_found("job"))?;
        Ok(JobDetailBundle {
            job,
            notes: state.notes.get(&job_id).cloned().unwrap_or_default(),
            interviews: state.interviews.get(&job_id).cloned().unwrap_or_default(),
            activity: None,
        })
    }
}
