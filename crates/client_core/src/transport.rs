use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::{InterviewId, JobId, NoteId},
    protocol::{
        ActivityEvent, ActivityPage, ActivityQuery, Card, CardPatch, Interview, InterviewFields,
        InterviewPatch, JobDetailBundle, NewActivity, NewNote, Note,
    },
};
use tracing::debug;
use url::Url;

use crate::error::ApiFailure;

pub type ApiResult<T> = std::result::Result<T, ApiFailure>;

/// Backend calls the engine depends on. Every call either resolves to the
/// decoded payload or rejects with a message and an optional status.
#[async_trait]
pub trait JobsApi: Send + Sync {
    async fn list_jobs(&self) -> ApiResult<Vec<Card>>;
    /// The response holds the authoritative values of at least the changed
    /// fields; a full record is accepted too.
    async fn patch_job(&self, job_id: JobId, patch: &CardPatch) -> ApiResult<CardPatch>;
    async fn list_job_activity(&self, job_id: JobId, query: ActivityQuery)
        -> ApiResult<ActivityPage>;
    async fn create_job_activity(
        &self,
        job_id: JobId,
        activity: &NewActivity,
    ) -> ApiResult<ActivityEvent>;
    async fn add_note(&self, job_id: JobId, note: &NewNote) -> ApiResult<Note>;
    async fn delete_note(&self, job_id: JobId, note_id: NoteId) -> ApiResult<()>;
    async fn create_interview(
        &self,
        job_id: JobId,
        fields: &InterviewFields,
    ) -> ApiResult<Interview>;
    async fn patch_interview(
        &self,
        job_id: JobId,
        interview_id: InterviewId,
        patch: &InterviewPatch,
    ) -> ApiResult<Interview>;
    async fn delete_interview(&self, job_id: JobId, interview_id: InterviewId) -> ApiResult<()>;
    async fn get_job_details(&self, job_id: JobId) -> ApiResult<JobDetailBundle>;
}

pub struct HttpJobsApi {
    http: Client,
    base: Url,
}

impl HttpJobsApi {
    pub fn new(server_url: &str) -> Result<Self> {
        Self::build(server_url, Client::new())
    }

    pub fn with_timeout(server_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;
        Self::build(server_url, http)
    }

    fn build(server_url: &str, http: Client) -> Result<Self> {
        let mut base = Url::parse(server_url.trim())
            .with_context(|| format!("invalid server url: {server_url}"))?;
        if base.cannot_be_a_base() {
            return Err(anyhow!("server url cannot be used as a base: {server_url}"));
        }
        // Relative joins replace the last segment unless the path ends in '/'.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { http, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> ApiResult<Url> {
        self.base
            .join(path)
            .map_err(|err| ApiFailure::new(format!("invalid endpoint {path}: {err}")))
    }
}

async fn ensure_success(response: Response) -> ApiResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    debug!(status = status.as_u16(), "jobs api rejected request");
    Err(ApiFailure::from_error_body(status.as_u16(), &body))
}

async fn decode<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
    let response = ensure_success(response).await?;
    Ok(response.json::<T>().await?)
}

#[async_trait]
impl JobsApi for HttpJobsApi {
    async fn list_jobs(&self) -> ApiResult<Vec<Card>> {
        let response = self.http.get(self.endpoint("jobs")?).send().await?;
        decode(response).await
    }

    async fn patch_job(&self, job_id: JobId, patch: &CardPatch) -> ApiResult<CardPatch> {
        let response = self
            .http
            .patch(self.endpoint(&format!("jobs/{job_id}"))?)
            .json(patch)
            .send()
            .await?;
        decode(response).await
    }

    async fn list_job_activity(
        &self,
        job_id: JobId,
        query: ActivityQuery,
    ) -> ApiResult<ActivityPage> {
        let response = self
            .http
            .get(self.endpoint(&format!("jobs/{job_id}/activity"))?)
            .query(&query)
            .send()
            .await?;
        decode(response).await
    }

    async fn create_job_activity(
        &self,
        job_id: JobId,
        activity: &NewActivity,
    ) -> ApiResult<ActivityEvent> {
        let response = self
            .http
            .post(self.endpoint(&format!("jobs/{job_id}/activity"))?)
            .json(activity)
            .send()
            .await?;
        decode(response).await
    }

    async fn add_note(&self, job_id: JobId, note: &NewNote) -> ApiResult<Note> {
        let response = self
            .http
            .post(self.endpoint(&format!("jobs/{job_id}/notes"))?)
            .json(note)
            .send()
            .await?;
        decode(response).await
    }

    async fn delete_note(&self, job_id: JobId, note_id: NoteId) -> ApiResult<()> {
        let response = self
            .http
            .delete(self.endpoint(&format!("jobs/{job_id}/notes/{note_id}"))?)
            .send()
            .await?;
        ensure_success(response).await.map(|_| ())
    }

    async fn create_interview(
        &self,
        job_id: JobId,
        fields: &InterviewFields,
    ) -> ApiResult<Interview> {
        let response = self
            .http
            .post(self.endpoint(&format!("jobs/{job_id}/interviews"))?)
            .json(fields)
            .send()
            .await?;
        decode(response).await
    }

    async fn patch_interview(
        &self,
        job_id: JobId,
        interview_id: InterviewId,
        patch: &InterviewPatch,
    ) -> ApiResult<Interview> {
        let response = self
            .http
            .patch(self.endpoint(&format!("jobs/{job_id}/interviews/{interview_id}"))?)
            .json(patch)
            .send()
            .await?;
        decode(response).await
    }

    async fn delete_interview(&self, job_id: JobId, interview_id: InterviewId) -> ApiResult<()> {
        let response = self
            .http
            .delete(self.endpoint(&format!("jobs/{job_id}/interviews/{interview_id}"))?)
            .send()
            .await?;
        ensure_success(response).await.map(|_| ())
    }

    async fn get_job_details(&self, job_id: JobId) -> ApiResult<JobDetailBundle> {
        let response = self
            .http
            .get(self.endpoint(&format!("jobs/{job_id}/details"))?)
            .send()
            .await?;
        decode(response).await
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
