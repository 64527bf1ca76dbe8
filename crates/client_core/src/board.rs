use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use shared::{
    domain::{JobId, JobStatus},
    protocol::{Card, CardPatch},
};
use tokio::sync::RwLock;
use tracing::info;

use crate::{
    error::ApiFailure,
    mutation::{CardMutationCoordinator, CardObserver},
    tags::dedupe_and_normalize,
    transport::JobsApi,
};

pub const COLUMN_PAGE_SIZE: usize = 25;
pub const NEAR_BOTTOM_PX: f32 = 120.0;

/// Board-level card summaries. Written only by the bulk load and by the
/// coordinator's observer path.
#[derive(Default)]
pub struct BoardCache {
    cards: RwLock<HashMap<JobId, Card>>,
}

impl BoardCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Replaces every card. Tags are normalized the same way the coordinator
    /// stores them, so rollbacks restore the board exactly.
    pub async fn seed(&self, cards: impl IntoIterator<Item = Card>) {
        let mut guard = self.cards.write().await;
        guard.clear();
        guard.extend(cards.into_iter().map(|mut card| {
            card.tags = dedupe_and_normalize(&card.tags);
            (card.id, card)
        }));
    }

    pub async fn get(&self, job_id: JobId) -> Option<Card> {
        self.cards.read().await.get(&job_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.cards.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cards.read().await.is_empty()
    }

    /// Cards in `status`, newest job first. Position depends on nothing else.
    pub async fn column(&self, status: JobStatus) -> Vec<Card> {
        let mut cards: Vec<Card> = self
            .cards
            .read()
            .await
            .values()
            .filter(|card| card.status == status)
            .cloned()
            .collect();
        cards.sort_by(|a, b| b.id.cmp(&a.id));
        cards
    }

    pub async fn columns(&self) -> Vec<(JobStatus, Vec<Card>)> {
        let mut columns = Vec::with_capacity(JobStatus::ALL.len());
        for status in JobStatus::ALL {
            columns.push((status, self.column(status).await));
        }
        columns
    }
}

#[async_trait]
impl CardObserver for BoardCache {
    async fn card_patched(&self, job_id: JobId, patch: &CardPatch) {
        if let Some(card) = self.cards.write().await.get_mut(&job_id) {
            patch.apply_to(card);
        }
    }
}

/// Fetches every job once, seeds the board and makes the cards known to the
/// coordinator so they can be patched from the board.
pub async fn load_board(
    api: &dyn JobsApi,
    cache: &BoardCache,
    coordinator: &CardMutationCoordinator,
) -> Result<usize, ApiFailure> {
    let cards = api.list_jobs().await?;
    let count = cards.len();
    coordinator.track_all(cards.iter().cloned()).await;
    cache.seed(cards).await;
    info!(count, "board loaded");
    Ok(count)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollMetrics {
    pub offset: f32,
    pub viewport: f32,
    pub content: f32,
}

impl ScrollMetrics {
    pub fn near_bottom(&self) -> bool {
        self.content - (self.offset + self.viewport) <= NEAR_BOTTOM_PX
    }
}

/// Client-side slice of one column; grows a page at a time as the user
/// scrolls. Never triggers a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnWindow {
    visible: usize,
}

impl Default for ColumnWindow {
    fn default() -> Self {
        Self {
            visible: COLUMN_PAGE_SIZE,
        }
    }
}

impl ColumnWindow {
    pub fn visible(&self) -> usize {
        self.visible
    }

    /// Returns true when the window grew.
    pub fn on_scroll(&mut self, metrics: ScrollMetrics, total: usize) -> bool {
        if !metrics.near_bottom() || self.visible >= total {
            return false;
        }
        self.visible = (self.visible + COLUMN_PAGE_SIZE).min(total);
        true
    }

    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        &items[..self.visible.min(items.len())]
    }

    pub fn reset(&mut self) {
        self.visible = COLUMN_PAGE_SIZE;
    }
}

#[derive(Debug, Clone, Default)]
pub struct BoardWindows {
    windows: HashMap<JobStatus, ColumnWindow>,
}

impl BoardWindows {
    pub fn window(&self, status: JobStatus) -> ColumnWindow {
        self.windows.get(&status).copied().unwrap_or_default()
    }

    pub fn on_scroll(&mut self, status: JobStatus, metrics: ScrollMetrics, total: usize) -> bool {
        self.windows
            .entry(status)
            .or_default()
            .on_scroll(metrics, total)
    }

    pub async fn visible_column(&self, cache: &BoardCache, status: JobStatus) -> Vec<Card> {
        let column = cache.column(status).await;
        self.window(status).slice(&column).to_vec()
    }
}

#[cfg(test)]
#[path = "tests/board_tests.rs"]
mod tests;
