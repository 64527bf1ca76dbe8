//! Pointer-drag gestures over board columns, as an explicit state machine.
//!
//! `Idle -> Dragging -> Settled`. Only a release over a different column after
//! the activation distance produces a status change; everything else settles
//! as a no-op or a cancellation and leaves the card untouched. Intra-column
//! order is never persisted.

use shared::{
    domain::{JobId, JobStatus},
    protocol::Card,
};
use tracing::debug;

use crate::{error::MutationError, mutation::CardMutationCoordinator};

pub const DEFAULT_ACTIVATION_DISTANCE: f32 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    fn distance_to(self, other: Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DragSession {
    pub card: JobId,
    pub source: JobStatus,
    pub over: Option<JobStatus>,
    pub origin: Point,
    pub travelled: f32,
    pub activated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    Escape,
    OutsideDropTarget,
    BelowThreshold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropResolution {
    Commit {
        card: JobId,
        from: JobStatus,
        to: JobStatus,
    },
    NoOp {
        card: JobId,
    },
    Cancelled(CancelReason),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DragState {
    Idle,
    Dragging(DragSession),
    Settled(DropResolution),
}

#[derive(Debug, Clone)]
pub struct DragTransitionResolver {
    state: DragState,
    activation_distance: f32,
}

impl Default for DragTransitionResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl DragTransitionResolver {
    pub fn new() -> Self {
        Self::with_activation_distance(DEFAULT_ACTIVATION_DISTANCE)
    }

    pub fn with_activation_distance(activation_distance: f32) -> Self {
        Self {
            state: DragState::Idle,
            activation_distance: activation_distance.max(0.0),
        }
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    /// True once the pointer has travelled far enough to count as a drag.
    pub fn is_dragging(&self) -> bool {
        matches!(&self.state, DragState::Dragging(session) if session.activated)
    }

    /// Column to highlight as the current drop target.
    pub fn hovered_column(&self) -> Option<JobStatus> {
        match &self.state {
            DragState::Dragging(session) if session.activated => session.over,
            _ => None,
        }
    }

    /// Starts tracking a gesture. Ignored while another gesture is live.
    pub fn pointer_down(&mut self, card: JobId, source: JobStatus, at: Point) -> bool {
        if matches!(self.state, DragState::Dragging(_)) {
            return false;
        }
        self.state = DragState::Dragging(DragSession {
            card,
            source,
            over: Some(source),
            origin: at,
            travelled: 0.0,
            activated: false,
        });
        true
    }

    pub fn pointer_move(&mut self, at: Point, over: Option<JobStatus>) {
        let DragState::Dragging(session) = &mut self.state else {
            return;
        };
        session.travelled = session.travelled.max(session.origin.distance_to(at));
        session.over = over;
        if !session.activated && session.travelled >= self.activation_distance {
            session.activated = true;
            debug!(job_id = session.card.0, source = %session.source, "drag activated");
        }
    }

    /// Pointer released; `over` is the droppable column under the pointer.
    pub fn release(&mut self, over: Option<JobStatus>) -> Option<DropResolution> {
        let DragState::Dragging(session) = &self.state else {
            return None;
        };
        let resolution = if !session.activated {
            DropResolution::Cancelled(CancelReason::BelowThreshold)
        } else {
            match over {
                None => DropResolution::Cancelled(CancelReason::OutsideDropTarget),
                Some(to) if to == session.source => DropResolution::NoOp { card: session.card },
                Some(to) => DropResolution::Commit {
                    card: session.card,
                    from: session.source,
                    to,
                },
            }
        };
        self.state = DragState::Settled(resolution);
        Some(resolution)
    }

    /// Escape or any other abort of a live gesture.
    pub fn cancel(&mut self) -> Option<DropResolution> {
        if !matches!(self.state, DragState::Dragging(_)) {
            return None;
        }
        let resolution = DropResolution::Cancelled(CancelReason::Escape);
        self.state = DragState::Settled(resolution);
        Some(resolution)
    }

    pub fn reset(&mut self) {
        self.state = DragState::Idle;
    }
}

/// Executes a drop. Only `Commit` touches state, through the coordinator.
/// With a detail view on screen, go through
/// [`DetailBundleController::commit_drop`](crate::detail::DetailBundleController::commit_drop)
/// so the open job refreshes.
pub async fn commit(
    resolution: DropResolution,
    coordinator: &CardMutationCoordinator,
) -> Result<Option<Card>, MutationError> {
    match resolution {
        DropResolution::Commit { card, from, to } => {
            debug!(job_id = card.0, %from, %to, "committing column change");
            coordinator.change_status(card, to).await.map(Some)
        }
        DropResolution::NoOp { .. } | DropResolution::Cancelled(_) => Ok(None),
    }
}

#[cfg(test)]
#[path = "tests/drag_tests.rs"]
mod tests;
