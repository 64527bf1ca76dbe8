//! Client-side engine for the job board: optimistic card mutations with
//! rollback, drag-to-column transitions, the activity pager and the job
//! detail bundle controller.

pub mod activity_pager;
pub mod board;
pub mod config;
pub mod detail;
pub mod drag;
pub mod error;
pub mod events;
pub mod mutation;
pub mod tags;
pub mod transport;

pub use activity_pager::{ActivityPager, ActivityView, LoadOutcome, LoadRequest, ACTIVITY_PAGE_SIZE};
pub use board::{load_board, BoardCache, BoardWindows, ColumnWindow, ScrollMetrics, COLUMN_PAGE_SIZE};
pub use detail::{DetailBundleController, DetailView, MomentumAction};
pub use drag::{CancelReason, DragState, DragTransitionResolver, DropResolution, Point};
pub use error::{ApiFailure, DetailError, MutationError};
pub use events::{EngineEvent, EventSink, Toast, ToastKind};
pub use mutation::{CardMutationCoordinator, CardObserver, MutationKind, PendingMutation};
pub use transport::{HttpJobsApi, JobsApi};

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
