pub mod feed;
pub mod queue;

pub use feed::{FeedError, FeedState, TranscriptFeed};
pub use queue::{Accepted, PendingPlan, QueueError, ReconcileQueue};
