//! services/relay/src/sync/queue.rs
//!
//! The single-flight reconcile worker for one conversation.
//!
//! Snapshots are queued on a channel and handled strictly one at a time, in the
//! order they were queued: the diff is computed on the blocking pool, the plan
//! is handed to the renderer, and only after the renderer returns does the
//! snapshot become the new baseline. An apply that has started always runs to
//! completion; shutdown is only observed between jobs.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use transcript_core::{
    reconcile, AppliedPlan, PlanRenderer, PortError, Transcript, TranscriptError,
};
use uuid::Uuid;

/// How many snapshots may wait behind the one being applied.
const QUEUE_DEPTH: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("The reconcile worker for this conversation has stopped")]
    Closed,
    #[error("Snapshot rejected: {0}")]
    InvalidSnapshot(#[from] TranscriptError),
    #[error("Diff computation failed: {0}")]
    Diff(String),
    #[error("Renderer failed to apply the plan: {0}")]
    Render(#[from] PortError),
}

/// The snapshot the renderer has most recently finished applying.
#[derive(Debug, Clone, Default)]
pub struct Accepted {
    pub revision: u64,
    pub transcript: Transcript,
}

struct Job {
    snapshot: Transcript,
    reply: oneshot::Sender<Result<AppliedPlan, QueueError>>,
}

/// A queued snapshot whose plan has not been applied yet.
pub struct PendingPlan {
    reply: oneshot::Receiver<Result<AppliedPlan, QueueError>>,
}

impl PendingPlan {
    /// Waits until the worker has applied (or rejected) the snapshot.
    pub async fn wait(self) -> Result<AppliedPlan, QueueError> {
        self.reply.await.map_err(|_| QueueError::Closed)?
    }
}

/// Handle to the worker task of one conversation. Cloning shares the worker.
#[derive(Clone)]
pub struct ReconcileQueue {
    jobs: mpsc::Sender<Job>,
    accepted: watch::Receiver<Accepted>,
    cancellation_token: CancellationToken,
}

impl ReconcileQueue {
    /// Spawns the worker for `conversation_id`, starting from an empty transcript.
    pub fn spawn(
        conversation_id: Uuid,
        renderer: Arc<dyn PlanRenderer>,
        cancellation_token: CancellationToken,
    ) -> Self {
        let (jobs_tx, jobs_rx) = mpsc::channel(QUEUE_DEPTH);
        let (accepted_tx, accepted_rx) = watch::channel(Accepted::default());

        tokio::spawn(run_worker(
            conversation_id,
            renderer,
            jobs_rx,
            accepted_tx,
            cancellation_token.clone(),
        ));

        Self {
            jobs: jobs_tx,
            accepted: accepted_rx,
            cancellation_token,
        }
    }

    /// Validates and queues a snapshot behind any snapshot already waiting.
    pub async fn enqueue(&self, snapshot: Transcript) -> Result<PendingPlan, QueueError> {
        snapshot.validate()?;
        let (reply_tx, reply_rx) = oneshot::channel();
        self.jobs
            .send(Job {
                snapshot,
                reply: reply_tx,
            })
            .await
            .map_err(|_| QueueError::Closed)?;
        Ok(PendingPlan { reply: reply_rx })
    }

    /// Queues a snapshot and waits for its plan to be applied.
    pub async fn submit(&self, snapshot: Transcript) -> Result<AppliedPlan, QueueError> {
        self.enqueue(snapshot).await?.wait().await
    }

    /// The most recently applied snapshot.
    pub fn accepted(&self) -> Accepted {
        self.accepted.borrow().clone()
    }

    /// Stops the worker once the job in progress, if any, has finished.
    pub fn shutdown(&self) {
        self.cancellation_token.cancel();
    }
}

async fn run_worker(
    conversation_id: Uuid,
    renderer: Arc<dyn PlanRenderer>,
    mut jobs: mpsc::Receiver<Job>,
    accepted: watch::Sender<Accepted>,
    cancellation_token: CancellationToken,
) {
    info!(%conversation_id, "Reconcile worker started.");
    let mut current = Accepted::default();

    loop {
        let job = tokio::select! {
            biased;
            _ = cancellation_token.cancelled() => break,
            job = jobs.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        let result = process(conversation_id, &current, job.snapshot, renderer.as_ref()).await;
        match &result {
            Ok(applied) => {
                current = Accepted {
                    revision: applied.revision,
                    transcript: applied.transcript.clone(),
                };
                accepted.send_replace(current.clone());
            }
            Err(e) => error!(%conversation_id, "Reconciliation failed: {}", e),
        }

        // The submitter may have gone away; the plan is applied either way.
        let _ = job.reply.send(result);
    }

    info!(%conversation_id, "Reconcile worker stopped.");
}

async fn process(
    conversation_id: Uuid,
    current: &Accepted,
    snapshot: Transcript,
    renderer: &dyn PlanRenderer,
) -> Result<AppliedPlan, QueueError> {
    let old = current.transcript.clone();
    let (plan, transcript) = tokio::task::spawn_blocking(move || {
        let plan = reconcile(&old, &snapshot);
        (plan, snapshot)
    })
    .await
    .map_err(|e| QueueError::Diff(e.to_string()))?;

    if plan.is_empty() {
        debug!(%conversation_id, "Snapshot unchanged, nothing to render.");
        return Ok(AppliedPlan {
            revision: current.revision,
            plan,
            transcript,
        });
    }

    let applied = AppliedPlan {
        revision: current.revision + 1,
        plan,
        transcript,
    };
    debug!(
        %conversation_id,
        revision = applied.revision,
        rows = applied.transcript.row_count(),
        summary = ?applied.plan.summary(),
        "Applying plan."
    );
    renderer.apply_plan(conversation_id, &applied).await?;
    Ok(applied)
}
