//! Background propagation with cooperative cancellation.
use super::{PropagationEngine, PropagationOutcome};
use crate::error::{Result, SegmentationError};
use crate::types::Chain;
use crate::volume::ScalarVolume;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Handle to a propagation running on its own thread.
///
/// Dropping the handle without joining raises the cancellation flag, so the
/// worker stops at its next step boundary.
pub struct PropagationHandle {
    cancel: Arc<AtomicBool>,
    thread: Option<JoinHandle<Result<PropagationOutcome>>>,
}

impl PropagationHandle {
    /// Ask the worker to stop before its next step.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the run to end and return its outcome.
    pub fn join(mut self) -> Result<PropagationOutcome> {
        let thread = self
            .thread
            .take()
            .ok_or_else(|| SegmentationError::Worker("worker already joined".into()))?;
        thread
            .join()
            .map_err(|_| SegmentationError::Worker("propagation worker panicked".into()))?
    }
}

impl Drop for PropagationHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.cancel();
        }
    }
}

/// Run `engine.propagate` on a dedicated thread.
pub fn spawn_propagation<V>(
    engine: PropagationEngine,
    volume: Arc<V>,
    seed: Chain,
    start_z: i64,
    target_z: i64,
) -> Result<PropagationHandle>
where
    V: ScalarVolume + ?Sized + 'static,
{
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    let thread = thread::Builder::new()
        .name("propagation".into())
        .spawn(move || engine.propagate(volume.as_ref(), &seed, start_z, target_z, &flag))?;
    Ok(PropagationHandle {
        cancel,
        thread: Some(thread),
    })
}
