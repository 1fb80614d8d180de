//! Seek bookkeeping.
//!
//! A [`SeekJob`] pairs a target with the owner's reply channel. Recovery
//! seeks issued by the coordinator itself carry no reply channel. A job that
//! is dropped unresolved rejects its owner with [`SeekError::Aborted`].

use crate::error::SeekError;
use bridge_traits::media::SeekTarget;
use std::time::Duration;
use tokio::sync::oneshot;

pub(crate) type SeekResponder = oneshot::Sender<Result<(), SeekError>>;

#[derive(Debug)]
pub(crate) struct SeekJob {
    target: SeekTarget,
    responder: Option<SeekResponder>,
}

impl SeekJob {
    pub fn new(target: SeekTarget, responder: SeekResponder) -> Self {
        Self {
            target,
            responder: Some(responder),
        }
    }

    /// A seek with nobody waiting on it.
    pub fn internal(target: SeekTarget) -> Self {
        Self {
            target,
            responder: None,
        }
    }

    pub fn target(&self) -> SeekTarget {
        self.target
    }

    pub fn time(&self) -> Duration {
        self.target.time
    }

    /// Whether an owner is still waiting on this job.
    pub fn exists(&self) -> bool {
        self.responder.is_some()
    }

    /// Moves the owner's reply channel into a new job, leaving this one
    /// internal.
    pub fn take(&mut self) -> SeekJob {
        SeekJob {
            target: self.target,
            responder: self.responder.take(),
        }
    }

    pub fn resolve(&mut self) {
        if let Some(responder) = self.responder.take() {
            let _ = responder.send(Ok(()));
        }
    }

    pub fn reject(&mut self, error: SeekError) {
        if let Some(responder) = self.responder.take() {
            let _ = responder.send(Err(error));
        }
    }
}

impl Drop for SeekJob {
    fn drop(&mut self) {
        self.reject(SeekError::Aborted);
    }
}

/// A seek requested before the engine finished initializing. Only the most
/// recent one is kept.
#[derive(Debug, Default)]
pub(crate) struct PendingSeek {
    job: Option<SeekJob>,
}

impl PendingSeek {
    /// Stores `job`, rejecting any previous one as superseded.
    ///
    /// Returns `true` when there was no previous job, i.e. when the caller
    /// still has to schedule the pending seek.
    pub fn replace(&mut self, job: SeekJob) -> bool {
        match self.job.replace(job) {
            Some(mut previous) => {
                previous.reject(SeekError::Superseded);
                false
            }
            None => true,
        }
    }

    pub fn take(&mut self) -> Option<SeekJob> {
        self.job.take()
    }

    pub fn discard(&mut self, error: SeekError) {
        if let Some(mut job) = self.job.take() {
            job.reject(error);
        }
    }

    pub fn exists(&self) -> bool {
        self.job.is_some()
    }
}
