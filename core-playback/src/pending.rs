//! Commands received before the engine was ready.
//!
//! Value-carrying commands are stored on the coordinator as they arrive; the
//! queued task only re-applies the latest stored value, so a burst of volume
//! changes before init still lands on the engine as the final volume.

use crate::error::DrmError;
use bridge_traits::media::CdmProxy;
use std::collections::VecDeque;
use tokio::sync::oneshot;

pub(crate) type DrmResponder = oneshot::Sender<Result<(), DrmError>>;

#[derive(Debug)]
pub(crate) enum PendingTask {
    ApplyPlaybackRate,
    ApplyVolume,
    ApplyLooping,
    ApplyPreservesPitch,
    ApplyPlayState,
    Seek,
    BindDrm {
        proxy: CdmProxy,
        reply: DrmResponder,
    },
}

impl PendingTask {
    pub fn name(&self) -> &'static str {
        match self {
            PendingTask::ApplyPlaybackRate => "playback_rate",
            PendingTask::ApplyVolume => "volume",
            PendingTask::ApplyLooping => "looping",
            PendingTask::ApplyPreservesPitch => "preserves_pitch",
            PendingTask::ApplyPlayState => "play_state",
            PendingTask::Seek => "seek",
            PendingTask::BindDrm { .. } => "bind_drm",
        }
    }

    /// Apply tasks carry no value of their own, so one queued copy covers
    /// any number of repeats.
    fn is_stateless(&self) -> bool {
        !matches!(self, PendingTask::BindDrm { .. })
    }

    /// Drops the task, failing any reply it carries.
    pub fn abort(self) {
        if let PendingTask::BindDrm { reply, .. } = self {
            let _ = reply.send(Err(DrmError::Aborted));
        }
    }
}

/// FIFO of [`PendingTask`]s, drained once when the engine starts running.
#[derive(Debug, Default)]
pub(crate) struct PendingTaskQueue {
    tasks: VecDeque<PendingTask>,
}

impl PendingTaskQueue {
    /// Queues `task` unless an identical stateless task is already waiting.
    /// Returns whether the task was queued.
    pub fn push(&mut self, task: PendingTask) -> bool {
        if task.is_stateless() && self.tasks.iter().any(|queued| same_kind(queued, &task)) {
            return false;
        }
        self.tasks.push_back(task);
        true
    }

    /// Removes every queued task, oldest first.
    pub fn take_all(&mut self) -> Vec<PendingTask> {
        self.tasks.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

fn same_kind(a: &PendingTask, b: &PendingTask) -> bool {
    std::mem::discriminant(a) == std::mem::discriminant(b)
}
