//! Outstanding asynchronous requests.
//!
//! Every reader or engine call the coordinator makes runs as a spawned task
//! that posts its outcome back to the coordinator mailbox, tagged with a
//! [`RequestId`]. The coordinator keeps a [`Request`] per outstanding call;
//! dropping it aborts the task, and a completion whose id no longer matches
//! the tracked request is discarded.

use bridge_traits::media::TrackType;
use std::future::Future;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::AbortHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct RequestId(u64);

/// Handle to a spawned request. Aborts the request when dropped.
#[derive(Debug)]
pub(crate) struct Request {
    id: RequestId,
    handle: AbortHandle,
}

impl Request {
    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn is(&self, id: RequestId) -> bool {
        self.id == id
    }
}

impl Drop for Request {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Spawns requests whose completions are delivered to the mailbox.
#[derive(Debug)]
pub(crate) struct RequestSpawner<M> {
    next_id: u64,
    mailbox: UnboundedSender<M>,
}

impl<M: Send + 'static> RequestSpawner<M> {
    pub fn new(mailbox: UnboundedSender<M>) -> Self {
        Self {
            next_id: 0,
            mailbox,
        }
    }

    pub fn mailbox(&self) -> UnboundedSender<M> {
        self.mailbox.clone()
    }

    /// Spawns `future` and returns a handle that disconnects it on drop.
    pub fn spawn<F, T, C>(&mut self, future: F, complete: C) -> Request
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
        C: FnOnce(RequestId, T) -> M + Send + 'static,
    {
        let (id, handle) = self.dispatch(future, complete);
        Request { id, handle }
    }

    /// Spawns `future` without tracking it; it runs to completion.
    pub fn spawn_detached<F, T, C>(&mut self, future: F, complete: C)
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
        C: FnOnce(RequestId, T) -> M + Send + 'static,
    {
        self.dispatch(future, complete);
    }

    fn dispatch<F, T, C>(&mut self, future: F, complete: C) -> (RequestId, AbortHandle)
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
        C: FnOnce(RequestId, T) -> M + Send + 'static,
    {
        self.next_id += 1;
        let id = RequestId(self.next_id);
        let mailbox = self.mailbox.clone();
        let task = tokio::spawn(async move {
            let output = future.await;
            // The coordinator may already be gone.
            let _ = mailbox.send(complete(id, output));
        });
        (id, task.abort_handle())
    }
}

// ============================================================================
// Per-track Requests
// ============================================================================

#[derive(Debug, Default)]
struct TrackSlots {
    data: Option<Request>,
    wait: Option<Request>,
}

/// Data and wait-for-data requests per track. At most one of each is
/// outstanding for a track at any time.
#[derive(Debug, Default)]
pub(crate) struct TrackRequests {
    audio: TrackSlots,
    video: TrackSlots,
}

impl TrackRequests {
    fn slots(&self, track: TrackType) -> &TrackSlots {
        match track {
            TrackType::Audio => &self.audio,
            TrackType::Video => &self.video,
        }
    }

    fn slots_mut(&mut self, track: TrackType) -> &mut TrackSlots {
        match track {
            TrackType::Audio => &mut self.audio,
            TrackType::Video => &mut self.video,
        }
    }

    pub fn is_requesting(&self, track: TrackType) -> bool {
        self.slots(track).data.is_some()
    }

    pub fn is_waiting(&self, track: TrackType) -> bool {
        self.slots(track).wait.is_some()
    }

    /// Whether any request is outstanding for `track`.
    pub fn is_tracking(&self, track: TrackType) -> bool {
        self.is_requesting(track) || self.is_waiting(track)
    }

    pub fn set_data(&mut self, track: TrackType, request: Request) {
        self.slots_mut(track).data = Some(request);
    }

    pub fn set_wait(&mut self, track: TrackType, request: Request) {
        self.slots_mut(track).wait = Some(request);
    }

    /// Clears the data request if it is `id`. Returns `false` for stale ids.
    pub fn complete_data(&mut self, track: TrackType, id: RequestId) -> bool {
        complete(&mut self.slots_mut(track).data, id)
    }

    /// Clears the wait request if it is `id`. Returns `false` for stale ids.
    pub fn complete_wait(&mut self, track: TrackType, id: RequestId) -> bool {
        complete(&mut self.slots_mut(track).wait, id)
    }

    pub fn disconnect(&mut self, track: TrackType) {
        let slots = self.slots_mut(track);
        slots.data = None;
        slots.wait = None;
    }

    pub fn disconnect_all(&mut self) {
        for track in TrackType::ALL {
            self.disconnect(track);
        }
    }
}

fn complete(slot: &mut Option<Request>, id: RequestId) -> bool {
    if slot.as_ref().is_some_and(|request| request.is(id)) {
        *slot = None;
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::{mpsc, oneshot};

    #[derive(Debug)]
    struct Done {
        id: RequestId,
        value: u32,
    }

    #[tokio::test]
    async fn test_completion_is_delivered_with_id() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut spawner = RequestSpawner::new(tx);

        let request = spawner.spawn(async { 7u32 }, |id, value| Done { id, value });
        let done = rx.recv().await.unwrap();
        assert_eq!(done.id, request.id());
        assert_eq!(done.value, 7);
    }

    #[tokio::test]
    async fn test_dropping_request_aborts_task() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut spawner = RequestSpawner::new(tx);
        let (gate_tx, gate_rx) = oneshot::channel::<()>();

        let request = spawner.spawn(
            async move {
                gate_rx.await.ok();
                1u32
            },
            |id, value| Done { id, value },
        );
        drop(request);
        for _ in 0..10 {
            if gate_tx.is_closed() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(gate_tx.is_closed());
    }

    #[tokio::test]
    async fn test_stale_ids_are_rejected() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut spawner = RequestSpawner::new(tx);
        let mut tracks = TrackRequests::default();

        let first = spawner.spawn(std::future::pending::<u32>(), |id, value| Done { id, value });
        let stale = first.id();
        tracks.set_data(TrackType::Audio, first);
        assert!(tracks.is_requesting(TrackType::Audio));
        assert!(tracks.is_tracking(TrackType::Audio));
        assert!(!tracks.is_tracking(TrackType::Video));

        tracks.disconnect(TrackType::Audio);
        let second = spawner.spawn(std::future::pending::<u32>(), |id, value| Done { id, value });
        let current = second.id();
        tracks.set_data(TrackType::Audio, second);

        assert!(!tracks.complete_data(TrackType::Audio, stale));
        assert!(tracks.complete_data(TrackType::Audio, current));
        assert!(!tracks.is_requesting(TrackType::Audio));
    }
}
