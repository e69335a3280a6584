// Harbor Network Layer — Deadline
// Distributed under the MIT software license.

//! One-shot, strand-scoped cancellable timer.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

use super::strand::Strand;
use crate::error::{Error, Result};

type Handler = Box<dyn FnOnce(Result<()>) + Send + 'static>;

/// A one-shot timer against the monotonic clock.
///
/// The armed handler runs on the owning strand exactly once: with `Ok(())`
/// on expiry, or with `OperationCanceled` when stopped or re-armed first.
pub struct Deadline {
    strand: Strand,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    /// Bumped on every start/stop so a stale sleep cannot fire.
    generation: u64,
    handler: Option<Handler>,
    sleeper: Option<JoinHandle<()>>,
}

impl Deadline {
    pub fn new(strand: Strand) -> Arc<Self> {
        Arc::new(Self { strand, state: Mutex::new(State::default()) })
    }

    /// Arm the timer. Re-arming cancels the previous handler first.
    pub fn start(
        self: &Arc<Self>,
        duration: Duration,
        handler: impl FnOnce(Result<()>) + Send + 'static,
    ) {
        let mut state = self.state.lock().unwrap();
        Self::cancel_locked(&self.strand, &mut state);

        state.generation += 1;
        state.handler = Some(Box::new(handler));

        let generation = state.generation;
        let this = Arc::clone(self);
        state.sleeper = Some(self.strand.handle().spawn(async move {
            tokio::time::sleep(duration).await;
            this.expire(generation);
        }));
    }

    /// Cancel; a pending handler runs with `OperationCanceled`.
    pub fn stop(&self) {
        let mut state = self.state.lock().unwrap();
        state.generation += 1;
        Self::cancel_locked(&self.strand, &mut state);
    }

    fn expire(&self, generation: u64) {
        let mut state = self.state.lock().unwrap();
        if state.generation != generation {
            return;
        }

        state.sleeper = None;
        if let Some(handler) = state.handler.take() {
            self.strand.post(move || handler(Ok(())));
        }
    }

    fn cancel_locked(strand: &Strand, state: &mut State) {
        if let Some(sleeper) = state.sleeper.take() {
            sleeper.abort();
        }

        if let Some(handler) = state.handler.take() {
            strand.post(move || handler(Err(Error::OperationCanceled)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::runtime::Handle;
    use tokio::sync::mpsc;

    fn strand() -> Strand {
        Strand::new(&Handle::current())
    }

    #[tokio::test]
    async fn test_expiry_delivers_success() {
        let deadline = Deadline::new(strand());
        let (tx, mut rx) = mpsc::unbounded_channel();

        deadline.start(Duration::from_millis(10), move |result| {
            tx.send(result).unwrap();
        });

        assert_eq!(rx.recv().await.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn test_stop_delivers_canceled() {
        let deadline = Deadline::new(strand());
        let (tx, mut rx) = mpsc::unbounded_channel();

        deadline.start(Duration::from_secs(3600), move |result| {
            tx.send(result).unwrap();
        });
        deadline.stop();

        assert_eq!(rx.recv().await.unwrap(), Err(Error::OperationCanceled));
    }

    #[tokio::test]
    async fn test_restart_cancels_previous_and_rearms() {
        let deadline = Deadline::new(strand());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let first = tx.clone();
        deadline.start(Duration::from_secs(3600), move |result| {
            first.send(("first", result)).unwrap();
        });
        deadline.start(Duration::from_millis(10), move |result| {
            tx.send(("second", result)).unwrap();
        });

        assert_eq!(rx.recv().await.unwrap(), ("first", Err(Error::OperationCanceled)));
        assert_eq!(rx.recv().await.unwrap(), ("second", Ok(())));
    }

    #[tokio::test]
    async fn test_handler_runs_at_most_once() {
        let deadline = Deadline::new(strand());
        let fired = Arc::new(AtomicUsize::new(0));

        let counted = Arc::clone(&fired);
        deadline.start(Duration::from_millis(5), move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        deadline.stop();
        deadline.stop();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
