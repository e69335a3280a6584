// Harbor Network Layer — Strand
// Distributed under the MIT software license.

//! Cooperative serialization lanes over a shared thread pool.
//!
//! A [`Strand`] is an actor mailbox: a FIFO of jobs serviced by a single
//! task, so jobs posted to one strand never run concurrently with each
//! other while still landing on any pool worker. Every component with
//! mutable state owns a strand and mutates only from it.

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

tokio::task_local! {
    /// Identifier of the strand currently executing on this task, if any.
    static CURRENT_STRAND: u64;
}

/// Fixed-size worker group executing strand jobs, socket I/O, and timers.
pub struct Threadpool {
    runtime: Runtime,
}

impl Threadpool {
    pub fn new(threads: u32) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(threads.max(1) as usize)
            .thread_name("harbor-worker")
            .enable_all()
            .build()
            .map_err(|_| Error::ResourceExhausted)?;

        Ok(Self { runtime })
    }

    pub fn handle(&self) -> Handle {
        self.runtime.handle().clone()
    }

    /// Abandon remaining work without blocking the caller.
    pub fn shutdown(self) {
        self.runtime.shutdown_background();
    }
}

/// A serialization lane. Cheap to clone; clones share the lane.
#[derive(Debug, Clone)]
pub struct Strand {
    id: u64,
    handle: Handle,
    sender: mpsc::UnboundedSender<Job>,
}

impl Strand {
    pub fn new(handle: &Handle) -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);

        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();
        handle.spawn(CURRENT_STRAND.scope(id, async move {
            while let Some(job) = receiver.recv().await {
                job();
            }
        }));

        Self { id, handle: handle.clone(), sender }
    }

    /// Runtime handle of the pool backing this strand.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// True when the caller is already executing on this strand.
    pub fn is_current(&self) -> bool {
        CURRENT_STRAND
            .try_with(|current| *current == self.id)
            .unwrap_or(false)
    }

    /// Enqueue a job; it runs after every job already queued.
    ///
    /// A job posted after the lane has shut down is dropped; lanes only
    /// shut down when their owner has already been torn down.
    pub fn post(&self, job: impl FnOnce() + Send + 'static) {
        if self.sender.send(Box::new(job)).is_err() {
            tracing::trace!("job posted to finished strand {}", self.id);
        }
    }

    /// Run inline when already on the strand, otherwise post.
    pub fn dispatch(&self, job: impl FnOnce() + Send + 'static) {
        if self.is_current() {
            job();
        } else {
            self.post(job);
        }
    }

    /// Post a job and await its completion from async context.
    ///
    /// Sequences the caller behind everything already queued on the lane.
    pub async fn run<R>(&self, job: impl FnOnce() -> R + Send + 'static) -> Result<R>
    where
        R: Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        self.post(move || {
            let _ = sender.send(job());
        });

        receiver.await.map_err(|_| Error::OperationCanceled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_post_order_is_fifo() {
        let strand = Strand::new(&Handle::current());
        let seen = Arc::new(Mutex::new(Vec::new()));

        for index in 0..100 {
            let seen = Arc::clone(&seen);
            strand.post(move || seen.lock().unwrap().push(index));
        }

        let done = strand.run(|| ()).await;
        assert!(done.is_ok());
        assert_eq!(*seen.lock().unwrap(), (0..100).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_dispatch_runs_inline_on_strand() {
        let strand = Strand::new(&Handle::current());
        let inner = strand.clone();

        let inline = strand
            .run(move || {
                let mut ran = false;
                inner.dispatch(|| {}); // posts nothing, runs inline
                if inner.is_current() {
                    ran = true;
                }
                ran
            })
            .await
            .unwrap();

        assert!(inline);
        assert!(!strand.is_current());
    }

    #[tokio::test]
    async fn test_two_strands_do_not_share_identity() {
        let handle = Handle::current();
        let first = Strand::new(&handle);
        let second = Strand::new(&handle);

        let second_inner = second.clone();
        let observed = first
            .run(move || second_inner.is_current())
            .await
            .unwrap();

        assert!(!observed);
    }
}
