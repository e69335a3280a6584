// Harbor Network Layer — Subscriber Family
// Distributed under the MIT software license.

//! Strand-owned typed pub/sub in four flavors.
//!
//! All four share one notification model: handlers receive
//! `Ok(Arc<message>)` broadcasts in FIFO registration order, then exactly
//! one `Err(code)` at stop, after which no notification is ever delivered.
//! The owning strand is the only mutator; none of these types lock.
//!
//! Flavors:
//! - [`Subscriber`] — persistent handlers.
//! - [`Unsubscriber`] — handlers return `false` to remove themselves.
//! - [`Desubscriber`] — keyed handlers, removable by key, `false` also removes.
//! - [`Resubscriber`] — retains the latest broadcast and replays it to
//!   late subscribers.

use std::sync::Arc;

use crate::error::{Error, Result};

/// What a handler observes: a broadcast payload or the terminal stop code.
pub type Notification<M> = Result<Arc<M>>;

/// Persistent broadcast: handlers stay registered until stop.
pub struct Subscriber<M> {
    handlers: Vec<Box<dyn FnMut(&Notification<M>) + Send>>,
    stopped: Option<Error>,
}

impl<M> Subscriber<M> {
    pub fn new() -> Self {
        Self { handlers: Vec::new(), stopped: None }
    }

    /// Register; after stop the handler is immediately notified with the
    /// stop code instead and `false` is returned.
    pub fn subscribe(&mut self, mut handler: impl FnMut(&Notification<M>) + Send + 'static) -> bool {
        if let Some(code) = self.stopped {
            handler(&Err(code));
            return false;
        }

        self.handlers.push(Box::new(handler));
        true
    }

    pub fn notify(&mut self, notification: &Notification<M>) {
        if self.stopped.is_some() {
            return;
        }

        for handler in self.handlers.iter_mut() {
            handler(notification);
        }
    }

    /// Terminal notification; handlers are dropped afterwards.
    pub fn stop(&mut self, code: Error) {
        if self.stopped.is_some() {
            return;
        }

        self.stopped = Some(code);
        let stop = Err(code);
        for handler in self.handlers.iter_mut() {
            handler(&stop);
        }
        self.handlers.clear();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.is_some()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<M> Default for Subscriber<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Broadcast with self-cancelling handlers: returning `false` removes the
/// handler after the invocation; it is never invoked again.
pub struct Unsubscriber<M> {
    handlers: Vec<Box<dyn FnMut(&Notification<M>) -> bool + Send>>,
    stopped: Option<Error>,
}

impl<M> Unsubscriber<M> {
    pub fn new() -> Self {
        Self { handlers: Vec::new(), stopped: None }
    }

    pub fn subscribe(
        &mut self,
        mut handler: impl FnMut(&Notification<M>) -> bool + Send + 'static,
    ) -> bool {
        if let Some(code) = self.stopped {
            handler(&Err(code));
            return false;
        }

        self.handlers.push(Box::new(handler));
        true
    }

    pub fn notify(&mut self, notification: &Notification<M>) {
        if self.stopped.is_some() {
            return;
        }

        self.handlers.retain_mut(|handler| handler(notification));
    }

    pub fn stop(&mut self, code: Error) {
        if self.stopped.is_some() {
            return;
        }

        self.stopped = Some(code);
        let stop = Err(code);
        for handler in self.handlers.iter_mut() {
            handler(&stop);
        }
        self.handlers.clear();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.is_some()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }
}

impl<M> Default for Unsubscriber<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Key-indexed broadcast. Insertion order is preserved for notification;
/// handlers remove themselves by returning `false` or are removed by key.
pub struct Desubscriber<K, M> {
    handlers: Vec<(K, Box<dyn FnMut(&Notification<M>) -> bool + Send>)>,
    stopped: Option<Error>,
}

impl<K: PartialEq, M> Desubscriber<K, M> {
    pub fn new() -> Self {
        Self { handlers: Vec::new(), stopped: None }
    }

    /// Register under a key; duplicate keys are rejected.
    pub fn subscribe(
        &mut self,
        key: K,
        mut handler: impl FnMut(&Notification<M>) -> bool + Send + 'static,
    ) -> bool {
        if let Some(code) = self.stopped {
            handler(&Err(code));
            return false;
        }

        if self.handlers.iter().any(|(existing, _)| *existing == key) {
            return false;
        }

        self.handlers.push((key, Box::new(handler)));
        true
    }

    /// Remove by key without notifying the handler.
    pub fn unsubscribe(&mut self, key: &K) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(existing, _)| existing != key);
        before != self.handlers.len()
    }

    pub fn notify(&mut self, notification: &Notification<M>) {
        if self.stopped.is_some() {
            return;
        }

        self.handlers.retain_mut(|(_, handler)| handler(notification));
    }

    pub fn stop(&mut self, code: Error) {
        if self.stopped.is_some() {
            return;
        }

        self.stopped = Some(code);
        let stop = Err(code);
        for (_, handler) in self.handlers.iter_mut() {
            handler(&stop);
        }
        self.handlers.clear();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.is_some()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }
}

impl<K: PartialEq, M> Default for Desubscriber<K, M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Broadcast that retains the most recent `Ok` notification and replays it
/// to any newly subscribed handler immediately.
pub struct Resubscriber<M> {
    handlers: Vec<Box<dyn FnMut(&Notification<M>) + Send>>,
    retained: Option<Notification<M>>,
    stopped: Option<Error>,
}

impl<M> Resubscriber<M> {
    pub fn new() -> Self {
        Self { handlers: Vec::new(), retained: None, stopped: None }
    }

    pub fn subscribe(&mut self, mut handler: impl FnMut(&Notification<M>) + Send + 'static) -> bool {
        if let Some(code) = self.stopped {
            handler(&Err(code));
            return false;
        }

        if let Some(retained) = &self.retained {
            handler(retained);
        }

        self.handlers.push(Box::new(handler));
        true
    }

    pub fn notify(&mut self, notification: &Notification<M>) {
        if self.stopped.is_some() {
            return;
        }

        for handler in self.handlers.iter_mut() {
            handler(notification);
        }

        if notification.is_ok() {
            self.retained = Some(notification.clone());
        }
    }

    pub fn stop(&mut self, code: Error) {
        if self.stopped.is_some() {
            return;
        }

        self.stopped = Some(code);
        self.retained = None;
        let stop = Err(code);
        for handler in self.handlers.iter_mut() {
            handler(&stop);
        }
        self.handlers.clear();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.is_some()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }
}

impl<M> Default for Resubscriber<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn log() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn push(log: &Arc<Mutex<Vec<String>>>, entry: impl Into<String>) {
        log.lock().unwrap().push(entry.into());
    }

    #[test]
    fn test_subscriber_fifo_order() {
        let mut subscriber = Subscriber::<u32>::new();
        let seen = log();

        for name in ["h1", "h2"] {
            let seen = Arc::clone(&seen);
            subscriber.subscribe(move |n| {
                push(&seen, format!("{}({})", name, n.as_ref().unwrap()));
            });
        }

        subscriber.notify(&Ok(Arc::new(1)));
        subscriber.notify(&Ok(Arc::new(2)));

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["h1(1)", "h2(1)", "h1(2)", "h2(2)"]
        );
    }

    #[test]
    fn test_subscriber_stop_is_last_and_terminal() {
        let mut subscriber = Subscriber::<u32>::new();
        let seen = log();

        let inner = Arc::clone(&seen);
        subscriber.subscribe(move |n| match n {
            Ok(value) => push(&inner, format!("ok {}", value)),
            Err(code) => push(&inner, format!("stop {:?}", code)),
        });

        subscriber.notify(&Ok(Arc::new(7)));
        subscriber.stop(Error::ChannelStopped);
        subscriber.notify(&Ok(Arc::new(8)));
        subscriber.stop(Error::InvalidMagic);

        assert_eq!(*seen.lock().unwrap(), vec!["ok 7", "stop ChannelStopped"]);
    }

    #[test]
    fn test_subscribe_after_stop_notifies_immediately() {
        let mut subscriber = Subscriber::<u32>::new();
        subscriber.stop(Error::ChannelStopped);

        let seen = log();
        let inner = Arc::clone(&seen);
        let registered = subscriber.subscribe(move |n| {
            push(&inner, format!("{:?}", n.as_ref().err()));
        });

        assert!(!registered);
        assert_eq!(*seen.lock().unwrap(), vec!["Some(ChannelStopped)"]);
    }

    #[test]
    fn test_unsubscriber_false_removes() {
        let mut subscriber = Unsubscriber::<u32>::new();
        let seen = log();

        let once = Arc::clone(&seen);
        subscriber.subscribe(move |n| {
            push(&once, format!("once {}", n.as_ref().unwrap()));
            false
        });
        let always = Arc::clone(&seen);
        subscriber.subscribe(move |n| {
            push(&always, format!("always {}", n.as_ref().unwrap()));
            true
        });

        subscriber.notify(&Ok(Arc::new(1)));
        subscriber.notify(&Ok(Arc::new(2)));

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["once 1", "always 1", "always 2"]
        );
        assert_eq!(subscriber.len(), 1);
    }

    #[test]
    fn test_desubscriber_keys() {
        let mut subscriber = Desubscriber::<u64, u32>::new();

        assert!(subscriber.subscribe(1, |_| true));
        assert!(!subscriber.subscribe(1, |_| true), "duplicate key rejected");
        assert!(subscriber.subscribe(2, |_| true));

        assert!(subscriber.unsubscribe(&1));
        assert!(!subscriber.unsubscribe(&1));
        assert_eq!(subscriber.len(), 1);
    }

    #[test]
    fn test_resubscriber_replays_retained() {
        let mut subscriber = Resubscriber::<u32>::new();
        subscriber.notify(&Ok(Arc::new(41)));
        subscriber.notify(&Ok(Arc::new(42)));

        let seen = log();
        let inner = Arc::clone(&seen);
        subscriber.subscribe(move |n| {
            push(&inner, format!("{}", n.as_ref().unwrap()));
        });

        subscriber.notify(&Ok(Arc::new(43)));

        assert_eq!(*seen.lock().unwrap(), vec!["42", "43"]);
    }
}
