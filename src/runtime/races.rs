// Harbor Network Layer — Completion Races
// Distributed under the MIT software license.

//! Many-to-one completion coordinators.
//!
//! A race collects the results of a preconfigured number of concurrent
//! asynchronous operations and reduces them to one or two callbacks. All
//! races are strand-confined and single-use: each bound callback fires at
//! most once, and the finishing callback fires exactly once.
//!
//! - [`RaceSpeed`] — first `required` successes win, finisher after all.
//! - [`RaceQuality`] — best-valued success wins, delivered at finish.
//! - [`RaceVolume`] — `sufficient` at a success threshold, `complete` after all.
//! - [`RaceUnity`] — success only when every entrant succeeds.
//! - [`RaceAll`] — a latch that guarantees a callback on destruction.

use std::sync::Arc;

use crate::error::{Error, Result};

// =============================================================================
// RACE SPEED
// =============================================================================

type SpeedSuccess<P> = Box<dyn FnMut(Arc<P>) + Send>;
type Finisher = Box<dyn FnOnce(Result<()>) + Send>;

/// First-K-of-N coordinator.
///
/// The first `required` successful completions invoke the success handler
/// with their payloads in completion order; the final (`size`th)
/// completion invokes the finisher with `Ok(())` when any success was
/// seen, otherwise with the first error observed.
pub struct RaceSpeed<P> {
    size: usize,
    required: usize,
    runners: usize,
    successes: usize,
    first_error: Option<Error>,
    success: Option<SpeedSuccess<P>>,
    finisher: Option<Finisher>,
}

impl<P> RaceSpeed<P> {
    pub fn new(size: usize, required: usize) -> Self {
        Self {
            size,
            required: required.min(size),
            runners: 0,
            successes: 0,
            first_error: None,
            success: None,
            finisher: None,
        }
    }

    /// Bind the callbacks; false implies invalid usage.
    pub fn start(
        &mut self,
        success: impl FnMut(Arc<P>) + Send + 'static,
        finisher: impl FnOnce(Result<()>) + Send + 'static,
    ) -> bool {
        if self.finisher.is_some() || self.runners != 0 {
            return false;
        }

        self.success = Some(Box::new(success));
        self.finisher = Some(Box::new(finisher));
        true
    }

    /// Record one completion; false implies more completions than `size`.
    pub fn finish(&mut self, result: Result<Arc<P>>) -> bool {
        if self.runners == self.size || self.finisher.is_none() {
            return false;
        }

        self.runners += 1;
        match result {
            Ok(payload) => {
                if self.successes < self.required
                    && let Some(success) = self.success.as_mut()
                {
                    self.successes += 1;
                    success(payload);
                }
            }
            Err(code) => {
                if self.first_error.is_none() {
                    self.first_error = Some(code);
                }
            }
        }

        if self.runners == self.size {
            self.success = None;
            if let Some(finisher) = self.finisher.take() {
                if self.successes > 0 {
                    finisher(Ok(()));
                } else {
                    finisher(Err(self.first_error.unwrap_or(Error::OperationCanceled)));
                }
            }
        }

        true
    }

    pub fn running(&self) -> bool {
        self.runners > 0 && self.runners < self.size
    }
}

// =============================================================================
// RACE QUALITY
// =============================================================================

type Comparator<P> = Box<dyn Fn(&P, &P) -> bool + Send>;

/// Best-valued coordinator: retains the best success per the comparator
/// and delivers it when all entrants have completed.
pub struct RaceQuality<P> {
    size: usize,
    runners: usize,
    better: Comparator<P>,
    best: Option<Arc<P>>,
    first_error: Option<Error>,
    handler: Option<Box<dyn FnOnce(Result<Arc<P>>) + Send>>,
}

impl<P> RaceQuality<P> {
    /// `better(a, b)` returns true when `a` beats `b`.
    pub fn new(size: usize, better: impl Fn(&P, &P) -> bool + Send + 'static) -> Self {
        Self {
            size,
            runners: 0,
            better: Box::new(better),
            best: None,
            first_error: None,
            handler: None,
        }
    }

    pub fn start(&mut self, handler: impl FnOnce(Result<Arc<P>>) + Send + 'static) -> bool {
        if self.handler.is_some() || self.runners != 0 {
            return false;
        }

        self.handler = Some(Box::new(handler));
        true
    }

    pub fn finish(&mut self, result: Result<Arc<P>>) -> bool {
        if self.runners == self.size || self.handler.is_none() {
            return false;
        }

        self.runners += 1;
        match result {
            Ok(payload) => {
                let beaten = match &self.best {
                    Some(best) => (self.better)(&payload, best),
                    None => true,
                };
                if beaten {
                    self.best = Some(payload);
                }
            }
            Err(code) => {
                if self.first_error.is_none() {
                    self.first_error = Some(code);
                }
            }
        }

        if self.runners == self.size
            && let Some(handler) = self.handler.take()
        {
            match self.best.take() {
                Some(best) => handler(Ok(best)),
                None => handler(Err(self.first_error.unwrap_or(Error::OperationCanceled))),
            }
        }

        true
    }
}

// =============================================================================
// RACE VOLUME
// =============================================================================

/// Count-threshold coordinator.
///
/// `sufficient` fires with `Ok(())` once `required` successes accumulate
/// (or with the configured shortfall code at completion when they never
/// do); `complete` fires once after all `size` completions.
pub struct RaceVolume {
    size: usize,
    required: usize,
    shortfall: Error,
    runners: usize,
    successes: usize,
    sufficient: Option<Finisher>,
    complete: Option<Finisher>,
}

impl RaceVolume {
    pub fn new(size: usize, required: usize, shortfall: Error) -> Self {
        Self {
            size,
            required: required.min(size),
            shortfall,
            runners: 0,
            successes: 0,
            sufficient: None,
            complete: None,
        }
    }

    pub fn start(
        &mut self,
        sufficient: impl FnOnce(Result<()>) + Send + 'static,
        complete: impl FnOnce(Result<()>) + Send + 'static,
    ) -> bool {
        if self.complete.is_some() || self.runners != 0 {
            return false;
        }

        self.sufficient = Some(Box::new(sufficient));
        self.complete = Some(Box::new(complete));
        true
    }

    pub fn finish(&mut self, result: Result<()>) -> bool {
        if self.runners == self.size || self.complete.is_none() {
            return false;
        }

        self.runners += 1;
        if result.is_ok() {
            self.successes += 1;
            if self.successes == self.required
                && let Some(sufficient) = self.sufficient.take()
            {
                sufficient(Ok(()));
            }
        }

        if self.runners == self.size {
            if let Some(sufficient) = self.sufficient.take() {
                sufficient(Err(self.shortfall));
            }
            if let Some(complete) = self.complete.take() {
                complete(Ok(()));
            }
        }

        true
    }

    pub fn successes(&self) -> usize {
        self.successes
    }
}

// =============================================================================
// RACE UNITY
// =============================================================================

/// All-or-nothing coordinator: the handler fires with `Ok(())` only when
/// every entrant succeeds, and short-circuits with the first error.
pub struct RaceUnity {
    size: usize,
    runners: usize,
    handler: Option<Finisher>,
}

impl RaceUnity {
    pub fn new(size: usize) -> Self {
        Self { size, runners: 0, handler: None }
    }

    pub fn start(&mut self, handler: impl FnOnce(Result<()>) + Send + 'static) -> bool {
        if self.handler.is_some() || self.runners != 0 {
            return false;
        }

        self.handler = Some(Box::new(handler));
        true
    }

    pub fn finish(&mut self, result: Result<()>) -> bool {
        if self.runners == self.size {
            return false;
        }

        self.runners += 1;
        match result {
            Err(code) => {
                if let Some(handler) = self.handler.take() {
                    handler(Err(code));
                }
            }
            Ok(()) => {
                if self.runners == self.size
                    && let Some(handler) = self.handler.take()
                {
                    handler(Ok(()));
                }
            }
        }

        true
    }
}

// =============================================================================
// RACE ALL
// =============================================================================

/// A latch guaranteeing a "done" callback no matter how the handler
/// references that share it are dropped. The bound handler is invoked
/// with `Ok(())` on destruction.
pub struct RaceAll {
    complete: Option<Finisher>,
}

impl RaceAll {
    pub fn new(complete: impl FnOnce(Result<()>) + Send + 'static) -> Self {
        Self { complete: Some(Box::new(complete)) }
    }
}

impl Drop for RaceAll {
    fn drop(&mut self) {
        if let Some(complete) = self.complete.take() {
            complete(Ok(()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn record() -> (Arc<Mutex<Vec<String>>>, impl Fn(String) + Clone) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let writer = Arc::clone(&seen);
        (seen, move |entry| writer.lock().unwrap().push(entry))
    }

    #[test]
    fn test_speed_two_of_four() {
        // Completions [timeout, ok(2), ok(3), ok(4)]: success fires for
        // payloads 2 and 3 only; the finisher fires once with success.
        let mut race = RaceSpeed::<u32>::new(4, 2);
        let (seen, log) = record();
        let finish_log = log.clone();

        assert!(race.start(
            move |payload| log(format!("success {}", payload)),
            move |result| finish_log(format!("finish {:?}", result)),
        ));

        assert!(race.finish(Err(Error::OperationTimeout)));
        assert!(race.finish(Ok(Arc::new(2))));
        assert!(race.finish(Ok(Arc::new(3))));
        assert!(race.finish(Ok(Arc::new(4))));
        assert!(!race.finish(Ok(Arc::new(5))), "over-finish rejected");

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["success 2", "success 3", "finish Ok(())"]
        );
    }

    #[test]
    fn test_speed_all_failed_reports_first_error() {
        let mut race = RaceSpeed::<u32>::new(2, 1);
        let (seen, log) = record();

        race.start(|_| {}, move |result| log(format!("{:?}", result)));
        race.finish(Err(Error::ConnectFailed));
        race.finish(Err(Error::OperationTimeout));

        assert_eq!(*seen.lock().unwrap(), vec!["Err(ConnectFailed)"]);
    }

    #[test]
    fn test_quality_keeps_best() {
        let mut race = RaceQuality::<u32>::new(3, |a, b| a > b);
        let (seen, log) = record();

        race.start(move |result| log(format!("{:?}", result.map(|best| *best))));
        race.finish(Ok(Arc::new(5)));
        race.finish(Ok(Arc::new(9)));
        race.finish(Ok(Arc::new(7)));

        assert_eq!(*seen.lock().unwrap(), vec!["Ok(9)"]);
    }

    #[test]
    fn test_volume_threshold_and_completion() {
        let mut race = RaceVolume::new(4, 2, Error::AddressPoolEmpty);
        let (seen, log) = record();
        let complete_log = log.clone();

        race.start(
            move |result| log(format!("sufficient {:?}", result)),
            move |result| complete_log(format!("complete {:?}", result)),
        );

        race.finish(Ok(()));
        race.finish(Err(Error::ConnectFailed));
        race.finish(Ok(())); // threshold reached here
        race.finish(Ok(()));

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["sufficient Ok(())", "complete Ok(())"]
        );
        assert_eq!(race.successes(), 3);
    }

    #[test]
    fn test_volume_shortfall() {
        let mut race = RaceVolume::new(2, 2, Error::AddressPoolEmpty);
        let (seen, log) = record();
        let complete_log = log.clone();

        race.start(
            move |result| log(format!("sufficient {:?}", result)),
            move |result| complete_log(format!("complete {:?}", result)),
        );

        race.finish(Ok(()));
        race.finish(Err(Error::ConnectFailed));

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["sufficient Err(AddressPoolEmpty)", "complete Ok(())"]
        );
    }

    #[test]
    fn test_unity_short_circuits() {
        let mut race = RaceUnity::new(3);
        let (seen, log) = record();

        race.start(move |result| log(format!("{:?}", result)));
        race.finish(Ok(()));
        race.finish(Err(Error::ConnectFailed));
        race.finish(Ok(()));

        assert_eq!(*seen.lock().unwrap(), vec!["Err(ConnectFailed)"]);
    }

    #[test]
    fn test_unity_all_success() {
        let mut race = RaceUnity::new(2);
        let (seen, log) = record();

        race.start(move |result| log(format!("{:?}", result)));
        race.finish(Ok(()));
        race.finish(Ok(()));

        assert_eq!(*seen.lock().unwrap(), vec!["Ok(())"]);
    }

    #[test]
    fn test_all_fires_on_drop() {
        let (seen, log) = record();
        {
            let _latch = RaceAll::new(move |result| log(format!("{:?}", result)));
            assert!(seen.lock().unwrap().is_empty());
        }
        assert_eq!(*seen.lock().unwrap(), vec!["Ok(())"]);
    }
}
