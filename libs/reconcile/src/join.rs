//! Fan-out/join counter.
//!
//! [`fan_out`] hands out exactly `expected` [`Participant`] tokens. Each token
//! reports once, by value, so double reporting and over-reporting cannot be
//! expressed. When the last token reports, the continuation runs once with
//! either every participant's value (in participant order) or the first error
//! reported. A token dropped without reporting counts as a failure
//! ([`JoinError::Abandoned`]) so a join can never hang on a lost participant.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tokio::sync::oneshot;

/// Failures produced by the join machinery itself.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JoinError {
    /// A participant was dropped without reporting.
    #[error("participant {index} was dropped without reporting")]
    Abandoned { index: usize },

    /// The continuation side went away before the join completed.
    #[error("join was closed before all participants reported")]
    Closed,
}

type Continuation<T, E> = Box<dyn FnOnce(Result<Vec<T>, E>) + Send>;

struct Inner<T, E> {
    remaining: usize,
    values: Vec<Option<T>>,
    first_error: Option<E>,
    continuation: Option<Continuation<T, E>>,
}

struct Counter<T, E> {
    inner: Mutex<Inner<T, E>>,
}

impl<T, E> Counter<T, E> {
    fn record(&self, index: usize, result: Result<T, E>) {
        let fire = {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            match result {
                Ok(value) => inner.values[index] = Some(value),
                Err(error) => {
                    if inner.first_error.is_none() {
                        inner.first_error = Some(error);
                    }
                }
            }

            inner.remaining -= 1;
            if inner.remaining > 0 {
                return;
            }

            let outcome = match inner.first_error.take() {
                Some(error) => Err(error),
                None => Ok(inner.values.drain(..).flatten().collect()),
            };
            inner.continuation.take().map(|c| (c, outcome))
        };

        // Run outside the lock; the continuation may start new fan-outs.
        if let Some((continuation, outcome)) = fire {
            continuation(outcome);
        }
    }
}

/// One unit of a fan-out. Must report exactly once.
pub struct Participant<T, E: From<JoinError>> {
    index: usize,
    counter: Option<Arc<Counter<T, E>>>,
}

impl<T, E: From<JoinError>> Participant<T, E> {
    /// Position of this participant within its fan-out.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Reports this participant's outcome.
    pub fn report(mut self, result: Result<T, E>) {
        if let Some(counter) = self.counter.take() {
            counter.record(self.index, result);
        }
    }

    pub fn succeed(self, value: T) {
        self.report(Ok(value));
    }

    pub fn fail(self, error: E) {
        self.report(Err(error));
    }
}

impl<T, E: From<JoinError>> Drop for Participant<T, E> {
    fn drop(&mut self) {
        if let Some(counter) = self.counter.take() {
            counter.record(self.index, Err(JoinError::Abandoned { index: self.index }.into()));
        }
    }
}

impl<T, E: From<JoinError>> fmt::Debug for Participant<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Participant")
            .field("index", &self.index)
            .field("reported", &self.counter.is_none())
            .finish()
    }
}

/// Starts a fan-out of `expected` participants joined into `continuation`.
///
/// With `expected == 0` the continuation runs immediately with an empty
/// success and no participants are returned.
pub fn fan_out<T, E, F>(expected: usize, continuation: F) -> Vec<Participant<T, E>>
where
    T: Send + 'static,
    E: From<JoinError> + Send + 'static,
    F: FnOnce(Result<Vec<T>, E>) + Send + 'static,
{
    if expected == 0 {
        continuation(Ok(Vec::new()));
        return Vec::new();
    }

    let counter = Arc::new(Counter {
        inner: Mutex::new(Inner {
            remaining: expected,
            values: (0..expected).map(|_| None).collect(),
            first_error: None,
            continuation: Some(Box::new(continuation)),
        }),
    });

    (0..expected)
        .map(|index| Participant {
            index,
            counter: Some(Arc::clone(&counter)),
        })
        .collect()
}

/// Awaitable side of [`fan_out_channel`].
#[derive(Debug)]
pub struct Join<T, E> {
    rx: oneshot::Receiver<Result<Vec<T>, E>>,
}

impl<T, E: From<JoinError>> Join<T, E> {
    /// Waits until every participant has reported.
    pub async fn wait(self) -> Result<Vec<T>, E> {
        match self.rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(JoinError::Closed.into()),
        }
    }
}

/// Like [`fan_out`], with the continuation delivered through a [`Join`].
pub fn fan_out_channel<T, E>(expected: usize) -> (Vec<Participant<T, E>>, Join<T, E>)
where
    T: Send + 'static,
    E: From<JoinError> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let participants = fan_out(expected, move |outcome| {
        let _ = tx.send(outcome);
    });
    (participants, Join { rx })
}
