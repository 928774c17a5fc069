//! Observers invoked after every configuration change.

use std::fmt;
use std::sync::mpsc;

use crate::{Container, ObserverError};

/// Sending half of a round's error channel.
///
/// Sends never block. The round does not read the channel, so observers
/// that need their errors acted upon should forward them themselves.
pub type ErrorSender = mpsc::Sender<ObserverError>;

/// A capability run once per notification round.
///
/// Observers run concurrently with each other and may run more than once
/// per logical change, so implementations should be idempotent.
///
/// # Example
///
/// ```
/// use std::sync::atomic::{AtomicI64, Ordering};
/// use strata_config::{Container, ErrorSender, Observer};
///
/// struct PoolSize(AtomicI64);
///
/// impl Observer for PoolSize {
///     fn run(&self, config: &Container, _errors: &ErrorSender) {
///         self.0.store(config.get_int("db.pool_size"), Ordering::Relaxed);
///     }
/// }
/// ```
pub trait Observer: Send + Sync {
    /// React to the current state of `config`.
    fn run(&self, config: &Container, errors: &ErrorSender);
}

/// Adapter that lifts a plain function into an [`Observer`].
pub struct FnObserver<F>(F);

impl<F> FnObserver<F>
where
    F: Fn(&Container, &ErrorSender) + Send + Sync,
{
    /// Wrap `f`.
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Observer for FnObserver<F>
where
    F: Fn(&Container, &ErrorSender) + Send + Sync,
{
    fn run(&self, config: &Container, errors: &ErrorSender) {
        (self.0)(config, errors);
    }
}

impl<F> fmt::Debug for FnObserver<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnObserver").finish_non_exhaustive()
    }
}
