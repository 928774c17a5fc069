//! Notification rounds: one joined, parallel fan-out over all observers.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use tracing::{debug, error, warn};

use crate::{Container, Observer, ObserverError};

/// Run every observer in `observers` on its own thread and wait for all of them.
///
/// All observers receive the same container and a sender for one shared
/// error channel. The channel is never read here. A panicking observer is
/// logged and does not stop the others.
pub(crate) fn run(container: &Container, observers: &[Arc<dyn Observer>]) {
    let (errors, _unread) = mpsc::channel::<ObserverError>();
    let span = container.span().clone();

    debug!(parent: &span, observers = observers.len(), "starting notification round");

    let panicked = thread::scope(|scope| {
        let mut panicked = 0_usize;
        let mut handles = Vec::with_capacity(observers.len());

        for (index, observer) in observers.iter().enumerate() {
            let thread_errors = errors.clone();
            let thread_span = span.clone();
            let spawned = thread::Builder::new()
                .name(format!("config-observer-{index}"))
                .spawn_scoped(scope, move || {
                    let _entered = thread_span.enter();
                    observer.run(container, &thread_errors);
                });

            match spawned {
                Ok(handle) => handles.push((index, handle)),
                Err(e) => {
                    warn!(parent: &span, observer = index, error = %e, "could not spawn observer thread, running inline");
                    let inline = panic::catch_unwind(AssertUnwindSafe(|| {
                        observer.run(container, &errors);
                    }));
                    if inline.is_err() {
                        error!(parent: &span, observer = index, "observer panicked");
                        panicked += 1;
                    }
                }
            }
        }

        for (index, handle) in handles {
            if handle.join().is_err() {
                error!(parent: &span, observer = index, "observer panicked");
                panicked += 1;
            }
        }

        panicked
    });

    debug!(parent: &span, observers = observers.len(), panicked, "notification round complete");
}
