//! Logger handles.
//!
//! Components never reach for a process-wide logger. Each one is constructed with
//! a [`Span`] naming it, and threads they start inherit the dispatch that was
//! current when they were spawned, so a session's subscriber follows its workers.

use std::io;
use std::thread::{self, JoinHandle};

use tracing::{Dispatch, Span};

/// Spawns a named thread that runs `f` inside `span`, under the caller's dispatch.
pub fn spawn_in_span<F, T>(name: &str, span: Span, f: F) -> io::Result<JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let dispatch: Dispatch = tracing::dispatcher::get_default(Dispatch::clone);
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || tracing::dispatcher::with_default(&dispatch, || span.in_scope(f)))
}
