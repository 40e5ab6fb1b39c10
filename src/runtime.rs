// SPDX-License-Identifier: MPL-2.0

//! Shared async runtime for hosts with a synchronous main loop.
//!
//! GTK-style shells drive this crate from a thread that cannot await. They
//! call [`block_on`] for one-shot work and [`spawn`] for fire-and-forget
//! tasks; both land on a single lazily created Tokio runtime so no caller
//! pays for runtime construction per request.

use once_cell::sync::Lazy;
use std::future::Future;
use tokio::runtime::Runtime;

/// Two worker threads cover an I/O-bound client comfortably.
static RUNTIME: Lazy<Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .thread_name("roost-async")
        .build()
        .expect("failed to create async runtime")
});

/// Run a future on the shared runtime, blocking the calling thread.
pub fn block_on<F: Future>(future: F) -> F::Output {
    RUNTIME.block_on(future)
}

/// Spawn a future on the shared runtime without blocking.
pub fn spawn<F>(future: F) -> tokio::task::JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    RUNTIME.spawn(future)
}

/// Handle to the shared runtime, for callers that need to enter its context.
pub fn handle() -> tokio::runtime::Handle {
    RUNTIME.handle().clone()
}
