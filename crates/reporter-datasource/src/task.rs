//! Panic-recovering task spawners.
//!
//! Every background task of the subsystem goes through one of these helpers
//! so that a single bad probe cannot take the process down.

use futures::FutureExt;
use std::any::Any;
use std::backtrace::Backtrace;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tokio::task::JoinHandle;
use tracing::error;

/// Spawn `fut`, logging and swallowing any panic.
pub fn spawn_and_forget<F>(name: &'static str, fut: F) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let _ = recover(name, fut).await;
    })
}

/// Spawn `fut`; on panic, log it and hand the panic message to `cleanup` so
/// the owner can cascade cancellation.
pub fn spawn_with_cleanup<F, C>(name: &'static str, fut: F, cleanup: C) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
    C: FnOnce(String) + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(message) = run_caught(name, fut).await {
            cleanup(message);
        }
    })
}

/// Await `fut` in place, returning `None` if it panicked.
pub async fn recover<F, T>(name: &'static str, fut: F) -> Option<T>
where
    F: Future<Output = T>,
{
    run_caught(name, fut).await.ok()
}

async fn run_caught<F, T>(name: &'static str, fut: F) -> Result<T, String>
where
    F: Future<Output = T>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(value) => Ok(value),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            let backtrace = Backtrace::force_capture();
            error!(task = name, panic = %message, "Recovered panic in background task\n{}", backtrace);
            Err(message)
        },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
