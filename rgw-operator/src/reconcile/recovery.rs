use std::{any::Any, future::Future, panic::AssertUnwindSafe};

use futures::FutureExt;
use snafu::Snafu;

/// A reconcile future panicked. The payload message is kept for the status.
#[derive(Snafu, Debug, Clone, PartialEq, Eq)]
#[snafu(display("reconcile panicked: {message}"))]
pub struct Panicked {
    pub message: String,
}

/// Runs `future` and turns a panic inside it into [`Panicked`] instead of
/// tearing down the controller task.
pub async fn catch_panic<F, T>(future: F) -> Result<T, Panicked>
where
    F: Future<Output = T>,
{
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .map_err(|payload| {
            let message = panic_message(payload.as_ref());
            tracing::error!(%message, "recovered from panic during reconcile");
            Panicked { message }
        })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
