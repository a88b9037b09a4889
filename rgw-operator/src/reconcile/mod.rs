//! Pieces shared by every controller of the object store family.
//!
//! Each controller keeps its own reconcile function; this module decides what
//! happens after it returns. Errors are sorted into an [`ErrorKind`], which
//! picks the requeue policy and whether the failure is recorded on the
//! resource status.

use std::{sync::Arc, time::Duration};

use stackable_operator::kube::runtime::controller::Action;

pub mod backoff;
pub mod events;
pub mod finalizer;
pub mod guard;
pub mod recovery;
pub mod status;

use backoff::Backoff;
use events::EventPublisher;

/// Delay before looking again at a resource whose dependencies are not there yet.
pub const NOT_READY_REQUEUE: Duration = Duration::from_secs(10);

/// Interval at which healthy resources are re-checked against drift.
pub const RESYNC_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ErrorKind {
    Transient,
    NotReady,
    NotFound,
    InvalidConfig,
    MissingPool,
    ForeignAccount,
    Conflict,
    Panic,
}

impl ErrorKind {
    /// Failures of these kinds are written to `status.phase` and announced as events.
    pub fn is_reported(&self) -> bool {
        !matches!(self, ErrorKind::NotReady)
    }
}

pub trait ClassifyError {
    fn kind(&self) -> ErrorKind;
}

/// State shared by all reconciles of one controller.
pub struct Substrate {
    pub backoff: Backoff,
    pub events: Arc<dyn EventPublisher>,
}

impl Substrate {
    pub fn new(events: Arc<dyn EventPublisher>) -> Substrate {
        Substrate {
            backoff: Backoff::default(),
            events,
        }
    }

    /// Requeue policy for a failed reconcile of `key`.
    pub fn error_action(&self, key: &str, kind: ErrorKind) -> Action {
        match kind {
            ErrorKind::InvalidConfig | ErrorKind::ForeignAccount => Action::await_change(),
            ErrorKind::NotReady | ErrorKind::NotFound => Action::requeue(NOT_READY_REQUEUE),
            ErrorKind::Transient
            | ErrorKind::MissingPool
            | ErrorKind::Conflict
            | ErrorKind::Panic => Action::requeue(self.backoff.next_delay(key)),
        }
    }
}

/// Innermost message of an error chain, used for `status.message`.
pub fn root_cause_message(err: &(dyn std::error::Error + 'static)) -> String {
    let mut current = err;
    while let Some(source) = current.source() {
        current = source;
    }
    current.to_string()
}

/// Key under which backoff state of a resource is kept.
pub fn object_key(namespace: Option<&str>, name: &str) -> String {
    format!("{}/{name}", namespace.unwrap_or_default())
}
