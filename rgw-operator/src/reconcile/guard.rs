use std::future::Future;

use stackable_operator::kube::{
    Client, Resource, ResourceExt,
    runtime::{controller::Action, events::EventType},
};

use super::{
    ClassifyError, Substrate,
    events::{actions, reasons},
    object_key,
    recovery::{Panicked, catch_panic},
    root_cause_message,
    status::{StatusResource, record_failure},
};

/// Backoff key of whatever the controller hands to its error policy.
pub fn resource_key<K: Resource>(obj: &K) -> String {
    let meta = obj.meta();
    object_key(meta.namespace.as_deref(), meta.name.as_deref().unwrap_or_default())
}

/// Runs one reconcile of `obj`.
///
/// A panic inside `body` becomes an error of kind `Panic`. Reported failures are
/// written to the status and announced as events before they reach the error
/// policy; a success resets the backoff of the resource.
pub async fn run_guarded<K, E, Fut>(
    client: &Client,
    substrate: &Substrate,
    obj: &K,
    body: Fut,
) -> Result<Action, E>
where
    K: StatusResource,
    E: ClassifyError + std::error::Error + From<Panicked> + 'static,
    Fut: Future<Output = Result<Action, E>>,
{
    let key = object_key(obj.namespace().as_deref(), &obj.name_any());
    let result = match catch_panic(body).await {
        Ok(result) => result,
        Err(panicked) => {
            substrate
                .events
                .publish(
                    &obj.object_ref(&()),
                    EventType::Warning,
                    reasons::PANICKED,
                    actions::RECONCILE,
                    Some(panicked.message.clone()),
                )
                .await;
            Err(E::from(panicked))
        }
    };

    match &result {
        Ok(_) => substrate.backoff.reset(&key),
        Err(err) if err.kind().is_reported() => {
            let message = root_cause_message(err);
            tracing::warn!(%key, kind = %err.kind(), error = %err, "reconcile failed");
            if let Err(error) =
                record_failure(client, substrate.events.as_ref(), obj, &message).await
            {
                tracing::warn!(%key, %error, "failed to record reconcile failure");
            }
        }
        Err(err) => tracing::debug!(%key, error = %err, "dependencies not ready yet"),
    }
    result
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use snafu::Snafu;
    use stackable_operator::kube::{Config, core::DeserializeGuard};

    use super::*;
    use crate::{
        api::object_store::fixtures::{STORE, object_store},
        reconcile::{ErrorKind, events::testing::RecordingEventPublisher},
    };

    #[derive(Snafu, Debug)]
    enum ReconcileError {
        #[snafu(display("reconcile panicked"), context(false))]
        Panic { source: Panicked },
    }

    impl ClassifyError for ReconcileError {
        fn kind(&self) -> ErrorKind {
            match self {
                ReconcileError::Panic { .. } => ErrorKind::Panic,
            }
        }
    }

    /// Client of an API server that refuses every connection.
    fn unreachable_client() -> Client {
        let config = Config::new("http://127.0.0.1:9".parse().unwrap());
        Client::try_from(config).unwrap()
    }

    #[test]
    fn test_resource_key() {
        let store = object_store(STORE);
        assert_eq!(resource_key(&store), "rook-ceph/my-store");
        let guard = DeserializeGuard(Ok(store));
        assert_eq!(resource_key(&guard), "rook-ceph/my-store");
    }

    #[tokio::test]
    async fn test_panicking_reconcile_is_reported() {
        let events = Arc::new(RecordingEventPublisher::default());
        let substrate = Substrate::new(events.clone());
        let store = object_store(STORE);

        let result: Result<Action, ReconcileError> =
            run_guarded(&unreachable_client(), &substrate, &store, async {
                if true {
                    panic!("zone lookup blew up");
                }
                Ok(Action::await_change())
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Panic);
        assert_eq!(root_cause_message(&err), "reconcile panicked: zone lookup blew up");
        let recorded = events.events.lock().unwrap().clone();
        assert_eq!(
            recorded,
            vec![(
                reasons::PANICKED.to_string(),
                Some("zone lookup blew up".to_string())
            )]
        );
    }

    #[tokio::test]
    async fn test_successful_reconcile_publishes_nothing() {
        let events = Arc::new(RecordingEventPublisher::default());
        let substrate = Substrate::new(events.clone());
        let store = object_store(STORE);

        let result: Result<Action, ReconcileError> =
            run_guarded(&unreachable_client(), &substrate, &store, async {
                Ok(Action::await_change())
            })
            .await;

        assert_eq!(result.unwrap(), Action::await_change());
        assert!(events.reasons().is_empty());
    }
}
