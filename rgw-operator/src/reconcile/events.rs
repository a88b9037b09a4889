//! Kubernetes events emitted on phase transitions and failures.
//!
//! Publishing is fire-and-forget. A failed event is logged and never fails
//! the reconcile that produced it.

use async_trait::async_trait;
use stackable_operator::{
    k8s_openapi::api::core::v1::ObjectReference,
    kube::{
        Client,
        runtime::events::{Event, EventType, Recorder, Reporter},
    },
};

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// `controller_name` shows up as the reporting component of the events.
    pub fn new(client: Client, controller_name: &str) -> KubeEventPublisher {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: None,
        };
        KubeEventPublisher {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(error) = self.recorder.publish(&event, resource_ref).await {
            tracing::warn!(reason, action, %error, "failed to publish event");
        }
    }
}

pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

pub mod reasons {
    pub const PHASE_CHANGED: &str = "PhaseChanged";
    pub const RECONCILE_FAILED: &str = "ReconcileFailed";
    pub const DELETION_BLOCKED: &str = "DeletionBlocked";
    pub const DELETED: &str = "Deleted";
    pub const PANICKED: &str = "Panicked";
    pub const GATEWAY_UPDATED: &str = "GatewayUpdated";
}

pub mod actions {
    pub const RECONCILE: &str = "Reconcile";
    pub const DELETE: &str = "Delete";
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Keeps `(reason, note)` of every published event.
    #[derive(Default)]
    pub struct RecordingEventPublisher {
        pub events: Mutex<Vec<(String, Option<String>)>>,
    }

    impl RecordingEventPublisher {
        pub fn reasons(&self) -> Vec<String> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .map(|(reason, _)| reason.clone())
                .collect()
        }
    }

    #[async_trait]
    impl EventPublisher for RecordingEventPublisher {
        async fn publish(
            &self,
            _resource_ref: &ObjectReference,
            _type_: EventType,
            reason: &str,
            _action: &str,
            note: Option<String>,
        ) {
            self.events
                .lock()
                .unwrap()
                .push((reason.to_string(), note));
        }
    }
}
