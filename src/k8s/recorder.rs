//! # Event Recorder
//!
//! Publishes [`ControllerEvent`]s as Kubernetes Events on the Deployment they
//! describe. Runs as a background task draining the channel behind a
//! [`ChannelEventSink`](crate::events::ChannelEventSink), so publishing
//! latency never reaches the reconciler.

use crate::constants::CONTROLLER_NAME;
use crate::events::{ControllerEvent, EventType};
use crate::resource::ResourceIdentity;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType as KubeEventType, Recorder, Reporter};
use kube::Client;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const EVENT_ACTION: &str = "Reconcile";

/// Reference to the Deployment an event is attached to
pub(crate) fn deployment_reference(key: &ResourceIdentity) -> ObjectReference {
    ObjectReference {
        api_version: Some("apps/v1".to_string()),
        kind: Some("Deployment".to_string()),
        name: Some(key.name().to_string()),
        namespace: (!key.namespace().is_empty()).then(|| key.namespace().to_string()),
        ..ObjectReference::default()
    }
}

pub(crate) fn to_kube_event(event: &ControllerEvent) -> Event {
    Event {
        type_: match event.event_type {
            EventType::Normal => KubeEventType::Normal,
            EventType::Warning => KubeEventType::Warning,
        },
        reason: event.reason.clone(),
        note: Some(event.message.clone()),
        action: EVENT_ACTION.to_string(),
        secondary: None,
    }
}

/// Spawn the task publishing events from `events` until the channel closes
pub fn spawn_event_publisher(
    client: Client,
    instance: Option<String>,
    mut events: mpsc::Receiver<ControllerEvent>,
) -> JoinHandle<()> {
    let reporter = Reporter {
        controller: CONTROLLER_NAME.to_string(),
        instance,
    };
    let recorder = Recorder::new(client, reporter);

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let reference = deployment_reference(&event.subject);
            if let Err(e) = recorder.publish(&to_kube_event(&event), &reference).await {
                warn!(
                    resource = %event.subject,
                    reason = %event.reason,
                    error = %e,
                    "failed to publish Kubernetes event"
                );
            }
        }
        debug!("event publisher stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_points_at_deployment() {
        let reference = deployment_reference(&ResourceIdentity::new("ns", "app"));
        assert_eq!(reference.kind.as_deref(), Some("Deployment"));
        assert_eq!(reference.api_version.as_deref(), Some("apps/v1"));
        assert_eq!(reference.namespace.as_deref(), Some("ns"));
        assert_eq!(reference.name.as_deref(), Some("app"));
    }

    #[test]
    fn test_warning_event_mapping() {
        let event = to_kube_event(&ControllerEvent::warning(
            ResourceIdentity::new("ns", "app"),
            "ScaleFailed",
            "conflict",
        ));
        assert!(matches!(event.type_, KubeEventType::Warning));
        assert_eq!(event.reason, "ScaleFailed");
        assert_eq!(event.note.as_deref(), Some("conflict"));
    }
}
