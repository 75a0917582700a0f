//! Event hub and wire-shape tests

use renderlite::docker::ContainerStats;
use renderlite::events::{Event, SubscriptionHub};
use renderlite::models::{DeploymentStatus, ServiceStatus};
use uuid::Uuid;

#[tokio::test]
async fn test_deployment_topic_gets_logs_and_statuses_in_order() {
    let hub = SubscriptionHub::default();
    let deployment_id = Uuid::new_v4();
    let mut rx = hub.subscribe(&format!("deployment:{deployment_id}"));

    hub.publish_local(Event::deployment_status(
        deployment_id,
        DeploymentStatus::Building,
        None,
    ));
    hub.publish_local(Event::deployment_log(deployment_id, "cloning"));
    hub.publish_local(Event::deployment_log(deployment_id, "building"));
    hub.publish_local(Event::deployment_status(
        deployment_id,
        DeploymentStatus::Success,
        Some("abc123".to_string()),
    ));

    assert!(matches!(
        rx.recv().await.unwrap(),
        Event::DeploymentStatus { status: DeploymentStatus::Building, .. }
    ));
    assert!(matches!(rx.recv().await.unwrap(), Event::DeploymentLog { log, .. } if log == "cloning"));
    assert!(matches!(rx.recv().await.unwrap(), Event::DeploymentLog { log, .. } if log == "building"));
    match rx.recv().await.unwrap() {
        Event::DeploymentStatus { status, container_id, .. } => {
            assert_eq!(status, DeploymentStatus::Success);
            assert_eq!(container_id.as_deref(), Some("abc123"));
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn test_multiple_subscribers_all_receive() {
    let hub = SubscriptionHub::default();
    let service_id = Uuid::new_v4();
    let topic = format!("service:{service_id}");
    let mut rx1 = hub.subscribe(&topic);
    let mut rx2 = hub.subscribe(&topic);

    let reached = hub.publish_local(Event::service_status(service_id, ServiceStatus::Running));
    assert_eq!(reached, 2);
    assert!(rx1.recv().await.is_ok());
    assert!(rx2.recv().await.is_ok());
}

#[test]
fn test_metrics_event_wire_shape() {
    let service_id = Uuid::new_v4();
    let stats = ContainerStats {
        cpu_percent: 12.5,
        memory_usage: 128 * 1024 * 1024,
        memory_limit: 512 * 1024 * 1024,
        memory_percent: 25.0,
        network_rx: 4096,
        network_tx: 8192,
    };

    let json = serde_json::to_value(Event::service_metrics(service_id, stats)).unwrap();
    assert_eq!(json["type"], "service:metrics");
    assert_eq!(json["serviceId"], service_id.to_string());
    assert_eq!(json["metrics"]["cpuPercent"], 12.5);
    assert_eq!(json["metrics"]["memoryUsage"], 128 * 1024 * 1024);
    assert_eq!(json["metrics"]["memoryPercent"], 25.0);
    assert_eq!(json["metrics"]["networkRx"], 4096);
    assert_eq!(json["metrics"]["networkTx"], 8192);
    assert!(json["metrics"]["timestamp"].is_string());
    assert!(json["timestamp"].is_string());
}

#[test]
fn test_status_enum_encodes_upper_case() {
    let json = serde_json::to_value(Event::service_status(Uuid::new_v4(), ServiceStatus::Deploying))
        .unwrap();
    assert_eq!(json["status"], "DEPLOYING");

    let json = serde_json::to_value(Event::deployment_status(
        Uuid::new_v4(),
        DeploymentStatus::Queued,
        None,
    ))
    .unwrap();
    assert_eq!(json["status"], "QUEUED");
}

#[tokio::test]
async fn test_bridge_round_trip_decodes_to_same_event() {
    // What the bridge does: encode on the bus side, decode on the hub side.
    let event = Event::deployment_log(Uuid::new_v4(), "step output");
    let wire = serde_json::to_string(&event).unwrap();
    let decoded: Event = serde_json::from_str(&wire).unwrap();

    let hub = SubscriptionHub::default();
    let mut rx = hub.subscribe(&event.topic());
    hub.publish_local(decoded);
    assert_eq!(rx.recv().await.unwrap(), event);
}
