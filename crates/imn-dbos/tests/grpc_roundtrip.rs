//! End-to-end exercise of the gRPC surface: a real tonic server on a local
//! port, driven through the retrying client.

use std::sync::Arc;
use std::time::Duration;

use tokio_stream::wrappers::TcpListenerStream;

use imn_dbos::{DbosApi, DbosClient, DbosError, DbosGrpcService, DbosServiceServer};
use imn_kv::MemoryEngine;
use imn_model::{Agent, EventKind, EventLogEntry, MeasurementResult, ModuleState, ModuleStatus, Task};
use imn_store::{Store, StoreConfig};

async fn start_server() -> DbosClient {
    let store = Store::new(Arc::new(MemoryEngine::new()), StoreConfig::default());
    let service = DbosGrpcService::new(store);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(DbosServiceServer::new(service))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });

    DbosClient::connect(format!("http://{addr}")).await.unwrap()
}

#[tokio::test]
async fn agent_registry_roundtrip() {
    let client = start_server().await;

    let mut agent = Agent::new("a1", "host-a", 100);
    agent.total_heartbeats = 3;
    client.register_agent(agent.clone()).await.unwrap();

    let got = client.get_agent("a1").await.unwrap();
    assert_eq!(got, agent);

    assert_eq!(client.list_agents().await.unwrap().len(), 1);

    let err = client.get_agent("ghost").await.unwrap_err();
    assert!(matches!(err, DbosError::NotFound(_)));
}

#[tokio::test]
async fn module_state_lifecycle_over_the_wire() {
    let client = start_server().await;

    let state = |status| ModuleState::new("w1", "a1", "echo_module", status, 100);

    let created = client.set_module_state(state(ModuleStatus::Created)).await.unwrap();
    assert_eq!(created.version, 1);

    let started = client.set_module_state(state(ModuleStatus::Started)).await.unwrap();
    assert_eq!(started.version, 2);

    client.set_module_state(state(ModuleStatus::Completed)).await.unwrap();

    // Illegal transition surfaces as the typed error, record untouched.
    let err = client
        .set_module_state(state(ModuleStatus::Running))
        .await
        .unwrap_err();
    assert!(matches!(err, DbosError::InvalidTransition(_)));

    let stored = client.get_module_state("w1").await.unwrap();
    assert_eq!(stored.state, ModuleStatus::Completed);
    assert_eq!(stored.version, 3);

    // Optimistic write against a stale version.
    let err = client
        .set_module_state_with_version(state(ModuleStatus::Running), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, DbosError::VersionConflict(_)));

    let listed = client.list_module_states("a1", "echo_module").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(client.list_all_module_states().await.unwrap().len(), 1);
}

#[tokio::test]
async fn result_store_is_idempotent_over_the_wire() {
    let client = start_server().await;

    let result = MeasurementResult::new("w2", "a1", "ping_module", b"{}".to_vec(), 100);
    assert!(client.store_result(result.clone()).await.unwrap());
    assert!(!client.store_result(result.clone()).await.unwrap());

    let got = client.get_result("a1", "w2").await.unwrap();
    assert_eq!(got, result);
    assert_eq!(client.list_results("a1").await.unwrap().len(), 1);

    assert!(client.delete_result("a1", "w2").await.unwrap());
    assert!(matches!(
        client.get_result("a1", "w2").await.unwrap_err(),
        DbosError::NotFound(_)
    ));
}

#[tokio::test]
async fn task_queue_over_the_wire() {
    let client = start_server().await;

    let task = Task::new("t1", "a1", "ping_module", b"{}".to_vec(), 100, 90);
    client.schedule_task(task).await.unwrap();

    let claimed = client
        .list_due_tasks(100, Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].id, "t1");

    // Hidden while in flight, visible again after the recovery sweep.
    assert!(client
        .list_due_tasks(120, Duration::from_secs(60))
        .await
        .unwrap()
        .is_empty());
    assert_eq!(client.requeue_expired_tasks(170).await.unwrap(), 1);

    let reclaimed = client
        .list_due_tasks(180, Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].retry_count, 1);

    client.ack_task("t1").await.unwrap();
    assert!(matches!(
        client.get_task("t1").await.unwrap_err(),
        DbosError::NotFound(_)
    ));
}

#[tokio::test]
async fn event_log_over_the_wire() {
    let client = start_server().await;

    client
        .log_event(EventLogEntry::new(EventKind::Recovery, "first", 1))
        .await
        .unwrap();
    client
        .log_event(EventLogEntry::new(EventKind::Timeout, "second", 2).with_meta("rid", "w1"))
        .await
        .unwrap();

    let events = client.get_events(10).await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].kind, EventKind::Timeout);
    assert_eq!(events[0].metadata.get("rid").map(String::as_str), Some("w1"));
    assert_eq!(events[1].message, "first");
}
