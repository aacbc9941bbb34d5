//! Conductor manager tests
//!
//! The manager runs against the in-memory store, the local transport and
//! fake infrastructure/notification collaborators.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use brick_core::dispatch::{LocalTransport, RequestContext, Topics, Transport};
use brick_core::models::{NewBrick, NewBrickConfig, NewConfigFile};
use brick_core::pool::WorkerPool;
use brick_core::rpc::{ExecuteArgs, MortarClient, TailLogArgs};
use brick_core::states::{BrickStatus, TaskStatus};
use brick_core::store::{BrickUpdate, MemoryStore, Store, StoreError};

use conductor::errors::ConductorError;
use conductor::infra::{Infrastructure, InfraError, InstanceSpec};
use conductor::manager::actions::DeployParams;
use conductor::manager::ConductorManager;
use conductor::notify::{Notifier, NotifyError};
use conductor::partition::Partitioner;

#[derive(Default)]
struct FakeInfraState {
    instances: HashSet<String>,
    next_id: u32,
    create_calls: usize,
    delete_calls: usize,
    floating_ip_calls: Vec<(String, String)>,
    fail_create: bool,
}

#[derive(Default)]
struct FakeInfra {
    state: Mutex<FakeInfraState>,
}

impl FakeInfra {
    fn with_instances(ids: &[&str]) -> Self {
        let infra = Self::default();
        {
            let mut state = infra.state.lock().unwrap();
            for id in ids {
                state.instances.insert(id.to_string());
            }
        }
        infra
    }

    fn failing_create() -> Self {
        let infra = Self::default();
        infra.state.lock().unwrap().fail_create = true;
        infra
    }
}

#[async_trait]
impl Infrastructure for FakeInfra {
    async fn create_instance(&self, _spec: &InstanceSpec) -> Result<String, InfraError> {
        let mut state = self.state.lock().unwrap();
        state.create_calls += 1;
        if state.fail_create {
            return Err(InfraError::Api("quota exceeded".to_string()));
        }
        state.next_id += 1;
        let id = format!("inst-{}", state.next_id);
        state.instances.insert(id.clone());
        Ok(id)
    }

    async fn delete_instance(&self, instance_id: &str) -> Result<(), InfraError> {
        let mut state = self.state.lock().unwrap();
        state.delete_calls += 1;
        if state.instances.remove(instance_id) {
            Ok(())
        } else {
            Err(InfraError::InstanceNotFound(instance_id.to_string()))
        }
    }

    async fn list_instances(&self) -> Result<Vec<String>, InfraError> {
        Ok(self.state.lock().unwrap().instances.iter().cloned().collect())
    }

    async fn ensure_security_group(
        &self,
        _name: &str,
        _ports: &[u16],
    ) -> Result<Vec<String>, InfraError> {
        Ok(vec!["sg-1".to_string()])
    }

    async fn assign_floating_ip(&self, instance_id: &str, ip: &str) -> Result<(), InfraError> {
        self.state
            .lock()
            .unwrap()
            .floating_ip_calls
            .push((instance_id.to_string(), ip.to_string()));
        Ok(())
    }
}

#[derive(Default)]
struct CountingNotifier {
    recipients: Mutex<Vec<String>>,
}

#[async_trait]
impl Notifier for CountingNotifier {
    async fn notify(
        &self,
        recipient: &str,
        _template: &str,
        _context: &BTreeMap<String, String>,
    ) -> Result<(), NotifyError> {
        self.recipients.lock().unwrap().push(recipient.to_string());
        Ok(())
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    infra: Arc<FakeInfra>,
    notifier: Arc<CountingNotifier>,
    transport: Arc<LocalTransport>,
    manager: ConductorManager,
}

fn harness_with(infra: FakeInfra, pool_size: usize) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let infra = Arc::new(infra);
    let notifier = Arc::new(CountingNotifier::default());
    let transport = Arc::new(LocalTransport::new());

    let manager = ConductorManager::new(
        store.clone(),
        infra.clone(),
        notifier.clone(),
        MortarClient::new(transport.clone(), Duration::from_secs(1)),
        Topics::mortar_shared(),
        Arc::new(WorkerPool::new(pool_size)),
        Partitioner::new("test-host".to_string(), vec![]),
        DeployParams {
            default_image: "ubuntu-22.04".to_string(),
            api_url: "http://localhost:8061".to_string(),
        },
    );

    Harness {
        store,
        infra,
        notifier,
        transport,
        manager,
    }
}

fn harness() -> Harness {
    harness_with(FakeInfra::default(), 8)
}

fn test_brickconfig() -> NewBrickConfig {
    NewBrickConfig {
        name: "abrickconfig".to_string(),
        version: "v0.0".to_string(),
        is_public: false,
        tenant_id: "iamatenant".to_string(),
        tag: "testapp".to_string(),
        description: "i am a test app".to_string(),
        logo: String::new(),
        app_version: "10.2.9".to_string(),
        ports: vec![80, 443],
        environ: vec![],
        email_template: "your {{ brickconfig.name }} brick is laid".to_string(),
        minimum_ram_mb: 512,
    }
}

fn deploy_configuration() -> BTreeMap<String, serde_json::Value> {
    [
        ("flavour", "m1.small"),
        ("network", "net-1"),
        ("keypair", "kp-1"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
    .collect()
}

async fn create_brick(
    harness: &Harness,
    brickconfig_uuid: Uuid,
    status: BrickStatus,
    instance_id: Option<&str>,
) -> Uuid {
    let brick = harness
        .store
        .create_brick(NewBrick {
            brickconfig_uuid,
            tenant_id: "iamatenant".to_string(),
            instance_id: instance_id.map(str::to_string),
            configuration: deploy_configuration(),
        })
        .await
        .unwrap();

    if status != BrickStatus::NoState {
        harness
            .store
            .update_brick(brick.id, BrickUpdate::status(status))
            .await
            .unwrap();
    }
    brick.id
}

#[tokio::test]
async fn test_brick_deploy_simple() {
    let h = harness();
    let config = h.store.create_brickconfig(test_brickconfig()).await.unwrap();
    let brick_id = create_brick(&h, config.id, BrickStatus::NoState, None).await;

    let handle = h
        .manager
        .do_brick_deploy(RequestContext::admin(), brick_id)
        .await
        .unwrap();
    handle.join().await.unwrap();

    let brick = h.store.get_brick(brick_id).await.unwrap();
    assert_eq!(brick.status, BrickStatus::Init);
    assert_eq!(brick.instance_id.as_deref(), Some("inst-1"));
    assert_eq!(h.infra.state.lock().unwrap().create_calls, 1);
}

#[tokio::test]
async fn test_brick_deploy_failure_leaves_status_unchanged() {
    let h = harness_with(FakeInfra::failing_create(), 8);
    let config = h.store.create_brickconfig(test_brickconfig()).await.unwrap();
    let brick_id = create_brick(&h, config.id, BrickStatus::NoState, None).await;

    let handle = h
        .manager
        .do_brick_deploy(RequestContext::admin(), brick_id)
        .await
        .unwrap();
    assert!(handle.join().await.is_err());

    // No partial state was persisted; a retry is safe
    let brick = h.store.get_brick(brick_id).await.unwrap();
    assert_eq!(brick.status, BrickStatus::NoState);
    assert!(brick.instance_id.is_none());
}

#[tokio::test]
async fn test_brick_destroy_simple() {
    let h = harness_with(FakeInfra::with_instances(&["inst-7"]), 8);
    let config = h.store.create_brickconfig(test_brickconfig()).await.unwrap();
    let brick_id = create_brick(&h, config.id, BrickStatus::DeployDone, Some("inst-7")).await;

    let handle = h
        .manager
        .do_brick_destroy(RequestContext::admin(), brick_id)
        .await
        .unwrap();
    handle.join().await.unwrap();

    assert!(matches!(
        h.store.get_brick(brick_id).await,
        Err(StoreError::BrickNotFound(_))
    ));
    assert!(!h.infra.state.lock().unwrap().instances.contains("inst-7"));
}

#[tokio::test]
async fn test_brick_destroy_tolerates_missing_instance() {
    // The instance is already gone at the provider
    let h = harness();
    let config = h.store.create_brickconfig(test_brickconfig()).await.unwrap();
    let brick_id = create_brick(&h, config.id, BrickStatus::DeployDone, Some("inst-gone")).await;

    let handle = h
        .manager
        .do_brick_destroy(RequestContext::admin(), brick_id)
        .await
        .unwrap();
    handle.join().await.unwrap();

    assert!(matches!(
        h.store.get_brick(brick_id).await,
        Err(StoreError::BrickNotFound(_))
    ));
}

#[tokio::test]
async fn test_brick_deploying_mark() {
    let h = harness();
    let config = h.store.create_brickconfig(test_brickconfig()).await.unwrap();
    let brick_id = create_brick(&h, config.id, BrickStatus::Init, Some("inst-1")).await;

    let handle = h
        .manager
        .do_brick_deploying(RequestContext::admin(), brick_id)
        .await
        .unwrap();
    handle.join().await.unwrap();

    let brick = h.store.get_brick(brick_id).await.unwrap();
    assert_eq!(brick.status, BrickStatus::Deploying);
}

#[tokio::test]
async fn test_brick_deployfail_mark() {
    let h = harness();
    let config = h.store.create_brickconfig(test_brickconfig()).await.unwrap();
    let brick_id = create_brick(&h, config.id, BrickStatus::Deploying, Some("inst-1")).await;

    let handle = h
        .manager
        .do_brick_deployfail(RequestContext::admin(), brick_id)
        .await
        .unwrap();
    handle.join().await.unwrap();

    let brick = h.store.get_brick(brick_id).await.unwrap();
    assert_eq!(brick.status, BrickStatus::DeployFail);
}

#[tokio::test]
async fn test_brick_deploydone_without_ip() {
    let h = harness();
    let config = h.store.create_brickconfig(test_brickconfig()).await.unwrap();
    let brick_id = create_brick(&h, config.id, BrickStatus::Deploying, Some("inst-1")).await;

    let handle = h
        .manager
        .do_brick_deploydone(RequestContext::admin(), brick_id)
        .await
        .unwrap();
    handle.join().await.unwrap();

    let brick = h.store.get_brick(brick_id).await.unwrap();
    assert_eq!(brick.status, BrickStatus::DeployDone);
    assert!(brick.deployed_at.is_some());
    assert!(h.infra.state.lock().unwrap().floating_ip_calls.is_empty());
}

#[tokio::test]
async fn test_brick_deploydone_with_ip() {
    let h = harness();
    let config = h.store.create_brickconfig(test_brickconfig()).await.unwrap();
    let brick_id = create_brick(&h, config.id, BrickStatus::Deploying, Some("inst-1")).await;

    let brick = h.store.get_brick(brick_id).await.unwrap();
    let mut configuration = brick.configuration.clone();
    configuration.insert(
        "floating_ip".to_string(),
        serde_json::Value::String("127.0.0.1".to_string()),
    );
    h.store
        .update_brick(
            brick_id,
            BrickUpdate {
                configuration: Some(configuration),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let handle = h
        .manager
        .do_brick_deploydone(RequestContext::admin(), brick_id)
        .await
        .unwrap();
    handle.join().await.unwrap();

    let brick = h.store.get_brick(brick_id).await.unwrap();
    assert_eq!(brick.status, BrickStatus::DeployDone);
    assert_eq!(
        h.infra.state.lock().unwrap().floating_ip_calls,
        vec![("inst-1".to_string(), "127.0.0.1".to_string())]
    );
}

#[tokio::test]
async fn test_report_task_simple() {
    let h = harness();
    let config = h.store.create_brickconfig(test_brickconfig()).await.unwrap();
    let brick_id = create_brick(&h, config.id, BrickStatus::Init, Some("inst-1")).await;

    h.manager
        .do_report_last_task(RequestContext::admin(), "inst-1", TaskStatus::Running)
        .await
        .unwrap();

    let brick = h.store.get_brick(brick_id).await.unwrap();
    assert_eq!(brick.status, BrickStatus::Deploying);
}

#[tokio::test]
async fn test_report_task_done_notifies_once() {
    let h = harness();
    let config = h.store.create_brickconfig(test_brickconfig()).await.unwrap();
    let brick_id = create_brick(&h, config.id, BrickStatus::Deploying, Some("inst-1")).await;

    h.manager
        .do_report_last_task(RequestContext::admin(), "inst-1", TaskStatus::Complete)
        .await
        .unwrap();
    h.manager.pool().wait_idle().await;

    let brick = h.store.get_brick(brick_id).await.unwrap();
    assert_eq!(brick.status, BrickStatus::DeployDone);
    assert_eq!(
        h.notifier.recipients.lock().unwrap().clone(),
        vec!["iamatenant".to_string()]
    );

    // The same report on a finished brick is a no-op with no second
    // notification
    h.manager
        .do_report_last_task(RequestContext::admin(), "inst-1", TaskStatus::Complete)
        .await
        .unwrap();
    h.manager.pool().wait_idle().await;

    let brick = h.store.get_brick(brick_id).await.unwrap();
    assert_eq!(brick.status, BrickStatus::DeployDone);
    assert_eq!(h.notifier.recipients.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_report_task_error_fails_deploy() {
    let h = harness();
    let config = h.store.create_brickconfig(test_brickconfig()).await.unwrap();
    let brick_id = create_brick(&h, config.id, BrickStatus::Deploying, Some("inst-1")).await;

    h.manager
        .do_report_last_task(RequestContext::admin(), "inst-1", TaskStatus::Error)
        .await
        .unwrap();

    let brick = h.store.get_brick(brick_id).await.unwrap();
    assert_eq!(brick.status, BrickStatus::DeployFail);
}

#[tokio::test]
async fn test_report_task_unrecognized_is_dropped() {
    let h = harness();
    let config = h.store.create_brickconfig(test_brickconfig()).await.unwrap();
    let brick_id = create_brick(&h, config.id, BrickStatus::NoState, Some("inst-1")).await;

    h.manager
        .do_report_last_task(RequestContext::admin(), "inst-1", TaskStatus::Running)
        .await
        .unwrap();

    let brick = h.store.get_brick(brick_id).await.unwrap();
    assert_eq!(brick.status, BrickStatus::NoState);

    // Unknown instances are dropped too
    h.manager
        .do_report_last_task(RequestContext::admin(), "inst-unknown", TaskStatus::Complete)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_templating_configfiles() {
    let h = harness();
    let config = h.store.create_brickconfig(test_brickconfig()).await.unwrap();
    h.store
        .create_configfile(NewConfigFile {
            brickconfig_uuid: config.id,
            name: "Dockerfile".to_string(),
            description: String::new(),
            contents: "ENV: {{ brickconfig.name }}".to_string(),
        })
        .await
        .unwrap();
    create_brick(&h, config.id, BrickStatus::Init, Some("inst-1")).await;

    let mut inbox = h.transport.serve(&Topics::mortar_shared()).await.unwrap();

    h.manager
        .initiate_initialized_bricks(RequestContext::admin())
        .await
        .unwrap();

    let delivery = tokio::time::timeout(Duration::from_secs(1), inbox.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(delivery.envelope.method, "do_execute");

    let args: ExecuteArgs = delivery.envelope.parse_args().unwrap();
    assert_eq!(args.task.instance_id, "inst-1");
    assert_eq!(
        args.task.files.get("Dockerfile").map(String::as_str),
        Some("ENV: abrickconfig")
    );
}

#[tokio::test]
async fn test_init_sweep_skips_brick_without_instance() {
    let h = harness();
    let config = h.store.create_brickconfig(test_brickconfig()).await.unwrap();
    create_brick(&h, config.id, BrickStatus::Init, None).await;

    let mut inbox = h.transport.serve(&Topics::mortar_shared()).await.unwrap();

    h.manager
        .initiate_initialized_bricks(RequestContext::admin())
        .await
        .unwrap();

    // Nothing dispatched for the stuck brick
    assert!(
        tokio::time::timeout(Duration::from_millis(100), inbox.recv())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_deploying_sweep_requests_last_task_check() {
    let h = harness();
    let config = h.store.create_brickconfig(test_brickconfig()).await.unwrap();
    create_brick(&h, config.id, BrickStatus::Deploying, Some("inst-1")).await;

    let mut inbox = h.transport.serve(&Topics::mortar_shared()).await.unwrap();

    h.manager
        .check_deploying_bricks(RequestContext::admin())
        .await
        .unwrap();

    let delivery = tokio::time::timeout(Duration::from_secs(1), inbox.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(delivery.envelope.method, "do_check_last_task");
}

#[tokio::test]
async fn test_tailing_brick_log() {
    let h = harness();
    let config = h.store.create_brickconfig(test_brickconfig()).await.unwrap();
    let brick_id = create_brick(&h, config.id, BrickStatus::DeployDone, Some("inst-1")).await;

    let mut inbox = h.transport.serve(&Topics::mortar_shared()).await.unwrap();
    tokio::spawn(async move {
        let delivery = inbox.recv().await.unwrap();
        let args: TailLogArgs = delivery.envelope.parse_args().unwrap();
        delivery.reply.unwrap().send(Ok(serde_json::json!({
            "instance_id": args.instance_id,
            "log": "asdf1234",
        })));
    });

    let log = h
        .manager
        .do_tail_brick_log(RequestContext::admin(), brick_id, 10)
        .await
        .unwrap();
    assert_eq!(log.log, "asdf1234");
}

#[tokio::test]
async fn test_check_deleted_instances() {
    let h = harness_with(FakeInfra::with_instances(&["inst-a", "inst-c"]), 8);
    let config = h.store.create_brickconfig(test_brickconfig()).await.unwrap();
    let brick_a = create_brick(&h, config.id, BrickStatus::DeployDone, Some("inst-a")).await;
    let brick_b = create_brick(&h, config.id, BrickStatus::DeployDone, Some("inst-b")).await;
    let brick_c = create_brick(&h, config.id, BrickStatus::DeployDone, Some("inst-c")).await;

    let handle = h
        .manager
        .check_for_deleted_instances(RequestContext::admin())
        .await
        .unwrap();
    assert_eq!(handle.join().await.unwrap(), 1);

    assert!(h.store.get_brick(brick_a).await.is_ok());
    assert!(matches!(
        h.store.get_brick(brick_b).await,
        Err(StoreError::BrickNotFound(_))
    ));
    assert!(h.store.get_brick(brick_c).await.is_ok());
}

#[tokio::test]
async fn test_set_bricks_versions() {
    let h = harness();
    let config = h.store.create_brickconfig(test_brickconfig()).await.unwrap();
    let brick_id = create_brick(&h, config.id, BrickStatus::DeployDone, Some("inst-1")).await;

    h.manager
        .set_bricks_versions(RequestContext::admin())
        .await
        .unwrap();

    let brick = h.store.get_brick(brick_id).await.unwrap();
    assert_eq!(brick.config_str("current_version"), Some("v0.0"));
}

#[tokio::test]
async fn test_saturated_pool_surfaces_capacity_error() {
    let h = harness_with(FakeInfra::default(), 0);
    let config = h.store.create_brickconfig(test_brickconfig()).await.unwrap();
    let brick_id = create_brick(&h, config.id, BrickStatus::Init, Some("inst-1")).await;

    let err = h
        .manager
        .do_brick_deploying(RequestContext::admin(), brick_id)
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert!(matches!(err, ConductorError::Pool(_)));
}
