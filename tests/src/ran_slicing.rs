//! RAN slicing tests
//!
//! Slice add/conf/remove commands sent by the controller over a live session.

use std::sync::{Arc, Mutex};

use emage_agent::{status, Agent, RanBackend};
use emage_common::{ModuleId, SliceId};
use emage_proto::{MessageBody, RanSetupReply, RanSliceConfig, SliceAck, SliceOp, SliceReply};
use integration_tests::{agent_config, init_test_logging, slice_config, MockConnection, MockController};

async fn started(agent: &mut Agent, ctrl: &MockController) -> MockConnection {
    agent.start().await.expect("start should succeed");
    let mut conn = ctrl.accept().await.unwrap();
    conn.expect_hello().await.unwrap();
    conn
}

fn slice_ack(op: SliceOp, slice_id: SliceId, status: i32) -> MessageBody {
    MessageBody::SliceAck(SliceAck {
        op,
        module_id: 0,
        slice_id,
        status,
    })
}

#[tokio::test]
async fn test_add_remove_then_conf_is_not_found() {
    init_test_logging();
    let ctrl = MockController::bind().await.unwrap();
    let mut agent = Agent::new(agent_config(7, ctrl.port()));
    let mut conn = started(&mut agent, &ctrl).await;

    let reply = conn
        .roundtrip(MessageBody::SliceAdd {
            module_id: 0,
            slice_id: 42,
            config: slice_config(vec![5, 9]),
        })
        .await
        .unwrap();
    assert_eq!(reply, slice_ack(SliceOp::Add, 42, status::OK));
    assert_eq!(agent.slice_config(0, 42), Some(slice_config(vec![5, 9])));

    let reply = conn
        .roundtrip(MessageBody::SliceRemove {
            module_id: 0,
            slice_id: 42,
        })
        .await
        .unwrap();
    assert_eq!(reply, slice_ack(SliceOp::Remove, 42, status::OK));

    let reply = conn
        .roundtrip(MessageBody::SliceConf {
            module_id: 0,
            slice_id: 42,
            config: slice_config(vec![5]),
        })
        .await
        .unwrap();
    assert_eq!(reply, slice_ack(SliceOp::Conf, 42, status::NOT_FOUND));
    assert_eq!(agent.slice_config(0, 42), None);

    agent.terminate().await.unwrap();
}

#[tokio::test]
async fn test_double_add_keeps_original_config() {
    init_test_logging();
    let ctrl = MockController::bind().await.unwrap();
    let mut agent = Agent::new(agent_config(7, ctrl.port()));
    let mut conn = started(&mut agent, &ctrl).await;

    for (users, expected) in [(vec![5, 9], status::OK), (vec![1], status::ALREADY_EXISTS)] {
        let reply = conn
            .roundtrip(MessageBody::SliceAdd {
                module_id: 0,
                slice_id: 42,
                config: slice_config(users),
            })
            .await
            .unwrap();
        assert_eq!(reply, slice_ack(SliceOp::Add, 42, expected));
    }

    let reply = conn
        .roundtrip(MessageBody::SliceRequest {
            module_id: 0,
            slice_id: 42,
        })
        .await
        .unwrap();
    assert_eq!(
        reply,
        MessageBody::SliceReply(SliceReply {
            module_id: 0,
            slice_id: 42,
            status: status::OK,
            config: Some(slice_config(vec![5, 9])),
        })
    );

    agent.terminate().await.unwrap();
}

#[tokio::test]
async fn test_setup_request_lists_slices() {
    init_test_logging();
    let ctrl = MockController::bind().await.unwrap();
    let mut agent = Agent::new(agent_config(7, ctrl.port()));
    let mut conn = started(&mut agent, &ctrl).await;

    let reply = conn
        .roundtrip(MessageBody::RanSetupRequest { module_id: 0 })
        .await
        .unwrap();
    assert_eq!(
        reply,
        MessageBody::RanSetupReply(RanSetupReply {
            module_id: 0,
            status: status::OK,
            slice_ids: vec![],
        })
    );

    for slice_id in [9, 3] {
        conn.roundtrip(MessageBody::SliceAdd {
            module_id: 0,
            slice_id,
            config: slice_config(vec![]),
        })
        .await
        .unwrap();
    }

    let reply = conn
        .roundtrip(MessageBody::RanSetupRequest { module_id: 0 })
        .await
        .unwrap();
    assert!(matches!(
        reply,
        MessageBody::RanSetupReply(RanSetupReply { ref slice_ids, .. }) if slice_ids == &vec![3, 9]
    ));

    agent.terminate().await.unwrap();
}

#[tokio::test]
async fn test_invalid_config_is_refused() {
    init_test_logging();
    let ctrl = MockController::bind().await.unwrap();
    let mut agent = Agent::new(agent_config(7, ctrl.port()));
    let mut conn = started(&mut agent, &ctrl).await;

    let reply = conn
        .roundtrip(MessageBody::SliceAdd {
            module_id: 0,
            slice_id: 1,
            config: slice_config(vec![4, 4]),
        })
        .await
        .unwrap();
    assert_eq!(reply, slice_ack(SliceOp::Add, 1, status::INVALID));
    assert_eq!(agent.slice_config(0, 1), None);

    let reply = conn
        .roundtrip(MessageBody::SliceRequest {
            module_id: 0,
            slice_id: 1,
        })
        .await
        .unwrap();
    assert!(matches!(
        reply,
        MessageBody::SliceReply(SliceReply { status: status::NOT_FOUND, config: None, .. })
    ));

    agent.terminate().await.unwrap();
}

/// Scheduler stand-in that refuses slices with more than `max_users` users
struct CapacityBackend {
    max_users: usize,
    applied: Arc<Mutex<Vec<(ModuleId, SliceId)>>>,
}

impl RanBackend for CapacityBackend {
    fn apply_slice(
        &mut self,
        module_id: ModuleId,
        slice_id: SliceId,
        config: &RanSliceConfig,
    ) -> Result<(), String> {
        if config.users.len() > self.max_users {
            return Err(format!("{} users exceed capacity", config.users.len()));
        }
        self.applied.lock().unwrap().push((module_id, slice_id));
        Ok(())
    }

    fn remove_slice(&mut self, _module_id: ModuleId, _slice_id: SliceId) -> Result<(), String> {
        Ok(())
    }
}

#[tokio::test]
async fn test_backend_refusal_is_reported() {
    init_test_logging();
    let ctrl = MockController::bind().await.unwrap();
    let mut agent = Agent::new(agent_config(7, ctrl.port()));
    let applied = Arc::new(Mutex::new(Vec::new()));
    agent.set_ran_backend(CapacityBackend {
        max_users: 2,
        applied: Arc::clone(&applied),
    });
    let mut conn = started(&mut agent, &ctrl).await;

    let reply = conn
        .roundtrip(MessageBody::SliceAdd {
            module_id: 0,
            slice_id: 1,
            config: slice_config(vec![1, 2]),
        })
        .await
        .unwrap();
    assert_eq!(reply, slice_ack(SliceOp::Add, 1, status::OK));

    let reply = conn
        .roundtrip(MessageBody::SliceConf {
            module_id: 0,
            slice_id: 1,
            config: slice_config(vec![1, 2, 3]),
        })
        .await
        .unwrap();
    assert_eq!(reply, slice_ack(SliceOp::Conf, 1, status::GENERIC));
    assert_eq!(agent.slice_config(0, 1), Some(slice_config(vec![1, 2])));
    assert_eq!(*applied.lock().unwrap(), vec![(0, 1)]);

    agent.terminate().await.unwrap();
}
