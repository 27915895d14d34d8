//! Event dispatch tests
//!
//! Controller requests reaching handlers through a live session: ordering,
//! aggregated acks, trigger bookkeeping and agent-originated reports.

use std::sync::{Arc, Mutex};

use bytes::Bytes;

use emage_agent::{
    status, Agent, AgentOps, Event, EventHandler, EventKind, HandlerError, HandlerResult, Outbox,
    TriggerKind,
};
use emage_common::{ModuleId, TriggerId};
use emage_proto::{CellMeasure, EmageMessage, EventAck, HandoverUe, MessageBody, Report, UeMeasure};
use integration_tests::{agent_config, init_test_logging, MockConnection, MockController};

async fn started(agent: &mut Agent, ctrl: &MockController) -> MockConnection {
    agent.start().await.expect("start should succeed");
    let mut conn = ctrl.accept().await.unwrap();
    conn.expect_hello().await.unwrap();
    conn
}

fn ack(kind: EventKind, status: i32) -> MessageBody {
    MessageBody::EventAck(EventAck { kind, status })
}

fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> Box<dyn EventHandler> {
    let log = Arc::clone(log);
    Box::new(move |event: &Event, _: &mut Outbox| -> HandlerResult {
        log.lock().unwrap().push(format!("{tag}:{event}"));
        Ok(())
    })
}

#[tokio::test]
async fn test_handlers_run_in_registration_order() {
    init_test_logging();
    let ctrl = MockController::bind().await.unwrap();
    let mut agent = Agent::new(agent_config(7, ctrl.port()));
    let log = Arc::new(Mutex::new(Vec::new()));
    agent.register_to(
        EventKind::UeReport,
        [recorder(&log, "h1"), recorder(&log, "h2")],
    );
    let mut conn = started(&mut agent, &ctrl).await;

    let reply = conn
        .roundtrip(MessageBody::UeReport {
            module_id: 0,
            trigger_id: 4,
        })
        .await
        .unwrap();

    assert_eq!(reply, ack(EventKind::UeReport, status::OK));
    assert_eq!(
        *log.lock().unwrap(),
        vec!["h1:UE_REPORT".to_string(), "h2:UE_REPORT".to_string()]
    );
    assert!(agent.has_trigger(4));
    assert!(agent.has_trigger_of(4, TriggerKind::UeReport));

    agent.terminate().await.unwrap();
    assert!(!agent.has_trigger(4));
}

#[tokio::test]
async fn test_first_failure_is_reported_and_later_handlers_run() {
    init_test_logging();
    let ctrl = MockController::bind().await.unwrap();
    let mut agent = Agent::new(agent_config(7, ctrl.port()));
    let log = Arc::new(Mutex::new(Vec::new()));
    agent.register_fn(EventKind::EnbSetupRequest, |_, _| {
        Err(HandlerError::with_code(status::NOT_FOUND, "no such module"))
    });
    agent.register_fn(EventKind::EnbSetupRequest, |_, _| panic!("broken handler"));
    agent.register_to(EventKind::EnbSetupRequest, [recorder(&log, "last")]);
    let mut conn = started(&mut agent, &ctrl).await;

    let reply = conn
        .roundtrip(MessageBody::EnbSetupRequest { module_id: 9 })
        .await
        .unwrap();
    assert_eq!(reply, ack(EventKind::EnbSetupRequest, status::NOT_FOUND));
    assert_eq!(log.lock().unwrap().len(), 1);

    // Session survives the panic
    let reply = conn
        .roundtrip(MessageBody::CellSetupRequest { cell_id: 1 })
        .await
        .unwrap();
    assert_eq!(reply, ack(EventKind::CellSetupRequest, status::OK));

    agent.terminate().await.unwrap();
}

#[tokio::test]
async fn test_cell_measure_reaches_only_its_handlers() {
    init_test_logging();
    let ctrl = MockController::bind().await.unwrap();
    let mut agent = Agent::new(agent_config(7, ctrl.port()));
    let log = Arc::new(Mutex::new(Vec::new()));
    agent.register_to(EventKind::HandoverUe, [recorder(&log, "handover")]);
    agent.register_to(EventKind::CellMeasure, [recorder(&log, "measure")]);
    let mut conn = started(&mut agent, &ctrl).await;

    let reply = conn
        .roundtrip(MessageBody::CellMeasure(CellMeasure {
            cell_id: 1,
            module_id: 0,
            interval: 1000,
            trigger_id: 21,
        }))
        .await
        .unwrap();

    assert_eq!(reply, ack(EventKind::CellMeasure, status::OK));
    assert_eq!(*log.lock().unwrap(), vec!["measure:CELL_MEASURE".to_string()]);
    assert!(agent.has_trigger_of(21, TriggerKind::CellMeasure));

    agent.terminate().await.unwrap();
}

#[tokio::test]
async fn test_malformed_frames_do_not_end_the_session() {
    init_test_logging();
    let ctrl = MockController::bind().await.unwrap();
    let mut agent = Agent::new(agent_config(7, ctrl.port()));
    let mut conn = started(&mut agent, &ctrl).await;

    // Truncated header, unknown type, wrong version
    conn.send_raw(Bytes::from_static(&[1, 0x10, 0])).await.unwrap();
    conn.send_raw(Bytes::from_static(&[1, 0x7f, 0, 0, 0, 0, 0, 0, 0, 7, 0, 0, 0, 1]))
        .await
        .unwrap();
    conn.send_raw(Bytes::from_static(&[9, 0x10, 0, 0, 0, 0, 0, 0, 0, 7, 0, 0, 0, 1, 0, 0, 0, 0]))
        .await
        .unwrap();

    let reply = conn
        .roundtrip(MessageBody::EnbSetupRequest { module_id: 0 })
        .await
        .unwrap();
    assert_eq!(reply, ack(EventKind::EnbSetupRequest, status::OK));
    assert!(agent.is_connected());

    agent.terminate().await.unwrap();
}

#[tokio::test]
async fn test_requests_for_other_enb_are_dropped() {
    init_test_logging();
    let ctrl = MockController::bind().await.unwrap();
    let mut agent = Agent::new(agent_config(7, ctrl.port()));
    let log = Arc::new(Mutex::new(Vec::new()));
    agent.register_to(EventKind::EnbSetupRequest, [recorder(&log, "setup")]);
    let mut conn = started(&mut agent, &ctrl).await;

    conn.send_message(EmageMessage::new(8, 100, MessageBody::EnbSetupRequest { module_id: 0 }))
        .await
        .unwrap();
    let reply = conn
        .roundtrip(MessageBody::EnbSetupRequest { module_id: 1 })
        .await
        .unwrap();

    assert_eq!(reply, ack(EventKind::EnbSetupRequest, status::OK));
    assert_eq!(log.lock().unwrap().len(), 1);

    agent.terminate().await.unwrap();
}

#[tokio::test]
async fn test_trigger_reuse_and_deletion() {
    init_test_logging();
    let ctrl = MockController::bind().await.unwrap();
    let mut agent = Agent::new(agent_config(7, ctrl.port()));
    let mut conn = started(&mut agent, &ctrl).await;

    let request = MessageBody::UeMeasure(UeMeasure {
        module_id: 0,
        trigger_id: 30,
        measure_id: 1,
        rnti: 0x4601,
        earfcn: 3400,
        interval: 240,
        max_cells: 8,
        max_measures: 4,
    });

    let reply = conn.roundtrip(request.clone()).await.unwrap();
    assert_eq!(reply, ack(EventKind::UeMeasure, status::OK));
    assert!(agent.has_trigger_of(30, TriggerKind::RrcMeasure));

    let reply = conn.roundtrip(request.clone()).await.unwrap();
    assert_eq!(reply, ack(EventKind::UeMeasure, status::ALREADY_EXISTS));

    assert!(agent.del_trigger(30));
    assert!(!agent.del_trigger(30));
    let reply = conn.roundtrip(request).await.unwrap();
    assert_eq!(reply, ack(EventKind::UeMeasure, status::OK));

    // One-shot requests are never installed
    let reply = conn
        .roundtrip(MessageBody::UeReport {
            module_id: 0,
            trigger_id: -1,
        })
        .await
        .unwrap();
    assert_eq!(reply, ack(EventKind::UeReport, status::OK));
    assert!(!agent.has_trigger(-1));

    agent.terminate().await.unwrap();
}

#[tokio::test]
async fn test_reports_follow_ack() {
    init_test_logging();
    let ctrl = MockController::bind().await.unwrap();
    let mut agent = Agent::new(agent_config(7, ctrl.port()));
    agent.register_fn(EventKind::UeReport, |event, outbox| match event {
        Event::UeReport { trigger_id, .. } => outbox.report(*trigger_id, Bytes::from_static(b"ues:1")),
        _ => Ok(()),
    });
    let mut conn = started(&mut agent, &ctrl).await;

    let seq = conn
        .request(MessageBody::UeReport {
            module_id: 0,
            trigger_id: 2,
        })
        .await
        .unwrap();
    let first = conn.recv().await.unwrap();
    assert_eq!(first.seq, seq);
    assert_eq!(first.body, ack(EventKind::UeReport, status::OK));
    let second = conn.recv().await.unwrap();
    assert_eq!(
        second.body,
        MessageBody::Report(Report {
            trigger_id: 2,
            payload: Bytes::from_static(b"ues:1"),
        })
    );

    // Owner-side report on the installed trigger
    agent.report(2, &b"ues:2"[..]).await.unwrap();
    let third = conn.recv().await.unwrap();
    assert!(matches!(third.body, MessageBody::Report(ref r) if r.payload == Bytes::from_static(b"ues:2")));

    let err = agent.report(3, &b"x"[..]).await.unwrap_err();
    assert_eq!(err.status(), status::NOT_FOUND);

    agent.terminate().await.unwrap();
}

#[derive(Default)]
struct RecordingOps {
    calls: Vec<String>,
}

impl AgentOps for RecordingOps {
    fn init(&mut self, _outbox: &mut Outbox) -> HandlerResult {
        self.calls.push("init".to_string());
        Ok(())
    }

    fn release(&mut self, _outbox: &mut Outbox) -> HandlerResult {
        self.calls.push("release".to_string());
        Ok(())
    }

    fn ue_report(
        &mut self,
        module_id: ModuleId,
        trigger_id: TriggerId,
        _outbox: &mut Outbox,
    ) -> HandlerResult {
        self.calls.push(format!("ue_report {module_id} {trigger_id}"));
        Ok(())
    }

    fn handover_ue(&mut self, request: &HandoverUe, _outbox: &mut Outbox) -> HandlerResult {
        self.calls.push(format!("handover {}", request.rnti));
        Err(HandlerError::with_code(status::INVALID, "target cell unknown"))
    }
}

#[tokio::test]
async fn test_agent_ops_capability_set() {
    init_test_logging();
    let ctrl = MockController::bind().await.unwrap();
    let mut agent = Agent::new(agent_config(7, ctrl.port()));
    let ops = agent.register_ops(RecordingOps::default());
    let mut conn = started(&mut agent, &ctrl).await;

    let reply = conn
        .roundtrip(MessageBody::UeReport {
            module_id: 1,
            trigger_id: 5,
        })
        .await
        .unwrap();
    assert_eq!(reply, ack(EventKind::UeReport, status::OK));

    let reply = conn
        .roundtrip(MessageBody::HandoverUe(HandoverUe {
            module_id: 0,
            source_cell: 1,
            rnti: 70,
            target_enb: 8,
            target_cell: 2,
            cause: 0,
        }))
        .await
        .unwrap();
    assert_eq!(reply, ack(EventKind::HandoverUe, status::INVALID));

    // Unimplemented methods ack by default
    let reply = conn
        .roundtrip(MessageBody::CellSetupRequest { cell_id: 1 })
        .await
        .unwrap();
    assert_eq!(reply, ack(EventKind::CellSetupRequest, status::OK));

    agent.terminate().await.unwrap();
    assert_eq!(
        ops.lock().unwrap().calls,
        vec!["init", "ue_report 1 5", "handover 70", "release"]
    );
}
