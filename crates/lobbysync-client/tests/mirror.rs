#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use common::{record, settle, Peer};
use lobbysync_client::{EntityMirror, EntityUpdate, UpdateKind};
use lobbysync_core::protocol::{item_ref, EntityKind, EntityOp, Payload};

fn op(app_id: u32, kind: EntityKind, op: EntityOp) -> Payload {
    Payload::new(app_id, kind.tag(), op.to_value().unwrap())
}

fn offline_mirror() -> EntityMirror {
    let (socket, _connector, _peers) = common::socket();
    EntityMirror::new(socket)
}

/// Serve one `@SE` round-trip: push `snapshots`, then answer `@OK`.
async fn serve_sync(peer: &mut Peer, snapshots: &[(u32, EntityKind, EntityOp)]) {
    let request = peer.recv().await;
    assert_eq!(request.msg_type, "@SE");
    for (app_id, kind, snapshot) in snapshots {
        peer.send_op(*app_id, *kind, snapshot.clone());
    }
    peer.answer(&request, json!("@OK"));
}

#[test]
fn every_applied_op_stores_a_fresh_value() {
    let mirror = offline_mirror();
    assert!(mirror.apply(&op(1, EntityKind::Object, EntityOp::create("o", json!({ "a": 1 }), None))));
    let before = mirror.get(1, "o").unwrap();

    assert!(mirror.apply(&op(1, EntityKind::Object, EntityOp::mutate_prop("o", "b", json!(2), None))));
    let after = mirror.get(1, "o").unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(*before, json!({ "a": 1 }));
    assert_eq!(*after, json!({ "a": 1, "b": 2 }));

    assert!(mirror.apply(&op(1, EntityKind::Object, EntityOp::remove_prop("o", "a", None))));
    assert_eq!(mirror.get_value(1, "o", false), Some(json!({ "b": 2 })));

    assert!(mirror.apply(&op(1, EntityKind::Object, EntityOp::destroy("o"))));
    assert!(mirror.get(1, "o").is_none());
    assert!(!mirror.apply(&op(1, EntityKind::Object, EntityOp::destroy("o"))));
}

#[test]
fn list_ops_edit_by_index() {
    let mirror = offline_mirror();
    mirror.apply(&op(0, EntityKind::List, EntityOp::create("l", json!([10, 20, 30]), None)));

    assert!(mirror.apply(&op(0, EntityKind::List, EntityOp::remove_index("l", 1))));
    assert_eq!(mirror.get_value(0, "l", true), Some(json!([10, 30])));

    mirror.apply(&op(0, EntityKind::List, EntityOp::add_item("l", json!({ "n": "x" }))));
    mirror.apply(&op(0, EntityKind::List, EntityOp::mutate_index("l", 0, json!(11))));
    mirror.apply(&op(0, EntityKind::List, EntityOp::mutate_nested_prop("l", 2, "ready", json!(true))));
    assert_eq!(
        mirror.get_value(0, "l", false),
        Some(json!([11, 30, { "n": "x", "ready": true }]))
    );

    assert!(!mirror.apply(&op(0, EntityKind::List, EntityOp::remove_index("l", 9))));
    assert!(!mirror.apply(&op(0, EntityKind::List, EntityOp::mutate_nested_prop("l", 0, "p", json!(1)))));
}

#[test]
fn ops_for_unknown_entities_are_dropped() {
    let mirror = offline_mirror();
    let (updates, listener) = record::<EntityUpdate>();
    mirror.on_updated().add(listener);

    assert!(!mirror.apply(&op(0, EntityKind::Object, EntityOp::mutate_prop("ghost", "x", json!(1), None))));
    assert!(!mirror.apply(&Payload::new(0, "@SO", json!({ "a": "C", "k": "novalue" }))));
    assert!(!mirror.apply(&Payload::new(0, "@SO", json!("garbage"))));
    assert!(!mirror.apply(&Payload::new(0, "chat", json!({}))));
    assert!(mirror.is_empty());
    assert!(updates.lock().unwrap().is_empty());
}

#[test]
fn nested_changes_also_notify_the_list() {
    let mirror = offline_mirror();
    let (updates, listener) = record::<EntityUpdate>();
    mirror.on_updated().add(listener);

    mirror.apply(&op(0, EntityKind::List, EntityOp::create("L", json!([]), None)));
    mirror.apply(&op(0, EntityKind::Object, EntityOp::create("O", json!({ "hp": 1 }), Some("L"))));
    mirror.apply(&op(0, EntityKind::List, EntityOp::add_item("L", item_ref("O"))));
    updates.lock().unwrap().clear();

    mirror.apply(&op(0, EntityKind::Object, EntityOp::mutate_prop("O", "hp", json!(2), Some("L"))));

    let update = |key: &str| EntityUpdate {
        app_id: 0,
        key: key.to_owned(),
        kind: UpdateKind::Mutate,
    };
    assert_eq!(*updates.lock().unwrap(), vec![update("O"), update("L")]);
    assert_eq!(mirror.get_value(0, "L", true), Some(json!([{ "hp": 2 }])));
}

#[test]
fn unresolved_references_are_left_out() {
    let mirror = offline_mirror();
    mirror.apply(&op(
        2,
        EntityKind::List,
        EntityOp::create("L", json!([1, item_ref("missing"), item_ref("here")]), None),
    ));
    mirror.apply(&op(2, EntityKind::Object, EntityOp::create("here", json!({ "ok": true }), Some("L"))));

    assert_eq!(mirror.get_value(2, "L", true), Some(json!([1, { "ok": true }])));
    assert_eq!(
        mirror.get_value(2, "L", false),
        Some(json!([1, { "ref": "missing" }, { "ref": "here" }]))
    );
    assert_eq!(mirror.get_all()[&2]["L"], json!([1, { "ok": true }]));
    assert!(mirror.get_value(3, "L", true).is_none());
}

#[tokio::test(start_paused = true)]
async fn start_rebuilds_from_a_full_sync() {
    let (socket, _connector, mut peers) = common::socket();
    let mirror = EntityMirror::new(socket.clone());
    let (synced, listener) = record::<bool>();
    mirror.on_synced().add(listener);

    let err = mirror.start().await.unwrap_err();
    assert_eq!(err.code().as_str(), "NOT_CONNECTED");

    socket.connect().await.unwrap();
    let mut peer = peers.recv().await.unwrap();

    let players = (0, EntityKind::List, EntityOp::create("players", json!(["a", "b"]), None));
    let snapshots = [players];
    let (started, ()) = tokio::join!(mirror.start(), serve_sync(&mut peer, &snapshots));
    started.unwrap();

    assert!(mirror.is_started());
    assert!(!mirror.is_syncing());
    assert_eq!(mirror.get_value(0, "players", true), Some(json!(["a", "b"])));
    assert_eq!(*synced.lock().unwrap(), vec![true]);
    assert!(mirror.start().await.is_err());

    peer.send_op(0, EntityKind::List, EntityOp::add_item("players", json!("c")));
    settle().await;
    assert_eq!(mirror.get_value(0, "players", true), Some(json!(["a", "b", "c"])));
}

#[tokio::test(start_paused = true)]
async fn rejected_start_unsubscribes() {
    let (socket, _connector, mut peers) = common::socket();
    let mirror = EntityMirror::new(socket.clone());
    socket.connect().await.unwrap();
    let mut peer = peers.recv().await.unwrap();

    let (started, ()) = tokio::join!(mirror.start(), async {
        let request = peer.recv().await;
        peer.answer(&request, Value::Null);
    });
    assert!(started.is_err());
    assert!(!mirror.is_started());
    assert!(!mirror.is_syncing());
    assert!(socket.on_payload().is_empty());
    assert_eq!(socket.on_connection_updated().len(), 0);
}

#[tokio::test(start_paused = true)]
async fn start_times_out_without_an_answer() {
    let (socket, _connector, _peers) = common::socket();
    let mirror = EntityMirror::new(socket.clone());
    socket.connect().await.unwrap();

    let err = mirror.start().await.unwrap_err();
    assert_eq!(err.code().as_str(), "TIMEOUT");
    assert!(socket.on_payload().is_empty());
    assert!(!mirror.is_syncing());
}

#[tokio::test(start_paused = true)]
async fn reconnection_runs_a_fresh_sync() {
    let (socket, _connector, mut peers) = common::socket();
    let mirror = EntityMirror::new(socket.clone());
    let (synced, listener) = record::<bool>();
    mirror.on_synced().add(listener);
    socket.connect().await.unwrap();
    let mut peer = peers.recv().await.unwrap();

    let old = (0, EntityKind::Object, EntityOp::create("old", json!({ "v": 1 }), None));
    let snapshots = [old];
    let (started, ()) = tokio::join!(mirror.start(), serve_sync(&mut peer, &snapshots));
    started.unwrap();

    peer.close(None);
    settle().await;
    assert_eq!(*synced.lock().unwrap(), vec![true, false]);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    let mut peer = peers.recv().await.unwrap();
    assert!(mirror.is_syncing());
    assert!(mirror.get(0, "old").is_none());

    let new = (0, EntityKind::Object, EntityOp::create("new", json!({ "v": 2 }), None));
    serve_sync(&mut peer, &[new]).await;
    settle().await;

    assert_eq!(*synced.lock().unwrap(), vec![true, false, true]);
    assert!(!mirror.is_syncing());
    assert!(mirror.get(0, "old").is_none());
    assert_eq!(mirror.get_value(0, "new", true), Some(json!({ "v": 2 })));
}

#[tokio::test(start_paused = true)]
async fn stop_clears_and_unsubscribes() {
    let (socket, _connector, mut peers) = common::socket();
    let mirror = EntityMirror::new(socket.clone());
    let (synced, listener) = record::<bool>();
    mirror.on_synced().add(listener);
    assert!(mirror.stop().is_err());

    socket.connect().await.unwrap();
    let mut peer = peers.recv().await.unwrap();
    let seed = (0, EntityKind::Object, EntityOp::create("o", json!({}), None));
    let snapshots = [seed];
    let (started, ()) = tokio::join!(mirror.start(), serve_sync(&mut peer, &snapshots));
    started.unwrap();
    assert_eq!(mirror.len(), 1);

    mirror.stop().unwrap();
    assert!(mirror.is_empty());
    assert!(!mirror.is_started());
    assert!(socket.on_payload().is_empty());
    assert_eq!(*synced.lock().unwrap(), vec![true, false]);
    assert!(mirror.stop().is_err());
}
