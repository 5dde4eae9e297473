//! Frame codec vector tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::fs;

use lobbysync_core::protocol::{EntityOp, Frame};

use vector_loader::TestVector;

fn load(name: &str) -> TestVector {
    let s = fs::read_to_string(format!("tests/vectors/{name}")).unwrap();
    serde_json::from_str(&s).unwrap()
}

#[test]
fn frame_vectors() {
    let files = [
        "keepalive.json",
        "close_reason.json",
        "sync_request.json",
        "list_add_ref.json",
        "object_remove_prop.json",
        "malformed_json.json",
        "missing_type.json",
    ];

    for f in files {
        let v = load(f);
        let raw = v.frame.decode();
        let res = Frame::decode(&raw);

        if let Some(err) = v.expect_error {
            let e = res.expect_err("expected error");
            assert_eq!(e.code().as_str(), err.code, "vector={}", v.description);
            continue;
        }

        let frame = res.expect("expected ok frame");
        let ex = v.expect.expect("missing expect block");

        match ex["kind"].as_str().unwrap() {
            "keepalive" => {
                assert_eq!(frame, Frame::Keepalive(raw.clone()), "vector={}", v.description);
            }
            "close" => {
                let Frame::Close { reason } = frame else {
                    panic!("expected close, vector={}", v.description);
                };
                assert_eq!(reason.as_deref(), ex["reason"].as_str(), "vector={}", v.description);
            }
            "payload" => {
                let Frame::Payload(p) = frame else {
                    panic!("expected payload, vector={}", v.description);
                };
                assert_eq!(p.app_id as u64, ex["a"].as_u64().unwrap(), "vector={}", v.description);
                assert_eq!(p.msg_type, ex["t"].as_str().unwrap(), "vector={}", v.description);
                assert_eq!(p.correlation_id.as_deref(), ex["u"].as_str(), "vector={}", v.description);

                if let Some(d) = ex.get("d") {
                    assert_eq!(&p.data, d, "vector={}", v.description);
                }
                if let Some(op) = ex.get("op") {
                    let decoded = EntityOp::from_value(p.data.clone()).unwrap();
                    assert_eq!(&decoded.to_value().unwrap(), op, "vector={}", v.description);
                }
            }
            other => panic!("unknown expected kind {other}"),
        }
    }
}
