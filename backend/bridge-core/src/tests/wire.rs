// Unit tests for wire frame classification.

use crate::error::BridgeError;
use crate::wire::{Incoming, Outgoing, ReplyFrame, RequestFrame, RequestId};

use serde_json::{Value, json};

/// **VALUE**: Verifies outgoing requests use the `{id, method, params}` shape.
///
/// **WHY THIS MATTERS**: Hosts parse these keys literally; a renamed field breaks every call.
///
/// **BUG THIS CATCHES**: serde renames or an extra wrapper object.
#[test]
fn given_request_when_encoded_then_flat_id_method_params() {
    // GIVEN: A request
    let frame = Outgoing::Request(RequestFrame {
        id: RequestId::from("r1"),
        method: "getFields".to_string(),
        params: json!({"panel": 1}),
    });

    // WHEN: Encoding
    let bytes = frame.encode().expect("encode");
    let value: Value = serde_json::from_slice(&bytes).expect("json");

    // THEN: Flat shape
    assert_eq!(value, json!({"id": "r1", "method": "getFields", "params": {"panel": 1}}));
}

/// **VALUE**: Verifies batch frames carry `batchId` in camelCase.
#[test]
fn given_batch_json_when_decoded_as_outgoing_then_batch_with_items_in_order() {
    // GIVEN: A host-side view of a batch frame
    let raw = br#"{"batchId":"b1","items":[
        {"id":"a","method":"m1","params":null},
        {"id":"b","method":"m2","params":[1]}
    ]}"#;

    // WHEN: Decoding
    let decoded = Outgoing::decode(raw).expect("decode");

    // THEN: Items keep their order
    match decoded {
        Outgoing::Batch(batch) => {
            assert_eq!(batch.batch_id, "b1");
            let ids: Vec<&str> = batch.items.iter().map(|i| i.id.as_str()).collect();
            assert_eq!(ids, ["a", "b"]);
        }
        other => panic!("expected batch, got {other:?}"),
    }
}

/// **VALUE**: Verifies incoming frames are classified by their distinguishing key.
///
/// **WHY THIS MATTERS**: A push misread as a reply is dropped as unmatched; a pong misread as
/// anything breaks liveness and eventually tears down a healthy connection.
///
/// **BUG THIS CATCHES**: Checking `topic` before `id`, which would turn topic-tagged replies
/// into pushes.
#[test]
fn given_each_incoming_shape_when_decoded_then_classified() {
    let reply = Incoming::decode(br#"{"id":"r1","ok":true,"value":42,"topic":"t"}"#).expect("reply");
    let push = Incoming::decode(br#"{"topic":"fieldsUpdated","payload":{"n":1}}"#).expect("push");
    let pong = Incoming::decode(br#"{"pong":7}"#).expect("pong");
    let batch =
        Incoming::decode(br#"{"batchId":"b","items":[{"id":"x","ok":false,"error":"nope"}]}"#)
            .expect("batch");

    assert!(matches!(reply, Incoming::Reply(ref r) if r.topic.as_deref() == Some("t")));
    assert!(matches!(push, Incoming::Push(ref p) if p.topic == "fieldsUpdated"));
    assert_eq!(pong, Incoming::Pong(7));
    assert!(matches!(batch, Incoming::BatchReply(ref b) if b.items.len() == 1 && !b.items[0].ok));
}

/// **VALUE**: Verifies malformed frames become protocol errors rather than panics.
#[test]
fn given_malformed_frames_when_decoded_then_protocol_error() {
    let cases: [&[u8]; 4] = [
        b"not json",
        b"[1,2,3]",
        br#"{"something":"else"}"#,
        br#"{"id":"r1","ok":"yes"}"#,
    ];

    for raw in cases {
        let err = Incoming::decode(raw).expect_err("should fail");
        assert!(
            matches!(err, BridgeError::Protocol { .. }),
            "{:?} gave {err:?}",
            String::from_utf8_lossy(raw)
        );
    }
}

/// **VALUE**: Verifies `ok: false` maps to a host error carrying the payload verbatim.
///
/// **BUG THIS CATCHES**: Wrapping or stringifying the host's structured error.
#[test]
fn given_failure_reply_when_converted_then_host_error_with_payload() {
    // GIVEN: A failure reply with a structured error
    let payload = json!({"code": "E_LOCKED", "detail": {"by": "someone"}});
    let reply = ReplyFrame::failure(RequestId::from("r1"), payload.clone());

    // WHEN: Converting to a result
    let err = reply.into_result().expect_err("ok: false");

    // THEN: Payload is passed through
    assert_eq!(err.host_payload(), Some(&payload));
    assert!(!err.is_retryable());
}

/// **VALUE**: Verifies a success reply without `value` resolves to null.
#[test]
fn given_success_without_value_when_converted_then_null() {
    let reply = Incoming::decode(br#"{"id":"r1","ok":true}"#).expect("decode");
    let Incoming::Reply(reply) = reply else {
        panic!("expected reply");
    };
    assert_eq!(reply.into_result().expect("ok"), Value::Null);
}
