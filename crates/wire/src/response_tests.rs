// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn ok_response_has_result_key_only() {
    let response = Response::ok(5, serde_json::json!({"state": "running"}));
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["id"], 5);
    assert_eq!(json["result"]["state"], "running");
    assert!(json.get("error").is_none());
}

#[test]
fn error_response_has_code_and_message() {
    let response = Response::error(9, ErrorKind::NotFound, "no such process: ghost");
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["error"]["code"], 103);
    assert_eq!(json["error"]["message"], "no such process: ghost");
    assert!(json["error"].get("data").is_none());
}

#[test]
fn circuit_open_carries_retry_hint() {
    let response = Response::error_with_data(
        2,
        ErrorKind::CircuitOpen,
        "start refused",
        serde_json::json!({"retryAfterMs": 4000}),
    );
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["error"]["code"], 105);
    assert_eq!(json["error"]["data"]["retryAfterMs"], 4000);
}

#[test]
fn outcome_deserializes_untagged() {
    let ok: Response = serde_json::from_str(r#"{"id": 1, "result": 42}"#).unwrap();
    assert!(!ok.is_error());

    let err: Response =
        serde_json::from_str(r#"{"id": 1, "error": {"code": 104, "message": "stopped"}}"#)
            .unwrap();
    assert_eq!(err.error_kind(), Some(ErrorKind::InvalidState));
}

#[test]
fn notification_shares_request_id() {
    let note = Notification {
        id: 11,
        event: "log.entry".to_string(),
        data: serde_json::json!({"line": "hello"}),
    };
    let json = serde_json::to_value(&note).unwrap();
    assert_eq!(json["id"], 11);
    assert_eq!(json["event"], "log.entry");

    let back: Notification = serde_json::from_value(json).unwrap();
    assert_eq!(back, note);
}
