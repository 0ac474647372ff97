// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::{decode, encode};

#[test]
fn token_request_roundtrips() {
    let request = ReverseRequest::GetAccessToken {
        connection_id: "c1".into(),
        resource: "https://org.example.test".to_string(),
    };

    let bytes = encode(&request).unwrap();
    let back: ReverseRequest = decode(&bytes).unwrap();
    assert_eq!(back, request);
}

#[test]
fn empty_connection_id_is_representable() {
    let request = ReverseRequest::GetAccessToken {
        connection_id: "".into(),
        resource: "https://org.example.test".to_string(),
    };

    let bytes = encode(&request).unwrap();
    let ReverseRequest::GetAccessToken { connection_id, .. } = decode(&bytes).unwrap();
    assert!(connection_id.is_empty());
}

#[test]
fn debug_redacts_token_value() {
    let response = ReverseResponse::Token {
        access_token: "very-secret-token".to_string(),
        expires_at_unix: 1_700_000_000,
    };

    let debug = format!("{response:?}");
    assert!(!debug.contains("very-secret-token"), "token leaked: {debug}");
    assert!(debug.contains("<redacted>"));
}

#[test]
fn token_response_roundtrips() {
    let response = ReverseResponse::Token {
        access_token: "tok".to_string(),
        expires_at_unix: 1_700_000_000,
    };

    let bytes = encode(&response).unwrap();
    let back: ReverseResponse = decode(&bytes).unwrap();
    assert!(back == response);
}
