// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire format tests: length-prefix framing and JSON encoding.

use std::time::Duration;

use super::*;
use crate::ForwardRequest;

#[test]
fn encode_returns_json_without_length_prefix() {
    let request = ForwardRequest::GetCommands;
    let encoded = encode(&request).expect("encode failed");

    let json_str = std::str::from_utf8(&encoded).expect("should be valid UTF-8");
    assert!(json_str.starts_with('{'), "should be JSON object: {}", json_str);
}

#[tokio::test]
async fn read_write_message_roundtrip() {
    let original = b"hello world";

    let mut buffer = Vec::new();
    write_message(&mut buffer, original).await.expect("write failed");

    // write_message adds 4-byte length prefix
    assert_eq!(buffer.len(), 4 + original.len());

    let mut cursor = std::io::Cursor::new(buffer);
    let read_back = read_message(&mut cursor).await.expect("read failed");

    assert_eq!(read_back, original);
}

#[tokio::test]
async fn length_prefix_is_big_endian() {
    let data = b"test data";

    let mut buffer = Vec::new();
    write_message(&mut buffer, data).await.expect("write failed");

    let len = u32::from_be_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]) as usize;
    assert_eq!(len, data.len());
    assert_eq!(&buffer[4..], data);
}

#[tokio::test]
async fn eof_maps_to_connection_closed() {
    let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
    let err = read_message(&mut cursor).await.unwrap_err();
    assert!(matches!(err, ProtocolError::ConnectionClosed));
}

#[tokio::test]
async fn truncated_body_maps_to_connection_closed() {
    let mut buffer = Vec::new();
    buffer.extend_from_slice(&100u32.to_be_bytes());
    buffer.extend_from_slice(b"short");

    let mut cursor = std::io::Cursor::new(buffer);
    let err = read_message(&mut cursor).await.unwrap_err();
    assert!(matches!(err, ProtocolError::ConnectionClosed));
}

#[tokio::test]
async fn oversized_length_prefix_is_rejected() {
    let mut buffer = Vec::new();
    buffer.extend_from_slice(&(MAX_FRAME_BYTES as u32 + 1).to_be_bytes());

    let mut cursor = std::io::Cursor::new(buffer);
    let err = read_message(&mut cursor).await.unwrap_err();
    assert!(matches!(err, ProtocolError::FrameTooLarge(_)));
}

#[tokio::test]
async fn typed_frame_roundtrip() {
    let request = ForwardRequest::Shutdown;

    let mut buffer = Vec::new();
    write_frame(&mut buffer, &request, Duration::from_secs(1)).await.expect("write failed");

    let mut cursor = std::io::Cursor::new(buffer);
    let back: ForwardRequest =
        read_frame(&mut cursor, Duration::from_secs(1)).await.expect("read failed");
    assert_eq!(back, request);
}

#[tokio::test]
async fn read_frame_times_out_on_silent_peer() {
    // A duplex stream with no writer never produces bytes
    let (client, _server) = tokio::io::duplex(64);
    let (mut reader, _writer) = tokio::io::split(client);

    let err = read_frame::<_, ForwardRequest>(&mut reader, Duration::from_millis(20))
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::Timeout));
}
