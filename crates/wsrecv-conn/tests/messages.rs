mod common;

use std::time::Duration;

use common::{frame, pair};
use wsrecv_conn::{ConnConfig, ConnError, Instant, MessageType, ReadPhase, Role};
use wsrecv_frame::{Opcode, StatusCode};

fn server() -> ConnConfig {
    ConnConfig::new(Role::Server)
}

#[tokio::test]
async fn fragmented_message_reassembles() {
    let (conn, mut peer) = pair(server());
    peer.send(&[
        frame(Opcode::Text, b"Hel").fin(false).masked(),
        frame(Opcode::Continuation, b"lo, ").fin(false).masked(),
        frame(Opcode::Continuation, b"").fin(false).masked(),
        frame(Opcode::Continuation, b"world").masked(),
    ])
    .await;

    let (kind, payload) = conn.read(None).await.unwrap();
    assert_eq!(kind, MessageType::Text);
    assert_eq!(payload.as_ref(), b"Hello, world");
    assert_eq!(conn.read_phase(), ReadPhase::Idle);
}

#[tokio::test]
async fn streaming_reader_delivers_in_small_chunks() {
    let (conn, mut peer) = pair(server());
    let body: Vec<u8> = (0..=255u8).collect();
    peer.send(&[
        frame(Opcode::Binary, &body[..100]).fin(false).masked(),
        frame(Opcode::Continuation, &body[100..]).masked(),
    ])
    .await;

    let (kind, mut reader) = conn.reader(None).await.unwrap();
    assert_eq!(kind, MessageType::Binary);
    assert_eq!(conn.read_phase(), ReadPhase::InMessage);

    let mut collected = Vec::new();
    let mut chunk = [0u8; 7];
    loop {
        let n = reader.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        collected.extend_from_slice(&chunk[..n]);
    }
    assert_eq!(collected, body);
    assert!(reader.is_done());
    assert_eq!(reader.read(&mut chunk).await.unwrap(), 0);
}

#[tokio::test]
async fn client_reads_unmasked_frames() {
    let (conn, mut peer) = pair(ConnConfig::new(Role::Client));
    peer.send(&[frame(Opcode::Binary, &[1, 2, 3])]).await;

    let (kind, payload) = conn.read(None).await.unwrap();
    assert_eq!(kind, MessageType::Binary);
    assert_eq!(payload.as_ref(), &[1, 2, 3]);
}

#[tokio::test]
async fn consecutive_messages_after_end_of_message() {
    let (conn, mut peer) = pair(server());
    peer.send(&[
        frame(Opcode::Text, b"one").masked(),
        frame(Opcode::Binary, b"two").masked(),
    ])
    .await;

    let (_, first) = conn.read(None).await.unwrap();
    let (kind, second) = conn.read(None).await.unwrap();
    assert_eq!(first.as_ref(), b"one");
    assert_eq!(kind, MessageType::Binary);
    assert_eq!(second.as_ref(), b"two");
}

#[tokio::test]
async fn new_reader_before_end_of_message_fails_closed() {
    let (conn, mut peer) = pair(server());
    peer.send(&[
        frame(Opcode::Text, b"abcdef").masked(),
        frame(Opcode::Text, b"next").masked(),
    ])
    .await;

    let (_, mut reader) = conn.reader(None).await.unwrap();
    let mut partial = [0u8; 2];
    assert_eq!(reader.read(&mut partial).await.unwrap(), 2);

    let err = conn.reader(None).await.unwrap_err();
    assert!(matches!(err, ConnError::Protocol(ref msg) if msg.contains("not read to completion")));
    assert!(conn.is_closed());
    assert_eq!(conn.read_phase(), ReadPhase::Closed);

    // Local contract violation: no close frame, just teardown.
    peer.expect_eof().await;

    let again = conn.read(None).await.unwrap_err();
    assert!(matches!(again, ConnError::Protocol(_)));
    assert!(reader.read(&mut partial).await.is_err());
}

#[tokio::test]
async fn message_at_limit_is_delivered() {
    let (conn, mut peer) = pair(server().with_read_limit(8));
    peer.send(&[
        frame(Opcode::Binary, b"1234").fin(false).masked(),
        frame(Opcode::Continuation, b"5678").masked(),
    ])
    .await;

    let (_, payload) = conn.read(None).await.unwrap();
    assert_eq!(payload.as_ref(), b"12345678");
    assert!(!conn.is_closed());
}

#[tokio::test]
async fn message_over_limit_closes_with_message_too_big() {
    let (conn, mut peer) = pair(server().with_read_limit(8));
    peer.send(&[frame(Opcode::Binary, b"123456789").masked()]).await;

    let err = conn.read(None).await.unwrap_err();
    assert!(matches!(err, ConnError::ReadLimited { limit: 8 }));
    assert!(conn.is_closed());
    assert!(matches!(
        conn.close_error(),
        Some(ConnError::ReadLimited { limit: 8 })
    ));

    let close = peer.expect_close().await;
    assert_eq!(close.code, StatusCode::MESSAGE_TOO_BIG);
    peer.expect_eof().await;
}

#[tokio::test]
async fn read_limit_change_applies_to_next_message() {
    let (conn, mut peer) = pair(server());
    conn.set_read_limit(4);
    assert_eq!(conn.read_limit(), 4);
    peer.send(&[
        frame(Opcode::Text, b"four").masked(),
        frame(Opcode::Text, b"fives").masked(),
    ])
    .await;

    let (_, payload) = conn.read(None).await.unwrap();
    assert_eq!(payload.as_ref(), b"four");
    let err = conn.read(None).await.unwrap_err();
    assert!(matches!(err, ConnError::ReadLimited { limit: 4 }));
}

#[tokio::test(start_paused = true)]
async fn deadline_without_data_keeps_connection_usable() {
    let (conn, mut peer) = pair(server());

    let deadline = Instant::now() + Duration::from_millis(100);
    let err = conn.read(Some(deadline)).await.unwrap_err();
    assert!(matches!(err, ConnError::DeadlineExceeded));
    assert!(!conn.is_closed());
    assert_eq!(conn.read_phase(), ReadPhase::Idle);

    peer.send(&[frame(Opcode::Text, b"late").masked()]).await;
    let deadline = Instant::now() + Duration::from_secs(1);
    let (_, payload) = conn.read(Some(deadline)).await.unwrap();
    assert_eq!(payload.as_ref(), b"late");
}

#[tokio::test(start_paused = true)]
async fn deadline_mid_message_resumes_where_it_stopped() {
    let (conn, mut peer) = pair(server());
    peer.send(&[frame(Opcode::Text, b"first ").fin(false).masked()])
        .await;

    let (_, mut reader) = conn.reader(None).await.unwrap();
    let mut buf = [0u8; 64];
    let n = reader.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"first ");

    reader.set_deadline(Some(Instant::now() + Duration::from_millis(50)));
    let err = reader.read(&mut buf).await.unwrap_err();
    assert!(matches!(err, ConnError::DeadlineExceeded));
    assert!(!conn.is_closed());
    assert_eq!(conn.read_phase(), ReadPhase::InMessage);

    peer.send(&[frame(Opcode::Continuation, b"second").masked()])
        .await;
    reader.set_deadline(None);
    let n = reader.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"second");
    assert_eq!(reader.read(&mut buf).await.unwrap(), 0);
}

#[tokio::test]
async fn stream_end_mid_message_is_connection_lost() {
    let (conn, mut peer) = pair(server());
    peer.send(&[frame(Opcode::Text, b"partial").fin(false).masked()])
        .await;
    peer.finish().await;

    let err = conn.read(None).await.unwrap_err();
    assert!(matches!(err, ConnError::ConnectionLost));
    assert!(conn.is_closed());
    peer.expect_eof().await;
}

#[tokio::test]
async fn abort_tears_down_without_close_frame() {
    let (conn, mut peer) = pair(server());
    let closed = conn.closed();

    conn.abort().await;
    assert!(closed.is_cancelled());
    assert_eq!(
        conn.close_error().and_then(|err| err.close_status()),
        Some(StatusCode::ABNORMAL_CLOSURE)
    );
    peer.expect_eof().await;

    let err = conn.read(None).await.unwrap_err();
    assert!(matches!(err, ConnError::ClosedLocally(_)));
}
