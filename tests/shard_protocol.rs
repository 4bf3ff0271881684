//! End-to-end exercises of the Connection Supervisor and Protocol State
//! Machine against a local mock gateway, rather than the real network.

use futures_util::{SinkExt, StreamExt};
use gateway_shard::{
    config::ShardId,
    message::Message,
    session::Session,
    Config, Shard,
};
use serde_json::{json, Value};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message as WsMessage;

/// Bind an ephemeral local listener and return its `ws://` URL alongside it.
async fn mock_gateway() -> (String, TcpListener) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    (format!("ws://{addr}"), listener)
}

#[tokio::test]
async fn happy_path_identifies_and_dispatches_ready() {
    let (url, listener) = mock_gateway().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        let hello = json!({"op": 10, "d": {"heartbeat_interval": 45_000, "_trace": ["edge-1"]}});
        ws.send(WsMessage::Text(hello.to_string())).await.unwrap();

        let identify = ws.next().await.unwrap().unwrap();
        let identify: Value = serde_json::from_str(identify.to_text().unwrap()).unwrap();
        assert_eq!(2, identify["op"]);
        assert_eq!("test-token", identify["d"]["token"]);
        assert_eq!(false, identify["d"]["compress"]);
        assert!(identify["d"].get("shard").is_none());

        let ready = json!({"op": 0, "t": "READY", "s": 1, "d": {"session_id": "abc123"}});
        ws.send(WsMessage::Text(ready.to_string())).await.unwrap();

        tokio::time::sleep(Duration::from_millis(400)).await;
    });

    let dispatched: Arc<Mutex<Vec<(String, Value)>>> = Arc::new(Mutex::new(Vec::new()));
    let dispatched_for_sink = Arc::clone(&dispatched);

    let config = Config::builder("test-token".to_owned())
        .gateway_url(Some(url))
        .dispatch(move |name, payload| {
            dispatched_for_sink
                .lock()
                .unwrap()
                .push((name.to_owned(), payload.clone()));
        })
        .build();

    let mut shard = Shard::with_config(ShardId::ONE, config).await.unwrap();
    let sender = shard.sender();

    let run_task = tokio::spawn(async move {
        let _ = shard.run().await;
    });

    tokio::time::sleep(Duration::from_millis(150)).await;
    sender.send(Message::Close(None)).unwrap();

    tokio::time::timeout(Duration::from_secs(2), run_task)
        .await
        .unwrap()
        .unwrap();
    server.await.unwrap();

    let events = dispatched.lock().unwrap();
    assert_eq!(1, events.len());
    assert_eq!("READY", events[0].0);
    assert_eq!("abc123", events[0].1["session_id"]);
}

#[tokio::test]
async fn resume_sends_prior_session_after_hello() {
    let (url, listener) = mock_gateway().await;

    let first_frame: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));
    let first_frame_for_server = Arc::clone(&first_frame);

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        let hello = json!({"op": 10, "d": {"heartbeat_interval": 60_000}});
        ws.send(WsMessage::Text(hello.to_string())).await.unwrap();

        let frame = ws.next().await.unwrap().unwrap();
        let frame: Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
        *first_frame_for_server.lock().unwrap() = Some(frame);

        tokio::time::sleep(Duration::from_millis(400)).await;
    });

    let config = Config::builder("test-token".to_owned())
        .gateway_url(Some(url))
        .session(Session::new("abc", 7))
        .build();

    let mut shard = Shard::with_config(ShardId::ONE, config).await.unwrap();
    let sender = shard.sender();

    let run_task = tokio::spawn(async move {
        let _ = shard.run().await;
    });

    tokio::time::sleep(Duration::from_millis(150)).await;
    sender.send(Message::Close(None)).unwrap();

    tokio::time::timeout(Duration::from_secs(2), run_task)
        .await
        .unwrap()
        .unwrap();
    server.await.unwrap();

    let frame = first_frame.lock().unwrap().take().unwrap();
    assert_eq!(6, frame["op"]);
    assert_eq!("abc", frame["d"]["session_id"]);
    assert_eq!(7, frame["d"]["seq"]);
}

#[tokio::test]
async fn envelope_not_an_object_closes_with_invalid_envelope() {
    let (url, listener) = mock_gateway().await;

    let observed_close: Arc<Mutex<Option<u16>>> = Arc::new(Mutex::new(None));
    let observed_close_for_server = Arc::clone(&observed_close);

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        let hello = json!({"op": 10, "d": {"heartbeat_interval": 60_000}});
        ws.send(WsMessage::Text(hello.to_string())).await.unwrap();

        // Not HELLO-first, so the array below is the second frame: a
        // protocol-valid but non-object envelope.
        ws.send(WsMessage::Text("[]".to_owned())).await.unwrap();

        while let Some(Ok(message)) = ws.next().await {
            if let WsMessage::Close(frame) = message {
                *observed_close_for_server.lock().unwrap() =
                    frame.map(|frame| frame.code.into());
                break;
            }
        }
    });

    let config = Config::builder("test-token".to_owned())
        .gateway_url(Some(url))
        .build();

    let mut shard = Shard::with_config(ShardId::ONE, config).await.unwrap();

    // The shard reacts to the malformed envelope on its own; no external
    // shutdown signal is needed, the transport closes from beneath it.
    let _ = tokio::time::timeout(Duration::from_secs(2), shard.run()).await;

    server.await.unwrap();

    assert_eq!(Some(1007), *observed_close.lock().unwrap());
}

#[tokio::test]
async fn server_reconnect_clears_session_and_reidentifies() {
    let (url, listener) = mock_gateway().await;

    let observed_close: Arc<Mutex<Option<u16>>> = Arc::new(Mutex::new(None));
    let observed_close_for_server = Arc::clone(&observed_close);
    let second_identify: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));
    let second_identify_for_server = Arc::clone(&second_identify);

    let server = tokio::spawn(async move {
        // First connection: hello, identify, then the server asks to
        // reconnect.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        let hello = json!({"op": 10, "d": {"heartbeat_interval": 60_000}});
        ws.send(WsMessage::Text(hello.to_string())).await.unwrap();

        let identify = ws.next().await.unwrap().unwrap();
        let identify: Value = serde_json::from_str(identify.to_text().unwrap()).unwrap();
        assert_eq!(2, identify["op"]);

        let reconnect = json!({"op": 7, "d": null});
        ws.send(WsMessage::Text(reconnect.to_string())).await.unwrap();

        while let Some(Ok(message)) = ws.next().await {
            if let WsMessage::Close(frame) = message {
                *observed_close_for_server.lock().unwrap() =
                    frame.map(|frame| frame.code.into());
                break;
            }
        }

        // Second connection: the reconnect. No prior session survives, so
        // the client must identify again rather than resume.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        let hello = json!({"op": 10, "d": {"heartbeat_interval": 60_000}});
        ws.send(WsMessage::Text(hello.to_string())).await.unwrap();

        let frame = ws.next().await.unwrap().unwrap();
        let frame: Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
        *second_identify_for_server.lock().unwrap() = Some(frame);

        tokio::time::sleep(Duration::from_millis(400)).await;
    });

    let config = Config::builder("test-token".to_owned())
        .gateway_url(Some(url))
        .build();

    let mut shard = Shard::with_config(ShardId::ONE, config).await.unwrap();
    let sender = shard.sender();

    let run_task = tokio::spawn(async move {
        let _ = shard.run().await;
    });

    tokio::time::sleep(Duration::from_millis(2500)).await;
    sender.send(Message::Close(None)).unwrap();

    tokio::time::timeout(Duration::from_secs(5), run_task)
        .await
        .unwrap()
        .unwrap();
    server.await.unwrap();

    assert_eq!(Some(1003), *observed_close.lock().unwrap());

    let frame = second_identify.lock().unwrap().take().unwrap();
    assert_eq!(2, frame["op"]);
    assert_eq!("test-token", frame["d"]["token"]);
}

#[tokio::test]
async fn heartbeat_zombie_closes_and_resumes() {
    let (url, listener) = mock_gateway().await;

    let observed_close: Arc<Mutex<Option<u16>>> = Arc::new(Mutex::new(None));
    let observed_close_for_server = Arc::clone(&observed_close);
    let second_frame: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));
    let second_frame_for_server = Arc::clone(&second_frame);

    let server = tokio::spawn(async move {
        // First connection: a short heartbeat interval and an acknowledgement
        // that never arrives, so the zombie detector must fire.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        let hello = json!({"op": 10, "d": {"heartbeat_interval": 40}});
        ws.send(WsMessage::Text(hello.to_string())).await.unwrap();

        let identify = ws.next().await.unwrap().unwrap();
        let identify: Value = serde_json::from_str(identify.to_text().unwrap()).unwrap();
        assert_eq!(2, identify["op"]);

        let ready = json!({"op": 0, "t": "READY", "s": 5, "d": {"session_id": "zzz"}});
        ws.send(WsMessage::Text(ready.to_string())).await.unwrap();

        while let Some(Ok(message)) = ws.next().await {
            if let WsMessage::Close(frame) = message {
                *observed_close_for_server.lock().unwrap() =
                    frame.map(|frame| frame.code.into());
                break;
            }
        }

        // Second connection: the reconnect. The session survives a zombie
        // disconnect, so the client must resume rather than identify.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        let hello = json!({"op": 10, "d": {"heartbeat_interval": 60_000}});
        ws.send(WsMessage::Text(hello.to_string())).await.unwrap();

        let frame = ws.next().await.unwrap().unwrap();
        let frame: Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
        *second_frame_for_server.lock().unwrap() = Some(frame);

        tokio::time::sleep(Duration::from_millis(400)).await;
    });

    let config = Config::builder("test-token".to_owned())
        .gateway_url(Some(url))
        .build();

    let mut shard = Shard::with_config(ShardId::ONE, config).await.unwrap();
    let sender = shard.sender();

    let run_task = tokio::spawn(async move {
        let _ = shard.run().await;
    });

    tokio::time::sleep(Duration::from_millis(2500)).await;
    sender.send(Message::Close(None)).unwrap();

    tokio::time::timeout(Duration::from_secs(5), run_task)
        .await
        .unwrap()
        .unwrap();
    server.await.unwrap();

    assert_eq!(Some(1008), *observed_close.lock().unwrap());

    let frame = second_frame.lock().unwrap().take().unwrap();
    assert_eq!(6, frame["op"]);
    assert_eq!("zzz", frame["d"]["session_id"]);
    assert_eq!(5, frame["d"]["seq"]);
}
