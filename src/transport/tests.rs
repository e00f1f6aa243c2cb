use std::time::Duration;

use serde_json::json;

use crate::client::credentials::Credentials;
use crate::config::ClientSettings;
use crate::transport::connection::backoff_delay;
use crate::transport::message::{self, ClientInfo, ClientMessage, ServerMessage};
use crate::transport::websocket::validate_url;
use crate::utils::Error;

#[test]
fn test_publish_frame_shape() {
    let text = message::encode(&ClientMessage::Publish {
        channel: "chat:index".to_string(),
        data: br#"{"input":"hello\n"}"#.to_vec(),
    })
    .unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();

    assert_eq!(value["type"], "publish");
    assert_eq!(value["channel"], "chat:index");
    // payload bytes travel base64 encoded
    assert_eq!(value["data"], "eyJpbnB1dCI6ImhlbGxvXG4ifQ==");
}

#[test]
fn test_connect_frame_omits_missing_credentials() {
    let text = message::encode(&ClientMessage::Connect { credentials: None }).unwrap();
    assert_eq!(text, r#"{"type":"connect"}"#);

    let credentials = Credentials::new("42", "1700000000", "", "sig");
    let text = message::encode(&ClientMessage::Connect {
        credentials: Some(credentials),
    })
    .unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["credentials"]["user"], "42");
    assert_eq!(value["credentials"]["token"], "sig");
}

#[test]
fn test_decode_server_frames() {
    let frame = message::decode(
        &json!({
            "type": "publication",
            "channel": "chat:index",
            "data": "aGk=",
            "info": {"user": "42", "client": "c1"}
        })
        .to_string(),
    )
    .unwrap();
    assert_eq!(
        frame,
        ServerMessage::Publication {
            channel: "chat:index".to_string(),
            data: b"hi".to_vec(),
            info: Some(ClientInfo {
                user: "42".to_string(),
                client: "c1".to_string(),
                ..ClientInfo::default()
            }),
        }
    );

    // optional flags default to false
    let frame = message::decode(r#"{"type":"subscribed","channel":"a"}"#).unwrap();
    assert_eq!(
        frame,
        ServerMessage::Subscribed {
            channel: "a".to_string(),
            recovered: false
        }
    );
    let frame = message::decode(r#"{"type":"disconnect","reason":"bye"}"#).unwrap();
    assert_eq!(
        frame,
        ServerMessage::Disconnect {
            reason: "bye".to_string(),
            reconnect: false
        }
    );
}

#[test]
fn test_presence_frames() {
    let text = message::encode(&ClientMessage::Presence {
        channel: "chat:index".to_string(),
    })
    .unwrap();
    assert_eq!(text, r#"{"type":"presence","channel":"chat:index"}"#);

    let frame = message::decode(
        r#"{"type":"presence","channel":"chat:index","clients":[{"user":"42","client":"c1"}]}"#,
    )
    .unwrap();
    assert_eq!(frame.channel(), Some("chat:index"));
    let ServerMessage::Presence { clients, .. } = frame else {
        panic!("expected presence reply");
    };
    assert_eq!(clients.len(), 1);
    assert_eq!(clients[0].user, "42");

    // an empty channel may leave the list out
    let frame = message::decode(r#"{"type":"presence","channel":"x"}"#).unwrap();
    assert!(matches!(frame, ServerMessage::Presence { clients, .. } if clients.is_empty()));
}

#[test]
fn test_decode_rejects_bad_frames() {
    for text in [
        "not json",
        r#"{"type":"nonsense"}"#,
        r#"{"type":"publication","channel":"a","data":"%%%"}"#,
        r#"{"channel":"a"}"#,
    ] {
        match message::decode(text) {
            Err(Error::Protocol(_)) => {}
            other => panic!("{text}: expected protocol error, got {other:?}"),
        }
    }
}

#[test]
fn test_decode_error_quotes_frame_prefix() {
    let long = format!("{{{}", "x".repeat(500));
    let Err(Error::Protocol(message)) = message::decode(&long) else {
        panic!("expected protocol error");
    };
    assert!(message.contains(&"x".repeat(99)));
    assert!(!message.contains(&"x".repeat(101)));
}

#[test]
fn test_server_message_channel() {
    let info = ClientInfo::default();
    assert_eq!(
        ServerMessage::Join {
            channel: "a".to_string(),
            info
        }
        .channel(),
        Some("a")
    );
    assert_eq!(
        ServerMessage::Unsubscribed {
            channel: "b".to_string()
        }
        .channel(),
        Some("b")
    );
    assert_eq!(
        ServerMessage::Error {
            message: "x".to_string()
        }
        .channel(),
        None
    );
    assert_eq!(
        ServerMessage::Connected {
            client: "c".to_string()
        }
        .channel(),
        None
    );
}

#[test]
fn test_backoff_doubles_up_to_cap() {
    let settings = ClientSettings {
        reconnect_delay_ms: 500,
        max_reconnect_delay_ms: 3_000,
        ..ClientSettings::default()
    };
    let delays: Vec<Duration> = (0..5).map(|n| backoff_delay(&settings, n)).collect();
    assert_eq!(
        delays,
        [500, 1_000, 2_000, 3_000, 3_000].map(Duration::from_millis)
    );

    // huge attempt counts saturate instead of overflowing
    assert_eq!(backoff_delay(&settings, 200), Duration::from_millis(3_000));
}

#[test]
fn test_backoff_has_floor() {
    let settings = ClientSettings {
        reconnect_delay_ms: 0,
        max_reconnect_delay_ms: 0,
        ..ClientSettings::default()
    };
    assert_eq!(backoff_delay(&settings, 0), Duration::from_millis(10));
    assert_eq!(backoff_delay(&settings, 3), Duration::from_millis(10));
}

#[test]
fn test_validate_url() {
    assert!(validate_url("ws://localhost:8000/connection/websocket").is_ok());
    assert!(validate_url("ws://127.0.0.1:1").is_ok());

    for url in ["wss://example.com/ws", "http://localhost:8000", "not a url", ""] {
        match validate_url(url) {
            Err(Error::Transport(_)) => {}
            other => panic!("{url}: expected transport error, got {other:?}"),
        }
    }
}
