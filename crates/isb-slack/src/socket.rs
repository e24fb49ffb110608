//! Streaming socket
//!
//! One task per socket owns the websocket. Incoming JSON objects go to the
//! event sink as [`RemoteEvent::Payload`]; the end of the connection goes as
//! exactly one [`RemoteEvent::Closed`], unless the socket was terminated
//! locally.

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info};

use crate::error::{Result, SlackError};
use crate::event::{EventSink, RemoteEvent, SessionTag};

/// Close status reported when the connection ended without a close frame
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Handle to a running socket task
pub struct StreamSocket {
    outgoing: Option<mpsc::UnboundedSender<String>>,
}

impl StreamSocket {
    /// Connect to `url` and start pumping frames to `sink`.
    pub async fn connect(url: &str, session: SessionTag, sink: EventSink) -> Result<Self> {
        info!(%session, "Connecting to Slack websocket: {}", redact(url));

        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| SlackError::WebSocket(e.to_string()))?;

        info!(%session, "Connected to Slack websocket");

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(pump(ws_stream, rx, session, sink));

        Ok(Self { outgoing: Some(tx) })
    }

    /// Queue a keep-alive frame. Ignored once the socket is gone.
    pub fn send_ping(&self, id: u64) {
        let frame = serde_json::json!({ "id": id, "type": "ping" }).to_string();
        if let Some(tx) = &self.outgoing {
            if tx.send(frame).is_err() {
                debug!("websocket already closed, ping dropped");
            }
        }
    }

    /// Close the socket without reporting a closure. Idempotent.
    pub fn terminate(&mut self) {
        self.outgoing.take();
    }

    pub fn is_terminated(&self) -> bool {
        self.outgoing.is_none()
    }
}

impl Drop for StreamSocket {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Strip the query string, which carries credentials.
fn redact(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.to_string()
        }
        Err(_) => url.split('?').next().unwrap_or_default().to_string(),
    }
}

async fn pump(
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut outgoing: mpsc::UnboundedReceiver<String>,
    session: SessionTag,
    sink: EventSink,
) {
    let (mut write, mut read) = ws_stream.split();

    let closed = loop {
        tokio::select! {
            frame = outgoing.recv() => match frame {
                Some(text) => {
                    if let Err(e) = write.send(WsMessage::Text(text.into())).await {
                        break Some((ABNORMAL_CLOSURE, e.to_string()));
                    }
                }
                None => {
                    // terminated locally
                    let _ = write.send(WsMessage::Close(None)).await;
                    let _ = write.close().await;
                    break None;
                }
            },
            message = read.next() => match message {
                Some(Ok(WsMessage::Text(text))) => {
                    match serde_json::from_str::<Value>(&text) {
                        Ok(payload @ Value::Object(_)) => sink(RemoteEvent::Payload { session, payload }),
                        Ok(other) => sink(RemoteEvent::Malformed {
                            session,
                            detail: format!("not an object: {}", other),
                        }),
                        Err(e) => sink(RemoteEvent::Malformed {
                            session,
                            detail: format!("{}: {}", e, text.as_str()),
                        }),
                    }
                }
                Some(Ok(WsMessage::Ping(data))) => {
                    if let Err(e) = write.send(WsMessage::Pong(data)).await {
                        break Some((ABNORMAL_CLOSURE, e.to_string()));
                    }
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    break Some(close_status(frame));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    break Some((ABNORMAL_CLOSURE, e.to_string()));
                }
                None => {
                    break Some((ABNORMAL_CLOSURE, "connection ended".to_string()));
                }
            },
        }
    };

    if let Some((status, reason)) = closed {
        error!(%session, status, "Slack websocket closed: {}", reason);
        sink(RemoteEvent::Closed {
            session,
            status,
            reason,
        });
    } else {
        debug!(%session, "Slack websocket terminated");
    }
}

fn close_status(frame: Option<CloseFrame>) -> (u16, String) {
    match frame {
        Some(frame) => (u16::from(frame.code), frame.reason.as_str().to_string()),
        None => (ABNORMAL_CLOSURE, String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

    fn collecting_sink() -> (EventSink, mpsc::UnboundedReceiver<RemoteEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink: EventSink = Arc::new(move |event| {
            let _ = tx.send(event);
        });
        (sink, rx)
    }

    #[test]
    fn test_redact_strips_query() {
        assert_eq!(
            redact("wss://example.test/link/?ticket=secret"),
            "wss://example.test/link/"
        );
    }

    #[tokio::test]
    async fn test_frames_become_tagged_events() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.send(WsMessage::Text(r#"{"type":"hello"}"#.into())).await.unwrap();
            ws.send(WsMessage::Text("[1,2]".into())).await.unwrap();

            // the ping sent by the client
            let ping = loop {
                match ws.next().await {
                    Some(Ok(WsMessage::Text(text))) => break text.as_str().to_string(),
                    Some(Ok(_)) => continue,
                    other => panic!("unexpected frame: {:?}", other),
                }
            };

            ws.send(WsMessage::Close(Some(CloseFrame {
                code: CloseCode::Away,
                reason: "bye".into(),
            })))
            .await
            .unwrap();
            ping
        });

        let (sink, mut events) = collecting_sink();
        let tag = SessionTag::next();
        let socket = StreamSocket::connect(&format!("ws://{}", addr), tag, sink).await.unwrap();

        match events.recv().await.unwrap() {
            RemoteEvent::Payload { session, payload } => {
                assert_eq!(session, tag);
                assert_eq!(payload["type"], "hello");
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(matches!(events.recv().await.unwrap(), RemoteEvent::Malformed { .. }));

        socket.send_ping(7);
        let ping: Value = serde_json::from_str(&server.await.unwrap()).unwrap();
        assert_eq!(ping, serde_json::json!({ "id": 7, "type": "ping" }));

        match events.recv().await.unwrap() {
            RemoteEvent::Closed { status, reason, .. } => {
                assert_eq!(status, 1001);
                assert_eq!(reason, "bye");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_terminate_reports_nothing() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            // drain until the client closes
            while let Some(Ok(_)) = ws.next().await {}
        });

        let (sink, mut events) = collecting_sink();
        let mut socket = StreamSocket::connect(&format!("ws://{}", addr), SessionTag::next(), sink)
            .await
            .unwrap();

        socket.terminate();
        socket.terminate();
        assert!(socket.is_terminated());

        server.await.unwrap();
        // the pump has exited and dropped the sink
        assert!(events.recv().await.is_none());
    }
}
