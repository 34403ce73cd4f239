//! [`Transport`] binding over an Axum WebSocket: a single-writer queue feeding
//! a dedicated send task, the same split-socket-plus-mpsc shape used for
//! duplex control sockets elsewhere in the retrieval pack.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use ech_hub::{CloseCode, Transport};
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Handle given to [`ech_hub::EditorHub::accept`]. `send_raw` and `close`
/// only enqueue; the actual write happens on the task spawned alongside this
/// transport in [`spawn`].
#[derive(Debug)]
pub struct WsTransport {
    tx: mpsc::UnboundedSender<Message>,
}

impl Transport for WsTransport {
    fn send_raw(&self, data: Vec<u8>) -> bool {
        let text = match String::from_utf8(data) {
            Ok(s) => s,
            Err(_) => return false,
        };
        self.tx.send(Message::Text(text.into())).is_ok()
    }

    fn close(&self, code: CloseCode, reason: String) {
        let frame = CloseFrame {
            code: code.code(),
            reason: reason.into(),
        };
        let _ = self.tx.send(Message::Close(Some(frame)));
    }
}

/// Splits `socket`, spawns the writer task, and returns the transport handle
/// plus the receive half the caller drives directly.
pub fn spawn(socket: WebSocket) -> (Arc<WsTransport>, SplitStream<WebSocket>, JoinHandle<()>) {
    let (mut sink, stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let transport = Arc::new(WsTransport { tx });

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let is_close = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() || is_close {
                break;
            }
        }
    });

    (transport, stream, writer)
}
