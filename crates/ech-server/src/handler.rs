//! Upgrade endpoint and per-connection receive loop.

use axum::extract::ws::{Message, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use ech_hub::{AcceptOutcome, EditorHub, Envelope};
use futures_util::StreamExt;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::ws_transport;

/// Handshake parameters carried as query-string parameters on the upgrade
/// request.
#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    #[serde(default)]
    session: Option<String>,
    #[serde(default)]
    conn_seq: u64,
    #[serde(default)]
    project: Option<String>,
}

pub async fn connect(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(hub): State<EditorHub>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| drive(socket, params, hub))
}

async fn drive(socket: axum::extract::ws::WebSocket, params: ConnectParams, hub: EditorHub) {
    let (transport, mut stream, writer) = ws_transport::spawn(socket);

    let outcome = hub.accept(params.session, params.conn_seq, params.project, transport);
    let peer = match outcome {
        AcceptOutcome::Accepted(peer) => peer,
        AcceptOutcome::Rejected => {
            debug!("connection rejected during handshake");
            writer.await.ok();
            return;
        }
    };

    info!(conn_id = %peer.conn_id, "peer receive loop started");

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => route_frame(&hub, &peer, text.as_bytes()),
            Ok(Message::Binary(bytes)) => route_frame(&hub, &peer, &bytes),
            Ok(Message::Close(_)) => break,
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Err(e) => {
                warn!(conn_id = %peer.conn_id, error = %e, "websocket receive error");
                break;
            }
        }
    }

    info!(conn_id = %peer.conn_id, "peer receive loop ended");
    hub.peer_disconnected(&peer);
    writer.abort();
}

fn route_frame(hub: &EditorHub, peer: &std::sync::Arc<ech_hub::Peer>, bytes: &[u8]) {
    match Envelope::parse(bytes) {
        Ok(envelope) => hub.handle_incoming(peer, envelope),
        Err(e) => {
            debug!(conn_id = %peer.conn_id, error = %e, "dropping malformed envelope");
        }
    }
}
