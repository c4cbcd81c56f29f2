use std::{net::SocketAddr, sync::Arc};

use {
    axum::extract::ws::{Message as WsMessage, WebSocket},
    futures::{SinkExt, StreamExt},
    tokio::sync::mpsc,
    tracing::{debug, info, warn},
};

use clinic_protocol::{ClientFrame, ErrorShape, error_codes, events, join_consultation_id};

use crate::{broadcast::send_to, chat::ChatService, state::ConnectedClient};

/// Drive one WebSocket connection until the client goes away.
///
/// Outbound frames are queued on an unbounded channel and written by a
/// dedicated task; inbound frames are handled in order, one at a time.
pub async fn handle_connection(socket: WebSocket, chat: Arc<ChatService>, remote_addr: SocketAddr) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let write_conn = conn_id.clone();
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = ws_tx.send(WsMessage::Text(frame.into())).await {
                debug!(conn_id = %write_conn, error = %e, "write loop closed");
                break;
            }
        }
    });

    chat.state()
        .register_client(ConnectedClient::new(&conn_id, Some(remote_addr), tx))
        .await;
    info!(conn_id = %conn_id, remote = %remote_addr, "client connected");

    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(WsMessage::Text(text)) => handle_frame(&chat, &conn_id, text.as_str()).await,
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => {},
            Err(e) => {
                debug!(conn_id = %conn_id, error = %e, "read loop error");
                break;
            },
        }
    }

    chat.disconnect(&conn_id).await;
    writer.abort();
}

/// Dispatch one inbound text frame.
pub async fn handle_frame(chat: &ChatService, conn_id: &str, raw: &str) {
    let frame = match ClientFrame::parse(raw) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(conn_id, error = %e, "ignoring malformed frame");
            if chat.error_events() {
                let shape = ErrorShape::new(error_codes::INVALID_FRAME, e.to_string());
                send_to(chat.state(), conn_id, events::MESSAGE_ERROR, &shape).await;
            }
            return;
        },
    };

    match frame.event.as_str() {
        events::JOIN_CONSULTATION => {
            let Some(consultation) = join_consultation_id(&frame.data) else {
                warn!(conn_id, "join without a consultation id");
                return;
            };
            if let Err(e) = chat.join(conn_id, consultation.into()).await {
                warn!(conn_id, error = %e, "failed to load consultation history");
            }
        },
        events::SEND_MESSAGE => {
            if let Err(e) = chat.send(conn_id, frame.data).await {
                chat.report(conn_id, &e).await;
            }
        },
        other => debug!(conn_id, event = other, "ignoring unknown event"),
    }
}
