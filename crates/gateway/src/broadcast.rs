use {serde::Serialize, tracing::warn};

use {clinic_common::ConsultationId, clinic_protocol::EventFrame};

use crate::state::GatewayState;

/// Options for a room broadcast.
#[derive(Debug, Clone, Default)]
pub struct BroadcastOpts {
    /// Skip this connection (e.g. the sender). `None` delivers to everyone.
    pub exclude_conn: Option<String>,
}

fn encode(state: &GatewayState, event: &str, payload: &impl Serialize) -> Option<String> {
    let data = match serde_json::to_value(payload) {
        Ok(v) => v,
        Err(e) => {
            warn!(event, error = %e, "failed to serialize event payload");
            return None;
        },
    };
    match EventFrame::new(event, data, state.next_seq()).to_text() {
        Ok(text) => Some(text),
        Err(e) => {
            warn!(event, error = %e, "failed to encode event frame");
            None
        },
    }
}

/// Send an event to one connection. Returns false if it is gone.
pub async fn send_to(
    state: &GatewayState,
    conn_id: &str,
    event: &str,
    payload: &impl Serialize,
) -> bool {
    let Some(frame) = encode(state, event, payload) else {
        return false;
    };
    state
        .clients
        .read()
        .await
        .get(conn_id)
        .is_some_and(|c| c.send(&frame))
}

/// Deliver an event to every current member of `room`.
///
/// Delivery is at-most-once: members whose write loop has closed are skipped.
/// Returns how many connections the frame was queued for.
pub async fn broadcast_to_room(
    state: &GatewayState,
    room: &ConsultationId,
    event: &str,
    payload: &impl Serialize,
    opts: BroadcastOpts,
) -> usize {
    let members = state.rooms.read().await.members(room);
    if members.is_empty() {
        return 0;
    }
    let Some(frame) = encode(state, event, payload) else {
        return 0;
    };

    let clients = state.clients.read().await;
    members
        .iter()
        .filter(|id| opts.exclude_conn.as_deref() != Some(id.as_str()))
        .filter_map(|id| clients.get(id))
        .filter(|c| c.send(&frame))
        .count()
}
