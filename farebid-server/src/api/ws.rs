use std::time::Duration;

use axum::{
    extract::{
        Query, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use farebid_core::engine::NegotiationError;
use farebid_core::model::Actor;
use farebid_sdk::objects::{PushEventType, PushFrame, WsCloseCode};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::extractors::AuthenticatedActor;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub(super) struct PushQuery {
    session_id: Uuid,
}

/// `GET /negotiation/ws?session_id={id}`: push stream for one session.
///
/// The first frame is a `snapshot` of the current state; after that one
/// frame is sent per committed transition. The socket is closed normally
/// after a terminal frame.
pub(super) async fn negotiation_ws(
    State(state): State<AppState>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Query(query): Query<PushQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_push_socket(socket, state, actor, query.session_id))
}

enum Outcome {
    /// Terminal frame sent or the session closed.
    Finished,
    /// The hub dropped us, or a write failed or timed out.
    TooSlow,
    ClientGone,
}

fn close_code_for(err: &NegotiationError) -> (u16, &'static str) {
    match err {
        NegotiationError::NotParticipant | NegotiationError::ActionNotPermitted(_) => {
            (WsCloseCode::NOT_PARTICIPANT, "not a participant")
        }
        NegotiationError::NotFound(_) => (WsCloseCode::SESSION_NOT_FOUND, "session not found"),
        _ => (WsCloseCode::INTERNAL_ERROR, "internal error"),
    }
}

async fn handle_push_socket(mut socket: WebSocket, state: AppState, actor: Actor, session_id: Uuid) {
    let write_timeout = state.config.server.read().await.push_write_timeout;

    let (snapshot, mut subscription) = match state.engine.open_push(session_id, actor).await {
        Ok(opened) => opened,
        Err(err) => {
            let (code, reason) = close_code_for(&err);
            if code == WsCloseCode::INTERNAL_ERROR {
                tracing::error!(%session_id, error = %err, "WS: failed to open push stream");
            } else {
                tracing::debug!(%session_id, actor = %actor, error = %err, "WS: push stream refused");
            }
            close(&mut socket, code, reason, write_timeout).await;
            return;
        }
    };

    let first = PushFrame {
        event_type: PushEventType::Snapshot,
        version: snapshot.version,
        session: snapshot.to_view(),
    };
    if send_frame(&mut socket, &first, write_timeout).await.is_err() {
        state.engine.push().unsubscribe(session_id, subscription.id);
        return;
    }
    if snapshot.status.is_terminal() {
        close(&mut socket, WsCloseCode::NORMAL, "session closed", write_timeout).await;
        return;
    }

    let mut last_sent = snapshot.version;
    let outcome = loop {
        tokio::select! {
            event = subscription.receiver.recv() => match event {
                Some(event) => {
                    // Already covered by the snapshot.
                    if event.version() <= last_sent {
                        continue;
                    }
                    if send_frame(&mut socket, &event.to_push_frame(), write_timeout).await.is_err() {
                        tracing::warn!(%session_id, actor = %actor, "WS: push write failed, dropping subscriber");
                        break Outcome::TooSlow;
                    }
                    last_sent = event.version();
                    if event.kind.is_terminal() {
                        break Outcome::Finished;
                    }
                }
                None if subscription.was_evicted() => break Outcome::TooSlow,
                None => break Outcome::Finished,
            },

            msg = socket.recv() => match msg {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break Outcome::ClientGone,
                Some(Ok(_)) => {}
            },
        }
    };

    state.engine.push().unsubscribe(session_id, subscription.id);
    match outcome {
        Outcome::Finished => {
            close(&mut socket, WsCloseCode::NORMAL, "session closed", write_timeout).await;
        }
        Outcome::TooSlow => {
            close(&mut socket, WsCloseCode::SLOW_CONSUMER, "too slow", write_timeout).await;
        }
        Outcome::ClientGone => {}
    }
}

/// Serialize `frame` as JSON and send it as a text frame within `limit`.
///
/// Returns `Err(())` if the send fails or times out.
async fn send_frame(socket: &mut WebSocket, frame: &PushFrame, limit: Duration) -> Result<(), ()> {
    let json = serde_json::to_string(frame).map_err(|_| ())?;
    match tokio::time::timeout(limit, socket.send(Message::Text(json.into()))).await {
        Ok(Ok(())) => Ok(()),
        _ => Err(()),
    }
}

async fn close(socket: &mut WebSocket, code: u16, reason: &'static str, limit: Duration) {
    let frame = Message::Close(Some(CloseFrame {
        code,
        reason: reason.into(),
    }));
    let _ = tokio::time::timeout(limit, socket.send(frame)).await;
}
