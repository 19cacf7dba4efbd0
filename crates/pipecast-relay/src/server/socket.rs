//! WebSocket connection loop.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::connection::RelayConnection;
use super::protocol::{self, Frame, ServerMessage};
use super::routes::AppState;
use crate::registry::SessionRegistry;
use crate::session::StreamStatus;

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (sink, stream) = socket.split();
    serve_connection(state.registry, sink, stream).await;
}

/// Drive one connection until the client goes away.
///
/// Inbound frames, encoder events and the startup deadline are handled by
/// this single task, so a session never sees two events at once.
async fn serve_connection<Si, St>(registry: SessionRegistry, mut sink: Si, mut stream: St)
where
    Si: Sink<Message> + Unpin,
    St: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let (connection, mut events) = RelayConnection::open(registry).await;

    loop {
        let deadline = connection.startup_deadline().await;
        let status = tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(message)) => match protocol::decode(message) {
                    Ok(Frame::Event(event)) => connection.handle(event).await,
                    Ok(Frame::Control) => None,
                    Ok(Frame::Close) => break,
                    Err(e) => {
                        warn!(connection_id = %connection.id(), error = %e, "Ignoring malformed frame");
                        None
                    }
                },
                Some(Err(e)) => {
                    debug!(connection_id = %connection.id(), error = %e, "WebSocket receive failed");
                    break;
                }
                None => break,
            },
            Some(event) = events.recv() => connection.on_process_event(event).await,
            () = sleep_until(deadline) => connection.on_startup_deadline().await,
        };

        if let Some(status) = status
            && !send_status(&mut sink, &connection, status).await
        {
            break;
        }
    }

    connection.close().await;
}

async fn send_status<S>(sink: &mut S, connection: &RelayConnection, status: StreamStatus) -> bool
where
    S: Sink<Message> + Unpin,
{
    let text = match ServerMessage::StreamStatus(status).to_json() {
        Ok(text) => text,
        Err(e) => {
            warn!(connection_id = %connection.id(), error = %e, "Failed to encode status");
            return true;
        }
    };
    if sink.send(Message::Text(text.into())).await.is_err() {
        debug!(connection_id = %connection.id(), "Client gone while sending status");
        return false;
    }
    true
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
