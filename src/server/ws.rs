use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use serde_json::json;
use tracing::{debug, debug_span, error, info, info_span, Instrument};

use super::protocol::{Reply, Request};
use super::session::Session;
use super::AppState;
use crate::error::SessionError;

pub(super) async fn upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| serve(socket, state))
}

async fn serve(socket: WebSocket, state: Arc<AppState>) {
    let id = state.next_session.fetch_add(1, Ordering::Relaxed);
    async move {
        info!("Connection opened");
        metrics::counter!("sessions_opened").increment(1);

        let (rendezvous, private) = match state.rendezvous() {
            Ok(pair) => pair,
            Err(e) => {
                error!("Failed to open frame source: {}", e);
                return;
            }
        };
        let mut session = Session::new(rendezvous, state.actions.clone(), state.session.clone());

        tokio::select! {
            closed = drive(socket, &mut session) => {
                if let Err(e) = closed {
                    debug!("Connection error: {}", e);
                }
            }
            _ = state.shutdown.cancelled() => debug!("Server shutting down"),
        }

        if let Some(private) = private {
            private.trigger();
        }
        info!("Connection closed");
    }
    .instrument(info_span!("session", id))
    .await
}

/// Request loop. Returns when the client closes the connection.
async fn drive(mut socket: WebSocket, session: &mut Session) -> Result<(), axum::Error> {
    while let Some(message) = socket.recv().await {
        let request = match message? {
            Message::Text(text) => Request::decode(&text),
            Message::Binary(_) => Err(SessionError::BadRequest("binary request".into())),
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Close(_) => break,
        };
        let request = match request {
            Ok(request) => request,
            Err(e) => {
                reject(&mut socket, session, e).await?;
                continue;
            }
        };

        let span = debug_span!("request", seq = session.next_request(), kind = request.kind());
        async {
            match session.respond(&request).await {
                Ok(reply) => socket.send(reply.into()).await?,
                Err(e) => reject(&mut socket, session, e).await?,
            }
            session.finish(&request).await;
            Ok::<_, axum::Error>(())
        }
        .instrument(span)
        .await?;
    }
    Ok(())
}

async fn reject(
    socket: &mut WebSocket,
    session: &Session,
    error: SessionError,
) -> Result<(), axum::Error> {
    debug!("Rejected request: {}", error);
    if session.report_errors() {
        let body = json!({ "error": error.to_string() });
        socket.send(Message::Text(body.to_string())).await?;
    }
    Ok(())
}

impl From<Reply> for Message {
    fn from(reply: Reply) -> Self {
        match reply {
            Reply::Text(text) => Message::Text(text),
            Reply::Binary(bytes) => Message::Binary(bytes.to_vec()),
        }
    }
}
