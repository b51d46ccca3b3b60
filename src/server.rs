use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{sink::SinkExt, stream::StreamExt};
use tokio::net::TcpListener;
use tokio::time::timeout;

use crate::session::Session;

#[derive(Clone)]
struct AppState {
    session: Session,
    send_timeout: Duration,
}

pub fn router(session: Session, send_timeout: Duration) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .with_state(AppState { session, send_timeout })
}

/// Serve consumers on an already-bound listener until the process exits.
pub async fn serve(listener: TcpListener, session: Session, send_timeout: Duration) -> Result<()> {
    let addr = listener.local_addr().context("listener has no local address")?;
    log::info!("Position server listening on ws://{}", addr);

    axum::serve(listener, router(session, send_timeout))
        .await
        .context("position server stopped")
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (id, mut outbound) = state.session.connect();
    let send_timeout = state.send_timeout;

    // Writer: drains this consumer's queue; a write that cannot finish in
    // time ends the connection instead of holding up anyone else.
    let mut writer = tokio::spawn(async move {
        while let Some(event) = outbound.recv().await {
            let frame = Message::Text(event.encode());
            match timeout(send_timeout, sender.send(frame)).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => break,
                Err(_) => {
                    log::warn!("Consumer {} write timed out", id);
                    break;
                }
            }
        }
        let _ = sender.close().await;
    });

    loop {
        tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => state.session.handle_text(&text),
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            _ = &mut writer => break,
        }
    }

    state.session.disconnect(id);
    writer.abort();
}
