//! Consumer-side connection to the position server.
//!
//! Commands issued while the link is down are held and replayed in their
//! original order once it comes back. Reconnection follows [`Backoff`].

use std::collections::VecDeque;
use std::time::Duration;

use futures::{sink::SinkExt, stream::StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::backoff::Backoff;
use crate::error::ClientError;
use crate::protocol::{Command, ServerEvent};

/// Upper bound on the opening handshake and on each outbound frame.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientEvent {
    Connected,
    Disconnected,
    Server(ServerEvent),
}

pub struct PositionClient {
    commands: mpsc::UnboundedSender<Command>,
    events: mpsc::UnboundedReceiver<ClientEvent>,
    connected: watch::Receiver<bool>,
    task: JoinHandle<()>,
}

impl PositionClient {
    /// Start the connection task. Returns immediately; the first connection
    /// attempt happens in the background.
    pub fn spawn(url: &str, backoff: Backoff) -> Result<Self, ClientError> {
        Self::spawn_with_timeout(url, backoff, DEFAULT_IO_TIMEOUT)
    }

    /// Like [`PositionClient::spawn`], with an explicit handshake and send
    /// timeout. A server that stops answering counts as a lost connection.
    pub fn spawn_with_timeout(url: &str, backoff: Backoff, io_timeout: Duration) -> Result<Self, ClientError> {
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(ClientError::InvalidUrl(url.to_string()));
        }

        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        let (connected_tx, connected) = watch::channel(false);

        let task = tokio::spawn(run(url.to_string(), backoff, io_timeout, commands_rx, events_tx, connected_tx));

        Ok(Self { commands, events, connected, task })
    }

    /// Queue a command. Sent now if connected, otherwise after reconnecting.
    pub fn send(&self, command: Command) -> Result<(), ClientError> {
        self.commands.send(command).map_err(|_| ClientError::Closed)
    }

    pub async fn next_event(&mut self) -> Option<ClientEvent> {
        self.events.recv().await
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }
}

impl Drop for PositionClient {
    fn drop(&mut self) {
        self.task.abort();
    }
}

enum LinkEnd {
    Lost,
    Shutdown,
}

async fn run(
    url: String,
    mut backoff: Backoff,
    io_timeout: Duration,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<ClientEvent>,
    connected: watch::Sender<bool>,
) {
    // Commands whose send failed mid-link; always older than anything still
    // waiting in `commands`.
    let mut pending: VecDeque<Command> = VecDeque::new();

    loop {
        match timeout(io_timeout, connect_async(url.as_str())).await {
            Ok(Ok((stream, _))) => {
                log::info!("Connected to {}", url);
                backoff.record_success();
                connected.send_replace(true);
                let _ = events.send(ClientEvent::Connected);

                let end = link(stream, io_timeout, &mut pending, &mut commands, &events).await;

                connected.send_replace(false);
                let _ = events.send(ClientEvent::Disconnected);
                if let LinkEnd::Shutdown = end {
                    return;
                }
                log::warn!("Lost connection to {}", url);
            }
            Ok(Err(err)) => log::debug!("Connect to {} failed: {}", url, err),
            Err(_) => log::debug!("Handshake with {} timed out after {:?}", url, io_timeout),
        }

        let wait = backoff.record_failure();
        log::debug!("Reconnect attempt {} in {:.1}s", backoff.attempts(), wait.as_secs_f64());
        tokio::time::sleep(wait).await;
    }
}

async fn link<S>(
    stream: S,
    io_timeout: Duration,
    pending: &mut VecDeque<Command>,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    events: &mpsc::UnboundedSender<ClientEvent>,
) -> LinkEnd
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
        + futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error>
        + Unpin,
{
    let (mut sink, mut incoming) = stream.split();

    while let Some(command) = pending.front() {
        let frame = Message::Text(command.encode());
        if !matches!(timeout(io_timeout, sink.send(frame)).await, Ok(Ok(()))) {
            return LinkEnd::Lost;
        }
        pending.pop_front();
    }

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => {
                    let frame = Message::Text(command.encode());
                    if !matches!(timeout(io_timeout, sink.send(frame)).await, Ok(Ok(()))) {
                        pending.push_front(command);
                        return LinkEnd::Lost;
                    }
                }
                None => {
                    let _ = sink.close().await;
                    return LinkEnd::Shutdown;
                }
            },
            message = incoming.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if let Some(event) = ServerEvent::decode(&text) {
                        let _ = events.send(ClientEvent::Server(event));
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return LinkEnd::Lost,
                Some(Ok(_)) => {}
            },
        }
    }
}
