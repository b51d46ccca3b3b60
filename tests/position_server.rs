// End-to-end checks against a live server on an ephemeral port.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use page_tracker_rs::backoff::Backoff;
use page_tracker_rs::client::{ClientEvent, PositionClient};
use page_tracker_rs::protocol::{Command, ServerEvent};
use page_tracker_rs::server;
use page_tracker_rs::{ServerConfig, Session};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(3);

fn test_config() -> ServerConfig {
    ServerConfig {
        bind: "127.0.0.1:0".to_string(),
        tick: Duration::from_millis(10),
        ..ServerConfig::default()
    }
}

async fn start_server_on(listener: TcpListener) -> Session {
    start_server_with(listener, test_config()).await
}

async fn start_server_with(listener: TcpListener, config: ServerConfig) -> Session {
    let session = Session::new(&config, None);
    tokio::spawn(server::serve(listener, session.clone(), config.send_timeout));
    session
}

async fn start_server() -> (SocketAddr, Session) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (addr, start_server_on(listener).await)
}

async fn open(addr: SocketAddr) -> Socket {
    let (socket, _) = connect_async(format!("ws://{}/", addr)).await.unwrap();
    socket
}

async fn send(socket: &mut Socket, command: Command) {
    socket.send(Message::Text(command.encode())).await.unwrap();
}

async fn next_event(socket: &mut Socket) -> ServerEvent {
    loop {
        let message = timeout(WAIT, socket.next())
            .await
            .expect("timed out waiting for server event")
            .expect("stream ended")
            .unwrap();
        if let Message::Text(text) = message {
            return ServerEvent::decode(&text).expect("undecodable server event");
        }
    }
}

/// Connect and consume the greeting snapshot.
async fn join(addr: SocketAddr) -> Socket {
    let mut socket = open(addr).await;
    assert!(matches!(next_event(&mut socket).await, ServerEvent::State { .. }));
    socket
}

async fn wait_for_clients(session: &Session, count: usize) {
    timeout(WAIT, async {
        while session.clients().len() != count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("client count never settled");
}

#[tokio::test]
async fn test_snapshot_on_connect() {
    let (addr, session) = start_server().await;
    session.handle_command(Command::SetTotal { total: 50 });
    session.handle_command(Command::SetPosition { position: 12 });

    let mut socket = open(addr).await;
    assert_eq!(
        next_event(&mut socket).await,
        ServerEvent::State { position: 12, calibrated: false, running: false, total_chars: 50 }
    );
}

#[tokio::test]
async fn test_fan_out_survives_a_departure() {
    let (addr, session) = start_server().await;
    let mut a = join(addr).await;
    let mut b = join(addr).await;
    let mut c = join(addr).await;
    wait_for_clients(&session, 3).await;

    send(&mut a, Command::SetTotal { total: 20 }).await;
    send(&mut a, Command::SetPosition { position: 5 }).await;
    for socket in [&mut a, &mut b, &mut c] {
        assert_eq!(next_event(socket).await, ServerEvent::Position { position: 5 });
    }

    b.close(None).await.unwrap();
    wait_for_clients(&session, 2).await;

    send(&mut c, Command::SetPosition { position: 9 }).await;
    for socket in [&mut a, &mut c] {
        assert_eq!(next_event(socket).await, ServerEvent::Position { position: 9 });
    }
}

#[tokio::test]
async fn test_calibrate_broadcasts_origin() {
    let (addr, _session) = start_server().await;
    let mut a = join(addr).await;
    let mut b = join(addr).await;

    send(&mut a, Command::SetTotal { total: 10 }).await;
    send(&mut a, Command::SetPosition { position: 4 }).await;
    assert_eq!(next_event(&mut b).await, ServerEvent::Position { position: 4 });

    send(&mut a, Command::Calibrate).await;
    assert_eq!(next_event(&mut b).await, ServerEvent::Calibrated { position: 0 });
}

#[tokio::test]
async fn test_simulation_runs_to_done() {
    let (addr, session) = start_server().await;
    let mut socket = join(addr).await;

    send(&mut socket, Command::SetTotal { total: 5 }).await;
    send(&mut socket, Command::StartSim).await;

    for expected in 1..=4 {
        assert_eq!(next_event(&mut socket).await, ServerEvent::Position { position: expected });
    }
    assert_eq!(next_event(&mut socket).await, ServerEvent::Done);

    timeout(WAIT, async {
        while session.state().running {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("simulation never stopped");
    assert_eq!(session.state().position, 4);
}

#[tokio::test]
async fn test_malformed_messages_are_ignored() {
    let (addr, session) = start_server().await;
    let mut socket = join(addr).await;

    socket.send(Message::Text("{not json".into())).await.unwrap();
    socket.send(Message::Text(r#"{"cmd":"launch"}"#.into())).await.unwrap();
    socket.send(Message::Binary(vec![1, 2, 3])).await.unwrap();

    send(&mut socket, Command::SetTotal { total: 8 }).await;
    send(&mut socket, Command::SetPosition { position: 3 }).await;
    assert_eq!(next_event(&mut socket).await, ServerEvent::Position { position: 3 });
    assert_eq!(session.clients().len(), 1);
}

#[tokio::test]
async fn test_client_replays_commands_after_server_appears() {
    // Reserve a port, then release it so the first attempts fail.
    let reserved = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = reserved.local_addr().unwrap();
    drop(reserved);

    let backoff = Backoff::new(Duration::from_millis(20), Duration::from_millis(100));
    let mut client = PositionClient::spawn(&format!("ws://{}/", addr), backoff).unwrap();
    client.send(Command::SetTotal { total: 42 }).unwrap();
    client.send(Command::Calibrate).unwrap();
    client.send(Command::SetPosition { position: 7 }).unwrap();

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(!client.is_connected());

    let listener = TcpListener::bind(addr).await.unwrap();
    let session = start_server_on(listener).await;

    let mut seen = Vec::new();
    timeout(WAIT, async {
        while let Some(event) = client.next_event().await {
            let last = event == ClientEvent::Server(ServerEvent::Position { position: 7 });
            seen.push(event);
            if last {
                break;
            }
        }
    })
    .await
    .expect("replayed commands never took effect");

    assert_eq!(seen.first(), Some(&ClientEvent::Connected));
    assert!(seen.contains(&ClientEvent::Server(ServerEvent::Calibrated { position: 0 })));

    let state = session.state();
    assert_eq!(state.total_chars, 42);
    assert!(state.calibrated);
    assert_eq!(state.position, 7);
}

#[tokio::test]
async fn test_reset_over_the_wire() {
    let (addr, session) = start_server().await;
    let mut a = join(addr).await;
    let mut b = join(addr).await;

    send(&mut a, Command::StartSim).await;
    assert_eq!(next_event(&mut b).await, ServerEvent::Position { position: 1 });

    send(&mut a, Command::Reset).await;
    for socket in [&mut a, &mut b] {
        loop {
            if next_event(socket).await == (ServerEvent::Position { position: 0 }) {
                break;
            }
        }
    }

    let state = session.state();
    assert_eq!(state.position, 0);
    assert!(!state.running);
    assert!(timeout(Duration::from_millis(60), b.next()).await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_commands_are_seen_in_one_order() {
    let (addr, session) = start_server().await;
    let mut a = join(addr).await;
    let mut b = join(addr).await;
    wait_for_clients(&session, 2).await;

    send(&mut a, Command::SetTotal { total: 1000 }).await;
    let (mut a_tx, mut a_rx) = a.split();
    let (mut b_tx, mut b_rx) = b.split();

    let a_send = tokio::spawn(async move {
        for position in (0..100).map(|i| i * 2) {
            a_tx.send(Message::Text(Command::SetPosition { position }.encode())).await.unwrap();
        }
        a_tx
    });
    let b_send = tokio::spawn(async move {
        for position in (0..100).map(|i| i * 2 + 1) {
            b_tx.send(Message::Text(Command::SetPosition { position }.encode())).await.unwrap();
        }
        b_tx
    });
    let _a_tx = a_send.await.unwrap();
    let _b_tx = b_send.await.unwrap();

    async fn collect(
        rx: &mut (impl futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin),
    ) -> Vec<ServerEvent> {
        let mut seen = Vec::new();
        while seen.len() < 200 {
            let message = timeout(WAIT, rx.next()).await.expect("missing events").unwrap().unwrap();
            if let Message::Text(text) = message {
                seen.extend(ServerEvent::decode(&text));
            }
        }
        seen
    }
    let seen_a = collect(&mut a_rx).await;
    let seen_b = collect(&mut b_rx).await;

    assert_eq!(seen_a, seen_b);
    assert_eq!(
        seen_a.last(),
        Some(&ServerEvent::Position { position: session.state().position })
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stalled_consumer_is_dropped() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = ServerConfig {
        send_timeout: Duration::from_millis(100),
        client_queue: 1024,
        ..test_config()
    };
    let session = start_server_with(listener, config).await;

    let mut healthy = join(addr).await;

    // Tiny receive window and never read after the handshake.
    let socket = TcpSocket::new_v4().unwrap();
    socket.set_recv_buffer_size(4096).unwrap();
    let stream = socket.connect(addr).await.unwrap();
    let (_stalled, _) = tokio_tungstenite::client_async(format!("ws://{}/", addr), stream).await.unwrap();
    wait_for_clients(&session, 2).await;

    let received = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&received);
    let reader = tokio::spawn(async move {
        while let Some(Ok(_)) = healthy.next().await {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    });

    timeout(Duration::from_secs(20), async {
        let mut position = 0u32;
        while session.clients().len() > 1 {
            for _ in 0..32 {
                position = (position + 1) % 1000;
                session.handle_command(Command::SetPosition { position });
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("stalled consumer was never dropped");

    assert_eq!(session.clients().len(), 1);
    let before = received.load(Ordering::Relaxed);
    session.handle_command(Command::SetPosition { position: 3 });
    timeout(WAIT, async {
        while received.load(Ordering::Relaxed) <= before {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("healthy consumer stopped receiving");
    reader.abort();
}
