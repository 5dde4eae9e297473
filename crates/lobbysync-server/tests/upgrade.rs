#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::{sleep, timeout, Instant};

use lobbysync_client::{ClientOptions, ClientSocket, Connector, Outgoing, TransportEvent, WsConnector};
use lobbysync_server::app_state::AppState;
use lobbysync_server::{config, router};

const CFG: &str = r#"
version: 1
server:
  listen: "127.0.0.1:0"
  path: "/ws"
  ping_interval_ms: 100
lobbies:
  - key: "main"
"#;

async fn serve() -> (AppState, SocketAddr) {
    let state = AppState::new(config::load_from_str(CFG).unwrap()).unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router::build_router(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (state, addr)
}

async fn eventually(what: &str, check: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn unknown_lobby_is_refused_with_a_reason() {
    let (_state, addr) = serve().await;
    let mut options = ClientOptions::new(format!("ws://{addr}/ws/x"));
    options.reconnect_delay = Duration::ZERO;
    let socket = ClientSocket::new(options).unwrap();

    socket.connect().await.unwrap();
    eventually("refusal reason", || socket.close_reason().is_some()).await;
    assert_eq!(socket.close_reason().as_deref(), Some("unknown lobby x"));
    assert!(!socket.is_connected());
}

#[tokio::test]
async fn admitted_handle_gets_keepalives_and_is_released_on_close() {
    let (state, addr) = serve().await;
    let names = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&names);
    state.sessions().on_handle_connected().add(move |(_, handle)| {
        seen.lock().unwrap().push(handle.fields().name.clone());
    });
    let released = Arc::new(Mutex::new(0usize));
    let count = Arc::clone(&released);
    state.sessions().on_handle_disconnected().add(move |_| {
        *count.lock().unwrap() += 1;
    });

    let endpoint = format!("ws://{addr}/ws/main?name=Jo%C3%A9l%20B");
    let mut link = WsConnector.connect(&endpoint).await.unwrap();

    let ping = timeout(Duration::from_secs(2), async {
        loop {
            match link.incoming.recv().await {
                Some(TransportEvent::Frame(text)) if text.starts_with("@PING-") => return text,
                Some(TransportEvent::Frame(_)) => continue,
                other => panic!("link ended before a keepalive: {other:?}"),
            }
        }
    })
    .await
    .expect("keepalive within the ping interval");
    assert!(ping.len() > "@PING-".len());

    let lobby = state.sessions().get_lobby("main").unwrap();
    assert_eq!(lobby.handle_count(), 1);
    assert_eq!(*names.lock().unwrap(), vec!["Jo\u{e9}l B".to_owned()]);

    link.outgoing.send(Outgoing::Close).unwrap();
    eventually("handle release", || *released.lock().unwrap() == 1).await;
    assert_eq!(lobby.handle_count(), 0);

    sleep(Duration::from_millis(200)).await;
    assert_eq!(*released.lock().unwrap(), 1);
}
