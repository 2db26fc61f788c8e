//! Common test utilities

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use garden::coordinator::{CoordinatorConfig, CoordinatorServer, ServerContext};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Instant};

/// How long any single wait in a test may take
pub const WAIT: Duration = Duration::from_secs(5);

/// A server running on an ephemeral loopback port
pub struct TestServer {
    pub addr: SocketAddr,
    pub ctx: Arc<ServerContext>,
}

/// Start a server with the given sizes
pub async fn start_server(
    unit_count: usize,
    queue_capacity: usize,
    observer_capacity: usize,
) -> TestServer {
    let config = CoordinatorConfig::builder()
        .bind_address_str("127.0.0.1:0")
        .unwrap()
        .unit_count(unit_count)
        .queue_capacity(queue_capacity)
        .observer_capacity(observer_capacity)
        .build()
        .unwrap();

    let server = CoordinatorServer::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap();
    let ctx = server.context();
    tokio::spawn(server.run());

    TestServer { addr, ctx }
}

/// Start a server with default sizes
#[allow(dead_code)]
pub async fn start_default_server() -> TestServer {
    start_server(10, 10, 10).await
}

/// Poll `cond` until it holds, panicking after [`WAIT`]
pub async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        sleep(Duration::from_millis(5)).await;
    }
}

/// Assert the server closed `stream` without sending anything
#[allow(dead_code)]
pub async fn assert_closed_silently(stream: &mut TcpStream) {
    let mut buf = [0u8; 16];
    match timeout(WAIT, stream.read(&mut buf)).await {
        Ok(Ok(0)) => {}
        Ok(Ok(n)) => panic!("expected close, received {n} bytes"),
        Ok(Err(e)) => assert_eq!(e.kind(), std::io::ErrorKind::ConnectionReset),
        Err(_) => panic!("connection was not closed"),
    }
}
