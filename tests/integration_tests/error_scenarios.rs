//! Protocol violation and disconnect scenarios
//!
//! A bad connection is closed on its own; the server and every other
//! connection carry on.

use garden::coordinator::protocol;
use garden::coordinator::{ConnectionRole, ProducerClient, RepairAgentClient};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::common::{assert_closed_silently, start_default_server, wait_until};

#[tokio::test]
async fn test_unknown_role_tag_closed() {
    let server = start_default_server().await;

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream.write_all(&99u32.to_le_bytes()).await.unwrap();
    assert_closed_silently(&mut stream).await;

    let mut agent = RepairAgentClient::connect(server.addr).await.unwrap();
    assert!(!agent.poll(0).await.unwrap());
}

#[tokio::test]
async fn test_short_role_tag_ignored() {
    let server = start_default_server().await;

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream.write_all(&[1, 0]).await.unwrap();
    drop(stream);

    let _producer = ProducerClient::connect(server.addr).await.unwrap();
    wait_until("producer admitted", || server.ctx.admission.producer_connected()).await;
}

#[tokio::test]
async fn test_producer_out_of_range_unit_closes_and_releases_slot() {
    let server = start_default_server().await;

    let mut producer = ProducerClient::connect(server.addr).await.unwrap();
    wait_until("producer admitted", || server.ctx.admission.producer_connected()).await;

    producer.degrade(10).await.unwrap();
    assert_closed_silently(producer.stream_mut()).await;
    wait_until("producer slot released", || !server.ctx.admission.producer_connected()).await;
    assert_eq!(server.ctx.units.degraded_count(), 0);

    let mut replacement = ProducerClient::connect(server.addr).await.unwrap();
    replacement.degrade(9).await.unwrap();
    wait_until("unit 9 degraded", || server.ctx.units.is_degraded(9).unwrap()).await;
}

#[tokio::test]
async fn test_repair_agent_out_of_range_unit_closes() {
    let server = start_default_server().await;

    let mut agent = RepairAgentClient::connect(server.addr).await.unwrap();
    assert!(agent.poll(u64::MAX).await.is_err());

    let mut other = RepairAgentClient::connect(server.addr).await.unwrap();
    assert!(!other.poll(9).await.unwrap());
}

#[tokio::test]
async fn test_partial_record_treated_as_disconnect() {
    let server = start_default_server().await;

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    protocol::write_role(&mut stream, ConnectionRole::ProducerIn)
        .await
        .unwrap();
    wait_until("producer admitted", || server.ctx.admission.producer_connected()).await;

    stream.write_all(&[3, 0, 0]).await.unwrap();
    drop(stream);

    wait_until("producer slot released", || !server.ctx.admission.producer_connected()).await;
    assert_eq!(server.ctx.units.degraded_count(), 0);
}
