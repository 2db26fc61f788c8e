//! Admission rule tests
//!
//! Producer-in and consumer-out are single-admission roles; consumer-out
//! also needs a connected producer-in at the moment it arrives.

use garden::coordinator::{ConsumerClient, ProducerClient, RepairAgentClient};
use tokio::time::timeout;

use crate::common::{assert_closed_silently, start_default_server, wait_until, WAIT};

#[tokio::test]
async fn test_second_producer_rejected_until_first_leaves() {
    let server = start_default_server().await;

    let first = ProducerClient::connect(server.addr).await.unwrap();
    wait_until("producer admitted", || server.ctx.admission.producer_connected()).await;

    let mut second = ProducerClient::connect(server.addr).await.unwrap();
    assert_closed_silently(second.stream_mut()).await;
    assert!(server.ctx.admission.producer_connected());

    drop(first);
    wait_until("producer slot released", || !server.ctx.admission.producer_connected()).await;

    let mut third = ProducerClient::connect(server.addr).await.unwrap();
    third.degrade(7).await.unwrap();
    wait_until("unit 7 degraded", || server.ctx.units.is_degraded(7).unwrap()).await;
    assert!(server.ctx.admission.producer_connected());
}

#[tokio::test]
async fn test_consumer_rejected_without_producer() {
    let server = start_default_server().await;

    let mut consumer = ConsumerClient::connect(server.addr).await.unwrap();
    assert_closed_silently(consumer.stream_mut()).await;
    assert!(!server.ctx.admission.consumer_connected());
}

#[tokio::test]
async fn test_single_consumer() {
    let server = start_default_server().await;

    let _producer = ProducerClient::connect(server.addr).await.unwrap();
    wait_until("producer admitted", || server.ctx.admission.producer_connected()).await;

    let first = ConsumerClient::connect(server.addr).await.unwrap();
    wait_until("consumer admitted", || server.ctx.admission.consumer_connected()).await;

    let mut second = ConsumerClient::connect(server.addr).await.unwrap();
    assert_closed_silently(second.stream_mut()).await;

    // An idle consumer that leaves frees its slot without any fix traffic
    drop(first);
    wait_until("consumer slot released", || !server.ctx.admission.consumer_connected()).await;

    let _replacement = ConsumerClient::connect(server.addr).await.unwrap();
    wait_until("replacement admitted", || server.ctx.admission.consumer_connected()).await;
}

#[tokio::test]
async fn test_consumer_outlives_producer() {
    let server = start_default_server().await;

    let producer = ProducerClient::connect(server.addr).await.unwrap();
    wait_until("producer admitted", || server.ctx.admission.producer_connected()).await;

    let mut consumer = ConsumerClient::connect(server.addr).await.unwrap();
    wait_until("consumer admitted", || server.ctx.admission.consumer_connected()).await;

    drop(producer);
    wait_until("producer slot released", || !server.ctx.admission.producer_connected()).await;
    assert!(server.ctx.admission.consumer_connected());

    let mut producer = ProducerClient::connect(server.addr).await.unwrap();
    producer.degrade(5).await.unwrap();
    wait_until("unit 5 degraded", || server.ctx.units.is_degraded(5).unwrap()).await;

    let mut agent = RepairAgentClient::connect(server.addr).await.unwrap();
    assert!(agent.poll(5).await.unwrap());

    let fix = timeout(WAIT, consumer.next_fix()).await.unwrap().unwrap();
    assert_eq!(fix, Some(5));
}

#[tokio::test]
async fn test_repair_agents_are_unbounded() {
    let server = start_default_server().await;

    let mut agents = Vec::new();
    for _ in 0..32 {
        agents.push(RepairAgentClient::connect(server.addr).await.unwrap());
    }

    for (i, agent) in agents.iter_mut().enumerate() {
        assert!(!agent.poll((i % 10) as u64).await.unwrap());
    }
}
