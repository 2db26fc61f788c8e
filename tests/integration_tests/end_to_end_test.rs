//! End-to-end flow tests
//!
//! 1. Producer reports a unit degraded
//! 2. Repair agent polls it and repairs it
//! 3. Consumer receives the fix event

use std::collections::HashSet;
use std::time::Duration;

use garden::commands::{gardener, GardenerParams};
use garden::coordinator::protocol;
use garden::coordinator::{
    ConnectionRole, ConsumerClient, ObserverClient, ProducerClient, RepairAgentClient,
};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::common::{start_default_server, start_server, wait_until, WAIT};

#[tokio::test]
async fn test_degrade_repair_consume() {
    let server = start_default_server().await;

    let mut producer = ProducerClient::connect(server.addr).await.unwrap();
    producer.degrade(3).await.unwrap();
    wait_until("unit 3 degraded", || server.ctx.units.is_degraded(3).unwrap()).await;

    let mut agent = RepairAgentClient::connect(server.addr).await.unwrap();
    assert!(agent.poll(3).await.unwrap());
    wait_until("fix event queued", || server.ctx.queue.len() == 1).await;

    let mut consumer = ConsumerClient::connect(server.addr).await.unwrap();
    let fix = timeout(WAIT, consumer.next_fix()).await.unwrap().unwrap();
    assert_eq!(fix, Some(3));

    assert!(!agent.poll(3).await.unwrap());
}

#[tokio::test]
async fn test_poll_reports_degradation_once_per_degrade() {
    let server = start_server(10, 20, 1).await;

    let mut producer = ProducerClient::connect(server.addr).await.unwrap();
    for unit in 0..10 {
        producer.degrade(unit).await.unwrap();
    }
    wait_until("all units degraded", || server.ctx.units.degraded_count() == 10).await;

    let mut agent = RepairAgentClient::connect(server.addr).await.unwrap();
    for unit in 0..10 {
        assert!(agent.poll(unit).await.unwrap(), "unit {unit}");
        assert!(!agent.poll(unit).await.unwrap(), "unit {unit}");
    }
    assert_eq!(server.ctx.units.degraded_count(), 0);
}

#[tokio::test]
async fn test_untouched_unit_polls_false() {
    let server = start_default_server().await;

    let mut agent = RepairAgentClient::connect(server.addr).await.unwrap();
    for unit in 0..10 {
        assert!(!agent.poll(unit).await.unwrap());
    }
    assert!(server.ctx.queue.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_full_queue_applies_backpressure_without_loss() {
    let server = start_server(10, 2, 1).await;

    let mut producer = ProducerClient::connect(server.addr).await.unwrap();
    for unit in 0..3 {
        producer.degrade(unit).await.unwrap();
    }
    wait_until("three units degraded", || server.ctx.units.degraded_count() == 3).await;

    // The third repair is acknowledged, then its handler parks on the full queue
    let mut agent = RepairAgentClient::connect(server.addr).await.unwrap();
    for unit in 0..3 {
        assert!(agent.poll(unit).await.unwrap());
    }
    wait_until("queue full", || server.ctx.queue.len() == 2).await;

    let mut consumer = ConsumerClient::connect(server.addr).await.unwrap();
    let mut delivered = Vec::new();
    for _ in 0..3 {
        let fix = timeout(WAIT, consumer.next_fix()).await.unwrap().unwrap();
        delivered.push(fix.unwrap());
    }
    assert_eq!(delivered, vec![0, 1, 2]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_agents_on_disjoint_units() {
    let units = 16u64;
    let server = start_server(units as usize, 4, 1).await;

    let mut producer = ProducerClient::connect(server.addr).await.unwrap();
    for unit in 0..units {
        producer.degrade(unit).await.unwrap();
    }
    wait_until("all units degraded", || {
        server.ctx.units.degraded_count() == units as usize
    })
    .await;

    let mut consumer = ConsumerClient::connect(server.addr).await.unwrap();

    let agents: Vec<_> = (0..units)
        .map(|unit| {
            let addr = server.addr;
            tokio::spawn(async move {
                let mut agent = RepairAgentClient::connect(addr).await.unwrap();
                agent.poll(unit).await.unwrap()
            })
        })
        .collect();

    let mut delivered = HashSet::new();
    for _ in 0..units {
        let fix = timeout(WAIT, consumer.next_fix()).await.unwrap().unwrap();
        assert!(delivered.insert(fix.unwrap()), "duplicate fix event");
    }

    for agent in agents {
        assert!(agent.await.unwrap());
    }
    assert_eq!(delivered, (0..units).collect::<HashSet<_>>());
}

#[tokio::test]
async fn test_gardener_command_repairs_degraded_units() {
    let server = start_server(6, 10, 1).await;

    let mut producer = ProducerClient::connect(server.addr).await.unwrap();
    for unit in [1, 4] {
        producer.degrade(unit).await.unwrap();
    }
    wait_until("two units degraded", || server.ctx.units.degraded_count() == 2).await;

    let report = gardener(GardenerParams {
        address: server.addr,
        unit_count: 6,
        max_delay: Duration::ZERO,
        rounds: Some(2),
    })
    .await
    .unwrap();

    assert_eq!(report.polls, 12);
    assert_eq!(report.repaired, 2);
    assert_eq!(server.ctx.queue.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_departed_consumer_leaves_queued_fixes() {
    let capacity = 10;
    let server = start_server(10, capacity, 1).await;

    let mut observer = ObserverClient::connect(server.addr).await.unwrap();
    wait_until("observer registered", || server.ctx.observers.len() == 1).await;

    let _producer = ProducerClient::connect(server.addr).await.unwrap();
    wait_until("producer admitted", || server.ctx.admission.producer_connected()).await;
    for unit in 0..capacity as u64 {
        server.ctx.queue.push(unit).await.unwrap();
    }

    let mut consumer = TcpStream::connect(server.addr).await.unwrap();
    protocol::write_role(&mut consumer, ConnectionRole::ConsumerOut)
        .await
        .unwrap();
    drop(consumer);

    loop {
        let line = timeout(WAIT, observer.next_line())
            .await
            .unwrap()
            .unwrap()
            .expect("observer closed");
        if line == "connected consumer-out" {
            break;
        }
    }
    wait_until("consumer slot released", || !server.ctx.admission.consumer_connected()).await;

    // Only a unit already popped when the close arrived may be lost
    let remaining = server.ctx.queue.len();
    assert!(remaining >= capacity - 1, "{remaining} of {capacity} fixes left");

    let mut replacement = ConsumerClient::connect(server.addr).await.unwrap();
    let fix = timeout(WAIT, replacement.next_fix()).await.unwrap().unwrap();
    assert_eq!(fix, Some((capacity - remaining) as u64));
}
