//! Fault-injection tests for the mock network
//!
//! Verifies the statistical behaviour of the loss model and that delayed
//! delivery reorders datagrams without losing them.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use sensnet_transport::{DatagramBinder, DatagramTransport, LossModel, MockNetwork, MockNetworkConfig};

fn addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

#[tokio::test]
async fn test_partial_loss_rate_is_roughly_respected() {
    let network = MockNetwork::with_config(MockNetworkConfig {
        loss: LossModel::new(0.3, Duration::ZERO).unwrap(),
        seed: 7,
        ..Default::default()
    });
    let a = network.bind(addr(9100)).await.unwrap();
    let _b = network.bind(addr(9101)).await.unwrap();

    for _ in 0..2_000 {
        a.send_to(b"m", addr(9101)).await.unwrap();
    }

    let stats = network.stats();
    assert_eq!(stats.sent, 2_000);
    // 30% of 2000 = 600; allow a wide margin for the seeded sample
    assert!(
        (450..=750).contains(&stats.dropped),
        "dropped {} of 2000",
        stats.dropped
    );
}

#[tokio::test]
async fn test_delayed_delivery_loses_nothing() {
    let network = MockNetwork::with_config(MockNetworkConfig {
        loss: LossModel::new(0.0, Duration::from_millis(5)).unwrap(),
        seed: 11,
        ..Default::default()
    });
    let a = network.bind(addr(9200)).await.unwrap();
    let b = network.bind(addr(9201)).await.unwrap();

    for i in 0u8..50 {
        a.send_to(&[i], addr(9201)).await.unwrap();
    }

    let mut seen = HashSet::new();
    let mut buf = [0u8; 4];
    while seen.len() < 50 {
        let (len, from) = b.recv_from(&mut buf, Duration::from_secs(2)).await.unwrap();
        assert_eq!(len, 1);
        assert_eq!(from, addr(9200));
        seen.insert(buf[0]);
    }
    assert_eq!(seen.len(), 50);
}

#[tokio::test]
async fn test_concurrent_receivers_share_one_socket() {
    let network = MockNetwork::new();
    let a = network.bind(addr(9300)).await.unwrap();
    let b = network.bind(addr(9301)).await.unwrap();

    let mut waiters = Vec::new();
    for _ in 0..4 {
        let b = b.clone();
        waiters.push(tokio::spawn(async move {
            let mut buf = [0u8; 8];
            b.recv_from(&mut buf, Duration::from_secs(2)).await.map(|(len, _)| len)
        }));
    }

    for _ in 0..4 {
        a.send_to(b"ack", addr(9301)).await.unwrap();
    }

    for waiter in waiters {
        assert_eq!(waiter.await.unwrap().unwrap(), 3);
    }
}
