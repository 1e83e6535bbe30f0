//! End-to-end tests driving real daemons over loopback UDP.
//!
//! The test process plays the part of a scripted neighbor router: it binds
//! its own socket, speaks the update protocol by hand and asserts on the
//! advertisements the daemons emit.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::timeout;

use ripd::{RipConfig, RipEntry, RipPacket, RipRoutingDaemon, RouterConfig, RouterId, INFINITY};

/// Reserves `n` distinct loopback ports for daemon input sockets.
fn free_ports(n: usize) -> Vec<u16> {
    let sockets = (0..n)
        .map(|_| std::net::UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap())
        .collect::<Vec<_>>();
    sockets
        .iter()
        .map(|s| s.local_addr().unwrap().port())
        .collect()
}

async fn test_socket() -> (Arc<UdpSocket>, u16) {
    let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let port = socket.local_addr().unwrap().port();
    (Arc::new(socket), port)
}

async fn spawn_router(config: &str, cfg: RipConfig) {
    let router = RouterConfig::parse(config).unwrap();
    let daemon = RipRoutingDaemon::bind(router, cfg).await.unwrap();
    let _running = tokio::spawn(daemon.deploy());
}

/// A minimal update whose only entry names the receiver itself, serving as
/// liveness evidence for the sender.
fn hello(from: RouterId, to: RouterId) -> Vec<u8> {
    RipPacket::response(
        to,
        vec![RipEntry {
            source: from,
            dest: to,
            first_hop: from,
            metric: 0,
        }],
    )
    .encode()
}

/// Receives advertisements addressed to `local_id` until one satisfies the
/// predicate.
async fn wait_for_ad<F>(socket: &UdpSocket, local_id: RouterId, mut pred: F) -> RipPacket
where
    F: FnMut(&RipPacket) -> bool,
{
    timeout(Duration::from_secs(8), async {
        let mut buf = [0u8; 4096];
        loop {
            let (n, _) = socket.recv_from(&mut buf).await.unwrap();
            if let Ok(pkt) = RipPacket::decode(&buf[..n], local_id) {
                if pred(&pkt) {
                    return pkt;
                }
            }
        }
    })
    .await
    .expect("timed out waiting for advertisement")
}

fn entry(pkt: &RipPacket, dest: RouterId) -> Option<RipEntry> {
    pkt.entries.iter().copied().find(|e| e.dest == dest)
}

#[tokio::test]
async fn seeds_directly_configured_routes() {
    let ports = free_ports(1);
    let (_socket, test_port) = test_socket().await;

    let router = RouterConfig::parse(&format!(
        "router-id 1\ninput-ports {}\noutputs {test_port}-4-2\n",
        ports[0]
    ))
    .unwrap();
    let daemon = RipRoutingDaemon::bind(router, RipConfig::default())
        .await
        .unwrap();

    let route = daemon.table().get(2).unwrap();
    assert_eq!((route.first_hop, route.metric), (1, 4));
    assert!(route.active);
    assert!(daemon.table().get(1).is_none());
}

#[tokio::test]
async fn bind_failure_names_the_port() {
    let (_socket, taken) = test_socket().await;

    let router = RouterConfig::parse(&format!(
        "router-id 1\ninput-ports {taken}\noutputs 2002-1-2\n"
    ))
    .unwrap();
    let err = RipRoutingDaemon::bind(router, RipConfig::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains(&taken.to_string()));
}

#[tokio::test]
async fn poisons_routes_advertised_back_to_their_first_hop() {
    let ports = free_ports(1);
    let (socket, test_port) = test_socket().await;

    // The test plays router 2, the daemon's only neighbor.
    spawn_router(
        &format!(
            "router-id 1\ninput-ports {}\noutputs {test_port}-1-2\n",
            ports[0]
        ),
        RipConfig::from_timeout(Duration::from_secs(3)),
    )
    .await;

    // Teach the daemon a route to router 3 through us, and keep its route
    // to us fresh on the side.
    let update = RipPacket::response(
        1,
        vec![
            RipEntry {
                source: 2,
                dest: 1,
                first_hop: 2,
                metric: 0,
            },
            RipEntry {
                source: 2,
                dest: 3,
                first_hop: 2,
                metric: 1,
            },
        ],
    )
    .encode();
    let keepalive = socket.clone();
    let daemon_addr = (Ipv4Addr::LOCALHOST, ports[0]);
    tokio::spawn(async move {
        loop {
            let _ = keepalive.send_to(&update, daemon_addr).await;
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    });

    // The route to 3 goes through us, so it must come back poisoned; the
    // daemon's direct route to us is advertised with its real metric.
    let pkt = wait_for_ad(&socket, 2, |pkt| {
        entry(pkt, 3).is_some() && entry(pkt, 2).is_some_and(|e| e.metric == 1)
    })
    .await;
    assert_eq!(entry(&pkt, 3).unwrap().metric, INFINITY);
    assert_eq!(entry(&pkt, 3).unwrap().first_hop, 2);
    assert_eq!(entry(&pkt, 2).unwrap().first_hop, 1);
    assert!(pkt.entries.iter().all(|e| e.source == 1));
}

#[tokio::test]
async fn relaxes_to_the_cheaper_path_through_a_middle_router() {
    let ports = free_ports(2);
    let (pa, pb) = (ports[0], ports[1]);
    let (socket, test_port) = test_socket().await;
    let cfg = RipConfig::from_timeout(Duration::from_secs(3));

    // Router 1 reaches the test router 3 directly at cost 5, or through
    // router 2 at cost 1 + 1.
    spawn_router(
        &format!("router-id 1\ninput-ports {pa}\noutputs {pb}-1-2, {test_port}-5-3\n"),
        cfg.clone(),
    )
    .await;
    spawn_router(
        &format!("router-id 2\ninput-ports {pb}\noutputs {pa}-1-1, {test_port}-1-3\n"),
        cfg,
    )
    .await;

    // Keep router 2 convinced that we are alive.
    let keepalive = socket.clone();
    tokio::spawn(async move {
        loop {
            let _ = keepalive
                .send_to(&hello(3, 2), (Ipv4Addr::LOCALHOST, pb))
                .await;
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    });

    let pkt = wait_for_ad(&socket, 3, |pkt| {
        pkt.entries.iter().all(|e| e.source == 1)
            && entry(pkt, 3).is_some_and(|e| e.metric == 2)
    })
    .await;

    // Router 1 switched to the two-hop path and keeps its direct route to 2.
    assert_eq!(entry(&pkt, 3).unwrap().first_hop, 2);
    assert_eq!(entry(&pkt, 2).unwrap().metric, 1);
}

#[tokio::test]
async fn drops_malformed_and_misdelivered_packets() {
    let ports = free_ports(1);
    let (socket, test_port) = test_socket().await;

    spawn_router(
        &format!(
            "router-id 1\ninput-ports {}\noutputs {test_port}-1-2\n",
            ports[0]
        ),
        RipConfig::from_timeout(Duration::from_secs(3)),
    )
    .await;
    let daemon_addr = (Ipv4Addr::LOCALHOST, ports[0]);

    // Garbage bytes.
    socket.send_to(b"not a packet", daemon_addr).await.unwrap();

    // A well-formed packet with a flipped integrity tag.
    let mut corrupted = RipPacket::response(
        1,
        vec![RipEntry {
            source: 2,
            dest: 6,
            first_hop: 2,
            metric: 1,
        }],
    )
    .encode();
    corrupted[0] = if corrupted[0] == b'0' { b'1' } else { b'0' };
    socket.send_to(&corrupted, daemon_addr).await.unwrap();

    // A packet addressed to some other router.
    let misdelivered = RipPacket::response(
        7,
        vec![RipEntry {
            source: 2,
            dest: 8,
            first_hop: 2,
            metric: 1,
        }],
    )
    .encode();
    socket.send_to(&misdelivered, daemon_addr).await.unwrap();

    // A valid packet whose entry claims an unconfigured source router.
    let unknown_source = RipPacket::response(
        1,
        vec![RipEntry {
            source: 9,
            dest: 10,
            first_hop: 9,
            metric: 1,
        }],
    )
    .encode();
    socket.send_to(&unknown_source, daemon_addr).await.unwrap();

    // A valid update must still get through afterwards.
    let valid = RipPacket::response(
        1,
        vec![RipEntry {
            source: 2,
            dest: 5,
            first_hop: 2,
            metric: 1,
        }],
    )
    .encode();
    socket.send_to(&valid, daemon_addr).await.unwrap();

    let pkt = wait_for_ad(&socket, 2, |pkt| entry(pkt, 5).is_some()).await;

    // None of the rejected payloads left a trace in the table.
    assert!(entry(&pkt, 6).is_none());
    assert!(entry(&pkt, 8).is_none());
    assert!(entry(&pkt, 10).is_none());
}

#[tokio::test]
async fn times_out_garbage_collects_and_reinstalls_a_silent_neighbor() {
    let ports = free_ports(1);
    let (socket, test_port) = test_socket().await;

    // Tight timings: 200 ms period, 1.2 s timeout, 800 ms GC window.
    spawn_router(
        &format!(
            "router-id 1\ninput-ports {}\noutputs {test_port}-1-2\n",
            ports[0]
        ),
        RipConfig::from_timeout(Duration::from_millis(1200)),
    )
    .await;
    let daemon_addr = (Ipv4Addr::LOCALHOST, ports[0]);

    // Fresh out of the config the route is advertised at its link cost.
    let pkt = wait_for_ad(&socket, 2, |pkt| entry(pkt, 2).is_some()).await;
    assert_eq!(entry(&pkt, 2).unwrap().metric, 1);

    // We stay silent, so the route must be poisoned after the timeout.
    wait_for_ad(&socket, 2, |pkt| {
        entry(pkt, 2).is_some_and(|e| e.metric == INFINITY)
    })
    .await;

    // Speaking up again: while the dead entry lingers in its GC window the
    // metric stays poisoned, and once the entry is reaped the next packet
    // installs the direct route afresh.
    let keepalive = socket.clone();
    tokio::spawn(async move {
        loop {
            let _ = keepalive.send_to(&hello(2, 1), daemon_addr).await;
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    });

    let pkt = wait_for_ad(&socket, 2, |pkt| {
        entry(pkt, 2).is_some_and(|e| e.metric == 1)
    })
    .await;
    assert_eq!(entry(&pkt, 2).unwrap().first_hop, 1);
}
