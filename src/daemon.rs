use std::future::poll_fn;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::task::Poll;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::io::ReadBuf;
use tokio::net::UdpSocket;

use crate::config::{Neighbor, RouterConfig};
use crate::error::Error;
use crate::pkt::{PacketError, RipEntry, RipPacket, MAX_PACKET_SIZE};
use crate::table::{Route, RoutingTable};
use crate::{RipConfig, INFINITY};

/// A routing daemon speaking the RIP update protocol on loopback UDP.
///
/// One instance per router process: it binds every configured input port,
/// seeds the table with the directly configured links and then trades
/// periodic vector updates with its neighbors until interrupted.
#[derive(Debug)]
pub struct RipRoutingDaemon {
    cfg: RipConfig,
    router: RouterConfig,
    table: RoutingTable,
    inputs: Vec<UdpSocket>,
}

impl RipRoutingDaemon {
    /// Binds all input sockets and seeds the routing table.
    ///
    /// The first input socket doubles as the output socket, so every
    /// neighbor sees updates arriving from the same source address.
    pub async fn bind(router: RouterConfig, cfg: RipConfig) -> Result<RipRoutingDaemon, Error> {
        let mut inputs = Vec::with_capacity(router.inputs.len());
        for &port in &router.inputs {
            let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, port))
                .await
                .map_err(|source| Error::Bind { port, source })?;
            inputs.push(socket);
        }

        let now = Instant::now();
        let mut table = RoutingTable::new(router.id);
        for neighbor in router.outputs.values() {
            table.update(neighbor.id, Route::new(router.id, neighbor.cost, now));
        }

        Ok(RipRoutingDaemon {
            cfg,
            router,
            table,
            inputs,
        })
    }

    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    /// Activates the daemon.
    ///
    /// Runs until interrupted from the terminal, or until a socket fails
    /// in a way the periodic schedule cannot recover from.
    pub async fn deploy(mut self) -> Result<(), Error> {
        tracing::info!(
            id = self.router.id,
            inputs = ?self.router.inputs,
            neighbors = self.router.outputs.len(),
            "router up"
        );

        // Advertise once right away, so neighbors learn of us before the
        // first tick.
        self.advertise_all().await;

        let mut buf = [0u8; MAX_PACKET_SIZE];
        let mut next_tick = tokio::time::Instant::now() + jittered(self.cfg.period);

        loop {
            let (n, from) = tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("interrupted, shutting down");
                    return Ok(());
                }
                _ = tokio::time::sleep_until(next_tick) => {
                    self.tick().await;
                    next_tick += jittered(self.cfg.period);
                    continue;
                }
                result = recv_any(&self.inputs, &mut buf) => match result {
                    Ok(v) => v,
                    Err(err) => {
                        tracing::error!(%err, "socket receive failed");
                        return Err(err.into());
                    }
                },
            };

            self.handle_datagram(&buf[..n], from);
        }
    }

    /// One periodic tick: advertise, then poison stale routes, then let the
    /// garbage collector transition and reap. A timeout fires an immediate
    /// extra advertisement burst so the withdrawal propagates before the
    /// next period.
    async fn tick(&mut self) {
        self.advertise_all().await;

        let now = Instant::now();
        let expired = self.table.timeout_scan(self.cfg.timeout, now);
        if !expired.is_empty() {
            for dest in &expired {
                tracing::info!(dest = *dest, "route timed out, metric set to infinity");
            }
            self.advertise_all().await;
        }

        for dest in self.table.gc_scan(self.cfg.gc_time, now) {
            tracing::info!(dest, "route removed after garbage collection");
        }
    }

    /// Sends the full table to every neighbor, applying poisoned reverse:
    /// routes through a neighbor are advertised back to it as unreachable.
    async fn advertise_all(&self) {
        let output = &self.inputs[0];
        for neighbor in self.router.outputs.values() {
            for pkt in self.advertisement_for(neighbor) {
                let payload = pkt.encode();
                if let Err(err) = output
                    .send_to(&payload, (Ipv4Addr::LOCALHOST, neighbor.port))
                    .await
                {
                    // The next tick is the retry.
                    tracing::warn!(%err, port = neighbor.port, "send failed");
                }
            }
        }
    }

    fn advertisement_for(&self, neighbor: &Neighbor) -> Vec<RipPacket> {
        let entries = self
            .table
            .iter()
            .map(|(dest, route)| RipEntry {
                source: self.router.id,
                dest,
                first_hop: route.first_hop,
                metric: if route.first_hop == neighbor.id {
                    INFINITY
                } else {
                    route.metric
                },
            })
            .collect::<Vec<_>>();
        RipPacket::packets(neighbor.id, &entries)
    }

    fn handle_datagram(&mut self, payload: &[u8], from: SocketAddr) {
        match RipPacket::decode(payload, self.router.id) {
            Ok(pkt) => {
                self.table
                    .process_response(&pkt, &self.router.outputs, Instant::now());
                tracing::debug!(%from, "processed update, table now:\n{}", self.table);
            }
            Err(err @ PacketError::WrongDestination(_)) => {
                tracing::warn!(%err, %from, "dropping misdelivered packet");
            }
            Err(err) => {
                tracing::warn!(%err, %from, "dropping packet");
            }
        }
    }
}

/// A fresh draw in `[0.8, 1.2] × period`, so neighboring routers do not
/// synchronize their advertisement bursts.
fn jittered(period: Duration) -> Duration {
    period.mul_f64(rand::thread_rng().gen_range(0.8..=1.2))
}

/// Waits until any input socket is readable and receives one datagram.
async fn recv_any(inputs: &[UdpSocket], buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
    poll_fn(|cx| {
        for socket in inputs {
            let mut read_buf = ReadBuf::new(buf);
            match socket.poll_recv_from(cx, &mut read_buf) {
                Poll::Ready(Ok(from)) => return Poll::Ready(Ok((read_buf.filled().len(), from))),
                Poll::Ready(Err(err)) => return Poll::Ready(Err(err)),
                Poll::Pending => {}
            }
        }
        Poll::Pending
    })
    .await
}
