use std::fmt;
use std::time::{Duration, Instant};

use fxhash::{FxBuildHasher, FxHashMap};

use crate::config::Neighbor;
use crate::pkt::RipPacket;
use crate::{RouterId, INFINITY};

/// Routing state for one destination router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    /// The neighbor this route goes through; the local id for directly
    /// configured routes.
    pub first_hop: RouterId,
    pub metric: u32,
    pub last_refresh: Instant,
    pub gc_deadline: Option<Instant>,
    /// Cleared once the route has entered the garbage-collection phase.
    pub active: bool,
}

impl Route {
    pub fn new(first_hop: RouterId, metric: u32, now: Instant) -> Route {
        Route {
            first_hop,
            metric,
            last_refresh: now,
            gc_deadline: None,
            active: true,
        }
    }
}

/// The distance-vector table: destination router id to route state.
///
/// The local router never appears as a destination.
#[derive(Debug, Clone)]
pub struct RoutingTable {
    local_id: RouterId,
    routes: FxHashMap<RouterId, Route>,
}

impl RoutingTable {
    pub fn new(local_id: RouterId) -> RoutingTable {
        RoutingTable {
            local_id,
            routes: FxHashMap::with_hasher(FxBuildHasher::default()),
        }
    }

    pub fn get(&self, dest: RouterId) -> Option<&Route> {
        self.routes.get(&dest)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RouterId, &Route)> + '_ {
        self.routes.iter().map(|(&dest, route)| (dest, route))
    }

    /// Applies a candidate route for `dest`.
    ///
    /// An absent entry is only created while reachable. The current first
    /// hop is authoritative and always replaces its own route, except that
    /// a withdrawal keeps the garbage-collection state already in flight.
    /// A different neighbor wins only with a strictly smaller metric, so
    /// equal-cost alternates do not flap.
    pub fn update(&mut self, dest: RouterId, mut candidate: Route) {
        debug_assert_ne!(dest, self.local_id);
        debug_assert!(candidate.metric <= INFINITY);

        match self.routes.get_mut(&dest) {
            None => {
                if candidate.metric < INFINITY {
                    self.routes.insert(dest, candidate);
                }
            }
            Some(current) if current.first_hop == candidate.first_hop => {
                if candidate.metric >= INFINITY {
                    candidate.active = current.active;
                    candidate.gc_deadline = current.gc_deadline;
                }
                *current = candidate;
            }
            Some(current) if candidate.metric < current.metric => {
                *current = candidate;
            }
            Some(_) => {}
        }
    }

    /// Resets the refresh clock of an existing entry.
    pub fn refresh(&mut self, dest: RouterId, now: Instant) -> bool {
        match self.routes.get_mut(&dest) {
            Some(route) => {
                route.last_refresh = now;
                true
            }
            None => false,
        }
    }

    /// Feeds every entry of a decoded update into the table.
    ///
    /// Entries naming the local router as destination are liveness evidence
    /// for the advertising neighbor; everything else is relaxed over the
    /// link cost and run through [`RoutingTable::update`].
    pub fn process_response(
        &mut self,
        pkt: &RipPacket,
        neighbors: &FxHashMap<RouterId, Neighbor>,
        now: Instant,
    ) {
        for entry in &pkt.entries {
            let Some(neighbor) = neighbors.get(&entry.source) else {
                tracing::warn!(
                    source = entry.source,
                    "dropping entry from unconfigured neighbor"
                );
                continue;
            };

            if entry.dest == self.local_id {
                // The packet itself is evidence that the neighbor is alive.
                if !self.refresh(entry.source, now) {
                    self.routes.insert(
                        entry.source,
                        Route::new(self.local_id, neighbor.cost, now),
                    );
                }
            } else {
                let metric = INFINITY.min(entry.metric.saturating_add(neighbor.cost));
                self.update(entry.dest, Route::new(entry.source, metric, now));
            }
        }
    }

    /// Poisons every route that has not been refreshed within `timeout`.
    /// Returns the newly expired destinations so the caller can fire a
    /// triggered update.
    pub fn timeout_scan(&mut self, timeout: Duration, now: Instant) -> Vec<RouterId> {
        let mut expired = Vec::new();
        for (&dest, route) in self.routes.iter_mut() {
            if route.metric < INFINITY && now.duration_since(route.last_refresh) > timeout {
                route.metric = INFINITY;
                expired.push(dest);
            }
        }
        expired
    }

    /// Moves freshly poisoned routes into the garbage-collection phase and
    /// reaps those whose window has elapsed. Returns the reaped
    /// destinations.
    pub fn gc_scan(&mut self, gc_time: Duration, now: Instant) -> Vec<RouterId> {
        for route in self.routes.values_mut() {
            if route.active && route.metric >= INFINITY {
                route.gc_deadline = Some(now + gc_time);
                route.active = false;
            }
        }

        let dead = self
            .routes
            .iter()
            .filter(|(_, route)| {
                !route.active && route.gc_deadline.is_some_and(|deadline| now >= deadline)
            })
            .map(|(&dest, _)| dest)
            .collect::<Vec<_>>();
        for dest in &dead {
            self.routes.remove(dest);
        }
        dead
    }
}

impl fmt::Display for RoutingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut routes = self.routes.iter().collect::<Vec<_>>();
        routes.sort_by_key(|&(&dest, _)| dest);
        for (dest, route) in routes {
            writeln!(
                f,
                "destination: {dest}, first: {}, metric: {}, age: {:.1}s",
                route.first_hop,
                route.metric,
                route.last_refresh.elapsed().as_secs_f64()
            )?;
        }
        Ok(())
    }
}
