//! RouteTable implementation.
//!
//! The installed routes, the pending routes and the pending packet budget
//! share one lock. Every public operation takes it once, does O(1) map work
//! (or a single scan, for expiration) and releases it before any packet it
//! removed is handed out or dropped.

use log::{debug, info};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use mfwd_types::InterfaceId;

use crate::clock::{MonotonicTime, TimerCallback};
use crate::config::Config;
use crate::error::{Result, RouteTableError};
use crate::expiry::CleanupTimer;
use crate::pending::{Enqueued, PendingRouteTable};
use crate::route::{InstalledRoute, OutgoingInterface, RouteKey, RouteLookup};

/// Point-in-time counters for a [`RouteTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RouteTableStats {
    /// Number of installed routes.
    pub installed_routes: usize,
    /// Number of pending routes.
    pub pending_routes: usize,
    /// Packets buffered across all pending routes.
    pub pending_packets: usize,
    /// The configured pending packet budget.
    pub max_pending_packets: usize,
}

/// An installed route plus the time it was last used to forward.
#[derive(Debug)]
struct InstalledEntry {
    route: Arc<InstalledRoute>,
    last_used: MonotonicTime,
}

impl InstalledEntry {
    fn new(route: InstalledRoute, now: MonotonicTime) -> Self {
        Self {
            route: Arc::new(route),
            last_used: now,
        }
    }

    /// Records a use at `now`. The timestamp never moves backwards.
    fn touch(&mut self, now: MonotonicTime) {
        self.last_used = self.last_used.max(now);
    }
}

/// State held while the table is initialized.
///
/// A key is never present in both `installed` and `pending`.
#[derive(Debug)]
struct Tables<P> {
    config: Config,
    installed: HashMap<RouteKey, InstalledEntry>,
    pending: PendingRouteTable<P>,
    cleanup: CleanupTimer,
}

#[derive(Debug)]
enum TableState<P> {
    Uninitialized,
    Initialized(Tables<P>),
    Closed,
}

impl<P> TableState<P> {
    fn name(&self) -> &'static str {
        match self {
            TableState::Uninitialized => "uninitialized",
            TableState::Initialized(_) => "initialized",
            TableState::Closed => "closed",
        }
    }

    fn tables_mut(&mut self, operation: &'static str) -> Result<&mut Tables<P>> {
        let state = self.name();
        match self {
            TableState::Initialized(tables) => Ok(tables),
            _ => Err(RouteTableError::invalid_state(operation, state)),
        }
    }
}

#[derive(Debug)]
struct Shared<P> {
    state: Mutex<TableState<P>>,
}

/// A multicast forwarding route table.
///
/// Maps a (source, group) [`RouteKey`] to either an installed route or a
/// pending entry buffering packets until a route is installed. `P` is the
/// packet handle: cloning it takes a reference, dropping it releases one.
///
/// The table starts uninitialized; [`RouteTable::init`] makes it usable and
/// [`RouteTable::close`] (or dropping the table) shuts it down for good.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use mfwd_table::{Config, InstalledRoute, ManualClock, OutgoingInterface, RouteKey,
///     RouteLookup, RouteTable};
/// use mfwd_types::InterfaceId;
///
/// let clock = Arc::new(ManualClock::new());
/// let table: RouteTable<Arc<Vec<u8>>> = RouteTable::new();
/// table.init(Config::default_with_clock(clock)).unwrap();
///
/// let key = RouteKey::new(
///     "10.0.0.1".parse::<mfwd_types::IpAddress>().unwrap(),
///     "239.1.1.1".parse::<mfwd_types::IpAddress>().unwrap(),
/// );
/// let pkt = Arc::new(b"hello".to_vec());
///
/// // No route yet: the packet is staged and the control plane is asked
/// // to resolve one.
/// assert_eq!(table.get_route_or_insert_pending(key, &pkt).unwrap(), RouteLookup::NewlyPending);
///
/// let input = InterfaceId::new(1).unwrap();
/// let output = OutgoingInterface::new(InterfaceId::new(2).unwrap(), 1);
/// let flushed = table.add_installed_route(key, InstalledRoute::new(input, &[output])).unwrap();
/// assert_eq!(flushed.len(), 1);
///
/// assert!(table.remove_installed_route(&key).unwrap());
/// ```
#[derive(Debug)]
pub struct RouteTable<P: Clone + Send + 'static> {
    shared: Arc<Shared<P>>,
}

impl<P: Clone + Send + 'static> Default for RouteTable<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Clone + Send + 'static> RouteTable<P> {
    /// Creates an uninitialized route table.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(TableState::Uninitialized),
            }),
        }
    }

    /// Initializes the table with `config`.
    ///
    /// # Errors
    ///
    /// Returns [`RouteTableError::InvalidConfig`] if the configuration is
    /// rejected (the table stays uninitialized), or
    /// [`RouteTableError::InvalidState`] if the table was already initialized
    /// or closed.
    pub fn init(&self, config: Config) -> Result<()> {
        config.validate()?;

        let mut state = self.shared.state.lock();
        if !matches!(*state, TableState::Uninitialized) {
            return Err(RouteTableError::invalid_state("init", state.name()));
        }

        info!(
            "RouteTable: Initialized with max {} pending packets, pending lifetime {:?}, cleanup interval {:?}",
            config.max_pending_packets,
            config.pending_route_lifetime,
            config.cleanup_interval()
        );

        *state = TableState::Initialized(Tables {
            installed: HashMap::new(),
            pending: PendingRouteTable::new(config.max_pending_packets),
            cleanup: CleanupTimer::new(config.cleanup_interval()),
            config,
        });

        Ok(())
    }

    /// Shuts the table down.
    ///
    /// Stops the expiration timer, releases every buffered packet and drops
    /// all routes. Every later operation fails with
    /// [`RouteTableError::InvalidState`]. Calling it again is a no-op.
    pub fn close(&self) {
        let previous = std::mem::replace(&mut *self.shared.state.lock(), TableState::Closed);

        if let TableState::Initialized(mut tables) = previous {
            tables.cleanup.stop();
            let packets = tables.pending.drain();
            info!(
                "RouteTable: Closed, dropped {} installed routes and released {} pending packets",
                tables.installed.len(),
                packets.len()
            );
            drop(packets);
        }
    }

    /// Builds a route descriptor for [`RouteTable::add_installed_route`].
    pub fn new_installed_route(
        &self,
        expected_input_interface: InterfaceId,
        outgoing_interfaces: &[OutgoingInterface],
    ) -> InstalledRoute {
        InstalledRoute::new(expected_input_interface, outgoing_interfaces)
    }

    /// Installs `route` for `key`, replacing any installed route.
    ///
    /// If `key` was pending, the pending entry is removed and its packets
    /// are returned in arrival order. The caller now owns them and is
    /// expected to forward them with `route`. The route's last-used
    /// timestamp is reset to now.
    pub fn add_installed_route(&self, key: RouteKey, route: InstalledRoute) -> Result<Vec<P>> {
        let mut state = self.shared.state.lock();
        let tables = state.tables_mut("add_installed_route")?;

        let now = tables.config.clock.now();
        tables.installed.insert(key, InstalledEntry::new(route, now));

        let packets = tables.pending.take(&key).unwrap_or_default();
        if tables.pending.is_empty() {
            tables.cleanup.stop();
        }

        debug!(
            "RouteTable: Installed route for {}, flushing {} pending packets",
            key,
            packets.len()
        );

        Ok(packets)
    }

    /// Removes the installed route for `key`.
    ///
    /// Returns true if a route was installed. Pending entries are not
    /// affected.
    pub fn remove_installed_route(&self, key: &RouteKey) -> Result<bool> {
        let mut state = self.shared.state.lock();
        let tables = state.tables_mut("remove_installed_route")?;

        let removed = tables.installed.remove(key).is_some();
        if removed {
            debug!("RouteTable: Removed installed route for {}", key);
        }

        Ok(removed)
    }

    /// Removes every installed route, returning how many were removed.
    ///
    /// Pending entries are not affected.
    pub fn remove_all_installed_routes(&self) -> Result<usize> {
        let mut state = self.shared.state.lock();
        let tables = state.tables_mut("remove_all_installed_routes")?;

        let count = tables.installed.len();
        tables.installed.clear();
        debug!("RouteTable: Removed all {} installed routes", count);

        Ok(count)
    }

    /// Returns when the route for `key` was last used, or `None` if no
    /// route is installed for it.
    pub fn get_last_used_timestamp(&self, key: &RouteKey) -> Result<Option<MonotonicTime>> {
        let mut state = self.shared.state.lock();
        let tables = state.tables_mut("get_last_used_timestamp")?;

        Ok(tables.installed.get(key).map(|entry| entry.last_used))
    }

    /// Looks up the route for `key`, staging `packet` if there is none.
    ///
    /// - [`RouteLookup::Resolved`]: a route is installed; its last-used
    ///   timestamp is updated and nothing is staged.
    /// - [`RouteLookup::NewlyPending`]: a pending entry was created holding
    ///   a reference to `packet`. The caller should request a route.
    /// - [`RouteLookup::AppendedPending`]: a reference to `packet` joined an
    ///   existing pending entry.
    ///
    /// # Errors
    ///
    /// Returns [`RouteTableError::NoBufferSpace`] if the pending packet
    /// budget is exhausted. No reference to `packet` is taken and the table
    /// is unchanged.
    pub fn get_route_or_insert_pending(&self, key: RouteKey, packet: &P) -> Result<RouteLookup> {
        let mut state = self.shared.state.lock();
        let tables = state.tables_mut("get_route_or_insert_pending")?;
        let now = tables.config.clock.now();

        if let Some(entry) = tables.installed.get_mut(&key) {
            entry.touch(now);
            return Ok(RouteLookup::Resolved(entry.route.clone()));
        }

        match tables.pending.enqueue(key, packet, now) {
            Ok(Enqueued::Created) => {
                debug!("RouteTable: Created pending route for {}", key);
                self.arm_cleanup(tables);
                Ok(RouteLookup::NewlyPending)
            }
            Ok(Enqueued::Appended) => Ok(RouteLookup::AppendedPending),
            Err(e) => {
                debug!("RouteTable: Not buffering packet for {}: {}", key, e);
                Err(e)
            }
        }
    }

    /// Returns true if `key` has a pending entry.
    pub fn is_pending(&self, key: &RouteKey) -> Result<bool> {
        let mut state = self.shared.state.lock();
        let tables = state.tables_mut("is_pending")?;

        Ok(tables.pending.contains(key))
    }

    /// Returns a snapshot of the table's counters.
    pub fn stats(&self) -> Result<RouteTableStats> {
        let mut state = self.shared.state.lock();
        let tables = state.tables_mut("stats")?;

        Ok(RouteTableStats {
            installed_routes: tables.installed.len(),
            pending_routes: tables.pending.len(),
            pending_packets: tables.pending.buffered_packets(),
            max_pending_packets: tables.pending.max_buffered_packets(),
        })
    }

    fn arm_cleanup(&self, tables: &mut Tables<P>) {
        arm_cleanup(&self.shared, tables);
    }
}

impl<P: Clone + Send + 'static> Drop for RouteTable<P> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Schedules an expiration sweep for `shared` unless one is pending.
///
/// The timer only holds a weak reference, so a scheduled sweep never keeps
/// a dropped table alive.
fn arm_cleanup<P: Clone + Send + 'static>(shared: &Arc<Shared<P>>, tables: &mut Tables<P>) {
    let weak: Weak<Shared<P>> = Arc::downgrade(shared);
    let clock = tables.config.clock.clone();

    let armed = tables.cleanup.arm(clock.as_ref(), move |generation| -> TimerCallback {
        Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                run_cleanup(&shared, generation);
            }
        })
    });

    if armed {
        debug!(
            "RouteTable: Scheduled pending route cleanup in {:?}",
            tables.cleanup.interval()
        );
    }
}

/// Expires stale pending routes and re-arms the timer while any remain.
fn run_cleanup<P: Clone + Send + 'static>(shared: &Arc<Shared<P>>, generation: u64) {
    let expired = {
        let mut state = shared.state.lock();
        let TableState::Initialized(tables) = &mut *state else {
            return;
        };

        if !tables.cleanup.fired(generation) {
            return;
        }
        let now = tables.config.clock.now();
        let expired = tables
            .pending
            .expire(now, tables.config.pending_route_lifetime);

        if !tables.pending.is_empty() {
            arm_cleanup(shared, tables);
        }

        expired
    };

    for (key, packets) in expired {
        debug!(
            "RouteTable: Expired pending route for {}, releasing {} packets",
            key,
            packets.len()
        );
        drop(packets);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use pretty_assertions::assert_eq;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    type Packet = Arc<&'static str>;

    fn nic(id: u32) -> InterfaceId {
        InterfaceId::new(id).unwrap()
    }

    fn key(group: u8) -> RouteKey {
        RouteKey::new(Ipv4Addr::new(192, 168, 1, 1), Ipv4Addr::new(239, 0, 0, group))
    }

    fn route() -> InstalledRoute {
        InstalledRoute::new(nic(1), &[OutgoingInterface::new(nic(2), 10)])
    }

    fn setup(budget: usize, lifetime_secs: u64) -> (Arc<ManualClock>, RouteTable<Packet>) {
        let clock = Arc::new(ManualClock::new());
        let table = RouteTable::new();
        table
            .init(
                Config::default_with_clock(clock.clone())
                    .with_max_pending_packets(budget)
                    .with_pending_route_lifetime(Duration::from_secs(lifetime_secs)),
            )
            .unwrap();
        (clock, table)
    }

    #[test]
    fn test_operations_before_init_fail() {
        let table: RouteTable<Packet> = RouteTable::new();
        let pkt = Arc::new("p");

        let err = table.get_route_or_insert_pending(key(1), &pkt).unwrap_err();
        assert_eq!(
            err,
            RouteTableError::invalid_state("get_route_or_insert_pending", "uninitialized")
        );
        assert!(table.add_installed_route(key(1), route()).is_err());
        assert!(table.remove_installed_route(&key(1)).is_err());
        assert!(table.get_last_used_timestamp(&key(1)).is_err());
        assert!(table.stats().is_err());
        assert_eq!(Arc::strong_count(&pkt), 1);
    }

    #[test]
    fn test_invalid_config_leaves_table_uninitialized() {
        let clock = Arc::new(ManualClock::new());
        let table: RouteTable<Packet> = RouteTable::new();

        let err = table
            .init(Config::default_with_clock(clock.clone()).with_max_pending_packets(0))
            .unwrap_err();
        assert!(matches!(err, RouteTableError::InvalidConfig { .. }));
        assert!(table.stats().is_err());

        table.init(Config::default_with_clock(clock)).unwrap();
        assert!(table.stats().is_ok());
    }

    #[test]
    fn test_double_init_rejected() {
        let (clock, table) = setup(10, 10);
        let err = table.init(Config::default_with_clock(clock)).unwrap_err();
        assert_eq!(err, RouteTableError::invalid_state("init", "initialized"));
    }

    #[test]
    fn test_operations_after_close_fail() {
        let (clock, table) = setup(10, 10);
        table.close();
        table.close();

        let pkt = Arc::new("p");
        let err = table.get_route_or_insert_pending(key(1), &pkt).unwrap_err();
        assert_eq!(
            err,
            RouteTableError::invalid_state("get_route_or_insert_pending", "closed")
        );
        assert_eq!(Arc::strong_count(&pkt), 1);

        let err = table.init(Config::default_with_clock(clock)).unwrap_err();
        assert_eq!(err, RouteTableError::invalid_state("init", "closed"));
    }

    #[test]
    fn test_pending_states() {
        let (_clock, table) = setup(10, 10);
        let pkt = Arc::new("p");

        assert_eq!(
            table.get_route_or_insert_pending(key(1), &pkt).unwrap(),
            RouteLookup::NewlyPending
        );
        assert_eq!(
            table.get_route_or_insert_pending(key(1), &pkt).unwrap(),
            RouteLookup::AppendedPending
        );
        assert_eq!(
            table.get_route_or_insert_pending(key(2), &pkt).unwrap(),
            RouteLookup::NewlyPending
        );

        assert_eq!(Arc::strong_count(&pkt), 4);
        assert!(table.is_pending(&key(1)).unwrap());
        assert_eq!(
            table.stats().unwrap(),
            RouteTableStats {
                installed_routes: 0,
                pending_routes: 2,
                pending_packets: 3,
                max_pending_packets: 10,
            }
        );
    }

    #[test]
    fn test_no_buffer_space_leaves_state_unchanged() {
        let (_clock, table) = setup(2, 10);
        let pkt = Arc::new("p");

        table.get_route_or_insert_pending(key(1), &pkt).unwrap();
        table.get_route_or_insert_pending(key(2), &pkt).unwrap();
        let before = table.stats().unwrap();

        let err = table.get_route_or_insert_pending(key(3), &pkt).unwrap_err();
        assert_eq!(err, RouteTableError::no_buffer_space(2));
        assert_eq!(table.stats().unwrap(), before);
        assert!(!table.is_pending(&key(3)).unwrap());
        assert_eq!(Arc::strong_count(&pkt), 3);
    }

    #[test]
    fn test_promotion_flushes_in_order() {
        let (_clock, table) = setup(10, 10);
        let packets: Vec<Packet> = ["p1", "p2", "p3"].into_iter().map(Arc::new).collect();

        for pkt in &packets {
            table.get_route_or_insert_pending(key(1), pkt).unwrap();
        }

        let flushed = table.add_installed_route(key(1), route()).unwrap();
        let flushed: Vec<&str> = flushed.iter().map(|p| **p).collect();
        assert_eq!(flushed, vec!["p1", "p2", "p3"]);

        assert!(!table.is_pending(&key(1)).unwrap());
        assert_eq!(table.stats().unwrap().pending_packets, 0);
        for pkt in &packets {
            assert_eq!(Arc::strong_count(pkt), 1);
        }
    }

    #[test]
    fn test_add_without_pending_returns_nothing() {
        let (_clock, table) = setup(10, 10);
        assert!(table.add_installed_route(key(1), route()).unwrap().is_empty());
        assert_eq!(table.stats().unwrap().installed_routes, 1);
    }

    #[test]
    fn test_resolved_updates_last_used() {
        let (clock, table) = setup(10, 10);
        let pkt = Arc::new("p");

        clock.advance(Duration::from_secs(1));
        table.add_installed_route(key(1), route()).unwrap();
        assert_eq!(
            table.get_last_used_timestamp(&key(1)).unwrap(),
            Some(MonotonicTime::ZERO + Duration::from_secs(1))
        );

        clock.advance(Duration::from_secs(4));
        match table.get_route_or_insert_pending(key(1), &pkt).unwrap() {
            RouteLookup::Resolved(installed) => assert_eq!(*installed, route()),
            other => panic!("expected resolved route, got {:?}", other),
        }
        assert_eq!(
            table.get_last_used_timestamp(&key(1)).unwrap(),
            Some(clock.now())
        );
        assert_eq!(Arc::strong_count(&pkt), 1);
        assert_eq!(table.get_last_used_timestamp(&key(2)).unwrap(), None);
    }

    #[test]
    fn test_last_used_never_moves_backwards() {
        let mut entry = InstalledEntry::new(route(), MonotonicTime::from_nanos(100));
        entry.touch(MonotonicTime::from_nanos(50));
        assert_eq!(entry.last_used, MonotonicTime::from_nanos(100));
        entry.touch(MonotonicTime::from_nanos(150));
        assert_eq!(entry.last_used, MonotonicTime::from_nanos(150));
    }

    #[test]
    fn test_remove_installed_route() {
        let (_clock, table) = setup(10, 10);
        table.add_installed_route(key(1), route()).unwrap();

        assert!(table.remove_installed_route(&key(1)).unwrap());
        assert!(!table.remove_installed_route(&key(1)).unwrap());
        assert_eq!(table.get_last_used_timestamp(&key(1)).unwrap(), None);
    }

    #[test]
    fn test_remove_does_not_touch_pending() {
        let (_clock, table) = setup(10, 10);
        let pkt = Arc::new("p");
        table.get_route_or_insert_pending(key(1), &pkt).unwrap();

        assert!(!table.remove_installed_route(&key(1)).unwrap());
        assert!(table.is_pending(&key(1)).unwrap());
    }

    #[test]
    fn test_remove_all_installed_routes() {
        let (_clock, table) = setup(10, 10);
        let pkt = Arc::new("p");
        table.add_installed_route(key(1), route()).unwrap();
        table.add_installed_route(key(2), route()).unwrap();
        table.get_route_or_insert_pending(key(3), &pkt).unwrap();

        assert_eq!(table.remove_all_installed_routes().unwrap(), 2);
        let stats = table.stats().unwrap();
        assert_eq!(stats.installed_routes, 0);
        assert_eq!(stats.pending_routes, 1);
    }

    #[test]
    fn test_pending_route_expires() {
        let (clock, table) = setup(10, 10);
        let pkt = Arc::new("p");

        table.get_route_or_insert_pending(key(1), &pkt).unwrap();
        table.get_route_or_insert_pending(key(1), &pkt).unwrap();
        assert_eq!(Arc::strong_count(&pkt), 3);

        clock.advance(Duration::from_secs(9));
        assert!(table.is_pending(&key(1)).unwrap());

        clock.advance(Duration::from_secs(1));
        assert!(!table.is_pending(&key(1)).unwrap());
        assert_eq!(table.stats().unwrap().pending_packets, 0);
        assert_eq!(Arc::strong_count(&pkt), 1);

        // The key behaves as if it had never been seen.
        assert_eq!(
            table.get_route_or_insert_pending(key(1), &pkt).unwrap(),
            RouteLookup::NewlyPending
        );
    }

    #[test]
    fn test_younger_pending_route_survives_sweep() {
        let (clock, table) = setup(10, 10);
        let pkt = Arc::new("p");

        table.get_route_or_insert_pending(key(1), &pkt).unwrap();
        clock.advance(Duration::from_secs(5));
        table.get_route_or_insert_pending(key(2), &pkt).unwrap();

        clock.advance(Duration::from_secs(5));
        assert!(!table.is_pending(&key(1)).unwrap());
        assert!(table.is_pending(&key(2)).unwrap());
        assert_eq!(clock.pending_timers(), 1);

        clock.advance(Duration::from_secs(10));
        assert!(!table.is_pending(&key(2)).unwrap());
        assert_eq!(clock.pending_timers(), 0);
        assert_eq!(Arc::strong_count(&pkt), 1);
    }

    #[test]
    fn test_cleanup_timer_lifecycle() {
        let (clock, table) = setup(10, 10);
        let pkt = Arc::new("p");
        assert_eq!(clock.pending_timers(), 0);

        table.get_route_or_insert_pending(key(1), &pkt).unwrap();
        table.get_route_or_insert_pending(key(2), &pkt).unwrap();
        assert_eq!(clock.pending_timers(), 1);

        table.add_installed_route(key(1), route()).unwrap();
        assert_eq!(clock.pending_timers(), 1);

        table.add_installed_route(key(2), route()).unwrap();
        assert_eq!(clock.pending_timers(), 0);
    }

    #[test]
    fn test_close_releases_pending_packets() {
        let (clock, table) = setup(10, 10);
        let pkt = Arc::new("p");

        table.get_route_or_insert_pending(key(1), &pkt).unwrap();
        table.get_route_or_insert_pending(key(2), &pkt).unwrap();
        table.add_installed_route(key(3), route()).unwrap();
        assert_eq!(Arc::strong_count(&pkt), 3);

        table.close();
        assert_eq!(Arc::strong_count(&pkt), 1);
        assert_eq!(clock.pending_timers(), 0);
    }

    #[test]
    fn test_drop_releases_pending_packets() {
        let (clock, table) = setup(10, 10);
        let pkt = Arc::new("p");
        table.get_route_or_insert_pending(key(1), &pkt).unwrap();

        drop(table);
        assert_eq!(Arc::strong_count(&pkt), 1);
        assert_eq!(clock.pending_timers(), 0);
    }
}
