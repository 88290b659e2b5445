//! Route table configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::error::{Result, RouteTableError};

/// Default cap on packets buffered across all pending routes.
pub const DEFAULT_MAX_PENDING_PACKETS: usize = 256;

/// Default time a pending route may wait for resolution before it is expired.
pub const DEFAULT_PENDING_ROUTE_LIFETIME: Duration = Duration::from_secs(10);

/// Configuration for a [`RouteTable`](crate::RouteTable).
///
/// Passed once to [`RouteTable::init`](crate::RouteTable::init); there is no
/// runtime reconfiguration.
#[derive(Clone)]
pub struct Config {
    /// Maximum number of packets buffered across all pending routes.
    pub max_pending_packets: usize,
    /// How long a pending route may live before it is expired and its
    /// packets released.
    pub pending_route_lifetime: Duration,
    /// Interval between expiration sweeps. `None` uses the pending route
    /// lifetime.
    pub cleanup_interval: Option<Duration>,
    /// Source of timestamps and timers.
    pub clock: Arc<dyn Clock>,
}

impl Config {
    /// Creates a configuration with the default limits and the given clock.
    pub fn default_with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            max_pending_packets: DEFAULT_MAX_PENDING_PACKETS,
            pending_route_lifetime: DEFAULT_PENDING_ROUTE_LIFETIME,
            cleanup_interval: None,
            clock,
        }
    }

    /// Sets the pending packet budget.
    pub fn with_max_pending_packets(mut self, max_pending_packets: usize) -> Self {
        self.max_pending_packets = max_pending_packets;
        self
    }

    /// Sets the pending route lifetime.
    pub fn with_pending_route_lifetime(mut self, lifetime: Duration) -> Self {
        self.pending_route_lifetime = lifetime;
        self
    }

    /// Sets the expiration sweep interval.
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = Some(interval);
        self
    }

    /// Returns the effective interval between expiration sweeps.
    pub fn cleanup_interval(&self) -> Duration {
        self.cleanup_interval.unwrap_or(self.pending_route_lifetime)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RouteTableError::InvalidConfig`] if the packet budget, the
    /// pending route lifetime or an explicit cleanup interval is zero.
    pub fn validate(&self) -> Result<()> {
        if self.max_pending_packets == 0 {
            return Err(RouteTableError::invalid_config(
                "max_pending_packets",
                "must be non-zero",
            ));
        }

        if self.pending_route_lifetime.is_zero() {
            return Err(RouteTableError::invalid_config(
                "pending_route_lifetime",
                "must be non-zero",
            ));
        }

        if let Some(interval) = self.cleanup_interval {
            if interval.is_zero() {
                return Err(RouteTableError::invalid_config(
                    "cleanup_interval",
                    "must be non-zero when set",
                ));
            }
        }

        Ok(())
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("max_pending_packets", &self.max_pending_packets)
            .field("pending_route_lifetime", &self.pending_route_lifetime)
            .field("cleanup_interval", &self.cleanup_interval())
            .field("clock", &self.clock)
            .finish()
    }
}
