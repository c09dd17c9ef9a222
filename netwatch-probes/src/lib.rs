//! netwatch-probes - Reachability and metric probes for monitored devices
//!
//! The kernel only sees the [`Probe`] trait:
//! - `reachable(address)` : one ICMP echo attempt, bounded by its own timeout
//! - `query_metric(address, oid)` : one SNMP value, retried with backoff
//!
//! Both shell out to the system tools (`ping`, `snmpget`) so the process
//! needs no raw-socket privileges and no SNMP stack of its own. Failures
//! never surface as errors: an unreachable host is `false`, an unreadable
//! metric is `None`.

mod ping;
mod snmp;

pub use ping::PingProbe;
pub use snmp::{parse_snmp_value, RetryPolicy, SnmpProbe};

use async_trait::async_trait;
use std::time::Duration;

/// Failures of a single probe attempt. Kept inside the crate: callers get
/// `bool` / `Option<f64>` and the error only reaches the log.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} timed out after {after:?}")]
    Timeout { tool: &'static str, after: Duration },
    #[error("{tool} exited with status {code:?}")]
    Exit { tool: &'static str, code: Option<i32> },
    #[error("unparsable SNMP value: {0:?}")]
    Parse(String),
}

/// Black-box view of a device used by the health evaluator.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Single reachability attempt.
    async fn reachable(&self, address: &str) -> bool;

    /// Numeric reading of `metric_id` (an SNMP OID), `None` when unavailable.
    async fn query_metric(&self, address: &str, metric_id: &str) -> Option<f64>;
}

/// Production probe: ICMP through [`PingProbe`], metrics through [`SnmpProbe`].
#[derive(Debug, Clone)]
pub struct NetworkProbe {
    ping: PingProbe,
    snmp: SnmpProbe,
}

impl NetworkProbe {
    pub fn new(ping: PingProbe, snmp: SnmpProbe) -> Self {
        Self { ping, snmp }
    }
}

#[async_trait]
impl Probe for NetworkProbe {
    async fn reachable(&self, address: &str) -> bool {
        self.ping.reachable(address).await
    }

    async fn query_metric(&self, address: &str, metric_id: &str) -> Option<f64> {
        self.snmp.query_metric(address, metric_id).await
    }
}
