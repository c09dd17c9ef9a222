use crate::ProbeError;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Exponential backoff between SNMP attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first one included. 0 behaves like 1.
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based): base * 2^retry, capped.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.min(16));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// SNMP v2c GET through the net-snmp `snmpget` binary.
#[derive(Debug, Clone)]
pub struct SnmpProbe {
    binary: String,
    community: String,
    timeout: Duration,
    retry: RetryPolicy,
}

impl SnmpProbe {
    pub fn new(community: impl Into<String>, timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            binary: "snmpget".to_string(),
            community: community.into(),
            timeout,
            retry,
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// One GET, no retry.
    pub async fn query_once(&self, address: &str, oid: &str) -> Result<f64, ProbeError> {
        let timeout_secs = self.timeout.as_secs().max(1);

        let timeout_arg = timeout_secs.to_string();
        let mut cmd = Command::new(&self.binary);
        // -Oqv prints the bare value; -r 0 because retries are ours
        cmd.args([
            "-v2c",
            "-c",
            self.community.as_str(),
            "-Oqv",
            "-t",
            timeout_arg.as_str(),
            "-r",
            "0",
            address,
            oid,
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

        let child = cmd.spawn().map_err(|source| ProbeError::Spawn { tool: "snmpget", source })?;

        let deadline = Duration::from_secs(timeout_secs) + Duration::from_secs(1);
        let output = match tokio::time::timeout(deadline, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => return Err(ProbeError::Spawn { tool: "snmpget", source }),
            Err(_) => return Err(ProbeError::Timeout { tool: "snmpget", after: deadline }),
        };

        if !output.status.success() {
            return Err(ProbeError::Exit { tool: "snmpget", code: output.status.code() });
        }

        parse_snmp_value(&String::from_utf8_lossy(&output.stdout))
    }

    /// [`SnmpProbe::query_once`] retried per the policy; `None` once exhausted.
    pub async fn query_metric(&self, address: &str, metric_id: &str) -> Option<f64> {
        let attempts = self.retry.attempts.max(1);
        for attempt in 0..attempts {
            match self.query_once(address, metric_id).await {
                Ok(value) => return Some(value),
                Err(e) => {
                    tracing::debug!(address, oid = metric_id, attempt = attempt + 1, error = %e, "snmp query failed");
                    if attempt + 1 < attempts {
                        tokio::time::sleep(self.retry.delay_for(attempt)).await;
                    }
                }
            }
        }
        tracing::warn!(address, oid = metric_id, attempts, "snmp metric unavailable");
        None
    }
}

/// Parse the first line printed by `snmpget -Oqv`.
///
/// Accepts bare numbers (`42`), typed values (`Gauge32: 42`), quoted
/// strings (`"42.5"`) and values followed by a unit (`42 percent`).
pub fn parse_snmp_value(raw: &str) -> Result<f64, ProbeError> {
    let line = raw.lines().next().unwrap_or("").trim();
    let value = line.rsplit_once(": ").map(|(_, v)| v).unwrap_or(line);
    let value = value.trim().trim_matches('"');
    let token = value.split_whitespace().next().unwrap_or("");

    match token.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(ProbeError::Parse(line.to_string())),
    }
}
