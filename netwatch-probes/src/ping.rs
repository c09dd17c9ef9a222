use crate::ProbeError;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// ICMP reachability through the system `ping` binary.
#[derive(Debug, Clone)]
pub struct PingProbe {
    binary: String,
    timeout: Duration,
}

impl PingProbe {
    pub fn new(timeout: Duration) -> Self {
        Self {
            binary: "ping".to_string(),
            timeout,
        }
    }

    /// Use another executable (busybox ping, a wrapper script...).
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// One echo request; `Ok(false)` means the host did not answer.
    pub async fn ping_once(&self, address: &str) -> Result<bool, ProbeError> {
        // -W wants whole seconds and 0 means "wait forever" on some platforms
        let wait_secs = self.timeout.as_secs().max(1);
        let wait_arg = wait_secs.to_string();

        let mut cmd = Command::new(&self.binary);
        cmd.args(["-c", "1", "-W", wait_arg.as_str(), address])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|source| ProbeError::Spawn { tool: "ping", source })?;

        // ping's own -W covers the reply; the grace second covers DNS and process startup
        let deadline = Duration::from_secs(wait_secs) + Duration::from_secs(1);
        match tokio::time::timeout(deadline, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(output.status.success()),
            Ok(Err(source)) => Err(ProbeError::Spawn { tool: "ping", source }),
            Err(_) => Err(ProbeError::Timeout { tool: "ping", after: deadline }),
        }
    }

    /// [`PingProbe::ping_once`] with errors logged and counted as down.
    pub async fn reachable(&self, address: &str) -> bool {
        match self.ping_once(address).await {
            Ok(up) => up,
            Err(e) => {
                tracing::warn!(address, error = %e, "ping check failed");
                false
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn zero_exit_status_means_reachable() {
        let probe = PingProbe::new(Duration::from_secs(1)).with_binary("true");
        assert!(probe.reachable("192.0.2.1").await);
    }

    #[tokio::test]
    async fn non_zero_exit_status_means_unreachable() {
        let probe = PingProbe::new(Duration::from_secs(1)).with_binary("false");
        assert!(matches!(probe.ping_once("192.0.2.1").await, Ok(false)));
        assert!(!probe.reachable("192.0.2.1").await);
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error_and_counts_as_down() {
        let probe = PingProbe::new(Duration::from_secs(1)).with_binary("/nonexistent/netwatch-ping");
        assert!(matches!(
            probe.ping_once("192.0.2.1").await,
            Err(ProbeError::Spawn { tool: "ping", .. })
        ));
        assert!(!probe.reachable("192.0.2.1").await);
    }
}
