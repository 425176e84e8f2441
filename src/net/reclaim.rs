//! Port reclaim policy.
//!
//! # Responsibilities
//! - Find the processes holding a TCP port
//! - Terminate them after a grace delay so the port can be bound again
//!
//! # Design Decisions
//! - Opt-in only (`reclaimPorts`); off by default
//! - Every evicted PID is logged at warn level
//! - Never terminates the current process
//! - Relies on `lsof` and `kill` being on `PATH`

use std::time::Duration;

use tokio::process::Command;

use crate::error::ListenerError;

/// Delay between killing the holder and retrying the bind.
const RELEASE_DELAY: Duration = Duration::from_millis(200);

/// Wait `grace`, then kill whatever holds `port`. Returns the evicted PIDs.
pub async fn reclaim_port(port: u16, grace: Duration) -> Result<Vec<u32>, ListenerError> {
    tracing::warn!(port, grace_ms = grace.as_millis() as u64, "Port in use, reclaiming");
    tokio::time::sleep(grace).await;

    let output = Command::new("lsof")
        .arg("-t")
        .arg(format!("-i:{port}"))
        .output()
        .await
        .map_err(|e| ListenerError::Reclaim {
            port,
            message: format!("lsof failed: {e}"),
        })?;

    let own_pid = std::process::id();
    let pids: Vec<u32> = parse_pids(&String::from_utf8_lossy(&output.stdout))
        .into_iter()
        .filter(|&pid| pid != own_pid)
        .collect();

    if pids.is_empty() {
        return Err(ListenerError::Reclaim {
            port,
            message: "no other process found holding the port".to_string(),
        });
    }

    for pid in &pids {
        tracing::warn!(port, pid, "Terminating process holding port");
        let status = Command::new("kill")
            .arg("-9")
            .arg(pid.to_string())
            .status()
            .await
            .map_err(|e| ListenerError::Reclaim {
                port,
                message: format!("kill {pid} failed: {e}"),
            })?;
        if !status.success() {
            tracing::warn!(port, pid, %status, "kill exited unsuccessfully");
        }
    }

    tokio::time::sleep(RELEASE_DELAY).await;
    Ok(pids)
}

/// One PID per line, as printed by `lsof -t`. Duplicates are removed.
fn parse_pids(output: &str) -> Vec<u32> {
    let mut pids: Vec<u32> = output
        .lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect();
    pids.sort_unstable();
    pids.dedup();
    pids
}
