//! Echo-based liveness probe for pooled sessions.

use std::time::Duration;

use tokio::time::timeout;

use super::session::RemoteSession;

const PING_COMMAND: &str = "echo \"ping\"";
const PING_REPLY: &str = "ping";

/// Probe `session` with a round-trip echo bounded by `limit`.
///
/// Returns `false` when the session already reports itself disconnected,
/// when the echo fails or prints anything but `ping`, or when it does not
/// finish in time. The in-flight command is dropped on timeout.
pub async fn is_alive<S>(session: &S, limit: Duration) -> bool
where
    S: RemoteSession + ?Sized,
{
    if !session.is_connected() {
        return false;
    }

    match timeout(limit, session.execute_command(PING_COMMAND)).await {
        Ok(Ok(result)) => result.stdout.trim() == PING_REPLY,
        Ok(Err(e)) => {
            tracing::debug!("Liveness probe failed: {}", e);
            false
        }
        Err(_) => {
            tracing::debug!("Liveness probe timed out after {:?}", limit);
            false
        }
    }
}
