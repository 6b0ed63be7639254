use crate::shutdown::{Shutdown, ShutdownReason};
use tokio::task::{JoinError, JoinSet};

fn report(result: Result<(), JoinError>) {
    match result {
        Err(e) if e.is_panic() => tracing::error!("An agent panicked: {e}"),
        _ => (),
    }
}

/// Waits for the shutdown signal, then for every agent to unwind. An agent exiting
/// before the signal takes the rest down with it.
pub async fn watch(mut agent_set: JoinSet<()>, shutdown: &Shutdown) {
    tokio::select! {
        _ = shutdown.cancelled() => (),
        result = agent_set.join_next() => {
            if let Some(result) = result {
                report(result);
            }
            if !shutdown.is_triggered() {
                tracing::warn!("One of the agents is dead, shutting the rest down");
                shutdown.trigger(ShutdownReason::AgentExited);
            }
        }
    }

    // agents watch the same signal and exit on their own, a blocking read can
    // hold one of them up to the read timeout
    while let Some(result) = agent_set.join_next().await {
        report(result);
    }
}
