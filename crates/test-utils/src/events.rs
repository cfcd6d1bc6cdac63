use procwatch::proc::types::{ServiceStatus, StatusEvent};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

/// Receive from the status feed until `id` reaches `status`.
///
/// Panics if the feed closes first; combine with `with_timeout` so a missing
/// transition fails the test instead of hanging it.
pub async fn wait_for_status(
    rx: &mut broadcast::Receiver<StatusEvent>,
    id: &str,
    status: ServiceStatus,
) -> StatusEvent {
    loop {
        match rx.recv().await {
            Ok(event) if event.service_id == id && event.status == status => return event,
            Ok(_) => continue,
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => panic!("status feed closed while waiting for {status:?}"),
        }
    }
}

/// Receive from the status feed until `id` reaches a terminal state,
/// recording every status observed for `id` along the way (inclusive).
pub async fn statuses_until_terminal(
    rx: &mut broadcast::Receiver<StatusEvent>,
    id: &str,
) -> Vec<ServiceStatus> {
    let mut seen = Vec::new();
    loop {
        match rx.recv().await {
            Ok(event) if event.service_id == id => {
                seen.push(event.status);
                if event.status.is_terminal() {
                    return seen;
                }
            }
            Ok(_) => continue,
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => panic!("status feed closed before a terminal state"),
        }
    }
}
