//! Async test helpers for event streams

use crate::core_session::NodeEvent;
use std::future::Future;
use tokio::sync::broadcast;
use tokio::time::{timeout, Duration};

/// Default timeout for tests (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Short timeout for asserting that nothing arrives (100ms)
pub const SHORT_TEST_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvTimeoutError {
    Timeout,
    Closed,
}

impl std::fmt::Display for RecvTimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecvTimeoutError::Timeout => write!(f, "receive operation timed out"),
            RecvTimeoutError::Closed => write!(f, "channel closed"),
        }
    }
}

impl std::error::Error for RecvTimeoutError {}

/// Receive from a broadcast channel with a timeout, skipping over lag
pub async fn recv_timeout<T: Clone>(
    rx: &mut broadcast::Receiver<T>,
    duration: Duration,
) -> Result<T, RecvTimeoutError> {
    timeout(duration, async {
        loop {
            match rx.recv().await {
                Ok(value) => return Ok(value),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return Err(RecvTimeoutError::Closed),
            }
        }
    })
    .await
    .map_err(|_| RecvTimeoutError::Timeout)?
}

/// Wait for the first event matching `predicate`, discarding the rest
pub async fn wait_for_event<F>(
    rx: &mut broadcast::Receiver<NodeEvent>,
    duration: Duration,
    mut predicate: F,
) -> Result<NodeEvent, RecvTimeoutError>
where
    F: FnMut(&NodeEvent) -> bool,
{
    let deadline = tokio::time::Instant::now() + duration;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        let event = recv_timeout(rx, remaining).await?;
        if predicate(&event) {
            return Ok(event);
        }
    }
}

/// Assert that no event matching `predicate` arrives within `duration`
pub async fn assert_no_event<F>(rx: &mut broadcast::Receiver<NodeEvent>, duration: Duration, predicate: F)
where
    F: FnMut(&NodeEvent) -> bool,
{
    if let Ok(event) = wait_for_event(rx, duration, predicate).await {
        panic!("Unexpected event: {:?}", event);
    }
}

/// Assert a future completes within duration
pub async fn assert_completes_within<F, T>(duration: Duration, future: F) -> T
where
    F: Future<Output = T>,
{
    match timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => panic!("Future did not complete within {:?}", duration),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PeerId;

    #[tokio::test]
    async fn test_recv_timeout_elapses() {
        let (_tx, mut rx) = broadcast::channel::<u8>(4);
        assert_eq!(recv_timeout(&mut rx, Duration::from_millis(10)).await, Err(RecvTimeoutError::Timeout));
    }

    #[tokio::test]
    async fn test_recv_timeout_closed() {
        let (tx, mut rx) = broadcast::channel::<u8>(4);
        drop(tx);
        assert_eq!(recv_timeout(&mut rx, DEFAULT_TEST_TIMEOUT).await, Err(RecvTimeoutError::Closed));
    }

    #[tokio::test]
    async fn test_wait_for_event_skips_non_matching() {
        let (tx, mut rx) = broadcast::channel(8);
        tx.send(NodeEvent::KeyExchanged { peer_id: PeerId::from("a") }).unwrap();
        tx.send(NodeEvent::KeyExchanged { peer_id: PeerId::from("b") }).unwrap();

        let event = wait_for_event(&mut rx, DEFAULT_TEST_TIMEOUT, |e| {
            e.peer_id() == Some(&PeerId::from("b"))
        })
        .await
        .unwrap();
        assert_eq!(event, NodeEvent::KeyExchanged { peer_id: PeerId::from("b") });
    }
}
