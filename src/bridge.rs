//! Bridges a blocking upstream fragment iterator onto an async consumer.
//!
//! Each streamed request gets its own bounded hand-off queue, one producer
//! worker on the blocking pool, and one consumer on the request task.
//! Fragments arrive in upstream order; a failure is delivered as the final
//! `Err` item; end-of-stream is the channel closing when the worker drops
//! its sender.

use crate::upstream::UpstreamError;
use tokio::sync::mpsc;

/// Queue depth per streamed request. Bounded so a stalled client applies
/// backpressure to the worker instead of buffering the whole generation.
const HANDOFF_CAPACITY: usize = 32;

/// Spawns the producer worker for one streamed request and returns the
/// consumer half of its hand-off queue.
///
/// `open` performs the blocking call that starts the upstream stream, so it
/// runs on the worker as well; an open failure arrives as the only item.
/// When the receiver is dropped (client disconnect) the worker's next send
/// fails and the worker returns, abandoning the upstream iterator.
pub fn spawn_fragment_worker<F, I>(open: F) -> mpsc::Receiver<Result<String, UpstreamError>>
where
    F: FnOnce() -> Result<I, UpstreamError> + Send + 'static,
    I: Iterator<Item = Result<String, UpstreamError>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(HANDOFF_CAPACITY);
    tokio::task::spawn_blocking(move || {
        let fragments = match open() {
            Ok(fragments) => fragments,
            Err(err) => {
                let _ = tx.blocking_send(Err(err));
                return;
            }
        };
        for item in fragments {
            let failed = item.is_err();
            if tx.blocking_send(item).is_err() {
                // Consumer gone; stop pulling from upstream.
                return;
            }
            if failed {
                return;
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_fragments_in_order_then_closes() {
        let mut rx = spawn_fragment_worker(|| {
            Ok(["A", "B", "C"]
                .into_iter()
                .map(|s| Ok(s.to_string()))
                .collect::<Vec<_>>()
                .into_iter())
        });
        assert_eq!(rx.recv().await.unwrap().unwrap(), "A");
        assert_eq!(rx.recv().await.unwrap().unwrap(), "B");
        assert_eq!(rx.recv().await.unwrap().unwrap(), "C");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn propagates_mid_stream_failure_after_fragments() {
        let mut rx = spawn_fragment_worker(|| {
            Ok(vec![
                Ok("A".to_string()),
                Err(UpstreamError::network("connection reset")),
            ]
            .into_iter())
        });
        assert_eq!(rx.recv().await.unwrap().unwrap(), "A");
        let err = rx.recv().await.unwrap().unwrap_err();
        assert!(err.message.contains("connection reset"));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn propagates_open_failure_as_only_item() {
        let mut rx = spawn_fragment_worker(|| {
            Err::<std::vec::IntoIter<Result<String, UpstreamError>>, _>(UpstreamError::network(
                "dns failure",
            ))
        });
        let err = rx.recv().await.unwrap().unwrap_err();
        assert!(err.message.contains("dns failure"));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn dropped_consumer_stops_the_worker() {
        let (probe_tx, mut probe_rx) = mpsc::unbounded_channel::<&'static str>();
        let rx = spawn_fragment_worker(move || {
            // More fragments than the queue holds; the worker can only
            // finish if the failed send makes it bail out.
            Ok((0..HANDOFF_CAPACITY * 4)
                .map(|i| Ok(i.to_string()))
                .chain(std::iter::once_with(move || {
                    let _ = probe_tx.send("drained past the drop");
                    Ok("tail".to_string())
                })))
        });
        drop(rx);
        // The worker must terminate without ever reaching the probe item.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(probe_rx.try_recv().is_err());
    }
}
