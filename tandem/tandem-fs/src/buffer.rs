//! Growable FIFO pipe between the notification source and the translator.
//!
//! The OS notification source cannot be slowed down, while translation stats
//! and hashes files. The pipe keeps a chain of bounded segments: a grower task
//! writes into the current segment and replaces it with a larger one whenever
//! it is half full, or with a smaller one once a burst has passed. A drainer
//! task empties the sealed segments strictly in creation order into the output.

use tokio::sync::mpsc;
use tracing::trace;

/// Open a growable pipe with the given initial segment capacity.
///
/// Every item accepted on the returned sender comes out of the returned
/// receiver, in order. Dropping the sender closes the receiver once the last
/// buffered item has been delivered.
pub fn open<T: Send + 'static>(capacity: usize) -> (mpsc::Sender<T>, mpsc::Receiver<T>) {
    let initial = capacity.max(1);
    let (input_tx, input_rx) = mpsc::channel(initial);
    let (output_tx, output_rx) = mpsc::channel(initial);
    let (segments_tx, segments_rx) = mpsc::unbounded_channel();

    tokio::spawn(grow(input_rx, segments_tx, initial));
    tokio::spawn(drain(segments_rx, output_tx));

    (input_tx, output_rx)
}

/// Segment size for the next item, or `None` to keep the current segment.
fn next_capacity(len: usize, cap: usize, initial: usize) -> Option<usize> {
    if len >= cap / 2 {
        Some(cap * 2)
    } else if len >= initial && len <= cap / 4 {
        Some(cap / 2)
    } else {
        None
    }
}

fn open_segment<T>(
    segments: &mpsc::UnboundedSender<mpsc::Receiver<T>>,
    capacity: usize,
) -> Option<mpsc::Sender<T>> {
    let (tx, rx) = mpsc::channel(capacity);
    segments.send(rx).ok()?;
    Some(tx)
}

async fn grow<T>(
    mut input: mpsc::Receiver<T>,
    segments: mpsc::UnboundedSender<mpsc::Receiver<T>>,
    initial: usize,
) {
    let Some(mut current) = open_segment(&segments, initial) else {
        return;
    };

    while let Some(item) = input.recv().await {
        let cap = current.max_capacity();
        let len = cap - current.capacity();
        if let Some(next) = next_capacity(len, cap, initial) {
            trace!("Sealing segment at {}/{}, next capacity {}", len, cap, next);
            // Dropping the sender seals the segment for the drainer.
            current = match open_segment(&segments, next) {
                Some(segment) => segment,
                None => return,
            };
        }
        // The segment is at most half full here, so this never waits.
        if current.send(item).await.is_err() {
            return;
        }
    }
}

async fn drain<T>(mut segments: mpsc::UnboundedReceiver<mpsc::Receiver<T>>, output: mpsc::Sender<T>) {
    while let Some(mut segment) = segments.recv().await {
        while let Some(item) = segment.recv().await {
            if output.send(item).await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_next_capacity() {
        assert_eq!(next_capacity(0, 8, 8), None);
        assert_eq!(next_capacity(3, 8, 8), None);
        assert_eq!(next_capacity(4, 8, 8), Some(16));
        // Shrink once the backlog is small relative to the segment.
        assert_eq!(next_capacity(8, 64, 8), Some(32));
        assert_eq!(next_capacity(20, 64, 8), None);
        assert_eq!(next_capacity(7, 64, 8), None);
    }

    #[tokio::test]
    async fn test_burst_without_reader_is_not_dropped() {
        let (input, mut output) = open::<u32>(4);
        for i in 0..10_000 {
            input.send(i).await.unwrap();
        }
        drop(input);

        let mut received = Vec::new();
        while let Some(i) = output.recv().await {
            received.push(i);
        }
        assert_eq!(received, (0..10_000).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_close_propagates_when_empty() {
        let (input, mut output) = open::<u32>(16);
        drop(input);
        assert!(output.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_zero_capacity_is_clamped() {
        let (input, mut output) = open::<&str>(0);
        input.send("a").await.unwrap();
        input.send("b").await.unwrap();
        drop(input);
        assert_eq!(output.recv().await, Some("a"));
        assert_eq!(output.recv().await, Some("b"));
        assert_eq!(output.recv().await, None);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_fifo_and_lossless(
            items in prop::collection::vec(any::<u16>(), 0..2000),
            capacity in 1usize..64,
            pauses in prop::collection::vec(0u8..4, 1..64),
        ) {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .unwrap();

            let received = rt.block_on(async {
                let (input, mut output) = open::<u16>(capacity);
                let producer = {
                    let items = items.clone();
                    tokio::spawn(async move {
                        for item in items {
                            input.send(item).await.unwrap();
                        }
                    })
                };

                let mut received = Vec::with_capacity(items.len());
                let mut step = 0usize;
                while let Some(item) = output.recv().await {
                    received.push(item);
                    for _ in 0..pauses[step % pauses.len()] {
                        tokio::task::yield_now().await;
                    }
                    step += 1;
                }
                producer.await.unwrap();
                received
            });

            prop_assert_eq!(received, items);
        }
    }
}
