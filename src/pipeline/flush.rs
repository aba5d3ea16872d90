//! Per-batch flush coordination.

use std::sync::Arc;

use futures::future::join_all;

use crate::pipeline::channel::ChannelKey;
use crate::pipeline::router::SampleRouter;
use crate::pipeline::session::DestinationMap;
use crate::pipeline::sink::{BatchSink, SinkError};

/// Outcome of one flush.
#[derive(Debug, Default)]
pub struct FlushSummary {
    /// Uploads dispatched (channels that had pending data).
    pub dispatched: usize,
    /// Channels whose upload failed after the sink gave up.
    pub failures: Vec<(ChannelKey, SinkError)>,
}

impl FlushSummary {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Drains channel buffers on each batch notification and hands the extracted
/// batches to the sink.
///
/// Uploads within one batch run concurrently, but the coordinator joins on
/// all of them before returning: the source is not told streaming is caught
/// up until the batch is fully flushed, which bounds how far buffering can
/// drift ahead of delivery.
pub struct FlushCoordinator<K> {
    sink: Arc<K>,
    destinations: DestinationMap,
}

impl<K: BatchSink> FlushCoordinator<K> {
    pub fn new(sink: Arc<K>, destinations: DestinationMap) -> Self {
        Self { sink, destinations }
    }

    pub fn destinations(&self) -> &DestinationMap {
        &self.destinations
    }

    /// Flush every channel with pending data and wait for all uploads.
    pub async fn flush_batch(&self, router: &mut SampleRouter) -> FlushSummary {
        let mut pending = Vec::new();
        for (key, destination) in self.destinations.iter() {
            if let Some(text) = router.drain(key) {
                pending.push((key, destination, text));
            }
        }

        if pending.is_empty() {
            return FlushSummary::default();
        }

        let dispatched = pending.len();
        let uploads = pending.into_iter().map(|(key, destination, text)| {
            let sink = Arc::clone(&self.sink);
            async move {
                let result = sink.deliver(key, destination, text).await;
                (key, result)
            }
        });

        let mut failures = Vec::new();
        for (key, result) in join_all(uploads).await {
            if let Err(e) = result {
                failures.push((key, e));
            }
        }

        FlushSummary {
            dispatched,
            failures,
        }
    }
}
