//! Pass workers.
//!
//! Every pass runs up to three stages on their own threads:
//! - `dispatcher`: triggers the remote query (`request_rest` or `request_broker`)
//! - `downloader`: broker mode only, polls the pass topic and reassembles pairs
//! - `reader`: decodes raw batches for the caller
//!
//! Stages talk through bounded channels carrying [`Message`]s. Each pass ends
//! with exactly one `Sentinel` on both queues, after the last batch.

pub(crate) mod dispatcher;
pub(crate) mod downloader;
pub(crate) mod pool;
pub(crate) mod reader;

/// Item of an inter-stage queue.
#[derive(Debug)]
pub(crate) enum Message<T> {
    Batch(T),
    /// No more batches in this pass.
    Sentinel,
}

/// Raw batches waiting for the decoder, per unit of `buffer_size`.
pub(crate) const INPUT_QUEUE_FACTOR: usize = 2;
