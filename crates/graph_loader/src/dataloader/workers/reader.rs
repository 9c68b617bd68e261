//! Reader: decodes raw batches for the caller.
//!
//! Forwards the sentinel once it arrives and stops. If the upstream stage goes
//! away without one (it failed, and the failure is already recorded), the reader
//! ends the pass the same way.
//!
//! A decode failure is recorded before the output sender goes away, so the
//! consumer never mistakes it for a clean end of pass.

use anyhow::Result;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::debug;

use super::Message;
use crate::batch::{Batch, RawBatch};
use crate::dataloader::common::context::PassContext;
use crate::decoder::Decoder;

pub(crate) fn read(
    ctx: &PassContext,
    decoder: Decoder,
    input_rx: Receiver<Message<RawBatch>>,
    output_tx: Sender<Message<Batch>>,
) -> Result<()> {
    let mut decoded = 0usize;
    loop {
        if ctx.is_cancelled() {
            debug!(decoded, "Reader cancelled");
            return Ok(());
        }
        match input_rx.recv_timeout(ctx.poll_interval()) {
            Ok(Message::Batch(raw)) => {
                let batch = match decoder.decode(raw) {
                    Ok(batch) => batch,
                    Err(err) => {
                        ctx.fail(err.context(format!("Failed to decode batch {}", decoded)));
                        return Ok(());
                    }
                };
                decoded += 1;
                if !ctx.send(&output_tx, Message::Batch(batch)) {
                    return Ok(());
                }
            }
            Ok(Message::Sentinel) | Err(RecvTimeoutError::Disconnected) => {
                debug!(decoded, "Reader reached end of pass");
                ctx.send(&output_tx, Message::Sentinel);
                return Ok(());
            }
            Err(RecvTimeoutError::Timeout) => continue,
        }
    }
}
