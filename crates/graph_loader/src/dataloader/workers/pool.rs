//! Worker threads of one pass.
//!
//! Manages the lifecycle of the dispatcher, downloader and reader threads:
//! - Each worker runs on a named OS thread
//! - A worker that returns an error records it in the pass context, which also
//!   cancels the pass so the other workers wind down
//! - Joining reports panics, and dropping the pool cancels and joins

use anyhow::{Context, Result};
use std::thread;
use tracing::{debug, warn};

use crate::dataloader::common::context::PassContext;
use crate::error::LoaderError;

pub(crate) struct PassWorkers {
    workers: Vec<(String, thread::JoinHandle<()>)>,
    ctx: PassContext,
    pass: usize,
}

impl PassWorkers {
    pub(crate) fn new(ctx: PassContext, pass: usize) -> Self {
        Self {
            workers: Vec::with_capacity(3),
            ctx,
            pass,
        }
    }

    /// Starts `stage` on a new thread named after the stage and the pass.
    pub(crate) fn spawn<F>(&mut self, stage: &str, work: F) -> Result<()>
    where
        F: FnOnce(&PassContext) -> Result<()> + Send + 'static,
    {
        let name = format!("graph-loader-{}-{}", stage, self.pass);
        let ctx = self.ctx.clone();
        let stage_name = stage.to_string();

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                debug!(stage = %stage_name, "Worker started");
                if let Err(err) = work(&ctx) {
                    warn!(stage = %stage_name, error = %err, "Worker failed");
                    ctx.fail(err.context(format!("{} worker failed", stage_name)));
                }
                debug!(stage = %stage_name, "Worker exited");
            })
            .with_context(|| format!("Failed to spawn worker thread {}", name))?;

        self.workers.push((name, handle));
        Ok(())
    }

    /// Waits for every worker. The first panic is reported as `WorkerPanicked`.
    pub(crate) fn join(&mut self) -> Result<()> {
        let mut panicked = None;
        for (name, handle) in self.workers.drain(..) {
            if handle.join().is_err() && panicked.is_none() {
                panicked = Some(name);
            }
        }
        match panicked {
            Some(name) => Err(LoaderError::WorkerPanicked(name).into()),
            None => Ok(()),
        }
    }
}

impl Drop for PassWorkers {
    fn drop(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        self.ctx.cancel();
        if let Err(err) = self.join() {
            warn!(error = %err, "Worker ended abnormally during shutdown");
        }
    }
}
