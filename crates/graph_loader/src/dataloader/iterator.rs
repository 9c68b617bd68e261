//! src/dataloader/iterator.rs
//!
//! Iteration over a Loader.
//!
//! - `LoaderIter`: returned by `Loader::iter()`. Either replays the cached single
//!   batch, or pulls batches of the running pass until its sentinel.
//! - `LoaderData`: returned by `Loader::data()`. The single batch itself, or the
//!   loader as a stream when it produces several.

use anyhow::Result;

use super::loader::Loader;
use crate::batch::Batch;

/// Iterator over the batches of one pass.
///
/// Yields `Err` in place of end-of-pass when a worker failed, then stops.
pub struct LoaderIter<'a> {
    inner: IterImpl<'a>,
}

enum IterImpl<'a> {
    /// Loader configured for exactly one batch.
    Single(Option<Batch>),
    /// Running pass of a multi-batch loader.
    Pass { loader: &'a mut Loader, done: bool },
}

impl<'a> LoaderIter<'a> {
    pub(crate) fn single(batch: Batch) -> Self {
        Self {
            inner: IterImpl::Single(Some(batch)),
        }
    }

    pub(crate) fn pass(loader: &'a mut Loader) -> Self {
        Self {
            inner: IterImpl::Pass {
                loader,
                done: false,
            },
        }
    }
}

impl Iterator for LoaderIter<'_> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            IterImpl::Single(batch) => batch.take().map(Ok),
            IterImpl::Pass { loader, done } => {
                if *done {
                    return None;
                }
                let item = loader.next_batch();
                // Nothing follows an error or the end of the pass.
                if !matches!(item, Some(Ok(_))) {
                    *done = true;
                }
                item
            }
        }
    }
}

/// What `Loader::data()` hands out.
pub enum LoaderData<'a> {
    Single(&'a Batch),
    Stream(&'a mut Loader),
}

impl<'a> LoaderData<'a> {
    pub fn as_single(&self) -> Option<&Batch> {
        match self {
            LoaderData::Single(batch) => Some(batch),
            LoaderData::Stream(_) => None,
        }
    }

    /// Starts a pass over the loader, or replays the single batch.
    pub fn into_batches(self) -> Result<LoaderIter<'a>> {
        match self {
            LoaderData::Single(batch) => Ok(LoaderIter::single(batch.clone())),
            LoaderData::Stream(loader) => loader.iter(),
        }
    }
}
