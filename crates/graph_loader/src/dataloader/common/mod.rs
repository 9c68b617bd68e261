//! src/dataloader/common/mod.rs
//!
//! Utilities shared by the loader and its pass workers.

pub(crate) mod context;
pub(crate) mod id;
