//! Tasker Core - Shared registry types
//!
//! This crate contains the on-disk registry document that tracks the single
//! live Tasker supervisor instance, plus the record types stored in it.
//!
//! Everything that talks to the OS (process probing, port discovery, git,
//! the bundler and dev server) lives in the `tasker` crate.

mod record;
mod registry;

pub use record::*;
pub use registry::*;
