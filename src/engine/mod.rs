// src/engine/mod.rs

//! Pipeline engine.
//!
//! Ties together:
//! - the carrier (mailboxes + routing)
//! - one mailbox loop per interceptor
//! - the virtual driver that feeds sources and drains sinks
//! - shutdown on completion, fatal error, or Ctrl-C

pub mod driver;
pub mod runtime;

pub use driver::Driver;
pub use runtime::PipelineRuntime;
