// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually running commands with
//! `tokio::process::Command` and reporting their output and completion back
//! to the caller.
//!
//! - [`command`] holds the immutable [`Command`] description.
//! - [`handler`] defines the [`ExecutionHandler`] callbacks bound at execute
//!   time.
//! - [`process`] provides [`ProcessHandle`], the caller's view of one
//!   managed process, and the [`ProcessResult`] it resolves to.
//! - [`runner`] drives a single child process: output relay, quit/kill
//!   requests, timeout enforcement.

pub mod command;
pub mod handler;
pub mod process;
pub(crate) mod runner;

pub use command::Command;
pub use handler::{ExecutionHandler, FnHandler, callbacks};
pub use process::{ProcessHandle, ProcessId, ProcessResult};
