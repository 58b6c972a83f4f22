//! flowloop - Loop node iteration engine for node-graph flows
//!
//! A loop node repeatedly runs the nodes wired to its Iteration port,
//! as a counted loop, once per array element, or while a condition holds,
//! then hands its output to the nodes on its Complete port.

pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod expr;
pub mod flow;
pub mod id;
pub mod runtime;

pub use config::{LoopConfig, LoopType};
pub use engine::LoopEngine;
pub use error::{LoopError, Result};
pub use runtime::{ActivationFlag, Runtime};
