//! Runs a single HDL conformance test case against an external tool.
//!
//! [`exec::execute`] is the shared subprocess primitive. Tool adapters
//! implement [`Runner`] and are looked up by name through [`registry`].

pub mod exec;
pub mod registry;
pub mod runner;
pub mod runners;

pub use exec::{
    execute, resolve_executable, CommandLine, ExecError, ExecutionResult, ResourceLimits,
};
pub use runner::{RunOutput, Runner, RunnerError, RunnerIdentity, TestParameters};
