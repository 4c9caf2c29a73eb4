//! # Orchestration Engine
//!
//! - [`calculator`] - creates tasks, resumes interrupted ones and serves queries
//! - [`task`] - the per-task run loop that feeds reduction waves to the worker pool

pub mod calculator;
pub mod task;

pub use calculator::Calculator;
pub use task::CalcTask;
