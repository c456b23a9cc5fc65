// core/src/lib.rs

//! enroll_flow: an async step-pipeline engine.
//!
//! A [`Pipeline`] is an ordered list of named steps. Each step may carry `on`
//! and `after` handlers, may be optional, and may be skipped by a condition
//! evaluated against the shared context. Handlers can stop the run early with
//! [`StepControl::Stop`]. Pipelines are registered in a [`FlowRegistry`] keyed
//! by their context type and run from request handlers.

pub mod context_data;
pub mod control;
pub mod error;
pub mod pipeline;
pub mod registry;
pub mod step;

pub use crate::context_data::ContextData;
pub use crate::control::{FlowOutcome, StepControl};
pub use crate::error::{FlowError, FlowResult};
pub use crate::pipeline::{Handler, Pipeline};
pub use crate::registry::FlowRegistry;
pub use crate::step::{SkipCondition, StepDef};
