// core/src/pipeline.rs

//! `Pipeline<TData, Err>`: step definitions, hook registration and execution.

use crate::context_data::ContextData;
use crate::control::{FlowOutcome, StepControl};
use crate::error::FlowError;
use crate::step::{SkipCondition, StepDef};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use tracing::{event, instrument, span, Instrument, Level};

/// A type-erased step handler.
///
/// Receives a clone of the run's `ContextData<TData>` and resolves to the
/// control signal for the pipeline, or the pipeline's error type.
pub type Handler<TData, Err> = Box<
  dyn Fn(ContextData<TData>) -> Pin<Box<dyn Future<Output = Result<StepControl, Err>> + Send>> + Send + Sync,
>;

pub struct Pipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  steps: Vec<StepDef<TData>>,
  on: HashMap<String, Vec<Handler<TData, Err>>>,
  after: HashMap<String, Vec<Handler<TData, Err>>>,
}

impl<TData, Err> Pipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  /// Creates a pipeline from `(name, optional, skip_if)` triples, run in order.
  pub fn new(step_defs: &[(&str, bool, Option<SkipCondition<TData>>)]) -> Self {
    let steps = step_defs
      .iter()
      .map(|(name, optional, skip_if)| StepDef {
        name: (*name).to_string(),
        optional: *optional,
        skip_if: skip_if.clone(),
      })
      .collect();

    Self {
      steps,
      on: HashMap::new(),
      after: HashMap::new(),
    }
  }

  pub fn step_names(&self) -> Vec<&str> {
    self.steps.iter().map(|s| s.name.as_str()).collect()
  }

  // A typo in a step name is a programming error caught at registration time.
  fn ensure_step_exists(&self, step_name: &str) {
    if !self.steps.iter().any(|s| s.name == step_name) {
      panic!("Pipeline setup error: step '{}' is not defined.", step_name);
    }
  }

  fn wrap<F, UserErr>(handler_fn: impl Fn(ContextData<TData>) -> F + Send + Sync + 'static) -> Handler<TData, Err>
  where
    F: Future<Output = Result<StepControl, UserErr>> + Send + 'static,
    UserErr: Into<Err> + Send + Sync + 'static,
  {
    Box::new(move |ctx_data| {
      let fut = handler_fn(ctx_data);
      Box::pin(async move { fut.await.map_err(Into::into) })
    })
  }

  /// Registers the main handler of a step.
  pub fn on_root<F, UserErr>(&mut self, step_name: &str, handler_fn: impl Fn(ContextData<TData>) -> F + Send + Sync + 'static)
  where
    F: Future<Output = Result<StepControl, UserErr>> + Send + 'static,
    UserErr: Into<Err> + Send + Sync + 'static,
  {
    self.ensure_step_exists(step_name);
    self
      .on
      .entry(step_name.to_string())
      .or_default()
      .push(Self::wrap(handler_fn));
  }

  /// Registers a handler that runs after all `on` handlers of the step succeeded.
  pub fn after_root<F, UserErr>(
    &mut self,
    step_name: &str,
    handler_fn: impl Fn(ContextData<TData>) -> F + Send + Sync + 'static,
  ) where
    F: Future<Output = Result<StepControl, UserErr>> + Send + 'static,
    UserErr: Into<Err> + Send + Sync + 'static,
  {
    self.ensure_step_exists(step_name);
    self
      .after
      .entry(step_name.to_string())
      .or_default()
      .push(Self::wrap(handler_fn));
  }

  async fn run_phase(
    &self,
    phase: &'static str,
    handlers: Option<&Vec<Handler<TData, Err>>>,
    ctx_data: &ContextData<TData>,
  ) -> Result<StepControl, Err> {
    for handler_fn in handlers.into_iter().flatten() {
      match handler_fn(ctx_data.clone()).await {
        Ok(StepControl::Continue) => {}
        Ok(StepControl::Stop) => {
          event!(Level::INFO, phase, "Pipeline stopped by handler.");
          return Ok(StepControl::Stop);
        }
        Err(e) => {
          event!(Level::ERROR, phase, error = %e, "Handler failed.");
          return Err(e);
        }
      }
    }
    Ok(StepControl::Continue)
  }

  async fn run_step(&self, step_def: &StepDef<TData>, ctx_data: &ContextData<TData>) -> Result<StepControl, Err> {
    let step_name = step_def.name.as_str();

    if let Some(skip_if) = &step_def.skip_if {
      if skip_if(ctx_data.clone()) {
        event!(Level::DEBUG, "Step skipped by condition.");
        return Ok(StepControl::Continue);
      }
    }

    let on_handlers = self.on.get(step_name).filter(|v| !v.is_empty());
    let after_handlers = self.after.get(step_name).filter(|v| !v.is_empty());

    if on_handlers.is_none() && after_handlers.is_none() {
      if step_def.optional {
        event!(Level::DEBUG, "Optional step has no handlers, skipping.");
        return Ok(StepControl::Continue);
      }
      event!(Level::ERROR, "Non-optional step has no handlers.");
      return Err(Err::from(FlowError::HandlerMissing {
        step_name: step_def.name.clone(),
      }));
    }

    if self.run_phase("on", on_handlers, ctx_data).await? == StepControl::Stop {
      return Ok(StepControl::Stop);
    }
    self.run_phase("after", after_handlers, ctx_data).await
  }

  /// Runs every step in order against `ctx_data`.
  #[instrument(
    name = "Pipeline::run",
    skip_all,
    fields(context_type = %std::any::type_name::<TData>(), num_steps = self.steps.len()),
    err(Display)
  )]
  pub async fn run(&self, ctx_data: ContextData<TData>) -> Result<FlowOutcome, Err> {
    for (step_idx, step_def) in self.steps.iter().enumerate() {
      let step_span = span!(Level::INFO, "pipeline_step", step_name = %step_def.name, step_index = step_idx);
      let control = self.run_step(step_def, &ctx_data).instrument(step_span).await?;
      if control == StepControl::Stop {
        return Ok(FlowOutcome::Stopped);
      }
    }

    event!(Level::DEBUG, "Pipeline completed.");
    Ok(FlowOutcome::Completed)
  }
}
