// Calibration session - generic linear wizard driven by a procedure
use super::procedure::{CalibrationProcedure, Captured, CommitPlan, Rejection, StepAction};
use super::{CalibrationContext, CalibrationError};
use crate::application::device_api::{DeviceApi, DeviceError, PhBuffer};
use crate::domain::calibration::{step_marks, CalibrationPoint, Correction, StepMark};
use crate::domain::sample::{Metric, Sample};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;

/// Snapshot of a session for rendering.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub procedure: &'static str,
    pub metric: Metric,
    pub step: u8,
    pub total_steps: u8,
    pub marks: Vec<StepMark>,
    pub action: StepAction,
    pub reference_editable: bool,
    pub captured: Captured,
    /// Last commit failure, shown until acknowledged.
    pub failure: Option<String>,
}

/// What the next commit would send, shown before confirming.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommitPreview {
    Device { buffer: PhBuffer, nominal_ph: f64 },
    Correction {
        correction: Correction,
        points: Vec<CalibrationPoint>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Completion {
    pub procedure: &'static str,
    pub metric: Metric,
    pub correction: Option<Correction>,
    /// Water temperature reported with a device-side calibration.
    pub device_temperature: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Transition {
    Advanced { step: u8 },
    Captured { step: u8, reading: f64 },
    /// Intermediate commit accepted by the device.
    Committed { step: u8 },
    Completed(Completion),
}

/// Object-safe face of a session, so differently parameterised sessions
/// can live side by side.
#[async_trait]
pub trait Wizard: Send {
    fn view(&self) -> SessionView;

    fn is_active(&self) -> bool;

    fn enter_reference(&mut self, value: f64) -> Result<(), CalibrationError>;

    fn preview(&self, sample: Option<&Sample>) -> Result<CommitPreview, CalibrationError>;

    async fn advance(
        &mut self,
        ctx: &CalibrationContext<'_>,
    ) -> Result<Transition, CalibrationError>;

    fn cancel(&mut self) -> Result<(), CalibrationError>;

    fn acknowledge(&mut self);
}

pub struct CalibrationSession<P> {
    procedure: P,
    step: u8,
    captured: Captured,
    failure: Option<String>,
}

impl<P: CalibrationProcedure> CalibrationSession<P> {
    pub fn new(procedure: P) -> Self {
        Self {
            procedure,
            step: 0,
            captured: Captured::default(),
            failure: None,
        }
    }

    pub fn step(&self) -> u8 {
        self.step
    }

    pub fn captured(&self) -> &Captured {
        &self.captured
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    fn reset(&mut self) {
        self.step = 0;
        self.captured = Captured::default();
    }

    fn reject(&mut self, rejection: Rejection) -> CalibrationError {
        tracing::info!(
            procedure = self.procedure.name(),
            from = self.step,
            to = rejection.resume_at,
            "calibration input rejected: {}",
            rejection.error
        );
        self.step = rejection.resume_at;
        CalibrationError::Validation(rejection.error)
    }

    fn next_commit_step(&self) -> Option<u8> {
        if self.step == 0 {
            return None;
        }
        (self.step..=self.procedure.last_step())
            .find(|step| self.procedure.action(*step) == StepAction::Commit)
    }

    async fn commit(
        &mut self,
        step: u8,
        ctx: &CalibrationContext<'_>,
    ) -> Result<Transition, CalibrationError> {
        let name = self.procedure.name();
        // The store may change while the request is out; plan from one snapshot.
        let sample = ctx.telemetry.store().latest();
        let plan = match self
            .procedure
            .plan_commit(step, &self.captured, sample.as_ref(), Utc::now())
        {
            Ok(plan) => plan,
            Err(rejection) => return Err(self.reject(rejection)),
        };

        tracing::info!(procedure = name, step, "committing calibration step");
        let outcome = match tokio::time::timeout(ctx.commit_timeout, execute(&plan, ctx.device))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(DeviceError::Network(format!(
                "calibration request got no answer within {:?}",
                ctx.commit_timeout
            ))),
        };

        let device_temperature = match outcome {
            Ok(temperature) => temperature,
            Err(error) => {
                tracing::warn!(
                    procedure = name,
                    step,
                    kind = error.kind(),
                    "calibration commit failed: {}",
                    error
                );
                self.reset();
                self.failure = Some(error.operator_message());
                return Err(CalibrationError::Device(error));
            }
        };

        if step < self.procedure.last_step() {
            self.step = step + 1;
            return Ok(Transition::Committed { step: self.step });
        }

        if let Some(patch) = plan.optimistic() {
            ctx.telemetry.apply_optimistic(&patch);
        }
        ctx.telemetry.invalidate();
        ctx.telemetry.schedule_reconcile(ctx.reconcile_delay);
        self.reset();

        tracing::info!(procedure = name, "calibration completed");
        Ok(Transition::Completed(Completion {
            procedure: name,
            metric: self.procedure.metric(),
            correction: plan.correction(),
            device_temperature,
        }))
    }
}

async fn execute(plan: &CommitPlan, device: &dyn DeviceApi) -> Result<Option<f64>, DeviceError> {
    match plan {
        CommitPlan::Delegate { buffer, .. } => device
            .calibrate_ph(*buffer)
            .await
            .map(|reply| reply.temperature),
        CommitPlan::Persist { patch, .. } => device.save_config(patch).await.map(|()| None),
    }
}

#[async_trait]
impl<P: CalibrationProcedure> Wizard for CalibrationSession<P> {
    fn view(&self) -> SessionView {
        let action = self.procedure.action(self.step);
        SessionView {
            procedure: self.procedure.name(),
            metric: self.procedure.metric(),
            step: self.step,
            total_steps: self.procedure.last_step(),
            marks: step_marks(self.step, self.procedure.last_step()),
            action,
            reference_editable: matches!(action, StepAction::EnterReference { .. }),
            captured: self.captured.clone(),
            failure: self.failure.clone(),
        }
    }

    fn is_active(&self) -> bool {
        self.step > 0
    }

    fn enter_reference(&mut self, value: f64) -> Result<(), CalibrationError> {
        match self.procedure.action(self.step) {
            StepAction::EnterReference { slot } if slot < self.captured.references.len() => {
                self.captured.references[slot] = Some(value);
                Ok(())
            }
            _ => Err(CalibrationError::NotEditable),
        }
    }

    fn preview(&self, sample: Option<&Sample>) -> Result<CommitPreview, CalibrationError> {
        let step = self
            .next_commit_step()
            .ok_or(CalibrationError::NothingToCommit)?;
        let plan = self
            .procedure
            .plan_commit(step, &self.captured, sample, Utc::now())
            .map_err(|rejection| CalibrationError::Validation(rejection.error))?;

        Ok(match plan {
            CommitPlan::Delegate { buffer, .. } => CommitPreview::Device {
                buffer,
                nominal_ph: buffer.nominal_ph(),
            },
            CommitPlan::Persist {
                correction, points, ..
            } => CommitPreview::Correction { correction, points },
        })
    }

    async fn advance(
        &mut self,
        ctx: &CalibrationContext<'_>,
    ) -> Result<Transition, CalibrationError> {
        if self.failure.is_some() {
            return Err(CalibrationError::FailurePending);
        }

        let step = self.step;
        match self.procedure.action(step) {
            StepAction::Start | StepAction::Advance => {
                self.step = step + 1;
                Ok(Transition::Advanced { step: self.step })
            }
            StepAction::EnterReference { slot } => {
                if let Err(rejection) = self.procedure.checked_reference(&self.captured, slot) {
                    return Err(self.reject(rejection));
                }
                self.step = step + 1;
                Ok(Transition::Advanced { step: self.step })
            }
            StepAction::CaptureReading { slot } => {
                let sample = ctx.telemetry.store().latest();
                let reading = self
                    .procedure
                    .checked_reference(&self.captured, slot)
                    .and_then(|_| self.procedure.required_raw(step, sample.as_ref()));
                let reading = match reading {
                    Ok(reading) => reading,
                    Err(rejection) => return Err(self.reject(rejection)),
                };
                if let Some(captured) = self.captured.readings.get_mut(slot) {
                    *captured = Some(reading);
                }
                tracing::debug!(procedure = self.procedure.name(), slot, reading, "point captured");
                self.step = step + 1;
                Ok(Transition::Captured {
                    step: self.step,
                    reading,
                })
            }
            StepAction::Commit => self.commit(step, ctx).await,
        }
    }

    fn cancel(&mut self) -> Result<(), CalibrationError> {
        if self.failure.is_some() {
            return Err(CalibrationError::FailurePending);
        }
        if self.step > 0 {
            tracing::info!(procedure = self.procedure.name(), step = self.step, "calibration cancelled");
        }
        self.reset();
        Ok(())
    }

    fn acknowledge(&mut self) {
        self.failure = None;
    }
}
