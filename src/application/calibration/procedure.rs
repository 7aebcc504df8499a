// Procedure contract - what each wizard step does and how a commit is planned
use crate::application::device_api::{ConfigPatch, PhBuffer};
use crate::domain::calibration::{check_reference, CalibrationPoint, Correction, ValidationError};
use crate::domain::sample::{Metric, OptimisticPatch, Sample};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::ops::RangeInclusive;

/// Effect of the primary action at a given step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StepAction {
    Start,
    Advance,
    /// Reference for `slot` is editable here and checked on leaving.
    EnterReference { slot: usize },
    /// Re-checks the reference for `slot` and stores the current raw reading.
    CaptureReading { slot: usize },
    Commit,
}

/// Transient values gathered while walking the steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Captured {
    pub references: [Option<f64>; 2],
    pub readings: [Option<f64>; 2],
}

/// Invalid operator input, and the step to continue from.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub error: ValidationError,
    pub resume_at: u8,
}

impl Rejection {
    pub fn at(resume_at: u8, error: ValidationError) -> Self {
        Self { error, resume_at }
    }
}

/// Work to perform for a commit step.
#[derive(Debug, Clone)]
pub enum CommitPlan {
    /// The device fits the correction itself.
    Delegate {
        buffer: PhBuffer,
        optimistic: Option<OptimisticPatch>,
    },
    /// The console computed the correction and writes it to the config.
    Persist {
        correction: Correction,
        points: Vec<CalibrationPoint>,
        patch: ConfigPatch,
        optimistic: OptimisticPatch,
    },
}

impl CommitPlan {
    pub fn optimistic(&self) -> Option<OptimisticPatch> {
        match self {
            CommitPlan::Delegate { optimistic, .. } => *optimistic,
            CommitPlan::Persist { optimistic, .. } => Some(*optimistic),
        }
    }

    pub fn correction(&self) -> Option<Correction> {
        match self {
            CommitPlan::Delegate { .. } => None,
            CommitPlan::Persist { correction, .. } => Some(*correction),
        }
    }
}

pub trait CalibrationProcedure: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn metric(&self) -> Metric;

    /// Index of the last step; step 0 is idle.
    fn last_step(&self) -> u8;

    fn action(&self, step: u8) -> StepAction;

    fn reference_range(&self) -> Option<RangeInclusive<f64>> {
        None
    }

    fn raw_reading(&self, _sample: &Sample) -> Option<f64> {
        None
    }

    fn raw_field(&self) -> &'static str {
        "sensor"
    }

    /// Validates captured values against `sample` and builds the commit.
    fn plan_commit(
        &self,
        step: u8,
        captured: &Captured,
        sample: Option<&Sample>,
        now: DateTime<Utc>,
    ) -> Result<CommitPlan, Rejection>;

    /// Step at which the reference for `slot` is entered.
    fn entry_step(&self, slot: usize) -> u8 {
        (1..=self.last_step())
            .find(|step| self.action(*step) == StepAction::EnterReference { slot })
            .unwrap_or(0)
    }

    /// Reference for `slot`; an invalid one sends the wizard back to its entry step.
    fn checked_reference(&self, captured: &Captured, slot: usize) -> Result<f64, Rejection> {
        let value = captured.references.get(slot).copied().flatten();
        let range = self
            .reference_range()
            .unwrap_or(f64::NEG_INFINITY..=f64::INFINITY);
        check_reference(value, &range).map_err(|e| Rejection::at(self.entry_step(slot), e))
    }

    /// Current raw reading; refusing keeps the wizard on `step`.
    fn required_raw(&self, step: u8, sample: Option<&Sample>) -> Result<f64, Rejection> {
        sample.and_then(|s| self.raw_reading(s)).ok_or_else(|| {
            Rejection::at(
                step,
                ValidationError::MissingRawReading {
                    field: self.raw_field(),
                },
            )
        })
    }
}
