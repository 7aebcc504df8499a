// The four calibration procedures offered by the console
use super::procedure::{CalibrationProcedure, Captured, CommitPlan, Rejection, StepAction};
use crate::application::device_api::{ConfigPatch, PhBuffer};
use crate::domain::calibration::{
    two_point_correction, CalibrationPoint, Correction, ValidationError,
    ORP_REFERENCE_RANGE, TEMPERATURE_REFERENCE_RANGE,
};
use crate::domain::sample::{Metric, OptimisticPatch, Sample};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;
use std::ops::RangeInclusive;

fn calibration_date(now: DateTime<Utc>) -> serde_json::Value {
    json!(now.to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// Water temperature, offset only.
/// Steps: probe placed, reference entry, commit.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemperatureOffset;

impl CalibrationProcedure for TemperatureOffset {
    fn name(&self) -> &'static str {
        "temperature"
    }

    fn metric(&self) -> Metric {
        Metric::Temperature
    }

    fn last_step(&self) -> u8 {
        3
    }

    fn action(&self, step: u8) -> StepAction {
        match step {
            0 => StepAction::Start,
            2 => StepAction::EnterReference { slot: 0 },
            3 => StepAction::Commit,
            _ => StepAction::Advance,
        }
    }

    fn reference_range(&self) -> Option<RangeInclusive<f64>> {
        Some(TEMPERATURE_REFERENCE_RANGE)
    }

    fn raw_reading(&self, sample: &Sample) -> Option<f64> {
        sample.temperature_raw
    }

    fn raw_field(&self) -> &'static str {
        "temperature"
    }

    fn plan_commit(
        &self,
        step: u8,
        captured: &Captured,
        sample: Option<&Sample>,
        now: DateTime<Utc>,
    ) -> Result<CommitPlan, Rejection> {
        let reference = self.checked_reference(captured, 0)?;
        let raw = self.required_raw(step, sample)?;
        let correction = Correction::offset_only(reference, raw);

        let mut patch = ConfigPatch::new();
        patch.insert("temp_calibration_offset".into(), json!(correction.offset));
        patch.insert("temp_calibration_date".into(), calibration_date(now));

        Ok(CommitPlan::Persist {
            correction,
            points: vec![CalibrationPoint {
                measured: raw,
                reference,
            }],
            patch,
            optimistic: OptimisticPatch {
                metric: Metric::Temperature,
                value: reference,
                raw: Some(raw),
            },
        })
    }
}

/// pH with buffers 7.0 then 4.0; the device computes the regression.
/// Steps: probe in 7.0, commit 7.0, probe in 4.0, commit 4.0.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhTwoPoint;

impl CalibrationProcedure for PhTwoPoint {
    fn name(&self) -> &'static str {
        "ph"
    }

    fn metric(&self) -> Metric {
        Metric::Ph
    }

    fn last_step(&self) -> u8 {
        4
    }

    fn action(&self, step: u8) -> StepAction {
        match step {
            0 => StepAction::Start,
            2 | 4 => StepAction::Commit,
            _ => StepAction::Advance,
        }
    }

    fn plan_commit(
        &self,
        step: u8,
        _captured: &Captured,
        _sample: Option<&Sample>,
        _now: DateTime<Utc>,
    ) -> Result<CommitPlan, Rejection> {
        let buffer = if step == self.last_step() {
            PhBuffer::Acid
        } else {
            PhBuffer::Neutral
        };
        let optimistic = (buffer == PhBuffer::Acid).then(|| OptimisticPatch {
            metric: Metric::Ph,
            value: buffer.nominal_ph(),
            raw: None,
        });
        Ok(CommitPlan::Delegate { buffer, optimistic })
    }
}

fn orp_patch(correction: Correction, reference: f64, now: DateTime<Utc>) -> ConfigPatch {
    let mut patch = ConfigPatch::new();
    patch.insert("orp_calibration_offset".into(), json!(correction.offset));
    patch.insert("orp_calibration_slope".into(), json!(correction.slope));
    patch.insert("orp_calibration_date".into(), calibration_date(now));
    patch.insert("orp_calibration_reference".into(), json!(reference));
    patch
}

/// ORP against one reference solution, offset only (slope fixed at 1).
#[derive(Debug, Clone, Copy, Default)]
pub struct OrpOnePoint;

impl CalibrationProcedure for OrpOnePoint {
    fn name(&self) -> &'static str {
        "orp-1pt"
    }

    fn metric(&self) -> Metric {
        Metric::Orp
    }

    fn last_step(&self) -> u8 {
        3
    }

    fn action(&self, step: u8) -> StepAction {
        TemperatureOffset.action(step)
    }

    fn reference_range(&self) -> Option<RangeInclusive<f64>> {
        Some(ORP_REFERENCE_RANGE)
    }

    fn raw_reading(&self, sample: &Sample) -> Option<f64> {
        sample.orp_raw
    }

    fn raw_field(&self) -> &'static str {
        "orp"
    }

    fn plan_commit(
        &self,
        step: u8,
        captured: &Captured,
        sample: Option<&Sample>,
        now: DateTime<Utc>,
    ) -> Result<CommitPlan, Rejection> {
        let reference = self.checked_reference(captured, 0)?;
        let raw = self.required_raw(step, sample)?;
        let correction = Correction::offset_only(reference, raw);

        Ok(CommitPlan::Persist {
            correction,
            points: vec![CalibrationPoint {
                measured: raw,
                reference,
            }],
            patch: orp_patch(correction, reference, now),
            optimistic: OptimisticPatch {
                metric: Metric::Orp,
                value: reference,
                raw: Some(raw),
            },
        })
    }
}

/// ORP against two reference solutions, offset and slope fitted here.
/// Steps: intro, reference 1, capture point 1, change solution,
/// reference 2, commit.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrpTwoPoint;

impl CalibrationProcedure for OrpTwoPoint {
    fn name(&self) -> &'static str {
        "orp-2pt"
    }

    fn metric(&self) -> Metric {
        Metric::Orp
    }

    fn last_step(&self) -> u8 {
        6
    }

    fn action(&self, step: u8) -> StepAction {
        match step {
            0 => StepAction::Start,
            2 => StepAction::EnterReference { slot: 0 },
            3 => StepAction::CaptureReading { slot: 0 },
            5 => StepAction::EnterReference { slot: 1 },
            6 => StepAction::Commit,
            _ => StepAction::Advance,
        }
    }

    fn reference_range(&self) -> Option<RangeInclusive<f64>> {
        Some(ORP_REFERENCE_RANGE)
    }

    fn raw_reading(&self, sample: &Sample) -> Option<f64> {
        sample.orp_raw
    }

    fn raw_field(&self) -> &'static str {
        "orp"
    }

    fn plan_commit(
        &self,
        step: u8,
        captured: &Captured,
        sample: Option<&Sample>,
        now: DateTime<Utc>,
    ) -> Result<CommitPlan, Rejection> {
        let second_reference = self.checked_reference(captured, 1)?;
        let first = match (captured.readings[0], captured.references[0]) {
            (Some(measured), Some(reference)) => CalibrationPoint {
                measured,
                reference,
            },
            _ => return Err(Rejection::at(step, ValidationError::MissingFirstPoint)),
        };
        let second = CalibrationPoint {
            measured: self.required_raw(step, sample)?,
            reference: second_reference,
        };

        let correction =
            two_point_correction(first, second).map_err(|e| Rejection::at(step, e))?;

        Ok(CommitPlan::Persist {
            correction,
            points: vec![first, second],
            patch: orp_patch(correction, second.reference, now),
            optimistic: OptimisticPatch {
                metric: Metric::Orp,
                value: second.reference,
                raw: Some(second.measured),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn sample(temperature_raw: Option<f64>, orp_raw: Option<f64>) -> Sample {
        Sample {
            timestamp: now(),
            temperature: temperature_raw,
            temperature_raw,
            ph: Some(7.2),
            orp: orp_raw,
            orp_raw,
            filtration_running: false,
            time_synced: true,
        }
    }

    #[test]
    fn test_temperature_plan_writes_offset_and_date() {
        let captured = Captured {
            references: [Some(25.0), None],
            ..Captured::default()
        };
        let plan = TemperatureOffset
            .plan_commit(3, &captured, Some(&sample(Some(23.4), None)), now())
            .unwrap();

        let CommitPlan::Persist {
            correction, patch, ..
        } = &plan
        else {
            panic!("temperature must persist a correction");
        };
        assert_relative_eq!(correction.offset, 1.6, epsilon = 0.001);
        assert_eq!(patch["temp_calibration_date"], json!("2025-06-01T12:00:00Z"));
        assert_eq!(plan.optimistic().unwrap().value, 25.0);
    }

    #[test]
    fn test_invalid_reference_rewinds_to_entry_step() {
        let captured = Captured {
            references: [Some(80.0), None],
            ..Captured::default()
        };
        let rejection = TemperatureOffset
            .plan_commit(3, &captured, Some(&sample(Some(23.4), None)), now())
            .unwrap_err();
        assert_eq!(rejection.resume_at, 2);
    }

    #[test]
    fn test_missing_raw_refuses_in_place() {
        let captured = Captured {
            references: [Some(650.0), None],
            ..Captured::default()
        };
        let rejection = OrpOnePoint
            .plan_commit(3, &captured, Some(&sample(None, None)), now())
            .unwrap_err();
        assert_eq!(rejection.resume_at, 3);
        assert_eq!(
            rejection.error,
            ValidationError::MissingRawReading { field: "orp" }
        );
    }

    #[test]
    fn test_orp_one_point_slope_is_fixed() {
        let captured = Captured {
            references: [Some(650.0), None],
            ..Captured::default()
        };
        let plan = OrpOnePoint
            .plan_commit(3, &captured, Some(&sample(None, Some(640.0))), now())
            .unwrap();
        let CommitPlan::Persist { patch, .. } = &plan else {
            panic!("orp must persist a correction");
        };
        assert_eq!(patch["orp_calibration_slope"], json!(1.0));
        assert_eq!(patch["orp_calibration_offset"], json!(10.0));
        assert_eq!(patch["orp_calibration_reference"], json!(650.0));
    }

    #[test]
    fn test_orp_two_point_regression_plan() {
        let captured = Captured {
            references: [Some(200.0), Some(600.0)],
            readings: [Some(100.0), None],
        };
        let plan = OrpTwoPoint
            .plan_commit(6, &captured, Some(&sample(None, Some(300.0))), now())
            .unwrap();
        let correction = plan.correction().unwrap();
        assert_relative_eq!(correction.slope, 2.0);
        assert_relative_eq!(correction.offset, 0.0);
        assert_eq!(plan.optimistic().unwrap().value, 600.0);
    }

    #[test]
    fn test_orp_two_point_rewinds_second_reference() {
        let captured = Captured {
            references: [Some(200.0), Some(1200.0)],
            readings: [Some(100.0), None],
        };
        let rejection = OrpTwoPoint
            .plan_commit(6, &captured, Some(&sample(None, Some(300.0))), now())
            .unwrap_err();
        assert_eq!(rejection.resume_at, 5);
    }

    #[test]
    fn test_ph_commits_are_delegated() {
        let neutral = PhTwoPoint
            .plan_commit(2, &Captured::default(), None, now())
            .unwrap();
        assert!(matches!(
            neutral,
            CommitPlan::Delegate {
                buffer: PhBuffer::Neutral,
                optimistic: None
            }
        ));

        let acid = PhTwoPoint
            .plan_commit(4, &Captured::default(), None, now())
            .unwrap();
        assert_eq!(acid.optimistic().unwrap().value, 4.0);
        assert!(acid.correction().is_none());
    }
}
