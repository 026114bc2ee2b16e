use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::calibration::{AdultStandard, CalibrationTable};
use super::engine::{round2, MeasurementSet};

/// 目標値からこの差 (cm) 未満なら ideal
const IDEAL_TOLERANCE_CM: f64 = 5.0;

/// 妥当性チェックの注記（値は削除しない）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationFlag {
    /// 項目ごとの cm 範囲外
    OutOfRange { min_cm: f64, max_cm: f64 },
    /// 身長比が体型として不自然
    HeightRatio { ratio: f64, min: f64, max: f64 },
}

/// 成人標準との比較結果
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StandardStatus {
    TooSmall { min_cm: f64 },
    TooLarge { max_cm: f64 },
    Ideal { diff_from_target: f64 },
    AboveTarget { diff_from_target: f64 },
    BelowTarget { diff_from_target: f64 },
}

impl StandardStatus {
    pub fn classify(value_cm: f64, standard: &AdultStandard) -> Self {
        if value_cm < standard.min_cm {
            return StandardStatus::TooSmall {
                min_cm: standard.min_cm,
            };
        }
        if value_cm > standard.max_cm {
            return StandardStatus::TooLarge {
                max_cm: standard.max_cm,
            };
        }
        let diff = value_cm - standard.target_cm;
        let diff_from_target = round2(diff);
        if diff.abs() < IDEAL_TOLERANCE_CM {
            StandardStatus::Ideal { diff_from_target }
        } else if diff > 0.0 {
            StandardStatus::AboveTarget { diff_from_target }
        } else {
            StandardStatus::BelowTarget { diff_from_target }
        }
    }

    /// 標準範囲内か
    pub fn within_standard(&self) -> bool {
        !matches!(self, StandardStatus::TooSmall { .. } | StandardStatus::TooLarge { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedMeasurement {
    pub name: String,
    pub value_cm: f64,
    pub flags: Vec<ValidationFlag>,
    /// 標準が無い項目、またはスケールが信頼できない場合は `None`
    pub standard: Option<StandardStatus>,
}

impl ValidatedMeasurement {
    pub fn is_plausible(&self) -> bool {
        self.flags.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub measurements: Vec<ValidatedMeasurement>,
    /// false ならスケールが身長から求まらず生単位のまま
    pub scale_reliable: bool,
}

impl ValidationReport {
    pub fn get(&self, name: &str) -> Option<&ValidatedMeasurement> {
        self.measurements.iter().find(|m| m.name == name)
    }

    pub fn flagged(&self) -> impl Iterator<Item = &ValidatedMeasurement> {
        self.measurements.iter().filter(|m| !m.is_plausible())
    }

    pub fn is_clean(&self) -> bool {
        self.scale_reliable && self.flagged().next().is_none()
    }
}

/// 計測値の妥当性チェック
pub struct MeasurementValidator {
    bounds: BTreeMap<String, (f64, f64)>,
    height_ratios: BTreeMap<String, (f64, f64)>,
    standards: BTreeMap<String, AdultStandard>,
    ratio_checks: bool,
}

impl MeasurementValidator {
    pub fn new(table: &CalibrationTable, ratio_checks: bool) -> Self {
        let bounds = table
            .entries()
            .iter()
            .map(|e| (e.name.clone(), e.valid_range_cm))
            .collect();
        let height_ratios = table
            .entries()
            .iter()
            .filter_map(|e| e.height_ratio_range.map(|r| (e.name.clone(), r)))
            .collect();
        let standards = table
            .entries()
            .iter()
            .filter_map(|e| e.standard.map(|s| (e.name.clone(), s)))
            .collect();
        Self {
            bounds,
            height_ratios,
            standards,
            ratio_checks,
        }
    }

    /// 全項目に注記を付ける。範囲外でも値はそのまま残す。
    ///
    /// スケールが信頼できない（生単位の）ときは身長比と成人標準の比較を行わない。
    pub fn validate(&self, set: &MeasurementSet) -> ValidationReport {
        let in_cm = set.scale.reliable;
        let measurements = set
            .values()
            .iter()
            .map(|(name, &value)| {
                let mut flags = Vec::new();
                if let Some(&(min_cm, max_cm)) = self.bounds.get(name) {
                    if value < min_cm || value > max_cm {
                        flags.push(ValidationFlag::OutOfRange { min_cm, max_cm });
                    }
                }
                if self.ratio_checks && in_cm {
                    if let Some(&(min, max)) = self.height_ratios.get(name) {
                        let ratio = value / set.height_cm;
                        if ratio < min || ratio > max {
                            flags.push(ValidationFlag::HeightRatio { ratio, min, max });
                        }
                    }
                }
                if !flags.is_empty() {
                    log::warn!("{} = {:.2} cm flagged as implausible", name, value);
                }
                let standard = self
                    .standards
                    .get(name)
                    .filter(|_| in_cm)
                    .map(|s| StandardStatus::classify(value, s));
                ValidatedMeasurement {
                    name: name.clone(),
                    value_cm: value,
                    flags,
                    standard,
                }
            })
            .collect();

        ValidationReport {
            measurements,
            scale_reliable: set.scale.reliable,
        }
    }
}
