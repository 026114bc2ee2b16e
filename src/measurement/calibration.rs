use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::pose::LandmarkIndex;

/// 計測項目1件分の校正値
///
/// `joints` 間の直線距離 × `ratio` を周径の推定値とする。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationEntry {
    pub name: String,
    pub joints: (LandmarkIndex, LandmarkIndex),
    /// 幅 → 周径の換算係数
    pub ratio: f64,
    /// 妥当とみなす範囲 (min, max) cm
    pub valid_range_cm: (f64, f64),
    /// 身長比の妥当範囲（体型比チェック用）
    #[serde(default)]
    pub height_ratio_range: Option<(f64, f64)>,
    /// 成人の標準値（目標値との比較用）
    #[serde(default)]
    pub standard: Option<AdultStandard>,
}

/// 成人の標準周径 (cm)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdultStandard {
    pub min_cm: f64,
    pub max_cm: f64,
    pub target_cm: f64,
}

impl CalibrationEntry {
    pub fn new(
        name: &str,
        joints: (LandmarkIndex, LandmarkIndex),
        ratio: f64,
        valid_range_cm: (f64, f64),
    ) -> Self {
        Self {
            name: name.to_string(),
            joints,
            ratio,
            valid_range_cm,
            height_ratio_range: None,
            standard: None,
        }
    }

    pub fn with_height_ratio(mut self, min: f64, max: f64) -> Self {
        self.height_ratio_range = Some((min, max));
        self
    }

    pub fn with_standard(mut self, min_cm: f64, max_cm: f64, target_cm: f64) -> Self {
        self.standard = Some(AdultStandard {
            min_cm,
            max_cm,
            target_cm,
        });
        self
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("calibration table is empty")]
    Empty,
    #[error("duplicate calibration entry '{0}'")]
    DuplicateName(String),
    #[error("calibration entry '{name}' has non-positive ratio {ratio}")]
    InvalidRatio { name: String, ratio: f64 },
    #[error("calibration entry '{name}' has invalid range ({min}, {max})")]
    InvalidRange { name: String, min: f64, max: f64 },
    #[error("calibration entry '{name}' has target {target} outside its standard range")]
    InvalidTarget { name: String, target: f64 },
}

/// 計測項目名 → 校正値の静的テーブル
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationTable {
    entries: Vec<CalibrationEntry>,
}

impl CalibrationTable {
    pub fn new(entries: Vec<CalibrationEntry>) -> Result<Self, CalibrationError> {
        if entries.is_empty() {
            return Err(CalibrationError::Empty);
        }
        let mut names = HashSet::new();
        for entry in &entries {
            if !names.insert(entry.name.as_str()) {
                return Err(CalibrationError::DuplicateName(entry.name.clone()));
            }
            if !(entry.ratio > 0.0) {
                return Err(CalibrationError::InvalidRatio {
                    name: entry.name.clone(),
                    ratio: entry.ratio,
                });
            }
            let ranges = std::iter::once(entry.valid_range_cm)
                .chain(entry.height_ratio_range)
                .chain(entry.standard.map(|s| (s.min_cm, s.max_cm)));
            for (min, max) in ranges {
                if !(min >= 0.0 && min < max) {
                    return Err(CalibrationError::InvalidRange {
                        name: entry.name.clone(),
                        min,
                        max,
                    });
                }
            }
            if let Some(standard) = entry.standard {
                if !(standard.min_cm..=standard.max_cm).contains(&standard.target_cm) {
                    return Err(CalibrationError::InvalidTarget {
                        name: entry.name.clone(),
                        target: standard.target_cm,
                    });
                }
            }
        }
        Ok(Self { entries })
    }

    /// 標準の11項目
    pub fn standard() -> Self {
        Self {
            entries: standard_entries(),
        }
    }

    pub fn entries(&self) -> &[CalibrationEntry] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&CalibrationEntry> {
        self.entries.iter().find(|e| e.name == name)
    }
}

impl Default for CalibrationTable {
    fn default() -> Self {
        Self::standard()
    }
}

/// 標準校正値
///
/// 胴回りは肩幅・腰幅から、四肢は関節間の長さから換算する。
pub fn standard_entries() -> Vec<CalibrationEntry> {
    use LandmarkIndex::*;
    vec![
        CalibrationEntry::new("chest", (LeftShoulder, RightShoulder), 1.30, (5.0, 200.0))
            .with_height_ratio(0.35, 0.50)
            .with_standard(75.0, 120.0, 95.0),
        CalibrationEntry::new("waist", (LeftHip, RightHip), 1.35, (5.0, 200.0))
            .with_height_ratio(0.25, 0.45)
            .with_standard(60.0, 110.0, 80.0),
        CalibrationEntry::new("hip", (LeftHip, RightHip), 1.35, (5.0, 200.0))
            .with_height_ratio(0.30, 0.55)
            .with_standard(85.0, 130.0, 100.0),
        CalibrationEntry::new("biceps_left", (LeftShoulder, LeftElbow), 1.20, (5.0, 100.0))
            .with_height_ratio(0.25, 0.35)
            .with_standard(22.0, 38.0, 30.0),
        CalibrationEntry::new("biceps_right", (RightShoulder, RightElbow), 1.20, (5.0, 100.0))
            .with_height_ratio(0.25, 0.35)
            .with_standard(22.0, 38.0, 30.0),
        CalibrationEntry::new("forearm_left", (LeftElbow, LeftWrist), 1.15, (5.0, 100.0))
            .with_height_ratio(0.25, 0.35),
        CalibrationEntry::new("forearm_right", (RightElbow, RightWrist), 1.15, (5.0, 100.0))
            .with_height_ratio(0.25, 0.35),
        CalibrationEntry::new("thigh_left", (LeftHip, LeftKnee), 1.20, (5.0, 150.0))
            .with_height_ratio(0.35, 0.45)
            .with_standard(40.0, 70.0, 55.0),
        CalibrationEntry::new("thigh_right", (RightHip, RightKnee), 1.20, (5.0, 150.0))
            .with_height_ratio(0.35, 0.45)
            .with_standard(40.0, 70.0, 55.0),
        CalibrationEntry::new("calf_left", (LeftKnee, LeftAnkle), 1.15, (5.0, 120.0))
            .with_height_ratio(0.20, 0.30)
            .with_standard(30.0, 45.0, 38.0),
        CalibrationEntry::new("calf_right", (RightKnee, RightAnkle), 1.15, (5.0, 120.0))
            .with_height_ratio(0.20, 0.30)
            .with_standard(30.0, 45.0, 38.0),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_table_names() {
        let table = CalibrationTable::standard();
        let names: Vec<&str> = table.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "chest",
                "waist",
                "hip",
                "biceps_left",
                "biceps_right",
                "forearm_left",
                "forearm_right",
                "thigh_left",
                "thigh_right",
                "calf_left",
                "calf_right",
            ]
        );
        // 標準テーブル自体が検証を通ること
        assert!(CalibrationTable::new(standard_entries()).is_ok());
    }

    #[test]
    fn test_get_entry() {
        let table = CalibrationTable::standard();
        let chest = table.get("chest").unwrap();
        assert_eq!(chest.joints, (LandmarkIndex::LeftShoulder, LandmarkIndex::RightShoulder));
        assert_eq!(chest.ratio, 1.30);
        assert_eq!(
            chest.standard,
            Some(AdultStandard { min_cm: 75.0, max_cm: 120.0, target_cm: 95.0 })
        );
        // 前腕には成人標準がない
        assert!(table.get("forearm_left").unwrap().standard.is_none());
        assert!(table.get("neck").is_none());
    }

    #[test]
    fn test_rejects_invalid_tables() {
        assert_eq!(CalibrationTable::new(vec![]), Err(CalibrationError::Empty));

        let pair = (LandmarkIndex::LeftHip, LandmarkIndex::RightHip);
        let dup = vec![
            CalibrationEntry::new("waist", pair, 1.35, (5.0, 200.0)),
            CalibrationEntry::new("waist", pair, 1.35, (5.0, 200.0)),
        ];
        assert_eq!(
            CalibrationTable::new(dup),
            Err(CalibrationError::DuplicateName("waist".to_string()))
        );

        let zero = vec![CalibrationEntry::new("waist", pair, 0.0, (5.0, 200.0))];
        assert!(matches!(
            CalibrationTable::new(zero),
            Err(CalibrationError::InvalidRatio { .. })
        ));

        let off_target =
            vec![CalibrationEntry::new("waist", pair, 1.35, (5.0, 200.0)).with_standard(60.0, 110.0, 150.0)];
        assert!(matches!(
            CalibrationTable::new(off_target),
            Err(CalibrationError::InvalidTarget { .. })
        ));

        let inverted = vec![CalibrationEntry::new("waist", pair, 1.35, (200.0, 5.0))];
        assert!(matches!(
            CalibrationTable::new(inverted),
            Err(CalibrationError::InvalidRange { .. })
        ));
    }
}
