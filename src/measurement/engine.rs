use serde::Serialize;
use std::collections::BTreeMap;

use crate::pose::LandmarkIndex;
use crate::triangulation::Skeleton3d;

use super::calibration::CalibrationTable;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum MeasureError {
    #[error("user height must be positive, got {0} cm")]
    InvalidHeight(f64),
    #[error("no measurement could be computed")]
    NoMeasurements,
}

/// 生座標 → cm の換算係数
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Scale {
    pub factor: f64,
    /// 身長から求めたか（false なら 1.0 にフォールバックした生単位）
    pub reliable: bool,
}

/// 周径の計測結果（項目名 → cm）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementSet {
    values: BTreeMap<String, f64>,
    pub height_cm: f64,
    pub scale: Scale,
}

impl MeasurementSet {
    pub fn new(values: BTreeMap<String, f64>, height_cm: f64, scale: Scale) -> Self {
        Self {
            values,
            height_cm,
            scale,
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn values(&self) -> &BTreeMap<String, f64> {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// 3Dランドマーク間距離から周径を推定する
pub struct MeasurementEngine {
    table: CalibrationTable,
}

impl MeasurementEngine {
    pub fn new(table: CalibrationTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &CalibrationTable {
        &self.table
    }

    /// 頭頂〜足の距離と身長からスケールを求める
    ///
    /// どちらかが欠損、または距離が 0 なら係数 1.0（信頼できない）を返す。
    pub fn scale_factor(&self, skeleton: &Skeleton3d, height_cm: f64) -> Scale {
        match skeleton.distance(LandmarkIndex::HeadTop, LandmarkIndex::FOOT) {
            Some(d) if d > 0.0 => Scale {
                factor: height_cm / d,
                reliable: true,
            },
            _ => Scale {
                factor: 1.0,
                reliable: false,
            },
        }
    }

    pub fn measure(&self, skeleton: &Skeleton3d, height_cm: f64) -> Result<MeasurementSet, MeasureError> {
        if !(height_cm > 0.0) || !height_cm.is_finite() {
            return Err(MeasureError::InvalidHeight(height_cm));
        }

        let scale = self.scale_factor(skeleton, height_cm);
        if !scale.reliable {
            log::warn!("head-top or foot landmark unavailable, measurements are in raw units");
        }

        let mut values = BTreeMap::new();
        for entry in self.table.entries() {
            let (a, b) = entry.joints;
            match skeleton.distance(a, b) {
                Some(width) => {
                    let circumference = round2(width * entry.ratio * scale.factor);
                    values.insert(entry.name.clone(), circumference);
                }
                None => log::debug!("{}: {:?} or {:?} missing, skipped", entry.name, a, b),
            }
        }

        if values.is_empty() {
            return Err(MeasureError::NoMeasurements);
        }
        Ok(MeasurementSet::new(values, height_cm, scale))
    }
}

impl Default for MeasurementEngine {
    fn default() -> Self {
        Self::new(CalibrationTable::standard())
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    /// 頭頂 (0,0,0)・足 (0,d,0)、肩 ±20
    fn skeleton(height_units: f64) -> Skeleton3d {
        let mut s = Skeleton3d::default();
        s.set(LandmarkIndex::HeadTop, Some(Point3::new(0.0, 0.0, 0.0)));
        s.set(LandmarkIndex::FOOT, Some(Point3::new(0.0, height_units, 0.0)));
        s.set(LandmarkIndex::LeftShoulder, Some(Point3::new(-20.0, 30.0, 0.0)));
        s.set(LandmarkIndex::RightShoulder, Some(Point3::new(20.0, 30.0, 0.0)));
        s
    }

    #[test]
    fn test_chest_at_unit_scale() {
        let engine = MeasurementEngine::default();
        let result = engine.measure(&skeleton(170.0), 170.0).unwrap();
        assert_eq!(result.scale, Scale { factor: 1.0, reliable: true });
        assert_eq!(result.get("chest"), Some(52.0));
        assert_eq!(result.height_cm, 170.0);
    }

    #[test]
    fn test_scaled_measurement() {
        let engine = MeasurementEngine::default();
        let result = engine.measure(&skeleton(170.0), 180.0).unwrap();
        assert_relative_eq!(result.scale.factor, 180.0 / 170.0);
        let expected = (40.0 * 1.30 * 180.0 / 170.0 * 100.0_f64).round() / 100.0;
        assert_eq!(result.get("chest"), Some(expected));
        assert_eq!(result.get("chest"), Some(55.06));
    }

    #[test]
    fn test_absent_joint_omits_key() {
        let engine = MeasurementEngine::default();
        let result = engine.measure(&skeleton(170.0), 170.0).unwrap();
        // 肩以外のジョイントが無いので chest 以外は出力されない
        assert_eq!(result.len(), 1);
        assert!(result.get("waist").is_none());
        assert!(!result.values().contains_key("biceps_left"));
    }

    #[test]
    fn test_fallback_scale_without_foot() {
        let engine = MeasurementEngine::default();
        let mut s = skeleton(170.0);
        s.set(LandmarkIndex::FOOT, None);
        let result = engine.measure(&s, 170.0).unwrap();
        assert_eq!(result.scale, Scale { factor: 1.0, reliable: false });
        assert_eq!(result.get("chest"), Some(52.0));
    }

    #[test]
    fn test_fallback_scale_for_zero_distance() {
        let engine = MeasurementEngine::default();
        let s = skeleton(0.0);
        let scale = engine.scale_factor(&s, 170.0);
        assert!(!scale.reliable);
        assert_eq!(scale.factor, 1.0);
    }

    #[test]
    fn test_no_measurements() {
        let engine = MeasurementEngine::default();
        let mut s = Skeleton3d::default();
        s.set(LandmarkIndex::HeadTop, Some(Point3::new(0.0, 0.0, 0.0)));
        assert_eq!(engine.measure(&s, 170.0), Err(MeasureError::NoMeasurements));
    }

    #[test]
    fn test_invalid_height() {
        let engine = MeasurementEngine::default();
        assert_eq!(
            engine.measure(&skeleton(170.0), 0.0),
            Err(MeasureError::InvalidHeight(0.0))
        );
    }
}
