use nalgebra::{Point3, Vector3};
use std::collections::BTreeMap;

use crate::pose::{LandmarkIndex, LandmarkSet, LANDMARK_COUNT};
use crate::view::View;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CombineError {
    #[error("{0} view is missing")]
    MissingView(View),
    #[error("required joint {0:?} is missing in all four views")]
    RequiredJointMissing(LandmarkIndex),
}

/// 4ビュー合成後の3Dランドマーク（信頼度は持たない）
#[derive(Debug, Clone, PartialEq)]
pub struct Skeleton3d {
    points: [Option<Point3<f64>>; LANDMARK_COUNT],
}

impl Skeleton3d {
    pub fn new(points: [Option<Point3<f64>>; LANDMARK_COUNT]) -> Self {
        Self { points }
    }

    pub fn get(&self, index: LandmarkIndex) -> Option<&Point3<f64>> {
        self.points[index as usize].as_ref()
    }

    pub fn set(&mut self, index: LandmarkIndex, point: Option<Point3<f64>>) {
        self.points[index as usize] = point;
    }

    /// 2ジョイント間のユークリッド距離（どちらか欠損なら `None`）
    pub fn distance(&self, a: LandmarkIndex, b: LandmarkIndex) -> Option<f64> {
        match (self.get(a), self.get(b)) {
            (Some(pa), Some(pb)) => Some(nalgebra::distance(pa, pb)),
            _ => None,
        }
    }

    pub fn present_count(&self) -> usize {
        self.points.iter().filter(|p| p.is_some()).count()
    }
}

impl Default for Skeleton3d {
    fn default() -> Self {
        Self {
            points: [None; LANDMARK_COUNT],
        }
    }
}

/// 4方向の平均ランドマークを1つの3Dランドマークに合成
///
/// 幾何学的な三角測量ではなく、4ビューすべてに存在するジョイントの
/// 座標を単純平均する。カメラ外部パラメータは使わないため、
/// 各ビューの座標系がほぼ一致している前提での近似になる。
///
/// - いずれかのビューが無ければ失敗
/// - 1ビューでも欠損しているジョイントは合成結果でも欠損
/// - `required` のジョイントが全ビューで欠損していれば失敗
pub fn combine_views(
    views: &BTreeMap<View, LandmarkSet>,
    required: &[LandmarkIndex],
) -> Result<Skeleton3d, CombineError> {
    let mut sets = Vec::with_capacity(View::ALL.len());
    for view in View::ALL {
        let set = views.get(&view).ok_or(CombineError::MissingView(view))?;
        sets.push(set);
    }

    for &joint in required {
        if sets.iter().all(|set| set.get(joint).is_none()) {
            return Err(CombineError::RequiredJointMissing(joint));
        }
    }

    let mut points = [None; LANDMARK_COUNT];
    for (idx, slot) in points.iter_mut().enumerate() {
        let observed: Option<Vec<_>> = sets.iter().map(|set| set.get_index(idx)).collect();
        if let Some(observed) = observed {
            let n = observed.len() as f64;
            let sum: Vector3<f64> = observed.iter().map(|lm| lm.position().coords).sum();
            *slot = Some(Point3::from(sum / n));
        }
    }

    let skeleton = Skeleton3d::new(points);
    log::debug!(
        "combined {} of {} joints from {} views",
        skeleton.present_count(),
        LANDMARK_COUNT,
        sets.len()
    );
    Ok(skeleton)
}
