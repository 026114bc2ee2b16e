use crate::pose::{Landmark, LandmarkSet, LANDMARK_COUNT};

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AverageError {
    #[error("cannot average an empty burst")]
    EmptyBurst,
}

/// バースト内のフレームをジョイントごとに平均する
///
/// 各ジョイントは存在するフレームだけで平均するため、
/// ジョイントによって元になるフレーム数が異なりうる。
pub fn average_burst(frames: &[LandmarkSet]) -> Result<LandmarkSet, AverageError> {
    if frames.is_empty() {
        return Err(AverageError::EmptyBurst);
    }

    let mut averaged = [None; LANDMARK_COUNT];
    for (idx, slot) in averaged.iter_mut().enumerate() {
        let mut sum = [0.0f64; 4];
        let mut count = 0usize;
        for lm in frames.iter().filter_map(|f| f.get_index(idx)) {
            sum[0] += lm.x;
            sum[1] += lm.y;
            sum[2] += lm.z;
            sum[3] += lm.confidence;
            count += 1;
        }
        if count > 0 {
            let n = count as f64;
            *slot = Some(Landmark::new(sum[0] / n, sum[1] / n, sum[2] / n, sum[3] / n));
        }
    }

    Ok(LandmarkSet::new(averaged))
}
