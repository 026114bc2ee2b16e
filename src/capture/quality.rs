use crate::config::{GuidelineConfig, PoseConfig};
use crate::pose::{Landmark, LandmarkIndex, LandmarkSet};

/// 1フレーム分の姿勢品質評価
#[derive(Debug, Clone, PartialEq)]
pub struct QualityReport {
    pub is_valid: bool,
    /// 可視ジョイントの平均信頼度 (0.0〜1.0)
    pub score: f64,
    pub issues: Vec<String>,
}

impl QualityReport {
    fn rejected(issue: String) -> Self {
        Self {
            is_valid: false,
            score: 0.0,
            issues: vec![issue],
        }
    }
}

/// 姿勢品質の判定器
///
/// 内部状態を持たない。同じ入力には常に同じ結果を返す。
#[derive(Debug, Clone)]
pub struct QualityAssessor {
    visibility_threshold: f64,
    min_joints_visible: usize,
    min_quality_score: f64,
    guidelines: GuidelineConfig,
}

impl QualityAssessor {
    pub fn new(pose: &PoseConfig, guidelines: &GuidelineConfig) -> Self {
        Self {
            visibility_threshold: pose.visibility_threshold,
            min_joints_visible: pose.min_joints_visible,
            min_quality_score: pose.min_quality_score,
            guidelines: guidelines.clone(),
        }
    }

    /// `width`, `height` はフレームのピクセルサイズ
    pub fn assess(&self, landmarks: &LandmarkSet, width: u32, _height: u32) -> QualityReport {
        let visible: Vec<f64> = landmarks
            .iter()
            .flatten()
            .filter(|lm| lm.is_visible(self.visibility_threshold))
            .map(|lm| lm.confidence)
            .collect();

        if visible.len() < self.min_joints_visible {
            return QualityReport::rejected(format!(
                "insufficient joints: {}/{}",
                visible.len(),
                self.min_joints_visible
            ));
        }

        let mut issues = Vec::new();
        let g = &self.guidelines;
        // ガイドラインの帯はフレーム幅に収める
        let within_band = |x: f64, min: f64, max: f64| x >= min.max(0.0) && x <= max.min(width as f64);

        if g.centered_enabled {
            if let Some(head) = self.visible(landmarks, LandmarkIndex::HeadTop) {
                if !within_band(head.x, g.center_min_x, g.center_max_x) {
                    issues.push("not centered".to_string());
                }
            }
        }

        // 左側の肩〜腰のみで判定
        if g.upright_enabled {
            if let (Some(shoulder), Some(hip)) = (
                self.visible(landmarks, LandmarkIndex::LeftShoulder),
                self.visible(landmarks, LandmarkIndex::LeftHip),
            ) {
                if (shoulder.y - hip.y).abs() < g.min_torso_length {
                    issues.push("not upright".to_string());
                }
            }
        }

        if g.arms_at_sides_enabled {
            let wrists = [LandmarkIndex::LeftWrist, LandmarkIndex::RightWrist];
            let spread = wrists
                .into_iter()
                .filter_map(|idx| self.visible(landmarks, idx))
                .any(|wrist| !within_band(wrist.x, g.arms_min_x, g.arms_max_x));
            if spread {
                issues.push("arms not at sides".to_string());
            }
        }

        let score = if visible.is_empty() {
            0.0
        } else {
            visible.iter().sum::<f64>() / visible.len() as f64
        };

        QualityReport {
            is_valid: issues.is_empty() && score > self.min_quality_score,
            score,
            issues,
        }
    }

    fn visible<'a>(&self, landmarks: &'a LandmarkSet, index: LandmarkIndex) -> Option<&'a Landmark> {
        landmarks
            .get(index)
            .filter(|lm| lm.is_visible(self.visibility_threshold))
    }
}
