use anyhow::{bail, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::measurement::calibration::{standard_entries, CalibrationEntry, CalibrationTable};
use crate::pose::LandmarkIndex;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pose: PoseConfig,
    #[serde(default)]
    pub guidelines: GuidelineConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub combine: CombineConfig,
    #[serde(default)]
    pub measurement: MeasurementConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoseConfig {
    /// ジョイント可視性の閾値（これを超えたものだけ採用）
    #[serde(default = "default_visibility_threshold")]
    pub visibility_threshold: f64,
    /// 必要な可視ジョイント数（33 点中）
    #[serde(default = "default_min_joints_visible")]
    pub min_joints_visible: usize,
    /// 平均信頼度の下限
    #[serde(default = "default_min_quality_score")]
    pub min_quality_score: f64,
}

fn default_visibility_threshold() -> f64 { 0.75 }
fn default_min_joints_visible() -> usize { 28 }
fn default_min_quality_score() -> f64 { 0.70 }

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            visibility_threshold: default_visibility_threshold(),
            min_joints_visible: default_min_joints_visible(),
            min_quality_score: default_min_quality_score(),
        }
    }
}

/// 立ち位置ガイドライン（ピクセル単位、640x480 基準）
///
/// 各チェックは `*_enabled` で個別に無効化できる。
#[derive(Debug, Clone, Deserialize)]
pub struct GuidelineConfig {
    #[serde(default = "default_enabled")]
    pub centered_enabled: bool,
    /// 頭頂 X の許容範囲
    #[serde(default = "default_center_min_x")]
    pub center_min_x: f64,
    #[serde(default = "default_center_max_x")]
    pub center_max_x: f64,
    #[serde(default = "default_enabled")]
    pub upright_enabled: bool,
    /// 肩〜腰の最小縦距離
    #[serde(default = "default_min_torso_length")]
    pub min_torso_length: f64,
    #[serde(default = "default_enabled")]
    pub arms_at_sides_enabled: bool,
    /// 両手首 X の許容範囲
    #[serde(default = "default_arms_min_x")]
    pub arms_min_x: f64,
    #[serde(default = "default_arms_max_x")]
    pub arms_max_x: f64,
}

fn default_enabled() -> bool { true }
fn default_center_min_x() -> f64 { 100.0 }
fn default_center_max_x() -> f64 { 540.0 }
fn default_min_torso_length() -> f64 { 50.0 }
fn default_arms_min_x() -> f64 { 150.0 }
fn default_arms_max_x() -> f64 { 490.0 }

impl Default for GuidelineConfig {
    fn default() -> Self {
        Self {
            centered_enabled: default_enabled(),
            center_min_x: default_center_min_x(),
            center_max_x: default_center_max_x(),
            upright_enabled: default_enabled(),
            min_torso_length: default_min_torso_length(),
            arms_at_sides_enabled: default_enabled(),
            arms_min_x: default_arms_min_x(),
            arms_max_x: default_arms_max_x(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    /// キャプチャ開始までに必要な連続有効フレーム数（30fps で 0.5 秒）
    #[serde(default = "default_stabilization_frames")]
    pub stabilization_frames: usize,
    /// 1ビューあたりの平均化フレーム数
    #[serde(default = "default_frames_per_view")]
    pub frames_per_view: usize,
    /// 1ビューのタイムアウト（秒）
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,
    /// タイムアウト時の再試行回数
    #[serde(default = "default_retry_count")]
    pub retry_count: usize,
}

fn default_stabilization_frames() -> usize { 15 }
fn default_frames_per_view() -> usize { 30 }
fn default_timeout_secs() -> f64 { 60.0 }
fn default_retry_count() -> usize { 2 }

impl CaptureConfig {
    /// 表現できない値は 0（負・NaN）か `Duration::MAX`（巨大値）に丸める
    pub fn timeout(&self) -> Duration {
        match Duration::try_from_secs_f64(self.timeout_secs) {
            Ok(timeout) => timeout,
            Err(_) if self.timeout_secs > 0.0 => Duration::MAX,
            Err(_) => Duration::ZERO,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            stabilization_frames: default_stabilization_frames(),
            frames_per_view: default_frames_per_view(),
            timeout_secs: default_timeout_secs(),
            retry_count: default_retry_count(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CombineConfig {
    /// 4 ビューすべてで欠損していたら合成失敗とするジョイント
    #[serde(default = "default_required_joints")]
    pub required_joints: Vec<LandmarkIndex>,
}

fn default_required_joints() -> Vec<LandmarkIndex> {
    vec![
        LandmarkIndex::LeftShoulder,
        LandmarkIndex::RightShoulder,
        LandmarkIndex::LeftHip,
        LandmarkIndex::RightHip,
    ]
}

impl Default for CombineConfig {
    fn default() -> Self {
        Self {
            required_joints: default_required_joints(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MeasurementConfig {
    #[serde(default = "standard_entries")]
    pub entries: Vec<CalibrationEntry>,
    /// 身長比による体型チェック
    #[serde(default)]
    pub ratio_checks: bool,
}

impl MeasurementConfig {
    pub fn table(&self) -> Result<CalibrationTable> {
        Ok(CalibrationTable::new(self.entries.clone())?)
    }
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            entries: standard_entries(),
            ratio_checks: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// 計測結果 JSON の保存先
    #[serde(default = "default_output_directory")]
    pub directory: String,
}

fn default_output_directory() -> String { "./measurements".to_string() }

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// 読み込みに失敗したらデフォルト設定
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("config {} not used ({}), falling back to defaults", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let pose = &self.pose;
        if !(0.0..=1.0).contains(&pose.visibility_threshold) {
            bail!("pose.visibility_threshold must be in [0, 1]");
        }
        if !(0.0..=1.0).contains(&pose.min_quality_score) {
            bail!("pose.min_quality_score must be in [0, 1]");
        }
        if pose.min_joints_visible > LandmarkIndex::COUNT {
            bail!(
                "pose.min_joints_visible ({}) exceeds landmark count ({})",
                pose.min_joints_visible,
                LandmarkIndex::COUNT
            );
        }
        if self.guidelines.center_min_x >= self.guidelines.center_max_x {
            bail!("guidelines.center_min_x must be less than center_max_x");
        }
        if self.guidelines.arms_min_x >= self.guidelines.arms_max_x {
            bail!("guidelines.arms_min_x must be less than arms_max_x");
        }
        let capture = &self.capture;
        if capture.stabilization_frames == 0 || capture.frames_per_view == 0 {
            bail!("capture.stabilization_frames and capture.frames_per_view must be positive");
        }
        if !(capture.timeout_secs > 0.0) || Duration::try_from_secs_f64(capture.timeout_secs).is_err() {
            bail!("capture.timeout_secs must be a positive number of seconds");
        }
        self.measurement.table()?;
        Ok(())
    }
}
