use serde::{Deserialize, Serialize};

/// モデル出力の生ランドマーク（x, y は 0.0〜1.0 の正規化座標）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawLandmark {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub confidence: f64,
}

impl RawLandmark {
    pub fn new(x: f64, y: f64, z: f64, confidence: f64) -> Self {
        Self { x, y, z, confidence }
    }
}

/// 姿勢推定モデルから届く1フレーム
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseFrame {
    /// ストリーム先頭からのキャプチャ時刻（マイクロ秒）
    pub timestamp_us: u64,
    pub width: u32,
    pub height: u32,
    /// 人物未検出なら `None`
    #[serde(default)]
    pub landmarks: Option<Vec<Option<RawLandmark>>>,
}

impl PoseFrame {
    pub fn new(
        timestamp_us: u64,
        width: u32,
        height: u32,
        landmarks: Option<Vec<Option<RawLandmark>>>,
    ) -> Self {
        Self {
            timestamp_us,
            width,
            height,
            landmarks,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame has {got} landmarks, expected {expected}")]
    LandmarkCount { expected: usize, got: usize },
}
