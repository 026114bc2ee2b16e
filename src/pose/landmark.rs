use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use super::frame::{FrameError, PoseFrame};

/// BlazePose の 33 ランドマークインデックス
///
/// 0 は頭頂（身長スケールの基準）として扱う。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(usize)]
pub enum LandmarkIndex {
    HeadTop = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

/// ランドマーク数（インデックス体系は全コンポーネントで共通）
pub const LANDMARK_COUNT: usize = 33;

impl LandmarkIndex {
    pub const COUNT: usize = LANDMARK_COUNT;

    /// 身長スケール計算に使う足の最下点
    pub const FOOT: LandmarkIndex = LandmarkIndex::LeftHeel;

    const ALL: [LandmarkIndex; LANDMARK_COUNT] = [
        Self::HeadTop,
        Self::LeftEyeInner,
        Self::LeftEye,
        Self::LeftEyeOuter,
        Self::RightEyeInner,
        Self::RightEye,
        Self::RightEyeOuter,
        Self::LeftEar,
        Self::RightEar,
        Self::MouthLeft,
        Self::MouthRight,
        Self::LeftShoulder,
        Self::RightShoulder,
        Self::LeftElbow,
        Self::RightElbow,
        Self::LeftWrist,
        Self::RightWrist,
        Self::LeftPinky,
        Self::RightPinky,
        Self::LeftIndex,
        Self::RightIndex,
        Self::LeftThumb,
        Self::RightThumb,
        Self::LeftHip,
        Self::RightHip,
        Self::LeftKnee,
        Self::RightKnee,
        Self::LeftAnkle,
        Self::RightAnkle,
        Self::LeftHeel,
        Self::RightHeel,
        Self::LeftFootIndex,
        Self::RightFootIndex,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// 単一ランドマーク
///
/// x, y はピクセル座標、z はモデル出力のままの相対奥行き。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// 可視性スコア (0.0〜1.0)
    pub confidence: f64,
}

impl Landmark {
    pub fn new(x: f64, y: f64, z: f64, confidence: f64) -> Self {
        Self { x, y, z, confidence }
    }

    /// 信頼度が閾値を超えているか
    pub fn is_visible(&self, threshold: f64) -> bool {
        self.confidence > threshold
    }

    pub fn position(&self) -> Point3<f64> {
        Point3::new(self.x, self.y, self.z)
    }
}

/// 33 ランドマークからなる1フレーム分の姿勢
///
/// 長さは型で固定されている。欠損したジョイントは `None`。
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSet {
    landmarks: [Option<Landmark>; LANDMARK_COUNT],
}

impl LandmarkSet {
    pub fn new(landmarks: [Option<Landmark>; LANDMARK_COUNT]) -> Self {
        Self { landmarks }
    }

    /// 全ジョイント欠損
    pub fn empty() -> Self {
        Self {
            landmarks: [None; LANDMARK_COUNT],
        }
    }

    /// モデル出力フレームから構築
    ///
    /// 正規化座標をピクセル座標に変換し、`visibility_threshold` 以下の
    /// ランドマークは欠損扱いにする。人物未検出のフレームは空集合になる。
    pub fn from_frame(frame: &PoseFrame, visibility_threshold: f64) -> Result<Self, FrameError> {
        let raw = match &frame.landmarks {
            Some(raw) => raw,
            None => return Ok(Self::empty()),
        };
        if raw.len() != LANDMARK_COUNT {
            return Err(FrameError::LandmarkCount {
                expected: LANDMARK_COUNT,
                got: raw.len(),
            });
        }

        let width = frame.width as f64;
        let height = frame.height as f64;
        let mut landmarks = [None; LANDMARK_COUNT];
        for (slot, candidate) in landmarks.iter_mut().zip(raw.iter().copied()) {
            *slot = candidate
                .filter(|lm| lm.confidence > visibility_threshold)
                .map(|lm| Landmark::new(lm.x * width, lm.y * height, lm.z, lm.confidence));
        }
        Ok(Self { landmarks })
    }

    pub fn get(&self, index: LandmarkIndex) -> Option<&Landmark> {
        self.landmarks[index as usize].as_ref()
    }

    /// 範囲外インデックスは `None`
    pub fn get_index(&self, index: usize) -> Option<&Landmark> {
        self.landmarks.get(index).and_then(Option::as_ref)
    }

    pub fn set(&mut self, index: LandmarkIndex, landmark: Option<Landmark>) {
        self.landmarks[index as usize] = landmark;
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<&Landmark>> {
        self.landmarks.iter().map(Option::as_ref)
    }

    pub fn len(&self) -> usize {
        LANDMARK_COUNT
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.iter().all(Option::is_none)
    }

    /// 存在するランドマーク数
    pub fn present_count(&self) -> usize {
        self.landmarks.iter().filter(|lm| lm.is_some()).count()
    }

    /// 全ジョイントが揃っているか
    pub fn is_complete(&self) -> bool {
        self.landmarks.iter().all(Option::is_some)
    }
}

impl Default for LandmarkSet {
    fn default() -> Self {
        Self::empty()
    }
}
