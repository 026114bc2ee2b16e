use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use super::frame::PoseFrame;

/// 姿勢推定フレームの供給元
///
/// カメラ + 推論モデルはこのクレートの外側にある。
/// `Ok(None)` はストリーム終端。
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<PoseFrame>>;
}

/// 記録済みフレーム列を順に再生するソース
pub struct ReplaySource {
    frames: VecDeque<PoseFrame>,
}

impl ReplaySource {
    pub fn from_frames(frames: Vec<PoseFrame>) -> Self {
        Self {
            frames: frames.into(),
        }
    }

    /// JSON 配列 `[PoseFrame, ...]` を読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read recording {}", path.display()))?;
        let frames: Vec<PoseFrame> =
            serde_json::from_str(&content).context("Failed to parse recording")?;
        Ok(Self::from_frames(frames))
    }

    /// 残りフレーム数
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for ReplaySource {
    fn next_frame(&mut self) -> Result<Option<PoseFrame>> {
        Ok(self.frames.pop_front())
    }
}
