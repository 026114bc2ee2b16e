use serde::{Deserialize, Serialize};
use std::fmt;

/// 撮影方向（この順にキャプチャする）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    Front,
    Left,
    Back,
    Right,
}

impl View {
    pub const ALL: [View; 4] = [View::Front, View::Left, View::Back, View::Right];

    pub fn name(self) -> &'static str {
        match self {
            View::Front => "front",
            View::Left => "left",
            View::Back => "back",
            View::Right => "right",
        }
    }

    /// 被写体への立ち位置指示
    pub fn instruction(self) -> &'static str {
        match self {
            View::Front => "Stand facing camera, arms at sides",
            View::Left => "Turn left 90°, show left side",
            View::Back => "Turn around, show back to camera",
            View::Right => "Turn right 90°, show right side",
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
