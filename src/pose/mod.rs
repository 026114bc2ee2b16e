pub mod frame;
pub mod landmark;
pub mod source;

pub use frame::{FrameError, PoseFrame, RawLandmark};
pub use landmark::{Landmark, LandmarkIndex, LandmarkSet, LANDMARK_COUNT};
pub use source::{FrameSource, ReplaySource};
