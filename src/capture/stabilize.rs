use std::time::Duration;

use crate::config::CaptureConfig;
use crate::pose::LandmarkSet;

use super::quality::QualityReport;

/// ビューのキャプチャが中断された理由
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    #[error("cancelled")]
    Cancelled,
    #[error("timeout")]
    Timeout,
    #[error("source closed")]
    SourceClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePhase {
    Idle,
    Stabilizing,
    Capturing,
    Done,
    Aborted(AbortReason),
}

impl GatePhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, GatePhase::Done | GatePhase::Aborted(_))
    }
}

/// 1フレーム処理後のゲート状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateEvent {
    /// 安定待ち（連続有効フレーム数）
    Waiting { stable_count: usize },
    /// キャプチャ中（蓄積済みフレーム数）
    Capturing { captured: usize },
    /// キャプチャ中に姿勢が崩れてバーストを破棄した
    Restarted { discarded: usize },
    Done,
    Aborted(AbortReason),
}

/// ビュー単位の安定化ステートマシン
///
/// 連続 `stabilization_frames` フレームの有効姿勢でキャプチャを開始し、
/// 全ジョイントが揃ったフレームを `frames_per_view` 枚集めたら完了。
/// キャプチャ中に1フレームでも無効になればバースト全体を捨てて安定待ちに戻る。
pub struct StabilizationGate {
    stabilization_frames: usize,
    frames_per_view: usize,
    timeout: Duration,
    phase: GatePhase,
    stable_count: usize,
    accepted: Vec<LandmarkSet>,
    started_at_us: Option<u64>,
}

impl StabilizationGate {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            stabilization_frames: config.stabilization_frames,
            frames_per_view: config.frames_per_view,
            timeout: config.timeout(),
            phase: GatePhase::Idle,
            stable_count: 0,
            accepted: Vec::with_capacity(config.frames_per_view),
            started_at_us: None,
        }
    }

    pub fn phase(&self) -> GatePhase {
        self.phase
    }

    pub fn stable_count(&self) -> usize {
        self.stable_count
    }

    pub fn captured(&self) -> usize {
        self.accepted.len()
    }

    /// 1フレーム分の状態更新
    ///
    /// 終端状態（Done / Aborted）に達した後の呼び出しは無視される。
    /// タイムアウトはフレーム処理後に判定するので、期限ちょうどのフレームで
    /// バーストが揃えば Done になる。
    pub fn update(
        &mut self,
        timestamp_us: u64,
        landmarks: LandmarkSet,
        report: &QualityReport,
    ) -> GateEvent {
        match self.phase {
            GatePhase::Done => return GateEvent::Done,
            GatePhase::Aborted(reason) => return GateEvent::Aborted(reason),
            GatePhase::Idle => {
                self.phase = GatePhase::Stabilizing;
                self.started_at_us = Some(timestamp_us);
            }
            GatePhase::Stabilizing | GatePhase::Capturing => {}
        }

        let event = self.step(landmarks, report);
        if event == GateEvent::Done {
            return event;
        }

        let started = self.started_at_us.unwrap_or(timestamp_us);
        let elapsed = Duration::from_micros(timestamp_us.saturating_sub(started));
        if elapsed >= self.timeout {
            log::warn!("no stable capture within {:.1}s", self.timeout.as_secs_f64());
            return self.abort(AbortReason::Timeout);
        }
        event
    }

    fn step(&mut self, landmarks: LandmarkSet, report: &QualityReport) -> GateEvent {
        if !report.is_valid {
            self.stable_count = 0;
            if self.phase == GatePhase::Capturing {
                let discarded = self.accepted.len();
                self.accepted.clear();
                self.phase = GatePhase::Stabilizing;
                log::info!("pose moved, discarding {} captured frames", discarded);
                return GateEvent::Restarted { discarded };
            }
            return GateEvent::Waiting { stable_count: 0 };
        }

        self.stable_count += 1;
        if self.phase == GatePhase::Stabilizing && self.stable_count >= self.stabilization_frames {
            self.phase = GatePhase::Capturing;
            log::info!(
                "pose stable for {} frames, capturing {} frames",
                self.stable_count,
                self.frames_per_view
            );
        }

        if self.phase != GatePhase::Capturing {
            return GateEvent::Waiting {
                stable_count: self.stable_count,
            };
        }

        // 欠損ジョイントのあるフレームは数えずに読み飛ばす
        if landmarks.is_complete() {
            self.accepted.push(landmarks);
        } else {
            log::debug!("skipping partial frame ({} joints)", landmarks.present_count());
        }

        if self.accepted.len() >= self.frames_per_view {
            self.phase = GatePhase::Done;
            return GateEvent::Done;
        }
        GateEvent::Capturing {
            captured: self.accepted.len(),
        }
    }

    /// 外部からの中断（ユーザー終了など）
    pub fn cancel(&mut self) -> GateEvent {
        self.abort(AbortReason::Cancelled)
    }

    pub fn abort(&mut self, reason: AbortReason) -> GateEvent {
        match self.phase {
            GatePhase::Done => GateEvent::Done,
            GatePhase::Aborted(prev) => GateEvent::Aborted(prev),
            _ => {
                self.phase = GatePhase::Aborted(reason);
                self.accepted.clear();
                self.stable_count = 0;
                GateEvent::Aborted(reason)
            }
        }
    }

    /// 完了したバーストを取り出す（Done 以外は `None`）
    pub fn into_burst(self) -> Option<Vec<LandmarkSet>> {
        match self.phase {
            GatePhase::Done => Some(self.accepted),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::{Landmark, LandmarkIndex, LANDMARK_COUNT};

    const FRAME_US: u64 = 33_333;

    fn config(stabilization_frames: usize, frames_per_view: usize) -> CaptureConfig {
        CaptureConfig {
            stabilization_frames,
            frames_per_view,
            timeout_secs: 60.0,
            retry_count: 2,
        }
    }

    fn report(is_valid: bool) -> QualityReport {
        QualityReport {
            is_valid,
            score: if is_valid { 0.9 } else { 0.0 },
            issues: if is_valid { vec![] } else { vec!["not upright".to_string()] },
        }
    }

    fn full_set() -> LandmarkSet {
        LandmarkSet::new([Some(Landmark::new(1.0, 2.0, 3.0, 0.9)); LANDMARK_COUNT])
    }

    fn partial_set() -> LandmarkSet {
        let mut set = full_set();
        set.set(LandmarkIndex::LeftWrist, None);
        set
    }

    struct Driver {
        gate: StabilizationGate,
        frame: u64,
    }

    impl Driver {
        fn new(config: &CaptureConfig) -> Self {
            Self {
                gate: StabilizationGate::new(config),
                frame: 0,
            }
        }

        fn push(&mut self, landmarks: LandmarkSet, valid: bool) -> GateEvent {
            let ts = self.frame * FRAME_US;
            self.frame += 1;
            self.gate.update(ts, landmarks, &report(valid))
        }
    }

    #[test]
    fn test_idle_until_first_frame() {
        let mut d = Driver::new(&config(15, 30));
        assert_eq!(d.gate.phase(), GatePhase::Idle);
        assert_eq!(d.push(full_set(), true), GateEvent::Waiting { stable_count: 1 });
        assert_eq!(d.gate.phase(), GatePhase::Stabilizing);
    }

    #[test]
    fn test_interrupted_run_does_not_capture() {
        let mut d = Driver::new(&config(15, 30));
        for _ in 0..10 {
            d.push(full_set(), true);
        }
        assert_eq!(d.push(full_set(), false), GateEvent::Waiting { stable_count: 0 });
        assert_eq!(d.gate.phase(), GatePhase::Stabilizing);

        for i in 1..15 {
            assert_eq!(d.push(full_set(), true), GateEvent::Waiting { stable_count: i });
            assert_eq!(d.gate.phase(), GatePhase::Stabilizing);
        }
        // 2回目の連続 15 フレーム目でキャプチャ開始（このフレームも採用）
        assert_eq!(d.push(full_set(), true), GateEvent::Capturing { captured: 1 });
        assert_eq!(d.gate.phase(), GatePhase::Capturing);
    }

    #[test]
    fn test_invalid_frame_discards_whole_burst() {
        let mut d = Driver::new(&config(3, 30));
        for _ in 0..10 {
            d.push(full_set(), true);
        }
        assert_eq!(d.gate.captured(), 8);

        assert_eq!(d.push(full_set(), false), GateEvent::Restarted { discarded: 8 });
        assert_eq!(d.gate.captured(), 0);
        assert_eq!(d.gate.stable_count(), 0);
        assert_eq!(d.gate.phase(), GatePhase::Stabilizing);
    }

    #[test]
    fn test_partial_frames_are_skipped_not_reset() {
        let mut d = Driver::new(&config(2, 30));
        d.push(full_set(), true);
        assert_eq!(d.push(full_set(), true), GateEvent::Capturing { captured: 1 });
        assert_eq!(d.push(partial_set(), true), GateEvent::Capturing { captured: 1 });
        assert_eq!(d.push(full_set(), true), GateEvent::Capturing { captured: 2 });
        assert_eq!(d.gate.stable_count(), 4);
    }

    #[test]
    fn test_done_after_frames_per_view() {
        let mut d = Driver::new(&config(15, 30));
        let mut last = GateEvent::Waiting { stable_count: 0 };
        for _ in 0..44 {
            last = d.push(full_set(), true);
        }
        assert_eq!(last, GateEvent::Done);
        assert_eq!(d.gate.phase(), GatePhase::Done);

        // 終端後の更新は無視される
        assert_eq!(d.push(full_set(), false), GateEvent::Done);
        let burst = d.gate.into_burst().unwrap();
        assert_eq!(burst.len(), 30);
    }

    #[test]
    fn test_timeout_aborts() {
        let mut config = config(15, 30);
        config.timeout_secs = 1.0;
        let mut gate = StabilizationGate::new(&config);
        assert_eq!(
            gate.update(5_000_000, full_set(), &report(false)),
            GateEvent::Waiting { stable_count: 0 }
        );
        assert_eq!(
            gate.update(5_999_999, full_set(), &report(false)),
            GateEvent::Waiting { stable_count: 0 }
        );
        assert_eq!(
            gate.update(6_000_000, full_set(), &report(true)),
            GateEvent::Aborted(AbortReason::Timeout)
        );
        assert_eq!(gate.phase(), GatePhase::Aborted(AbortReason::Timeout));
        assert!(gate.into_burst().is_none());
    }

    #[test]
    fn test_burst_completed_at_deadline_is_done() {
        let mut config = config(2, 1);
        config.timeout_secs = 1.0;
        let mut gate = StabilizationGate::new(&config);
        assert_eq!(
            gate.update(0, full_set(), &report(true)),
            GateEvent::Waiting { stable_count: 1 }
        );
        assert_eq!(gate.update(1_000_000, full_set(), &report(true)), GateEvent::Done);
        assert_eq!(gate.into_burst().map(|b| b.len()), Some(1));
    }

    #[test]
    fn test_deadline_frame_that_does_not_finish_aborts() {
        let mut config = config(2, 2);
        config.timeout_secs = 1.0;
        let mut gate = StabilizationGate::new(&config);
        gate.update(0, full_set(), &report(true));
        assert_eq!(
            gate.update(1_000_000, full_set(), &report(true)),
            GateEvent::Aborted(AbortReason::Timeout)
        );
        assert_eq!(gate.captured(), 0);
    }

    #[test]
    fn test_cancel_during_capture() {
        let mut d = Driver::new(&config(2, 30));
        for _ in 0..5 {
            d.push(full_set(), true);
        }
        assert_eq!(d.gate.cancel(), GateEvent::Aborted(AbortReason::Cancelled));
        assert_eq!(d.gate.captured(), 0);
        assert_eq!(d.push(full_set(), true), GateEvent::Aborted(AbortReason::Cancelled));
        // 先に確定した理由は上書きされない
        assert_eq!(
            d.gate.abort(AbortReason::Timeout),
            GateEvent::Aborted(AbortReason::Cancelled)
        );
    }
}
