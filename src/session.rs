use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::capture::{
    average_burst, AbortReason, AverageError, GateEvent, GatePhase, QualityAssessor,
    StabilizationGate,
};
use crate::config::Config;
use crate::measurement::{
    CalibrationError, CalibrationTable, MeasureError, MeasurementEngine, MeasurementSet,
    MeasurementValidator, ValidationReport,
};
use crate::pose::{FrameSource, LandmarkSet};
use crate::record::MeasurementRecord;
use crate::triangulation::{combine_views, CombineError, Skeleton3d};
use crate::view::View;

/// 協調的キャンセル用フラグ（フレームごとに確認される）
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("invalid configuration: {0:#}")]
    Config(anyhow::Error),
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
    #[error("user height must be positive, got {0} cm")]
    InvalidHeight(f64),
    #[error("session cancelled")]
    Cancelled,
    #[error("{view} view failed after {attempts} attempt(s): {reason}")]
    ViewFailed {
        view: View,
        reason: AbortReason,
        attempts: usize,
    },
    #[error("frame source failed: {0:#}")]
    Source(anyhow::Error),
    #[error(transparent)]
    Average(#[from] AverageError),
    #[error(transparent)]
    Combine(#[from] CombineError),
    #[error(transparent)]
    Measure(#[from] MeasureError),
}

/// 1セッション分の結果
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    /// ビューごとの平均ランドマーク
    pub views: BTreeMap<View, LandmarkSet>,
    pub skeleton: Skeleton3d,
    pub measurements: MeasurementSet,
    pub report: ValidationReport,
}

impl SessionOutcome {
    pub fn to_record(&self) -> MeasurementRecord {
        MeasurementRecord::new(&self.measurements, &self.report)
    }
}

enum Attempt {
    Captured(Vec<LandmarkSet>),
    Aborted(AbortReason),
}

/// 4方向キャプチャ → 平均 → 合成 → 計測 → 妥当性チェック
pub struct MeasurementSession {
    config: Config,
    assessor: QualityAssessor,
    engine: MeasurementEngine,
    validator: MeasurementValidator,
    cancel: CancelToken,
}

impl MeasurementSession {
    /// 設定を検証してから構築する
    pub fn new(config: Config) -> Result<Self, SessionError> {
        config.validate().map_err(SessionError::Config)?;
        let table = CalibrationTable::new(config.measurement.entries.clone())?;
        let validator = MeasurementValidator::new(&table, config.measurement.ratio_checks);
        Ok(Self {
            assessor: QualityAssessor::new(&config.pose, &config.guidelines),
            engine: MeasurementEngine::new(table),
            validator,
            cancel: CancelToken::new(),
            config,
        })
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn run<S: FrameSource + ?Sized>(
        &self,
        source: &mut S,
        height_cm: f64,
    ) -> Result<SessionOutcome, SessionError> {
        if !(height_cm > 0.0) || !height_cm.is_finite() {
            return Err(SessionError::InvalidHeight(height_cm));
        }

        let mut views = BTreeMap::new();
        for view in View::ALL {
            log::info!("{}: {}", view, view.instruction());
            let averaged = self.capture_view(source, view)?;
            log::info!("{} view captured ({} joints)", view, averaged.present_count());
            views.insert(view, averaged);
        }

        let skeleton = combine_views(&views, &self.config.combine.required_joints)?;
        let measurements = self.engine.measure(&skeleton, height_cm)?;
        let report = self.validator.validate(&measurements);
        log::info!(
            "measured {} values, {} flagged",
            measurements.len(),
            report.flagged().count()
        );

        Ok(SessionOutcome {
            views,
            skeleton,
            measurements,
            report,
        })
    }

    /// タイムアウトのみ `retry_count` 回まで撮り直す
    fn capture_view<S: FrameSource + ?Sized>(
        &self,
        source: &mut S,
        view: View,
    ) -> Result<LandmarkSet, SessionError> {
        let max_attempts = self.config.capture.retry_count + 1;
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.capture_attempt(source)? {
                Attempt::Captured(burst) => return Ok(average_burst(&burst)?),
                Attempt::Aborted(AbortReason::Cancelled) => {
                    log::info!("{} view cancelled", view);
                    return Err(SessionError::Cancelled);
                }
                Attempt::Aborted(AbortReason::Timeout) if attempts < max_attempts => {
                    log::warn!("{} view timed out, retrying ({}/{})", view, attempts, max_attempts);
                }
                Attempt::Aborted(reason) => {
                    return Err(SessionError::ViewFailed {
                        view,
                        reason,
                        attempts,
                    })
                }
            }
        }
    }

    fn capture_attempt<S: FrameSource + ?Sized>(&self, source: &mut S) -> Result<Attempt, SessionError> {
        let threshold = self.config.pose.visibility_threshold;
        let mut gate = StabilizationGate::new(&self.config.capture);

        while !gate.phase().is_terminal() {
            if self.cancel.is_cancelled() {
                gate.cancel();
                break;
            }
            let frame = match source.next_frame().map_err(SessionError::Source)? {
                Some(frame) => frame,
                None => {
                    gate.abort(AbortReason::SourceClosed);
                    break;
                }
            };

            // 壊れたフレームは人物なしと同じく無効フレームとして扱う
            let landmarks = match LandmarkSet::from_frame(&frame, threshold) {
                Ok(landmarks) => landmarks,
                Err(e) => {
                    log::warn!("ignoring malformed frame at {} us: {}", frame.timestamp_us, e);
                    LandmarkSet::empty()
                }
            };
            let report = self.assessor.assess(&landmarks, frame.width, frame.height);
            match gate.update(frame.timestamp_us, landmarks, &report) {
                GateEvent::Waiting { stable_count } if stable_count == 0 => {
                    log::debug!("waiting for stable pose: {}", report.issues.join(", "));
                }
                GateEvent::Restarted { discarded } => {
                    log::debug!("burst restarted after {} frames", discarded);
                }
                event => log::trace!("{:?}", event),
            }
        }

        Ok(match gate.phase() {
            GatePhase::Aborted(reason) => Attempt::Aborted(reason),
            _ => Attempt::Captured(gate.into_burst().unwrap_or_default()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::{PoseFrame, ReplaySource};

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_invalid_height_consumes_nothing() {
        let session = MeasurementSession::new(Config::default()).unwrap();
        let mut source = ReplaySource::from_frames(vec![PoseFrame::new(0, 640, 480, None)]);
        assert!(matches!(
            session.run(&mut source, -5.0),
            Err(SessionError::InvalidHeight(h)) if h == -5.0
        ));
        assert_eq!(source.remaining(), 1);
    }

    #[test]
    fn test_cancelled_before_start() {
        let session = MeasurementSession::new(Config::default()).unwrap();
        session.cancel_token().cancel();
        let mut source = ReplaySource::from_frames(vec![PoseFrame::new(0, 640, 480, None)]);
        assert!(matches!(session.run(&mut source, 170.0), Err(SessionError::Cancelled)));
        assert_eq!(source.remaining(), 1);
    }

    #[test]
    fn test_source_closed_is_not_retried() {
        let session = MeasurementSession::new(Config::default()).unwrap();
        let frames = (0..5).map(|i| PoseFrame::new(i * 33_333, 640, 480, None)).collect();
        let mut source = ReplaySource::from_frames(frames);
        match session.run(&mut source, 170.0) {
            Err(SessionError::ViewFailed { view, reason, attempts }) => {
                assert_eq!(view, View::Front);
                assert_eq!(reason, AbortReason::SourceClosed);
                assert_eq!(attempts, 1);
            }
            other => panic!("unexpected result: {:?}", other.map(|o| o.measurements)),
        }
    }

    #[test]
    fn test_malformed_frame_does_not_end_session() {
        let session = MeasurementSession::new(Config::default()).unwrap();
        let mut source = ReplaySource::from_frames(vec![
            PoseFrame::new(0, 640, 480, Some(vec![None; 17])),
            PoseFrame::new(33_333, 640, 480, None),
        ]);
        match session.run(&mut source, 170.0) {
            Err(SessionError::ViewFailed { view, reason, .. }) => {
                assert_eq!(view, View::Front);
                assert_eq!(reason, AbortReason::SourceClosed);
            }
            other => panic!("unexpected result: {:?}", other.map(|o| o.measurements)),
        }
        assert_eq!(source.remaining(), 0);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = Config::default();
        config.measurement.entries.clear();
        assert!(matches!(MeasurementSession::new(config), Err(SessionError::Config(_))));

        for secs in [-1.0, 1e20] {
            let mut config = Config::default();
            config.capture.timeout_secs = secs;
            assert!(matches!(MeasurementSession::new(config), Err(SessionError::Config(_))));
        }
    }
}
