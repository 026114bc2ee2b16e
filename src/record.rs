use anyhow::{Context, Result};
use chrono::{Local, SecondsFormat};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::measurement::{MeasurementSet, StandardStatus, ValidationFlag, ValidationReport};

pub const CAPTURE_MODE: &str = "4-view_auto-capture_circumference_only";

/// 変化なしとみなす差分 (cm)
const STABLE_THRESHOLD_CM: f64 = 1.0;

/// 項目名付きの妥当性注記
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordFlag {
    pub measurement: String,
    pub flag: ValidationFlag,
}

/// 保存される計測結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    /// ISO-8601
    pub timestamp: String,
    pub user_height_cm: f64,
    pub measurements: BTreeMap<String, f64>,
    pub capture_mode: String,
    #[serde(default = "default_scale_reliable")]
    pub scale_reliable: bool,
    #[serde(default)]
    pub flags: Vec<RecordFlag>,
    /// 成人標準との比較（標準のある項目のみ）
    #[serde(default)]
    pub standards: BTreeMap<String, StandardStatus>,
}

fn default_scale_reliable() -> bool { true }

impl MeasurementRecord {
    /// 現在時刻のレコードを作る
    pub fn new(measurements: &MeasurementSet, report: &ValidationReport) -> Self {
        let timestamp = Local::now().to_rfc3339_opts(SecondsFormat::Secs, false);
        Self::with_timestamp(timestamp, measurements, report)
    }

    pub fn with_timestamp(
        timestamp: String,
        measurements: &MeasurementSet,
        report: &ValidationReport,
    ) -> Self {
        let flags = report
            .measurements
            .iter()
            .flat_map(|m| {
                m.flags.iter().map(|flag| RecordFlag {
                    measurement: m.name.clone(),
                    flag: flag.clone(),
                })
            })
            .collect();
        let standards = report
            .measurements
            .iter()
            .filter_map(|m| m.standard.map(|status| (m.name.clone(), status)))
            .collect();
        Self {
            timestamp,
            user_height_cm: measurements.height_cm,
            measurements: measurements.values().clone(),
            capture_mode: CAPTURE_MODE.to_string(),
            scale_reliable: report.scale_reliable,
            flags,
            standards,
        }
    }

    /// `body_measurements_<timestamp>.json`（':' はファイル名に使えないので '-'）
    pub fn file_name(&self) -> String {
        format!("body_measurements_{}.json", self.timestamp.replace(':', "-"))
    }
}

/// `dir` にレコードを書き出し、書いたパスを返す
pub fn save_record<P: AsRef<Path>>(dir: P, record: &MeasurementRecord) -> Result<PathBuf> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    let path = dir.join(record.file_name());
    let json = serde_json::to_string_pretty(record)?;
    fs::write(&path, json).context("Failed to write measurement record")?;
    log::info!("saved measurements to {}", path.display());
    Ok(path)
}

pub fn load_record<P: AsRef<Path>>(path: P) -> Result<MeasurementRecord> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read measurement record {}", path.display()))?;
    let record: MeasurementRecord = serde_json::from_str(&content)?;
    Ok(record)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Stable,
    Decreased,
    Increased,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementChange {
    pub name: String,
    pub before_cm: f64,
    pub after_cm: f64,
    pub change_cm: f64,
    /// 前回値が 0 のときは `None`
    pub change_percent: Option<f64>,
    pub trend: Trend,
}

/// 2回分の計測を項目ごとに比較する（両方にある項目のみ）
pub fn compare_records(before: &MeasurementRecord, after: &MeasurementRecord) -> Vec<MeasurementChange> {
    before
        .measurements
        .iter()
        .filter_map(|(name, &before_cm)| {
            let after_cm = *after.measurements.get(name)?;
            let change_cm = after_cm - before_cm;
            let trend = if change_cm.abs() < STABLE_THRESHOLD_CM {
                Trend::Stable
            } else if change_cm < 0.0 {
                Trend::Decreased
            } else {
                Trend::Increased
            };
            Some(MeasurementChange {
                name: name.clone(),
                before_cm,
                after_cm,
                change_cm,
                change_percent: (before_cm != 0.0).then(|| change_cm / before_cm * 100.0),
                trend,
            })
        })
        .collect()
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesError {
    #[error("need at least 2 records to compare, got {0}")]
    TooFewRecords(usize),
}

/// 連続する2回分の比較
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesStep {
    /// 後側レコードの位置（1 始まり）
    pub session: usize,
    pub timestamp_previous: String,
    pub timestamp_current: String,
    pub changes: Vec<MeasurementChange>,
}

/// 時系列順のレコード列を隣同士で比較する
pub fn compare_series(records: &[MeasurementRecord]) -> Result<Vec<SeriesStep>, SeriesError> {
    if records.len() < 2 {
        return Err(SeriesError::TooFewRecords(records.len()));
    }
    Ok(records
        .windows(2)
        .enumerate()
        .map(|(i, pair)| SeriesStep {
            session: i + 1,
            timestamp_previous: pair[0].timestamp.clone(),
            timestamp_current: pair[1].timestamp.clone(),
            changes: compare_records(&pair[0], &pair[1]),
        })
        .collect())
}

/// ファイル群を読み込んで比較する。読めないファイルは警告して飛ばす。
pub fn compare_files<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<SeriesStep>> {
    let records: Vec<MeasurementRecord> = paths
        .iter()
        .filter_map(|path| match load_record(path) {
            Ok(record) => Some(record),
            Err(e) => {
                log::warn!("skipping {}: {:#}", path.as_ref().display(), e);
                None
            }
        })
        .collect();
    Ok(compare_series(&records)?)
}
