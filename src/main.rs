use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use body_measure::config::Config;
use body_measure::measurement::{StandardStatus, ValidationReport};
use body_measure::pose::ReplaySource;
use body_measure::record::{compare_files, save_record, SeriesStep, Trend};
use body_measure::session::MeasurementSession;
use body_measure::view::View;

const CONFIG_PATH: &str = "config.toml";

const CORE: [&str; 3] = ["chest", "waist", "hip"];
const ARM: [&str; 4] = ["biceps_left", "biceps_right", "forearm_left", "forearm_right"];
const LEG: [&str; 4] = ["thigh_left", "thigh_right", "calf_left", "calf_right"];

/// 4方向の姿勢記録から周径を計測する
#[derive(Debug, Parser)]
#[command(author, version, about = "4-view body circumference measurement")]
struct Args {
    /// 姿勢フレームの記録（PoseFrame の JSON 配列）
    #[arg(required_unless_present = "compare")]
    replay: Option<PathBuf>,

    /// 身長 (cm)
    #[arg(long, required_unless_present = "compare")]
    height: Option<f64>,

    /// 保存済みの計測結果を古い順に並べて比較する
    #[arg(long, num_args = 2.., conflicts_with = "replay")]
    compare: Option<Vec<PathBuf>>,

    /// 設定ファイル。省略時は ./config.toml があれば使う
    #[arg(long)]
    config: Option<PathBuf>,

    /// 保存先ディレクトリ（設定の output.directory を上書き）
    #[arg(long)]
    output: Option<PathBuf>,

    /// 結果を保存しない
    #[arg(long)]
    no_save: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if let Some(paths) = &args.compare {
        print_series(&compare_files(&paths[..])?);
        return Ok(());
    }
    let (Some(replay), Some(height)) = (&args.replay, args.height) else {
        anyhow::bail!("replay file and --height are required");
    };

    let config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::load_or_default(CONFIG_PATH),
    };
    let output_dir = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.output.directory));

    let mut source = ReplaySource::load(replay)?;
    let session = MeasurementSession::new(config)?;

    println!("=== Body Measure ===");
    println!("身長: {:.1} cm", height);
    println!("フレーム数: {}", source.remaining());
    println!();
    println!("撮影手順:");
    for (i, view) in View::ALL.iter().enumerate() {
        println!("  {}. {:<5} - {}", i + 1, view, view.instruction());
    }
    println!();

    let outcome = session.run(&mut source, height)?;
    print_report(&outcome.report);

    if args.no_save {
        println!("保存をスキップしました");
    } else {
        let path = save_record(&output_dir, &outcome.to_record())?;
        println!("保存しました: {}", path.display());
    }
    Ok(())
}

fn print_report(report: &ValidationReport) {
    println!("計測結果 (cm):");
    for (title, names) in [("体幹", &CORE[..]), ("腕", &ARM[..]), ("脚", &LEG[..])] {
        println!("  [{}]", title);
        for name in names {
            match report.get(name) {
                Some(m) => {
                    let check = if m.is_plausible() { "" } else { "  (要確認)" };
                    let standard = m.standard.map(standard_label).unwrap_or_default();
                    println!("    {:<14} {:>7.2}{}{}", name, m.value_cm, standard, check);
                }
                None => println!("    {:<14} {:>7}", name, "-"),
            }
        }
    }
    if !report.scale_reliable {
        println!();
        println!("注意: 頭頂または足が検出できず、スケールは生座標のままです");
    }
    println!();
}

fn standard_label(status: StandardStatus) -> String {
    match status {
        StandardStatus::TooSmall { min_cm } => format!("  標準未満 (最小 {:.0})", min_cm),
        StandardStatus::TooLarge { max_cm } => format!("  標準超過 (最大 {:.0})", max_cm),
        StandardStatus::Ideal { diff_from_target } => format!("  理想的 ({:+.2})", diff_from_target),
        StandardStatus::AboveTarget { diff_from_target } => format!("  目標より大 ({:+.2})", diff_from_target),
        StandardStatus::BelowTarget { diff_from_target } => format!("  目標より小 ({:+.2})", diff_from_target),
    }
}

fn print_series(steps: &[SeriesStep]) {
    for step in steps {
        println!("[{}] {} -> {}", step.session, step.timestamp_previous, step.timestamp_current);
        for change in &step.changes {
            let mark = match change.trend {
                Trend::Stable => "=",
                Trend::Decreased => "↓",
                Trend::Increased => "↑",
            };
            println!(
                "    {:<14} {:>7.2} -> {:>7.2}  {:+.2} {}",
                change.name, change.before_cm, change.after_cm, change.change_cm, mark
            );
        }
    }
}
