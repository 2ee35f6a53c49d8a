//! ACK 抑制轨迹回放
//!
//! 读取 JSON 轨迹，用手动时钟回放到抑制引擎上，打印统计并可选写出完整报告。

use clap::Parser;
use std::fs;
use std::path::PathBuf;
use tcpack_sup::replay::{Trace, replay};
use tcpack_sup::sup::SupMode;

#[derive(Debug, Parser)]
#[command(name = "tcpack-replay", about = "TCP ACK 抑制轨迹回放")]
struct Args {
    /// 轨迹文件（JSON）
    #[arg(long)]
    trace: PathBuf,

    /// 把回放报告写成 JSON
    #[arg(long)]
    json_out: Option<PathBuf>,

    /// 覆盖轨迹里的初始模式：off/replace/delay_tx/hold 或 0..=3
    #[arg(long, value_parser = parse_mode)]
    mode: Option<SupMode>,

    /// 关闭日志输出
    #[arg(long)]
    quiet: bool,
}

fn parse_mode(raw: &str) -> Result<SupMode, String> {
    if let Ok(n) = raw.parse::<u32>() {
        return SupMode::try_from(n).map_err(|e| e.to_string());
    }
    SupMode::ALL
        .into_iter()
        .find(|m| m.to_string() == raw)
        .ok_or_else(|| format!("unknown mode: {raw}"))
}

fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(if args.quiet {
            tracing_subscriber::EnvFilter::new("off")
        } else {
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
        })
        .with_writer(std::io::stderr)
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .init();

    let mut trace = match Trace::from_path(&args.trace) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("failed to load trace {}: {e}", args.trace.display());
            std::process::exit(2);
        }
    };
    if let Some(mode) = args.mode {
        trace.config.mode = mode;
        if let Err(e) = trace.config.validate() {
            eprintln!("invalid --mode: {e}");
            std::process::exit(2);
        }
    }

    let report = match replay(&trace) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("replay failed: {e}");
            std::process::exit(1);
        }
    };

    if let Some(path) = args.json_out {
        let json = serde_json::to_string_pretty(&report).expect("serialize replay report");
        fs::write(&path, json).expect("write replay report");
        eprintln!("wrote replay report to {}", path.display());
    }

    let s = &report.stats;
    println!(
        "done @ {}ms, mode={}, acks_seen={}, replaced={}, held={}, hold_flushes={}, timer_releases={}, psh_acked={}",
        report.end_ms,
        report.final_mode,
        s.acks_seen,
        s.acks_replaced,
        s.acks_held,
        s.hold_flushes,
        s.timer_releases,
        s.psh_acked
    );
    println!(
        "sent={} freed={} tx_in_rx={:?}",
        report.sent.len(),
        report.freed.len(),
        report.tx_in_rx
    );
}
