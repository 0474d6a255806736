// スマートメーターから瞬時電力と積算電力量を収集する。
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use anyhow::Context;
use broute::broute::{Session, Step};
use broute::clock::SystemClock;
use broute::connection_settings::ConnectionSettings;
use broute::sensor::SensorSink;
use broute::transport::SerialPortTransport;
use chrono::Local;
use clap::Parser;
use serde::Serialize;
use serialport::{DataBits, SerialPort, StopBits};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{Event, Subscriber};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, FormatEvent, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
};

mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

/// run_loop の呼び出し間隔(ミリ秒)
const LOOP_INTERVAL: u64 = 16;

/// スマートメーターから計測値を収集する
#[derive(Parser, Debug)]
#[command(name = "broute_daqd")]
#[command(version, about, long_about = None)]
struct Cli {
    /// 設定ファイル
    #[arg(short = 'C', long, default_value = "broute.toml")]
    config_file: PathBuf,

    /// シリアルデバイス名
    #[arg(short = 'D', long, env = "SERIAL_DEVICE", default_value = "/dev/ttyUSB0")]
    device: String,

    /// ボーレート
    #[arg(long, default_value_t = 115200)]
    baud_rate: u32,
}

/// 標準出力に書き出す1行
#[derive(Serialize)]
struct Record<'a> {
    recorded_at: String,
    sensor: &'a str,
    value: f32,
    unit: &'a str,
}

/// 計測値をJSON行で標準出力に書き出す
struct JsonLineSink {
    name: &'static str,
    unit: &'static str,
    decimals: usize,
}

impl JsonLineSink {
    fn new(name: &'static str, unit: &'static str) -> Self {
        Self {
            name,
            unit,
            decimals: 0,
        }
    }
}

impl SensorSink for JsonLineSink {
    fn publish_state(&mut self, value: f32) {
        tracing::info!("{}={:.*} {}", self.name, self.decimals, value, self.unit);
        let record = Record {
            recorded_at: Local::now().to_rfc3339(),
            sensor: self.name,
            value,
            unit: self.unit,
        };
        match serde_json::to_string(&record) {
            Ok(s) => println!("{s}"),
            Err(e) => tracing::error!("{e}"),
        }
    }

    fn set_accuracy_decimals(&mut self, decimals: i8) {
        self.decimals = decimals.max(0) as usize;
    }
}

/// シリアルポートを開く
fn open_port(port_name: &str, baud_rate: u32) -> anyhow::Result<Box<dyn SerialPort>> {
    let builder = serialport::new(port_name, baud_rate)
        .stop_bits(StopBits::One)
        .data_bits(DataBits::Eight)
        .timeout(Duration::from_millis(10));

    builder
        .open()
        .with_context(move || format!("Failed to open \"{}\".", port_name))
}

/// スマートメーターからデーターを収集する
async fn exec_data_acquisition(cli: &Cli) -> anyhow::Result<Step> {
    let settings = ConnectionSettings::load(&cli.config_file)
        .with_context(|| format!("Failed to read \"{}\".", cli.config_file.display()))?;

    let port = open_port(&cli.device, cli.baud_rate)?;

    let mut session = Session::new(
        SerialPortTransport::new(port),
        SystemClock::new(),
        &settings,
    )
    .with_power_sensor(Box::new(JsonLineSink::new("power", "W")))
    .with_energy_sensor(Box::new(JsonLineSink::new("energy", "kWh")));
    session.setup()?;

    let mut interval = tokio::time::interval(Duration::from_millis(LOOP_INTERVAL));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                // 応答待ちの間は他のタスクを止めない
                let step = tokio::task::block_in_place(|| {
                    session.run_timers();
                    session.run_loop()
                });
                match step {
                    Step::Continue => {}
                    step => return Ok(step),
                }
            }
            _ = &mut ctrl_c => {
                tracing::info!("interrupted");
                return Ok(Step::Halted);
            }
        }
    }
}

/// SKSETPWD C 以降のパスワードをマスクするフォーマッタ
struct MaskingRouteBPasswordFormatter;

impl<S, N> FormatEvent<S, N> for MaskingRouteBPasswordFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'writer> FormatFields<'writer> + 'static,
{
    fn format_event(
        &self,
        ctx: &fmt::FmtContext<'_, S, N>,
        mut writer: fmt::format::Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        // まず標準フォーマットをバッファに書き出す
        let mut buf = String::new();
        {
            let temp_writer = fmt::format::Writer::new(&mut buf);
            fmt::format::Format::default()
                .with_timer(fmt::time::LocalTime::rfc_3339())
                .format_event(ctx, temp_writer, event)?;
        }

        // マスク処理
        const PATTERN: &str = "SKSETPWD C ";
        if let Some(pos) = buf.find(PATTERN) {
            let start = pos + PATTERN.len();
            let end = (start + 12).min(buf.len());
            if buf.is_char_boundary(end) {
                let masking_str = "#".repeat(end - start);
                buf.replace_range(start..end, &masking_str)
            }
        }
        // 出力
        writer.write_str(&buf)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenv::dotenv();

    // プログラムの情報
    let git_head_ref = built_info::GIT_HEAD_REF.unwrap_or_default();
    let app_info = format!(
        "{} / {}{}",
        built_info::PKG_NAME,
        built_info::PKG_VERSION,
        built_info::GIT_COMMIT_HASH_SHORT
            .map(|s| format!(" ({s} - {git_head_ref})"))
            .unwrap_or_default()
    );

    // デバッグレベルは RUST_LOG 環境変数で設定できる
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // tracingの設定
    let registry = tracing_subscriber::registry().with(filter);

    // systemd-journaldに接続
    match tracing_journald::layer() {
        // journaldにログ出力する
        Ok(journald_layer) => registry.with(journald_layer).init(),
        // journaldが使えないので、標準エラー出力にログ出力する
        Err(e) => {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_ansi(false)
                        .event_format(MaskingRouteBPasswordFormatter),
                )
                .init();
            tracing::error!("couldn't connect to journald: {}", e)
        }
    }

    // コマンドライン引数
    let cli = Cli::parse();

    // サービスを開始する
    tracing::info!("{app_info} started.");
    match exec_data_acquisition(&cli).await {
        Ok(Step::Reboot) => {
            // 再起動はサービスマネージャに任せる
            tracing::error!("{app_info} rebooting.");
            ExitCode::FAILURE
        }
        Ok(_) => {
            tracing::info!("{app_info} stopped.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{app_info} aborted, reason: {e:#}");
            ExitCode::FAILURE
        }
    }
}
