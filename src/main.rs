use crate::error::InitProcessError;
use crate::select_device::select_device;
use crate::setup_logger::setup_logger;
use log::{info, warn};
use rdb_inspector::core::config::DetectionConfig;
use rdb_inspector::core::{CapturePipeline, Configuration};
use rdb_inspector::network::capture::stop_on_signal;
use rdb_inspector::network::{CaptureSource, PacketCapture, PcapFileCapture};
use rdb_inspector::security::idps::{RuleError, RuleLibrary};
use std::sync::Arc;
use tokio::task;

mod error;
mod select_device;
mod setup_logger;

#[tokio::main]
async fn main() -> Result<(), InitProcessError> {
    let config = Configuration::from_env()?;

    setup_logger(&config.logging).map_err(|e| InitProcessError::LoggerError(e.to_string()))?;

    // ルールは起動時に一度だけ読み込み、以降は読み取り専用で共有する
    let rules = Arc::new(load_rules(&config.detection)?);
    if rules.is_empty() {
        warn!("検知ルールが登録されていません");
    }
    info!("検知ルールを{}件読み込みました", rules.len());

    // キャプチャファイルが指定されていればそれを読み、なければデバイスを選択する
    let capture = match (config.capture.offline_file(), &config.capture.interface) {
        (Some(path), _) => CaptureSource::Offline(PcapFileCapture::open(&path)?),
        (None, Some(name)) => CaptureSource::Live(PacketCapture::by_name(name, config.capture.clone())?),
        (None, None) => {
            let interface = select_device().map_err(|e| InitProcessError::DeviceSelectionError(e.to_string()))?;
            CaptureSource::Live(PacketCapture::new(interface, config.capture.clone()))
        }
    };
    info!("キャプチャ元の選択に成功しました: {}", capture.name());

    tokio::spawn(stop_on_signal(capture.running_flag(), tokio::signal::ctrl_c()));

    // キャプチャは同期的にブロックするため専用スレッドで回す
    let dns_port = config.detection.dns_port;
    let stats = task::spawn_blocking(move || {
        let mut pipeline = CapturePipeline::new(rules, dns_port);
        capture.run(|frame| {
            pipeline.process_frame(frame);
        })?;
        Ok::<_, InitProcessError>(pipeline.stats().clone())
    })
    .await??;

    info!(
        "処理したフレーム: {} (IPv4: {}, TCP: {}, HTTP: {}, DNS: {}, デコード失敗: {}, 検知: {})",
        stats.frames, stats.ipv4, stats.tcp, stats.http, stats.dns, stats.decode_errors, stats.detections
    );

    Ok(())
}

fn load_rules(config: &DetectionConfig) -> Result<RuleLibrary, RuleError> {
    let mut library = if config.default_rules {
        RuleLibrary::with_default_rules()?
    } else {
        RuleLibrary::new()
    };

    if let Some(path) = &config.rules_file {
        library.extend_from_file(path)?;
        info!("ルールファイルを読み込みました: {}", path.display());
    }

    Ok(library)
}
