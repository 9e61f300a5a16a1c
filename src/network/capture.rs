use crate::core::config::CaptureConfig;
use crate::core::error::CaptureError;
use crate::network::packet::RawFrame;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{LegacyPcapReader, Linktype, PcapBlockOwned, PcapError};
use pnet::datalink::{self, Channel, NetworkInterface};
use std::fs::File;
use std::io::{BufReader, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// 連続した読み取りエラーがこの回数を超えたらキャプチャを止める
const MAX_CONSECUTIVE_ERRORS: usize = 100;
const PCAP_BUFFER_SIZE: usize = 65536;

pub struct PacketCapture {
    interface: NetworkInterface,
    config: CaptureConfig,
    running: Arc<AtomicBool>,
}

impl PacketCapture {
    pub fn new(interface: NetworkInterface, config: CaptureConfig) -> Self {
        Self {
            interface,
            config,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn by_name(name: &str, config: CaptureConfig) -> Result<Self, CaptureError> {
        let interface = datalink::interfaces()
            .into_iter()
            .find(|iface| iface.name == name)
            .ok_or_else(|| CaptureError::InterfaceNotFound(name.to_string()))?;
        Ok(Self::new(interface, config))
    }

    pub fn interface_name(&self) -> &str {
        &self.interface.name
    }

    // 停止フラグ (falseにするとループを抜ける)
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// フレームを1つずつハンドラに渡す。ハンドラが戻るまで次の読み取りは行わない。
    pub fn run<F>(&self, mut handler: F) -> Result<(), CaptureError>
    where
        F: FnMut(&RawFrame),
    {
        let channel_config = datalink::Config {
            read_timeout: Some(self.config.read_timeout()),
            read_buffer_size: self.config.buffer_size,
            promiscuous: self.config.promiscuous,
            ..Default::default()
        };

        let mut rx = match datalink::channel(&self.interface, channel_config) {
            Ok(Channel::Ethernet(_, rx)) => rx,
            Ok(_) => return Err(CaptureError::UnsupportedChannel),
            Err(e) => return Err(CaptureError::Io(e)),
        };

        info!("キャプチャを開始します: {}", self.interface.name);
        let mut consecutive_errors = 0;
        while self.running.load(Ordering::Relaxed) {
            match rx.next() {
                Ok(packet) => {
                    consecutive_errors = 0;
                    let frame = RawFrame::from_slice(packet, chrono::Utc::now());
                    handler(&frame);
                }
                // タイムアウトは停止フラグを確認するための周期
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted) => {}
                Err(e) => {
                    consecutive_errors += 1;
                    error!("パケットの読み取り中にエラーが発生しました: {}", e);
                    if consecutive_errors > MAX_CONSECUTIVE_ERRORS {
                        return Err(CaptureError::Io(e));
                    }
                }
            }
        }
        info!("キャプチャを停止しました: {}", self.interface.name);
        Ok(())
    }
}

/// 保存済みの .pcap ファイルからフレームを読み出す。
///
/// 各レコードヘッダーのキャプチャ長と実際の長さをそのまま `RawFrame` に渡すため、
/// スナップ長で切り詰められたフレームも再現される。
pub struct PcapFileCapture {
    path: PathBuf,
    running: Arc<AtomicBool>,
}

impl PcapFileCapture {
    pub fn open(path: &Path) -> Result<Self, CaptureError> {
        // 存在確認だけ先に行う
        File::open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn run<F>(&self, mut handler: F) -> Result<(), CaptureError>
    where
        F: FnMut(&RawFrame),
    {
        let file = File::open(&self.path)?;
        let mut reader = LegacyPcapReader::new(PCAP_BUFFER_SIZE, BufReader::new(file))
            .map_err(|e| CaptureError::PcapFile(format!("{:?}", e)))?;

        info!("キャプチャファイルを読み込みます: {}", self.path.display());
        let mut nanosecond = false;
        let mut records = 0u64;
        while self.running.load(Ordering::Relaxed) {
            match reader.next() {
                Ok((offset, block)) => {
                    let frame = match block {
                        PcapBlockOwned::LegacyHeader(ref header) => {
                            nanosecond = header.is_nanosecond_precision();
                            if header.network != Linktype::ETHERNET {
                                warn!("Ethernet以外のリンク種別です: {:?}", header.network);
                            }
                            None
                        }
                        PcapBlockOwned::Legacy(ref record) => {
                            let subsec_nanos = if nanosecond { record.ts_usec } else { record.ts_usec.saturating_mul(1000) };
                            let timestamp = DateTime::from_timestamp(i64::from(record.ts_sec), subsec_nanos).unwrap_or_else(Utc::now);
                            Some(RawFrame::new(
                                Bytes::copy_from_slice(record.data),
                                record.caplen as usize,
                                record.origlen as usize,
                                timestamp,
                            ))
                        }
                        PcapBlockOwned::NG(_) => {
                            warn!("pcapng形式のブロックは読み飛ばします");
                            None
                        }
                    };
                    drop(block);
                    reader.consume(offset);

                    if let Some(frame) = frame {
                        records += 1;
                        handler(&frame);
                    }
                }
                Err(PcapError::Eof) => break,
                Err(PcapError::Incomplete(_)) => {
                    reader
                        .refill()
                        .map_err(|e| CaptureError::PcapFile(format!("{:?}", e)))?;
                }
                Err(e) => return Err(CaptureError::PcapFile(format!("{:?}", e))),
            }
        }
        info!("キャプチャファイルの読み込みを終了しました: {}件", records);
        Ok(())
    }
}

// ライブキャプチャとファイル読み込みのどちらか
pub enum CaptureSource {
    Live(PacketCapture),
    Offline(PcapFileCapture),
}

impl CaptureSource {
    pub fn name(&self) -> String {
        match self {
            CaptureSource::Live(capture) => capture.interface_name().to_string(),
            CaptureSource::Offline(capture) => capture.path().display().to_string(),
        }
    }

    pub fn running_flag(&self) -> Arc<AtomicBool> {
        match self {
            CaptureSource::Live(capture) => capture.running_flag(),
            CaptureSource::Offline(capture) => capture.running_flag(),
        }
    }

    pub fn run<F>(&self, handler: F) -> Result<(), CaptureError>
    where
        F: FnMut(&RawFrame),
    {
        match self {
            CaptureSource::Live(capture) => capture.run(handler),
            CaptureSource::Offline(capture) => capture.run(handler),
        }
    }
}

/// シグナルを受け取るまで待ち、停止フラグを下ろす
pub async fn stop_on_signal<S>(running: Arc<AtomicBool>, signal: S)
where
    S: std::future::Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => info!("停止シグナルを受信しました"),
        Err(e) => error!("シグナルの待機に失敗しました: {}", e),
    }
    running.store(false, Ordering::Relaxed);
}
