use crate::application::dns::DnsMessage;
use crate::application::http::{percent_decode, HttpMessage, HttpMethod};
use crate::application::Application;
use crate::core::error::ParseResult;
use crate::network::packet::ethernet::EthernetFrame;
use crate::network::packet::ipv4::Ipv4Packet;
use crate::network::packet::tcp::TcpSegment;
use crate::network::packet::{EtherType, IpProtocol, RawFrame};
use crate::security::idps::{DetectionResult, InputKind, RuleAction, RuleLibrary};
use log::{debug, info, log_enabled, warn, Level};
use serde::Serialize;
use std::net::Ipv4Addr;
use std::sync::Arc;

// パイプラインが所有する診断用カウンタ
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub frames: u64,
    pub bytes: u64,
    pub truncated: u64,
    pub ipv4: u64,
    pub tcp: u64,
    pub http: u64,
    pub dns: u64,
    pub decode_errors: u64,
    pub detections: u64,
}

// 1フレームを解析した結果
#[derive(Debug)]
enum Inspection {
    // 上位層の解析対象ではない (エラーではない)
    Skipped(&'static str),
    Decoded {
        source: Ipv4Addr,
        destination: Ipv4Addr,
        application: Application,
    },
}

pub struct CapturePipeline {
    rules: Arc<RuleLibrary>,
    dns_port: u16,
    stats: PipelineStats,
}

impl CapturePipeline {
    pub fn new(rules: Arc<RuleLibrary>, dns_port: u16) -> Self {
        Self {
            rules,
            dns_port,
            stats: PipelineStats::default(),
        }
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// キャプチャ機構から1フレームを受け取り、デコードと検知を行う。
    /// どの層でデコードに失敗してもそのフレームの処理を打ち切るだけで、
    /// パイプライン自体は止めない。
    pub fn process_frame(&mut self, frame: &RawFrame) -> Vec<DetectionResult> {
        self.stats.frames += 1;
        self.stats.bytes += frame.bytes().len() as u64;
        if frame.is_truncated() {
            self.stats.truncated += 1;
        }

        let inspection = match self.inspect(frame.bytes()) {
            Ok(inspection) => inspection,
            Err(e) => {
                self.stats.decode_errors += 1;
                debug!("フレーム#{}のデコードに失敗しました ({:?}): {}", self.stats.frames, e.kind(), e);
                return Vec::new();
            }
        };

        match inspection {
            Inspection::Skipped(reason) => {
                debug!("フレーム#{}: {}", self.stats.frames, reason);
                Vec::new()
            }
            Inspection::Decoded {
                source,
                destination,
                application: Application::Dns(message),
            } => {
                self.stats.dns += 1;
                info!("{} -> {} {}", source, destination, message);
                Vec::new()
            }
            Inspection::Decoded {
                source,
                destination,
                application: Application::Http(message),
            } => {
                self.stats.http += 1;
                let results = self.detect_http(&message);
                self.stats.detections += results.len() as u64;
                report(frame, source, destination, &message, &results);
                results
            }
        }
    }

    fn inspect(&mut self, data: &[u8]) -> ParseResult<Inspection> {
        let ethernet = EthernetFrame::parse(data)?;
        if ethernet.ethertype != EtherType::Ipv4 {
            return Ok(Inspection::Skipped("IPv4ではありません"));
        }

        let ip = Ipv4Packet::parse(ethernet.payload())?;
        self.stats.ipv4 += 1;
        if ip.protocol != IpProtocol::Tcp {
            return Ok(Inspection::Skipped("TCPではありません"));
        }
        // 先頭以外のフラグメントにはTCPヘッダーがない
        if ip.fragment_offset != 0 {
            return Ok(Inspection::Skipped("後続フラグメントです"));
        }

        let tcp = TcpSegment::parse(ip.payload())?;
        self.stats.tcp += 1;

        // 内容によるHTTP判定はDNSポートより優先する
        let application = if tcp.looks_like_http() {
            match HttpMessage::parse(tcp.payload()) {
                Ok(message) => Application::Http(message),
                Err(e) => {
                    debug!("HTTPメッセージではありません: {}", e);
                    return Ok(Inspection::Skipped("HTTPの構造に一致しません"));
                }
            }
        } else if tcp.involves_port(self.dns_port) && tcp.payload_size() > 0 {
            Application::Dns(DnsMessage::parse_tcp_payload(tcp.payload())?)
        } else {
            return Ok(Inspection::Skipped("アプリケーション層の解析対象外です"));
        };

        Ok(Inspection::Decoded {
            source: ip.source,
            destination: ip.destination,
            application,
        })
    }

    // GETはパス、POSTはボディを検査する
    fn detect_http(&self, message: &HttpMessage) -> Vec<DetectionResult> {
        match message.method() {
            Some(HttpMethod::Get) => {
                let path = message.path().unwrap_or_default();
                self.rules.detect_all(&percent_decode(path, false), InputKind::Path)
            }
            Some(HttpMethod::Post) => {
                let body = message.body_text();
                self.rules.detect_all(&percent_decode(&body, true), InputKind::Body)
            }
            _ => Vec::new(),
        }
    }
}

fn report(frame: &RawFrame, source: Ipv4Addr, destination: Ipv4Addr, message: &HttpMessage, results: &[DetectionResult]) {
    if log_enabled!(Level::Debug) {
        if let (Some(method), Some(path)) = (message.method(), message.path()) {
            debug!("{} -> {} HTTP {} {}", source, destination, method, path);
        }
    }

    for result in results {
        let alert = serde_json::json!({
            "timestamp": frame.timestamp,
            "source": source,
            "destination": destination,
            "detection": result,
        });
        match result.action {
            RuleAction::Alert => warn!("検知: {}", alert),
            RuleAction::Log => info!("検知: {}", alert),
        }
    }
}
