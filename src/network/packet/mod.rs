pub mod ethernet;
pub mod ipv4;
pub mod tcp;

use bytes::Bytes;
use chrono::{DateTime, Utc};

// キャプチャ機構から受け取った1フレーム
// パイプラインの1回の呼び出しの間だけ保持される
#[derive(Debug, Clone)]
pub struct RawFrame {
    data: Bytes,
    pub captured_len: usize,
    pub wire_len: usize,
    pub timestamp: DateTime<Utc>,
}

impl RawFrame {
    pub fn new(data: Bytes, captured_len: usize, wire_len: usize, timestamp: DateTime<Utc>) -> Self {
        Self {
            data,
            captured_len,
            wire_len,
            timestamp,
        }
    }

    pub fn from_slice(data: &[u8], timestamp: DateTime<Utc>) -> Self {
        Self::new(Bytes::copy_from_slice(data), data.len(), data.len(), timestamp)
    }

    // 読み取りは常にキャプチャ長までに制限する
    pub fn bytes(&self) -> &[u8] {
        let end = self.captured_len.min(self.data.len());
        &self.data[..end]
    }

    pub fn is_truncated(&self) -> bool {
        self.captured_len < self.wire_len
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EtherType {
    Ipv4,
    Arp,
    Vlan,
    Ipv6,
    Other(u16),
}

impl From<u16> for EtherType {
    fn from(value: u16) -> Self {
        match value {
            0x0800 => EtherType::Ipv4,
            0x0806 => EtherType::Arp,
            0x8100 => EtherType::Vlan,
            0x86dd => EtherType::Ipv6,
            other => EtherType::Other(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpProtocol {
    Icmp,
    Tcp,
    Udp,
    Other(u8),
}

impl From<u8> for IpProtocol {
    fn from(value: u8) -> Self {
        match value {
            1 => IpProtocol::Icmp,
            6 => IpProtocol::Tcp,
            17 => IpProtocol::Udp,
            other => IpProtocol::Other(other),
        }
    }
}
