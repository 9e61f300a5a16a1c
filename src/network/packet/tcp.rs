// 0                   1                   2                   3
// 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |          Source Port          |       Destination Port        |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                        Sequence Number                        |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                    Acknowledgment Number                      |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |  Data |           |U|A|P|R|S|F|                               |
// | Offset| Reserved  |R|C|S|S|Y|I|            Window             |
// |       |           |G|K|H|T|N|N|                               |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |           Checksum            |         Urgent Pointer        |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
use crate::core::error::{ParseError, ParseResult};

const MIN_HEADER_SIZE: usize = 20;

// HTTPらしさの判定に使う先頭トークン
const HTTP_PREFIXES: [&[u8]; 10] = [
    b"GET ",
    b"POST ",
    b"PUT ",
    b"HEAD ",
    b"DELETE ",
    b"OPTIONS ",
    b"PATCH ",
    b"TRACE ",
    b"CONNECT ",
    b"HTTP/",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpFlags {
    pub urg: bool,
    pub ack: bool,
    pub psh: bool,
    pub rst: bool,
    pub syn: bool,
    pub fin: bool,
}

impl From<u8> for TcpFlags {
    fn from(bits: u8) -> Self {
        Self {
            urg: (bits & 0x20) != 0,
            ack: (bits & 0x10) != 0,
            psh: (bits & 0x08) != 0,
            rst: (bits & 0x04) != 0,
            syn: (bits & 0x02) != 0,
            fin: (bits & 0x01) != 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TcpSegment<'a> {
    pub source_port: u16,
    pub destination_port: u16,
    pub sequence_number: u32,
    pub acknowledgment_number: u32,
    pub header_length: usize,
    pub flags: TcpFlags,
    pub window_size: u16,
    payload: &'a [u8],
}

impl<'a> TcpSegment<'a> {
    pub fn parse(data: &'a [u8]) -> ParseResult<Self> {
        if data.len() < MIN_HEADER_SIZE {
            return Err(ParseError::truncated("TCP", MIN_HEADER_SIZE, data.len()));
        }

        let data_offset = ((data[12] >> 4) & 0xf) as usize;
        let header_length = data_offset * 4;
        if header_length < MIN_HEADER_SIZE {
            return Err(ParseError::LengthMismatch {
                layer: "TCP",
                field: "data_offset",
                value: data_offset,
            });
        }
        if header_length > data.len() {
            return Err(ParseError::truncated("TCP", header_length, data.len()));
        }

        Ok(Self {
            source_port: u16::from_be_bytes([data[0], data[1]]),
            destination_port: u16::from_be_bytes([data[2], data[3]]),
            sequence_number: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            acknowledgment_number: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
            header_length,
            flags: TcpFlags::from(data[13]),
            window_size: u16::from_be_bytes([data[14], data[15]]),
            payload: &data[header_length..],
        })
    }

    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    pub fn payload_size(&self) -> usize {
        self.payload.len()
    }

    /// 先頭バイトからHTTPメッセージらしいかを推定する。
    /// あくまでヒューリスティックなので、HTTPのデコード側でも構造を検証すること。
    pub fn looks_like_http(&self) -> bool {
        HTTP_PREFIXES
            .iter()
            .any(|prefix| self.payload.starts_with(prefix))
    }

    pub fn involves_port(&self, port: u16) -> bool {
        self.source_port == port || self.destination_port == port
    }
}
