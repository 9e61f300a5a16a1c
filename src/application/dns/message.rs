use super::name::{decode_name, DomainName, NameKind};
use crate::core::error::{ParseError, ParseResult};
use std::fmt;

const LAYER: &str = "DNS";

pub const HEADER_SIZE: usize = 12;
// 資源データ長の上限 (ドメインバッファサイズ)
const MAX_RESOURCE_DATA_SIZE: usize = 256;
// TTL(4) + 資源データ長(2)
const RECORD_FIXED_SIZE: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    A,
    Ns,
    Cname,
    Soa,
    Ptr,
    Mx,
    Txt,
    Aaaa,
    Srv,
    Opt,
    Svcb,
    Https,
    Axfr,
    Any,
}

impl TryFrom<u16> for QueryType {
    type Error = ParseError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => QueryType::A,
            2 => QueryType::Ns,
            5 => QueryType::Cname,
            6 => QueryType::Soa,
            12 => QueryType::Ptr,
            15 => QueryType::Mx,
            16 => QueryType::Txt,
            28 => QueryType::Aaaa,
            33 => QueryType::Srv,
            41 => QueryType::Opt,
            64 => QueryType::Svcb,
            65 => QueryType::Https,
            252 => QueryType::Axfr,
            255 => QueryType::Any,
            other => {
                return Err(ParseError::InvalidField {
                    layer: LAYER,
                    field: "query_type",
                    value: other as u32,
                })
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryClass {
    In,
    Cs,
    Ch,
    Hs,
    None,
    Any,
}

impl TryFrom<u16> for QueryClass {
    type Error = ParseError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => QueryClass::In,
            2 => QueryClass::Cs,
            3 => QueryClass::Ch,
            4 => QueryClass::Hs,
            254 => QueryClass::None,
            255 => QueryClass::Any,
            other => {
                return Err(ParseError::InvalidField {
                    layer: LAYER,
                    field: "query_class",
                    value: other as u32,
                })
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Query,
    InverseQuery,
    Status,
    Notify,
    Update,
}

impl TryFrom<u8> for Opcode {
    type Error = ParseError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Opcode::Query,
            1 => Opcode::InverseQuery,
            2 => Opcode::Status,
            4 => Opcode::Notify,
            5 => Opcode::Update,
            other => {
                return Err(ParseError::InvalidField {
                    layer: LAYER,
                    field: "opcode",
                    value: other as u32,
                })
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyCode {
    NoError,
    FormatError,
    ServerFailure,
    NameError,
    NotImplemented,
    Refused,
    YxDomain,
    YxRrSet,
    NxRrSet,
    NotAuth,
    NotZone,
}

impl TryFrom<u8> for ReplyCode {
    type Error = ParseError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => ReplyCode::NoError,
            1 => ReplyCode::FormatError,
            2 => ReplyCode::ServerFailure,
            3 => ReplyCode::NameError,
            4 => ReplyCode::NotImplemented,
            5 => ReplyCode::Refused,
            6 => ReplyCode::YxDomain,
            7 => ReplyCode::YxRrSet,
            8 => ReplyCode::NxRrSet,
            9 => ReplyCode::NotAuth,
            10 => ReplyCode::NotZone,
            other => {
                return Err(ParseError::InvalidField {
                    layer: LAYER,
                    field: "reply_code",
                    value: other as u32,
                })
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DnsFlags {
    pub is_response: bool,
    pub opcode: Opcode,
    pub authoritative_answer: bool,
    pub truncated: bool,
    pub recursion_desired: bool,
    pub recursion_available: bool,
    pub authenticated_data: bool,
    pub checking_disabled: bool,
    pub reply_code: ReplyCode,
}

impl DnsFlags {
    fn parse(first: u8, second: u8) -> ParseResult<Self> {
        Ok(Self {
            is_response: first & 0x80 != 0,
            opcode: Opcode::try_from((first >> 3) & 0x0f)?,
            authoritative_answer: first & 0x04 != 0,
            truncated: first & 0x02 != 0,
            recursion_desired: first & 0x01 != 0,
            recursion_available: second & 0x80 != 0,
            authenticated_data: second & 0x20 != 0,
            checking_disabled: second & 0x10 != 0,
            reply_code: ReplyCode::try_from(second & 0x0f)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsQuestion {
    pub name: DomainName,
    pub query_type: QueryType,
    pub query_class: QueryClass,
    // メッセージ上で占めるバイト数
    pub size: usize,
}

impl DnsQuestion {
    pub fn parse(buffer: &[u8], offset: usize, kind: NameKind) -> ParseResult<Self> {
        let (name, name_size) = decode_name(buffer, offset, kind)?;
        let at = offset + name_size;
        let fixed = buffer
            .get(at..at + 4)
            .ok_or_else(|| ParseError::truncated(LAYER, at + 4, buffer.len()))?;

        Ok(Self {
            name,
            query_type: QueryType::try_from(u16::from_be_bytes([fixed[0], fixed[1]]))?,
            query_class: QueryClass::try_from(u16::from_be_bytes([fixed[2], fixed[3]]))?,
            size: name_size + 4,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsResourceRecord {
    pub query: DnsQuestion,
    pub ttl: u32,
    pub data_length: u16,
    pub data: DomainName,
    pub size: usize,
}

impl DnsResourceRecord {
    pub fn parse(buffer: &[u8], offset: usize) -> ParseResult<Self> {
        let query = DnsQuestion::parse(buffer, offset, NameKind::Domain)?;

        let at = offset + query.size;
        let fixed = buffer
            .get(at..at + RECORD_FIXED_SIZE)
            .ok_or_else(|| ParseError::truncated(LAYER, at + RECORD_FIXED_SIZE, buffer.len()))?;
        let ttl = u32::from_be_bytes([fixed[0], fixed[1], fixed[2], fixed[3]]);
        let data_length = u16::from_be_bytes([fixed[4], fixed[5]]);

        if data_length as usize >= MAX_RESOURCE_DATA_SIZE {
            return Err(ParseError::LengthMismatch {
                layer: LAYER,
                field: "data_length",
                value: data_length as usize,
            });
        }

        let data_start = at + RECORD_FIXED_SIZE;
        let data_end = data_start + data_length as usize;
        if data_end > buffer.len() {
            return Err(ParseError::truncated(LAYER, data_end, buffer.len()));
        }

        let kind = resource_data_kind(query.query_type, query.query_class)?;
        let expected = match kind {
            NameKind::Ipv4 => Some(4),
            NameKind::Ipv6 => Some(16),
            NameKind::Domain => None,
        };
        if let Some(expected) = expected {
            if data_length as usize != expected {
                return Err(ParseError::LengthMismatch {
                    layer: LAYER,
                    field: "data_length",
                    value: data_length as usize,
                });
            }
        }

        let (data, data_size) = decode_name(buffer, data_start, kind)?;
        if data_size > data_length as usize {
            return Err(ParseError::LengthMismatch {
                layer: LAYER,
                field: "data_length",
                value: data_length as usize,
            });
        }

        Ok(Self {
            size: query.size + RECORD_FIXED_SIZE + data_length as usize,
            query,
            ttl,
            data_length,
            data,
        })
    }
}

// (タイプ, クラス) の組から資源データの形式を決める
fn resource_data_kind(query_type: QueryType, query_class: QueryClass) -> ParseResult<NameKind> {
    match (query_type, query_class) {
        (QueryType::A, QueryClass::In) => Ok(NameKind::Ipv4),
        (QueryType::Cname, QueryClass::In) => Ok(NameKind::Domain),
        (QueryType::Aaaa, QueryClass::In) => Ok(NameKind::Ipv6),
        (query_type, query_class) => Err(ParseError::Unsupported {
            layer: LAYER,
            detail: format!("資源データ type={:?} class={:?}", query_type, query_class),
        }),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsMessage {
    pub transaction_id: u16,
    pub flags: DnsFlags,
    pub question_count: u16,
    pub answer_count: u16,
    pub authority_count: u16,
    pub additional_count: u16,
    pub questions: Vec<DnsQuestion>,
    pub answers: Vec<DnsResourceRecord>,
    pub authorities: Vec<DnsResourceRecord>,
    pub additionals: Vec<DnsResourceRecord>,
}

impl DnsMessage {
    pub fn parse(buffer: &[u8]) -> ParseResult<Self> {
        if buffer.len() < HEADER_SIZE {
            return Err(ParseError::truncated(LAYER, HEADER_SIZE, buffer.len()));
        }

        let read_u16 = |at: usize| u16::from_be_bytes([buffer[at], buffer[at + 1]]);
        let mut message = Self {
            transaction_id: read_u16(0),
            flags: DnsFlags::parse(buffer[2], buffer[3])?,
            question_count: read_u16(4),
            answer_count: read_u16(6),
            authority_count: read_u16(8),
            additional_count: read_u16(10),
            questions: Vec::new(),
            answers: Vec::new(),
            authorities: Vec::new(),
            additionals: Vec::new(),
        };

        // 標準クエリかつ正常応答の場合のみ各セクションを解析する
        if message.flags.opcode != Opcode::Query || message.flags.reply_code != ReplyCode::NoError {
            return Ok(message);
        }

        let mut offset = HEADER_SIZE;
        for _ in 0..message.question_count {
            let question = DnsQuestion::parse(buffer, offset, NameKind::Domain)?;
            offset += question.size;
            message.questions.push(question);
        }

        message.answers = parse_records(buffer, &mut offset, message.answer_count)?;
        message.authorities = parse_records(buffer, &mut offset, message.authority_count)?;
        message.additionals = parse_records(buffer, &mut offset, message.additional_count)?;

        Ok(message)
    }

    /// DNS over TCP のペイロード (2バイトの長さプレフィックス付き) を解析する
    pub fn parse_tcp_payload(payload: &[u8]) -> ParseResult<Self> {
        if payload.len() < 2 {
            return Err(ParseError::truncated(LAYER, 2, payload.len()));
        }
        let length = u16::from_be_bytes([payload[0], payload[1]]) as usize;
        let message = payload
            .get(2..2 + length)
            .ok_or_else(|| ParseError::truncated(LAYER, 2 + length, payload.len()))?;
        Self::parse(message)
    }
}

fn parse_records(buffer: &[u8], offset: &mut usize, count: u16) -> ParseResult<Vec<DnsResourceRecord>> {
    let mut records = Vec::with_capacity(count.min(64) as usize);
    for _ in 0..count {
        let record = DnsResourceRecord::parse(buffer, *offset)?;
        *offset += record.size;
        records.push(record);
    }
    Ok(records)
}

impl fmt::Display for DnsMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DNS {} id=0x{:04x}: questions:",
            if self.flags.is_response { "response" } else { "query" },
            self.transaction_id
        )?;
        for question in &self.questions {
            write!(f, " {}", question.name)?;
        }
        write!(f, " : answers:")?;
        for answer in &self.answers {
            write!(f, " {}=>{}", answer.query.name, answer.data)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    // テスト用の簡易エンコーダ
    struct MessageBuilder {
        bytes: Vec<u8>,
    }

    impl MessageBuilder {
        fn new(id: u16, flags: u16, counts: [u16; 4]) -> Self {
            let mut bytes = Vec::new();
            bytes.extend_from_slice(&id.to_be_bytes());
            bytes.extend_from_slice(&flags.to_be_bytes());
            for count in counts {
                bytes.extend_from_slice(&count.to_be_bytes());
            }
            Self { bytes }
        }

        fn name(mut self, name: &str) -> Self {
            for label in name.split('.') {
                self.bytes.push(label.len() as u8);
                self.bytes.extend_from_slice(label.as_bytes());
            }
            self.bytes.push(0);
            self
        }

        fn pointer(mut self, target: u16) -> Self {
            self.bytes.extend_from_slice(&(0xc000 | target).to_be_bytes());
            self
        }

        fn type_class(mut self, query_type: u16, query_class: u16) -> Self {
            self.bytes.extend_from_slice(&query_type.to_be_bytes());
            self.bytes.extend_from_slice(&query_class.to_be_bytes());
            self
        }

        fn record_data(mut self, ttl: u32, data: &[u8]) -> Self {
            self.bytes.extend_from_slice(&ttl.to_be_bytes());
            self.bytes.extend_from_slice(&(data.len() as u16).to_be_bytes());
            self.bytes.extend_from_slice(data);
            self
        }

        fn build(self) -> Vec<u8> {
            self.bytes
        }
    }

    const RESPONSE: u16 = 0x8180;

    fn cname_and_a_response(answer_count: u16) -> Vec<u8> {
        // 12: www.example.com (17バイト)
        MessageBuilder::new(0xbeef, RESPONSE, [1, answer_count, 0, 0])
            .name("www.example.com")
            .type_class(1, 1)
            .pointer(12)
            .type_class(5, 1)
            .record_data(300, &[0xc0, 16])
            .pointer(16)
            .type_class(1, 1)
            .record_data(60, &[93, 184, 216, 34])
            .build()
    }

    #[test]
    fn decode_question_and_answers() {
        let buffer = cname_and_a_response(2);
        let message = DnsMessage::parse(&buffer).unwrap();

        assert_eq!(message.transaction_id, 0xbeef);
        assert!(message.flags.is_response);
        assert!(message.flags.recursion_desired && message.flags.recursion_available);
        assert_eq!(message.flags.opcode, Opcode::Query);
        assert_eq!(message.questions.len(), 1);
        assert_eq!(message.answers.len(), 2);

        let question = &message.questions[0];
        assert_eq!(question.name.as_domain(), Some("www.example.com"));
        assert_eq!(question.query_type, QueryType::A);
        assert_eq!(question.size, 17 + 4);

        let cname = &message.answers[0];
        assert_eq!(cname.query.name.as_domain(), Some("www.example.com"));
        assert_eq!(cname.ttl, 300);
        assert_eq!(cname.data.as_domain(), Some("example.com"));
        assert_eq!(cname.size, 2 + 4 + 6 + 2);

        let a = &message.answers[1];
        assert_eq!(a.query.name.as_domain(), Some("example.com"));
        assert_eq!(a.data, DomainName::Ipv4(Ipv4Addr::new(93, 184, 216, 34)));

        let consumed: usize = HEADER_SIZE
            + message.questions.iter().map(|q| q.size).sum::<usize>()
            + message.answers.iter().map(|r| r.size).sum::<usize>();
        assert_eq!(consumed, buffer.len(), "各レコードのサイズ合計がメッセージ長と一致しません");
    }

    #[test]
    fn aaaa_record() {
        let address = Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1);
        let buffer = MessageBuilder::new(1, RESPONSE, [1, 1, 0, 1])
            .name("v6.example")
            .type_class(28, 1)
            .pointer(12)
            .type_class(28, 1)
            .record_data(30, &address.octets())
            .pointer(12)
            .type_class(1, 1)
            .record_data(30, &[10, 0, 0, 1])
            .build();

        let message = DnsMessage::parse(&buffer).unwrap();
        assert_eq!(message.answers[0].data, DomainName::Ipv6(address));
        assert_eq!(message.additionals.len(), 1);
        assert!(message.authorities.is_empty());
    }

    #[test]
    fn missing_answers_fail_whole_message() {
        let buffer = cname_and_a_response(3);
        assert!(
            DnsMessage::parse(&buffer).is_err(),
            "宣言数より少ない回答で成功してはいけません"
        );
    }

    #[test]
    fn short_header_fails() {
        assert!(matches!(
            DnsMessage::parse(&[0u8; 11]),
            Err(ParseError::Truncated { needed: 12, available: 11, .. })
        ));
    }

    #[test]
    fn invalid_opcode_fails() {
        // opcode = 3 (未割り当て)
        let buffer = MessageBuilder::new(1, 0x1800, [0, 0, 0, 0]).build();
        assert!(matches!(
            DnsMessage::parse(&buffer),
            Err(ParseError::InvalidField { field: "opcode", value: 3, .. })
        ));
    }

    #[test]
    fn invalid_reply_code_fails() {
        let buffer = MessageBuilder::new(1, 0x800f, [0, 0, 0, 0]).build();
        assert!(matches!(
            DnsMessage::parse(&buffer),
            Err(ParseError::InvalidField { field: "reply_code", value: 15, .. })
        ));
    }

    #[test]
    fn error_reply_skips_sections() {
        // NXDOMAIN: セクションは解析されない
        let buffer = MessageBuilder::new(7, 0x8183, [1, 0, 1, 0])
            .name("missing.example")
            .type_class(1, 1)
            .build();
        let message = DnsMessage::parse(&buffer).unwrap();
        assert_eq!(message.flags.reply_code, ReplyCode::NameError);
        assert_eq!(message.question_count, 1);
        assert!(message.questions.is_empty());
    }

    #[test]
    fn non_standard_opcode_skips_sections() {
        let buffer = MessageBuilder::new(7, 0x2000, [5, 5, 5, 5]).build();
        let message = DnsMessage::parse(&buffer).unwrap();
        assert_eq!(message.flags.opcode, Opcode::Notify);
        assert!(message.questions.is_empty() && message.answers.is_empty());
    }

    #[test]
    fn unsupported_record_type_fails() {
        let buffer = MessageBuilder::new(1, RESPONSE, [1, 1, 0, 0])
            .name("example.com")
            .type_class(15, 1)
            .pointer(12)
            .type_class(15, 1)
            .record_data(60, &[0, 10, 0xc0, 12])
            .build();
        let error = DnsMessage::parse(&buffer).unwrap_err();
        assert!(matches!(error, ParseError::Unsupported { .. }));
    }

    #[test]
    fn unknown_question_type_fails() {
        let buffer = MessageBuilder::new(1, 0x0100, [1, 0, 0, 0])
            .name("example.com")
            .type_class(999, 1)
            .build();
        assert!(matches!(
            DnsMessage::parse(&buffer),
            Err(ParseError::InvalidField { field: "query_type", .. })
        ));
    }

    #[test]
    fn a_record_with_wrong_length_fails() {
        let buffer = MessageBuilder::new(1, RESPONSE, [0, 1, 0, 0])
            .name("example.com")
            .type_class(1, 1)
            .record_data(60, &[1, 2, 3])
            .build();
        assert!(matches!(
            DnsMessage::parse(&buffer),
            Err(ParseError::LengthMismatch { field: "data_length", value: 3, .. })
        ));
    }

    #[test]
    fn record_data_past_end_fails() {
        let mut buffer = MessageBuilder::new(1, RESPONSE, [0, 1, 0, 0])
            .name("example.com")
            .type_class(1, 1)
            .record_data(60, &[1, 2, 3, 4])
            .build();
        buffer.truncate(buffer.len() - 2);
        assert!(matches!(DnsMessage::parse(&buffer), Err(ParseError::Truncated { .. })));
    }

    #[test]
    fn cyclic_question_name_fails() {
        let buffer = MessageBuilder::new(1, 0x0100, [1, 0, 0, 0])
            .pointer(12)
            .type_class(1, 1)
            .build();
        assert!(matches!(DnsMessage::parse(&buffer), Err(ParseError::LoopGuard { .. })));
    }

    #[test]
    fn tcp_length_prefix() {
        let message = cname_and_a_response(2);
        let mut payload = (message.len() as u16).to_be_bytes().to_vec();
        payload.extend_from_slice(&message);

        let decoded = DnsMessage::parse_tcp_payload(&payload).unwrap();
        assert_eq!(decoded.answers.len(), 2);
        assert!(decoded.to_string().contains("example.com=>93.184.216.34"));

        payload.pop();
        assert!(DnsMessage::parse_tcp_payload(&payload).is_err());
    }
}
