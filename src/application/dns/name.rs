// DNS圧縮ドメイン名のデコード
//
// 名前は長さ付きラベルの列で、長さ0のラベルか2バイトの圧縮ポインタ
// (上位2ビットが立ったもの) で終わる。ポインタは同じメッセージ内の
// 別の位置に読み込みを移す。呼び出し側のカーソルに加算されるのは
// 最初のポインタまでのバイト数だけ。

use crate::core::error::{ParseError, ParseResult};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

const LAYER: &str = "DNS名";

// 連鎖ポインタの追跡回数の上限 (循環ポインタ対策)
pub const MAX_POINTER_JUMPS: usize = 16;
pub const MAX_LABELS: usize = 128;
pub const MAX_NAME_LENGTH: usize = 255;

const POINTER_MASK: u8 = 0xc0;
const SEPARATOR: char = '.';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Domain,
    Ipv4,
    Ipv6,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainName {
    Domain(String),
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
}

impl DomainName {
    pub fn as_domain(&self) -> Option<&str> {
        match self {
            DomainName::Domain(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainName::Domain(name) if name.is_empty() => write!(f, "<root>"),
            DomainName::Domain(name) => write!(f, "{}", name),
            DomainName::Ipv4(addr) => write!(f, "{}", addr),
            DomainName::Ipv6(addr) => write!(f, "{}", addr),
        }
    }
}

/// `offset` から名前またはアドレスを読み取り、
/// 元の位置から消費したバイト数と一緒に返す。
pub fn decode_name(buffer: &[u8], offset: usize, kind: NameKind) -> ParseResult<(DomainName, usize)> {
    if offset >= buffer.len() {
        return Err(ParseError::OffsetOutOfRange {
            layer: LAYER,
            offset,
            size: buffer.len(),
        });
    }

    match kind {
        NameKind::Domain => decode_domain(buffer, offset).map(|(name, size)| (DomainName::Domain(name), size)),
        NameKind::Ipv4 => {
            let octets: [u8; 4] = read_fixed(buffer, offset)?;
            Ok((DomainName::Ipv4(Ipv4Addr::from(octets)), octets.len()))
        }
        NameKind::Ipv6 => {
            let octets: [u8; 16] = read_fixed(buffer, offset)?;
            Ok((DomainName::Ipv6(Ipv6Addr::from(octets)), octets.len()))
        }
    }
}

fn read_fixed<const N: usize>(buffer: &[u8], offset: usize) -> ParseResult<[u8; N]> {
    let bytes = buffer
        .get(offset..offset + N)
        .ok_or_else(|| ParseError::truncated(LAYER, offset + N, buffer.len()))?;
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    Ok(out)
}

fn decode_domain(buffer: &[u8], offset: usize) -> ParseResult<(String, usize)> {
    let mut name = String::new();
    let mut cursor = offset;
    // ジャンプ前のカーソル位置から消費したバイト数
    let mut consumed = 0usize;
    let mut jumped = false;
    let mut jumps = 0usize;
    let mut labels = 0usize;

    loop {
        let length = *buffer
            .get(cursor)
            .ok_or_else(|| ParseError::truncated(LAYER, cursor + 1, buffer.len()))?;

        match length & POINTER_MASK {
            POINTER_MASK => {
                let low = *buffer
                    .get(cursor + 1)
                    .ok_or_else(|| ParseError::truncated(LAYER, cursor + 2, buffer.len()))?;
                let target = (((length & !POINTER_MASK) as usize) << 8) | low as usize;
                if target >= buffer.len() {
                    return Err(ParseError::OffsetOutOfRange {
                        layer: LAYER,
                        offset: target,
                        size: buffer.len(),
                    });
                }

                jumps += 1;
                if jumps > MAX_POINTER_JUMPS {
                    return Err(ParseError::LoopGuard { jumps, labels });
                }
                if !jumped {
                    consumed += 2;
                    jumped = true;
                }
                cursor = target;
            }
            0x00 => {
                let length = length as usize;
                if length == 0 {
                    if !jumped {
                        consumed += 1;
                    }
                    return Ok((name, consumed));
                }

                labels += 1;
                if labels > MAX_LABELS {
                    return Err(ParseError::LoopGuard { jumps, labels });
                }

                let start = cursor + 1;
                let label = buffer
                    .get(start..start + length)
                    .ok_or_else(|| ParseError::truncated(LAYER, start + length, buffer.len()))?;

                if !name.is_empty() {
                    name.push(SEPARATOR);
                }
                name.push_str(&String::from_utf8_lossy(label));
                if name.len() > MAX_NAME_LENGTH {
                    return Err(ParseError::LengthMismatch {
                        layer: LAYER,
                        field: "name_length",
                        value: name.len(),
                    });
                }

                if !jumped {
                    consumed += length + 1;
                }
                cursor = start + length;
            }
            // 0x40/0x80 は拡張ラベル型 (未使用)
            other => {
                return Err(ParseError::InvalidField {
                    layer: LAYER,
                    field: "label_type",
                    value: other as u32,
                })
            }
        }
    }
}
