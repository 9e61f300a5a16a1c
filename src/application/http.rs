// HTTP/1.x メッセージのデコード
//
// 1つのTCPセグメントに収まったメッセージだけを扱う。
// チャンク転送の再構築は行わず、空行以降をそのままボディとする。

use log::debug;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

// HTTPではないと判定した理由 (致命的なエラーではなく分類の結果)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HttpParseError {
    #[error("開始行がありません")]
    MissingStartLine,

    #[error("開始行がUTF-8ではありません")]
    InvalidEncoding,

    #[error("開始行の形式が不正です: {0}")]
    MalformedStartLine(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Other(String),
}

impl From<&str> for HttpMethod {
    fn from(token: &str) -> Self {
        match token {
            "GET" => HttpMethod::Get,
            "POST" => HttpMethod::Post,
            other => HttpMethod::Other(other.to_string()),
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Post => write!(f, "POST"),
            HttpMethod::Other(method) => write!(f, "{}", method),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartLine {
    Request {
        method: HttpMethod,
        path: String,
        version: String,
    },
    Response {
        version: String,
        status_code: u16,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpMessage {
    pub start_line: StartLine,
    // ヘッダー名は小文字で保持し、重複時は後勝ち
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpMessage {
    pub fn parse(data: &[u8]) -> Result<Self, HttpParseError> {
        let mut lines = Lines::new(data);

        let first = lines.next().ok_or(HttpParseError::MissingStartLine)?;
        if first.is_empty() {
            return Err(HttpParseError::MissingStartLine);
        }
        let first = std::str::from_utf8(first).map_err(|_| HttpParseError::InvalidEncoding)?;
        let start_line = parse_start_line(first)?;

        let mut headers = HashMap::new();
        let mut body = Vec::new();
        while let Some(line) = lines.next() {
            if line.is_empty() {
                body = lines.remainder().to_vec();
                break;
            }
            // 区切りの空行がないまま途切れた最終行は捨てる
            if !lines.last_line_terminated() {
                break;
            }
            // 開始行が正しければ壊れたヘッダー行は読み飛ばす
            match parse_header(line) {
                Some((name, value)) => {
                    headers.insert(name, value);
                }
                None => debug!("不正なヘッダー行を無視しました: {}", truncate_for_log(&String::from_utf8_lossy(line))),
            }
        }

        Ok(Self {
            start_line,
            headers,
            body,
        })
    }

    pub fn is_request(&self) -> bool {
        matches!(self.start_line, StartLine::Request { .. })
    }

    pub fn method(&self) -> Option<&HttpMethod> {
        match &self.start_line {
            StartLine::Request { method, .. } => Some(method),
            StartLine::Response { .. } => None,
        }
    }

    pub fn path(&self) -> Option<&str> {
        match &self.start_line {
            StartLine::Request { path, .. } => Some(path),
            StartLine::Response { .. } => None,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

fn parse_start_line(line: &str) -> Result<StartLine, HttpParseError> {
    let malformed = || HttpParseError::MalformedStartLine(truncate_for_log(line));
    let mut parts = line.splitn(3, ' ');
    let first = parts.next().ok_or_else(malformed)?;
    let second = parts.next().ok_or_else(malformed)?;
    let third = parts.next();

    if first.starts_with("HTTP/") {
        if second.len() != 3 || !second.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        let status_code = second.parse::<u16>().map_err(|_| malformed())?;
        return Ok(StartLine::Response {
            version: first.to_string(),
            status_code,
            reason: third.unwrap_or("").to_string(),
        });
    }

    let version = third.ok_or_else(malformed)?;
    if first.is_empty() || !first.bytes().all(|b| b.is_ascii_uppercase()) {
        return Err(malformed());
    }
    if second.is_empty() || !version.starts_with("HTTP/") || version.contains(' ') {
        return Err(malformed());
    }

    Ok(StartLine::Request {
        method: HttpMethod::from(first),
        path: second.to_string(),
        version: version.to_string(),
    })
}

fn parse_header(line: &[u8]) -> Option<(String, String)> {
    let text = String::from_utf8_lossy(line);
    let (name, value) = text.split_once(':')?;
    if name.is_empty() || name.contains(|c: char| c.is_ascii_whitespace()) {
        return None;
    }
    Some((name.to_ascii_lowercase(), value.trim().to_string()))
}

fn truncate_for_log(text: &str) -> String {
    text.chars().take(64).collect()
}

// CRLF と LF の両方を行末として扱う行イテレータ
struct Lines<'a> {
    data: &'a [u8],
    position: usize,
    terminated: bool,
}

impl<'a> Lines<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            position: 0,
            terminated: true,
        }
    }

    fn remainder(&self) -> &'a [u8] {
        &self.data[self.position..]
    }

    fn last_line_terminated(&self) -> bool {
        self.terminated
    }
}

impl<'a> Iterator for Lines<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.data.len() {
            return None;
        }
        let rest = &self.data[self.position..];
        let (line, advance, terminated) = match rest.iter().position(|&b| b == b'\n') {
            Some(end) => (&rest[..end], end + 1, true),
            None => (rest, rest.len(), false),
        };
        self.position += advance;
        self.terminated = terminated;
        Some(line.strip_suffix(b"\r").unwrap_or(line))
    }
}

/// `%XX` エスケープを復号する。`plus_as_space` はフォーム形式のボディ用。
pub fn percent_decode(text: &str, plus_as_space: bool) -> String {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let high = bytes.get(i + 1).and_then(|&b| hex_value(b));
                let low = bytes.get(i + 2).and_then(|&b| hex_value(b));
                match (high, low) {
                    (Some(high), Some(low)) => {
                        out.push(high << 4 | low);
                        i += 3;
                    }
                    _ => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' if plus_as_space => {
                out.push(b' ');
                i += 1;
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
