use thiserror::Error;

// デコード失敗の分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    // バッファ長・オフセット・長さフィールドの不整合
    Structural,
    // 値がプロトコル上の有効範囲外
    Semantic,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("{layer}: バッファが短すぎます (必要: {needed}, 実際: {available})")]
    Truncated {
        layer: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("{layer}: オフセットが範囲外です (オフセット: {offset}, サイズ: {size})")]
    OffsetOutOfRange {
        layer: &'static str,
        offset: usize,
        size: usize,
    },

    #[error("{layer}: 長さフィールドが不正です ({field} = {value})")]
    LengthMismatch {
        layer: &'static str,
        field: &'static str,
        value: usize,
    },

    #[error("{layer}: 無効なフィールド値です ({field} = {value})")]
    InvalidField {
        layer: &'static str,
        field: &'static str,
        value: u32,
    },

    #[error("{layer}: 未サポートの組み合わせです ({detail})")]
    Unsupported {
        layer: &'static str,
        detail: String,
    },

    #[error("ドメイン名の展開が安全上限を超えました (ジャンプ: {jumps}, ラベル: {labels})")]
    LoopGuard { jumps: usize, labels: usize },
}

impl ParseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ParseError::InvalidField { .. } | ParseError::Unsupported { .. } => ErrorKind::Semantic,
            // ループガードは構造エラーとして扱う
            ParseError::Truncated { .. }
            | ParseError::OffsetOutOfRange { .. }
            | ParseError::LengthMismatch { .. }
            | ParseError::LoopGuard { .. } => ErrorKind::Structural,
        }
    }

    pub(crate) fn truncated(layer: &'static str, needed: usize, available: usize) -> Self {
        ParseError::Truncated {
            layer,
            needed,
            available,
        }
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("インターフェースが見つかりません: {0}")]
    InterfaceNotFound(String),

    #[error("未サポートのチャネルタイプです")]
    UnsupportedChannel,

    #[error("キャプチャエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("キャプチャファイルの読み込みに失敗しました: {0}")]
    PcapFile(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loop_guard_is_structural() {
        let error = ParseError::LoopGuard { jumps: 17, labels: 3 };
        assert_eq!(error.kind(), ErrorKind::Structural);
    }

    #[test]
    fn unsupported_is_semantic() {
        let error = ParseError::Unsupported {
            layer: "DNS",
            detail: "type=15 class=1".to_string(),
        };
        assert_eq!(error.kind(), ErrorKind::Semantic);
        assert!(error.to_string().contains("type=15"));
    }
}
