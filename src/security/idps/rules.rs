use regex::Regex;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("ルールファイルの読み込みに失敗しました: {0}")]
    Io(#[from] std::io::Error),

    #[error("ルール定義の解析に失敗しました: {0}")]
    Json(#[from] serde_json::Error),

    #[error("ルール {name} の正規表現が不正です: {source}")]
    Pattern {
        name: String,
        #[source]
        source: regex::Error,
    },

    #[error("ルール {0} のパターンが空です")]
    EmptyPattern(String),
}

// 検知は通知のみ (遮断はしない)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    #[default]
    Alert,
    Log,
}

#[derive(Debug, Clone)]
pub enum Matcher {
    Literal {
        text: String,
        case_insensitive: bool,
    },
    Pattern(Regex),
}

impl Matcher {
    // 最初に一致した範囲を返す
    fn find(&self, input: &str) -> Option<Range<usize>> {
        match self {
            Matcher::Literal {
                text,
                case_insensitive: false,
            } => input.find(text.as_str()).map(|start| start..start + text.len()),
            Matcher::Literal {
                text,
                case_insensitive: true,
            } => {
                // ASCIIの小文字化はバイト位置を変えない
                let haystack = input.to_ascii_lowercase();
                let needle = text.to_ascii_lowercase();
                haystack.find(&needle).map(|start| start..start + needle.len())
            }
            Matcher::Pattern(regex) => regex.find(input).map(|m| m.range()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub name: String,
    pub description: String,
    pub matcher: Matcher,
    pub action: RuleAction,
}

impl Rule {
    pub fn literal(name: &str, text: &str) -> Result<Self, RuleError> {
        Self::from_matcher(
            name,
            Matcher::Literal {
                text: text.to_string(),
                case_insensitive: false,
            },
        )
    }

    pub fn literal_ignore_case(name: &str, text: &str) -> Result<Self, RuleError> {
        Self::from_matcher(
            name,
            Matcher::Literal {
                text: text.to_string(),
                case_insensitive: true,
            },
        )
    }

    pub fn pattern(name: &str, pattern: &str) -> Result<Self, RuleError> {
        let regex = Regex::new(pattern).map_err(|source| RuleError::Pattern {
            name: name.to_string(),
            source,
        })?;
        Self::from_matcher(name, Matcher::Pattern(regex))
    }

    fn from_matcher(name: &str, matcher: Matcher) -> Result<Self, RuleError> {
        let empty = match &matcher {
            Matcher::Literal { text, .. } => text.is_empty(),
            Matcher::Pattern(regex) => regex.as_str().is_empty(),
        };
        if empty {
            return Err(RuleError::EmptyPattern(name.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            description: String::new(),
            matcher,
            action: RuleAction::Alert,
        })
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_action(mut self, action: RuleAction) -> Self {
        self.action = action;
        self
    }

    pub fn find(&self, input: &str) -> Option<Range<usize>> {
        self.matcher.find(input)
    }
}

// JSONのルールファイルの1エントリ
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub matcher: MatcherDefinition,
    #[serde(default)]
    pub action: RuleAction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MatcherDefinition {
    Literal {
        text: String,
        #[serde(default)]
        case_insensitive: bool,
    },
    Pattern {
        pattern: String,
    },
}

impl TryFrom<RuleDefinition> for Rule {
    type Error = RuleError;

    fn try_from(definition: RuleDefinition) -> Result<Self, Self::Error> {
        let rule = match &definition.matcher {
            MatcherDefinition::Literal {
                text,
                case_insensitive: false,
            } => Rule::literal(&definition.name, text)?,
            MatcherDefinition::Literal {
                text,
                case_insensitive: true,
            } => Rule::literal_ignore_case(&definition.name, text)?,
            MatcherDefinition::Pattern { pattern } => Rule::pattern(&definition.name, pattern)?,
        };
        Ok(rule
            .with_description(&definition.description)
            .with_action(definition.action))
    }
}
