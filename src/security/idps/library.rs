use super::rules::{Rule, RuleAction, RuleDefinition, RuleError};
use serde::Serialize;
use std::fmt;
use std::path::Path;

const SNIPPET_CHARS: usize = 64;

// 既定のシグネチャ (名前, 説明, 正規表現)
const DEFAULT_SIGNATURES: [(&str, &str, &str); 11] = [
    ("sql-injection-union-select", "UNION SELECT によるSQLインジェクション", r"(?i)union\s+(?:all\s+)?select"),
    ("sql-injection-tautology", "OR 1=1 型の恒真条件", r"(?i)(?:'\s*|\d\s+)or\s+[\d']+\s*=\s*[\d']+"),
    ("sql-injection-stacked-query", "セミコロンで連結された破壊的クエリ", r"(?i);\s*(?:drop|delete|insert|update|shutdown)\s"),
    ("sql-injection-time-based", "時間差を利用したブラインドSQLインジェクション", r"(?i)(?:pg_sleep|sleep|benchmark)\s*\("),
    ("sql-injection-schema", "スキーマ情報の列挙", r"(?i)information_schema"),
    ("xss-script-tag", "scriptタグの挿入", r"(?i)<\s*script[^>]*>"),
    ("xss-event-handler", "イベントハンドラ属性の挿入", r"(?i)\bon(?:error|load|click|mouseover|focus)\s*="),
    ("xss-javascript-uri", "javascript: URI", r"(?i)javascript\s*:"),
    ("path-traversal", "多段のディレクトリトラバーサル", r"(?:\.\./|\.\.\\){2,}"),
    ("sensitive-file-access", "機密ファイルへのアクセス", r"(?i)/etc/(?:passwd|shadow)"),
    ("command-injection", "シェルコマンドの連結", r"(?:;|\||&&|\$\(|`)\s*(?:cat|ls|id|whoami|uname|wget|curl|nc|bash|sh)\b"),
];

// 検査対象の入力の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    Path,
    Body,
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputKind::Path => write!(f, "path"),
            InputKind::Body => write!(f, "body"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetectionResult {
    pub rule_name: String,
    pub action: RuleAction,
    pub input_kind: InputKind,
    // 最初に一致した位置 (バイトオフセット)
    pub offset: usize,
    pub snippet: String,
}

/// 名前付きシグネチャの集合。
///
/// 構築後は読み取り専用で、`detect_all` は状態を変更しないため
/// `Arc` で複数のパイプラインから共有できる。
#[derive(Debug, Clone, Default)]
pub struct RuleLibrary {
    rules: Vec<Rule>,
}

impl RuleLibrary {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn with_default_rules() -> Result<Self, RuleError> {
        let mut library = Self::new();
        for (name, description, pattern) in DEFAULT_SIGNATURES {
            library.add_rule(Rule::pattern(name, pattern)?.with_description(description));
        }
        Ok(library)
    }

    pub fn from_definitions(definitions: Vec<RuleDefinition>) -> Result<Self, RuleError> {
        let mut library = Self::new();
        library.extend_from_definitions(definitions)?;
        Ok(library)
    }

    pub fn from_json(json: &str) -> Result<Self, RuleError> {
        let definitions: Vec<RuleDefinition> = serde_json::from_str(json)?;
        Self::from_definitions(definitions)
    }

    pub fn extend_from_definitions(&mut self, definitions: Vec<RuleDefinition>) -> Result<(), RuleError> {
        for definition in definitions {
            self.add_rule(Rule::try_from(definition)?);
        }
        Ok(())
    }

    pub fn extend_from_file(&mut self, path: &Path) -> Result<(), RuleError> {
        let content = std::fs::read_to_string(path)?;
        let definitions: Vec<RuleDefinition> = serde_json::from_str(&content)?;
        self.extend_from_definitions(definitions)
    }

    // 評価順は登録順
    pub fn add_rule(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    pub fn remove_rule(&mut self, name: &str) {
        self.rules.retain(|r| r.name != name);
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 全ルールを評価し、一致したルールごとに1件の結果を返す。
    pub fn detect_all(&self, text: &str, input_kind: InputKind) -> Vec<DetectionResult> {
        self.rules
            .iter()
            .filter_map(|rule| {
                rule.find(text).map(|range| DetectionResult {
                    rule_name: rule.name.clone(),
                    action: rule.action,
                    input_kind,
                    offset: range.start,
                    snippet: text[range].chars().take(SNIPPET_CHARS).collect(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn union_library() -> RuleLibrary {
        let mut library = RuleLibrary::new();
        library.add_rule(Rule::literal("union-select", "UNION SELECT").unwrap());
        library
    }

    #[test]
    fn union_select_is_flagged() {
        let library = union_library();
        let results = library.detect_all("id=1 UNION SELECT password FROM users", InputKind::Path);

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].rule_name, "union-select");
        assert_eq!(results[0].input_kind, InputKind::Path);
        assert_eq!(results[0].offset, 5);
        assert_eq!(results[0].snippet, "UNION SELECT");

        assert!(library.detect_all("id=1", InputKind::Path).is_empty());
    }

    #[test]
    fn detect_all_is_pure() {
        let library = RuleLibrary::with_default_rules().unwrap();
        let input = "q=<script>alert(1)</script>&id=1' OR '1'='1";
        let first = library.detect_all(input, InputKind::Body);
        let second = library.detect_all(input, InputKind::Body);
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn one_result_per_rule_in_insertion_order() {
        let mut library = RuleLibrary::new();
        library.add_rule(Rule::literal("b-rule", "b").unwrap());
        library.add_rule(Rule::literal("a-rule", "a").unwrap());

        let results = library.detect_all("a b a b a b", InputKind::Body);
        let names: Vec<&str> = results.iter().map(|r| r.rule_name.as_str()).collect();
        assert_eq!(names, vec!["b-rule", "a-rule"]);
        assert_eq!(results[0].offset, 2);
        assert_eq!(results[1].offset, 0);
    }

    #[test]
    fn default_rules_cover_common_attacks() {
        let library = RuleLibrary::with_default_rules().unwrap();
        assert_eq!(library.len(), DEFAULT_SIGNATURES.len());

        let hits = |text: &str| -> Vec<String> {
            library
                .detect_all(text, InputKind::Path)
                .into_iter()
                .map(|r| r.rule_name)
                .collect()
        };

        assert!(hits("/item?id=1 union all select null").contains(&"sql-injection-union-select".to_string()));
        assert!(hits("/login?u=admin' or 1=1").contains(&"sql-injection-tautology".to_string()));
        assert!(hits("/../../../etc/passwd").contains(&"path-traversal".to_string()));
        assert!(hits("/ping?host=1;cat /etc/hosts").contains(&"command-injection".to_string()));
        assert!(hits("/index.html?page=2").is_empty());
    }

    #[test]
    fn snippet_is_bounded() {
        let mut library = RuleLibrary::new();
        library.add_rule(Rule::pattern("long", "a+").unwrap());
        let input = "a".repeat(500);
        let results = library.detect_all(&input, InputKind::Body);
        assert_eq!(results[0].snippet.len(), SNIPPET_CHARS);
    }

    #[test]
    fn load_from_json_and_remove() {
        let json = r#"[
            { "name": "first", "matcher": { "type": "literal", "text": "DROP TABLE" } },
            { "name": "second", "matcher": { "type": "pattern", "pattern": "(?i)xp_cmdshell" }, "action": "log" }
        ]"#;
        let mut library = RuleLibrary::from_json(json).unwrap();
        assert_eq!(library.len(), 2);

        let results = library.detect_all("exec XP_CMDSHELL 'dir'", InputKind::Body);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].action, RuleAction::Log);

        library.remove_rule("second");
        assert_eq!(library.len(), 1);
        assert!(RuleLibrary::from_json("{").is_err());
    }

    #[test]
    fn detection_result_serializes() {
        let library = union_library();
        let result = &library.detect_all("x UNION SELECT y", InputKind::Body)[0];
        let json = serde_json::to_string(result).unwrap();
        assert!(json.contains(r#""input_kind":"body""#));
        assert!(json.contains(r#""action":"alert""#));
    }
}
