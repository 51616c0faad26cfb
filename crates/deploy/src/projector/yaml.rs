//! Line-oriented YAML editing that keeps anchors, aliases, comments and key order.
//!
//! Parsing into `serde_yaml::Value` and writing it back would resolve every alias and
//! drop every comment of the seed file, so edits are made on the text and the result is
//! re-parsed only to prove it is still YAML.

use anyhow::{Context, Result, bail};

/// A scalar or flow value written by [`YamlDocument::set_path`].
#[derive(Debug, Clone, PartialEq)]
pub enum YamlValue {
    Str(String),
    Bool(bool),
    Int(u128),
    /// JSON is valid YAML flow syntax, which is how sequences are written.
    Flow(serde_json::Value),
}

impl YamlValue {
    fn render(&self) -> String {
        match self {
            YamlValue::Str(s) => double_quoted(s),
            YamlValue::Bool(b) => b.to_string(),
            YamlValue::Int(i) => i.to_string(),
            YamlValue::Flow(value) => value.to_string(),
        }
    }
}

impl From<&str> for YamlValue {
    fn from(value: &str) -> Self {
        YamlValue::Str(value.to_string())
    }
}

impl From<bool> for YamlValue {
    fn from(value: bool) -> Self {
        YamlValue::Bool(value)
    }
}

impl From<u128> for YamlValue {
    fn from(value: u128) -> Self {
        YamlValue::Int(value)
    }
}

/// Location of an anchored scalar in the text.
struct ScalarSpan {
    start: usize,
    end: usize,
    quote: Option<char>,
}

#[derive(Debug, Clone)]
pub struct YamlDocument {
    text: String,
}

impl YamlDocument {
    pub fn parse(text: impl Into<String>) -> Result<Self> {
        let document = Self { text: text.into() };
        document.validate()?;
        Ok(document)
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }

    /// Check that the edited text still parses.
    pub fn validate(&self) -> Result<()> {
        serde_yaml::from_str::<serde_yaml::Value>(&self.text)
            .map(|_| ())
            .context("Edited document is no longer valid YAML")
    }

    /// Unquoted value of the scalar carrying `&anchor`.
    pub fn anchor_value(&self, anchor: &str) -> Option<String> {
        let span = self.find_anchor(anchor)?;
        let raw = &self.text[span.start..span.end];
        Some(match span.quote {
            Some(_) => raw[1..raw.len() - 1].to_string(),
            None => raw.to_string(),
        })
    }

    /// Replace the scalar carrying `&anchor`, keeping the anchor and its quoting style.
    /// Every alias of the anchor follows automatically.
    pub fn set_anchor_value(&mut self, anchor: &str, value: &str) -> Result<()> {
        let span = self
            .find_anchor(anchor)
            .with_context(|| format!("Anchor &{anchor} not found"))?;
        let rendered = match span.quote {
            Some('\'') => format!("'{}'", value.replace('\'', "''")),
            Some(_) => double_quoted(value),
            None => value.to_string(),
        };
        self.text.replace_range(span.start..span.end, &rendered);
        Ok(())
    }

    fn find_anchor(&self, anchor: &str) -> Option<ScalarSpan> {
        let needle = format!("&{anchor}");
        let mut line_start = 0;
        for line in self.text.split_inclusive('\n') {
            let line_end = line_start + line.strip_suffix('\n').unwrap_or(line).len();
            if let Some(at) = anchor_in_line(&self.text[line_start..line_end], &needle) {
                let after = line_start + at + needle.len();
                let rest = &self.text[after..line_end];
                let value_start = after + (rest.len() - rest.trim_start().len());
                return scalar_span(&self.text, value_start, line_end);
            }
            line_start += line.len();
        }
        None
    }

    /// Set the mapping entry at `path`, creating missing keys. The last element is the
    /// key being written; an existing value, including a nested block, is replaced.
    pub fn set_path(&mut self, path: &[&str], value: YamlValue) -> Result<()> {
        let Some((key, parents)) = path.split_last() else {
            bail!("Empty YAML path");
        };
        let mut lines: Vec<String> = self.text.lines().map(str::to_string).collect();

        let mut region = Region {
            parent_indent: None,
            start: 0,
            end: lines.len(),
        };
        for parent in parents {
            region = match region.find_key(&lines, parent) {
                Some(index) => {
                    open_inline_empty_map(&mut lines[index]);
                    region.child(&lines, index)
                }
                None => {
                    let indent = region.child_indent(&lines);
                    let at = region.insert_position(&lines);
                    lines.insert(at, format!("{}{parent}:", " ".repeat(indent)));
                    region.child(&lines, at)
                }
            };
        }

        let rendered = value.render();
        match region.find_key(&lines, key) {
            Some(index) => {
                let indent = indent_of(&lines[index]);
                let nested = region.child(&lines, index);
                lines.drain(nested.start..nested.end);
                lines[index] = format!("{}{key}: {rendered}", " ".repeat(indent));
            }
            None => {
                let indent = region.child_indent(&lines);
                let at = region.insert_position(&lines);
                lines.insert(at, format!("{}{key}: {rendered}", " ".repeat(indent)));
            }
        }

        let trailing_newline = self.text.ends_with('\n');
        self.text = lines.join("\n");
        if trailing_newline {
            self.text.push('\n');
        }
        Ok(())
    }
}

/// Lines `start..end` hold the children of a mapping key indented at `parent_indent`.
struct Region {
    parent_indent: Option<usize>,
    start: usize,
    end: usize,
}

impl Region {
    fn content_lines<'a>(&self, lines: &'a [String]) -> impl Iterator<Item = (usize, &'a String)> {
        let start = self.start;
        lines[start..self.end]
            .iter()
            .enumerate()
            .map(move |(i, line)| (start + i, line))
            .filter(|(_, line)| is_content(line))
    }

    fn child_indent(&self, lines: &[String]) -> usize {
        self.content_lines(lines)
            .map(|(_, line)| indent_of(line))
            .next()
            .unwrap_or_else(|| self.parent_indent.map_or(0, |indent| indent + 2))
    }

    fn find_key(&self, lines: &[String], key: &str) -> Option<usize> {
        let indent = self.child_indent(lines);
        self.content_lines(lines)
            .find(|(_, line)| indent_of(line) == indent && key_of(line) == Some(key))
            .map(|(index, _)| index)
    }

    /// Just after the last content line, so trailing blank lines and comments stay put.
    fn insert_position(&self, lines: &[String]) -> usize {
        self.content_lines(lines)
            .last()
            .map_or(self.start, |(index, _)| index + 1)
    }

    /// Region of the children of the key on line `index`.
    fn child(&self, lines: &[String], index: usize) -> Region {
        let indent = indent_of(&lines[index]);
        let mut end = index + 1;
        while end < lines.len() {
            let line = &lines[end];
            if is_content(line) && indent_of(line) <= indent && !is_sequence_item_at(line, indent) {
                break;
            }
            end += 1;
        }
        // Trailing blank lines and comments belong to whatever follows.
        while end > index + 1 && !is_content(&lines[end - 1]) {
            end -= 1;
        }
        Region {
            parent_indent: Some(indent),
            start: index + 1,
            end,
        }
    }
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start_matches(' ').len()
}

fn is_content(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && !trimmed.starts_with('#')
}

/// Block sequences may sit at the same indent as their parent key.
fn is_sequence_item_at(line: &str, indent: usize) -> bool {
    indent_of(line) == indent && line.trim_start().starts_with("- ")
}

fn key_of(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    let colon = trimmed.find(':')?;
    let key = &trimmed[..colon];
    let after = &trimmed[colon + 1..];
    if key.is_empty() || key.starts_with("- ") || !(after.is_empty() || after.starts_with([' ', '\t'])) {
        return None;
    }
    Some(key.trim_matches(|c| c == '"' || c == '\''))
}

/// `checks: {}` becomes `checks:` so block children can be appended.
fn open_inline_empty_map(line: &mut String) {
    if let Some(stripped) = line.trim_end().strip_suffix("{}") {
        let stripped = stripped.trim_end();
        if stripped.ends_with(':') {
            *line = stripped.to_string();
        }
    }
}

/// Offset of `needle` used as an anchor in `line`. Quoted text and the comment tail
/// never match.
fn anchor_in_line(line: &str, needle: &str) -> Option<usize> {
    let opens = |prev: Option<char>| {
        prev.is_none_or(|p| p.is_whitespace() || matches!(p, '[' | '{' | ','))
    };
    let mut chars = line.char_indices().peekable();
    let mut quote = None;
    let mut prev = None;
    while let Some((i, c)) = chars.next() {
        match (quote, c) {
            (Some('"'), '\\') => {
                chars.next();
            }
            (Some('\''), '\'') if chars.peek().is_some_and(|&(_, n)| n == '\'') => {
                chars.next();
            }
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') if opens(prev) => quote = Some(c),
            (None, '#') if prev.is_none_or(char::is_whitespace) => return None,
            (None, '&') if opens(prev) => {
                let bounded = line[i..]
                    .strip_prefix(needle)
                    .is_some_and(|rest| rest.starts_with([' ', '\t']));
                if bounded {
                    return Some(i);
                }
            }
            _ => {}
        }
        prev = Some(c);
    }
    None
}

fn scalar_span(text: &str, start: usize, line_end: usize) -> Option<ScalarSpan> {
    let rest = &text[start..line_end];
    let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'');
    let end = match quote {
        Some(q) => {
            let mut escaped = false;
            let close = rest
                .char_indices()
                .skip(1)
                .find(|&(_, c)| {
                    let hit = c == q && !escaped;
                    escaped = q == '"' && c == '\\' && !escaped;
                    hit
                })
                .map(|(i, _)| i)?;
            start + close + 1
        }
        None => {
            let comment = rest.find(" #").unwrap_or(rest.len());
            start + rest[..comment].trim_end().len()
        }
    };
    Some(ScalarSpan { start, end, quote })
}

fn double_quoted(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: &str = r#"# seed
parameters:
  - &agent "0x0000000000000000000000000000000000000001"
  - &agentProxy '0x0000000000000000000000000000000000000002'
  - &plain guardian-one # comment

l1:
  contracts:
    tokenBridge:
      address: *agent
      checks:
        isDepositsEnabled: false
        eip712Domain:
        - "0x0f"
        - old
        getGuardian: *plain
    empty:
      checks: {}
l2:
  rpcUrl: x
"#;

    fn parsed(document: &YamlDocument) -> serde_yaml::Value {
        serde_yaml::from_str(document.as_str()).unwrap()
    }

    #[test]
    fn test_anchor_in_comments_and_quotes_is_ignored() {
        let mut document = YamlDocument::parse(
            r#"# &agent "0x00000000000000000000000000000000000000ff"
notes: "see &agent value"
parameters:
  - plain # &agent commented
  - &agent "0x0000000000000000000000000000000000000001"
"#,
        )
        .unwrap();

        assert_eq!(
            document.anchor_value("agent").as_deref(),
            Some("0x0000000000000000000000000000000000000001")
        );
        document
            .set_anchor_value("agent", "0x00000000000000000000000000000000000000aa")
            .unwrap();
        let text = document.as_str();
        assert!(text.starts_with("# &agent \"0x00000000000000000000000000000000000000ff\""));
        assert!(text.contains("notes: \"see &agent value\""));
        assert!(text.contains("- &agent \"0x00000000000000000000000000000000000000aa\""));
    }

    #[test]
    fn test_anchor_in_line_scans_past_quoted_text() {
        assert_eq!(anchor_in_line("  - &a 1", "&a"), Some(4));
        assert_eq!(anchor_in_line("k: 'it''s &a x' # &a", "&a"), None);
        assert_eq!(anchor_in_line(r#"k: "\" &a" &a 2"#, "&a"), Some(11));
        assert_eq!(anchor_in_line("k: &ab 1", "&a"), None);
    }

    #[test]
    fn test_anchor_value_strips_quotes() {
        let document = YamlDocument::parse(SEED).unwrap();
        assert_eq!(
            document.anchor_value("agent").as_deref(),
            Some("0x0000000000000000000000000000000000000001")
        );
        assert_eq!(document.anchor_value("plain").as_deref(), Some("guardian-one"));
        assert_eq!(document.anchor_value("missing"), None);
    }

    #[test]
    fn test_anchor_name_must_match_exactly() {
        let document = YamlDocument::parse(SEED).unwrap();
        assert_eq!(
            document.anchor_value("agentProxy").as_deref(),
            Some("0x0000000000000000000000000000000000000002")
        );
    }

    #[test]
    fn test_set_anchor_value_keeps_aliases_and_comments() {
        let mut document = YamlDocument::parse(SEED).unwrap();
        document.set_anchor_value("agent", "0xAA").unwrap();
        document.set_anchor_value("agentProxy", "0xBB").unwrap();
        document.set_anchor_value("plain", "guardian-two").unwrap();

        let text = document.as_str();
        assert!(text.contains("- &agent \"0xAA\""));
        assert!(text.contains("- &agentProxy '0xBB'"));
        assert!(text.contains("- &plain guardian-two # comment"));
        assert!(text.contains("address: *agent"));
        assert!(text.starts_with("# seed"));

        let value = parsed(&document);
        assert_eq!(value["l1"]["contracts"]["tokenBridge"]["address"], "0xAA");
        assert_eq!(
            value["l1"]["contracts"]["tokenBridge"]["checks"]["getGuardian"],
            "guardian-two"
        );
    }

    #[test]
    fn test_set_anchor_value_missing_anchor() {
        let mut document = YamlDocument::parse(SEED).unwrap();
        assert!(document.set_anchor_value("nope", "0x1").is_err());
    }

    #[test]
    fn test_set_path_replaces_existing_scalar() {
        let mut document = YamlDocument::parse(SEED).unwrap();
        document
            .set_path(
                &["l1", "contracts", "tokenBridge", "checks", "isDepositsEnabled"],
                true.into(),
            )
            .unwrap();
        document.validate().unwrap();
        let value = parsed(&document);
        assert_eq!(
            value["l1"]["contracts"]["tokenBridge"]["checks"]["isDepositsEnabled"],
            true
        );
    }

    #[test]
    fn test_set_path_replaces_nested_block() {
        let mut document = YamlDocument::parse(SEED).unwrap();
        let domain = serde_json::json!(["0x0f", "stETH", "2", 10, []]);
        document
            .set_path(
                &["l1", "contracts", "tokenBridge", "checks", "eip712Domain"],
                YamlValue::Flow(domain),
            )
            .unwrap();

        assert!(!document.as_str().contains("- old"));
        let value = parsed(&document);
        let checks = &value["l1"]["contracts"]["tokenBridge"]["checks"];
        assert_eq!(checks["eip712Domain"][1], "stETH");
        assert_eq!(checks["eip712Domain"][3], 10);
        assert_eq!(checks["getGuardian"], "guardian-one");
    }

    #[test]
    fn test_set_path_appends_new_key_at_child_indent() {
        let mut document = YamlDocument::parse(SEED).unwrap();
        document
            .set_path(
                &["l1", "contracts", "tokenBridge", "checks", "getDelay"],
                YamlValue::Int(86400),
            )
            .unwrap();
        assert!(document.as_str().contains("\n        getDelay: 86400\n"));
        let value = parsed(&document);
        assert_eq!(
            value["l1"]["contracts"]["tokenBridge"]["checks"]["getDelay"],
            86400
        );
    }

    #[test]
    fn test_set_path_opens_inline_empty_map() {
        let mut document = YamlDocument::parse(SEED).unwrap();
        document
            .set_path(&["l1", "contracts", "empty", "checks", "name"], "Token".into())
            .unwrap();
        let value = parsed(&document);
        assert_eq!(value["l1"]["contracts"]["empty"]["checks"]["name"], "Token");
        assert_eq!(value["l2"]["rpcUrl"], "x");
    }

    #[test]
    fn test_set_path_creates_missing_parents() {
        let mut document = YamlDocument::parse(SEED).unwrap();
        document
            .set_path(&["l2", "contracts", "oracle", "checks", "paused"], false.into())
            .unwrap();
        let value = parsed(&document);
        assert_eq!(value["l2"]["contracts"]["oracle"]["checks"]["paused"], false);
        assert_eq!(value["l2"]["rpcUrl"], "x");
    }

    #[test]
    fn test_strings_are_escaped() {
        let mut document = YamlDocument::parse("a:\n  b: 1\n").unwrap();
        document
            .set_path(&["a", "b"], YamlValue::Str("say \"hi\"".to_string()))
            .unwrap();
        let value = parsed(&document);
        assert_eq!(value["a"]["b"], "say \"hi\"");
    }
}
