//! Reader for Valve's KeyValues ("VDF") text format.
//!
//! ```text
//! "AppState"
//! {
//!     "appid"     "440"
//!     "UserConfig" { "language" "english" }
//! }
//! ```
//!
//! Values are either strings or nested objects. Keys may be quoted or bare,
//! `//` starts a comment and `[$PLATFORM]` conditionals are ignored. A key
//! repeated with object values merges the objects; otherwise the last value
//! wins.

use crate::error::{GatewayError, GatewayResult};
use serde_json::{Map, Value};
use std::iter::Peekable;
use std::path::Path;
use std::str::Chars;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {message}")]
pub struct VdfError {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, PartialEq, Eq)]
enum Token {
    Str(String),
    Open,
    Close,
}

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.trim_start_matches('\u{feff}').chars().peekable(),
            line: 1,
        }
    }

    fn error(&self, message: impl Into<String>) -> VdfError {
        VdfError {
            line: self.line,
            message: message.into(),
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn skip_line(&mut self) {
        while let Some(c) = self.bump() {
            if c == '\n' {
                break;
            }
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>, VdfError> {
        loop {
            let Some(&c) = self.chars.peek() else {
                return Ok(None);
            };
            match c {
                c if c.is_whitespace() => {
                    self.bump();
                }
                '{' => {
                    self.bump();
                    return Ok(Some(Token::Open));
                }
                '}' => {
                    self.bump();
                    return Ok(Some(Token::Close));
                }
                '"' => {
                    self.bump();
                    return self.quoted().map(|s| Some(Token::Str(s)));
                }
                '[' => self.conditional()?,
                '/' => {
                    self.bump();
                    if self.chars.peek() == Some(&'/') {
                        self.skip_line();
                    } else {
                        return Ok(Some(Token::Str(self.bare(String::from("/")))));
                    }
                }
                _ => return Ok(Some(Token::Str(self.bare(String::new())))),
            }
        }
    }

    fn quoted(&mut self) -> Result<String, VdfError> {
        let start = self.line;
        let mut out = String::new();
        loop {
            match self.bump() {
                None => {
                    return Err(VdfError {
                        line: start,
                        message: "unterminated string".to_string(),
                    })
                }
                Some('"') => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('\\') => out.push('\\'),
                    Some('"') => out.push('"'),
                    Some(other) => {
                        out.push('\\');
                        out.push(other);
                    }
                    None => return Err(self.error("unterminated string")),
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn bare(&mut self, mut out: String) -> String {
        while let Some(&c) = self.chars.peek() {
            if c.is_whitespace() || matches!(c, '{' | '}' | '"' | '[') {
                break;
            }
            out.push(c);
            self.bump();
        }
        out
    }

    fn conditional(&mut self) -> Result<(), VdfError> {
        let start = self.line;
        while let Some(c) = self.bump() {
            if c == ']' {
                return Ok(());
            }
        }
        Err(VdfError {
            line: start,
            message: "unterminated conditional".to_string(),
        })
    }
}

fn insert(map: &mut Map<String, Value>, key: String, value: Value) {
    if let Value::Object(incoming) = value {
        if let Some(Value::Object(existing)) = map.get_mut(&key) {
            for (k, v) in incoming {
                insert(existing, k, v);
            }
            return;
        }
        map.insert(key, Value::Object(incoming));
    } else {
        map.insert(key, value);
    }
}

/// Deepest object nesting accepted. `serde_json::Value` drops and
/// serializes recursively, so deeper input is an error.
pub const MAX_DEPTH: usize = 128;

/// Parses a KeyValues document into a JSON object.
pub fn parse(input: &str) -> Result<Map<String, Value>, VdfError> {
    let mut lexer = Lexer::new(input);
    // Enclosing objects, each with the key the current object is stored under.
    let mut parents: Vec<(String, Map<String, Value>)> = Vec::new();
    let mut current = Map::new();
    loop {
        let key = match lexer.next_token()? {
            None if parents.is_empty() => return Ok(current),
            None => return Err(lexer.error("unexpected end of input, expected '}'")),
            Some(Token::Close) => {
                let Some((key, parent)) = parents.pop() else {
                    return Err(lexer.error("unexpected '}'"));
                };
                let child = std::mem::replace(&mut current, parent);
                insert(&mut current, key, Value::Object(child));
                continue;
            }
            Some(Token::Open) => return Err(lexer.error("expected key, found '{'")),
            Some(Token::Str(key)) => key,
        };
        match lexer.next_token()? {
            Some(Token::Str(value)) => insert(&mut current, key, Value::String(value)),
            Some(Token::Open) => {
                if parents.len() >= MAX_DEPTH {
                    return Err(lexer.error(format!(
                        "objects nested deeper than {} levels",
                        MAX_DEPTH
                    )));
                }
                parents.push((key, std::mem::take(&mut current)));
            }
            None | Some(Token::Close) => {
                return Err(lexer.error(format!("missing value for key \"{}\"", key)))
            }
        }
    }
}

/// Reads and parses a KeyValues file.
pub fn load(path: &Path) -> GatewayResult<Value> {
    let content = std::fs::read_to_string(path)
        .map_err(|err| GatewayError::Io(format!("{}: {}", path.display(), err)))?;
    let document = parse(&content)
        .map_err(|err| GatewayError::Vdf(format!("{}: {}", path.display(), err)))?;
    tracing::debug!(path = %path.display(), keys = document.len(), "Loaded vdf");
    Ok(Value::Object(document))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_parses_nested_document() {
        let doc = parse(
            r#"
            "AppState"
            {
                "appid"      "440"
                "name"       "Team Fortress 2"
                "UserConfig"
                {
                    "language"  "english"
                }
            }
            "#,
        )
        .unwrap();
        assert_eq!(
            Value::Object(doc),
            json!({"AppState": {
                "appid": "440",
                "name": "Team Fortress 2",
                "UserConfig": {"language": "english"}
            }})
        );
    }

    #[test]
    fn test_bare_tokens_comments_and_conditionals() {
        let doc = parse(
            "// header\nroot\n{\n  key value // trailing\n  path C:/games\n  flag \"1\" [$WIN32]\n}\n",
        )
        .unwrap();
        assert_eq!(
            Value::Object(doc),
            json!({"root": {"key": "value", "path": "C:/games", "flag": "1"}})
        );
    }

    #[test]
    fn test_escapes_in_quoted_strings() {
        let doc = parse(r#""k" "a\"b\\c\nd\q""#).unwrap();
        assert_eq!(doc["k"], "a\"b\\c\nd\\q");
    }

    #[test]
    fn test_repeated_objects_merge() {
        let doc = parse(r#""a" { "x" "1" } "a" { "y" "2" } "b" "1" "b" "2""#).unwrap();
        assert_eq!(
            Value::Object(doc),
            json!({"a": {"x": "1", "y": "2"}, "b": "2"})
        );
    }

    #[test]
    fn test_errors_report_line() {
        let err = parse("\"a\"\n{\n\"b\" \"c\"\n").unwrap_err();
        assert_eq!(err.line, 4);
        assert!(err.message.contains("expected '}'"));

        let err = parse("\"a\" }").unwrap_err();
        assert!(err.message.contains("missing value"));

        let err = parse("\"a\" \"unterminated").unwrap_err();
        assert_eq!(err.to_string(), "line 1: unterminated string");
    }

    #[test]
    fn test_nesting_depth_is_bounded() {
        let nested = |depth: usize| format!("{}{}", "a{".repeat(depth), "}".repeat(depth));

        let doc = parse(&nested(MAX_DEPTH)).unwrap();
        let mut level = &doc["a"];
        for _ in 1..MAX_DEPTH {
            level = &level["a"];
        }
        assert_eq!(level, &json!({}));

        let err = parse(&nested(MAX_DEPTH + 1)).unwrap_err();
        assert!(err.message.contains("nested deeper"));

        let err = parse(&"a{".repeat(200_000)).unwrap_err();
        assert!(err.message.contains("nested deeper"));
    }

    #[test]
    fn test_empty_input_is_empty_object() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("\u{feff}  // nothing\n").unwrap().is_empty());
    }

    #[test]
    fn test_load_maps_failures() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("appmanifest_440.acf");
        std::fs::write(&path, "\"AppState\" { \"appid\" \"440\" }").unwrap();
        assert_eq!(load(&path).unwrap()["AppState"]["appid"], "440");

        std::fs::write(&path, "\"AppState\" {").unwrap();
        assert!(matches!(load(&path), Err(GatewayError::Vdf(_))));
        assert!(matches!(
            load(&dir.path().join("missing.vdf")),
            Err(GatewayError::Io(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_parse_never_panics(input in "\\PC{0,200}") {
            let _ = parse(&input);
        }

        #[test]
        fn prop_flat_pairs_round_trip(
            pairs in proptest::collection::btree_map("[a-z]{1,8}", "[ -~&&[^\"\\\\]]{0,12}", 0..8)
        ) {
            let text: String = pairs
                .iter()
                .map(|(k, v)| format!("\"{}\" \"{}\"\n", k, v))
                .collect();
            let doc = parse(&text).unwrap();
            prop_assert_eq!(doc.len(), pairs.len());
            for (k, v) in &pairs {
                prop_assert_eq!(doc[k].as_str(), Some(v.as_str()));
            }
        }
    }
}
