//! YAML front matter and the Markdown clean-ups applied around translation.
//!
//! Rule documents open with an optional `---` delimited YAML block. The
//! block is parsed into an insertion-ordered mapping so rewritten documents
//! keep their original key order. Model output is scrubbed of regenerated
//! front matter and whole-document code fences before it is written.

use std::sync::LazyLock;

use regex::Regex;
use serde_yaml::{Mapping, Value};
use thiserror::Error;

/// Leading `---` block. Tolerates leading whitespace and a BOM.
static FRONT_MATTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\A\s*\x{FEFF}?---\n(.*?)\n---\n").expect("valid regex")
});

/// A document that is one single fenced block. The closing fence is
/// compared with the opening one after matching.
static WHOLE_FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s)\A\s*(?P<open>`{3,}|~{3,})(?P<lang>[a-zA-Z0-9+-]*)\s*\n(?P<body>.*)\n(?P<close>`{3,}|~{3,})\s*\z",
    )
    .expect("valid regex")
});

static SCALAR_OPEN_FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\A\s*(`{3,}|~{3,})[a-zA-Z0-9+-]*\s*\n").expect("valid regex")
});

static SCALAR_CLOSE_FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n(`{3,}|~{3,})\s*\z").expect("valid regex"));

static LINE_BREAK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\n\s*").expect("valid regex"));

/// Front matter that could not be read.
#[derive(Debug, Error)]
pub enum FrontMatterError {
    #[error("invalid YAML front matter: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("front matter is not a key/value mapping")]
    NotAMapping,
}

/// Parsed front matter, in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrontMatter(Mapping);

impl FrontMatter {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// String value of `key`; `None` when absent or not a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Inserts or overwrites `key`. An existing key keeps its position.
    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(Value::from(key), value.into());
    }

    /// `---\n<yaml>---\n`.
    pub fn render(&self) -> Result<String, FrontMatterError> {
        let yaml = serde_yaml::to_string(&self.0)?;
        Ok(format!("---\n{yaml}---\n"))
    }
}

/// Splits `md` into its front matter and body.
///
/// Without a leading block the front matter is empty and the body is all of
/// `md`. An empty block is an empty mapping.
pub fn split(md: &str) -> Result<(FrontMatter, &str), FrontMatterError> {
    let Some(caps) = FRONT_MATTER_RE.captures(md) else {
        return Ok((FrontMatter::default(), md));
    };
    let whole = caps.get(0).map_or(0, |m| m.end());
    let raw = caps.get(1).map_or("", |m| m.as_str());

    let fm = if raw.trim().is_empty() {
        FrontMatter::default()
    } else {
        match serde_yaml::from_str::<Value>(raw)? {
            Value::Mapping(map) => FrontMatter(map),
            Value::Null => FrontMatter::default(),
            _ => return Err(FrontMatterError::NotAMapping),
        }
    };
    Ok((fm, &md[whole..]))
}

/// Returns the body of a document that is entirely one fenced code block,
/// and whether unwrapping happened.
pub fn unwrap_code_fence(md: &str) -> (&str, bool) {
    if let Some(caps) = WHOLE_FENCE_RE.captures(md)
        && caps["open"] == caps["close"]
        && let Some(body) = caps.name("body")
    {
        return (body.as_str(), true);
    }
    (md, false)
}

/// Drops a leading front matter block the model may have produced.
pub fn strip_spurious(md: &str) -> &str {
    match FRONT_MATTER_RE.find(md) {
        Some(m) => &md[m.end()..],
        None => md,
    }
}

/// Normalises a translated one-line value (title, description).
///
/// Removes regenerated front matter and fences, folds line breaks into
/// spaces and drops one pair of surrounding quotes.
pub fn clean_scalar(s: &str) -> String {
    if s.is_empty() {
        return String::new();
    }
    let s = strip_spurious(s);
    let s = SCALAR_OPEN_FENCE_RE.replace(s, "");
    let s = SCALAR_CLOSE_FENCE_RE.replace(&s, "");
    let s = LINE_BREAK_RE.replace_all(&s, " ");
    let s = s.trim();

    let quoted = s.len() >= 2
        && (s.starts_with('\'') || s.starts_with('"'))
        && (s.ends_with('\'') || s.ends_with('"'));
    if quoted {
        s[1..s.len() - 1].trim().to_string()
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_reads_mapping_and_body() {
        let md = "---\ntitle: 코드 리뷰 규칙\nlang: kr\n---\n# 본문\n";
        let (fm, body) = split(md).unwrap();
        assert_eq!(fm.get_str("title"), Some("코드 리뷰 규칙"));
        assert_eq!(fm.get_str("lang"), Some("kr"));
        assert_eq!(body, "# 본문\n");
    }

    #[test]
    fn split_tolerates_bom_and_leading_blank_lines() {
        let md = "\n\u{feff}---\ndescription: x\n---\nbody";
        let (fm, body) = split(md).unwrap();
        assert_eq!(fm.get_str("description"), Some("x"));
        assert_eq!(body, "body");
    }

    #[test]
    fn split_without_front_matter_returns_whole_text() {
        let md = "# Title\n\n---\nnot front matter\n---\n";
        let (fm, body) = split(md).unwrap();
        assert!(fm.is_empty());
        assert_eq!(body, md);
    }

    #[test]
    fn split_rejects_broken_yaml() {
        let md = "---\ntitle: [unclosed\n---\nbody";
        assert!(matches!(split(md), Err(FrontMatterError::Yaml(_))));
    }

    #[test]
    fn split_rejects_non_mapping() {
        let md = "---\n- a\n- b\n---\nbody";
        assert!(matches!(split(md), Err(FrontMatterError::NotAMapping)));
    }

    #[test]
    fn render_keeps_key_order_and_parses_back() {
        let (mut fm, _) = split("---\nzeta: 1\nalpha: two\n---\n").unwrap();
        fm.insert("lang", "en");
        fm.insert("zeta", "replaced");
        let text = fm.render().unwrap();
        assert!(text.starts_with("---\n"));
        assert!(text.ends_with("---\n"));
        let zeta = text.find("zeta").unwrap();
        let alpha = text.find("alpha").unwrap();
        let lang = text.find("lang").unwrap();
        assert!(zeta < alpha && alpha < lang);

        let (back, body) = split(&text).unwrap();
        assert_eq!(back.get_str("zeta"), Some("replaced"));
        assert_eq!(back.get_str("lang"), Some("en"));
        assert_eq!(body, "");
    }

    #[test]
    fn unwraps_whole_document_fence() {
        let md = "```markdown\n---\ntitle: t\n---\n# Body\n```\n";
        let (inner, wrapped) = unwrap_code_fence(md);
        assert!(wrapped);
        assert_eq!(inner, "---\ntitle: t\n---\n# Body");

        let tilde = "~~~\ntext\n~~~";
        assert_eq!(unwrap_code_fence(tilde), ("text", true));
    }

    #[test]
    fn leaves_partial_or_mismatched_fences() {
        let md = "# Intro\n```rust\nfn main() {}\n```\n";
        assert_eq!(unwrap_code_fence(md), (md, false));

        let mismatched = "```\nbody\n~~~";
        assert_eq!(unwrap_code_fence(mismatched), (mismatched, false));
    }

    #[test]
    fn strips_regenerated_front_matter() {
        assert_eq!(strip_spurious("---\nlang: en\n---\n# Rules"), "# Rules");
        assert_eq!(strip_spurious("# Rules"), "# Rules");
    }

    #[test]
    fn clean_scalar_cases() {
        assert_eq!(clean_scalar("\"Code review rules\""), "Code review rules");
        assert_eq!(clean_scalar("```yaml\nCode review\n```"), "Code review");
        assert_eq!(clean_scalar("Code\n  review\nrules "), "Code review rules");
        assert_eq!(clean_scalar("---\ntitle: x\n---\nReview"), "Review");
        assert_eq!(clean_scalar(""), "");
        assert_eq!(clean_scalar("it's fine"), "it's fine");
    }
}
