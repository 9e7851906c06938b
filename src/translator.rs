//! Korean → English translation of one rule document.
//!
//! The translator builds the prompts, sends them through the [`Dispatcher`]
//! and reassembles the English document: the source front matter plus
//! provenance keys, translated `title` / `description`, translated body.

use std::path::Path;

use chrono::{FixedOffset, Offset, Utc};
use tracing::{debug, warn};

use crate::dispatch::{DispatchStats, Dispatcher};
use crate::error::BuildError;
use crate::fingerprint::{Fingerprint, SOURCE_SHA_KEY};
use crate::frontmatter;
use crate::gemini::{ContentGenerator, GenerateRequest};
use crate::git::CommitInfo;

/// `translated_at` is always written in KST.
const KST_OFFSET_SECS: i32 = 9 * 3600;

const SYSTEM_PROMPT: &str = "\
You are a professional technical translator (Korean → English).
Translate the Korean text into clear, concise, developer-friendly English.
Preserve exactly:
- Markdown structure: headings, tables, lists, links, images
- Code blocks and inline code (never translate code)
- Anchor links and IDs
Terminology:
- Apply the provided glossary strictly wherever it matches.
- Keep product and library names unchanged.
Formatting:
- Keep meaningful line breaks and spacing.
- Add no explanations or commentary.
Output:
- Output ONLY the translated Markdown body.
- Do NOT output YAML front matter (--- blocks).
- Do NOT wrap the output in code fences.
";

/// KR → EN term list, applied through the prompt in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Glossary(Vec<(String, String)>);

impl Glossary {
    /// Loads a JSON object of `"KR": "EN"` pairs.
    ///
    /// A missing file is an empty glossary; an unreadable one is logged and
    /// treated as empty.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        let parsed = std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|text| {
                serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(&text)
                    .map_err(|e| e.to_string())
            });
        match parsed {
            Ok(map) => {
                let mut terms = Vec::with_capacity(map.len());
                for (kr, en) in map {
                    match en {
                        serde_json::Value::String(en) => terms.push((kr, en)),
                        other => {
                            warn!(path = %path.display(), term = %kr, value = %other, stage = "glossary", "skipping non-string glossary entry");
                        }
                    }
                }
                debug!(path = %path.display(), terms = terms.len(), stage = "glossary", "glossary loaded");
                Self(terms)
            }
            Err(error) => {
                warn!(path = %path.display(), %error, stage = "glossary", "failed to parse glossary");
                Self::default()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `- KR → EN` lines, or `None` when the glossary is empty.
    fn lines(&self) -> Option<String> {
        if self.0.is_empty() {
            return None;
        }
        Some(
            self.0
                .iter()
                .map(|(kr, en)| format!("- {kr} → {en}"))
                .collect::<Vec<_>>()
                .join("\n"),
        )
    }
}

impl<const N: usize> From<[(&str, &str); N]> for Glossary {
    fn from(pairs: [(&str, &str); N]) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

pub struct Translator<G> {
    dispatcher: Dispatcher<G>,
    glossary: Glossary,
}

impl<G: ContentGenerator> Translator<G> {
    pub fn new(dispatcher: Dispatcher<G>, glossary: Glossary) -> Self {
        Self {
            dispatcher,
            glossary,
        }
    }

    pub fn stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    #[cfg(test)]
    pub fn dispatcher(&self) -> &Dispatcher<G> {
        &self.dispatcher
    }

    /// Produces the complete English document for `raw`.
    ///
    /// `fingerprint` must be the digest of `raw` itself; it is stamped as
    /// `source_sha`.
    pub async fn translate_document(
        &mut self,
        raw: &str,
        src: &Path,
        commit: &CommitInfo,
        fingerprint: &Fingerprint,
    ) -> Result<String, BuildError> {
        let target = src.display().to_string();

        let (text, wrapped) = frontmatter::unwrap_code_fence(raw);
        if wrapped {
            debug!(file = %target, stage = "unwrap", "unwrapped whole-document code fence");
        }
        let (fm, body) = frontmatter::split(text).map_err(|e| BuildError::front_matter(src, e))?;

        let kst = FixedOffset::east_opt(KST_OFFSET_SECS).unwrap_or_else(|| Utc.fix());
        let mut en = fm.clone();
        en.insert("lang", "en");
        en.insert("source_lang", fm.get_str("lang").unwrap_or("kr"));
        en.insert(SOURCE_SHA_KEY, fingerprint.as_str());
        en.insert("source_commit", commit.short_hash.as_str());
        en.insert("source_author", commit.author.as_str());
        en.insert("source_date", commit.date.as_str());
        en.insert(
            "translated_at",
            Utc::now().with_timezone(&kst).format("%Y-%m-%d %H:%M:%S").to_string(),
        );

        for key in ["title", "description"] {
            if let Some(value) = fm.get_str(key) {
                let translated = self.translate_inline(value, &target).await;
                en.insert(key, translated);
            }
        }

        let en_body = if body.trim().is_empty() {
            String::new()
        } else {
            let prompt = self.body_prompt(body);
            let req = GenerateRequest::from_segments(&[SYSTEM_PROMPT, prompt.as_str()]);
            let resp = self.dispatcher.dispatch(&target, &req).await?;
            let text = resp.text().ok_or(BuildError::EmptyResponse)?;
            let text = frontmatter::strip_spurious(text.trim());
            let (text, rewrapped) = frontmatter::unwrap_code_fence(text);
            if rewrapped {
                debug!(file = %target, stage = "unwrap", "removed whole code fence from model output");
            }
            text.to_string()
        };

        let header = en.render().map_err(|e| BuildError::front_matter(src, e))?;
        Ok(header + &en_body)
    }

    /// Translates a short front matter value. Failures keep the original.
    async fn translate_inline(&mut self, text: &str, target: &str) -> String {
        if text.is_empty() {
            return String::new();
        }
        let glossary = self.glossary.lines().unwrap_or_else(|| "(none)".into());
        let prompt = format!(
            "Glossary:\n{glossary}\n\n\
             Translate this short text (title/description) to English as a single-line \
             YAML-safe scalar. Do NOT add code fences or front matter:\n\n{text}"
        );
        let req = GenerateRequest::from_segments(&[SYSTEM_PROMPT, prompt.as_str()]);

        match self.dispatcher.dispatch(target, &req).await {
            Ok(resp) => match resp.text() {
                Some(out) => frontmatter::clean_scalar(out.trim()),
                None => {
                    warn!(file = target, stage = "inline", "empty inline translation (keep original)");
                    frontmatter::clean_scalar(text)
                }
            },
            Err(error) => {
                warn!(file = target, stage = "inline", %error, "inline translation failed (keep original)");
                frontmatter::clean_scalar(text)
            }
        }
    }

    fn body_prompt(&self, body: &str) -> String {
        let glossary = self.glossary.lines().unwrap_or_else(|| "- (none)".into());
        format!(
            "Glossary (KR→EN):\n{glossary}\n\n\
             Task:\n\
             Translate the following Markdown BODY from Korean to English.\n\
             Remember: Do NOT include YAML front matter in the output.\n\n\
             <CONTENT>\n{body}\n</CONTENT>\n"
        )
    }
}
