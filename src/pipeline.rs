//! Build pipeline: publishes every rule document in Korean and English.
//!
//! [`RuleBuilder`] walks the discovered sources one at a time. Each document
//! gets its Korean variant (with provenance), then its English variant, which
//! is either copied, skipped by the fingerprint gate, or translated. Failures
//! are recorded per document and leave a `.failed.txt` marker next to the
//! English path; strict mode stops at the first one.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::error::BuildError;
use crate::fingerprint::{self, Fingerprint, GateDecision, TranslateReason};
use crate::frontmatter::{self, FrontMatter, FrontMatterError};
use crate::gemini::ContentGenerator;
use crate::git::{CommitInfo, GitManager};
use crate::layout::{DocKind, Layout, failure_marker};
use crate::translator::Translator;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DocFailure {
    pub path: PathBuf,
    pub message: String,
}

/// Counters for one build run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildSummary {
    pub files: usize,
    pub kr_written: usize,
    pub en_written: usize,
    pub en_skipped: usize,
    pub errors: usize,
    pub retries: u32,
    pub throttle_waits: u32,
    pub calls: u32,
    pub failures: Vec<DocFailure>,
}

impl BuildSummary {
    pub fn has_failures(&self) -> bool {
        self.errors > 0
    }
}

pub struct RuleBuilder<G> {
    layout: Layout,
    translator: Translator<G>,
    git: Option<GitManager>,
    strict: bool,
    summary: BuildSummary,
}

impl<G: ContentGenerator> RuleBuilder<G> {
    /// `git` is optional; without it provenance fields read `unknown`.
    pub fn new(layout: Layout, translator: Translator<G>, git: Option<GitManager>, strict: bool) -> Self {
        Self {
            layout,
            translator,
            git,
            strict,
            summary: BuildSummary::default(),
        }
    }

    /// Counters so far. After a strict abort this is the partial summary.
    pub fn summary(&self) -> &BuildSummary {
        &self.summary
    }

    #[cfg(test)]
    pub fn translator(&self) -> &Translator<G> {
        &self.translator
    }

    /// Processes `files` in order, calling `on_done` after each one.
    ///
    /// Returns [`BuildError::StrictAbort`] on the first failure in strict
    /// mode; otherwise failures are only recorded in the summary.
    pub async fn build(
        &mut self,
        files: &[PathBuf],
        on_done: impl FnMut(&Path),
    ) -> Result<BuildSummary, BuildError> {
        let span = info_span!("build", run_id = %Uuid::new_v4(), strict = self.strict);
        self.run(files, on_done).instrument(span).await
    }

    async fn run(
        &mut self,
        files: &[PathBuf],
        mut on_done: impl FnMut(&Path),
    ) -> Result<BuildSummary, BuildError> {
        info!(stage = "start", files = files.len(), "start: {} markdown files found", files.len());
        let authored = authored_english(&self.layout, files);

        for src in files {
            self.summary.files += 1;
            let outcome = self.process(src, &authored).await;
            on_done(src);

            if let Err(err) = outcome {
                self.record_failure(src, &err);
                if self.strict {
                    self.finish();
                    return Err(BuildError::StrictAbort {
                        path: src.clone(),
                        source: Box::new(err),
                    });
                }
            }
        }

        self.finish();
        Ok(self.summary.clone())
    }

    async fn process(&mut self, src: &Path, authored: &HashSet<PathBuf>) -> Result<(), BuildError> {
        let Some(kind) = DocKind::of(src) else {
            return Ok(());
        };
        let file = src.display().to_string();
        info!(file, stage = "start", "processing: {file}");

        let raw = fs::read_to_string(src).map_err(|e| BuildError::io(src, e))?;
        let commit = self.commit_for(src);

        if let Some(kr_out) = self.layout.kr_output(src) {
            let text = korean_variant(&raw, kind, &commit).map_err(|e| BuildError::front_matter(src, e))?;
            write_file(&kr_out, &text)?;
            self.summary.kr_written += 1;
            info!(file, stage = "write", "write KR → {}", kr_out.display());
        }

        let Some(en_out) = self.layout.en_output(src) else {
            return Ok(());
        };

        if !kind.needs_translation() {
            write_file(&en_out, &raw)?;
            self.summary.en_written += 1;
            info!(file, stage = "write", "copy EN → {}", en_out.display());
            return Ok(());
        }

        if authored.contains(&en_out) {
            self.summary.en_skipped += 1;
            info!(file, stage = "skip", "skip EN (hand-authored) → {}", en_out.display());
            return Ok(());
        }

        let fp = Fingerprint::of(&raw);
        let existing = read_existing(&en_out)?;
        match fingerprint::decide(&fp, existing.as_deref()) {
            GateDecision::Skip => {
                self.summary.en_skipped += 1;
                remove_marker(&en_out);
                info!(file, stage = "skip", "skip EN (up-to-date) → {}", en_out.display());
                return Ok(());
            }
            GateDecision::Translate(reason) => {
                debug!(file, stage = "gate", %reason, "translation needed");
            }
        }

        let en_text = self
            .translator
            .translate_document(&raw, src, &commit, &fp)
            .await?;
        write_file(&en_out, &en_text)?;
        remove_marker(&en_out);
        self.summary.en_written += 1;
        info!(file, stage = "write", "write EN → {}", en_out.display());
        Ok(())
    }

    fn commit_for(&self, src: &Path) -> CommitInfo {
        let Some(git) = &self.git else {
            return CommitInfo::unknown();
        };
        match git.last_commit_for(src) {
            Ok(Some(info)) => info,
            Ok(None) => CommitInfo::unknown(),
            Err(err) => {
                warn!(file = %src.display(), stage = "git", error = %err, "git info unavailable");
                CommitInfo::unknown()
            }
        }
    }

    fn record_failure(&mut self, src: &Path, err: &BuildError) {
        let file = src.display().to_string();
        let message = err.to_string();
        if self.strict {
            error!(file, stage = "error", "EN translate failed: {message}");
        } else {
            error!(file, stage = "error", "EN translate failed: {message} (skip and continue)");
        }

        if let Some(en_out) = self.layout.en_output(src) {
            let marker = failure_marker(&en_out);
            if let Err(e) = write_file(&marker, &message) {
                warn!(file, stage = "error", error = %e, "could not write failure marker");
            }
        }

        self.summary.errors += 1;
        self.summary.failures.push(DocFailure {
            path: src.to_path_buf(),
            message,
        });
    }

    fn finish(&mut self) {
        let stats = self.translator.stats();
        let s = &mut self.summary;
        s.retries = stats.retries;
        s.throttle_waits = stats.throttle_waits;
        s.calls = stats.calls;

        info!(
            stage = "summary",
            files = s.files,
            kr_written = s.kr_written,
            en_written = s.en_written,
            en_skipped = s.en_skipped,
            retries = s.retries,
            throttle_waits = s.throttle_waits,
            errors = s.errors,
            "summary: files={}, kr_written={}, en_written={}, en_skipped={}, retries={}, throttle_waits={}, errors={}",
            s.files,
            s.kr_written,
            s.en_written,
            s.en_skipped,
            s.retries,
            s.throttle_waits,
            s.errors
        );
        if !s.failures.is_empty() {
            warn!(stage = "summary", "failed files ({}):", s.failures.len());
            for f in &s.failures {
                warn!(file = %f.path.display(), stage = "summary", " - {} :: {}", f.path.display(), f.message);
            }
        }
    }
}

/// Removes the publish tree so every document is rebuilt.
pub fn clean_output(layout: &Layout) -> io::Result<()> {
    let root = layout.output_root();
    if root.exists() {
        fs::remove_dir_all(root)?;
        debug!(stage = "clean", "cleaned output root {}", root.display());
    }
    Ok(())
}

/// Where a document stands, as reported by `status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocStatus {
    UpToDate,
    Pending(TranslateReason),
    /// Needs translation and the previous attempt left a failure marker.
    Failed,
    /// English source, copied verbatim.
    Copied,
    /// A hand-authored English file takes the EN path.
    Authored,
}

#[derive(Debug, Clone)]
pub struct DocReport {
    pub source: PathBuf,
    pub status: DocStatus,
}

/// Runs the gate for every file without translating anything.
pub fn plan(layout: &Layout, files: &[PathBuf]) -> Result<Vec<DocReport>, BuildError> {
    let authored = authored_english(layout, files);
    let mut reports = Vec::with_capacity(files.len());

    for src in files {
        let (Some(kind), Some(en_out)) = (DocKind::of(src), layout.en_output(src)) else {
            continue;
        };
        let status = if kind == DocKind::English {
            DocStatus::Copied
        } else if authored.contains(&en_out) {
            DocStatus::Authored
        } else {
            let raw = fs::read_to_string(src).map_err(|e| BuildError::io(src, e))?;
            let existing = read_existing(&en_out)?;
            match fingerprint::decide(&Fingerprint::of(&raw), existing.as_deref()) {
                GateDecision::Skip => DocStatus::UpToDate,
                GateDecision::Translate(_) if failure_marker(&en_out).exists() => DocStatus::Failed,
                GateDecision::Translate(reason) => DocStatus::Pending(reason),
            }
        };
        reports.push(DocReport {
            source: src.clone(),
            status,
        });
    }
    Ok(reports)
}

/// EN paths claimed by English sources.
fn authored_english(layout: &Layout, files: &[PathBuf]) -> HashSet<PathBuf> {
    files
        .iter()
        .filter(|p| DocKind::of(p) == Some(DocKind::English))
        .filter_map(|p| layout.en_output(p))
        .collect()
}

/// Korean publish text for a Korean or plain source.
fn korean_variant(raw: &str, kind: DocKind, commit: &CommitInfo) -> Result<String, FrontMatterError> {
    let (text, _) = frontmatter::unwrap_code_fence(raw);
    let (mut fm, body) = frontmatter::split(text)?;

    match kind {
        DocKind::Korean if fm.contains_key("source_commit") => Ok(raw.to_string()),
        DocKind::Korean => {
            stamp_provenance(&mut fm, commit);
            Ok(fm.render()? + body)
        }
        DocKind::Plain if fm.is_empty() => Ok(text.to_string()),
        DocKind::Plain => {
            fm.insert("lang", "kr");
            stamp_provenance(&mut fm, commit);
            Ok(fm.render()? + body)
        }
        DocKind::English => Ok(raw.to_string()),
    }
}

fn stamp_provenance(fm: &mut FrontMatter, commit: &CommitInfo) {
    fm.insert("source_commit", commit.short_hash.as_str());
    fm.insert("source_author", commit.author.as_str());
    fm.insert("source_date", commit.date.as_str());
}

fn read_existing(path: &Path) -> Result<Option<String>, BuildError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(BuildError::io(path, e)),
    }
}

fn write_file(path: &Path, contents: &str) -> Result<(), BuildError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
    }
    fs::write(path, contents).map_err(|e| BuildError::io(path, e))
}

fn remove_marker(en_out: &Path) {
    let marker = failure_marker(en_out);
    match fs::remove_file(&marker) {
        Ok(()) => debug!(stage = "write", "removed stale marker {}", marker.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(stage = "write", error = %e, "could not remove {}", marker.display()),
    }
}
