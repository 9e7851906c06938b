//! Source discovery and the mapping from source files to publish paths.
//!
//! Sources live under the rules root; outputs mirror their relative path
//! under the publish root:
//!
//! | source       | KR output        | EN output          |
//! |--------------|------------------|--------------------|
//! | `a/x.kr.md`  | `a/x.kr.md`      | `a/x.en.md` (translated) |
//! | `a/x.md`     | `a/x.kr.md`      | `a/x.en.md` (translated) |
//! | `a/x.en.md`  | (none)           | `a/x.en.md` (copied)     |

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const KR_SUFFIX: &str = ".kr.md";
const EN_SUFFIX: &str = ".en.md";
const MD_SUFFIX: &str = ".md";

/// Suffix appended to an EN output path to mark a failed translation.
pub const FAILURE_MARKER_SUFFIX: &str = ".failed.txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocKind {
    /// `*.kr.md`
    Korean,
    /// `*.en.md`, authored in English and copied as-is.
    English,
    /// Any other `*.md`, treated as Korean.
    Plain,
}

impl DocKind {
    /// Kind of `path` by file name; `None` for non-Markdown or non-UTF-8 names.
    pub fn of(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        if name.ends_with(KR_SUFFIX) {
            Some(DocKind::Korean)
        } else if name.ends_with(EN_SUFFIX) {
            Some(DocKind::English)
        } else if name.ends_with(MD_SUFFIX) {
            Some(DocKind::Plain)
        } else {
            None
        }
    }

    pub fn needs_translation(self) -> bool {
        !matches!(self, DocKind::English)
    }
}

#[derive(Debug, Clone)]
pub struct Layout {
    source_root: PathBuf,
    output_root: PathBuf,
}

impl Layout {
    pub fn new(source_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            output_root: output_root.into(),
        }
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// All Markdown files under the source root, sorted, excluding the
    /// publish tree when it is nested inside the sources.
    ///
    /// A missing source root yields no files.
    pub fn discover(&self) -> io::Result<Vec<PathBuf>> {
        if !self.source_root.is_dir() {
            return Ok(Vec::new());
        }
        let excluded = fs::canonicalize(&self.output_root).ok();
        let mut files = Vec::new();
        collect_markdown(&self.source_root, excluded.as_deref(), &mut files)?;
        files.sort();
        Ok(files)
    }

    fn relative(&self, src: &Path) -> PathBuf {
        match src.strip_prefix(&self.source_root) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => src.file_name().map(PathBuf::from).unwrap_or_default(),
        }
    }

    /// Where the Korean variant of `src` is written. `None` for English sources.
    pub fn kr_output(&self, src: &Path) -> Option<PathBuf> {
        let rel = self.relative(src);
        let name = rel.file_name()?.to_str()?;
        let kr_name = match DocKind::of(&rel)? {
            DocKind::Korean => name.to_string(),
            DocKind::Plain => format!("{}{KR_SUFFIX}", name.strip_suffix(MD_SUFFIX)?),
            DocKind::English => return None,
        };
        Some(self.output_root.join(rel.with_file_name(kr_name)))
    }

    /// Where the English variant of `src` is written (translated or copied).
    pub fn en_output(&self, src: &Path) -> Option<PathBuf> {
        let rel = self.relative(src);
        let name = rel.file_name()?.to_str()?;
        let en_name = match DocKind::of(&rel)? {
            DocKind::Korean => format!("{}{EN_SUFFIX}", name.strip_suffix(KR_SUFFIX)?),
            DocKind::Plain => format!("{}{EN_SUFFIX}", name.strip_suffix(MD_SUFFIX)?),
            DocKind::English => name.to_string(),
        };
        Some(self.output_root.join(rel.with_file_name(en_name)))
    }
}

/// `<en output>.failed.txt`
pub fn failure_marker(en_output: &Path) -> PathBuf {
    let mut name = en_output.as_os_str().to_os_string();
    name.push(FAILURE_MARKER_SUFFIX);
    PathBuf::from(name)
}

fn collect_markdown(dir: &Path, excluded: Option<&Path>, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            if let Some(excluded) = excluded
                && fs::canonicalize(&path).is_ok_and(|p| p == excluded)
            {
                continue;
            }
            collect_markdown(&path, excluded, out)?;
        } else if file_type.is_file() && DocKind::of(&path).is_some() {
            out.push(path);
        }
    }
    Ok(())
}
