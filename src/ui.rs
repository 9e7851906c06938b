//! Terminal output: document progress and colored run reports.
//!
//! Uses `indicatif` for the progress bar and `console` for styling. Logs go
//! to stderr through [`LogWriter`], which clears the bar around each line;
//! the reports here go to stdout.

use std::io::{self, Write};
use std::path::Path;

use console::Style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing_subscriber::fmt::MakeWriter;

use crate::pipeline::{BuildSummary, DocReport, DocStatus};

/// Progress bar over the documents of one build.
///
/// Created hidden before logging starts so the log writer can share it;
/// [`start`](Self::start) sizes it and shows it.
pub struct BuildProgress {
    pb: ProgressBar,
}

impl Default for BuildProgress {
    fn default() -> Self {
        Self {
            pb: ProgressBar::hidden(),
        }
    }
}

impl BuildProgress {
    pub fn log_writer(&self) -> LogWriter {
        LogWriter { pb: self.pb.clone() }
    }

    /// Sizes the bar to `total` documents. It stays hidden unless `visible`.
    pub fn start(&self, total: usize, visible: bool) {
        self.pb.set_length(total as u64);
        if visible {
            if let Ok(style) =
                ProgressStyle::default_bar().template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            {
                self.pb.set_style(style.progress_chars("=> "));
            }
            self.pb.set_draw_target(ProgressDrawTarget::stderr());
            self.pb.enable_steady_tick(std::time::Duration::from_millis(100));
        }
    }

    pub fn advance(&self, doc: &Path) {
        let name = doc
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.pb.set_message(name);
        self.pb.inc(1);
    }

    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

/// `MakeWriter` for the tracing subscriber: stderr, with the progress bar
/// suspended while a line is written.
#[derive(Clone)]
pub struct LogWriter {
    pb: ProgressBar,
}

impl<'a> MakeWriter<'a> for LogWriter {
    type Writer = SuspendedStderr;

    fn make_writer(&'a self) -> Self::Writer {
        SuspendedStderr { pb: self.pb.clone() }
    }
}

pub struct SuspendedStderr {
    pb: ProgressBar,
}

impl Write for SuspendedStderr {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pb.suspend(|| io::stderr().write(buf))
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.pb.suspend(|| io::stderr().write_all(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

/// Prints the run summary and every failure.
pub fn print_summary(summary: &BuildSummary) {
    let green = Style::new().green().bold();
    let red = Style::new().red().bold();
    let yellow = Style::new().yellow();
    let dim = Style::new().dim();

    println!();
    println!("{}", dim.apply_to("─── Build Summary ───"));
    println!(
        "  files {}  kr {}  en {}  skipped {}",
        summary.files, summary.kr_written, summary.en_written, summary.en_skipped
    );
    println!(
        "  {} calls {}  retries {}  throttle waits {}",
        dim.apply_to("api"),
        summary.calls,
        summary.retries,
        summary.throttle_waits
    );

    if summary.failures.is_empty() {
        println!("  {} No failures", green.apply_to("✓"));
        return;
    }
    println!("  {} {} failed:", red.apply_to("✗"), summary.errors);
    for f in &summary.failures {
        println!("    {} {}", yellow.apply_to(f.path.display()), dim.apply_to(&f.message));
    }
}

/// Machine-readable summary for `--log-format json` runs.
pub fn print_summary_json(summary: &BuildSummary) {
    println!("{}", serde_json::to_string_pretty(summary).unwrap_or_default());
}

/// Prints one line per document from [`crate::pipeline::plan`].
pub fn print_status(reports: &[DocReport]) {
    let green = Style::new().green();
    let yellow = Style::new().yellow();
    let red = Style::new().red().bold();
    let dim = Style::new().dim();

    let mut pending = 0;
    for report in reports {
        let path = report.source.display();
        match report.status {
            DocStatus::UpToDate => println!("  {} {path}", green.apply_to("✓ up to date  ")),
            DocStatus::Pending(reason) => {
                pending += 1;
                println!("  {} {path} {}", yellow.apply_to("↻ translate   "), dim.apply_to(reason));
            }
            DocStatus::Failed => {
                pending += 1;
                println!("  {} {path}", red.apply_to("✗ failed      "));
            }
            DocStatus::Copied => println!("  {} {path}", dim.apply_to("= english     ")),
            DocStatus::Authored => println!("  {} {path}", dim.apply_to("= hand-written")),
        }
    }
    println!();
    println!("{} document(s), {pending} need translation", reports.len());
}
