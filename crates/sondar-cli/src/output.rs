//! Output formatting and progress reporting

use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use sondar::harness::{RunSummary, SubtestRecord};
use sondar::stats::SampleSummary;
use sondar::TestStatus;

/// Output format for suite results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON output
    Json,
}

/// Progress reporter for suite execution
#[derive(Debug)]
pub struct ProgressReporter {
    term: Term,
    progress_bar: Option<ProgressBar>,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl ProgressReporter {
    /// Create a new progress reporter
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stderr(),
            progress_bar: None,
            use_color,
            quiet,
        }
    }

    /// Start a progress bar over `total` subtests
    pub fn start_progress(&mut self, total: u64, message: &str) {
        if self.quiet {
            return;
        }

        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        pb.set_message(message.to_string());
        self.progress_bar = Some(pb);
    }

    /// Increment progress
    pub fn increment(&self, delta: u64) {
        if let Some(ref pb) = self.progress_bar {
            pb.inc(delta);
        }
    }

    /// Finish progress bar
    pub fn finish(&self) {
        if let Some(ref pb) = self.progress_bar {
            pb.finish_and_clear();
        }
    }

    /// Print one subtest result line
    pub fn subtest(&self, record: &SubtestRecord) {
        if self.quiet && !record.status.is_failure() {
            return;
        }

        let _ = self
            .term
            .write_line(&format!("{} {}", self.status_tag(record.status), record.name));
        for dynamic in &record.dynamics {
            let _ = self.term.write_line(&format!(
                "  {} {}",
                self.status_tag(dynamic.status),
                dynamic.name
            ));
        }
        if let Some(message) = &record.message {
            let _ = self.term.write_line(&format!("    {message}"));
        }
    }

    /// Print the closing summary line
    pub fn summary(&self, summary: &RunSummary) {
        let line = format!(
            "{}: {} pass, {} skip, {} fail ({:.2?})",
            summary.suite,
            summary.count(TestStatus::Success),
            summary.count(TestStatus::Skip),
            summary.failures().len(),
            summary.duration,
        );
        let _ = self.term.write_line(&line);
    }

    fn status_tag(&self, status: TestStatus) -> String {
        if !self.use_color {
            return status.to_string();
        }
        match status {
            TestStatus::Success => style("✓").green().bold().to_string(),
            TestStatus::Skip => style("-").yellow().to_string(),
            _ => style("✗").red().bold().to_string(),
        }
    }
}

/// Print a run summary in the requested format
pub fn print_summary(
    summary: &RunSummary,
    format: OutputFormat,
    reporter: &ProgressReporter,
) -> crate::error::CliResult<()> {
    match format {
        OutputFormat::Text => {
            for record in &summary.records {
                reporter.subtest(record);
            }
            reporter.summary(summary);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(summary)?);
        }
    }
    Ok(())
}

/// Print a benchmark summary in the requested format
pub fn print_bench(summary: &SampleSummary, format: OutputFormat) -> crate::error::CliResult<()> {
    match format {
        OutputFormat::Text => {
            println!("{} ({} samples)", summary.name, summary.count);
            println!(
                "  min {:.0}ns  mean {:.0}ns  p50 {:.0}ns  p90 {:.0}ns  p99 {:.0}ns  max {:.0}ns",
                summary.min_ns,
                summary.mean_ns,
                summary.p50_ns,
                summary.p90_ns,
                summary.p99_ns,
                summary.max_ns,
            );
            println!("  stddev {:.0}ns", summary.stddev_ns);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(summary)?);
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn default_format_is_text() {
        assert_eq!(OutputFormat::default(), OutputFormat::Text);
    }

    #[test]
    fn plain_status_tags_are_result_strings() {
        let reporter = ProgressReporter::new(false, false);
        assert_eq!(reporter.status_tag(TestStatus::Success), "SUCCESS");
        assert_eq!(reporter.status_tag(TestStatus::Skip), "SKIP");
        assert_eq!(reporter.status_tag(TestStatus::Fail), "FAIL");
    }

    #[test]
    fn progress_bar_survives_increments() {
        let mut reporter = ProgressReporter::new(false, false);
        reporter.start_progress(3, "probing");
        reporter.increment(1);
        reporter.increment(2);
        reporter.finish();
    }

    #[test]
    fn quiet_reporter_skips_the_bar() {
        let mut reporter = ProgressReporter::new(false, true);
        reporter.start_progress(3, "probing");
        assert!(reporter.progress_bar.is_none());
    }
}
