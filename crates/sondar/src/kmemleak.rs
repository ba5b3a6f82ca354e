//! Kernel memory-leak scanning through the kmemleak debugfs file.
//!
//! Wraps `/sys/kernel/debug/kmemleak`: trigger a clear or a scan by writing
//! a command word, probe for findings with a one-byte read, and append full
//! reports to a result file. The control-file path is injectable so the
//! write/read mechanics can be unit tested without a kernel built with
//! `CONFIG_DEBUG_KMEMLEAK`.

use crate::result::SondarResult;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

/// File name leak reports are appended to inside a results directory
pub const RESULT_FILENAME: &str = "kmemleak.txt";

const DEFAULT_CONTROL: &str = "/sys/kernel/debug/kmemleak";
const MAX_WRITE_RETRIES: usize = 5;

/// Handle on the kmemleak control file
#[derive(Debug, Clone)]
pub struct Kmemleak {
    control: PathBuf,
}

impl Default for Kmemleak {
    fn default() -> Self {
        Self::new()
    }
}

impl Kmemleak {
    /// Use the default control file
    #[must_use]
    pub fn new() -> Self {
        Self {
            control: PathBuf::from(DEFAULT_CONTROL),
        }
    }

    /// Use an alternate control file (unit testing)
    #[must_use]
    pub fn with_control_path(control: impl Into<PathBuf>) -> Self {
        Self {
            control: control.into(),
        }
    }

    /// Whether the control file exists (kmemleak compiled in and debugfs
    /// visible)
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.control.exists()
    }

    /// Send a command word (`clear`, `scan`, ...) to kmemleak
    pub fn command(&self, cmd: &str) -> SondarResult<()> {
        let mut file = OpenOptions::new().read(true).write(true).open(&self.control)?;
        write_retrying(&mut file, cmd.as_bytes())?;
        Ok(())
    }

    /// Drop all previously reported leaks
    pub fn clear(&self) -> SondarResult<()> {
        self.command("clear")
    }

    /// Trigger an immediate scan
    pub fn scan(&self) -> SondarResult<()> {
        self.command("scan")
    }

    /// Whether kmemleak currently reports any leak, probed by reading a
    /// single byte
    pub fn found_leaks(&self) -> SondarResult<bool> {
        let mut file = File::open(&self.control)?;
        let mut buf = [0u8; 1];
        let n = file.read(&mut buf)?;
        Ok(n == 1)
    }

    /// Read the full leak report
    pub fn read_report(&self) -> SondarResult<String> {
        Ok(std::fs::read_to_string(&self.control)?)
    }

    /// Append the current leak report to `result_file`, prefixed with the
    /// name of the last test that ran before the scan.
    ///
    /// Returns whether any leaks were found; nothing is written when the
    /// report is clean.
    pub fn append_report(
        &self,
        last_test: Option<&str>,
        result_file: &Path,
    ) -> SondarResult<bool> {
        if !self.found_leaks()? {
            return Ok(false);
        }

        let report = self.read_report()?;
        let mut out = OpenOptions::new()
            .create(true)
            .append(true)
            .open(result_file)?;
        let header = format!(
            "kmemleak found leaks\nlast test: {}\n",
            last_test.unwrap_or("none")
        );
        write_retrying(&mut out, header.as_bytes())?;
        write_retrying(&mut out, report.as_bytes())?;
        Ok(true)
    }
}

/// Write a whole buffer, retrying a bounded number of times on recoverable
/// errors and short writes
fn write_retrying<W: Write>(writer: &mut W, mut buf: &[u8]) -> std::io::Result<()> {
    let mut retries = 0;
    while !buf.is_empty() {
        match writer.write(buf) {
            Ok(0) => {
                retries += 1;
                if retries > MAX_WRITE_RETRIES {
                    return Err(std::io::Error::new(
                        ErrorKind::WriteZero,
                        "exceeded retry limit",
                    ));
                }
            }
            Ok(n) => buf = &buf[n..],
            Err(err) if matches!(err.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock) => {
                retries += 1;
                if retries > MAX_WRITE_RETRIES {
                    return Err(err);
                }
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn fake_control(contents: &str) -> (tempfile::TempDir, Kmemleak) {
        let tmp = tempfile::tempdir().unwrap();
        let control = tmp.path().join("kmemleak");
        std::fs::write(&control, contents).unwrap();
        (tmp, Kmemleak::with_control_path(control))
    }

    #[test]
    fn missing_control_file_is_unavailable() {
        let leak = Kmemleak::with_control_path("/nonexistent/sondar-kmemleak");
        assert!(!leak.is_available());
        assert!(leak.clear().is_err());
    }

    #[test]
    fn commands_write_the_command_word() {
        let (tmp, leak) = fake_control("");
        leak.clear().unwrap();
        let written = std::fs::read_to_string(tmp.path().join("kmemleak")).unwrap();
        assert_eq!(written, "clear");
    }

    #[test]
    fn empty_report_means_no_leaks() {
        let (_tmp, leak) = fake_control("");
        assert!(!leak.found_leaks().unwrap());
    }

    #[test]
    fn nonempty_report_means_leaks() {
        let (_tmp, leak) = fake_control("unreferenced object 0xffff888\n");
        assert!(leak.found_leaks().unwrap());
    }

    #[test]
    fn append_report_writes_header_and_body() {
        let (tmp, leak) = fake_control("unreferenced object 0xffff888\n");
        let result_file = tmp.path().join(RESULT_FILENAME);

        let found = leak
            .append_report(Some("sysfs-read-all-entries"), &result_file)
            .unwrap();
        assert!(found);

        let contents = std::fs::read_to_string(&result_file).unwrap();
        assert!(contents.starts_with("kmemleak found leaks\n"));
        assert!(contents.contains("last test: sysfs-read-all-entries"));
        assert!(contents.contains("unreferenced object"));
    }

    #[test]
    fn clean_report_appends_nothing() {
        let (tmp, leak) = fake_control("");
        let result_file = tmp.path().join(RESULT_FILENAME);
        assert!(!leak.append_report(None, &result_file).unwrap());
        assert!(!result_file.exists());
    }
}
