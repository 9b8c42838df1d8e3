//! Output sink for `print` and transcribed `say` calls.
//!
//! Implement [`PrintWriter`] to capture or redirect program output. The
//! default implementation [`StdPrint`] writes to stdout; tests use
//! [`CollectStringPrint`]. [`CappedPrint`] enforces the host's output budget.

use std::io::{self, Write as _};

use crate::error::Exception;

/// Marker appended once when the output cap is reached.
pub const TRUNCATION_MARKER: &str = "[output truncated]\n";

/// Trait for handling program output.
///
/// `write_str` receives rendered text without a terminator; `write_char`
/// appends separators and the final newline. Within a single execution the
/// sink sees writes in statement order, never interleaved.
pub trait PrintWriter {
    fn write_str(&mut self, output: &str) -> Result<(), Exception>;

    fn write_char(&mut self, end: char) -> Result<(), Exception>;
}

/// Default `PrintWriter` that writes to stdout.
#[derive(Debug, Default)]
pub struct StdPrint;

impl PrintWriter for StdPrint {
    fn write_str(&mut self, output: &str) -> Result<(), Exception> {
        io::stdout()
            .write_all(output.as_bytes())
            .map_err(|err| Exception::io(format!("stdout write failed: {err}")))
    }

    fn write_char(&mut self, end: char) -> Result<(), Exception> {
        let mut buffer = [0u8; 4];
        io::stdout()
            .write_all(end.encode_utf8(&mut buffer).as_bytes())
            .map_err(|err| Exception::io(format!("stdout write failed: {err}")))
    }
}

/// A `PrintWriter` that collects all output into a string.
#[derive(Debug, Default)]
pub struct CollectStringPrint(String);

impl CollectStringPrint {
    #[must_use]
    pub fn new() -> Self {
        Self(String::new())
    }

    #[must_use]
    pub fn output(&self) -> &str {
        self.0.as_str()
    }

    #[must_use]
    pub fn into_output(self) -> String {
        self.0
    }
}

impl PrintWriter for CollectStringPrint {
    fn write_str(&mut self, output: &str) -> Result<(), Exception> {
        self.0.push_str(output);
        Ok(())
    }

    fn write_char(&mut self, end: char) -> Result<(), Exception> {
        self.0.push(end);
        Ok(())
    }
}

/// `PrintWriter` that ignores all output.
#[derive(Debug, Default)]
pub struct NoPrint;

impl PrintWriter for NoPrint {
    fn write_str(&mut self, _output: &str) -> Result<(), Exception> {
        Ok(())
    }

    fn write_char(&mut self, _end: char) -> Result<(), Exception> {
        Ok(())
    }
}

/// Enforces the host's output byte budget around another writer.
///
/// Once the budget is spent, further writes are dropped and
/// [`TRUNCATION_MARKER`] is appended exactly once.
#[derive(Debug)]
pub struct CappedPrint<W> {
    inner: W,
    remaining: usize,
    truncated: bool,
}

impl<W: PrintWriter> CappedPrint<W> {
    #[must_use]
    pub fn new(inner: W, max_bytes: usize) -> Self {
        Self {
            inner,
            remaining: max_bytes,
            truncated: false,
        }
    }

    /// Whether the cap was hit during execution.
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    #[must_use]
    pub fn into_inner(self) -> W {
        self.inner
    }

    fn consume(&mut self, bytes: usize) -> Result<bool, Exception> {
        if self.truncated {
            return Ok(false);
        }
        if bytes > self.remaining {
            self.truncated = true;
            self.remaining = 0;
            self.inner.write_str(TRUNCATION_MARKER)?;
            return Ok(false);
        }
        self.remaining -= bytes;
        Ok(true)
    }
}

impl<W: PrintWriter> PrintWriter for CappedPrint<W> {
    fn write_str(&mut self, output: &str) -> Result<(), Exception> {
        if self.consume(output.len())? {
            self.inner.write_str(output)?;
        }
        Ok(())
    }

    fn write_char(&mut self, end: char) -> Result<(), Exception> {
        if self.consume(end.len_utf8())? {
            self.inner.write_char(end)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capped_print_appends_marker_once() {
        let mut print = CappedPrint::new(CollectStringPrint::new(), 4);
        print.write_str("abcd").unwrap();
        print.write_str("more").unwrap();
        print.write_str("even more").unwrap();
        assert!(print.is_truncated());
        let output = print.into_inner().into_output();
        assert_eq!(output, format!("abcd{TRUNCATION_MARKER}"));
    }
}
