//! Error taxonomy shared by the whole toolchain.
//!
//! Every failure in the lexer, parser, interpreter, compiler, or module reader
//! is an [`Exception`]: a kind, a message, the source position where it arose,
//! and the most recent call-site positions. User code has no catch construct,
//! so an exception always aborts the currently executing top-level form and
//! surfaces to the host.

use std::fmt;

use crate::token::CodeLoc;

/// Classification of a toolchain failure.
///
/// The variant name is the user-visible kind in diagnostics
/// (`TypeError at main.nx:1:13: ...`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ErrorKind {
    LexError,
    ParseError,
    NameError,
    TypeError,
    ArityError,
    ArithError,
    IndexError,
    KeyError,
    TraitRangeError,
    CancelledError,
    StackOverflowError,
    ModuleVersionError,
    CompileError,
    IoError,
}

impl ErrorKind {
    /// Whether the error originates before execution (lexing or parsing).
    #[must_use]
    pub fn is_source_error(self) -> bool {
        matches!(self, Self::LexError | Self::ParseError)
    }
}

/// One call-site entry in a traceback, most recent first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    /// Name of the function that was being called.
    pub name: String,
    /// Position of the call site.
    pub loc: CodeLoc,
}

/// Maximum number of call-site positions rendered in a diagnostic.
pub const MAX_TRACEBACK_FRAMES: usize = 5;

/// A structured toolchain failure.
#[derive(Debug, Clone, PartialEq)]
pub struct Exception {
    kind: ErrorKind,
    message: String,
    loc: Option<CodeLoc>,
    script: String,
    frames: Vec<StackFrame>,
}

impl Exception {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>, loc: Option<CodeLoc>) -> Self {
        Self {
            kind,
            message: message.into(),
            loc,
            script: String::new(),
            frames: Vec::new(),
        }
    }

    pub fn lex(message: impl Into<String>, loc: CodeLoc) -> Self {
        Self::new(ErrorKind::LexError, message, Some(loc))
    }

    pub fn parse(message: impl Into<String>, loc: CodeLoc) -> Self {
        Self::new(ErrorKind::ParseError, message, Some(loc))
    }

    pub fn name(message: impl Into<String>, loc: CodeLoc) -> Self {
        Self::new(ErrorKind::NameError, message, Some(loc))
    }

    pub fn type_error(message: impl Into<String>, loc: CodeLoc) -> Self {
        Self::new(ErrorKind::TypeError, message, Some(loc))
    }

    pub fn arity(message: impl Into<String>, loc: CodeLoc) -> Self {
        Self::new(ErrorKind::ArityError, message, Some(loc))
    }

    pub fn arith(message: impl Into<String>, loc: CodeLoc) -> Self {
        Self::new(ErrorKind::ArithError, message, Some(loc))
    }

    pub fn index(message: impl Into<String>, loc: CodeLoc) -> Self {
        Self::new(ErrorKind::IndexError, message, Some(loc))
    }

    pub fn key(message: impl Into<String>, loc: CodeLoc) -> Self {
        Self::new(ErrorKind::KeyError, message, Some(loc))
    }

    pub fn trait_range(message: impl Into<String>, loc: CodeLoc) -> Self {
        Self::new(ErrorKind::TraitRangeError, message, Some(loc))
    }

    pub fn cancelled(loc: CodeLoc) -> Self {
        Self::new(ErrorKind::CancelledError, "execution cancelled by host", Some(loc))
    }

    pub fn stack_overflow(limit: usize, loc: CodeLoc) -> Self {
        Self::new(
            ErrorKind::StackOverflowError,
            format!("call depth exceeded the recursion cap of {limit}"),
            Some(loc),
        )
    }

    pub fn module_version(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ModuleVersionError, message, None)
    }

    pub fn compile(message: impl Into<String>, loc: CodeLoc) -> Self {
        Self::new(ErrorKind::CompileError, message, Some(loc))
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::IoError, message, None)
    }

    /// Sets the logical script name if it has not been set yet.
    ///
    /// The lexer, parser, and interpreter construct exceptions without
    /// knowing the script name; the outermost entry point fills it in.
    #[must_use]
    pub fn with_script(mut self, script: &str) -> Self {
        if self.script.is_empty() {
            self.script = script.to_owned();
        }
        self
    }

    /// Records a call-site position while the exception unwinds a call.
    pub fn push_frame(&mut self, name: &str, loc: CodeLoc) {
        self.frames.push(StackFrame {
            name: name.to_owned(),
            loc,
        });
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn loc(&self) -> Option<CodeLoc> {
        self.loc
    }

    #[must_use]
    pub fn frames(&self) -> &[StackFrame] {
        &self.frames
    }

    /// The single-line diagnostic without traceback lines.
    #[must_use]
    pub fn diagnostic_line(&self) -> String {
        let script = if self.script.is_empty() { "<unknown>" } else { &self.script };
        match self.loc {
            Some(loc) => format!("{} at {script}:{loc}: {}", self.kind, self.message),
            None => format!("{} in {script}: {}", self.kind, self.message),
        }
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.diagnostic_line())?;
        for frame in self.frames.iter().take(MAX_TRACEBACK_FRAMES) {
            write!(f, "\n  in call to {} at {}", frame.name, frame.loc)?;
        }
        Ok(())
    }
}

impl std::error::Error for Exception {}
