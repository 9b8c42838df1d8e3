//! Public interface for running and compiling NexusLang code.

use std::{cell::RefCell, rc::Rc};

use crate::{
    ast::Program,
    bytecode::{Compiler, Module},
    capability::{DefaultHost, HostCapabilities, PersonalityRecord},
    env::Frame,
    error::Exception,
    interp::Interpreter,
    io::{PrintWriter, StdPrint},
    lexer::Lexer,
    parser,
    resource::{NoLimitTracker, ResourceTracker},
    value::Value,
};

/// Primary interface for running NexusLang code.
///
/// A `Runner` lexes and parses once at construction; `run` and `compile`
/// both work from the same AST. Interpretation and compilation are peers —
/// neither consumes the other's output.
///
/// # Example
/// ```
/// use nexuslang::{CollectStringPrint, DefaultHost, NoLimitTracker, Runner};
///
/// let runner = Runner::new("print(2 + 3 * 4)".to_owned(), "demo.nx").unwrap();
/// let mut print = CollectStringPrint::new();
/// runner.run(&mut DefaultHost, &mut NoLimitTracker, &mut print).unwrap();
/// assert_eq!(print.output(), "14\n");
/// ```
#[derive(Debug, Clone)]
pub struct Runner {
    source: String,
    script_name: String,
    program: Program,
}

impl Runner {
    /// Parses the given source.
    ///
    /// # Errors
    /// Returns the first `LexError` or `ParseError`; there is no recovery.
    pub fn new(source: String, script_name: &str) -> Result<Self, Exception> {
        let program = parser::parse(&source).map_err(|err| err.with_script(script_name))?;
        Ok(Self {
            source,
            script_name: script_name.to_owned(),
            program,
        })
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn script_name(&self) -> &str {
        &self.script_name
    }

    /// Interprets the program against a fresh module environment.
    ///
    /// Returns the value of the final top-level expression statement (null
    /// when the program ends with any other statement kind). Each run gets
    /// its own environment and personality record; nothing leaks across
    /// executions.
    pub fn run(
        &self,
        host: &mut dyn HostCapabilities,
        tracker: &mut dyn ResourceTracker,
        print: &mut dyn PrintWriter,
    ) -> Result<Value, Exception> {
        let env = Frame::root();
        Interpreter::seed_module_frame(&env);
        let mut personality = PersonalityRecord::new();
        let mut interp = Interpreter::new(host, tracker, print, &mut personality);
        interp
            .run_program(&self.program, &env)
            .map(|value| value.unwrap_or(Value::Null))
            .map_err(|err| err.with_script(&self.script_name))
    }

    /// Runs against the default host with no limits, printing to stdout.
    pub fn run_default(&self) -> Result<Value, Exception> {
        self.run(&mut DefaultHost, &mut NoLimitTracker, &mut StdPrint)
    }

    /// Compiles the program into an `.nxb` module.
    ///
    /// `timestamp_ms` becomes the header build timestamp; for a given
    /// (source, timestamp) pair the module bytes are identical across runs.
    pub fn compile(&self, timestamp_ms: u64) -> Result<Module, Exception> {
        Compiler::compile(&self.program, &self.script_name, timestamp_ms)
            .map_err(|err| err.with_script(&self.script_name))
    }
}

/// Size accounting for a compile, reported by the CLI.
///
/// The speedup figure is advisory: it is derived from the size ratio, not
/// from a measured execution improvement.
#[derive(Debug, Clone, Copy)]
pub struct CompileReport {
    pub source_bytes: usize,
    pub module_bytes: usize,
}

impl CompileReport {
    /// Source size over module size.
    #[must_use]
    pub fn compression_ratio(&self) -> f64 {
        if self.module_bytes == 0 {
            return 0.0;
        }
        self.source_bytes as f64 / self.module_bytes as f64
    }

    /// Advisory speedup estimate derived from the compression ratio.
    #[must_use]
    pub fn estimated_speedup(&self) -> f64 {
        self.compression_ratio().max(1.0) * 1.5
    }
}

/// Human-readable token dump for the `tokens` debug subcommand.
///
/// The output format is not a stable interface.
pub fn dump_tokens(source: &str) -> Result<String, Exception> {
    let tokens = Lexer::tokenize(source)?;
    let mut out = String::new();
    for token in tokens {
        out.push_str(&format!(
            "{:>4}:{:<3} {:?} {:?}\n",
            token.loc.line, token.loc.col, token.kind, token.lexeme
        ));
    }
    Ok(out)
}

/// Human-readable AST dump for the `ast` debug subcommand.
///
/// The output format is not a stable interface.
pub fn dump_ast(source: &str) -> Result<String, Exception> {
    let program = parser::parse(source)?;
    Ok(format!("{program:#?}\n"))
}

/// One-shot convenience: parse and interpret `source` in a single call.
pub fn run_source(
    source: &str,
    script_name: &str,
    host: &mut dyn HostCapabilities,
    tracker: &mut dyn ResourceTracker,
    print: &mut dyn PrintWriter,
) -> Result<Value, Exception> {
    Runner::new(source.to_owned(), script_name)?.run(host, tracker, print)
}

/// Module environment handle used by [`crate::ReplSession`].
pub(crate) fn fresh_module_env() -> Rc<RefCell<Frame>> {
    let env = Frame::root();
    Interpreter::seed_module_frame(&env);
    env
}
