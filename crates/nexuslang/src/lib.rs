#![doc = include_str!("../../../README.md")]
#![expect(clippy::cast_possible_truncation, reason = "numeric narrowing is bounds-checked at the call sites")]
#![expect(clippy::cast_sign_loss, reason = "sign checks precede the casts")]
#![expect(clippy::unused_self, reason = "evaluator helpers keep a uniform method shape")]

mod ast;
mod bytecode;
pub mod capability;
mod env;
mod error;
mod interp;
mod io;
mod lexer;
mod parser;
mod repl;
mod resource;
mod run;
mod token;
mod value;

pub use crate::{
    bytecode::{
        Compiler, Constant, DebugEntry, FORMAT_MAJOR, FORMAT_MINOR, FORMAT_PATCH, MAGIC, Module, Opcode,
        SymbolEntry, SymbolKind,
    },
    capability::{DefaultHost, FixtureHost, HostCapabilities, OptimizeRequest, PersonalityRecord, SayRequest},
    error::{ErrorKind, Exception, MAX_TRACEBACK_FRAMES, StackFrame},
    io::{CappedPrint, CollectStringPrint, NoPrint, PrintWriter, StdPrint, TRUNCATION_MARKER},
    repl::{ReplSession, needs_more_input},
    resource::{
        CancelFlag, DEFAULT_MAX_RECURSION_DEPTH, LimitError, LimitedTracker, NoLimitTracker, ResourceTracker,
    },
    run::{CompileReport, Runner, dump_ast, dump_tokens, run_source},
    token::CodeLoc,
    value::{Closure, HostHandle, Intrinsic, Value},
};
