//! Persistent REPL session support.
//!
//! `ReplSession` keeps interpreter state across `execute()` calls so
//! interactive snippets share variables, functions, and personality traits.

use std::{cell::RefCell, rc::Rc};

use crate::{
    capability::{HostCapabilities, PersonalityRecord},
    env::Frame,
    error::Exception,
    interp::Interpreter,
    io::PrintWriter,
    lexer::Lexer,
    parser,
    resource::NoLimitTracker,
    run::fresh_module_env,
    token::TokenKind,
    value::Value,
};

/// A persistent interactive session.
///
/// The environment, personality record, and host live for the whole session;
/// each `execute` call parses one snippet and runs it against them.
pub struct ReplSession {
    script_name: String,
    env: Rc<RefCell<Frame>>,
    personality: PersonalityRecord,
    host: Box<dyn HostCapabilities>,
}

impl ReplSession {
    #[must_use]
    pub fn new(host: Box<dyn HostCapabilities>, script_name: &str) -> Self {
        Self {
            script_name: script_name.to_owned(),
            env: fresh_module_env(),
            personality: PersonalityRecord::new(),
            host,
        }
    }

    #[must_use]
    pub fn script_name(&self) -> &str {
        &self.script_name
    }

    /// Parses and executes one snippet.
    ///
    /// Returns the value of the snippet's final expression statement, or
    /// `None` when it ends with a declaration or other non-expression form.
    /// Bindings and traits persist into the next call; a failed snippet
    /// leaves the effects it made before the failure.
    pub fn execute(&mut self, source: &str, print: &mut dyn PrintWriter) -> Result<Option<Value>, Exception> {
        let program = parser::parse(source).map_err(|err| err.with_script(&self.script_name))?;
        let mut tracker = NoLimitTracker;
        let mut interp = Interpreter::new(
            self.host.as_mut(),
            &mut tracker,
            print,
            &mut self.personality,
        );
        interp
            .run_program(&program, &self.env)
            .map_err(|err| err.with_script(&self.script_name))
    }

    /// Names bound at module level, sorted for stable display.
    #[must_use]
    pub fn list_variables(&self) -> Vec<String> {
        let mut names = self.env.borrow().local_names();
        names.sort_unstable();
        names
    }

    /// Current value of a personality trait.
    #[must_use]
    pub fn get_trait(&self, name: &str) -> Option<f64> {
        self.personality.get(name)
    }
}

impl std::fmt::Debug for ReplSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplSession")
            .field("script_name", &self.script_name)
            .finish_non_exhaustive()
    }
}

/// Reports whether accumulated input is an incomplete form.
///
/// The REPL driver keeps reading continuation lines while this returns true:
/// unbalanced `(`/`[`/`{` delimiters or an open block comment. Everything
/// else — including a malformed snippet — is handed to `execute` so the
/// error surfaces immediately.
#[must_use]
pub fn needs_more_input(source: &str) -> bool {
    let tokens = match Lexer::tokenize(source) {
        Ok(tokens) => tokens,
        // Strings cannot span lines, so only an open block comment is
        // completable by further input.
        Err(err) => return err.message().contains("unterminated block comment"),
    };
    let mut depth: i64 = 0;
    for token in &tokens {
        match token.kind {
            TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => depth -= 1,
            _ => {}
        }
    }
    depth > 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_input_is_complete() {
        assert!(!needs_more_input("print(1)"));
        assert!(!needs_more_input("fn f() { return 1 }"));
    }

    #[test]
    fn open_delimiters_need_more_input() {
        assert!(needs_more_input("fn f() {"));
        assert!(needs_more_input("let xs = [1, 2,"));
        assert!(needs_more_input("say(\"hi\","));
    }

    #[test]
    fn open_block_comment_needs_more_input() {
        assert!(needs_more_input("let x = 1 /* note"));
    }
}
