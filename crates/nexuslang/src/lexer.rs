//! Hand-written scanner for `.nx` source text.
//!
//! The lexer converts a source buffer into a sequence of [`Token`]s terminated
//! by an [`TokenKind::Eof`] sentinel. It stops at the first malformed
//! character: there is no error recovery, the toolchain is batch-oriented.

use crate::{
    error::Exception,
    token::{CodeLoc, Token, TokenKind, keyword_kind},
};

/// Restartable scanner over a source buffer.
#[derive(Debug)]
pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    col: u32,
}

impl Lexer {
    #[must_use]
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    /// Scans the entire buffer, including the trailing `Eof` token.
    pub fn tokenize(source: &str) -> Result<Vec<Token>, Exception> {
        let mut lexer = Self::new(source);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn loc(&self) -> CodeLoc {
        CodeLoc::new(self.line, self.col)
    }

    /// Skips whitespace and comments. Fails on an unterminated block comment.
    fn skip_trivia(&mut self) -> Result<(), Exception> {
        loop {
            match self.peek() {
                Some(' ' | '\t' | '\r' | '\n') => {
                    self.advance();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    while let Some(ch) = self.peek() {
                        if ch == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    let start = self.loc();
                    self.advance();
                    self.advance();
                    // Block comments do not nest.
                    loop {
                        match self.peek() {
                            Some('*') if self.peek_at(1) == Some('/') => {
                                self.advance();
                                self.advance();
                                break;
                            }
                            Some(_) => {
                                self.advance();
                            }
                            None => {
                                return Err(Exception::lex("unterminated block comment", start));
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    /// Scans the next token.
    pub fn next_token(&mut self) -> Result<Token, Exception> {
        self.skip_trivia()?;
        let loc = self.loc();
        let Some(ch) = self.peek() else {
            return Ok(Token::new(TokenKind::Eof, "", loc));
        };

        if ch.is_ascii_digit() {
            return self.scan_number(loc);
        }
        if ch.is_ascii_alphabetic() || ch == '_' {
            return Ok(self.scan_ident(loc));
        }
        if ch == '"' {
            return self.scan_string(loc);
        }
        self.scan_operator(loc)
    }

    fn scan_number(&mut self, loc: CodeLoc) -> Result<Token, Exception> {
        let mut text = String::new();
        while let Some(ch) = self.peek() {
            if !ch.is_ascii_digit() {
                break;
            }
            text.push(ch);
            self.advance();
        }

        // A '.' continues the literal only when a digit follows; `1..3` is an
        // integer followed by a range operator.
        let is_float = self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit());
        if !is_float {
            return Ok(Token::new(TokenKind::Int, text, loc));
        }

        text.push('.');
        self.advance();
        while let Some(ch) = self.peek() {
            if !ch.is_ascii_digit() {
                break;
            }
            text.push(ch);
            self.advance();
        }

        if matches!(self.peek(), Some('e' | 'E')) {
            let mut offset = 1;
            if matches!(self.peek_at(1), Some('+' | '-')) {
                offset = 2;
            }
            if self.peek_at(offset).is_some_and(|c| c.is_ascii_digit()) {
                for _ in 0..offset {
                    text.push(self.advance().unwrap_or_default());
                }
                while let Some(ch) = self.peek() {
                    if !ch.is_ascii_digit() {
                        break;
                    }
                    text.push(ch);
                    self.advance();
                }
            }
        }

        Ok(Token::new(TokenKind::Float, text, loc))
    }

    fn scan_ident(&mut self, loc: CodeLoc) -> Token {
        let mut text = String::new();
        while let Some(ch) = self.peek() {
            if !(ch.is_ascii_alphanumeric() || ch == '_') {
                break;
            }
            text.push(ch);
            self.advance();
        }
        let kind = keyword_kind(&text).unwrap_or(TokenKind::Ident);
        Token::new(kind, text, loc)
    }

    fn scan_string(&mut self, loc: CodeLoc) -> Result<Token, Exception> {
        self.advance(); // opening quote
        let mut text = String::new();
        loop {
            match self.peek() {
                None | Some('\n') => {
                    return Err(Exception::lex("unterminated string literal", loc));
                }
                Some('"') => {
                    self.advance();
                    return Ok(Token::new(TokenKind::Str, text, loc));
                }
                Some('\\') => {
                    let escape_loc = self.loc();
                    self.advance();
                    let Some(escape) = self.advance() else {
                        return Err(Exception::lex("unterminated string literal", loc));
                    };
                    match escape {
                        'n' => text.push('\n'),
                        't' => text.push('\t'),
                        'r' => text.push('\r'),
                        '\\' => text.push('\\'),
                        '"' => text.push('"'),
                        '0' => text.push('\0'),
                        'u' => {
                            let mut code = 0u32;
                            for _ in 0..4 {
                                let Some(digit) = self.peek().and_then(|c| c.to_digit(16)) else {
                                    return Err(Exception::lex(
                                        "\\u escape requires four hex digits",
                                        escape_loc,
                                    ));
                                };
                                code = code * 16 + digit;
                                self.advance();
                            }
                            let Some(decoded) = char::from_u32(code) else {
                                return Err(Exception::lex(
                                    format!("\\u{code:04X} is not a valid code point"),
                                    escape_loc,
                                ));
                            };
                            text.push(decoded);
                        }
                        other => {
                            return Err(Exception::lex(
                                format!("unknown escape sequence '\\{other}'"),
                                escape_loc,
                            ));
                        }
                    }
                }
                Some(ch) => {
                    text.push(ch);
                    self.advance();
                }
            }
        }
    }

    fn scan_operator(&mut self, loc: CodeLoc) -> Result<Token, Exception> {
        // Multi-character operators match greedily.
        let two: Option<(char, char)> = match (self.peek(), self.peek_at(1)) {
            (Some(a), Some(b)) => Some((a, b)),
            _ => None,
        };
        if let Some(pair) = two {
            let kind = match pair {
                ('=', '=') => Some(TokenKind::EqEq),
                ('!', '=') => Some(TokenKind::NotEq),
                ('<', '=') => Some(TokenKind::LtEq),
                ('>', '=') => Some(TokenKind::GtEq),
                ('&', '&') => Some(TokenKind::AndAnd),
                ('|', '|') => Some(TokenKind::OrOr),
                ('-', '>') => Some(TokenKind::Arrow),
                ('.', '.') => Some(TokenKind::DotDot),
                _ => None,
            };
            if let Some(kind) = kind {
                let mut lexeme = String::new();
                lexeme.push(pair.0);
                lexeme.push(pair.1);
                self.advance();
                self.advance();
                return Ok(Token::new(kind, lexeme, loc));
            }
        }

        let ch = self.peek().unwrap_or_default();
        let kind = match ch {
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '<' => TokenKind::Lt,
            '>' => TokenKind::Gt,
            '=' => TokenKind::Eq,
            '!' => TokenKind::Bang,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            ';' => TokenKind::Semi,
            '.' => TokenKind::Dot,
            '@' => TokenKind::At,
            other => {
                return Err(Exception::lex(format!("unexpected character '{other}'"), loc));
            }
        };
        self.advance();
        Ok(Token::new(kind, ch, loc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn scans_integer_range_without_float_confusion() {
        assert_eq!(
            kinds("1..3"),
            vec![TokenKind::Int, TokenKind::DotDot, TokenKind::Int, TokenKind::Eof]
        );
    }

    #[test]
    fn scans_float_with_exponent() {
        let tokens = Lexer::tokenize("2.5e-3").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Float);
        assert_eq!(tokens[0].lexeme, "2.5e-3");
    }

    #[test]
    fn retags_keywords() {
        assert_eq!(
            kinds("let personality say xs"),
            vec![
                TokenKind::Let,
                TokenKind::Personality,
                TokenKind::Say,
                TokenKind::Ident,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn decodes_escapes_in_string_literals() {
        let tokens = Lexer::tokenize(r#""a\nA""#).unwrap();
        assert_eq!(tokens[0].lexeme, "a\nA");
    }

    #[test]
    fn tracks_line_and_column() {
        let tokens = Lexer::tokenize("let x\n  = 1").unwrap();
        assert_eq!(tokens[0].loc, CodeLoc::new(1, 1));
        assert_eq!(tokens[1].loc, CodeLoc::new(1, 5));
        assert_eq!(tokens[2].loc, CodeLoc::new(2, 3));
        assert_eq!(tokens[3].loc, CodeLoc::new(2, 5));
    }

    #[test]
    fn unterminated_block_comment_fails() {
        let err = Lexer::tokenize("1 + /* nope").unwrap_err();
        assert!(err.message().contains("unterminated block comment"));
    }

    #[test]
    fn unknown_escape_fails() {
        let err = Lexer::tokenize(r#""\q""#).unwrap_err();
        assert!(err.message().contains("unknown escape"));
    }

    #[test]
    fn greedy_operator_matching() {
        assert_eq!(
            kinds("a<=b->c"),
            vec![
                TokenKind::Ident,
                TokenKind::LtEq,
                TokenKind::Ident,
                TokenKind::Arrow,
                TokenKind::Ident,
                TokenKind::Eof
            ]
        );
    }
}
