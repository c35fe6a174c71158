use std::iter::{Fuse, Peekable};
use std::str::CharIndices;

use crate::error::ScriptError;
use crate::token::{keyword, LitValue, Token, TokenKind};

/// Tokenizes `input`, returning every token it managed to scan alongside
/// any lexical errors encountered along the way (mirrors the teacher's
/// `scan` returning `(Vec<Token>, Vec<String>)` — a partial token stream is
/// still useful for tooling even when errors occurred).
pub fn tokenize(input: &str) -> (Vec<Token>, Vec<ScriptError>) {
    let mut lexer = Lexer::new(input);
    lexer.run();
    (lexer.tokens, lexer.errors)
}

struct Lexer<'a> {
    text: Peekable<Fuse<CharIndices<'a>>>,
    line: usize,
    tokens: Vec<Token>,
    errors: Vec<ScriptError>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Lexer {
            text: input.char_indices().fuse().peekable(),
            line: 1,
            tokens: vec![],
            errors: vec![],
        }
    }

    fn run(&mut self) {
        while let Some(c) = self.peek() {
            match c {
                '\n' => {
                    self.advance();
                    self.line += 1;
                }
                c if c.is_whitespace() => {
                    self.advance();
                }
                '#' => self.line_comment(),
                '"' | '\'' => self.string(c),
                c if c.is_ascii_digit() => self.number(),
                c if is_ident_start(c) => self.identifier(),
                _ => self.punctuation(),
            }
        }
        self.tokens.push(Token::new(TokenKind::Eof, "", self.line));
    }

    fn line_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.advance();
        }
    }

    fn string(&mut self, quote: char) {
        let line = self.line;
        self.advance();
        let mut result = String::new();
        let mut terminated = false;
        while let Some(c) = self.peek() {
            match c {
                c if c == quote => {
                    self.advance();
                    terminated = true;
                    break;
                }
                '\\' => {
                    self.advance();
                    match self.advance() {
                        Some('n') => result.push('\n'),
                        Some('t') => result.push('\t'),
                        Some('r') => result.push('\r'),
                        Some('\\') => result.push('\\'),
                        Some('"') => result.push('"'),
                        Some('\'') => result.push('\''),
                        Some(other) => {
                            self.errors.push(ScriptError::lexical(
                                line,
                                format!("unknown escape sequence '\\{other}'"),
                            ));
                        }
                        None => {}
                    }
                }
                '\n' => {
                    result.push(c);
                    self.advance();
                    self.line += 1;
                }
                _ => {
                    result.push(c);
                    self.advance();
                }
            }
        }
        if !terminated {
            self.errors.push(ScriptError::lexical(line, "unterminated string literal"));
        }
        let lexeme = result.clone();
        self.tokens
            .push(Token::new(TokenKind::String, lexeme, line).with_value(LitValue::Str(result)));
    }

    fn number(&mut self) {
        let line = self.line;
        let mut lexeme = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                lexeme.push(c);
                self.advance();
            } else {
                break;
            }
        }
        let mut is_float = false;
        if self.peek() == Some('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            lexeme.push('.');
            self.advance();
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    lexeme.push(c);
                    self.advance();
                } else {
                    break;
                }
            }
        }
        if is_float {
            let value: f64 = lexeme.parse().unwrap_or(0.0);
            self.tokens
                .push(Token::new(TokenKind::Floating, lexeme, line).with_value(LitValue::Float(value)));
        } else {
            let value: i64 = lexeme.parse().unwrap_or(0);
            self.tokens
                .push(Token::new(TokenKind::Integer, lexeme, line).with_value(LitValue::Int(value)));
        }
    }

    fn identifier(&mut self) {
        let line = self.line;
        let mut lexeme = String::new();
        while let Some(c) = self.peek() {
            if is_ident_continue(c) {
                lexeme.push(c);
                self.advance();
            } else {
                break;
            }
        }
        let kind = keyword(&lexeme).unwrap_or(TokenKind::Identifier);
        self.tokens.push(Token::new(kind, lexeme, line));
    }

    fn punctuation(&mut self) {
        let line = self.line;
        let c = self.advance().unwrap();
        let (kind, lexeme): (TokenKind, String) = match c {
            '{' => (TokenKind::LBrace, "{".into()),
            '}' => (TokenKind::RBrace, "}".into()),
            '(' => (TokenKind::LParen, "(".into()),
            ')' => (TokenKind::RParen, ")".into()),
            '[' => (TokenKind::LBracket, "[".into()),
            ']' => (TokenKind::RBracket, "]".into()),
            ',' => (TokenKind::Comma, ",".into()),
            ':' => (TokenKind::Colon, ":".into()),
            '+' => (TokenKind::Plus, "+".into()),
            '-' => {
                if self.consume('>') {
                    (TokenKind::Arrow, "->".into())
                } else {
                    (TokenKind::Minus, "-".into())
                }
            }
            '*' => (TokenKind::Star, "*".into()),
            '/' => (TokenKind::Slash, "/".into()),
            '%' => (TokenKind::Percent, "%".into()),
            '=' => {
                if self.consume('=') {
                    (TokenKind::EqEq, "==".into())
                } else {
                    (TokenKind::Eq, "=".into())
                }
            }
            '!' => {
                if self.consume('=') {
                    (TokenKind::BangEq, "!=".into())
                } else {
                    self.errors
                        .push(ScriptError::lexical(line, "unexpected character '!'"));
                    return;
                }
            }
            '<' => {
                if self.consume('=') {
                    (TokenKind::LtEq, "<=".into())
                } else {
                    (TokenKind::Lt, "<".into())
                }
            }
            '>' => {
                if self.consume('=') {
                    (TokenKind::GtEq, ">=".into())
                } else {
                    (TokenKind::Gt, ">".into())
                }
            }
            other => {
                self.errors
                    .push(ScriptError::lexical(line, format!("unexpected character '{other}'")));
                return;
            }
        };
        self.tokens.push(Token::new(kind, lexeme, line));
    }

    fn peek(&mut self) -> Option<char> {
        self.text.peek().map(|(_, c)| *c)
    }

    fn peek_next(&mut self) -> Option<char> {
        let mut clone = self.text.clone();
        clone.next();
        clone.peek().map(|(_, c)| *c)
    }

    fn advance(&mut self) -> Option<char> {
        self.text.next().map(|(_, c)| c)
    }

    fn consume(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.advance();
            true
        } else {
            false
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

fn is_ident_continue(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).0.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn empty_input_yields_eof() {
        assert_eq!(kinds(""), vec![TokenKind::Eof]);
    }

    #[test]
    fn keywords_are_not_identifiers() {
        assert_eq!(kinds("bot state"), vec![TokenKind::Bot, TokenKind::State, TokenKind::Eof]);
    }

    #[test]
    fn two_char_operators_match_greedily() {
        assert_eq!(
            kinds("== != <= >= ->"),
            vec![
                TokenKind::EqEq,
                TokenKind::BangEq,
                TokenKind::LtEq,
                TokenKind::GtEq,
                TokenKind::Arrow,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(kinds("var x # a comment\n"), vec![TokenKind::Var, TokenKind::Identifier, TokenKind::Eof]);
    }

    #[test]
    fn integer_vs_floating() {
        let (tokens, errors) = tokenize("1 2.5");
        assert!(errors.is_empty());
        assert_eq!(tokens[0].kind, TokenKind::Integer);
        assert_eq!(tokens[0].value, Some(LitValue::Int(1)));
        assert_eq!(tokens[1].kind, TokenKind::Floating);
        assert_eq!(tokens[1].value, Some(LitValue::Float(2.5)));
    }

    #[test]
    fn string_escapes_are_decoded() {
        let (tokens, errors) = tokenize(r#""a\nb\"c""#);
        assert!(errors.is_empty());
        assert_eq!(tokens[0].value, Some(LitValue::Str("a\nb\"c".into())));
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let (_, errors) = tokenize("\"abc");
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn unicode_identifiers_are_admitted() {
        let (tokens, errors) = tokenize("var 你好 = 1");
        assert!(errors.is_empty());
        assert_eq!(tokens[1].kind, TokenKind::Identifier);
        assert_eq!(tokens[1].lexeme, "你好");
    }

    #[test]
    fn unknown_byte_is_a_lexical_error() {
        let (_, errors) = tokenize("var x = @");
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn line_numbers_track_newlines() {
        let (tokens, _) = tokenize("var x\nvar y");
        let y_tok = tokens.iter().find(|t| t.lexeme == "y").unwrap();
        assert_eq!(y_tok.line, 2);
    }
}
