// Tokenizer for SchemA source text.
//
// Structural scanning (operators, strings, comments) is done by hand
// so every token carries an exact (line, column); words are then
// classified as integer / float / identifier with regular expressions.

use regex::Regex;

use crate::ast::Pos;
use crate::error::{Error, Result};


#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    MetaIdent(String),
    // Keywords
    Let,
    Do,
    If,
    Else,
    While,
    Until,
    For,
    In,
    Return,
    TypeOf,
    True,
    False,
    // Punctuation and operators
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Semi,
    Dot,
    DotDot,
    DotDotEq,
    Arrow,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    SlashDot,
    Percent,
    Shl,
    Shr,
    Lt,
    Lte,
    Gt,
    Gte,
    EqEq,
    Neq,
    AndAnd,
    OrOr,
    Bang,
    Turnstile,
    Pipe,
    Amp
}


#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: Pos
}


// Decide what a scanned word denotes.
fn classify_word(word: &str, pos: Pos) -> Result<TokenKind> {
    lazy_static! {
        static ref INT_REGEX: Regex = Regex::new("^[0-9]+$").unwrap();
        static ref FLOAT_REGEX: Regex =
            Regex::new(r"^[0-9]+\.[0-9]+$").unwrap();
        static ref IDENT_REGEX: Regex =
            Regex::new("^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
    }

    if INT_REGEX.is_match(word) {
        if let Ok(n) = word.parse::<i64>() {
            return Ok(TokenKind::Int(n));
        }
        return Err(Error::type_error(
            format!("integer literal `{}` out of range", word),
            pos
        ));
    }
    if FLOAT_REGEX.is_match(word) {
        if let Ok(x) = word.parse::<f64>() {
            return Ok(TokenKind::Float(x));
        }
    }
    if IDENT_REGEX.is_match(word) {
        return Ok(match word {
            "let" => TokenKind::Let,
            "do" => TokenKind::Do,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "until" => TokenKind::Until,
            "for" => TokenKind::For,
            "in" => TokenKind::In,
            "return" => TokenKind::Return,
            "typeof" => TokenKind::TypeOf,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            _ => TokenKind::Ident(String::from(word))
        });
    }
    Err(Error::type_error(format!("malformed token `{}`", word), pos))
}


struct Lexer {
    chars: Vec<char>,
    at: usize,
    line: u32,
    column: u32
}

impl Lexer {
    fn new(source: &str) -> Lexer {
        Lexer {
            chars: source.chars().collect(),
            at: 0,
            line: 1,
            column: 1
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.at).cloned()
    }

    fn peek_ahead(&self, n: usize) -> Option<char> {
        self.chars.get(self.at + n).cloned()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.at += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn pos(&self) -> Pos {
        Pos::new(self.line, self.column)
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.bump();
            true
        } else {
            false
        }
    }

    // A run of word characters. The number/identifier split happens in
    // classify_word; the scanner only finds the boundary. A dot joins
    // the word for float literals, but `1..3` keeps its range intact.
    fn scan_word(&mut self) -> String {
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                word.push(c);
                self.bump();
            } else if c == '.'
                && word.chars().all(|w| w.is_ascii_digit())
                && !word.is_empty()
                && self.peek_ahead(1).map_or(false, |n| n.is_ascii_digit())
            {
                word.push(c);
                self.bump();
            } else {
                break;
            }
        }
        word
    }

    fn scan_string(&mut self, pos: Pos) -> Result<TokenKind> {
        self.bump(); // opening quote
        let mut out = String::new();
        loop {
            match self.bump() {
                None => {
                    return Err(Error::type_error(
                        "unterminated string literal",
                        pos
                    ))
                },
                Some('"') => return Ok(TokenKind::Str(out)),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('\\') => out.push('\\'),
                    Some('"') => out.push('"'),
                    other => {
                        return Err(Error::type_error(
                            format!("bad escape `\\{:?}`", other),
                            pos
                        ))
                    }
                },
                Some(c) => out.push(c)
            }
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                },
                Some('#') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                },
                _ => break
            }
        }

        let pos = self.pos();
        let c = match self.peek() {
            None => return Ok(None),
            Some(c) => c
        };

        let kind = if c == '"' {
            self.scan_string(pos)?
        } else if c.is_ascii_alphanumeric() || c == '_' {
            let word = self.scan_word();
            classify_word(&word, pos)?
        } else if c == '@' {
            self.bump();
            let word = self.scan_word();
            match classify_word(&word, pos)? {
                TokenKind::Ident(name) => TokenKind::MetaIdent(name),
                _ => {
                    return Err(Error::type_error(
                        format!("`@{}` is not a meta-identifier", word),
                        pos
                    ))
                }
            }
        } else {
            self.bump();
            match c {
                '(' => TokenKind::LParen,
                ')' => TokenKind::RParen,
                '{' => TokenKind::LBrace,
                '}' => TokenKind::RBrace,
                '[' => TokenKind::LBracket,
                ']' => TokenKind::RBracket,
                ',' => TokenKind::Comma,
                ':' => TokenKind::Colon,
                ';' => TokenKind::Semi,
                '+' => TokenKind::Plus,
                '%' => TokenKind::Percent,
                '.' => {
                    if self.eat('.') {
                        if self.eat('=') {
                            TokenKind::DotDotEq
                        } else {
                            TokenKind::DotDot
                        }
                    } else {
                        TokenKind::Dot
                    }
                },
                '-' => {
                    if self.eat('>') {
                        TokenKind::Arrow
                    } else {
                        TokenKind::Minus
                    }
                },
                '*' => TokenKind::Star,
                '/' => {
                    if self.eat('.') {
                        TokenKind::SlashDot
                    } else {
                        TokenKind::Slash
                    }
                },
                '<' => {
                    if self.eat('<') {
                        TokenKind::Shl
                    } else if self.eat('=') {
                        TokenKind::Lte
                    } else {
                        TokenKind::Lt
                    }
                },
                '>' => {
                    if self.eat('>') {
                        TokenKind::Shr
                    } else if self.eat('=') {
                        TokenKind::Gte
                    } else {
                        TokenKind::Gt
                    }
                },
                '=' => {
                    if self.eat('=') {
                        TokenKind::EqEq
                    } else {
                        TokenKind::Assign
                    }
                },
                '!' => {
                    if self.eat('=') {
                        TokenKind::Neq
                    } else {
                        TokenKind::Bang
                    }
                },
                '&' => {
                    if self.eat('&') {
                        TokenKind::AndAnd
                    } else {
                        TokenKind::Amp
                    }
                },
                '|' => {
                    if self.eat('|') {
                        TokenKind::OrOr
                    } else if self.eat('-') {
                        TokenKind::Turnstile
                    } else {
                        TokenKind::Pipe
                    }
                },
                other => {
                    return Err(Error::type_error(
                        format!("unexpected character `{}`", other),
                        pos
                    ))
                }
            }
        };

        Ok(Some(Token {kind, pos}))
    }
}


pub fn lex(source: &str) -> Result<Vec<Token>> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token()? {
        tokens.push(token);
    }
    Ok(tokens)
}


#[cfg(test)]
mod tests {
    use super::*;
    use TokenKind::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_words() {
        assert_eq!(
            kinds("let x = 42"),
            vec![Let, Ident(String::from("x")), Assign, Int(42)]
        );
        assert_eq!(kinds("42.5"), vec![Float(42.5)]);
        assert_eq!(kinds("true false"), vec![True, False]);
    }

    #[test]
    fn test_range_does_not_eat_float_dot() {
        assert_eq!(kinds("1..3"), vec![Int(1), DotDot, Int(3)]);
        assert_eq!(kinds("1..=3"), vec![Int(1), DotDotEq, Int(3)]);
        assert_eq!(kinds("1.5..3"), vec![Float(1.5), DotDot, Int(3)]);
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("a |- @sorted"),
            vec![
                Ident(String::from("a")),
                Turnstile,
                MetaIdent(String::from("sorted"))
            ]
        );
        assert_eq!(kinds("7 /. 2"), vec![Int(7), SlashDot, Int(2)]);
        assert_eq!(kinds("a || b | c"), vec![
            Ident(String::from("a")),
            OrOr,
            Ident(String::from("b")),
            Pipe,
            Ident(String::from("c"))
        ]);
        assert_eq!(kinds("x -> y - z"), vec![
            Ident(String::from("x")),
            Arrow,
            Ident(String::from("y")),
            Minus,
            Ident(String::from("z"))
        ]);
    }

    #[test]
    fn test_strings_and_comments() {
        assert_eq!(
            kinds("\"a\\nb\" # trailing comment\n1"),
            vec![Str(String::from("a\nb")), Int(1)]
        );
        assert!(lex("\"open").is_err());
    }

    #[test]
    fn test_positions() {
        let tokens = lex("let x\n  = 1").unwrap();
        assert_eq!(tokens[0].pos, Pos::new(1, 1));
        assert_eq!(tokens[1].pos, Pos::new(1, 5));
        assert_eq!(tokens[2].pos, Pos::new(2, 3));
        assert_eq!(tokens[3].pos, Pos::new(2, 5));
    }
}
