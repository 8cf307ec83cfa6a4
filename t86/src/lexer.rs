use std::fmt;
use std::str::Chars;

use crate::error::{ParseError, ParseResult};

/// A `(line, col)` position in the source text, 1-based like most editors.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Default, Hash)]
pub struct SourceLoc {
    pub line: u32,
    pub col: u32,
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub enum Token {
    Id,
    Num,
    NumFloat,
    Dot,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Plus,
    Times,
    End,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Converts a character stream into a sequence of [`Token`]s. Holds the most
/// recently lexed numeric/identifier value on the side, per [`getNext`]'s
/// contract: call [`Lexer::id`], [`Lexer::number`] or [`Lexer::float_number`]
/// right after a matching token to retrieve it.
///
/// [`getNext`]: Lexer::next_token
pub struct Lexer<'a> {
    chars: Chars<'a>,
    pushback: Option<char>,
    loc: SourceLoc,
    prev_loc: SourceLoc,
    id: String,
    number: i64,
    float_number: f64,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Lexer<'a> {
        Lexer {
            chars: input.chars(),
            pushback: None,
            loc: SourceLoc { line: 1, col: 1 },
            prev_loc: SourceLoc { line: 1, col: 1 },
            id: String::new(),
            number: 0,
            float_number: 0.0,
        }
    }

    pub fn loc(&self) -> SourceLoc {
        self.loc
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn number(&self) -> i64 {
        self.number
    }

    pub fn float_number(&self) -> f64 {
        self.float_number
    }

    fn get_char(&mut self) -> Option<char> {
        let c = self.pushback.take().or_else(|| self.chars.next());
        self.prev_loc = self.loc;
        if let Some(c) = c {
            if c == '\n' {
                self.loc = SourceLoc {
                    line: self.loc.line + 1,
                    col: 1,
                };
            } else {
                self.loc.col += 1;
            }
        }
        c
    }

    /// Pushes a single character back onto the stream, restoring the location
    /// as it was before that character was consumed. Only one slot is kept,
    /// matching the original lexer's single-character `undoGetChar`.
    fn unget_char(&mut self, c: char) {
        self.pushback = Some(c);
        self.loc = self.prev_loc;
    }

    /// Returns the next token, or a [`ParseError`] for a malformed numeric
    /// literal (two `.`/`e` in one literal).
    pub fn next_token(&mut self) -> ParseResult<Token> {
        let Some(c) = self.get_char() else {
            return Ok(Token::End);
        };

        if c == '#' {
            while let Some(c) = self.get_char() {
                if c == '\n' {
                    break;
                }
            }
            return self.next_token();
        }

        if c.is_whitespace() {
            return self.next_token();
        }

        match c {
            ';' => return Ok(Token::Semicolon),
            ',' => return Ok(Token::Comma),
            '[' => return Ok(Token::LBracket),
            ']' => return Ok(Token::RBracket),
            '+' => return Ok(Token::Plus),
            '*' => return Ok(Token::Times),
            '.' => return Ok(Token::Dot),
            _ => {}
        }

        if c.is_ascii_digit() || c == '-' {
            return self.lex_number(c);
        }

        if c.is_ascii_alphabetic() {
            return self.lex_id(c);
        }

        Err(ParseError::new(
            self.loc,
            format!("unexpected character '{}'", c),
        ))
    }

    fn lex_number(&mut self, first: char) -> ParseResult<Token> {
        let neg = first == '-';
        let mut num = String::new();
        if !neg {
            num.push(first);
        }

        let mut has_dot = false;
        let mut has_e = false;

        loop {
            let Some(c) = self.get_char() else { break };
            if c == '.' {
                if has_dot || has_e {
                    return Err(ParseError::new(
                        self.loc,
                        format!("invalid floating point literal: {}{}", num, c),
                    ));
                }
                has_dot = true;
            } else if c == 'e' || c == 'E' {
                if has_e {
                    return Err(ParseError::new(
                        self.loc,
                        format!("invalid floating point literal: {}{}", num, c),
                    ));
                }
                has_e = true;
            } else if c == '+' || c == '-' {
                if !has_e {
                    self.unget_char(c);
                    break;
                }
            } else if !c.is_ascii_digit() {
                self.unget_char(c);
                break;
            }
            num.push(c);
        }

        if has_dot || has_e {
            let value: f64 = num.parse().map_err(|_| {
                ParseError::new(self.loc, format!("invalid floating point literal: {}", num))
            })?;
            self.float_number = if neg { -value } else { value };
            Ok(Token::NumFloat)
        } else {
            let value: i64 = num
                .parse()
                .map_err(|_| ParseError::new(self.loc, format!("invalid integer literal: {}", num)))?;
            self.number = if neg { -value } else { value };
            Ok(Token::Num)
        }
    }

    fn lex_id(&mut self, first: char) -> ParseResult<Token> {
        let mut s = String::new();
        s.push(first);
        loop {
            let Some(c) = self.get_char() else { break };
            if !c.is_ascii_alphanumeric() {
                self.unget_char(c);
                break;
            }
            s.push(c);
        }
        self.id = s;
        Ok(Token::Id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        let mut lex = Lexer::new(input);
        let mut out = Vec::new();
        loop {
            let tok = lex.next_token().unwrap();
            let done = tok == Token::End;
            out.push(tok);
            if done {
                break;
            }
        }
        out
    }

    #[test]
    fn only_ids_round_trip() {
        let mut lex = Lexer::new("A B C D");
        for expected in ["A", "B", "C", "D"] {
            assert_eq!(lex.next_token().unwrap(), Token::Id);
            assert_eq!(lex.id(), expected);
        }
        assert_eq!(lex.next_token().unwrap(), Token::End);
    }

    #[test]
    fn mixed_tokens() {
        use Token::*;
        let expected = [
            Dot, Id, Num, Id, LBracket, Num, RBracket, Semicolon, Num, Id, Id, LBracket, Id, Plus,
            Num, Plus, Id, Times, Num, RBracket, End,
        ];
        assert_eq!(
            tokens(".data 12 MOV[1]; 23 MOV R0 [R0 + 1 + R2 * 2]"),
            expected
        );
    }

    #[test]
    fn negative_integer_is_single_num_token() {
        let mut lex = Lexer::new("-1");
        assert_eq!(lex.next_token().unwrap(), Token::Num);
        assert_eq!(lex.number(), -1);
    }

    #[test]
    fn floats_vs_ints() {
        use Token::*;
        assert_eq!(
            tokens("1.5e2 1 1e10 e E FR1"),
            [NumFloat, Num, NumFloat, Id, Id, Id, End]
        );
    }

    #[test]
    fn scientific_notation_case_2037() {
        let input = "6  MOV FR1, 2.220446049250313E-16\n   7  MOV R0, FR1";
        use Token::*;
        assert_eq!(
            tokens(input),
            [Num, Id, Id, Comma, NumFloat, Num, Id, Id, Comma, Id, End]
        );
    }

    #[test]
    fn double_dot_is_error() {
        let mut lex = Lexer::new("1.2.3");
        assert!(lex.next_token().is_err());
    }

    #[test]
    fn double_exponent_is_error() {
        let mut lex = Lexer::new("1e2e3");
        assert!(lex.next_token().is_err());
    }
}
