//! Tokenizer for declaration text.

use std::fmt;

use crate::error::SyntaxError;

/// Lexical token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Name or keyword.
    Ident(String),
    /// Numeric literal; the source text is kept because constants are named
    /// by it.
    Number {
        /// Parsed value.
        value: f64,
        /// Literal as written.
        text: String,
    },
    /// Single-quoted formula text.
    Str(String),
    /// `::`
    DoubleColon,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `,`
    Comma,
    /// `*`
    Star,
    /// `|`
    Pipe,
    /// End of input.
    End,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ident(s) => write!(f, "identifier '{s}'"),
            Self::Number { text, .. } => write!(f, "number {text}"),
            Self::Str(s) => write!(f, "string '{s}'"),
            Self::DoubleColon => f.write_str("'::'"),
            Self::LParen => f.write_str("'('"),
            Self::RParen => f.write_str("')'"),
            Self::LBracket => f.write_str("'['"),
            Self::RBracket => f.write_str("']'"),
            Self::LBrace => f.write_str("'{'"),
            Self::RBrace => f.write_str("'}'"),
            Self::Comma => f.write_str("','"),
            Self::Star => f.write_str("'*'"),
            Self::Pipe => f.write_str("'|'"),
            Self::End => f.write_str("end of input"),
        }
    }
}

/// A token with its byte offset.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub offset: usize,
}

/// Splits declaration text into tokens. The result always ends with
/// [`Token::End`].
pub fn tokenize(input: &str) -> Result<Vec<Spanned>, SyntaxError> {
    let mut lexer = Lexer {
        input,
        chars: input.char_indices().peekable(),
        out: Vec::new(),
    };
    lexer.run()?;
    Ok(lexer.out)
}

struct Lexer<'a> {
    input: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    out: Vec<Spanned>,
}

impl Lexer<'_> {
    fn emit(&mut self, token: Token, offset: usize) {
        self.out.push(Spanned { token, offset });
    }

    fn run(&mut self) -> Result<(), SyntaxError> {
        while let Some(&(offset, ch)) = self.chars.peek() {
            match ch {
                c if c.is_whitespace() => {
                    self.chars.next();
                }
                '(' | ')' | '[' | ']' | '{' | '}' | ',' | '*' | '|' => {
                    self.chars.next();
                    let token = match ch {
                        '(' => Token::LParen,
                        ')' => Token::RParen,
                        '[' => Token::LBracket,
                        ']' => Token::RBracket,
                        '{' => Token::LBrace,
                        '}' => Token::RBrace,
                        ',' => Token::Comma,
                        '*' => Token::Star,
                        _ => Token::Pipe,
                    };
                    self.emit(token, offset);
                }
                ':' => {
                    self.chars.next();
                    match self.chars.next() {
                        Some((_, ':')) => self.emit(Token::DoubleColon, offset),
                        Some((at, other)) => {
                            return Err(SyntaxError::UnexpectedChar {
                                ch: other,
                                offset: at,
                            })
                        }
                        None => {
                            return Err(SyntaxError::UnexpectedEnd {
                                expected: "':'".to_string(),
                            })
                        }
                    }
                }
                '\'' | '"' => self.string(offset, ch)?,
                c if c.is_ascii_digit() || c == '.' || c == '-' || c == '+' => {
                    self.number(offset)?;
                }
                c if c.is_ascii_alphabetic() || c == '_' => self.ident(offset),
                other => {
                    return Err(SyntaxError::UnexpectedChar { ch: other, offset });
                }
            }
        }
        self.emit(Token::End, self.input.len());
        Ok(())
    }

    fn string(&mut self, start: usize, quote: char) -> Result<(), SyntaxError> {
        self.chars.next();
        let mut text = String::new();
        for (_, ch) in self.chars.by_ref() {
            if ch == quote {
                self.out.push(Spanned {
                    token: Token::Str(text),
                    offset: start,
                });
                return Ok(());
            }
            text.push(ch);
        }
        Err(SyntaxError::UnterminatedString { offset: start })
    }

    fn number(&mut self, start: usize) -> Result<(), SyntaxError> {
        let mut end = start;
        let mut prev: Option<char> = None;
        while let Some(&(at, ch)) = self.chars.peek() {
            let sign_ok = (ch == '-' || ch == '+')
                && (at == start || matches!(prev, Some('e') | Some('E')));
            if ch.is_ascii_digit() || ch == '.' || ch == 'e' || ch == 'E' || sign_ok {
                self.chars.next();
                end = at + ch.len_utf8();
                prev = Some(ch);
            } else {
                break;
            }
        }
        let text = &self.input[start..end];
        let value = text
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| SyntaxError::InvalidNumber {
                text: text.to_string(),
                offset: start,
            })?;
        self.emit(
            Token::Number {
                value,
                text: text.to_string(),
            },
            start,
        );
        Ok(())
    }

    fn ident(&mut self, start: usize) {
        let mut end = start;
        while let Some(&(at, ch)) = self.chars.peek() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                self.chars.next();
                end = at + 1;
            } else {
                break;
            }
        }
        let text = self.input[start..end].to_string();
        self.emit(Token::Ident(text), start);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<Token> {
        tokenize(input).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn test_pdf_declaration_tokens() {
        let toks = kinds("Gaussian::g1(x, m1, res)");
        assert_eq!(toks[0], Token::Ident("Gaussian".into()));
        assert_eq!(toks[1], Token::DoubleColon);
        assert_eq!(toks[2], Token::Ident("g1".into()));
        assert_eq!(toks[3], Token::LParen);
        assert_eq!(toks.last(), Some(&Token::End));
    }

    #[test]
    fn test_negative_and_exponent_numbers() {
        let toks = kinds("m1[-1,-3e0,3.5E+1]");
        let numbers: Vec<f64> = toks
            .iter()
            .filter_map(|t| match t {
                Token::Number { value, .. } => Some(*value),
                _ => None,
            })
            .collect();
        assert_eq!(numbers, vec![-1.0, -3.0, 35.0]);
    }

    #[test]
    fn test_number_keeps_source_text() {
        let toks = kinds("1.50");
        assert_eq!(
            toks[0],
            Token::Number {
                value: 1.5,
                text: "1.50".into()
            }
        );
    }

    #[test]
    fn test_quoted_formula() {
        let toks = kinds("expr::r('1.5*res', {res})");
        assert!(toks.contains(&Token::Str("1.5*res".into())));
        assert!(toks.contains(&Token::LBrace));
    }

    #[test]
    fn test_pipe_and_star() {
        let toks = kinds("f*g1|res");
        assert_eq!(toks[1], Token::Star);
        assert_eq!(toks[3], Token::Pipe);
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("expr::r('1.5*res").unwrap_err();
        assert_eq!(err, SyntaxError::UnterminatedString { offset: 8 });
    }

    #[test]
    fn test_single_colon_rejected() {
        assert!(matches!(
            tokenize("Gaussian:g"),
            Err(SyntaxError::UnexpectedChar { ch: 'g', .. })
        ));
    }

    #[test]
    fn test_bad_number() {
        assert!(matches!(
            tokenize("x[1..2]"),
            Err(SyntaxError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn test_unexpected_character() {
        assert_eq!(
            tokenize("x$").unwrap_err(),
            SyntaxError::UnexpectedChar { ch: '$', offset: 1 }
        );
    }
}
