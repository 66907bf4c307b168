//! Recursive-descent parser for factory declarations.
//!
//! ```text
//! declaration := IDENT '[' NUMBER (',' NUMBER){0,2} ']'
//!              | 'expr' '::' IDENT '(' STRING (',' dep_list)? ')'
//!              | KIND '::' IDENT '(' arg (',' arg)* ')'
//! dep_list    := '{' arg (',' arg)* '}' | arg (',' arg)*
//! arg         := factor ('*' factor)?
//! factor      := primary ('|' IDENT)?
//! primary     := NUMBER | IDENT | declaration
//! ```

use crate::error::SyntaxError;

use super::ast::{Arg, Declaration, PdfDeclKind};
use super::token::{tokenize, Spanned, Token};

/// Parses exactly one declaration.
pub fn parse_declaration(input: &str) -> Result<Declaration, SyntaxError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let decl = match parser.peek().clone() {
        Token::Ident(name) => {
            let offset = parser.offset();
            parser.bump();
            parser.declaration_after_ident(name, offset)?.ok_or_else(|| {
                SyntaxError::Malformed {
                    reason: "expected '[' or '::' after name".to_string(),
                    offset: parser.offset(),
                }
            })?
        }
        Token::End => {
            return Err(SyntaxError::UnexpectedEnd {
                expected: "a declaration".to_string(),
            })
        }
        other => return Err(parser.unexpected(&other, "a declaration")),
    };
    match parser.peek().clone() {
        Token::End => Ok(decl),
        other => Err(parser.unexpected(&other, "end of input")),
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos].token
    }

    fn offset(&self) -> usize {
        self.tokens[self.pos].offset
    }

    fn bump(&mut self) -> Token {
        let token = self.tokens[self.pos].token.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn unexpected(&self, found: &Token, expected: &str) -> SyntaxError {
        if matches!(found, Token::End) {
            SyntaxError::UnexpectedEnd {
                expected: expected.to_string(),
            }
        } else {
            SyntaxError::UnexpectedToken {
                found: found.to_string(),
                expected: expected.to_string(),
                offset: self.offset(),
            }
        }
    }

    fn expect(&mut self, want: &Token) -> Result<(), SyntaxError> {
        if self.peek() == want {
            self.bump();
            Ok(())
        } else {
            let found = self.peek().clone();
            Err(self.unexpected(&found, &want.to_string()))
        }
    }

    fn ident(&mut self, what: &str) -> Result<String, SyntaxError> {
        match self.peek().clone() {
            Token::Ident(name) => {
                self.bump();
                Ok(name)
            }
            other => Err(self.unexpected(&other, what)),
        }
    }

    fn number(&mut self) -> Result<f64, SyntaxError> {
        match self.peek().clone() {
            Token::Number { value, .. } => {
                self.bump();
                Ok(value)
            }
            other => Err(self.unexpected(&other, "a number")),
        }
    }

    /// Continues a declaration whose leading identifier was consumed. Returns
    /// `None` when the identifier is a bare reference.
    fn declaration_after_ident(
        &mut self,
        ident: String,
        offset: usize,
    ) -> Result<Option<Declaration>, SyntaxError> {
        let next = self.peek().clone();
        match next {
            Token::LBracket => self.variable(ident, offset).map(Some),
            Token::DoubleColon => {
                self.bump();
                if ident.eq_ignore_ascii_case("expr") {
                    return self.formula(offset).map(Some);
                }
                let kind = PdfDeclKind::from_keyword(&ident)
                    .ok_or(SyntaxError::UnknownKind { kind: ident, offset })?;
                self.pdf(kind, offset).map(Some)
            }
            _ => Ok(None),
        }
    }

    fn variable(&mut self, name: String, offset: usize) -> Result<Declaration, SyntaxError> {
        self.expect(&Token::LBracket)?;
        let mut values = vec![self.number()?];
        while matches!(self.peek(), Token::Comma) {
            self.bump();
            values.push(self.number()?);
        }
        self.expect(&Token::RBracket)?;
        let (value, lower, upper) = match values.as_slice() {
            [v] => (*v, *v, *v),
            [lo, hi] => (0.5 * (lo + hi), *lo, *hi),
            [v, lo, hi] => (*v, *lo, *hi),
            _ => {
                return Err(SyntaxError::Malformed {
                    reason: format!(
                        "'{name}[...]' takes 1 to 3 numbers, got {}",
                        values.len()
                    ),
                    offset,
                })
            }
        };
        Ok(Declaration::Variable {
            name,
            value,
            lower,
            upper,
            offset,
        })
    }

    fn formula(&mut self, offset: usize) -> Result<Declaration, SyntaxError> {
        let name = self.ident("a parameter name")?;
        self.expect(&Token::LParen)?;
        let formula = match self.peek().clone() {
            Token::Str(s) => {
                self.bump();
                s
            }
            other => return Err(self.unexpected(&other, "a quoted formula")),
        };
        let mut dependencies = Vec::new();
        if matches!(self.peek(), Token::Comma) {
            self.bump();
            if matches!(self.peek(), Token::LBrace) {
                self.bump();
                if !matches!(self.peek(), Token::RBrace) {
                    dependencies = self.arg_list()?;
                }
                self.expect(&Token::RBrace)?;
            } else {
                dependencies = self.arg_list()?;
            }
        }
        self.expect(&Token::RParen)?;
        Ok(Declaration::Formula {
            name,
            formula,
            dependencies,
            offset,
        })
    }

    fn pdf(&mut self, kind: PdfDeclKind, offset: usize) -> Result<Declaration, SyntaxError> {
        let name = self.ident("a pdf name")?;
        self.expect(&Token::LParen)?;
        let args = self.arg_list()?;
        self.expect(&Token::RParen)?;
        Ok(Declaration::Pdf {
            kind,
            name,
            args,
            offset,
        })
    }

    fn arg_list(&mut self) -> Result<Vec<Arg>, SyntaxError> {
        let mut args = vec![self.arg()?];
        while matches!(self.peek(), Token::Comma) {
            self.bump();
            args.push(self.arg()?);
        }
        Ok(args)
    }

    fn arg(&mut self) -> Result<Arg, SyntaxError> {
        let offset = self.offset();
        let first = self.factor()?;
        if matches!(self.peek(), Token::Star) {
            self.bump();
            let pdf = self.factor()?;
            return Ok(Arg::Weighted {
                weight: Box::new(first),
                pdf: Box::new(pdf),
                offset,
            });
        }
        Ok(first)
    }

    fn factor(&mut self) -> Result<Arg, SyntaxError> {
        let offset = self.offset();
        let primary = self.primary()?;
        if matches!(self.peek(), Token::Pipe) {
            self.bump();
            let var = self.ident("a conditioning variable")?;
            return Ok(Arg::Conditioned {
                pdf: Box::new(primary),
                var,
                offset,
            });
        }
        Ok(primary)
    }

    fn primary(&mut self) -> Result<Arg, SyntaxError> {
        let offset = self.offset();
        match self.bump() {
            Token::Number { value, text } => Ok(Arg::Constant { value, text }),
            Token::Ident(name) => match self.declaration_after_ident(name.clone(), offset)? {
                Some(decl) => Ok(Arg::Nested(Box::new(decl))),
                None => Ok(Arg::Ref { name, offset }),
            },
            Token::End => Err(SyntaxError::UnexpectedEnd {
                expected: "an argument".to_string(),
            }),
            other => Err(SyntaxError::UnexpectedToken {
                found: other.to_string(),
                expected: "an argument".to_string(),
                offset,
            }),
        }
    }
}
