//! Recursive-descent parser for formula text.
//!
//! Grammar:
//!
//! ```text
//! sum     := product (('+' | '-') product)*
//! product := unary (('*' | '/') unary)*
//! unary   := '-' unary | power
//! power   := atom ('^' unary)?
//! atom    := number | '@' digits | ident | ident '(' args ')' | '(' sum ')'
//! ```

use crate::error::FormulaError;

/// Binary arithmetic operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `^`
    Pow,
}

/// Built-in function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    /// `sqrt(a)`
    Sqrt,
    /// `exp(a)`
    Exp,
    /// `log(a)`, natural logarithm.
    Log,
    /// `abs(a)`
    Abs,
    /// `sin(a)`
    Sin,
    /// `cos(a)`
    Cos,
    /// `pow(a, b)`
    Pow,
    /// `min(a, b)`
    Min,
    /// `max(a, b)`
    Max,
}

impl Function {
    fn lookup(name: &str) -> Option<Self> {
        Some(match name {
            "sqrt" => Self::Sqrt,
            "exp" => Self::Exp,
            "log" => Self::Log,
            "abs" => Self::Abs,
            "sin" => Self::Sin,
            "cos" => Self::Cos,
            "pow" => Self::Pow,
            "min" => Self::Min,
            "max" => Self::Max,
            _ => return None,
        })
    }

    const fn arity(self) -> usize {
        match self {
            Self::Pow | Self::Min | Self::Max => 2,
            _ => 1,
        }
    }

    fn apply(self, args: &[f64]) -> f64 {
        match self {
            Self::Sqrt => args[0].sqrt(),
            Self::Exp => args[0].exp(),
            Self::Log => args[0].ln(),
            Self::Abs => args[0].abs(),
            Self::Sin => args[0].sin(),
            Self::Cos => args[0].cos(),
            Self::Pow => args[0].powf(args[1]),
            Self::Min => args[0].min(args[1]),
            Self::Max => args[0].max(args[1]),
        }
    }
}

/// Compiled expression tree. Variables are slots into the dependency list.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal.
    Number(f64),
    /// Value of the dependency at this index.
    Slot(usize),
    /// Unary minus.
    Neg(Box<Expr>),
    /// `lhs op rhs`.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        lhs: Box<Expr>,
        /// Right operand.
        rhs: Box<Expr>,
    },
    /// Built-in function call; arity is checked at compile time.
    Call {
        /// Function called.
        function: Function,
        /// Arguments in order.
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Evaluates the tree against dependency values. Slots are bound at
    /// compile time, so indexing cannot go out of range.
    pub(crate) fn eval(&self, slots: &[f64]) -> f64 {
        match self {
            Self::Number(v) => *v,
            Self::Slot(i) => slots[*i],
            Self::Neg(inner) => -inner.eval(slots),
            Self::Binary { op, lhs, rhs } => {
                let a = lhs.eval(slots);
                let b = rhs.eval(slots);
                match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                    BinaryOp::Pow => a.powf(b),
                }
            }
            Self::Call { function, args } => {
                let values: Vec<f64> = args.iter().map(|a| a.eval(slots)).collect();
                function.apply(&values)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Number(f64),
    Ident(String),
    Positional(usize),
    Op(char),
    LParen,
    RParen,
    Comma,
    End,
}

struct FormulaParser<'a> {
    source: &'a str,
    dependencies: &'a [String],
    tokens: Vec<(Tok, usize)>,
    pos: usize,
}

pub(crate) fn parse(source: &str, dependencies: &[String]) -> Result<Expr, FormulaError> {
    let tokens = tokenize(source)?;
    let mut parser = FormulaParser {
        source,
        dependencies,
        tokens,
        pos: 0,
    };
    let expr = parser.sum()?;
    match parser.peek() {
        Tok::End => Ok(expr),
        other => Err(parser.error(format!("unexpected {other:?} after expression"))),
    }
}

fn tokenize(source: &str) -> Result<Vec<(Tok, usize)>, FormulaError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    let syntax = |offset: usize, reason: String| FormulaError::Syntax {
        formula: source.to_string(),
        offset,
        reason,
    };

    while i < bytes.len() {
        let c = bytes[i] as char;
        let start = i;
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                i += 1;
            }
            '+' | '-' | '*' | '/' | '^' => {
                tokens.push((Tok::Op(c), start));
                i += 1;
            }
            '(' => {
                tokens.push((Tok::LParen, start));
                i += 1;
            }
            ')' => {
                tokens.push((Tok::RParen, start));
                i += 1;
            }
            ',' => {
                tokens.push((Tok::Comma, start));
                i += 1;
            }
            '@' => {
                i += 1;
                let digits_start = i;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                let digits = &source[digits_start..i];
                let index = digits
                    .parse::<usize>()
                    .map_err(|_| syntax(start, "expected digits after '@'".to_string()))?;
                tokens.push((Tok::Positional(index), start));
            }
            c if c.is_ascii_digit() || c == '.' => {
                i = scan_number(bytes, i);
                let text = &source[start..i];
                let value = text
                    .parse::<f64>()
                    .map_err(|_| syntax(start, format!("invalid number '{text}'")))?;
                tokens.push((Tok::Number(value), start));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                tokens.push((Tok::Ident(source[start..i].to_string()), start));
            }
            other => {
                return Err(syntax(start, format!("unexpected character '{other}'")));
            }
        }
    }
    tokens.push((Tok::End, source.len()));
    Ok(tokens)
}

/// Scans `digits [. digits] [(e|E) [+|-] digits]` and returns the end offset.
fn scan_number(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        if j < bytes.len() && bytes[j].is_ascii_digit() {
            while j < bytes.len() && bytes[j].is_ascii_digit() {
                j += 1;
            }
            i = j;
        }
    }
    i
}

impl FormulaParser<'_> {
    fn peek(&self) -> &Tok {
        &self.tokens[self.pos].0
    }

    fn offset(&self) -> usize {
        self.tokens[self.pos].1
    }

    fn bump(&mut self) -> Tok {
        let tok = self.tokens[self.pos].0.clone();
        if !matches!(tok, Tok::End) {
            self.pos += 1;
        }
        tok
    }

    fn error(&self, reason: String) -> FormulaError {
        FormulaError::Syntax {
            formula: self.source.to_string(),
            offset: self.offset(),
            reason,
        }
    }

    fn expect(&mut self, want: &Tok, what: &str) -> Result<(), FormulaError> {
        if self.peek() == want {
            self.bump();
            Ok(())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    fn sum(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.product()?;
        loop {
            let op = match self.peek() {
                Tok::Op('+') => BinaryOp::Add,
                Tok::Op('-') => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.bump();
            let rhs = self.product()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn product(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Tok::Op('*') => BinaryOp::Mul,
                Tok::Op('/') => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.bump();
            let rhs = self.unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn unary(&mut self) -> Result<Expr, FormulaError> {
        if matches!(self.peek(), Tok::Op('-')) {
            self.bump();
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        if matches!(self.peek(), Tok::Op('+')) {
            self.bump();
            return self.unary();
        }
        self.power()
    }

    fn power(&mut self) -> Result<Expr, FormulaError> {
        let base = self.atom()?;
        if matches!(self.peek(), Tok::Op('^')) {
            self.bump();
            let exponent = self.unary()?;
            return Ok(Expr::Binary {
                op: BinaryOp::Pow,
                lhs: Box::new(base),
                rhs: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Expr, FormulaError> {
        match self.bump() {
            Tok::Number(v) => Ok(Expr::Number(v)),
            Tok::Positional(index) => {
                if index >= self.dependencies.len() {
                    return Err(FormulaError::PositionalOutOfRange {
                        formula: self.source.to_string(),
                        index,
                        available: self.dependencies.len(),
                    });
                }
                Ok(Expr::Slot(index))
            }
            Tok::Ident(name) => {
                if matches!(self.peek(), Tok::LParen) {
                    return self.call(&name);
                }
                self.dependencies
                    .iter()
                    .position(|d| *d == name)
                    .map(Expr::Slot)
                    .ok_or_else(|| FormulaError::UnknownIdentifier {
                        formula: self.source.to_string(),
                        name,
                    })
            }
            Tok::LParen => {
                let inner = self.sum()?;
                self.expect(&Tok::RParen, "')'")?;
                Ok(inner)
            }
            Tok::End => Err(self.error("unexpected end of formula".to_string())),
            other => Err(self.error(format!("unexpected {other:?}"))),
        }
    }

    fn call(&mut self, name: &str) -> Result<Expr, FormulaError> {
        let function = Function::lookup(name).ok_or_else(|| FormulaError::UnknownFunction {
            name: name.to_string(),
        })?;
        self.expect(&Tok::LParen, "'('")?;
        let mut args = Vec::new();
        if !matches!(self.peek(), Tok::RParen) {
            args.push(self.sum()?);
            while matches!(self.peek(), Tok::Comma) {
                self.bump();
                args.push(self.sum()?);
            }
        }
        self.expect(&Tok::RParen, "')'")?;
        if args.len() != function.arity() {
            return Err(FormulaError::FunctionArity {
                name: name.to_string(),
                expected: function.arity(),
                found: args.len(),
            });
        }
        Ok(Expr::Call { function, args })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(source: &str, names: &[&str], values: &[f64]) -> f64 {
        let deps: Vec<String> = names.iter().map(|s| (*s).to_string()).collect();
        parse(source, &deps).unwrap().eval(values)
    }

    #[test]
    fn test_precedence() {
        assert!((eval("1 + 2 * 3", &[], &[]) - 7.0).abs() < 1e-12);
        assert!((eval("(1 + 2) * 3", &[], &[]) - 9.0).abs() < 1e-12);
        assert!((eval("2 ^ 3 ^ 2", &[], &[]) - 512.0).abs() < 1e-9);
        assert!((eval("-2 ^ 2", &[], &[]) + 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_scientific_notation() {
        assert!((eval("2e-3 * 1000", &[], &[]) - 2.0).abs() < 1e-12);
        assert!((eval("1.5E2", &[], &[]) - 150.0).abs() < 1e-12);
    }

    #[test]
    fn test_functions() {
        assert!((eval("sqrt(x)", &["x"], &[9.0]) - 3.0).abs() < 1e-12);
        assert!((eval("max(a, b) - min(a, b)", &["a", "b"], &[2.0, 5.0]) - 3.0).abs() < 1e-12);
        assert!((eval("pow(2, 10)", &[], &[]) - 1024.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_function() {
        let err = parse("tanh(1)", &[]).unwrap_err();
        assert!(matches!(err, FormulaError::UnknownFunction { .. }));
    }

    #[test]
    fn test_function_arity() {
        let err = parse("pow(2)", &[]).unwrap_err();
        assert!(matches!(err, FormulaError::FunctionArity { expected: 2, found: 1, .. }));
    }

    #[test]
    fn test_positional_out_of_range() {
        let deps = vec!["a".to_string()];
        let err = parse("@1", &deps).unwrap_err();
        assert!(matches!(err, FormulaError::PositionalOutOfRange { index: 1, available: 1, .. }));
    }

    #[test]
    fn test_trailing_operator() {
        let err = parse("1.5*", &[]).unwrap_err();
        assert!(matches!(err, FormulaError::Syntax { .. }));
    }

    #[test]
    fn test_unbalanced_paren() {
        assert!(parse("(1 + 2", &[]).is_err());
        assert!(parse("1 + 2)", &[]).is_err());
    }

    #[test]
    fn test_bad_character_offset() {
        let err = parse("1 # 2", &[]).unwrap_err();
        assert!(matches!(err, FormulaError::Syntax { offset: 2, .. }));
    }
}
