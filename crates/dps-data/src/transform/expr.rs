//! Arithmetic expressions for computed columns
//!
//! Supports expressions like:
//! - `price * quantity`
//! - `(high - low) / 2`
//! - `` `unit price` × 1.2 ``
//! - `-offset % 7`
//!
//! Operands must be numeric columns or number literals. Nulls propagate and
//! division or modulo by zero yields null.

use dps_core::{Column, ColumnType, DpsError, Result, Table, Value};

use super::{rebuild, require_free_name};

/// A parsed arithmetic expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(String),
    Int(i64),
    Float(f64),
    Neg(Box<Expr>),
    Binary { op: BinOp, lhs: Box<Expr>, rhs: Box<Expr> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add, // +
    Sub, // - or −
    Mul, // * or ×
    Div, // / or ÷
    Rem, // %
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Op(BinOp),
    LParen,
    RParen,
    Eof,
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
}

impl Lexer {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek();
        self.pos += 1;
        ch
    }

    fn skip_whitespace(&mut self) {
        while self.peek().map_or(false, char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn read_ident(&mut self) -> String {
        let mut ident = String::new();
        while let Some(ch) = self.peek() {
            if ch.is_alphanumeric() || ch == '_' {
                ident.push(ch);
                self.pos += 1;
            } else {
                break;
            }
        }
        ident
    }

    fn read_quoted(&mut self) -> Result<Token> {
        self.advance();
        let mut ident = String::new();
        loop {
            match self.advance() {
                Some('`') => return Ok(Token::Ident(ident)),
                Some(ch) => ident.push(ch),
                None => return Err(invalid("unterminated `quoted` column name")),
            }
        }
    }

    fn read_number(&mut self) -> Result<Token> {
        let mut text = String::new();
        let mut is_float = false;
        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                text.push(ch);
            } else if ch == '.' && !is_float {
                is_float = true;
                text.push(ch);
            } else if (ch == 'e' || ch == 'E') && !text.is_empty() {
                is_float = true;
                text.push(ch);
                self.pos += 1;
                if let Some(sign @ ('+' | '-')) = self.peek() {
                    text.push(sign);
                    self.pos += 1;
                }
                continue;
            } else {
                break;
            }
            self.pos += 1;
        }
        if is_float {
            text.parse::<f64>()
                .map(Token::Float)
                .map_err(|_| invalid(&format!("bad number '{}'", text)))
        } else {
            text.parse::<i64>()
                .map(Token::Int)
                .map_err(|_| invalid(&format!("bad number '{}'", text)))
        }
    }

    fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace();
        let Some(ch) = self.peek() else {
            return Ok(Token::Eof);
        };
        if ch.is_ascii_digit() || ch == '.' {
            return self.read_number();
        }
        if ch.is_alphabetic() || ch == '_' {
            return Ok(Token::Ident(self.read_ident()));
        }
        if ch == '`' {
            return self.read_quoted();
        }
        self.advance();
        Ok(match ch {
            '+' => Token::Op(BinOp::Add),
            '-' | '−' => Token::Op(BinOp::Sub),
            '*' | '×' => Token::Op(BinOp::Mul),
            '/' | '÷' => Token::Op(BinOp::Div),
            '%' => Token::Op(BinOp::Rem),
            '(' => Token::LParen,
            ')' => Token::RParen,
            other => return Err(invalid(&format!("unexpected character '{}'", other))),
        })
    }
}

/// Deepest nesting of parentheses and unary signs accepted
const MAX_NESTING: usize = 256;
/// Most binary operators in one expression; bounds the depth of operator chains
const MAX_OPERATORS: usize = 4096;

struct Parser {
    lexer: Lexer,
    current: Token,
    nesting: usize,
    operators: usize,
}

impl Parser {
    fn new(input: &str) -> Result<Self> {
        let mut lexer = Lexer::new(input);
        let current = lexer.next_token()?;
        Ok(Self { lexer, current, nesting: 0, operators: 0 })
    }

    fn operator(&mut self) -> Result<()> {
        self.operators += 1;
        if self.operators > MAX_OPERATORS {
            return Err(invalid("too many operators"));
        }
        self.advance()
    }

    fn advance(&mut self) -> Result<()> {
        self.current = self.lexer.next_token()?;
        Ok(())
    }

    fn parse(&mut self) -> Result<Expr> {
        let expr = self.parse_sum()?;
        if self.current != Token::Eof {
            return Err(invalid(&format!("unexpected {:?}", self.current)));
        }
        Ok(expr)
    }

    fn parse_sum(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_product()?;
        while let Token::Op(op @ (BinOp::Add | BinOp::Sub)) = self.current {
            self.operator()?;
            let rhs = self.parse_product()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_product(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;
        while let Token::Op(op @ (BinOp::Mul | BinOp::Div | BinOp::Rem)) = self.current {
            self.operator()?;
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.nesting >= MAX_NESTING {
            return Err(invalid("nested too deeply"));
        }
        self.nesting += 1;
        let expr = self.parse_signed();
        self.nesting -= 1;
        expr
    }

    fn parse_signed(&mut self) -> Result<Expr> {
        match self.current {
            Token::Op(BinOp::Sub) => {
                self.advance()?;
                Ok(Expr::Neg(Box::new(self.parse_unary()?)))
            }
            Token::Op(BinOp::Add) => {
                self.advance()?;
                self.parse_unary()
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let token = std::mem::replace(&mut self.current, Token::Eof);
        self.advance()?;
        match token {
            Token::Ident(name) => Ok(Expr::Column(name)),
            Token::Int(i) => Ok(Expr::Int(i)),
            Token::Float(f) => Ok(Expr::Float(f)),
            Token::LParen => {
                let inner = self.parse_sum()?;
                if self.current != Token::RParen {
                    return Err(invalid("missing closing parenthesis"));
                }
                self.advance()?;
                Ok(inner)
            }
            Token::Eof => Err(invalid("unexpected end of expression")),
            other => Err(invalid(&format!("unexpected {:?}", other))),
        }
    }
}

fn invalid(detail: &str) -> DpsError {
    DpsError::InvalidOperation(format!("Invalid expression: {}", detail))
}

/// Parse an arithmetic expression
pub fn parse_expr(input: &str) -> Result<Expr> {
    if input.trim().is_empty() {
        return Err(invalid("expression is empty"));
    }
    Parser::new(input)?.parse()
}

impl Expr {
    /// Column names referenced, in first-use order
    pub fn columns(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns(&self, out: &mut Vec<String>) {
        match self {
            Expr::Column(name) => {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
            Expr::Neg(inner) => inner.collect_columns(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_columns(out);
                rhs.collect_columns(out);
            }
            Expr::Int(_) | Expr::Float(_) => {}
        }
    }

    /// Whether evaluation stays integral given integer columns
    fn is_integral(&self, column_type: &dyn Fn(&str) -> bool) -> bool {
        match self {
            Expr::Column(name) => column_type(name),
            Expr::Int(_) => true,
            Expr::Float(_) => false,
            Expr::Neg(inner) => inner.is_integral(column_type),
            Expr::Binary { op: BinOp::Div, .. } => false,
            Expr::Binary { lhs, rhs, .. } => lhs.is_integral(column_type) && rhs.is_integral(column_type),
        }
    }

    fn eval(&self, row: &dyn Fn(&str) -> Option<Num>) -> Option<Num> {
        match self {
            Expr::Column(name) => row(name),
            Expr::Int(i) => Some(Num::Int(*i)),
            Expr::Float(f) => Some(Num::Float(*f)),
            Expr::Neg(inner) => match inner.eval(row)? {
                Num::Int(i) => i.checked_neg().map(Num::Int),
                Num::Float(f) => Some(Num::Float(-f)),
            },
            Expr::Binary { op, lhs, rhs } => binary(*op, lhs.eval(row)?, rhs.eval(row)?),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }
}

fn binary(op: BinOp, a: Num, b: Num) -> Option<Num> {
    if let (Num::Int(x), Num::Int(y)) = (a, b) {
        return match op {
            BinOp::Add => x.checked_add(y).map(Num::Int),
            BinOp::Sub => x.checked_sub(y).map(Num::Int),
            BinOp::Mul => x.checked_mul(y).map(Num::Int),
            BinOp::Div if y == 0 => None,
            BinOp::Div => Some(Num::Float(x as f64 / y as f64)),
            BinOp::Rem if y == 0 => None,
            BinOp::Rem => x.checked_rem_euclid(y).map(|r| if y < 0 && r != 0 { r + y } else { r }).map(Num::Int),
        };
    }
    let (x, y) = (a.as_f64(), b.as_f64());
    let result = match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div if y == 0.0 => return None,
        BinOp::Div => x / y,
        BinOp::Rem if y == 0.0 => return None,
        BinOp::Rem => {
            // result takes the sign of the divisor
            let r = x % y;
            if r != 0.0 && (r < 0.0) != (y < 0.0) {
                r + y
            } else {
                r
            }
        }
    };
    result.is_finite().then_some(Num::Float(result))
}

/// Add `new_name` with the value of `expression` for every row
pub fn computed_column(table: &Table, new_name: &str, expression: &str) -> Result<Table> {
    require_free_name(table, new_name)?;
    let expr = parse_expr(expression)?;
    let referenced: Vec<Column> = expr
        .columns()
        .iter()
        .map(|name| table.column(name))
        .collect::<Result<_>>()?;
    for column in &referenced {
        column.require_numeric()?;
    }

    let integral = expr.is_integral(&|name: &str| {
        referenced
            .iter()
            .any(|c| c.name == name && c.dtype == ColumnType::Integer)
    });
    let values = (0..table.num_rows())
        .map(|row| {
            let lookup = |name: &str| {
                let column = referenced.iter().find(|c| c.name == name)?;
                match &column.values[row] {
                    Value::Int(i) => Some(Num::Int(*i)),
                    other => other.as_f64().map(Num::Float),
                }
            };
            match expr.eval(&lookup) {
                Some(Num::Int(i)) if integral => Value::Int(i),
                Some(n) => Value::Float(n.as_f64()),
                None => Value::Null,
            }
        })
        .collect();

    let dtype = if integral { ColumnType::Integer } else { ColumnType::Float };
    let mut columns = table.columns()?;
    columns.push(Column::new(new_name, dtype, values));
    rebuild(table, columns)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use dps_core::table::table_from;
    use dps_core::ErrorKind;

    fn prices() -> Table {
        table_from(vec![
            ("price", ColumnType::Float, floats(&[Some(2.5), Some(4.0), None])),
            ("qty", ColumnType::Integer, ints(&[Some(2), Some(0), Some(1)])),
            ("unit cost", ColumnType::Integer, ints(&[Some(1), Some(3), Some(5)])),
        ])
        .unwrap()
    }

    #[test]
    fn test_parse_precedence() {
        let expr = parse_expr("a + b * 2").unwrap();
        assert_eq!(
            expr,
            Expr::Binary {
                op: BinOp::Add,
                lhs: Box::new(Expr::Column("a".into())),
                rhs: Box::new(Expr::Binary {
                    op: BinOp::Mul,
                    lhs: Box::new(Expr::Column("b".into())),
                    rhs: Box::new(Expr::Int(2)),
                }),
            }
        );
        assert_eq!(parse_expr("(a)").unwrap(), Expr::Column("a".into()));
    }

    #[test]
    fn test_parse_errors() {
        for bad in ["", "a +", "(a", "a $ b", "`open"] {
            let err = parse_expr(bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidOperation, "{}", bad);
        }
    }

    #[test]
    fn test_nesting_is_bounded() {
        let deep = format!("{}a{}", "(".repeat(200_000), ")".repeat(200_000));
        let err = parse_expr(&deep).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
        assert!(err.to_string().contains("nested too deeply"));

        let signs = format!("{}a", "-".repeat(200_000));
        assert_eq!(parse_expr(&signs).unwrap_err().kind(), ErrorKind::InvalidOperation);

        let chain = vec!["a"; 200_000].join(" + ");
        let err = parse_expr(&chain).unwrap_err();
        assert!(err.to_string().contains("too many operators"));

        let fine = format!("{}a{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(parse_expr(&fine).unwrap(), Expr::Column("a".into()));
    }

    #[test]
    fn test_float_result_and_null_propagation() {
        let out = computed_column(&prices(), "total", "price * qty").unwrap();
        let total = out.column("total").unwrap();
        assert_eq!(total.dtype, ColumnType::Float);
        assert_eq!(total.values, floats(&[Some(5.0), Some(0.0), None]));
    }

    #[test]
    fn test_integer_result_with_quoted_name() {
        let out = computed_column(&prices(), "margin", "`unit cost` × 2 − qty").unwrap();
        let margin = out.column("margin").unwrap();
        assert_eq!(margin.dtype, ColumnType::Integer);
        assert_eq!(margin.values, ints(&[Some(0), Some(6), Some(9)]));
    }

    #[test]
    fn test_division_by_zero_is_null() {
        let out = computed_column(&prices(), "ratio", "`unit cost` ÷ qty").unwrap();
        assert_eq!(out.column("ratio").unwrap().values, floats(&[Some(0.5), None, Some(5.0)]));
        let out = computed_column(&prices(), "m", "`unit cost` % qty").unwrap();
        assert_eq!(out.column("m").unwrap().values, ints(&[Some(1), None, Some(0)]));
    }

    #[test]
    fn test_modulo_follows_divisor_sign() {
        assert!(matches!(binary(BinOp::Rem, Num::Int(-7), Num::Int(3)), Some(Num::Int(2))));
        assert!(matches!(binary(BinOp::Rem, Num::Int(7), Num::Int(-3)), Some(Num::Int(-2))));
        assert!(matches!(binary(BinOp::Rem, Num::Float(-7.0), Num::Float(3.0)), Some(Num::Float(f)) if f == 2.0));
    }

    #[test]
    fn test_existing_name_conflicts() {
        let err = computed_column(&prices(), "qty", "qty * 2").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NameConflict);
        assert_eq!(computed_column(&prices(), "", "qty").unwrap_err().kind(), ErrorKind::InvalidOperation);
    }

    #[test]
    fn test_operand_checks() {
        let err = computed_column(&xy(), "z", "x + y").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
        let err = computed_column(&xy(), "z", "x + nope").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownColumn);
    }
}
