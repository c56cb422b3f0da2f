//! Recursive-descent parser for the transformation language.
//!
//! Precedence, loosest first: `or`, `and`, `not`, comparison, `|`, `&`,
//! `+ -`, `* / // %`, unary `- + ~`, then calls, indexing and attribute access.

use super::{
    ast::{BinaryOp, CompareOp, Expr, Literal, LogicalOp, Program, Statement, StatementKind, Target, UnaryOp},
    lexer::{Token, TokenKind, tokenize},
};
use crate::error::{Result, ScoutError};

/// Deepest expression nesting accepted. Brackets, calls, unary operators and
/// each link of an operator chain all count as one level.
pub const MAX_NESTING_DEPTH: usize = 100;

const UNSUPPORTED_KEYWORDS: &[&str] = &[
    "def", "class", "for", "while", "if", "elif", "else", "with", "try", "except", "finally",
    "lambda", "return", "yield", "global", "nonlocal", "del", "from", "raise", "async", "await",
    "pass", "break", "continue", "assert", "is", "in",
];

pub fn parse_program(source: &str) -> Result<Program> {
    let tokens = tokenize(source)?;
    let lines: Vec<&str> = source.lines().collect();
    Parser {
        tokens,
        pos: 0,
        lines,
        depth: 0,
    }
    .program()
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    lines: Vec<&'a str>,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> &Token {
        // The lexer always terminates the stream with Eof.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn error_at(&self, token: &Token, message: impl Into<String>) -> ScoutError {
        ScoutError::Syntax {
            message: message.into(),
            line: token.line,
            column: token.column,
        }
    }

    fn too_deep(&self, token: &Token) -> ScoutError {
        self.error_at(
            token,
            format!("expression nests more than {MAX_NESTING_DEPTH} levels deep"),
        )
    }

    fn descend(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(self.too_deep(self.peek()));
        }
        Ok(())
    }

    fn nested(&mut self, parse: fn(&mut Self) -> Result<Expr>) -> Result<Expr> {
        self.descend()?;
        let expr = parse(self);
        self.depth -= 1;
        expr
    }

    fn unexpected(&self, expected: &str) -> ScoutError {
        let token = self.peek();
        self.error_at(token, format!("expected {expected}, found {}", describe(&token.kind)))
    }

    fn is_punct(&self, punct: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Punct(p) if *p == punct)
    }

    fn is_name(&self, name: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Name(n) if n == name)
    }

    fn eat_punct(&mut self, punct: &str) -> bool {
        if self.is_punct(punct) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, punct: &str) -> Result<()> {
        if self.eat_punct(punct) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{punct}'")))
        }
    }

    fn expect_name(&mut self) -> Result<String> {
        match &self.peek().kind {
            TokenKind::Name(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected("a name")),
        }
    }

    fn program(mut self) -> Result<Program> {
        let mut statements = Vec::new();
        while self.peek().kind != TokenKind::Eof {
            if self.peek().kind == TokenKind::Newline {
                self.advance();
                continue;
            }
            statements.push(self.statement()?);
            match self.peek().kind {
                TokenKind::Newline => {
                    self.advance();
                }
                TokenKind::Eof => {}
                _ => return Err(self.unexpected("end of statement")),
            }
        }
        Ok(Program { statements })
    }

    fn statement(&mut self) -> Result<Statement> {
        let start = self.peek().clone();
        let text = self
            .lines
            .get(start.line.saturating_sub(1))
            .map(|line| line.trim().to_string())
            .unwrap_or_default();
        let kind = if self.is_name("import") {
            self.advance();
            let mut module = self.expect_name()?;
            while self.eat_punct(".") {
                module.push('.');
                module.push_str(&self.expect_name()?);
            }
            let alias = if self.is_name("as") {
                self.advance();
                Some(self.expect_name()?)
            } else {
                None
            };
            StatementKind::Import { module, alias }
        } else {
            let expr = self.expression()?;
            if self.eat_punct("=") {
                let target = self.target(expr, &start)?;
                let value = self.expression()?;
                StatementKind::Assign { target, value }
            } else if let Some(op) = self.augmented_op() {
                self.advance();
                let target = self.target(expr.clone(), &start)?;
                let value = self.expression()?;
                StatementKind::Assign {
                    target,
                    value: Expr::Binary {
                        op,
                        left: Box::new(expr),
                        right: Box::new(value),
                    },
                }
            } else {
                StatementKind::Expr(expr)
            }
        };
        let roots: Vec<&Expr> = match &kind {
            StatementKind::Assign {
                target: Target::Item { object, key },
                value,
            } => vec![object, key, value],
            StatementKind::Assign { value, .. } | StatementKind::Expr(value) => vec![value],
            StatementKind::Import { .. } => Vec::new(),
        };
        if roots.into_iter().any(|root| !within_depth(root, MAX_NESTING_DEPTH)) {
            return Err(self.too_deep(&start));
        }
        Ok(Statement {
            kind,
            line: start.line,
            text,
        })
    }

    fn augmented_op(&self) -> Option<BinaryOp> {
        match &self.peek().kind {
            TokenKind::Punct("+=") => Some(BinaryOp::Add),
            TokenKind::Punct("-=") => Some(BinaryOp::Sub),
            TokenKind::Punct("*=") => Some(BinaryOp::Mul),
            TokenKind::Punct("/=") => Some(BinaryOp::Div),
            _ => None,
        }
    }

    fn target(&self, expr: Expr, start: &Token) -> Result<Target> {
        match expr {
            Expr::Name(name) => Ok(Target::Name(name)),
            Expr::Index { object, key } => Ok(Target::Item {
                object: *object,
                key: *key,
            }),
            _ => Err(self.error_at(
                start,
                "cannot assign to this expression; use a name or table['column']",
            )),
        }
    }

    fn expression(&mut self) -> Result<Expr> {
        self.nested(Self::or_expr)
    }

    fn or_expr(&mut self) -> Result<Expr> {
        let mut left = self.and_expr()?;
        let mut links = 0;
        while self.is_name("or") {
            self.advance();
            self.descend()?;
            links += 1;
            let right = self.and_expr()?;
            left = Expr::Logical {
                op: LogicalOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        self.depth -= links;
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr> {
        let mut left = self.not_expr()?;
        let mut links = 0;
        while self.is_name("and") {
            self.advance();
            self.descend()?;
            links += 1;
            let right = self.not_expr()?;
            left = Expr::Logical {
                op: LogicalOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        self.depth -= links;
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr> {
        if self.is_name("not") {
            self.advance();
            let operand = self.nested(Self::not_expr)?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.comparison()
    }

    fn compare_op(&self) -> Option<CompareOp> {
        match &self.peek().kind {
            TokenKind::Punct("==") => Some(CompareOp::Eq),
            TokenKind::Punct("!=") => Some(CompareOp::Ne),
            TokenKind::Punct("<") => Some(CompareOp::Lt),
            TokenKind::Punct("<=") => Some(CompareOp::Le),
            TokenKind::Punct(">") => Some(CompareOp::Gt),
            TokenKind::Punct(">=") => Some(CompareOp::Ge),
            _ => None,
        }
    }

    fn comparison(&mut self) -> Result<Expr> {
        let left = self.bit_or()?;
        let Some(op) = self.compare_op() else {
            return Ok(left);
        };
        self.advance();
        let right = self.bit_or()?;
        if self.compare_op().is_some() {
            let token = self.peek();
            return Err(self.error_at(
                token,
                "chained comparisons are not supported; combine them with & and parentheses",
            ));
        }
        Ok(Expr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn binary_level(
        &mut self,
        ops: &[(&str, BinaryOp)],
        next: fn(&mut Self) -> Result<Expr>,
    ) -> Result<Expr> {
        let mut left = next(self)?;
        let mut links = 0;
        'outer: loop {
            for (punct, op) in ops {
                if self.eat_punct(punct) {
                    self.descend()?;
                    links += 1;
                    let right = next(self)?;
                    left = Expr::Binary {
                        op: *op,
                        left: Box::new(left),
                        right: Box::new(right),
                    };
                    continue 'outer;
                }
            }
            self.depth -= links;
            return Ok(left);
        }
    }

    fn bit_or(&mut self) -> Result<Expr> {
        self.binary_level(&[("|", BinaryOp::Or)], Self::bit_and)
    }

    fn bit_and(&mut self) -> Result<Expr> {
        self.binary_level(&[("&", BinaryOp::And)], Self::arith)
    }

    fn arith(&mut self) -> Result<Expr> {
        self.binary_level(&[("+", BinaryOp::Add), ("-", BinaryOp::Sub)], Self::term)
    }

    fn term(&mut self) -> Result<Expr> {
        self.binary_level(
            &[
                ("*", BinaryOp::Mul),
                ("/", BinaryOp::Div),
                ("//", BinaryOp::FloorDiv),
                ("%", BinaryOp::Mod),
            ],
            Self::unary,
        )
    }

    fn unary(&mut self) -> Result<Expr> {
        let op = match &self.peek().kind {
            TokenKind::Punct("-") => UnaryOp::Neg,
            TokenKind::Punct("+") => UnaryOp::Pos,
            TokenKind::Punct("~") => UnaryOp::Invert,
            _ => return self.postfix(),
        };
        self.advance();
        let operand = self.nested(Self::unary)?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn postfix(&mut self) -> Result<Expr> {
        let mut expr = self.atom()?;
        let mut links = 0;
        loop {
            if matches!(&self.peek().kind, TokenKind::Punct("(" | "[" | ".")) {
                self.descend()?;
                links += 1;
            }
            if self.eat_punct("(") {
                let (args, kwargs) = self.call_arguments()?;
                expr = Expr::Call {
                    func: Box::new(expr),
                    args,
                    kwargs,
                };
            } else if self.eat_punct("[") {
                let key = self.subscript()?;
                expr = Expr::Index {
                    object: Box::new(expr),
                    key: Box::new(key),
                };
            } else if self.eat_punct(".") {
                let name = self.expect_name()?;
                expr = Expr::Attribute {
                    object: Box::new(expr),
                    name,
                };
            } else {
                self.depth -= links;
                return Ok(expr);
            }
        }
    }

    fn subscript(&mut self) -> Result<Expr> {
        let first = self.expression()?;
        if self.is_punct(":") {
            let token = self.peek();
            return Err(self.error_at(token, "slices are not supported; use .head(n) or .tail(n)"));
        }
        let key = if self.eat_punct(",") {
            let mut items = vec![first];
            while !self.is_punct("]") {
                items.push(self.expression()?);
                if !self.eat_punct(",") {
                    break;
                }
            }
            Expr::List(items)
        } else {
            first
        };
        self.expect_punct("]")?;
        Ok(key)
    }

    fn call_arguments(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>)> {
        let mut args = Vec::new();
        let mut kwargs: Vec<(String, Expr)> = Vec::new();
        while !self.is_punct(")") {
            let is_keyword = matches!(self.peek().kind, TokenKind::Name(_))
                && matches!(
                    self.tokens.get(self.pos + 1).map(|t| &t.kind),
                    Some(TokenKind::Punct("="))
                );
            if is_keyword {
                let start = self.peek().clone();
                let name = self.expect_name()?;
                self.advance();
                if kwargs.iter().any(|(existing, _)| existing == &name) {
                    return Err(self.error_at(&start, format!("keyword argument '{name}' repeated")));
                }
                kwargs.push((name, self.expression()?));
            } else {
                if !kwargs.is_empty() {
                    let token = self.peek();
                    return Err(self.error_at(token, "positional argument follows keyword argument"));
                }
                args.push(self.expression()?);
            }
            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct(")")?;
        Ok((args, kwargs))
    }

    fn atom(&mut self) -> Result<Expr> {
        let token = self.peek().clone();
        match token.kind.clone() {
            TokenKind::Int(i) => {
                self.advance();
                Ok(Expr::Literal(Literal::Int(i)))
            }
            TokenKind::Float(f) => {
                self.advance();
                Ok(Expr::Literal(Literal::Float(f)))
            }
            TokenKind::Str(mut text) => {
                self.advance();
                // Adjacent literals concatenate.
                while let TokenKind::Str(next) = &self.peek().kind {
                    text.push_str(next);
                    self.advance();
                }
                Ok(Expr::Literal(Literal::Str(text)))
            }
            TokenKind::Name(name) => {
                if UNSUPPORTED_KEYWORDS.contains(&name.as_str()) {
                    return Err(self.error_at(
                        &token,
                        format!("'{name}' is not supported in transformation code"),
                    ));
                }
                self.advance();
                Ok(match name.as_str() {
                    "True" => Expr::Literal(Literal::Bool(true)),
                    "False" => Expr::Literal(Literal::Bool(false)),
                    "None" => Expr::Literal(Literal::None),
                    _ => Expr::Name(name),
                })
            }
            TokenKind::Punct("(") => {
                self.advance();
                if self.eat_punct(")") {
                    return Ok(Expr::List(Vec::new()));
                }
                let first = self.expression()?;
                if self.eat_punct(",") {
                    let mut items = vec![first];
                    while !self.is_punct(")") {
                        items.push(self.expression()?);
                        if !self.eat_punct(",") {
                            break;
                        }
                    }
                    self.expect_punct(")")?;
                    return Ok(Expr::List(items));
                }
                self.expect_punct(")")?;
                Ok(first)
            }
            TokenKind::Punct("[") => {
                self.advance();
                let mut items = Vec::new();
                while !self.is_punct("]") {
                    items.push(self.expression()?);
                    if !self.eat_punct(",") {
                        break;
                    }
                }
                self.expect_punct("]")?;
                Ok(Expr::List(items))
            }
            TokenKind::Punct("{") => {
                self.advance();
                let mut entries = Vec::new();
                while !self.is_punct("}") {
                    let key = self.expression()?;
                    self.expect_punct(":")?;
                    let value = self.expression()?;
                    entries.push((key, value));
                    if !self.eat_punct(",") {
                        break;
                    }
                }
                self.expect_punct("}")?;
                Ok(Expr::Dict(entries))
            }
            _ => Err(self.unexpected("an expression")),
        }
    }
}

/// Whether `expr` is at most `budget` levels tall. Recursion stops once the
/// budget runs out.
fn within_depth(expr: &Expr, budget: usize) -> bool {
    let Some(budget) = budget.checked_sub(1) else {
        return false;
    };
    let fits = |child: &Expr| within_depth(child, budget);
    match expr {
        Expr::Literal(_) | Expr::Name(_) => true,
        Expr::List(items) => items.iter().all(fits),
        Expr::Dict(entries) => entries.iter().all(|(key, value)| fits(key) && fits(value)),
        Expr::Unary { operand, .. } => fits(operand),
        Expr::Binary { left, right, .. }
        | Expr::Compare { left, right, .. }
        | Expr::Logical { left, right, .. } => fits(left) && fits(right),
        Expr::Index { object, key } => fits(object) && fits(key),
        Expr::Attribute { object, .. } => fits(object),
        Expr::Call { func, args, kwargs } => {
            fits(func) && args.iter().all(fits) && kwargs.iter().all(|(_, value)| fits(value))
        }
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Name(name) => format!("'{name}'"),
        TokenKind::Int(i) => format!("number {i}"),
        TokenKind::Float(f) => format!("number {f}"),
        TokenKind::Str(_) => "string literal".to_string(),
        TokenKind::Punct(p) => format!("'{p}'"),
        TokenKind::Newline => "end of line".to_string(),
        TokenKind::Eof => "end of input".to_string(),
    }
}
