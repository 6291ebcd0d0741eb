// src/grammar.rs
//! Recursive-descent parser for the snippet language.
//!
//! Precedence, loosest first: `lambda` / conditional, `or`, `and`, `not`,
//! comparisons (chained), `+ -`, `* / // %`, unary `- +`, `**`, then
//! calls, attribute access and subscripts.

use std::sync::Arc;

use crate::ast::{BinOp, Body, CmpOp, Expr, FunctionDef, ParamDef, Program, Stmt, Target, UnaryOp};
use crate::cursor::ParseError;
use crate::lexer::{tokenize, Tok, Token};

const KEYWORDS: &[&str] = &[
    "and", "as", "def", "elif", "else", "for", "from", "if", "import", "in", "lambda", "not", "or",
    "pass", "return", "True", "False", "None",
];

/// Deepest nesting of brackets, unary operators and suites the parser accepts.
const MAX_NESTING: usize = 200;

pub fn is_keyword(name: &str) -> bool {
    KEYWORDS.contains(&name)
}

pub fn parse_program(source: &str) -> Result<Program, ParseError> {
    let tokens = tokenize(source)?;
    let mut p = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    p.program()
}

type Params = (Vec<ParamDef>, Option<String>, Option<String>);

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn tok_at(&self, i: usize) -> &Tok {
        let i = i.min(self.tokens.len() - 1);
        &self.tokens[i].tok
    }

    fn peek(&self) -> &Tok {
        self.tok_at(self.pos)
    }

    fn advance(&mut self) -> Tok {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn error(&self, msg: impl std::fmt::Display) -> ParseError {
        let line = self.tokens[self.pos.min(self.tokens.len() - 1)].line;
        ParseError::InvalidSyntax(format!("line {line}: {msg}"))
    }

    fn nested<T>(
        &mut self,
        rule: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        if self.depth >= MAX_NESTING {
            return Err(self.error("too many nested parentheses"));
        }
        self.depth += 1;
        let out = rule(self);
        self.depth -= 1;
        out
    }

    fn unexpected(&self, wanted: &str) -> ParseError {
        self.error(format!("expected {wanted}, found {}", self.peek()))
    }

    fn is_op(&self, op: &str) -> bool {
        matches!(self.peek(), Tok::Op(o) if *o == op)
    }

    fn is_kw(&self, kw: &str) -> bool {
        matches!(self.peek(), Tok::Name(n) if n == kw)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.is_op(op) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_kw(&mut self, kw: &str) -> bool {
        if self.is_kw(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<(), ParseError> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{op}'")))
        }
    }

    fn expect_kw(&mut self, kw: &str) -> Result<(), ParseError> {
        if self.eat_kw(kw) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{kw}'")))
        }
    }

    fn expect_name(&mut self) -> Result<String, ParseError> {
        match self.peek() {
            Tok::Name(n) if !is_keyword(n) => {
                let n = n.clone();
                self.advance();
                Ok(n)
            }
            _ => Err(self.unexpected("a name")),
        }
    }

    fn skip_newlines(&mut self) {
        while *self.peek() == Tok::Newline {
            self.advance();
        }
    }

    // ---------- statements ----------

    fn program(&mut self) -> Result<Program, ParseError> {
        let mut body = Vec::new();
        loop {
            self.skip_newlines();
            if *self.peek() == Tok::Eof {
                break;
            }
            body.extend(self.statement()?);
        }
        Ok(Program { body })
    }

    fn statement(&mut self) -> Result<Vec<Stmt>, ParseError> {
        if self.is_kw("def") {
            return Ok(vec![Stmt::Def(self.def()?)]);
        }
        if self.is_kw("if") {
            return Ok(vec![self.if_stmt()?]);
        }
        if self.is_kw("for") {
            return Ok(vec![self.for_stmt()?]);
        }
        self.simple_line()
    }

    fn simple_line(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut out = vec![self.simple()?];
        while self.eat_op(";") {
            if matches!(self.peek(), Tok::Newline | Tok::Eof) {
                break;
            }
            out.push(self.simple()?);
        }
        match self.peek() {
            Tok::Newline => {
                self.advance();
                Ok(out)
            }
            Tok::Eof => Ok(out),
            _ => Err(self.unexpected("end of line")),
        }
    }

    fn simple(&mut self) -> Result<Stmt, ParseError> {
        if self.eat_kw("pass") {
            return Ok(Stmt::Pass);
        }
        if self.eat_kw("return") {
            if matches!(self.peek(), Tok::Newline | Tok::Eof) || self.is_op(";") {
                return Ok(Stmt::Return(None));
            }
            return Ok(Stmt::Return(Some(self.expr()?)));
        }
        if self.eat_kw("import") {
            let module = self.dotted_name()?;
            let alias = if self.eat_kw("as") {
                Some(self.expect_name()?)
            } else {
                None
            };
            return Ok(Stmt::Import { module, alias });
        }
        if self.eat_kw("from") {
            let module = self.dotted_name()?;
            self.expect_kw("import")?;
            let parenthesized = self.eat_op("(");
            let mut names = Vec::new();
            loop {
                let name = self.expect_name()?;
                let alias = if self.eat_kw("as") {
                    Some(self.expect_name()?)
                } else {
                    None
                };
                names.push((name, alias));
                if !self.eat_op(",") || (parenthesized && self.is_op(")")) {
                    break;
                }
            }
            if parenthesized {
                self.expect_op(")")?;
            }
            return Ok(Stmt::FromImport { module, names });
        }

        let expr = self.expr()?;
        if self.eat_op("=") {
            let target = self.to_target(expr)?;
            let value = self.expr()?;
            return Ok(Stmt::Assign { target, value });
        }
        for (op, bin) in [
            ("+=", BinOp::Add),
            ("-=", BinOp::Sub),
            ("*=", BinOp::Mul),
            ("/=", BinOp::Div),
        ] {
            if self.eat_op(op) {
                let target = self.to_target(expr.clone())?;
                let value = self.expr()?;
                return Ok(Stmt::Assign {
                    target,
                    value: Expr::Binary(bin, Box::new(expr), Box::new(value)),
                });
            }
        }
        Ok(Stmt::Expr(expr))
    }

    fn to_target(&self, expr: Expr) -> Result<Target, ParseError> {
        match expr {
            Expr::Name(n) => Ok(Target::Name(n)),
            Expr::Attr(obj, name) => Ok(Target::Attr(*obj, name)),
            Expr::Index(obj, idx) => Ok(Target::Index(*obj, *idx)),
            _ => Err(self.error("cannot assign to expression")),
        }
    }

    fn dotted_name(&mut self) -> Result<String, ParseError> {
        let mut parts = vec![self.expect_name()?];
        while self.eat_op(".") {
            parts.push(self.expect_name()?);
        }
        Ok(parts.join("."))
    }

    fn suite(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.nested(Self::suite_body)
    }

    fn suite_body(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect_op(":")?;
        if *self.peek() != Tok::Newline {
            return self.simple_line();
        }
        self.advance();
        self.skip_newlines();
        if *self.peek() != Tok::Indent {
            return Err(self.unexpected("an indented block"));
        }
        self.advance();
        let mut body = Vec::new();
        loop {
            self.skip_newlines();
            match self.peek() {
                Tok::Dedent => {
                    self.advance();
                    break;
                }
                Tok::Eof => break,
                _ => body.extend(self.statement()?),
            }
        }
        Ok(body)
    }

    fn def(&mut self) -> Result<Arc<FunctionDef>, ParseError> {
        self.expect_kw("def")?;
        let name = self.expect_name()?;
        self.expect_op("(")?;
        let (params, var_args, var_kwargs) = self.params(")")?;
        self.expect_op(")")?;
        let body = self.suite()?;
        Ok(Arc::new(FunctionDef {
            name,
            params,
            var_args,
            var_kwargs,
            body: Body::Block(body),
        }))
    }

    fn params(&mut self, closing: &str) -> Result<Params, ParseError> {
        let mut params: Vec<ParamDef> = Vec::new();
        let mut var_args = None;
        let mut var_kwargs = None;
        loop {
            if self.is_op(closing) {
                break;
            }
            if var_kwargs.is_some() {
                return Err(self.error("no parameters may follow '**'"));
            }
            if self.eat_op("**") {
                var_kwargs = Some(self.expect_name()?);
            } else if self.eat_op("*") {
                if var_args.is_some() {
                    return Err(self.error("duplicate '*' parameter"));
                }
                var_args = Some(self.expect_name()?);
            } else {
                if var_args.is_some() {
                    return Err(self.error("keyword-only parameters are not supported"));
                }
                let name = self.expect_name()?;
                if params.iter().any(|p| p.name == name) {
                    return Err(self.error(format!("duplicate argument '{name}' in function definition")));
                }
                let default = if self.eat_op("=") {
                    Some(self.or_expr()?)
                } else {
                    if params.last().is_some_and(|p| p.default.is_some()) {
                        return Err(self.error("non-default argument follows default argument"));
                    }
                    None
                };
                params.push(ParamDef { name, default });
            }
            if !self.eat_op(",") {
                break;
            }
        }
        Ok((params, var_args, var_kwargs))
    }

    fn if_stmt(&mut self) -> Result<Stmt, ParseError> {
        self.expect_kw("if")?;
        let mut branches = Vec::new();
        let cond = self.expr()?;
        branches.push((cond, self.suite()?));
        let mut orelse = Vec::new();
        loop {
            self.skip_newlines();
            if self.eat_kw("elif") {
                let cond = self.expr()?;
                branches.push((cond, self.suite()?));
            } else {
                if self.eat_kw("else") {
                    orelse = self.suite()?;
                }
                break;
            }
        }
        Ok(Stmt::If { branches, orelse })
    }

    fn for_stmt(&mut self) -> Result<Stmt, ParseError> {
        self.expect_kw("for")?;
        let var = self.expect_name()?;
        self.expect_kw("in")?;
        let iter = self.expr()?;
        let body = self.suite()?;
        Ok(Stmt::For { var, iter, body })
    }

    // ---------- expressions ----------

    fn expr(&mut self) -> Result<Expr, ParseError> {
        self.nested(Self::conditional)
    }

    fn conditional(&mut self) -> Result<Expr, ParseError> {
        if self.is_kw("lambda") {
            return self.lambda();
        }
        let e = self.or_expr()?;
        if self.eat_kw("if") {
            let cond = self.or_expr()?;
            self.expect_kw("else")?;
            let otherwise = self.expr()?;
            return Ok(Expr::IfElse {
                cond: Box::new(cond),
                then: Box::new(e),
                otherwise: Box::new(otherwise),
            });
        }
        Ok(e)
    }

    fn lambda(&mut self) -> Result<Expr, ParseError> {
        self.expect_kw("lambda")?;
        let (params, var_args, var_kwargs) = self.params(":")?;
        self.expect_op(":")?;
        let body = self.expr()?;
        Ok(Expr::Lambda(Arc::new(FunctionDef {
            name: "<lambda>".to_string(),
            params,
            var_args,
            var_kwargs,
            body: Body::Expr(body),
        })))
    }

    fn or_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.and_expr()?;
        while self.eat_kw("or") {
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.not_expr()?;
        while self.eat_kw("and") {
            let right = self.not_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr, ParseError> {
        if self.eat_kw("not") {
            let inner = self.nested(Self::not_expr)?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(inner)));
        }
        self.comparison()
    }

    fn cmp_op(&mut self) -> Option<CmpOp> {
        let op = match self.peek() {
            Tok::Op("==") => CmpOp::Eq,
            Tok::Op("!=") => CmpOp::Ne,
            Tok::Op("<") => CmpOp::Lt,
            Tok::Op("<=") => CmpOp::Lte,
            Tok::Op(">") => CmpOp::Gt,
            Tok::Op(">=") => CmpOp::Gte,
            Tok::Name(n) if n == "in" => CmpOp::In,
            Tok::Name(n) if n == "not" && matches!(self.tok_at(self.pos + 1), Tok::Name(m) if m == "in") => {
                self.advance();
                CmpOp::NotIn
            }
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let first = self.arith()?;
        let mut result: Option<Expr> = None;
        let mut left = first.clone();
        while let Some(op) = self.cmp_op() {
            let right = self.arith()?;
            let cmp = Expr::Compare(op, Box::new(left), Box::new(right.clone()));
            result = Some(match result {
                None => cmp,
                Some(prev) => Expr::And(Box::new(prev), Box::new(cmp)),
            });
            left = right;
        }
        Ok(result.unwrap_or(first))
    }

    fn arith(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.term()?;
        loop {
            let op = if self.eat_op("+") {
                BinOp::Add
            } else if self.eat_op("-") {
                BinOp::Sub
            } else {
                break;
            };
            let right = self.term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.factor()?;
        loop {
            let op = if self.eat_op("*") {
                BinOp::Mul
            } else if self.eat_op("//") {
                BinOp::FloorDiv
            } else if self.eat_op("/") {
                BinOp::Div
            } else if self.eat_op("%") {
                BinOp::Mod
            } else {
                break;
            };
            let right = self.factor()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn factor(&mut self) -> Result<Expr, ParseError> {
        self.nested(Self::unary)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if self.eat_op("-") {
            let inner = self.factor()?;
            return Ok(match inner {
                Expr::Int(i) => Expr::Int(-i),
                Expr::Float(f) => Expr::Float(-f),
                other => Expr::Unary(UnaryOp::Neg, Box::new(other)),
            });
        }
        if self.eat_op("+") {
            let inner = self.factor()?;
            return Ok(Expr::Unary(UnaryOp::Pos, Box::new(inner)));
        }
        self.power()
    }

    fn power(&mut self) -> Result<Expr, ParseError> {
        let base = self.postfix()?;
        if self.eat_op("**") {
            let exp = self.factor()?;
            return Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exp)));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let mut e = self.atom()?;
        loop {
            if self.eat_op("(") {
                let (args, kwargs) = self.call_args()?;
                self.expect_op(")")?;
                e = Expr::Call {
                    func: Box::new(e),
                    args,
                    kwargs,
                };
            } else if self.eat_op(".") {
                let name = self.expect_name()?;
                e = Expr::Attr(Box::new(e), name);
            } else if self.eat_op("[") {
                let idx = self.expr()?;
                self.expect_op("]")?;
                e = Expr::Index(Box::new(e), Box::new(idx));
            } else {
                break;
            }
        }
        Ok(e)
    }

    fn call_args(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>), ParseError> {
        let mut args = Vec::new();
        let mut kwargs: Vec<(String, Expr)> = Vec::new();
        while !self.is_op(")") {
            let is_keyword_arg = matches!(self.peek(), Tok::Name(n) if !is_keyword(n))
                && matches!(self.tok_at(self.pos + 1), Tok::Op("="));
            if is_keyword_arg {
                let name = self.expect_name()?;
                self.advance();
                if kwargs.iter().any(|(k, _)| *k == name) {
                    return Err(self.error(format!("keyword argument repeated: {name}")));
                }
                kwargs.push((name, self.expr()?));
            } else {
                if !kwargs.is_empty() {
                    return Err(self.error("positional argument follows keyword argument"));
                }
                args.push(self.expr()?);
            }
            if !self.eat_op(",") {
                break;
            }
        }
        Ok((args, kwargs))
    }

    fn atom(&mut self) -> Result<Expr, ParseError> {
        match self.advance() {
            Tok::Int(i) => Ok(Expr::Int(i)),
            Tok::Float(f) => Ok(Expr::Float(f)),
            Tok::Str(mut s) => {
                while let Tok::Str(next) = self.peek() {
                    s.push_str(next);
                    self.advance();
                }
                Ok(Expr::Str(s))
            }
            Tok::Name(n) => {
                let expr = match n.as_str() {
                    "True" => Expr::Bool(true),
                    "False" => Expr::Bool(false),
                    "None" => Expr::None,
                    kw if is_keyword(kw) => {
                        self.pos -= 1;
                        return Err(self.unexpected("an expression"));
                    }
                    _ => Expr::Name(n.clone()),
                };
                Ok(expr)
            }
            Tok::Op("(") => {
                let inner = self.expr()?;
                self.expect_op(")")?;
                Ok(inner)
            }
            Tok::Op("[") => {
                let mut items = Vec::new();
                while !self.is_op("]") {
                    items.push(self.expr()?);
                    if !self.eat_op(",") {
                        break;
                    }
                }
                self.expect_op("]")?;
                Ok(Expr::List(items))
            }
            Tok::Op("{") => {
                let mut entries = Vec::new();
                while !self.is_op("}") {
                    let key = self.expr()?;
                    self.expect_op(":")?;
                    let value = self.expr()?;
                    entries.push((key, value));
                    if !self.eat_op(",") {
                        break;
                    }
                }
                self.expect_op("}")?;
                Ok(Expr::Dict(entries))
            }
            tok => Err(self.error(format!("expected an expression, found {tok}"))),
        }
    }
}
