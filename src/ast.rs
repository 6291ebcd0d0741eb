// src/ast.rs
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    NotIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone)]
pub enum Expr {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Name(String),
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Attr(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Compare(CmpOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    IfElse {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Lambda(Arc<FunctionDef>),
}

#[derive(Debug, Clone)]
pub struct ParamDef {
    pub name: String,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone)]
pub enum Body {
    /// Lambda body.
    Expr(Expr),
    Block(Vec<Stmt>),
}

#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<ParamDef>,
    pub var_args: Option<String>,
    pub var_kwargs: Option<String>,
    pub body: Body,
}

#[derive(Debug, Clone)]
pub enum Target {
    Name(String),
    Attr(Expr, String),
    Index(Expr, Expr),
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Expr(Expr),
    Assign { target: Target, value: Expr },
    Def(Arc<FunctionDef>),
    Return(Option<Expr>),
    If {
        branches: Vec<(Expr, Vec<Stmt>)>,
        orelse: Vec<Stmt>,
    },
    For {
        var: String,
        iter: Expr,
        body: Vec<Stmt>,
    },
    Pass,
    /// `import a.b` binds `a`; `import a.b as c` binds the leaf module to `c`.
    Import { module: String, alias: Option<String> },
    FromImport {
        module: String,
        names: Vec<(String, Option<String>)>,
    },
}

#[derive(Debug, Clone, Default)]
pub struct Program {
    pub body: Vec<Stmt>,
}

impl Program {
    /// The expression, when the whole program is exactly one expression.
    pub fn as_expression(&self) -> Option<&Expr> {
        match self.body.as_slice() {
            [Stmt::Expr(expr)] => Some(expr),
            _ => None,
        }
    }
}
