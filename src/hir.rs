//! Type-decorated program handed from semantic analysis to code generation.
//! Every expression knows its static type and every variable reference knows
//! where it lives.

use crate::ast::{BinOp, FieldWidth, UnOp};
use crate::sema::{RecordInfo, TypeInfo};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// Static field of the program class.
    Global(String),
    Local(u16),
    /// Local slot holding a one-element array (scalar `var` parameter).
    Cell(u16),
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub binding: Binding,
    pub ty: TypeInfo,
}

#[derive(Debug, Clone)]
pub enum Modifier {
    Field { record: String, name: String, ty: TypeInfo },
    Index { index: Expr, low: i32, elem: TypeInfo },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingMode {
    Plain,
    Field,
    Element,
}

#[derive(Debug, Clone)]
pub struct VarRef {
    pub symbol: Symbol,
    pub modifiers: Vec<Modifier>,
    pub ty: TypeInfo,
}

impl VarRef {
    pub fn plain(symbol: Symbol) -> Self {
        let ty = symbol.ty.clone();
        Self {
            symbol,
            modifiers: vec![],
            ty,
        }
    }

    /// Decided by the last modifier only.
    pub fn addressing_mode(&self) -> AddressingMode {
        match self.modifiers.last() {
            None => AddressingMode::Plain,
            Some(Modifier::Field { .. }) => AddressingMode::Field,
            Some(Modifier::Index { .. }) => AddressingMode::Element,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: TypeInfo,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    /// Integer, boolean, char and enumeration constants.
    Int(i32),
    Real(f32),
    Str(String),
    Var(VarRef),
    Call(Call),
    Unary(UnOp, Box<Expr>),
    Binary(Box<Expr>, BinOp, Box<Expr>),
}

#[derive(Debug, Clone)]
pub struct Param {
    pub ty: TypeInfo,
    pub by_ref: bool,
}

#[derive(Debug, Clone)]
pub struct Routine {
    /// Method name: the declaration path joined with `$`.
    pub name: String,
    pub params: Vec<Param>,
    pub ret: Option<TypeInfo>,
}

#[derive(Debug, Clone)]
pub enum Arg {
    Value(Expr),
    Ref(VarRef),
}

#[derive(Debug, Clone)]
pub struct Call {
    pub routine: Routine,
    pub args: Vec<Arg>,
}

#[derive(Debug, Clone)]
pub enum WriteArg {
    Literal(String),
    Value { expr: Expr, width: Option<FieldWidth> },
}

#[derive(Debug, Clone)]
pub struct CaseBranch {
    pub constants: Vec<i32>,
    pub body: Stmt,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Empty,
    Compound(Vec<Stmt>),
    Assignment {
        target: VarRef,
        value: Expr,
    },
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    Case {
        selector: Expr,
        branches: Vec<CaseBranch>,
        otherwise: Option<Box<Stmt>>,
    },
    Repeat {
        body: Vec<Stmt>,
        cond: Expr,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    For {
        var: VarRef,
        init: Expr,
        limit: Expr,
        downto: bool,
        body: Box<Stmt>,
    },
    ProcedureCall(Call),
    FunctionCall(Call),
    Write(Vec<WriteArg>),
    Writeln(Vec<WriteArg>),
    Read(Vec<VarRef>),
    Readln(Vec<VarRef>),
}

impl Stmt {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Stmt::Empty => "empty",
            Stmt::Compound(_) => "compound",
            Stmt::Assignment { .. } => "assignment",
            Stmt::If { .. } => "if",
            Stmt::Case { .. } => "case",
            Stmt::Repeat { .. } => "repeat",
            Stmt::While { .. } => "while",
            Stmt::For { .. } => "for",
            Stmt::ProcedureCall(_) => "procedure call",
            Stmt::FunctionCall(_) => "function call",
            Stmt::Write(_) => "write",
            Stmt::Writeln(_) => "writeln",
            Stmt::Read(_) => "read",
            Stmt::Readln(_) => "readln",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Global {
    pub name: String,
    pub ty: TypeInfo,
}

#[derive(Debug, Clone)]
pub struct Local {
    pub name: String,
    pub slot: u16,
    pub ty: TypeInfo,
}

#[derive(Debug, Clone)]
pub struct RoutineBody {
    pub routine: Routine,
    /// Parameters occupy slots `0..params.len()`.
    pub params: Vec<Local>,
    pub locals: Vec<Local>,
    /// Slot of the function result variable.
    pub result: Option<Local>,
    pub next_slot: u16,
    pub body: Stmt,
}

#[derive(Debug, Clone)]
pub struct Program {
    pub name: String,
    pub globals: Vec<Global>,
    /// Sorted by name.
    pub records: Vec<RecordInfo>,
    pub routines: Vec<RoutineBody>,
    pub body: Stmt,
}
