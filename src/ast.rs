#[derive(Debug, Clone)]
pub struct Program {
    pub name: String,
    pub block: Block,
}

#[derive(Debug, Clone, Default)]
pub struct Block {
    pub consts: Vec<ConstDecl>,
    pub types: Vec<TypeDecl>,
    pub vars: Vec<VarDecl>,
    pub routines: Vec<RoutineDecl>,
    pub body: Stmt,
}

#[derive(Debug, Clone)]
pub struct ConstDecl {
    pub name: String,
    pub expr: ConstExpr,
}

#[derive(Debug, Clone)]
pub struct TypeDecl {
    pub name: String,
    pub spec: TypeSpec,
}

#[derive(Debug, Clone)]
pub struct VarDecl {
    pub name: String,
    pub ty: TypeRef,
}

#[derive(Debug, Clone)]
pub enum RoutineDecl {
    Procedure(ProcedureDecl),
    Function(FunctionDecl),
}

impl RoutineDecl {
    pub fn name(&self) -> &str {
        match self {
            RoutineDecl::Procedure(p) => &p.name,
            RoutineDecl::Function(f) => &f.name,
        }
    }

    pub fn params(&self) -> &[ParamDecl] {
        match self {
            RoutineDecl::Procedure(p) => &p.params,
            RoutineDecl::Function(f) => &f.params,
        }
    }

    pub fn block(&self) -> &Block {
        match self {
            RoutineDecl::Procedure(p) => &p.block,
            RoutineDecl::Function(f) => &f.block,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcedureDecl {
    pub name: String,
    pub params: Vec<ParamDecl>,
    pub block: Block,
}

#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<ParamDecl>,
    pub ret_ty: TypeRef,
    pub block: Block,
}

#[derive(Debug, Clone)]
pub struct ParamDecl {
    pub name: String,
    pub ty: TypeRef,
    pub by_ref: bool,
}

#[derive(Debug, Clone)]
pub enum TypeSpec {
    Basic(BasicType),
    Enum(Vec<String>),
    Record(Vec<FieldDecl>),
    Array { dims: Vec<IndexRange>, elem: TypeRef },
    Alias(TypeRef),
}

/// `[hi]` means `0..hi-1`; `[lo..hi]` is inclusive on both ends.
#[derive(Debug, Clone)]
pub struct IndexRange {
    pub low: Option<ConstExpr>,
    pub high: ConstExpr,
}

#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub name: String,
    pub ty: TypeRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasicType {
    Integer,
    Real,
    Boolean,
    Char,
    String,
}

#[derive(Debug, Clone)]
pub enum TypeRef {
    Basic(BasicType),
    Named(String),
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Empty,
    Compound(Vec<Stmt>),
    Assign(LValue, Expr),
    Read(Vec<LValue>),
    ReadLn(Vec<LValue>),
    For {
        var: String,
        init: Expr,
        limit: Expr,
        downto: bool,
        body: Box<Stmt>,
    },
    If(Expr, Box<Stmt>, Option<Box<Stmt>>),
    While(Expr, Box<Stmt>),
    Repeat(Vec<Stmt>, Expr),
    Case {
        expr: Expr,
        arms: Vec<CaseArm>,
        else_stmt: Option<Box<Stmt>>,
    },
    ProcCall(String, Vec<Expr>),
    Write(Vec<WriteArg>),
    WriteLn(Vec<WriteArg>),
}

impl Default for Stmt {
    fn default() -> Self {
        Self::Empty
    }
}

#[derive(Debug, Clone)]
pub struct CaseArm {
    pub consts: Vec<ConstExpr>,
    pub body: Stmt,
}

#[derive(Debug, Clone)]
pub struct WriteArg {
    pub expr: Expr,
    pub width: Option<FieldWidth>,
}

/// `:w` or `:w:d` after a write argument; a leading `-` left-justifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldWidth {
    pub left: bool,
    pub width: u32,
    pub decimals: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct LValue {
    pub base: String,
    pub sels: Vec<Selector>,
}

#[derive(Debug, Clone)]
pub enum Selector {
    Field(String),
    Index(Vec<Expr>),
}

#[derive(Debug, Clone)]
pub enum Expr {
    Int(i32),
    Real(f32),
    Bool(bool),
    Char(u32), // #nn
    Str(String), // quoted literal of any length
    Var(String),
    Call(String, Vec<Expr>),
    Field(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Unary(UnOp, Box<Expr>),
    Binary(Box<Expr>, BinOp, Box<Expr>),
}

#[derive(Debug, Clone)]
pub enum ConstExpr {
    Int(i32),
    Real(f32),
    Bool(bool),
    Char(u32),
    Str(String),
    Const(String),
    Call(String, Vec<ConstExpr>),
    Unary(UnOp, Box<ConstExpr>),
    Binary(Box<ConstExpr>, BinOp, Box<ConstExpr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    IntDiv,
    Mod,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinOp {
    pub fn is_relational(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }
}
