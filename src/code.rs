//! Abstract JVM instruction vocabulary produced by the generator.
//!
//! Nothing here knows a concrete class name or method descriptor; `link`
//! turns these into assembler text.

use std::fmt;

use crate::ast::BasicType;
use crate::sema::TypeInfo;

/// How a value occupies a local slot, field or array element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Int,
    Float,
    Bool,
    Char,
    Ref,
}

impl Kind {
    pub fn of(ty: &TypeInfo) -> Kind {
        match ty {
            TypeInfo::Basic(BasicType::Integer) | TypeInfo::Enum(_) => Kind::Int,
            TypeInfo::Basic(BasicType::Real) => Kind::Float,
            TypeInfo::Basic(BasicType::Boolean) => Kind::Bool,
            TypeInfo::Basic(BasicType::Char) => Kind::Char,
            TypeInfo::Basic(BasicType::String) | TypeInfo::Record(_) | TypeInfo::Array(_) => Kind::Ref,
        }
    }
}

/// Object wrapper a primitive is boxed into before landing in an `Object[]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boxed {
    Int,
    Float,
    Bool,
    Char,
}

impl Boxed {
    /// `None` for values that already are objects.
    pub fn of(ty: &TypeInfo) -> Option<Boxed> {
        match Kind::of(ty) {
            Kind::Int => Some(Boxed::Int),
            Kind::Float => Some(Boxed::Float),
            Kind::Bool => Some(Boxed::Bool),
            Kind::Char => Some(Boxed::Char),
            Kind::Ref => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label(pub(crate) u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Neg,
    And,
    Or,
    Xor,
}

/// Host runtime operations, resolved to concrete symbols at link time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    StandardOutput,
    StandardInput,
    /// Creates the shared scanner over standard input and stores it.
    OpenInput,
    ObjectInit,
    PrintPlain,
    PrintLine,
    PrintFormatted,
    ReadInt,
    ReadFloat,
    ReadBool,
    ReadToken,
    ReadLine,
    UseDelimiter,
    ResetDelimiter,
    CharAt,
    CompareStrings,
    Box(Boxed),
}

impl Primitive {
    pub fn effect(self) -> Effect {
        use Primitive::*;
        match self {
            StandardOutput | StandardInput => Effect::new(0, 1),
            OpenInput => Effect::new(0, 0).with_scratch(3),
            ObjectInit => Effect::new(1, 0),
            PrintPlain => Effect::new(2, 0),
            PrintLine => Effect::new(1, 0),
            PrintFormatted => Effect::new(3, 1),
            ReadInt | ReadFloat | ReadBool | ReadToken | ReadLine => Effect::new(1, 1),
            UseDelimiter => Effect::new(2, 1),
            ResetDelimiter => Effect::new(1, 1),
            CharAt | CompareStrings => Effect::new(2, 1),
            Box(_) => Effect::new(1, 1),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Owner {
    Program,
    Record(String),
}

#[derive(Debug, Clone)]
pub struct FieldRef {
    pub owner: Owner,
    pub name: String,
    pub ty: TypeInfo,
}

#[derive(Debug, Clone)]
pub enum ParamDesc {
    Value(TypeInfo),
    /// Scalar `var` parameter passed as a one-element array.
    Cell(TypeInfo),
}

#[derive(Debug, Clone)]
pub struct MethodRef {
    pub name: String,
    pub params: Vec<ParamDesc>,
    pub ret: Option<TypeInfo>,
}

#[derive(Debug, Clone)]
pub enum Instr {
    Label(Label),
    Goto(Label),
    /// Compares the top value against zero.
    IfZero(Relation, Label),
    IfIcmp(Relation, Label),
    /// `pairs` is sorted by key, ascending.
    Lookupswitch { pairs: Vec<(i32, Label)>, default: Label },
    Return(Option<Kind>),
    PushInt(i32),
    PushFloat(f32),
    PushString(String),
    Load(Kind, u16),
    Store(Kind, u16),
    GetStatic(FieldRef),
    PutStatic(FieldRef),
    GetField(FieldRef),
    PutField(FieldRef),
    ArrayLoad(Kind),
    ArrayStore(Kind),
    /// One-dimensional array of the given element type; length on the stack.
    NewArray(TypeInfo),
    NewObjectArray,
    /// Allocates and constructs an instance of the named record class.
    NewRecord(String),
    Arith(ArithOp, Kind),
    I2f,
    Fcmpg,
    Dup,
    Pop,
    Invoke(Primitive),
    InvokeStatic(MethodRef),
}

/// Operand stack effect of a single instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Effect {
    pub pops: u16,
    pub pushes: u16,
    /// Extra transient depth used above the final result.
    pub scratch: u16,
}

impl Effect {
    pub const fn new(pops: u16, pushes: u16) -> Self {
        Self {
            pops,
            pushes,
            scratch: 0,
        }
    }

    pub const fn with_scratch(self, scratch: u16) -> Self {
        Self { scratch, ..self }
    }
}

impl Instr {
    pub fn effect(&self) -> Effect {
        match self {
            Instr::Label(_) | Instr::Goto(_) => Effect::new(0, 0),
            Instr::IfZero(..) => Effect::new(1, 0),
            Instr::IfIcmp(..) => Effect::new(2, 0),
            Instr::Lookupswitch { .. } => Effect::new(1, 0),
            Instr::Return(k) => Effect::new(u16::from(k.is_some()), 0),
            Instr::PushInt(_) | Instr::PushFloat(_) | Instr::PushString(_) => Effect::new(0, 1),
            Instr::Load(..) | Instr::GetStatic(_) => Effect::new(0, 1),
            Instr::Store(..) | Instr::PutStatic(_) => Effect::new(1, 0),
            Instr::GetField(_) => Effect::new(1, 1),
            Instr::PutField(_) => Effect::new(2, 0),
            Instr::ArrayLoad(_) => Effect::new(2, 1),
            Instr::ArrayStore(_) => Effect::new(3, 0),
            Instr::NewArray(_) | Instr::NewObjectArray => Effect::new(1, 1),
            Instr::NewRecord(_) => Effect::new(0, 1).with_scratch(1),
            Instr::Arith(ArithOp::Neg, _) => Effect::new(1, 1),
            Instr::Arith(..) => Effect::new(2, 1),
            Instr::I2f => Effect::new(1, 1),
            Instr::Fcmpg => Effect::new(2, 1),
            Instr::Dup => Effect::new(1, 2),
            Instr::Pop => Effect::new(1, 0),
            Instr::Invoke(p) => p.effect(),
            Instr::InvokeStatic(m) => Effect::new(m.params.len() as u16, u16::from(m.ret.is_some())),
        }
    }

    /// Labels this instruction may transfer control to.
    pub fn targets(&self) -> Vec<Label> {
        match self {
            Instr::Goto(l) | Instr::IfZero(_, l) | Instr::IfIcmp(_, l) => vec![*l],
            Instr::Lookupswitch { pairs, default } => {
                let mut v: Vec<Label> = pairs.iter().map(|(_, l)| *l).collect();
                v.push(*default);
                v
            }
            _ => vec![],
        }
    }

    /// Control never falls through to the next instruction.
    pub fn ends_flow(&self) -> bool {
        matches!(
            self,
            Instr::Goto(_) | Instr::Lookupswitch { .. } | Instr::Return(_)
        )
    }
}

/// A finished, label-resolved method body.
#[derive(Debug, Clone)]
pub struct Code {
    pub instrs: Vec<Instr>,
    pub max_stack: u16,
    pub(crate) label_names: Vec<String>,
}

impl Code {
    pub fn label_name(&self, l: Label) -> &str {
        self.label_names
            .get(l.0 as usize)
            .map(String::as_str)
            .unwrap_or("L???")
    }
}
