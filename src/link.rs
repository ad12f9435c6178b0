//! Late binding of abstract instructions to Jasmin assembler text.

use std::fmt::Write as _;

use crate::ast::BasicType;
use crate::code::{ArithOp, Boxed, Code, FieldRef, Instr, Kind, MethodRef, Owner, ParamDesc, Primitive, Relation};
use crate::codegen::{ClassKind, ClassUnit, MethodKind, MethodUnit};
use crate::sema::TypeInfo;

const SCANNER: &str = "java/util/Scanner";
const PRINT_STREAM: &str = "java/io/PrintStream";

/// Renders every unit; returns `(class name, listing)` pairs in input order.
pub fn render(units: &[ClassUnit], class: &str) -> Vec<(String, String)> {
    let linker = Linker { class };
    units.iter().map(|u| linker.class_unit(u)).collect()
}

struct Linker<'a> {
    class: &'a str,
}

impl Linker<'_> {
    fn record_class(&self, name: &str) -> String {
        format!("{}${name}", self.class)
    }

    fn owner(&self, o: &Owner) -> String {
        match o {
            Owner::Program => self.class.to_string(),
            Owner::Record(r) => self.record_class(r),
        }
    }

    fn descriptor(&self, ty: &TypeInfo) -> String {
        match ty {
            TypeInfo::Basic(BasicType::Integer) | TypeInfo::Enum(_) => "I".into(),
            TypeInfo::Basic(BasicType::Real) => "F".into(),
            TypeInfo::Basic(BasicType::Boolean) => "Z".into(),
            TypeInfo::Basic(BasicType::Char) => "C".into(),
            TypeInfo::Basic(BasicType::String) => "Ljava/lang/String;".into(),
            TypeInfo::Record(r) => format!("L{};", self.record_class(&r.name)),
            TypeInfo::Array(a) => format!("[{}", self.descriptor(&a.elem_ty)),
        }
    }

    fn method_descriptor(&self, m: &MethodRef) -> String {
        let mut d = String::from("(");
        for p in &m.params {
            match p {
                ParamDesc::Value(t) => d.push_str(&self.descriptor(t)),
                ParamDesc::Cell(t) => {
                    d.push('[');
                    d.push_str(&self.descriptor(t));
                }
            }
        }
        d.push(')');
        match &m.ret {
            Some(t) => d.push_str(&self.descriptor(t)),
            None => d.push('V'),
        }
        d
    }

    fn field(&self, f: &FieldRef) -> String {
        format!("{}/{} {}", self.owner(&f.owner), f.name, self.descriptor(&f.ty))
    }

    fn class_unit(&self, u: &ClassUnit) -> (String, String) {
        let name = match &u.kind {
            ClassKind::Program => self.class.to_string(),
            ClassKind::Record(r) => self.record_class(r),
        };
        let mut out = String::new();
        let _ = writeln!(out, ".class public {name}");
        let _ = writeln!(out, ".super java/lang/Object");
        out.push('\n');
        if u.kind == ClassKind::Program {
            let _ = writeln!(out, ".field private static _sysin L{SCANNER};");
        }
        for f in &u.fields {
            let access = match u.kind {
                ClassKind::Program => "private static",
                ClassKind::Record(_) => "public",
            };
            let _ = writeln!(out, ".field {access} {} {}", f.name, self.descriptor(&f.ty));
        }
        for m in &u.methods {
            out.push('\n');
            self.method(&mut out, m);
        }
        (name, out)
    }

    fn method(&self, out: &mut String, m: &MethodUnit) {
        let header = match &m.kind {
            MethodKind::Constructor => "public <init>()V".to_string(),
            MethodKind::Main => "public static main([Ljava/lang/String;)V".to_string(),
            MethodKind::Routine(r) => format!("private static {}{}", r.name, self.method_descriptor(r)),
        };
        let _ = writeln!(out, ".method {header}");
        let _ = writeln!(out, "    .limit stack {}", m.code.max_stack);
        let _ = writeln!(out, "    .limit locals {}", m.max_locals);
        out.push('\n');
        for ins in &m.code.instrs {
            self.instr(out, &m.code, ins);
        }
        let _ = writeln!(out, ".end method");
    }

    fn instr(&self, out: &mut String, code: &Code, ins: &Instr) {
        if let Instr::Label(l) = ins {
            let _ = writeln!(out, "{}:", code.label_name(*l));
            return;
        }
        let mut line = |s: String| {
            let _ = writeln!(out, "    {s}");
        };
        match ins {
            Instr::Label(_) => {}
            Instr::Goto(l) => line(format!("goto {}", code.label_name(*l))),
            Instr::IfZero(r, l) => line(format!("if{} {}", relation(*r), code.label_name(*l))),
            Instr::IfIcmp(r, l) => line(format!("if_icmp{} {}", relation(*r), code.label_name(*l))),
            Instr::Lookupswitch { pairs, default } => {
                line("lookupswitch".to_string());
                for (k, l) in pairs {
                    line(format!("  {k} : {}", code.label_name(*l)));
                }
                line(format!("  default : {}", code.label_name(*default)));
            }
            Instr::Return(None) => line("return".into()),
            Instr::Return(Some(k)) => line(format!("{}return", prefix(*k))),
            Instr::PushInt(i) => line(push_int(*i)),
            Instr::PushFloat(f) => line(push_float(*f)),
            Instr::PushString(s) => line(format!("ldc {}", quote(s))),
            Instr::Load(k, slot) => line(local_op(prefix(*k), "load", *slot)),
            Instr::Store(k, slot) => line(local_op(prefix(*k), "store", *slot)),
            Instr::GetStatic(f) => line(format!("getstatic {}", self.field(f))),
            Instr::PutStatic(f) => line(format!("putstatic {}", self.field(f))),
            Instr::GetField(f) => line(format!("getfield {}", self.field(f))),
            Instr::PutField(f) => line(format!("putfield {}", self.field(f))),
            Instr::ArrayLoad(k) => line(format!("{}aload", array_prefix(*k))),
            Instr::ArrayStore(k) => line(format!("{}astore", array_prefix(*k))),
            Instr::NewArray(elem) => line(match elem {
                TypeInfo::Basic(BasicType::Integer) | TypeInfo::Enum(_) => "newarray int".into(),
                TypeInfo::Basic(BasicType::Real) => "newarray float".into(),
                TypeInfo::Basic(BasicType::Boolean) => "newarray boolean".into(),
                TypeInfo::Basic(BasicType::Char) => "newarray char".into(),
                TypeInfo::Basic(BasicType::String) => "anewarray java/lang/String".into(),
                TypeInfo::Record(r) => format!("anewarray {}", self.record_class(&r.name)),
                TypeInfo::Array(_) => format!("anewarray {}", self.descriptor(elem)),
            }),
            Instr::NewObjectArray => line("anewarray java/lang/Object".into()),
            Instr::NewRecord(r) => {
                let c = self.record_class(r);
                line(format!("new {c}"));
                line("dup".into());
                line(format!("invokespecial {c}/<init>()V"));
            }
            Instr::Arith(op, k) => line(format!("{}{}", prefix(*k), arith(*op))),
            Instr::I2f => line("i2f".into()),
            Instr::Fcmpg => line("fcmpg".into()),
            Instr::Dup => line("dup".into()),
            Instr::Pop => line("pop".into()),
            Instr::Invoke(p) => {
                for s in self.primitive(*p) {
                    line(s);
                }
            }
            Instr::InvokeStatic(m) => line(format!(
                "invokestatic {}/{}{}",
                self.class,
                m.name,
                self.method_descriptor(m)
            )),
        }
    }

    fn primitive(&self, p: Primitive) -> Vec<String> {
        let sysin = format!("getstatic {}/_sysin L{SCANNER};", self.class);
        let s = |x: &str| x.to_string();
        match p {
            Primitive::StandardOutput => vec![s("getstatic java/lang/System/out Ljava/io/PrintStream;")],
            Primitive::StandardInput => vec![sysin],
            Primitive::OpenInput => vec![
                format!("new {SCANNER}"),
                s("dup"),
                s("getstatic java/lang/System/in Ljava/io/InputStream;"),
                format!("invokespecial {SCANNER}/<init>(Ljava/io/InputStream;)V"),
                format!("putstatic {}/_sysin L{SCANNER};", self.class),
            ],
            Primitive::ObjectInit => vec![s("invokespecial java/lang/Object/<init>()V")],
            Primitive::PrintPlain => vec![format!("invokevirtual {PRINT_STREAM}/print(Ljava/lang/String;)V")],
            Primitive::PrintLine => vec![format!("invokevirtual {PRINT_STREAM}/println()V")],
            Primitive::PrintFormatted => vec![format!(
                "invokevirtual {PRINT_STREAM}/printf(Ljava/lang/String;[Ljava/lang/Object;)L{PRINT_STREAM};"
            )],
            Primitive::ReadInt => vec![format!("invokevirtual {SCANNER}/nextInt()I")],
            Primitive::ReadFloat => vec![format!("invokevirtual {SCANNER}/nextFloat()F")],
            Primitive::ReadBool => vec![format!("invokevirtual {SCANNER}/nextBoolean()Z")],
            Primitive::ReadToken => vec![format!("invokevirtual {SCANNER}/next()Ljava/lang/String;")],
            Primitive::ReadLine => vec![format!("invokevirtual {SCANNER}/nextLine()Ljava/lang/String;")],
            Primitive::UseDelimiter => vec![format!(
                "invokevirtual {SCANNER}/useDelimiter(Ljava/lang/String;)L{SCANNER};"
            )],
            Primitive::ResetDelimiter => vec![format!("invokevirtual {SCANNER}/reset()L{SCANNER};")],
            Primitive::CharAt => vec![s("invokevirtual java/lang/String/charAt(I)C")],
            Primitive::CompareStrings => vec![s("invokevirtual java/lang/String/compareTo(Ljava/lang/String;)I")],
            Primitive::Box(b) => {
                let (class, desc) = match b {
                    Boxed::Int => ("java/lang/Integer", "I"),
                    Boxed::Float => ("java/lang/Float", "F"),
                    Boxed::Bool => ("java/lang/Boolean", "Z"),
                    Boxed::Char => ("java/lang/Character", "C"),
                };
                vec![format!("invokestatic {class}/valueOf({desc})L{class};")]
            }
        }
    }
}

fn relation(r: Relation) -> &'static str {
    match r {
        Relation::Eq => "eq",
        Relation::Ne => "ne",
        Relation::Lt => "lt",
        Relation::Le => "le",
        Relation::Gt => "gt",
        Relation::Ge => "ge",
    }
}

fn prefix(k: Kind) -> &'static str {
    match k {
        Kind::Int | Kind::Bool | Kind::Char => "i",
        Kind::Float => "f",
        Kind::Ref => "a",
    }
}

fn array_prefix(k: Kind) -> &'static str {
    match k {
        Kind::Int => "i",
        Kind::Float => "f",
        Kind::Bool => "b",
        Kind::Char => "c",
        Kind::Ref => "a",
    }
}

fn arith(op: ArithOp) -> &'static str {
    match op {
        ArithOp::Add => "add",
        ArithOp::Sub => "sub",
        ArithOp::Mul => "mul",
        ArithOp::Div => "div",
        ArithOp::Rem => "rem",
        ArithOp::Neg => "neg",
        ArithOp::And => "and",
        ArithOp::Or => "or",
        ArithOp::Xor => "xor",
    }
}

fn local_op(prefix: &str, op: &str, slot: u16) -> String {
    if slot <= 3 {
        format!("{prefix}{op}_{slot}")
    } else {
        format!("{prefix}{op} {slot}")
    }
}

fn push_int(i: i32) -> String {
    match i {
        -1 => "iconst_m1".into(),
        0..=5 => format!("iconst_{i}"),
        -128..=127 => format!("bipush {i}"),
        -32768..=32767 => format!("sipush {i}"),
        _ => format!("ldc {i}"),
    }
}

fn push_float(f: f32) -> String {
    if f == 0.0 && f.is_sign_positive() {
        "fconst_0".into()
    } else if f == 1.0 {
        "fconst_1".into()
    } else if f == 2.0 {
        "fconst_2".into()
    } else {
        format!("ldc {f:?}")
    }
}

fn quote(s: &str) -> String {
    let mut q = String::with_capacity(s.len() + 2);
    q.push('"');
    for c in s.chars() {
        match c {
            '"' => q.push_str("\\\""),
            '\\' => q.push_str("\\\\"),
            '\n' => q.push_str("\\n"),
            '\t' => q.push_str("\\t"),
            '\r' => q.push_str("\\r"),
            c if c.is_control() => q.push_str(&format!("\\u{:04x}", c as u32)),
            c => q.push(c),
        }
    }
    q.push('"');
    q
}
