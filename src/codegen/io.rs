use super::{Generator, Result};
use crate::ast::{BasicType, FieldWidth};
use crate::code::{Boxed, Instr, Kind, Primitive};
use crate::hir::{VarRef, WriteArg};
use crate::sema::{Form, TypeInfo};

/// Conversion flag picked from the static type alone.
fn conversion_flag(ty: &TypeInfo) -> char {
    match ty {
        TypeInfo::Basic(BasicType::Integer) => 'd',
        TypeInfo::Basic(BasicType::Real) => 'f',
        TypeInfo::Basic(BasicType::Boolean) => 'b',
        TypeInfo::Basic(BasicType::Char) => 'c',
        _ => 's',
    }
}

fn directive(ty: &TypeInfo, width: Option<FieldWidth>) -> String {
    let mut d = String::from("%");
    if let Some(w) = width {
        if w.left {
            d.push('-');
        }
        d.push_str(&w.width.to_string());
        if let Some(dec) = w.decimals {
            d.push('.');
            d.push_str(&dec.to_string());
        }
    }
    d.push(conversion_flag(ty));
    d
}

/// Format text for `args` plus the number of value arguments it expects.
/// Literal `%` is doubled only when the text is handed to `printf`.
pub(crate) fn format_string(args: &[WriteArg], newline: bool) -> (String, usize) {
    let count = args
        .iter()
        .filter(|a| matches!(a, WriteArg::Value { .. }))
        .count();
    let mut fmt = String::new();
    for a in args {
        match a {
            WriteArg::Literal(s) if count > 0 => fmt.push_str(&s.replace('%', "%%")),
            WriteArg::Literal(s) => fmt.push_str(s),
            WriteArg::Value { expr, width } => fmt.push_str(&directive(&expr.ty, *width)),
        }
    }
    if newline {
        fmt.push('\n');
    }
    (fmt, count)
}

impl Generator<'_> {
    pub(super) fn emit_write(&mut self, args: &[WriteArg], newline: bool) -> Result<()> {
        if args.is_empty() {
            if newline {
                self.emit(Instr::Invoke(Primitive::StandardOutput));
                self.emit(Instr::Invoke(Primitive::PrintLine));
            }
            return Ok(());
        }
        let (fmt, count) = format_string(args, newline);
        self.emit(Instr::Invoke(Primitive::StandardOutput));
        self.emit(Instr::PushString(fmt));
        if count == 0 {
            self.emit(Instr::Invoke(Primitive::PrintPlain));
            return Ok(());
        }
        self.emit(Instr::PushInt(count as i32));
        self.emit(Instr::NewObjectArray);
        let values = args.iter().filter_map(|a| match a {
            WriteArg::Value { expr, .. } => Some(expr),
            WriteArg::Literal(_) => None,
        });
        for (i, expr) in values.enumerate() {
            self.emit(Instr::Dup);
            self.emit(Instr::PushInt(i as i32));
            self.emit_expr(expr)?;
            if matches!(expr.ty.form(), Form::Scalar | Form::Enumeration) && !expr.ty.is_string() {
                if let Some(b) = Boxed::of(&expr.ty) {
                    self.emit(Instr::Invoke(Primitive::Box(b)));
                }
            }
            self.emit(Instr::ArrayStore(Kind::Ref));
        }
        self.emit(Instr::Invoke(Primitive::PrintFormatted));
        self.emit(Instr::Pop);
        Ok(())
    }

    pub(super) fn emit_read(&mut self, targets: &[VarRef], line: bool) -> Result<()> {
        for v in targets {
            self.emit_address_prefix(v)?;
            if v.ty.is(BasicType::Char) {
                self.emit_read_char(v)?;
                continue;
            }
            let read = match &v.ty {
                TypeInfo::Basic(BasicType::Integer) => Primitive::ReadInt,
                TypeInfo::Basic(BasicType::Real) => Primitive::ReadFloat,
                TypeInfo::Basic(BasicType::Boolean) => Primitive::ReadBool,
                _ => Primitive::ReadToken,
            };
            self.emit(Instr::Invoke(Primitive::StandardInput));
            self.emit(Instr::Invoke(read));
            self.emit_store(v)?;
        }
        if line {
            self.emit(Instr::Invoke(Primitive::StandardInput));
            self.emit(Instr::Invoke(Primitive::ReadLine));
            self.emit(Instr::Pop);
        }
        Ok(())
    }

    /// Narrow the delimiter to the empty string, take the first character
    /// of the next token, then restore the default delimiter.
    fn emit_read_char(&mut self, v: &VarRef) -> Result<()> {
        self.emit(Instr::Invoke(Primitive::StandardInput));
        self.emit(Instr::PushString(String::new()));
        self.emit(Instr::Invoke(Primitive::UseDelimiter));
        self.emit(Instr::Pop);
        self.emit(Instr::Invoke(Primitive::StandardInput));
        self.emit(Instr::Invoke(Primitive::ReadToken));
        self.emit(Instr::PushInt(0));
        self.emit(Instr::Invoke(Primitive::CharAt));
        self.emit_store(v)?;
        self.emit(Instr::Invoke(Primitive::StandardInput));
        self.emit(Instr::Invoke(Primitive::ResetDelimiter));
        self.emit(Instr::Pop);
        Ok(())
    }
}
