//! Conversions between Scrap value types
//!
//! Literals are folded at compile time, scalars convert inline, and anything
//! touching strings, lists or `any` values goes through the runtime.

use cranelift_codegen::ir::condcodes::{FloatCC, IntCC};
use cranelift_codegen::ir::{types, InstBuilder, MemFlags, Value};
use cranelift_module::Module;
use scrap_runtime::{text, AnyKind};

use super::codegen::Codegen;
use super::types::{mem_flags, AnyLayout, CraneliftTypes};
use super::{CompileError, CompileResult, DataType, FuncArg};

/// Opaque white, produced by `true`
const COLOR_WHITE: i64 = 0xffff_ffff;
/// Opaque black, produced by `false`
const COLOR_BLACK: i64 = 0x0000_00ff;

impl<M: Module> Codegen<'_, M> {
    fn cast_error(&self, arg: &FuncArg, into: DataType) -> CompileError {
        self.error(format!(
            "Cannot cast type {} into {}",
            arg.data_type().name(),
            into.name()
        ))
    }

    /// Convert to `ty`, producing a value of exactly that type
    pub fn cast_to(&mut self, arg: &FuncArg, ty: DataType) -> CompileResult<FuncArg> {
        Ok(match ty {
            DataType::Integer => FuncArg::Integer(self.to_integer(arg)?),
            DataType::Float => FuncArg::Float(self.to_float(arg)?),
            DataType::Bool => FuncArg::Bool(self.to_bool(arg)?),
            DataType::Color => FuncArg::Color(self.to_color(arg)?),
            DataType::String => FuncArg::String(self.to_string(arg)?),
            DataType::List => FuncArg::List(self.to_list(arg)?),
            DataType::Any => FuncArg::Any(self.to_any(arg)?),
            DataType::Nothing | DataType::Literal | DataType::Blockdef => {
                return Err(self.cast_error(arg, ty))
            }
        })
    }

    pub fn to_integer(&mut self, arg: &FuncArg) -> CompileResult<Value> {
        match arg {
            FuncArg::Literal(literal) => {
                Ok(self.int_const(text::parse_leading_int(literal.as_bytes())))
            }
            FuncArg::Integer(v) | FuncArg::Color(v) => Ok(*v),
            FuncArg::Bool(v) => Ok(self.builder.ins().uextend(CraneliftTypes::INT, *v)),
            FuncArg::Float(v) => Ok(self.builder.ins().fcvt_to_sint_sat(CraneliftTypes::INT, *v)),
            FuncArg::String(v) => self.call_value("scrap_string_to_integer", &[*v]),
            FuncArg::Any(v) => self.call_value("scrap_integer_from_any", &[*v]),
            FuncArg::List(_) | FuncArg::Nothing => Ok(self.int_const(0)),
            FuncArg::Blockdef(_) => Err(self.cast_error(arg, DataType::Integer)),
        }
    }

    pub fn to_float(&mut self, arg: &FuncArg) -> CompileResult<Value> {
        match arg {
            FuncArg::Literal(literal) => {
                Ok(self.float_const(text::parse_leading_float(literal.as_bytes())))
            }
            FuncArg::Integer(v) | FuncArg::Color(v) => {
                Ok(self.builder.ins().fcvt_from_sint(CraneliftTypes::FLOAT, *v))
            }
            FuncArg::Bool(v) => {
                let wide = self.builder.ins().uextend(CraneliftTypes::INT, *v);
                Ok(self.builder.ins().fcvt_from_sint(CraneliftTypes::FLOAT, wide))
            }
            FuncArg::Float(v) => Ok(*v),
            FuncArg::String(v) => self.call_value("scrap_string_to_float", &[*v]),
            FuncArg::Any(v) => self.call_value("scrap_float_from_any", &[*v]),
            FuncArg::List(_) | FuncArg::Nothing => Ok(self.float_const(0.0)),
            FuncArg::Blockdef(_) => Err(self.cast_error(arg, DataType::Float)),
        }
    }

    pub fn to_bool(&mut self, arg: &FuncArg) -> CompileResult<Value> {
        match arg {
            FuncArg::Literal(literal) => Ok(self.bool_const(!literal.is_empty())),
            FuncArg::String(v) => {
                let len = self.call_value("scrap_string_length", &[*v])?;
                Ok(self.builder.ins().icmp_imm(IntCC::NotEqual, len, 0))
            }
            FuncArg::Integer(v) => Ok(self.builder.ins().icmp_imm(IntCC::NotEqual, *v, 0)),
            FuncArg::Float(v) => {
                let zero = self.float_const(0.0);
                Ok(self.builder.ins().fcmp(FloatCC::NotEqual, *v, zero))
            }
            FuncArg::Bool(v) => Ok(*v),
            FuncArg::Any(v) => self.call_value("scrap_bool_from_any", &[*v]),
            FuncArg::List(_) | FuncArg::Nothing => Ok(self.bool_const(false)),
            FuncArg::Color(_) | FuncArg::Blockdef(_) => Err(self.cast_error(arg, DataType::Bool)),
        }
    }

    pub fn to_color(&mut self, arg: &FuncArg) -> CompileResult<Value> {
        match arg {
            FuncArg::Literal(literal) => {
                let color = text::parse_color(literal)
                    .unwrap_or_else(|| text::parse_leading_int(literal.as_bytes()));
                Ok(self.int_const(color))
            }
            FuncArg::Integer(v) | FuncArg::Color(v) => Ok(*v),
            FuncArg::Bool(v) => {
                let white = self.int_const(COLOR_WHITE);
                let black = self.int_const(COLOR_BLACK);
                Ok(self.builder.ins().select(*v, white, black))
            }
            FuncArg::Float(v) => Ok(self.builder.ins().fcvt_to_sint_sat(CraneliftTypes::COLOR, *v)),
            FuncArg::String(v) => {
                let ctx = self.ctx();
                let boxed = self.call_value("scrap_any_from_string", &[ctx, *v])?;
                self.call_value("scrap_color_from_any", &[boxed])
            }
            FuncArg::Any(v) => self.call_value("scrap_color_from_any", &[*v]),
            FuncArg::Nothing => Ok(self.int_const(0)),
            FuncArg::List(_) | FuncArg::Blockdef(_) => Err(self.cast_error(arg, DataType::Color)),
        }
    }

    /// Materialise a literal as a GC string
    pub fn string_literal(&mut self, literal: &str) -> CompileResult<Value> {
        let ctx = self.ctx();
        let data = self.literal_ptr(literal)?;
        let len = self.int_const(literal.len() as i64);
        self.call_value("scrap_string_from_literal", &[ctx, data, len])
    }

    pub fn to_string(&mut self, arg: &FuncArg) -> CompileResult<Value> {
        let ctx = self.ctx();
        match arg {
            FuncArg::Literal(literal) => self.string_literal(literal),
            FuncArg::Nothing => self.string_literal("nothing"),
            FuncArg::List(_) => self.string_literal(""),
            FuncArg::String(v) => Ok(*v),
            FuncArg::Integer(v) => self.call_value("scrap_string_from_integer", &[ctx, *v]),
            FuncArg::Float(v) => self.call_value("scrap_string_from_float", &[ctx, *v]),
            FuncArg::Bool(v) => self.call_value("scrap_string_from_bool", &[ctx, *v]),
            FuncArg::Color(v) => self.call_value("scrap_string_from_color", &[ctx, *v]),
            FuncArg::Any(v) => self.call_value("scrap_string_from_any", &[ctx, *v]),
            FuncArg::Blockdef(_) => Err(self.cast_error(arg, DataType::String)),
        }
    }

    pub fn to_list(&mut self, arg: &FuncArg) -> CompileResult<Value> {
        match arg {
            FuncArg::List(v) => Ok(*v),
            FuncArg::Any(v) => {
                let ctx = self.ctx();
                self.call_value("scrap_list_from_any", &[ctx, *v])
            }
            _ => Err(self.cast_error(arg, DataType::List)),
        }
    }

    pub fn to_any(&mut self, arg: &FuncArg) -> CompileResult<Value> {
        let ctx = self.ctx();
        match arg {
            FuncArg::Nothing => self.call_value("scrap_any_nothing", &[]),
            FuncArg::Literal(literal) => {
                let string = self.string_literal(literal)?;
                self.call_value("scrap_any_from_string", &[ctx, string])
            }
            FuncArg::Integer(v) => self.call_value("scrap_any_from_integer", &[ctx, *v]),
            FuncArg::Float(v) => self.call_value("scrap_any_from_float", &[ctx, *v]),
            FuncArg::Bool(v) => self.call_value("scrap_any_from_bool", &[ctx, *v]),
            FuncArg::Color(v) => self.call_value("scrap_any_from_color", &[ctx, *v]),
            FuncArg::String(v) => self.call_value("scrap_any_from_string", &[ctx, *v]),
            FuncArg::List(v) => self.call_value("scrap_any_from_list", &[ctx, *v]),
            FuncArg::Any(v) => Ok(*v),
            FuncArg::Blockdef(_) => Err(self.cast_error(arg, DataType::Any)),
        }
    }

    /// Split a value into the `(kind, bits)` pair list entry points take
    pub fn to_value_bits(&mut self, arg: &FuncArg) -> CompileResult<(Value, Value)> {
        let (kind, bits) = match arg {
            FuncArg::Nothing => (AnyKind::Nothing, self.int_const(0)),
            FuncArg::Literal(literal) => (AnyKind::String, self.string_literal(literal)?),
            FuncArg::Integer(v) => (AnyKind::Integer, *v),
            FuncArg::Float(v) => (
                AnyKind::Float,
                self.builder.ins().bitcast(types::I64, MemFlags::new(), *v),
            ),
            FuncArg::Bool(v) => (AnyKind::Bool, self.builder.ins().uextend(types::I64, *v)),
            FuncArg::Color(v) => (AnyKind::Color, *v),
            FuncArg::String(v) => (AnyKind::String, *v),
            FuncArg::List(v) => (AnyKind::List, *v),
            FuncArg::Any(v) => {
                let kind = self.builder.ins().load(
                    types::I64,
                    mem_flags::aligned(),
                    *v,
                    AnyLayout::KIND_OFFSET,
                );
                let bits = self.builder.ins().load(
                    types::I64,
                    mem_flags::aligned(),
                    *v,
                    AnyLayout::DATA_OFFSET,
                );
                return Ok((kind, bits));
            }
            FuncArg::Blockdef(_) => return Err(self.cast_error(arg, DataType::Any)),
        };
        let kind = self.int_const(kind as i64);
        Ok((kind, bits))
    }
}

#[cfg(test)]
mod tests {
    use cranelift_codegen::ir::{AbiParam, Signature};
    use cranelift_codegen::isa::CallConv;
    use cranelift_codegen::settings;
    use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
    use cranelift_module::default_libcall_names;
    use cranelift_object::{ObjectBuilder, ObjectModule};

    use super::*;
    use crate::ast::Program;
    use crate::blocks::Registry;
    use crate::compiler::codegen::FunctionKind;
    use crate::compiler::context::CompilationContext;
    use crate::compiler::Symbols;

    /// Run `f` against a code generator for an empty `main`
    fn with_codegen(f: impl FnOnce(&mut Codegen<'_, ObjectModule>)) {
        let isa = cranelift_native::builder()
            .unwrap()
            .finish(settings::Flags::new(settings::builder()))
            .unwrap();
        let mut module =
            ObjectModule::new(ObjectBuilder::new(isa, "casts", default_libcall_names()).unwrap());
        let mut ctx = module.make_context();
        let mut sig = Signature::new(CallConv::SystemV);
        sig.params.push(AbiParam::new(CraneliftTypes::POINTER));
        ctx.func.signature = sig;

        let mut builder_ctx = FunctionBuilderContext::new();
        let mut symbols = Symbols::default();
        let mut cx = CompilationContext::new();
        let registry = Registry::builtin();
        let program = Program::new();
        let builder = FunctionBuilder::new(&mut ctx.func, &mut builder_ctx);
        let mut gen = Codegen::new(
            builder,
            &mut module,
            &mut symbols,
            &mut cx,
            &registry,
            &program,
            FunctionKind::Main,
        );
        f(&mut gen);
    }

    #[test]
    fn every_type_casts_to_any_but_blockdef() {
        with_codegen(|gen| {
            let int = gen.int_const(3);
            let args = [
                FuncArg::Nothing,
                FuncArg::Literal("x".into()),
                FuncArg::Integer(int),
                FuncArg::Color(int),
            ];
            for arg in &args {
                assert_eq!(gen.cast_to(arg, DataType::Any).unwrap().data_type(), DataType::Any);
            }

            let err = gen.to_any(&FuncArg::Blockdef("f".into())).unwrap_err();
            assert_eq!(err.message, "Cannot cast type blockdef into any");
        });
    }

    #[test]
    fn only_lists_and_anys_cast_to_list() {
        with_codegen(|gen| {
            let int = gen.int_const(1);
            assert!(gen.to_list(&FuncArg::List(int)).is_ok());
            assert!(gen.to_list(&FuncArg::Any(int)).is_ok());

            let err = gen.to_list(&FuncArg::Integer(int)).unwrap_err();
            assert_eq!(err.message, "Cannot cast type integer into list");
            let err = gen.to_list(&FuncArg::Literal("1".into())).unwrap_err();
            assert_eq!(err.message, "Cannot cast type literal into list");
        });
    }

    #[test]
    fn colors_do_not_cast_to_bool() {
        with_codegen(|gen| {
            let color = gen.int_const(0xff);
            let err = gen.to_bool(&FuncArg::Color(color)).unwrap_err();
            assert_eq!(err.message, "Cannot cast type color into bool");
            assert!(gen.to_color(&FuncArg::List(color)).is_err());
        });
    }

    #[test]
    fn string_casts_mark_the_statement_dirty() {
        with_codegen(|gen| {
            assert!(!gen.cx.gc_dirty);
            gen.to_integer(&FuncArg::Literal("12".into())).unwrap();
            assert!(!gen.cx.gc_dirty);

            gen.to_string(&FuncArg::Literal("12".into())).unwrap();
            assert!(gen.cx.gc_dirty);
        });
    }

    #[test]
    fn nothing_is_never_a_cast_target() {
        with_codegen(|gen| {
            let err = gen.cast_to(&FuncArg::Nothing, DataType::Nothing).unwrap_err();
            assert_eq!(err.message, "Cannot cast type nothing into nothing");
        });
    }
}
