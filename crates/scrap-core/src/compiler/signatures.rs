//! Signature table of the runtime entry points generated code may call
//!
//! Every entry mirrors one `extern "C"` function in `scrap_runtime::ffi`.
//! The JIT back end registers each symbol's address, the object back end
//! declares each as an import resolved by `libscrap_runtime.a`.

use cranelift_codegen::ir::{AbiParam, Signature};

use super::types::CraneliftTypes;

/// ABI class of one parameter or return value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ty {
    /// Context, payload and data pointers
    Ptr,
    /// Integers, colors and `u64` tags
    Int,
    Float,
    /// Rust `bool`, zero extended
    Bool,
}

impl Ty {
    fn abi_param(self) -> AbiParam {
        match self {
            Ty::Ptr => AbiParam::new(CraneliftTypes::POINTER),
            Ty::Int => AbiParam::new(CraneliftTypes::INT),
            Ty::Float => AbiParam::new(CraneliftTypes::FLOAT),
            Ty::Bool => AbiParam::new(CraneliftTypes::BOOL).uext(),
        }
    }
}

/// One callable runtime primitive
#[derive(Debug, Clone, Copy)]
pub struct RuntimeFn {
    pub name: &'static str,
    pub params: &'static [Ty],
    pub ret: Option<Ty>,
    /// Whether the call may allocate GC memory
    pub allocates: bool,
}

impl RuntimeFn {
    /// Fill `sig` (created by the target module) with this function's ABI
    pub fn fill_signature(&self, sig: &mut Signature) {
        sig.params.extend(self.params.iter().map(|ty| ty.abi_param()));
        if let Some(ret) = self.ret {
            sig.returns.push(ret.abi_param());
        }
    }
}

const fn pure(name: &'static str, params: &'static [Ty], ret: Option<Ty>) -> RuntimeFn {
    RuntimeFn {
        name,
        params,
        ret,
        allocates: false,
    }
}

const fn alloc(name: &'static str, params: &'static [Ty], ret: Option<Ty>) -> RuntimeFn {
    RuntimeFn {
        name,
        params,
        ret,
        allocates: true,
    }
}

use Ty::{Bool, Float, Int, Ptr};

/// The fixed runtime signature table
pub static RUNTIME_FUNCTIONS: &[RuntimeFn] = &[
    // GC / control
    pure("scrap_gc_root_begin", &[Ptr], None),
    pure("scrap_gc_root_end", &[Ptr], None),
    pure("scrap_gc_root_save", &[Ptr], None),
    pure("scrap_gc_root_restore", &[Ptr], None),
    pure("scrap_gc_flush", &[Ptr], None),
    pure("scrap_gc_add_root", &[Ptr, Ptr], None),
    pure("scrap_gc_add_temp_root", &[Ptr, Ptr], None),
    pure("scrap_gc_collect", &[Ptr], None),
    pure("scrap_poll_stop", &[Ptr], Some(Bool)),
    // Any
    pure("scrap_any_nothing", &[], Some(Ptr)),
    alloc("scrap_any_from_integer", &[Ptr, Int], Some(Ptr)),
    alloc("scrap_any_from_float", &[Ptr, Float], Some(Ptr)),
    alloc("scrap_any_from_bool", &[Ptr, Bool], Some(Ptr)),
    alloc("scrap_any_from_color", &[Ptr, Int], Some(Ptr)),
    alloc("scrap_any_from_string", &[Ptr, Ptr], Some(Ptr)),
    alloc("scrap_any_from_list", &[Ptr, Ptr], Some(Ptr)),
    pure("scrap_integer_from_any", &[Ptr], Some(Int)),
    pure("scrap_float_from_any", &[Ptr], Some(Float)),
    pure("scrap_bool_from_any", &[Ptr], Some(Bool)),
    pure("scrap_color_from_any", &[Ptr], Some(Int)),
    alloc("scrap_string_from_any", &[Ptr, Ptr], Some(Ptr)),
    alloc("scrap_list_from_any", &[Ptr, Ptr], Some(Ptr)),
    pure("scrap_any_is_eq", &[Ptr, Ptr], Some(Bool)),
    alloc("scrap_any_type_name", &[Ptr, Ptr], Some(Ptr)),
    // Strings
    alloc("scrap_string_from_literal", &[Ptr, Ptr, Int], Some(Ptr)),
    alloc("scrap_string_from_integer", &[Ptr, Int], Some(Ptr)),
    alloc("scrap_string_from_float", &[Ptr, Float], Some(Ptr)),
    alloc("scrap_string_from_bool", &[Ptr, Bool], Some(Ptr)),
    alloc("scrap_string_from_color", &[Ptr, Int], Some(Ptr)),
    pure("scrap_string_to_integer", &[Ptr], Some(Int)),
    pure("scrap_string_to_float", &[Ptr], Some(Float)),
    alloc("scrap_string_join", &[Ptr, Ptr, Ptr], Some(Ptr)),
    pure("scrap_string_length", &[Ptr], Some(Int)),
    alloc("scrap_string_letter_in", &[Ptr, Int, Ptr], Some(Ptr)),
    alloc("scrap_string_substring", &[Ptr, Int, Int, Ptr], Some(Ptr)),
    pure("scrap_string_ord", &[Ptr], Some(Int)),
    alloc("scrap_string_chr", &[Ptr, Int], Some(Ptr)),
    pure("scrap_string_is_eq", &[Ptr, Ptr], Some(Bool)),
    // Lists
    alloc("scrap_list_new", &[Ptr], Some(Ptr)),
    alloc("scrap_list_add", &[Ptr, Ptr, Int, Int], None),
    alloc("scrap_list_get", &[Ptr, Ptr, Int], Some(Ptr)),
    pure("scrap_list_set", &[Ptr, Ptr, Int, Int, Int], None),
    pure("scrap_list_length", &[Ptr], Some(Int)),
    // Terminal
    pure("scrap_term_print_literal", &[Ptr, Ptr, Int], Some(Int)),
    pure("scrap_term_print_string", &[Ptr, Ptr], Some(Int)),
    pure("scrap_term_print_integer", &[Ptr, Int], Some(Int)),
    pure("scrap_term_print_float", &[Ptr, Float], Some(Int)),
    pure("scrap_term_print_bool", &[Ptr, Bool], Some(Int)),
    pure("scrap_term_print_color", &[Ptr, Int], Some(Int)),
    pure("scrap_term_print_list", &[Ptr, Ptr], Some(Int)),
    pure("scrap_term_print_any", &[Ptr, Ptr], Some(Int)),
    alloc("scrap_term_input", &[Ptr], Some(Ptr)),
    alloc("scrap_term_get_char", &[Ptr], Some(Ptr)),
    pure("scrap_term_set_fg_color", &[Ptr, Int], None),
    pure("scrap_term_set_bg_color", &[Ptr, Int], None),
    pure("scrap_term_reset_color", &[Ptr], None),
    pure("scrap_term_set_clear_color", &[Ptr, Int], None),
    pure("scrap_term_clear", &[Ptr], None),
    pure("scrap_term_set_cursor", &[Ptr, Int, Int], None),
    pure("scrap_term_cursor_x", &[Ptr], Some(Int)),
    pure("scrap_term_cursor_y", &[Ptr], Some(Int)),
    pure("scrap_term_cursor_max_x", &[Ptr], Some(Int)),
    pure("scrap_term_cursor_max_y", &[Ptr], Some(Int)),
    // Misc
    pure("scrap_sleep", &[Ptr, Int], Some(Int)),
    pure("scrap_random", &[Ptr, Int, Int], Some(Int)),
    pure("scrap_unix_time", &[], Some(Int)),
    pure("scrap_int_pow", &[Int, Int], Some(Int)),
    pure("scrap_float_pow", &[Float, Float], Some(Float)),
    pure("scrap_float_rem", &[Float, Float], Some(Float)),
    pure("scrap_math", &[Int, Float], Some(Float)),
];

/// Look up a runtime function by symbol name
#[must_use]
pub fn lookup(name: &str) -> Option<&'static RuntimeFn> {
    RUNTIME_FUNCTIONS.iter().find(|func| func.name == name)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use cranelift_codegen::ir::types;
    use cranelift_codegen::isa::CallConv;

    use super::*;

    #[test]
    fn names_are_unique() {
        let mut seen = HashSet::new();
        for func in RUNTIME_FUNCTIONS {
            assert!(seen.insert(func.name), "duplicate entry {}", func.name);
        }
    }

    #[test]
    fn allocating_calls_take_context_first() {
        for func in RUNTIME_FUNCTIONS.iter().filter(|func| func.allocates) {
            assert_eq!(func.params.first(), Some(&Ty::Ptr), "{}", func.name);
        }
    }

    #[test]
    fn bool_params_are_zero_extended() {
        let func = lookup("scrap_any_from_bool").unwrap();
        let mut sig = Signature::new(CallConv::SystemV);
        func.fill_signature(&mut sig);

        assert_eq!(sig.params.len(), 2);
        assert_eq!(sig.params[1].value_type, types::I8);
        assert_eq!(
            sig.params[1].extension,
            cranelift_codegen::ir::ArgumentExtension::Uext
        );
        assert_eq!(sig.returns[0].value_type, types::I64);
    }

    #[test]
    fn lookup_misses_unknown_symbols() {
        assert!(lookup("scrap_gc_flush").is_some());
        assert!(lookup("scrap_does_not_exist").is_none());
    }
}
