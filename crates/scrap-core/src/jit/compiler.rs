//! JIT compiler and the executable program it produces

use std::mem;

use cranelift_codegen::settings::{self, Configurable};
use cranelift_jit::{JITBuilder, JITModule};
use scrap_runtime::{ffi, ExecContext, ProgramEntry};
use tracing::{debug, info, instrument};

use crate::ast::Program;
use crate::compiler::ProgramCompiler;

use super::{JitError, JitResult};

macro_rules! symbol_table {
    ($($name:ident),* $(,)?) => {
        vec![$((stringify!($name), ffi::$name as *const u8)),*]
    };
}

/// Name and address of every runtime entry point generated code may import
pub fn runtime_symbols() -> Vec<(&'static str, *const u8)> {
    symbol_table![
        scrap_gc_root_begin,
        scrap_gc_root_end,
        scrap_gc_root_save,
        scrap_gc_root_restore,
        scrap_gc_flush,
        scrap_gc_add_root,
        scrap_gc_add_temp_root,
        scrap_gc_collect,
        scrap_poll_stop,
        scrap_any_nothing,
        scrap_any_from_integer,
        scrap_any_from_float,
        scrap_any_from_bool,
        scrap_any_from_color,
        scrap_any_from_string,
        scrap_any_from_list,
        scrap_integer_from_any,
        scrap_float_from_any,
        scrap_bool_from_any,
        scrap_color_from_any,
        scrap_string_from_any,
        scrap_list_from_any,
        scrap_any_is_eq,
        scrap_any_type_name,
        scrap_string_from_literal,
        scrap_string_from_integer,
        scrap_string_from_float,
        scrap_string_from_bool,
        scrap_string_from_color,
        scrap_string_to_integer,
        scrap_string_to_float,
        scrap_string_join,
        scrap_string_length,
        scrap_string_letter_in,
        scrap_string_substring,
        scrap_string_ord,
        scrap_string_chr,
        scrap_string_is_eq,
        scrap_list_new,
        scrap_list_add,
        scrap_list_get,
        scrap_list_set,
        scrap_list_length,
        scrap_term_print_literal,
        scrap_term_print_string,
        scrap_term_print_integer,
        scrap_term_print_float,
        scrap_term_print_bool,
        scrap_term_print_color,
        scrap_term_print_list,
        scrap_term_print_any,
        scrap_term_input,
        scrap_term_get_char,
        scrap_term_set_fg_color,
        scrap_term_set_bg_color,
        scrap_term_reset_color,
        scrap_term_set_clear_color,
        scrap_term_clear,
        scrap_term_set_cursor,
        scrap_term_cursor_x,
        scrap_term_cursor_y,
        scrap_term_cursor_max_x,
        scrap_term_cursor_max_y,
        scrap_sleep,
        scrap_random,
        scrap_unix_time,
        scrap_int_pow,
        scrap_float_pow,
        scrap_float_rem,
        scrap_math,
    ]
}

/// Compiles programs into native code in this process
pub struct JitCompiler {
    builder: JITBuilder,
}

impl JitCompiler {
    /// Create a JIT compiler for the host machine
    pub fn new() -> JitResult<Self> {
        let mut flag_builder = settings::builder();
        flag_builder.set("opt_level", "speed").unwrap();
        flag_builder.set("is_pic", "false").unwrap();

        let isa_builder = cranelift_native::builder()
            .map_err(|msg| JitError::Internal(format!("Host machine is not supported: {}", msg)))?;
        let isa = isa_builder
            .finish(settings::Flags::new(flag_builder))
            .map_err(|e| JitError::Cranelift(e.to_string()))?;

        let mut builder = JITBuilder::with_isa(isa, cranelift_module::default_libcall_names());
        for (name, addr) in runtime_symbols() {
            builder.symbol(name, addr);
        }
        Ok(Self { builder })
    }

    /// Lower and finalize `program`
    #[instrument(skip(self, program), level = "debug")]
    pub fn compile(self, program: &Program) -> JitResult<CompiledProgram> {
        let mut compiler = ProgramCompiler::new(JITModule::new(self.builder));
        let main = compiler.compile(program)?;
        let mut module = compiler.into_module();

        module
            .finalize_definitions()
            .map_err(|e| JitError::Cranelift(e.to_string()))?;
        let entry = module.get_finalized_function(main);
        debug!(entry = ?entry, "finalized program");
        info!(chains = program.chains.len(), "compiled program");

        Ok(CompiledProgram {
            module: Some(module),
            entry,
        })
    }
}

/// Finalized native code of one program
///
/// Owns the executable memory; dropping it frees the code.
pub struct CompiledProgram {
    module: Option<JITModule>,
    entry: *const u8,
}

// SAFETY: the module and the code it owns are only reached through this
// value, and generated code keeps no thread-local state. All per-run state
// lives in the `ExecContext` passed to `run`.
unsafe impl Send for CompiledProgram {}

impl CompiledProgram {
    /// Run `scrap_main` to completion on the current thread
    pub fn run(&self, ctx: &mut ExecContext) {
        // SAFETY: `entry` is the finalized `scrap_main`, whose signature is
        // `fn(*mut ExecContext)`, and the module owning it is still alive.
        unsafe {
            let entry: ProgramEntry = mem::transmute(self.entry);
            entry(ctx as *mut ExecContext);
        }
    }
}

impl Drop for CompiledProgram {
    fn drop(&mut self) {
        if let Some(module) = self.module.take() {
            // SAFETY: no reference to the generated code outlives `self`
            unsafe { module.free_memory() };
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use crate::compiler::signatures::RUNTIME_FUNCTIONS;

    use super::*;

    #[test]
    fn symbols_match_signature_table() {
        let symbols: HashSet<&str> = runtime_symbols().into_iter().map(|(name, _)| name).collect();
        let table: HashSet<&str> = RUNTIME_FUNCTIONS.iter().map(|func| func.name).collect();
        assert_eq!(symbols, table);
        assert_eq!(runtime_symbols().len(), RUNTIME_FUNCTIONS.len());
    }

    #[test]
    fn compiler_builds_for_host() {
        assert!(JitCompiler::new().is_ok());
    }

    #[test]
    fn empty_program_compiles() {
        let compiled = JitCompiler::new().unwrap().compile(&Program::new()).unwrap();
        assert!(!compiled.entry.is_null());
    }
}
