//! Object-file compiler

use std::path::PathBuf;
use std::sync::Arc;

use cranelift_codegen::isa::TargetIsa;
use cranelift_codegen::settings::{self, Configurable};
use cranelift_object::{ObjectBuilder, ObjectModule, ObjectProduct};
use tracing::{info, instrument};

use crate::ast::Program;
use crate::compiler::ProgramCompiler;
use crate::config::BuildConfig;

use super::linker::{Linker, LinkerConfig};
use super::AotError;

/// Result type for AOT operations
pub type AotResult<T> = Result<T, AotError>;

/// Compiles programs into relocatable object files exporting `scrap_main`
pub struct AotCompiler {
    isa: Arc<dyn TargetIsa>,
}

impl AotCompiler {
    /// Create a new AOT compiler for the host platform
    pub fn new() -> AotResult<Self> {
        Self::with_target(None)
    }

    /// Create a new AOT compiler for a specific target
    ///
    /// If `target` is None, uses the host platform.
    pub fn with_target(target: Option<&str>) -> AotResult<Self> {
        let mut flag_builder = settings::builder();
        flag_builder.set("opt_level", "speed").unwrap();
        flag_builder.set("is_pic", "true").unwrap();

        let isa = if let Some(target_triple) = target {
            let triple = target_triple
                .parse()
                .map_err(|e| AotError::BuildError(format!("Invalid target triple: {}", e)))?;

            cranelift_codegen::isa::lookup(triple)
                .map_err(|e| AotError::BuildError(format!("Unsupported target: {}", e)))?
                .finish(settings::Flags::new(flag_builder))
                .map_err(|e| AotError::BuildError(format!("Failed to create ISA: {}", e)))?
        } else {
            cranelift_native::builder()
                .map_err(|msg| {
                    AotError::BuildError(format!("Host machine not supported: {}", msg))
                })?
                .finish(settings::Flags::new(flag_builder))
                .map_err(|e| AotError::BuildError(format!("Failed to create ISA: {}", e)))?
        };

        Ok(Self { isa })
    }

    /// Target triple code is generated for
    pub fn triple(&self) -> String {
        self.isa.triple().to_string()
    }

    /// Lower `program` into an object file
    #[instrument(skip(self, program), level = "debug")]
    pub fn compile(self, program: &Program) -> AotResult<ObjectProduct> {
        let obj_builder = ObjectBuilder::new(
            self.isa,
            "scrap_module",
            cranelift_module::default_libcall_names(),
        )
        .map_err(|e| AotError::BuildError(format!("Failed to create object builder: {}", e)))?;

        let mut compiler = ProgramCompiler::new(ObjectModule::new(obj_builder));
        compiler.compile(program)?;
        Ok(compiler.into_module().finish())
    }
}

/// Compile `program` and link it into the executable at `output`
pub fn build_executable(
    program: &Program,
    config: &BuildConfig,
    output: impl Into<PathBuf>,
) -> AotResult<PathBuf> {
    let product = AotCompiler::new()?.compile(program)?;

    let linker = Linker::new(LinkerConfig {
        output: output.into(),
        optimize: config.optimize,
        extra_flags: config.extra_flags.clone(),
        runtime_dir: config.runtime_dir.clone(),
        linker: config.linker.clone(),
    });
    let path = linker.link(product)?;
    info!(output = %path.display(), "built executable");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use cranelift_module::Module;

    use super::*;
    use crate::ast::{Block, Chain};

    #[test]
    fn host_compiler() {
        let compiler = AotCompiler::new().unwrap();
        assert!(compiler.triple().starts_with(std::env::consts::ARCH));
    }

    #[test]
    fn invalid_target_is_rejected() {
        let err = AotCompiler::with_target(Some("not-a-target")).err().unwrap();
        assert!(matches!(err, AotError::BuildError(_)));
    }

    #[test]
    fn object_exports_main() {
        let program = Program {
            chains: vec![Chain::on_start(vec![Block::new("print").text("hi")])],
            blockdefs: Vec::new(),
        };
        let product = AotCompiler::new().unwrap().compile(&program).unwrap();
        let bytes = product.emit().unwrap();
        assert!(!bytes.is_empty());
    }

    #[test]
    fn compile_errors_pass_through() {
        let program = Program {
            chains: vec![Chain::on_start(vec![Block::new("end")])],
            blockdefs: Vec::new(),
        };
        let err = AotCompiler::new().unwrap().compile(&program).err().unwrap();
        match err {
            AotError::Compile(err) => assert_eq!(err.message, "Control stack underflow"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn every_failing_chain_is_reported() {
        let print_var = |name: &str| {
            Chain::on_start(vec![Block::new("print").block(Block::new("get_var").text(name))])
        };
        let program = Program {
            chains: vec![
                print_var("nope1"),
                Chain::on_start(vec![Block::new("print").text("fine")]),
                print_var("nope2"),
            ],
            blockdefs: Vec::new(),
        };
        let isa = AotCompiler::new().unwrap().isa;
        let builder = ObjectBuilder::new(isa, "errors", cranelift_module::default_libcall_names());
        let mut compiler = ProgramCompiler::new(ObjectModule::new(builder.unwrap()));

        let err = compiler.compile(&program).unwrap_err();
        assert!(err.message.contains("nope1"));

        let reported: Vec<String> = compiler.errors().iter().map(|err| err.describe()).collect();
        assert_eq!(reported.len(), 2);
        assert!(reported[0].starts_with("chain 0, block 1"));
        assert!(reported[0].contains("Variable with name \"nope1\" does not exist"));
        assert!(reported[1].starts_with("chain 2, block 1"));
        assert!(reported[1].contains("Variable with name \"nope2\" does not exist"));
    }

    #[test]
    fn object_module_isa_is_pic() {
        let compiler = AotCompiler::new().unwrap();
        let module = ObjectModule::new(
            ObjectBuilder::new(compiler.isa, "pic", cranelift_module::default_libcall_names())
                .unwrap(),
        );
        assert!(module.isa().flags().is_pic());
    }
}
