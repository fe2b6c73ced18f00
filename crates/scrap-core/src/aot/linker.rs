//! Linker integration for AOT compilation
//!
//! This module handles linking compiled object files into standalone executables.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use cranelift_object::ObjectProduct;
use tracing::debug;

use super::AotError;

/// C entry point handing `scrap_main` to the runtime
const WRAPPER_SOURCE: &str = r#"
extern void scrap_main(void *ctx);
extern int scrap_run_standalone(void (*entry)(void *));

int main(void) {
    return scrap_run_standalone(scrap_main);
}
"#;

/// Name of the runtime static library, without `lib` prefix and extension
const RUNTIME_LIBRARY: &str = "scrap_runtime";

/// Configuration for the linker
#[derive(Debug, Clone)]
pub struct LinkerConfig {
    /// Output path for the executable
    pub output: PathBuf,
    /// Whether to optimize the output
    pub optimize: bool,
    /// Additional linker flags
    pub extra_flags: Vec<String>,
    /// Directory holding `libscrap_runtime.a`
    pub runtime_dir: PathBuf,
    /// C compiler driver; discovered when unset
    pub linker: Option<String>,
}

impl Default for LinkerConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from("a.out"),
            optimize: false,
            extra_flags: Vec::new(),
            runtime_dir: PathBuf::from("target/release"),
            linker: None,
        }
    }
}

/// Linker for creating executables from object files
pub struct Linker {
    config: LinkerConfig,
}

impl Linker {
    /// Create a new linker with the given configuration
    #[must_use]
    pub fn new(config: LinkerConfig) -> Self {
        Self { config }
    }

    /// Create a linker with default configuration
    #[must_use]
    pub fn with_output(output: impl Into<PathBuf>) -> Self {
        Self {
            config: LinkerConfig {
                output: output.into(),
                ..Default::default()
            },
        }
    }

    /// Link an object product into an executable
    pub fn link(&self, product: ObjectProduct) -> Result<PathBuf, AotError> {
        let obj_data = product
            .emit()
            .map_err(|e| AotError::LinkError(format!("Failed to emit object file: {}", e)))?;

        let temp_dir = tempfile::Builder::new().prefix("scrap-build").tempdir()?;
        let obj_path = temp_dir.path().join("scrap_module.o");
        let wrapper_path = temp_dir.path().join("scrap_wrapper.c");
        fs::write(&obj_path, &obj_data)?;
        fs::write(&wrapper_path, WRAPPER_SOURCE)?;

        self.link_object_file(&obj_path, &wrapper_path)?;
        Ok(self.config.output.clone())
    }

    /// Arguments passed to the compiler driver after the program name
    fn link_args(&self, obj_path: &Path, wrapper_path: &Path) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            self.config.output.display().to_string(),
            wrapper_path.display().to_string(),
            obj_path.display().to_string(),
            format!("-L{}", self.config.runtime_dir.display()),
            format!("-l{}", RUNTIME_LIBRARY),
        ];
        args.extend(platform_libraries().iter().map(|lib| (*lib).to_string()));

        if self.config.optimize {
            args.push("-O2".to_string());
        }
        args.extend(self.config.extra_flags.iter().cloned());
        args
    }

    fn link_object_file(&self, obj_path: &Path, wrapper_path: &Path) -> Result<(), AotError> {
        let mut cmd = self.compiler_command();
        cmd.args(self.link_args(obj_path, wrapper_path));
        debug!(command = ?cmd, "linking");

        let output = cmd
            .output()
            .map_err(|e| AotError::LinkError(format!("Failed to run linker: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AotError::LinkError(format!("Linker failed: {}", stderr)));
        }
        Ok(())
    }

    /// The configured driver, else the one `cc` discovers, else clang or gcc
    fn compiler_command(&self) -> Command {
        if let Some(linker) = &self.config.linker {
            return Command::new(linker);
        }

        let host = target_lexicon::HOST.to_string();
        let discovered = cc::Build::new()
            .cargo_metadata(false)
            .warnings(false)
            .opt_level(0)
            .target(&host)
            .host(&host)
            .try_get_compiler();
        match discovered {
            Ok(tool) => tool.to_command(),
            Err(_) => {
                let fallback = if Command::new("clang").arg("--version").output().is_ok() {
                    "clang"
                } else {
                    "gcc"
                };
                Command::new(fallback)
            }
        }
    }
}

/// System libraries the runtime depends on
fn platform_libraries() -> &'static [&'static str] {
    if cfg!(target_os = "linux") {
        &["-lpthread", "-ldl", "-lm"]
    } else {
        &[]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linker_config_default() {
        let config = LinkerConfig::default();
        assert_eq!(config.output, PathBuf::from("a.out"));
        assert!(!config.optimize);
        assert!(config.extra_flags.is_empty());
        assert_eq!(config.runtime_dir, PathBuf::from("target/release"));
        assert!(config.linker.is_none());
    }

    #[test]
    fn linker_with_output() {
        let linker = Linker::with_output("my_program");
        assert_eq!(linker.config.output, PathBuf::from("my_program"));
    }

    #[test]
    fn link_args_include_runtime_library() {
        let linker = Linker::new(LinkerConfig {
            output: PathBuf::from("out/hello"),
            optimize: true,
            extra_flags: vec!["-static".to_string()],
            runtime_dir: PathBuf::from("/opt/scrap/lib"),
            linker: None,
        });
        let args = linker.link_args(Path::new("/tmp/m.o"), Path::new("/tmp/w.c"));

        assert_eq!(&args[..4], ["-o", "out/hello", "/tmp/w.c", "/tmp/m.o"]);
        assert!(args.contains(&"-L/opt/scrap/lib".to_string()));
        assert!(args.contains(&"-lscrap_runtime".to_string()));
        assert!(args.contains(&"-O2".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("-static"));
    }

    #[test]
    fn configured_linker_is_used() {
        let linker = Linker::new(LinkerConfig {
            linker: Some("my-cc".to_string()),
            ..Default::default()
        });
        assert_eq!(linker.compiler_command().get_program(), "my-cc");
    }

    #[test]
    fn missing_linker_reports_error() {
        let linker = Linker::new(LinkerConfig {
            linker: Some("scrap-no-such-linker".to_string()),
            ..Default::default()
        });
        let err = linker
            .link_object_file(Path::new("/nonexistent.o"), Path::new("/nonexistent.c"))
            .unwrap_err();
        assert!(matches!(err, AotError::LinkError(msg) if msg.starts_with("Failed to run linker")));
    }

    #[test]
    fn wrapper_calls_standalone_entry() {
        assert!(WRAPPER_SOURCE.contains("scrap_run_standalone(scrap_main)"));
    }
}
