//! Running compiled programs on a worker thread
//!
//! The executor compiles on the caller's thread and runs `scrap_main` on a
//! dedicated thread with a large stack. Stopping is cooperative: the caller
//! sets the shared stop flag and the generated code's polls unwind the
//! program through ordinary returns.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use scrap_runtime::{ExecContext, Gc, GcStats};
use thiserror::Error;
use tracing::{debug, info};

use crate::ast::Program;
use crate::compiler::CompileError;
use crate::config::ScrapConfig;
use crate::jit::{CompiledProgram, JitCompiler, JitError};

/// Errors starting or finishing a run
#[derive(Debug, Error)]
pub enum ExecError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("Failed to spawn execution thread: {0}")]
    Spawn(#[source] io::Error),

    #[error("Execution thread panicked")]
    Join,
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecResult {
    Success,
    /// A fatal runtime error, with its message
    Failure(String),
    /// The program was stopped from outside
    Stopped,
}

/// Outcome of a finished run
#[derive(Debug, Clone)]
pub struct ExecReport {
    pub result: ExecResult,
    pub stats: GcStats,
    /// Root frames left on the GC stack; 0 after a clean exit
    pub root_depth: usize,
}

/// Compiles and starts programs
pub struct Executor {
    config: ScrapConfig,
    seed: Option<u64>,
}

impl Executor {
    #[must_use]
    pub fn new(config: ScrapConfig) -> Self {
        Self { config, seed: None }
    }

    /// Seed the `random` block for reproducible runs
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Compile `program` on the current thread
    pub fn compile(&self, program: &Program) -> Result<CompiledProgram, CompileError> {
        let compiled = JitCompiler::new().and_then(|jit| jit.compile(program));
        compiled.map_err(|err| match err {
            JitError::Compile(err) => err,
            other => CompileError::backend(other.to_string()),
        })
    }

    /// Run `compiled` on a new worker thread writing to `output`
    pub fn start(
        &self,
        compiled: CompiledProgram,
        output: Box<dyn Write + Send>,
    ) -> Result<ExecHandle, ExecError> {
        let stop = Arc::new(AtomicBool::new(false));
        let running = Arc::new(AtomicBool::new(true));
        let gc_config = self.config.gc.clone();
        let term_size = self.config.exec.term_size();
        let seed = self.seed;

        let thread_stop = Arc::clone(&stop);
        let thread_running = Arc::clone(&running);
        let thread = thread::Builder::new()
            .name("scrap-exec".to_string())
            .stack_size(self.config.exec.stack_size)
            .spawn(move || {
                let _running = RunningGuard(thread_running);
                let gc = Gc::new(gc_config.min_memory, gc_config.max_memory);
                let mut ctx = ExecContext::new(gc, thread_stop)
                    .with_output(output)
                    .with_term_size(term_size);
                if let Some(seed) = seed {
                    ctx = ctx.with_seed(seed);
                }

                compiled.run(&mut ctx);
                report(&ctx)
            })
            .map_err(ExecError::Spawn)?;

        debug!("started execution thread");
        Ok(ExecHandle {
            thread,
            stop,
            running,
        })
    }
}

/// Clears the running flag when the worker finishes, panicking or not
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn report(ctx: &ExecContext) -> ExecReport {
    let result = if let Some(message) = ctx.abort_message() {
        ExecResult::Failure(message.to_string())
    } else if ctx.stop_requested() {
        ExecResult::Stopped
    } else {
        ExecResult::Success
    };
    ExecReport {
        result,
        stats: ctx.gc().stats(),
        root_depth: ctx.gc().root_depth(),
    }
}

/// A program running on its worker thread
pub struct ExecHandle {
    thread: JoinHandle<ExecReport>,
    stop: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
}

impl ExecHandle {
    /// Ask the program to stop at its next poll
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Wait for the program to finish
    pub fn join(self) -> Result<ExecReport, ExecError> {
        let report = self.thread.join().map_err(|_| ExecError::Join)?;
        info!(
            result = ?report.result,
            collections = report.stats.collections,
            "execution finished"
        );
        Ok(report)
    }
}

/// Compile and run `program` to completion
pub fn run_blocking(
    program: &Program,
    config: &ScrapConfig,
    output: Box<dyn Write + Send>,
) -> Result<ExecReport, ExecError> {
    let executor = Executor::new(config.clone());
    let compiled = executor.compile(program)?;
    executor.start(compiled, output)?.join()
}

/// Shared in-memory output sink
///
/// Clones share one buffer, so a clone can be handed to the executor while
/// the original reads what the program printed.
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl OutputBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded
    pub fn contents(&self) -> String {
        let bytes = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Boxed clone for [`Executor::start`]
    pub fn sink(&self) -> Box<dyn Write + Send> {
        Box::new(self.clone())
    }
}

impl Write for OutputBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut bytes = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_buffer_shares_contents() {
        let buffer = OutputBuffer::new();
        let mut sink = buffer.sink();
        sink.write_all(b"hello ").unwrap();
        sink.write_all("wörld".as_bytes()).unwrap();
        assert_eq!(buffer.contents(), "hello wörld");
    }

    #[test]
    fn empty_program_succeeds() {
        let buffer = OutputBuffer::new();
        let report = run_blocking(&Program::new(), &ScrapConfig::default(), buffer.sink()).unwrap();
        assert_eq!(report.result, ExecResult::Success);
        assert_eq!(report.root_depth, 0);
        assert_eq!(buffer.contents(), "");
    }

    #[test]
    fn running_flag_clears_when_worker_panics() {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let worker = thread::spawn(move || {
            let _running = RunningGuard(flag);
            panic!("worker failed");
        });
        assert!(worker.join().is_err());
        assert!(!running.load(Ordering::Acquire));
    }

    #[test]
    fn compile_errors_are_returned_before_starting() {
        let program = Program::new().chain(crate::ast::Chain::on_start(vec![crate::ast::Block::new(
            "end",
        )]));
        let err = run_blocking(&program, &ScrapConfig::default(), OutputBuffer::new().sink())
            .unwrap_err();
        assert!(matches!(err, ExecError::Compile(_)));
    }
}
