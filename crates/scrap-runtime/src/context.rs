//! Per-run execution context handed to every generated function
//!
//! Generated code receives a pointer to an [`ExecContext`] as its hidden
//! first argument and passes it on to every runtime call that allocates,
//! prints, reads input or checks for cancellation.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::warn;

use crate::gc::{self, ChunkKind, Gc, GcError};
use crate::value::{
    static_empty_list, static_empty_string, static_nothing, AnyValue, ScrList, ScrString,
};

/// Terminal cursor position tracked for the cursor blocks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    pub x: i64,
    pub y: i64,
}

/// Terminal size reported by the `cursor_max_*` blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermSize {
    pub columns: i64,
    pub rows: i64,
}

impl Default for TermSize {
    fn default() -> Self {
        Self { columns: 80, rows: 24 }
    }
}

impl TermSize {
    /// Size from `COLUMNS` and `LINES`, falling back to 80x24
    #[must_use]
    pub fn from_env() -> Self {
        let read = |name: &str| {
            std::env::var(name)
                .ok()
                .and_then(|value| value.trim().parse::<i64>().ok())
                .filter(|value| *value > 0)
        };
        let fallback = Self::default();
        Self {
            columns: read("COLUMNS").unwrap_or(fallback.columns),
            rows: read("LINES").unwrap_or(fallback.rows),
        }
    }
}

/// Everything a running program needs from its host
pub struct ExecContext {
    gc: Gc,
    stop: Arc<AtomicBool>,
    abort: Option<String>,
    output: Box<dyn Write + Send>,
    input: Box<dyn BufRead + Send>,
    rng: Option<StdRng>,
    seed: Option<u64>,
    cursor: Cursor,
    term_size: TermSize,
    /// Background set by the program; `None` is the terminal default
    bg_color: Option<i64>,
    /// Background used by `term_clear`
    clear_color: Option<i64>,
}

impl ExecContext {
    /// Create a context writing to stdout and reading from stdin
    #[must_use]
    pub fn new(gc: Gc, stop: Arc<AtomicBool>) -> Self {
        Self {
            gc,
            stop,
            abort: None,
            output: Box::new(io::stdout()),
            input: Box::new(BufReader::new(io::stdin())),
            rng: None,
            seed: None,
            cursor: Cursor::default(),
            term_size: TermSize::default(),
            bg_color: None,
            clear_color: None,
        }
    }

    /// Redirect program output
    #[must_use]
    pub fn with_output(mut self, output: Box<dyn Write + Send>) -> Self {
        self.output = output;
        self
    }

    /// Redirect program input
    #[must_use]
    pub fn with_input(mut self, input: Box<dyn BufRead + Send>) -> Self {
        self.input = input;
        self
    }

    #[must_use]
    pub fn with_term_size(mut self, size: TermSize) -> Self {
        self.term_size = size;
        self
    }

    /// Make the `random` block deterministic
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    #[must_use]
    pub fn gc(&self) -> &Gc {
        &self.gc
    }

    pub fn gc_mut(&mut self) -> &mut Gc {
        &mut self.gc
    }

    /// Whether generated code should leave through its exit path
    #[must_use]
    pub fn should_exit(&self) -> bool {
        self.abort.is_some() || self.stop.load(Ordering::Relaxed)
    }

    /// Whether the host asked the program to stop
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Record a fatal runtime condition; only the first one is kept
    pub fn abort(&mut self, message: impl Into<String>) {
        if self.abort.is_none() {
            let message = message.into();
            warn!(%message, "program aborted");
            self.abort = Some(message);
        }
    }

    /// Message of the pending fatal condition, if any
    #[must_use]
    pub fn abort_message(&self) -> Option<&str> {
        self.abort.as_deref()
    }

    /// Turn a collector error into a pending abort
    pub fn check(&mut self, result: Result<(), GcError>) {
        if let Err(err) = result {
            self.abort(err.to_string());
        }
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn set_cursor(&mut self, cursor: Cursor) {
        self.cursor = cursor;
    }

    pub fn term_size(&self) -> TermSize {
        self.term_size
    }

    pub fn bg_color(&self) -> Option<i64> {
        self.bg_color
    }

    pub fn set_bg_color(&mut self, color: Option<i64>) {
        self.bg_color = color;
    }

    pub fn clear_color(&self) -> Option<i64> {
        self.clear_color
    }

    pub fn set_clear_color(&mut self, color: i64) {
        self.clear_color = Some(color);
    }

    // =========================================================================
    // I/O
    // =========================================================================

    /// Write bytes to program output, returning the number written
    pub fn write_bytes(&mut self, bytes: &[u8]) -> i64 {
        if bytes.is_empty() {
            return 0;
        }
        let result = self.output.write_all(bytes).and_then(|()| self.output.flush());
        if let Err(err) = result {
            warn!(error = %err, "program output failed");
            return 0;
        }
        self.advance_cursor(bytes);
        bytes.len() as i64
    }

    /// Write bytes that do not move the tracked cursor (escape sequences)
    pub fn write_control(&mut self, bytes: &[u8]) {
        let result = self.output.write_all(bytes).and_then(|()| self.output.flush());
        if let Err(err) = result {
            warn!(error = %err, "program output failed");
        }
    }

    fn advance_cursor(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            match byte {
                b'\n' => {
                    self.cursor.x = 0;
                    self.cursor.y += 1;
                }
                b if b & 0xC0 != 0x80 => self.cursor.x += 1,
                _ => {}
            }
        }
    }

    /// Read one line without its terminator; empty at end of input
    pub fn read_line(&mut self) -> Vec<u8> {
        let mut line = Vec::new();
        if let Err(err) = self.input.read_until(b'\n', &mut line) {
            warn!(error = %err, "program input failed");
            return Vec::new();
        }
        if line.last() == Some(&b'\n') {
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
        }
        line
    }

    /// Read one UTF-8 encoded character; a newline reads as empty
    pub fn read_char(&mut self) -> Vec<u8> {
        let mut first = [0u8; 1];
        if self.input.read_exact(&mut first).is_err() || first[0] == b'\n' {
            return Vec::new();
        }
        let width = first[0].leading_ones().clamp(1, 4) as usize;
        let mut out = vec![0u8; width];
        out[0] = first[0];
        if width > 1 && self.input.read_exact(&mut out[1..]).is_err() {
            out.truncate(1);
        }
        out
    }

    /// Uniform integer in the inclusive range, bounds in either order
    pub fn random_range(&mut self, min: i64, max: i64) -> i64 {
        let (low, high) = if min > max { (max, min) } else { (min, max) };
        let seed = self.seed;
        let rng = self.rng.get_or_insert_with(|| match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        });
        rng.gen_range(low..=high)
    }

    // =========================================================================
    // Allocation
    // =========================================================================
    //
    // Failed allocations record an abort and hand back a static fallback so
    // generated code can keep going until its next stop poll.

    fn alloc(&mut self, size: usize, kind: ChunkKind) -> Option<*mut u8> {
        match self.gc.malloc(size, kind) {
            Ok(payload) => Some(payload.as_ptr()),
            Err(err) => {
                self.abort(err.to_string());
                None
            }
        }
    }

    /// Allocate a string holding a copy of `bytes`
    pub fn alloc_string(&mut self, bytes: &[u8]) -> *mut ScrString {
        let Some(payload) = self.alloc(ScrString::alloc_size(bytes.len()), ChunkKind::String) else {
            return static_empty_string();
        };
        let string = payload.cast::<ScrString>();
        // SAFETY: the chunk is large enough for the header, the bytes and a NUL
        unsafe {
            (*string).len = bytes.len() as u64;
            ptr::copy_nonoverlapping(bytes.as_ptr(), ScrString::data(string), bytes.len());
        }
        string
    }

    /// Box a value
    pub fn alloc_any(&mut self, value: AnyValue) -> *mut AnyValue {
        if value == AnyValue::NOTHING {
            return static_nothing();
        }
        let Some(payload) = self.alloc(std::mem::size_of::<AnyValue>(), ChunkKind::Any) else {
            return static_nothing();
        };
        let any = payload.cast::<AnyValue>();
        // SAFETY: freshly allocated chunk sized for an AnyValue
        unsafe { any.write(value) };
        any
    }

    /// Allocate an empty list
    pub fn alloc_list(&mut self) -> *mut ScrList {
        let Some(payload) = self.alloc(std::mem::size_of::<ScrList>(), ChunkKind::List) else {
            return static_empty_list();
        };
        payload.cast::<ScrList>()
    }

    /// Append to a list, growing its backing array by doubling
    ///
    /// # Safety
    /// `list` must be a valid list payload kept alive by a root.
    pub unsafe fn list_push(&mut self, list: *mut ScrList, item: AnyValue) {
        if list.is_null() || gc::is_static(list.cast()) {
            return;
        }

        let (len, cap) = ((*list).len, (*list).cap);
        if len == cap {
            let new_cap = if cap == 0 { 1 } else { cap * 2 };
            let size = new_cap as usize * std::mem::size_of::<AnyValue>();
            let Some(items) = self.alloc(size, ChunkKind::Raw) else {
                return;
            };
            let items = items.cast::<AnyValue>();
            if !(*list).items.is_null() {
                ptr::copy_nonoverlapping((*list).items, items, len as usize);
            }
            (*list).items = items;
            (*list).cap = new_cap;
        }

        (*list).items.add(len as usize).write(item);
        (*list).len = len + 1;
    }

    /// Overwrite an element; out-of-range indices are ignored
    ///
    /// # Safety
    /// `list` must be a valid list payload.
    pub unsafe fn list_set(&mut self, list: *mut ScrList, index: i64, item: AnyValue) {
        if list.is_null() || gc::is_static(list.cast()) {
            return;
        }
        if index < 0 || index as u64 >= (*list).len {
            return;
        }
        (*list).items.add(index as usize).write(item);
    }
}

impl std::fmt::Debug for ExecContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecContext")
            .field("gc", &self.gc)
            .field("stop", &self.stop.load(Ordering::Relaxed))
            .field("abort", &self.abort)
            .field("cursor", &self.cursor)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::value::AnyKind;

    /// Output sink whose contents can be inspected after the context is done
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn context() -> ExecContext {
        let mut ctx = ExecContext::new(Gc::new(4096, 1 << 20), Arc::new(AtomicBool::new(false)));
        ctx.gc_mut().root_begin().unwrap();
        ctx
    }

    #[test]
    fn strings_copy_bytes() {
        let mut ctx = context();
        let string = ctx.alloc_string(b"hello");
        unsafe {
            assert_eq!(ScrString::bytes(string), b"hello");
            assert_eq!(*ScrString::data(string).add(5), 0);
        }
    }

    #[test]
    fn list_push_grows_by_doubling() {
        let mut ctx = context();
        let list = ctx.alloc_list();
        unsafe {
            for i in 0..5 {
                ctx.list_push(list, AnyValue::integer(i));
            }
            assert_eq!((*list).len, 5);
            assert_eq!((*list).cap, 8);
            let items = ScrList::items(list);
            assert_eq!(items[4].as_integer(), 4);

            ctx.list_set(list, 1, AnyValue::bool(true));
            ctx.list_set(list, 10, AnyValue::bool(true));
            assert_eq!(ScrList::items(list)[1].kind(), AnyKind::Bool);
        }
    }

    #[test]
    fn out_of_memory_records_abort_and_falls_back() {
        let mut ctx = ExecContext::new(Gc::new(16, 32), Arc::new(AtomicBool::new(false)));
        ctx.gc_mut().root_begin().unwrap();
        let string = ctx.alloc_string(&[b'x'; 64]);
        assert_eq!(string, static_empty_string());
        assert!(ctx.should_exit());
        assert!(ctx.abort_message().unwrap().starts_with("Out of memory"));

        let list = static_empty_list();
        unsafe { ctx.list_push(list, AnyValue::integer(1)) };
        assert_eq!(unsafe { (*list).len }, 0);
    }

    #[test]
    fn stop_flag_is_observed() {
        let stop = Arc::new(AtomicBool::new(false));
        let ctx = ExecContext::new(Gc::new(16, 32), Arc::clone(&stop));
        assert!(!ctx.should_exit());
        stop.store(true, Ordering::Relaxed);
        assert!(ctx.should_exit());
        assert!(ctx.stop_requested());
    }

    #[test]
    fn output_tracks_cursor() {
        let buf = SharedBuf::default();
        let mut ctx = context().with_output(Box::new(buf.clone()));
        assert_eq!(ctx.write_bytes("ab\nçd".as_bytes()), 6);
        assert_eq!(ctx.cursor(), Cursor { x: 2, y: 1 });
        assert_eq!(buf.0.lock().unwrap().as_slice(), "ab\nçd".as_bytes());
    }

    #[test]
    fn input_reads_lines_and_chars() {
        let input = io::Cursor::new("first line\r\nñx".as_bytes().to_vec());
        let mut ctx = context().with_input(Box::new(input));
        assert_eq!(ctx.read_line(), b"first line");
        assert_eq!(ctx.read_char(), "ñ".as_bytes());
        assert_eq!(ctx.read_char(), b"x");
        assert_eq!(ctx.read_char(), b"");
        assert_eq!(ctx.read_line(), b"");
    }

    #[test]
    fn seeded_random_is_in_range() {
        let mut ctx = context().with_seed(7);
        for _ in 0..100 {
            let value = ctx.random_range(10, 1);
            assert!((1..=10).contains(&value));
        }
    }
}
