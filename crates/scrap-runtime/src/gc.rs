//! Mark-sweep garbage collector for values created by compiled programs
//!
//! Every heap value handed to generated code (boxed `any` values, strings,
//! lists and list backing arrays) lives in a GC chunk: a fixed [`ChunkHeader`]
//! followed by the payload. Generated code only ever sees payload pointers.
//!
//! Roots are tracked with an explicit, scope-structured stack:
//! 1. `root_begin` opens a frame that remembers the current lengths of the
//!    named-root and temporary-root arrays
//! 2. every fresh allocation becomes a temporary root of the innermost frame
//! 3. `add_root` registers the address of a variable slot as a named root
//! 4. `root_end` closes the frame, truncating both arrays back to the marks
//!
//! `root_save`/`root_restore` work one level up: they record and restore the
//! depth of the frame stack itself around function calls.

use std::alloc::{self, Layout};
use std::mem;
use std::ptr::NonNull;

use thiserror::Error;
use tracing::trace;

use crate::value::{AnyValue, ScrList};

/// Initial soft threshold before the first collection
pub const DEFAULT_MIN_MEMORY: usize = 64 * 1024;

/// Hard allocation cap
pub const DEFAULT_MAX_MEMORY: usize = 256 * 1024 * 1024;

/// Maximum number of open root frames
pub const MAX_ROOT_DEPTH: usize = 16_384;

const FLAG_MARKED: u8 = 1;
const FLAG_STATIC: u8 = 1 << 1;
const CHUNK_ALIGN: usize = 8;

/// What a chunk's payload holds, used to trace references during mark
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    /// Untyped memory with no outgoing references (list backing arrays)
    Raw = 0,
    /// A boxed [`AnyValue`]
    Any = 1,
    /// A [`crate::value::ScrString`]
    String = 2,
    /// A [`ScrList`] header
    List = 3,
}

/// Fixed header stored in front of every chunk payload
#[repr(C)]
#[derive(Debug)]
pub struct ChunkHeader {
    size: u64,
    kind: ChunkKind,
    flags: u8,
    _pad: [u8; 6],
}

impl ChunkHeader {
    /// Header for a value living in static memory, never swept nor marked
    pub(crate) const fn new_static(size: usize, kind: ChunkKind) -> Self {
        Self {
            size: size as u64,
            kind,
            flags: FLAG_STATIC,
            _pad: [0; 6],
        }
    }
}

/// Size of [`ChunkHeader`]; payloads start this many bytes after the header
pub const HEADER_SIZE: usize = mem::size_of::<ChunkHeader>();

/// Header of the chunk whose payload starts at `payload`
///
/// # Safety
/// `payload` must be a payload pointer produced by [`Gc::malloc`] or one of
/// the static values in [`crate::value`].
unsafe fn header_of(payload: *const u8) -> *mut ChunkHeader {
    payload.sub(HEADER_SIZE).cast::<ChunkHeader>().cast_mut()
}

/// Whether the payload belongs to a static (never collected, immutable) value
///
/// # Safety
/// Same requirements as the payload pointers accepted by [`Gc::add_temp_root`].
pub unsafe fn is_static(payload: *const u8) -> bool {
    (*header_of(payload)).flags & FLAG_STATIC != 0
}

/// Errors reported by the collector
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GcError {
    /// Allocation cannot be satisfied under the hard memory cap
    #[error("Out of memory: tried to allocate {requested} bytes with {used} of {max} bytes in use")]
    OutOfMemory {
        requested: usize,
        used: usize,
        max: usize,
    },

    /// Too many nested root frames
    #[error("Gc stack overflow")]
    RootOverflow,

    /// `root_end`/`root_restore` without a matching begin/save
    #[error("Gc stack underflow")]
    RootUnderflow,
}

/// Statistics about the collector
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Total number of collections performed
    pub collections: usize,
    /// Number of live chunks
    pub chunks: usize,
    /// Payload bytes currently allocated
    pub memory_used: usize,
    /// Current soft threshold
    pub threshold: usize,
    /// Hard allocation cap
    pub memory_max: usize,
}

#[derive(Debug, Clone, Copy)]
struct GcRoot {
    chunks_base: usize,
    temp_chunks_base: usize,
}

/// The garbage collector owned by one executing program
///
/// Owned exclusively by the thread running the program, so no locking is
/// done anywhere in here.
pub struct Gc {
    chunks: Vec<NonNull<ChunkHeader>>,
    roots_stack: Vec<GcRoot>,
    /// Addresses of variable slots holding chunk pointers
    root_chunks: Vec<*const *mut u8>,
    root_temp_chunks: Vec<*mut u8>,
    roots_bases: Vec<usize>,
    memory_used: usize,
    threshold: usize,
    memory_max: usize,
    collections: usize,
}

impl Gc {
    /// Create a collector with an initial soft threshold and a hard cap
    #[must_use]
    pub fn new(min_memory: usize, max_memory: usize) -> Self {
        Self {
            chunks: Vec::new(),
            roots_stack: Vec::new(),
            root_chunks: Vec::new(),
            root_temp_chunks: Vec::new(),
            roots_bases: Vec::new(),
            memory_used: 0,
            threshold: min_memory.clamp(1, max_memory.max(1)),
            memory_max: max_memory,
            collections: 0,
        }
    }

    /// Get collector statistics
    #[must_use]
    pub fn stats(&self) -> GcStats {
        GcStats {
            collections: self.collections,
            chunks: self.chunks.len(),
            memory_used: self.memory_used,
            threshold: self.threshold,
            memory_max: self.memory_max,
        }
    }

    /// Number of open root frames
    #[must_use]
    pub fn root_depth(&self) -> usize {
        self.roots_stack.len()
    }

    /// Number of outstanding `root_save` marks
    #[must_use]
    pub fn saved_depth(&self) -> usize {
        self.roots_bases.len()
    }

    /// Payload bytes currently allocated
    #[must_use]
    pub fn memory_used(&self) -> usize {
        self.memory_used
    }

    /// Open a root frame
    ///
    /// The frame is pushed even when the depth limit is exceeded so that the
    /// matching `root_end` stays balanced; the caller decides how to abort.
    pub fn root_begin(&mut self) -> Result<(), GcError> {
        self.roots_stack.push(GcRoot {
            chunks_base: self.root_chunks.len(),
            temp_chunks_base: self.root_temp_chunks.len(),
        });
        if self.roots_stack.len() > MAX_ROOT_DEPTH {
            return Err(GcError::RootOverflow);
        }
        Ok(())
    }

    /// Close the innermost root frame, unrooting its variables and temporaries
    pub fn root_end(&mut self) -> Result<(), GcError> {
        let root = self.roots_stack.pop().ok_or(GcError::RootUnderflow)?;
        self.root_chunks.truncate(root.chunks_base);
        self.root_temp_chunks.truncate(root.temp_chunks_base);
        Ok(())
    }

    /// Remember the current frame depth
    pub fn root_save(&mut self) {
        self.roots_bases.push(self.roots_stack.len());
    }

    /// Close every frame opened since the matching `root_save`
    pub fn root_restore(&mut self) -> Result<(), GcError> {
        let base = self.roots_bases.pop().ok_or(GcError::RootUnderflow)?;
        if let Some(root) = self.roots_stack.get(base).copied() {
            self.root_chunks.truncate(root.chunks_base);
            self.root_temp_chunks.truncate(root.temp_chunks_base);
            self.roots_stack.truncate(base);
        }
        Ok(())
    }

    /// Drop the temporaries of the innermost frame
    pub fn flush(&mut self) {
        let base = self.roots_stack.last().map_or(0, |root| root.temp_chunks_base);
        self.root_temp_chunks.truncate(base);
    }

    /// Register a variable slot as a named root
    ///
    /// The slot is read on every collection, so later stores are followed.
    pub fn add_root(&mut self, slot: *const *mut u8) {
        if !slot.is_null() {
            self.root_chunks.push(slot);
        }
    }

    /// Keep a chunk alive until the innermost frame is flushed or closed
    pub fn add_temp_root(&mut self, payload: *mut u8) {
        if !payload.is_null() {
            self.root_temp_chunks.push(payload);
        }
    }

    /// Allocate a zeroed chunk with `size` payload bytes
    ///
    /// Collects when the soft threshold would be exceeded. If the request
    /// still does not fit, the threshold doubles once (up to the hard cap)
    /// and the allocation fails when that is not enough.
    pub fn malloc(&mut self, size: usize, kind: ChunkKind) -> Result<NonNull<u8>, GcError> {
        if size > self.memory_max {
            return Err(self.out_of_memory(size));
        }

        if self.memory_used + size > self.threshold {
            self.collect();
            if self.memory_used + size > self.threshold {
                self.threshold = self.threshold.saturating_mul(2).min(self.memory_max);
                trace!(threshold = self.threshold, "gc threshold raised");
            }
            if self.memory_used + size > self.threshold {
                return Err(self.out_of_memory(size));
            }
        }

        let layout = Layout::from_size_align(HEADER_SIZE + size, CHUNK_ALIGN)
            .map_err(|_| self.out_of_memory(size))?;
        // SAFETY: the layout always has a non-zero size because of the header
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let Some(header) = NonNull::new(raw.cast::<ChunkHeader>()) else {
            return Err(self.out_of_memory(size));
        };

        // SAFETY: freshly allocated, properly aligned for the header
        unsafe {
            header.as_ptr().write(ChunkHeader {
                size: size as u64,
                kind,
                flags: 0,
                _pad: [0; 6],
            });
        }

        self.chunks.push(header);
        self.memory_used += size;

        // SAFETY: the allocation is HEADER_SIZE + size bytes long
        let payload = unsafe { raw.add(HEADER_SIZE) };
        self.root_temp_chunks.push(payload);
        Ok(unsafe { NonNull::new_unchecked(payload) })
    }

    fn out_of_memory(&self, requested: usize) -> GcError {
        GcError::OutOfMemory {
            requested,
            used: self.memory_used,
            max: self.memory_max,
        }
    }

    /// Run a full mark-sweep cycle
    pub fn collect(&mut self) {
        self.collections += 1;

        let mut worklist: Vec<*mut u8> = Vec::with_capacity(self.root_temp_chunks.len());
        for &slot in &self.root_chunks {
            // SAFETY: named roots point at live variable slots of open frames
            let payload = unsafe { *slot };
            if !payload.is_null() {
                worklist.push(payload);
            }
        }
        worklist.extend(self.root_temp_chunks.iter().copied());

        while let Some(payload) = worklist.pop() {
            // SAFETY: every pointer reaching the worklist is a chunk payload
            unsafe { mark(payload, &mut worklist) };
        }

        let memory_before = self.memory_used;
        let chunks_before = self.chunks.len();
        let mut memory_used = self.memory_used;
        self.chunks.retain(|&header| {
            // SAFETY: chunks only holds headers allocated by malloc
            unsafe {
                let chunk = header.as_ptr();
                if (*chunk).flags & FLAG_MARKED != 0 {
                    (*chunk).flags &= !FLAG_MARKED;
                    return true;
                }
                memory_used -= (*chunk).size as usize;
                free_chunk(header);
            }
            false
        });
        self.memory_used = memory_used;

        trace!(
            freed_bytes = memory_before - self.memory_used,
            freed_chunks = chunks_before - self.chunks.len(),
            memory_used = self.memory_used,
            "gc sweep"
        );
    }
}

/// Mark one chunk and queue the chunks it references
unsafe fn mark(payload: *mut u8, worklist: &mut Vec<*mut u8>) {
    let header = header_of(payload);
    if (*header).flags & (FLAG_MARKED | FLAG_STATIC) != 0 {
        return;
    }
    (*header).flags |= FLAG_MARKED;

    match (*header).kind {
        ChunkKind::Any => {
            let value = &*payload.cast::<AnyValue>();
            worklist.extend(value.heap_pointer());
        }
        ChunkKind::List => {
            let list = &*payload.cast::<ScrList>();
            if !list.items.is_null() {
                worklist.push(list.items.cast());
                for i in 0..list.len as usize {
                    worklist.extend((*list.items.add(i)).heap_pointer());
                }
            }
        }
        ChunkKind::String | ChunkKind::Raw => {}
    }
}

unsafe fn free_chunk(header: NonNull<ChunkHeader>) {
    let size = (*header.as_ptr()).size as usize;
    let layout = Layout::from_size_align_unchecked(HEADER_SIZE + size, CHUNK_ALIGN);
    alloc::dealloc(header.as_ptr().cast(), layout);
}

impl Drop for Gc {
    fn drop(&mut self) {
        for header in self.chunks.drain(..) {
            // SAFETY: every chunk is freed exactly once, here or in collect
            unsafe { free_chunk(header) };
        }
        self.root_chunks.clear();
        self.root_temp_chunks.clear();
        self.roots_stack.clear();
        self.roots_bases.clear();
        self.memory_used = 0;
    }
}

impl std::fmt::Debug for Gc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gc")
            .field("chunks", &self.chunks.len())
            .field("root_depth", &self.roots_stack.len())
            .field("memory_used", &self.memory_used)
            .field("threshold", &self.threshold)
            .field("memory_max", &self.memory_max)
            .finish()
    }
}
