//! Memory layouts shared between generated code and the runtime
//!
//! Generated code treats strings, lists and `any` values as opaque pointers to
//! GC chunk payloads with the `#[repr(C)]` layouts below. Integers, floats,
//! booleans and colors never touch the heap unless boxed into an `any`.

use std::ptr;
use std::slice;

use crate::gc::{ChunkHeader, ChunkKind};

/// Dynamic type tag stored in an [`AnyValue`]
#[repr(u64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnyKind {
    Nothing = 0,
    Integer = 1,
    Float = 2,
    Bool = 3,
    String = 4,
    List = 5,
    Color = 6,
}

impl AnyKind {
    /// Decode a raw tag, treating unknown tags as nothing
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        match raw {
            1 => Self::Integer,
            2 => Self::Float,
            3 => Self::Bool,
            4 => Self::String,
            5 => Self::List,
            6 => Self::Color,
            _ => Self::Nothing,
        }
    }

    /// Name reported by the `typeof` block
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Nothing => "nothing",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::String => "string",
            Self::List => "list",
            Self::Color => "color",
        }
    }

    /// Whether the payload is a pointer to another chunk
    #[must_use]
    pub const fn is_heap(self) -> bool {
        matches!(self, Self::String | Self::List)
    }
}

/// A dynamically typed value: kind tag plus 64 bits of payload
///
/// Floats are stored as their bit pattern, booleans as 0/1, and strings and
/// lists as payload pointers.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnyValue {
    pub kind: u64,
    pub data: u64,
}

impl AnyValue {
    pub const NOTHING: Self = Self {
        kind: AnyKind::Nothing as u64,
        data: 0,
    };

    #[must_use]
    pub const fn integer(value: i64) -> Self {
        Self {
            kind: AnyKind::Integer as u64,
            data: value as u64,
        }
    }

    #[must_use]
    pub fn float(value: f64) -> Self {
        Self {
            kind: AnyKind::Float as u64,
            data: value.to_bits(),
        }
    }

    #[must_use]
    pub const fn bool(value: bool) -> Self {
        Self {
            kind: AnyKind::Bool as u64,
            data: value as u64,
        }
    }

    #[must_use]
    pub const fn color(value: i64) -> Self {
        Self {
            kind: AnyKind::Color as u64,
            data: value as u64,
        }
    }

    #[must_use]
    pub fn string(value: *mut ScrString) -> Self {
        Self {
            kind: AnyKind::String as u64,
            data: value as u64,
        }
    }

    #[must_use]
    pub fn list(value: *mut ScrList) -> Self {
        Self {
            kind: AnyKind::List as u64,
            data: value as u64,
        }
    }

    /// Build from the `(kind, bits)` pair generated code passes to list helpers
    #[must_use]
    pub const fn from_parts(kind: u64, bits: u64) -> Self {
        match AnyKind::from_raw(kind) {
            AnyKind::Nothing => Self::NOTHING,
            AnyKind::Bool => Self {
                kind,
                data: (bits & 1),
            },
            _ => Self { kind, data: bits },
        }
    }

    #[must_use]
    pub const fn kind(&self) -> AnyKind {
        AnyKind::from_raw(self.kind)
    }

    #[must_use]
    pub const fn as_integer(&self) -> i64 {
        self.data as i64
    }

    #[must_use]
    pub fn as_float(&self) -> f64 {
        f64::from_bits(self.data)
    }

    #[must_use]
    pub const fn as_bool(&self) -> bool {
        self.data != 0
    }

    #[must_use]
    pub fn as_string(&self) -> *mut ScrString {
        self.data as *mut ScrString
    }

    #[must_use]
    pub fn as_list(&self) -> *mut ScrList {
        self.data as *mut ScrList
    }

    /// The chunk this value points into, if any
    #[must_use]
    pub fn heap_pointer(&self) -> Option<*mut u8> {
        if self.kind().is_heap() && self.data != 0 {
            Some(self.data as *mut u8)
        } else {
            None
        }
    }
}

/// Length-prefixed, NUL-terminated byte string
///
/// The bytes follow the header inline; `len` excludes the terminator.
#[repr(C)]
#[derive(Debug)]
pub struct ScrString {
    pub len: u64,
}

impl ScrString {
    /// Payload size needed for a string of `len` bytes
    #[must_use]
    pub const fn alloc_size(len: usize) -> usize {
        std::mem::size_of::<Self>() + len + 1
    }

    /// Pointer to the first byte
    ///
    /// # Safety
    /// `this` must point at a valid string payload.
    #[must_use]
    pub unsafe fn data(this: *const Self) -> *mut u8 {
        this.cast::<u8>().cast_mut().add(std::mem::size_of::<Self>())
    }

    /// View the bytes of a string payload
    ///
    /// # Safety
    /// `this` must point at a valid string payload that outlives `'a`.
    #[must_use]
    pub unsafe fn bytes<'a>(this: *const Self) -> &'a [u8] {
        if this.is_null() {
            return &[];
        }
        slice::from_raw_parts(Self::data(this), (*this).len as usize)
    }
}

/// Growable list header; `items` points at a separate raw chunk
#[repr(C)]
#[derive(Debug)]
pub struct ScrList {
    pub len: u64,
    pub cap: u64,
    pub items: *mut AnyValue,
}

impl ScrList {
    /// View the items of a list payload
    ///
    /// # Safety
    /// `this` must point at a valid list payload that outlives `'a`.
    #[must_use]
    pub unsafe fn items<'a>(this: *const Self) -> &'a [AnyValue] {
        if this.is_null() || (*this).items.is_null() {
            return &[];
        }
        slice::from_raw_parts((*this).items, (*this).len as usize)
    }
}

// =============================================================================
// Static values
// =============================================================================
//
// Shared immutable values handed out where allocation is pointless (nothing)
// or has failed. Their headers carry the static flag, so mark never writes to
// them and list mutation helpers refuse to touch the static list.

#[repr(C)]
struct StaticChunk<T> {
    header: ChunkHeader,
    value: T,
}

// SAFETY: static chunks are never written to after initialisation
unsafe impl<T> Sync for StaticChunk<T> {}

#[repr(C)]
struct EmptyString {
    len: u64,
    terminator: u64,
}

static NOTHING: StaticChunk<AnyValue> = StaticChunk {
    header: ChunkHeader::new_static(std::mem::size_of::<AnyValue>(), ChunkKind::Any),
    value: AnyValue::NOTHING,
};

static EMPTY_STRING: StaticChunk<EmptyString> = StaticChunk {
    header: ChunkHeader::new_static(std::mem::size_of::<EmptyString>(), ChunkKind::String),
    value: EmptyString {
        len: 0,
        terminator: 0,
    },
};

static EMPTY_LIST: StaticChunk<ScrList> = StaticChunk {
    header: ChunkHeader::new_static(std::mem::size_of::<ScrList>(), ChunkKind::List),
    value: ScrList {
        len: 0,
        cap: 0,
        items: ptr::null_mut(),
    },
};

/// The shared `nothing` value
#[must_use]
pub fn static_nothing() -> *mut AnyValue {
    ptr::addr_of!(NOTHING.value).cast_mut()
}

/// The shared empty string
#[must_use]
pub fn static_empty_string() -> *mut ScrString {
    ptr::addr_of!(EMPTY_STRING.value).cast::<ScrString>().cast_mut()
}

/// The shared empty list, used only as an allocation-failure fallback
#[must_use]
pub fn static_empty_list() -> *mut ScrList {
    ptr::addr_of!(EMPTY_LIST.value).cast_mut()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::is_static;

    #[test]
    fn any_kind_round_trips_raw_tags() {
        for kind in [
            AnyKind::Nothing,
            AnyKind::Integer,
            AnyKind::Float,
            AnyKind::Bool,
            AnyKind::String,
            AnyKind::List,
            AnyKind::Color,
        ] {
            assert_eq!(AnyKind::from_raw(kind as u64), kind);
        }
        assert_eq!(AnyKind::from_raw(99), AnyKind::Nothing);
    }

    #[test]
    fn any_value_payloads() {
        assert_eq!(AnyValue::integer(-5).as_integer(), -5);
        assert!((AnyValue::float(2.5).as_float() - 2.5).abs() < f64::EPSILON);
        assert!(AnyValue::bool(true).as_bool());
        assert_eq!(AnyValue::from_parts(AnyKind::Bool as u64, 0xff).data, 1);
        assert_eq!(AnyValue::from_parts(AnyKind::Nothing as u64, 7), AnyValue::NOTHING);
        assert!(AnyValue::integer(1).heap_pointer().is_none());
    }

    #[test]
    fn statics_are_flagged() {
        unsafe {
            assert!(is_static(static_nothing().cast()));
            assert!(is_static(static_empty_string().cast()));
            assert!(is_static(static_empty_list().cast()));
            assert_eq!(ScrString::bytes(static_empty_string()), b"");
            assert!(ScrList::items(static_empty_list()).is_empty());
            assert_eq!((*static_nothing()).kind(), AnyKind::Nothing);
        }
    }
}
