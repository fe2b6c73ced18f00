//! Type mapping between Scrap and Cranelift
//!
//! Scalars live in registers; strings, lists and `any` values are pointers to
//! GC chunk payloads whose layouts are fixed by `scrap_runtime::value`:
//!
//! ```text
//! struct AnyValue  { kind: u64, data: u64 }        // 16 bytes
//! struct ScrString { len: u64, bytes[len], 0 }
//! struct ScrList   { len: u64, cap: u64, items: *AnyValue }
//! ```

use cranelift_codegen::ir::{types, Type as ClifType};

/// Field offsets of the `any` payload
#[derive(Debug, Clone, Copy)]
pub struct AnyLayout;

impl AnyLayout {
    pub const SIZE: u32 = 16;
    pub const KIND_OFFSET: i32 = 0;
    pub const DATA_OFFSET: i32 = 8;
}

/// Cranelift type mappings for Scrap types
#[derive(Debug, Clone, Copy)]
pub struct CraneliftTypes;

impl CraneliftTypes {
    /// The pointer type for the target platform
    pub const POINTER: ClifType = types::I64;

    /// Type for integer values
    pub const INT: ClifType = types::I64;

    /// Type for floating-point values
    pub const FLOAT: ClifType = types::F64;

    /// Type for boolean values (uses i8 for Cranelift compatibility)
    pub const BOOL: ClifType = types::I8;

    /// Packed `0xRRGGBBAA`
    pub const COLOR: ClifType = types::I64;
}

/// Memory flags for Cranelift memory operations
pub mod mem_flags {
    use cranelift_codegen::ir::MemFlags;

    /// Flags for loads and stores through payload pointers and stack slots
    pub fn aligned() -> MemFlags {
        MemFlags::trusted()
    }
}

#[cfg(test)]
mod tests {
    use std::mem::{offset_of, size_of};

    use scrap_runtime::AnyValue;

    use super::*;

    #[test]
    fn any_layout_matches_runtime() {
        assert_eq!(AnyLayout::SIZE as usize, size_of::<AnyValue>());
        assert_eq!(AnyLayout::KIND_OFFSET as usize, offset_of!(AnyValue, kind));
        assert_eq!(AnyLayout::DATA_OFFSET as usize, offset_of!(AnyValue, data));
    }

    #[test]
    fn scalar_widths() {
        assert_eq!(CraneliftTypes::POINTER.bytes() as usize, size_of::<usize>());
        assert_eq!(CraneliftTypes::BOOL.bits(), 8);
        assert_eq!(CraneliftTypes::FLOAT, types::F64);
    }
}
