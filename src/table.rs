//! Translation table builder
//!
//! Single-level tables of four 1 GiB block descriptors. The top two VA bits
//! select an entry, the remaining 30 bits offset into the block, so no
//! deeper table levels exist. Tables are granule-aligned and zero-filled,
//! which makes every unwritten entry an invalid (faulting) descriptor.

use crate::bits::{set_bit, set_bit_range};
use crate::{AddressWidth, Error, Result, NUM_TABLE_ENTRIES};

/// Long-descriptor block entry bit positions
pub mod desc {
    /// Valid bit
    pub const VALID_BIT: u8 = 0;
    /// Descriptor type bit (0 = block, 1 = table)
    pub const TYPE_BIT: u8 = 1;
    /// Memory attribute index field AttrIndx [4:2]
    pub const ATTRINDX_HI: u8 = 4;
    pub const ATTRINDX_LO: u8 = 2;
    /// Non-secure bit
    pub const NS_BIT: u8 = 5;
    /// Access permissions AP[2:1] at [7:6]
    pub const AP_HI: u8 = 7;
    pub const AP_LO: u8 = 6;
    /// Shareability SH [9:8]
    pub const SH_HI: u8 = 9;
    pub const SH_LO: u8 = 8;
    /// Access flag
    pub const AF_BIT: u8 = 10;
    /// Not-global bit
    pub const NG_BIT: u8 = 11;
    /// Contiguous hint
    pub const CONTIGUOUS_BIT: u8 = 52;
    /// Privileged execute-never
    pub const PXN_BIT: u8 = 53;
    /// Execute-never
    pub const XN_BIT: u8 = 54;

    /// Output address field for a 1 GiB block, AArch32 LPAE (40-bit PA)
    pub const OA32_HI: u8 = 39;
    /// Output address field for a 1 GiB block, AArch64 (48-bit PA)
    pub const OA64_HI: u8 = 47;
    pub const OA_LO: u8 = 30;

    /// AP value: read/write at any privilege level
    pub const AP_RW_ANY: u64 = 0b01;
    /// SH value: outer shareable
    pub const SH_OUTER: u64 = 0b10;
}

/// One 1 GiB block descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockDescriptor(u64);

impl BlockDescriptor {
    /// Canonical valid block template: attribute index 0, read/write at any
    /// privilege level, outer shareable, access flag set, global,
    /// executable.
    pub fn template() -> Self {
        let mut val = 0u64;
        set_bit(&mut val, desc::VALID_BIT, true);
        set_bit(&mut val, desc::TYPE_BIT, false);
        set_bit_range(&mut val, desc::ATTRINDX_HI, desc::ATTRINDX_LO, 0);
        set_bit(&mut val, desc::NS_BIT, false);
        set_bit_range(&mut val, desc::AP_HI, desc::AP_LO, desc::AP_RW_ANY);
        set_bit_range(&mut val, desc::SH_HI, desc::SH_LO, desc::SH_OUTER);
        set_bit(&mut val, desc::AF_BIT, true);
        set_bit(&mut val, desc::NG_BIT, false);
        set_bit(&mut val, desc::CONTIGUOUS_BIT, false);
        set_bit(&mut val, desc::PXN_BIT, false);
        set_bit(&mut val, desc::XN_BIT, false);
        Self(val)
    }

    /// Build a descriptor from the template with `output_address` overlaid
    /// into the block's output address field.
    ///
    /// `output_address` is the field value, already at block granularity:
    /// output address bits [39:30] (or [47:30] for `Va64`), not a byte
    /// address. The builder does not shift it.
    pub fn build(output_address: u64, width: AddressWidth) -> Self {
        let mut entry = Self::template();
        let oa_hi = match width {
            AddressWidth::Va32 => desc::OA32_HI,
            AddressWidth::Va64 => desc::OA64_HI,
        };
        set_bit_range(&mut entry.0, oa_hi, desc::OA_LO, output_address);
        entry
    }

    /// Raw 64-bit descriptor value
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Valid bit state
    pub fn is_valid(self) -> bool {
        self.0 & 1 != 0
    }

    /// Output address field value for the given width
    pub fn output_address(self, width: AddressWidth) -> u64 {
        let oa_hi = match width {
            AddressWidth::Va32 => desc::OA32_HI,
            AddressWidth::Va64 => desc::OA64_HI,
        };
        crate::bits::bit_range(self.0, oa_hi, desc::OA_LO)
    }
}

/// Top-level translation table: four block descriptors, granule-aligned.
///
/// Zero-initialized so unwritten entries fault rather than translate
/// through stale data.
#[repr(C, align(4096))]
pub struct TranslationTable {
    entries: [u64; NUM_TABLE_ENTRIES],
}

impl TranslationTable {
    /// Create a zeroed table
    pub const fn new() -> Self {
        Self {
            entries: [0; NUM_TABLE_ENTRIES],
        }
    }

    /// Store `entry` at `index`.
    ///
    /// The store is volatile so it is visible to a hardware walk as soon as
    /// the call returns; TLB invalidation remains the caller's duty.
    pub fn write_entry(&mut self, index: usize, entry: BlockDescriptor) -> Result<()> {
        if index >= NUM_TABLE_ENTRIES {
            return Err(Error::IndexOutOfRange);
        }
        unsafe {
            core::ptr::write_volatile(&mut self.entries[index], entry.raw());
        }
        log::trace!("table entry {} <- {:#018x}", index, entry.raw());
        Ok(())
    }

    /// Read back the descriptor at `index`.
    pub fn entry(&self, index: usize) -> Result<BlockDescriptor> {
        if index >= NUM_TABLE_ENTRIES {
            return Err(Error::IndexOutOfRange);
        }
        Ok(BlockDescriptor(unsafe {
            core::ptr::read_volatile(&self.entries[index])
        }))
    }

    /// Physical base address of the table, for the bank's table base
    /// register. Granule alignment is guaranteed by the type's layout.
    pub fn base_address(&self) -> u64 {
        self as *const Self as u64
    }
}

impl Default for TranslationTable {
    fn default() -> Self {
        Self::new()
    }
}
