//! Register space abstraction
//!
//! Every component programs the SMMU through [`RegisterSpace`], so the same
//! sequencing and bit-field logic drives real MMIO on target and a plain
//! in-memory image in unit tests. Writes are unbuffered: a completed
//! `write32`/`write64` is immediately observable to hardware (or to a
//! subsequent read of the mock).

use core::cell::RefCell;
use core::ptr::{read_volatile, write_volatile};

/// Addressable register surface, accessed by byte offset.
///
/// Accessors take `&self`: MMIO registers are interior-mutable by nature,
/// and the single-writer discipline (init path for configuration registers,
/// fault handler for fault-clear registers) is carried by the component
/// types layered on top, not by `&mut` exclusivity here.
pub trait RegisterSpace {
    /// Read a 32-bit register
    fn read32(&self, offset: usize) -> u32;
    /// Write a 32-bit register
    fn write32(&self, offset: usize, value: u32);
    /// Read a 64-bit register
    fn read64(&self, offset: usize) -> u64;
    /// Write a 64-bit register
    fn write64(&self, offset: usize, value: u64);
}

/// Memory-mapped register space over a live device window.
///
/// Not copyable; one instance per mapped window, alive for the life of the
/// mapping.
pub struct MmioSpace {
    base: *mut u8,
}

impl MmioSpace {
    /// Create a register space over a device window.
    ///
    /// # Safety
    /// `base` must point to a mapped, device-typed register window that
    /// stays valid for the lifetime of the returned value, and `base + off`
    /// must be in bounds for every offset the driver touches.
    pub const unsafe fn new(base: *mut u8) -> Self {
        Self { base }
    }
}

impl RegisterSpace for MmioSpace {
    fn read32(&self, offset: usize) -> u32 {
        unsafe { read_volatile(self.base.add(offset) as *const u32) }
    }

    fn write32(&self, offset: usize, value: u32) {
        unsafe { write_volatile(self.base.add(offset) as *mut u32, value) }
    }

    fn read64(&self, offset: usize) -> u64 {
        unsafe { read_volatile(self.base.add(offset) as *const u64) }
    }

    fn write64(&self, offset: usize, value: u64) {
        unsafe { write_volatile(self.base.add(offset) as *mut u64, value) }
    }
}

// The raw pointer keeps MmioSpace !Send/!Sync by default; configuration is
// single-threaded, so an owner may move it explicitly.
unsafe impl Send for MmioSpace {}

/// Size of the in-memory register image (covers CB15's window)
pub const MEM_SPACE_SIZE: usize = 0x20000;

/// In-memory register image for unit testing.
///
/// Behaves like an idle device: reads return whatever was last written,
/// initially zero. Little-endian like the hardware bus.
pub struct MemSpace {
    mem: RefCell<[u8; MEM_SPACE_SIZE]>,
}

impl MemSpace {
    /// Create a zeroed register image
    pub fn new() -> Self {
        Self {
            mem: RefCell::new([0; MEM_SPACE_SIZE]),
        }
    }
}

impl Default for MemSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterSpace for MemSpace {
    fn read32(&self, offset: usize) -> u32 {
        let mem = self.mem.borrow();
        let bytes: [u8; 4] = mem[offset..offset + 4].try_into().unwrap();
        u32::from_le_bytes(bytes)
    }

    fn write32(&self, offset: usize, value: u32) {
        let mut mem = self.mem.borrow_mut();
        mem[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn read64(&self, offset: usize) -> u64 {
        let mem = self.mem.borrow();
        let bytes: [u8; 8] = mem[offset..offset + 8].try_into().unwrap();
        u64::from_le_bytes(bytes)
    }

    fn write64(&self, offset: usize, value: u64) {
        let mut mem = self.mem.borrow_mut();
        mem[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_space_starts_zeroed() {
        let space = MemSpace::new();
        assert_eq!(space.read32(0x0), 0);
        assert_eq!(space.read64(0x1F000), 0);
    }

    #[test]
    fn writes_are_immediately_readable() {
        let space = MemSpace::new();
        space.write32(0x800, 0x8000_0200);
        assert_eq!(space.read32(0x800), 0x8000_0200);

        space.write64(0x10020, 0x00AA_0000_4000_0000);
        assert_eq!(space.read64(0x10020), 0x00AA_0000_4000_0000);
    }

    #[test]
    fn wide_and_narrow_views_agree() {
        let space = MemSpace::new();
        space.write64(0x60, 0x1122_3344_5566_7788);
        // low word first, little-endian bus
        assert_eq!(space.read32(0x60), 0x5566_7788);
        assert_eq!(space.read32(0x64), 0x1122_3344);
    }
}
