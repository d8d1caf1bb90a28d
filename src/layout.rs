//! SMMU register map
//!
//! Byte offsets relative to the SMMU base address. The per-entry strides and
//! entry counts mirror the MMU-500 instantiation on Zynq UltraScale+ (48
//! stream match groups, 16 context banks). Field positions within each
//! register live next to the code that encodes them.

/// Global control and identification registers
pub mod global {
    /// Secure (or banked non-secure) configuration register 0
    pub const SCR0: usize = 0x000;
    /// Configuration register 1 (non-secure partitioning)
    pub const SCR1: usize = 0x004;
    /// Identification registers SIDR0..SIDR7
    pub const SIDR_BASE: usize = 0x020;
    pub const SIDR_STRIDE: usize = 4;

    /// Global fault address register (64-bit, low word first)
    pub const SGFAR_LO: usize = 0x040;
    pub const SGFAR_HI: usize = 0x044;
    /// Global fault status register (write-one-to-clear)
    pub const SGFSR: usize = 0x048;
    /// Global fault syndrome registers
    pub const SGFSYNR0: usize = 0x050;
    pub const SGFSYNR1: usize = 0x054;
    /// Non-secure global fault address register
    pub const NSGFAR_LO: usize = 0x440;
    pub const NSGFAR_HI: usize = 0x444;
}

/// TLB maintenance trigger registers (write-only)
pub mod tlb {
    /// Invalidate all unlocked secure TLB entries
    pub const STLBIALL: usize = 0x060;
    /// Invalidate all non-secure non-hyp tagged TLB entries
    pub const TLBIALLNSNH: usize = 0x068;
}

/// Stream mapping tables
pub mod stream {
    /// Stream match registers SMR0..SMR47
    pub const SMR_BASE: usize = 0x800;
    pub const SMR_STRIDE: usize = 4;
    /// Stream-to-context registers S2CR0..S2CR47
    pub const S2CR_BASE: usize = 0xC00;
    pub const S2CR_STRIDE: usize = 4;
}

/// Context bank registers
pub mod cb {
    /// Context bank attribute registers CBAR0..CBAR15 (global space)
    pub const CBAR_BASE: usize = 0x1000;
    pub const CBAR_STRIDE: usize = 4;
    /// Context bank attribute registers CBA2R0..CBA2R15 (global space)
    pub const CBA2R_BASE: usize = 0x1800;
    pub const CBA2R_STRIDE: usize = 4;

    /// Base of the translation context bank address space
    pub const SPACE_BASE: usize = 0x10000;
    /// Size of one context bank's register window
    pub const STRIDE: usize = 0x1000;

    // Offsets within one context bank window
    /// System control register (enable, fault report/interrupt)
    pub const SCTLR: usize = 0x000;
    /// Translation control register 2 (PA size, top-byte-ignore)
    pub const TCR2: usize = 0x010;
    /// Translation table base register 0 (64-bit)
    pub const TTBR0: usize = 0x020;
    /// Translation control register
    pub const TCR: usize = 0x030;
    /// Memory attribute indirection register 0
    pub const MAIR0: usize = 0x038;
    /// Fault status register (write-one-to-clear)
    pub const FSR: usize = 0x058;
    /// Fault address register (64-bit, low word first)
    pub const FAR: usize = 0x060;
    /// Fault syndrome register 0
    pub const FSYNR0: usize = 0x068;

    /// Offset of register `reg` within context bank `bank`
    pub const fn reg(bank: u8, reg: usize) -> usize {
        SPACE_BASE + bank as usize * STRIDE + reg
    }
}

/// Platform interrupt-status block (separate region from the SMMU space)
pub mod irq {
    /// Top-level SMMU interrupt status register (write-one-to-clear)
    pub const ISR0: usize = 0x010;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_bank_register_offsets() {
        // CB0 TTBR0 sits at the start of the translation bank space
        assert_eq!(cb::reg(0, cb::TTBR0), 0x10020);
        // CB1 window is one stride further
        assert_eq!(cb::reg(1, cb::SCTLR), 0x11000);
        assert_eq!(cb::reg(15, cb::FSYNR0), 0x1F068);
    }

    #[test]
    fn stream_tables_do_not_overlap() {
        let smr_end = stream::SMR_BASE + 48 * stream::SMR_STRIDE;
        assert!(smr_end <= stream::S2CR_BASE);
        let s2cr_end = stream::S2CR_BASE + 48 * stream::S2CR_STRIDE;
        assert!(s2cr_end <= cb::CBAR_BASE);
    }
}
