//! Context bank programming
//!
//! Each of the 16 context banks is an independent translation context with
//! its own table base, attributes and control state. Bringing a bank up is
//! an ordered protocol; reordering the steps produces undefined hardware
//! behavior, so the configurator tracks per-bank progress and rejects
//! out-of-order calls before anything reaches the registers:
//!
//! `Disabled -> address mode -> attributes -> translation control ->
//! table base -> Enabled`
//!
//! Disabling a bank returns it to a reconfigurable state without discarding
//! the already-programmed steps, so a single register may be corrected and
//! the bank re-enabled.

use bitflags::bitflags;

use crate::bits::{set_bit, set_bit_range};
use crate::layout::cb;
use crate::space::RegisterSpace;
use crate::{AddressWidth, Error, Result, NUM_CONTEXT_BANKS};

/// CBAR field positions and type encodings
pub mod cbar {
    /// TYPE field [17:16]
    pub const TYPE_HI: u8 = 17;
    pub const TYPE_LO: u8 = 16;

    /// Stage-2 only context
    pub const TYPE_STAGE2: u32 = 0b00;
    /// Stage-1 context with stage-2 bypass
    pub const TYPE_STAGE1_BYPASS2: u32 = 0b01;
}

/// CBA2R field positions
pub mod cba2r {
    /// VA64 bit: 0 = AArch32 translation scheme, 1 = AArch64
    pub const VA64_BIT: u8 = 0;
}

/// SCTLR field positions
pub mod sctlr {
    /// M bit: translation enable
    pub const M_BIT: u8 = 0;
    /// CFRE: return an abort to the master on a context fault
    pub const CFRE_BIT: u8 = 5;
    /// CFIE: raise an interrupt on a context fault
    pub const CFIE_BIT: u8 = 6;
}

/// TCR field positions (AArch32 LPAE stage-1 layout)
pub mod tcr {
    /// T0SZ [2:0]: size offset of the TTBR0 region
    pub const T0SZ_HI: u8 = 2;
    pub const T0SZ_LO: u8 = 0;
    /// IRGN0 [9:8]: inner cacheability for table walks
    pub const IRGN0_HI: u8 = 9;
    pub const IRGN0_LO: u8 = 8;
    /// ORGN0 [11:10]: outer cacheability for table walks
    pub const ORGN0_HI: u8 = 11;
    pub const ORGN0_LO: u8 = 10;
    /// SH0 [13:12]: shareability for table walks
    pub const SH0_HI: u8 = 13;
    pub const SH0_LO: u8 = 12;
    /// T1SZ [18:16]: size offset of the TTBR1 region (0 disables TTBR1)
    pub const T1SZ_HI: u8 = 18;
    pub const T1SZ_LO: u8 = 16;
    /// EAE bit: long-descriptor translation scheme
    pub const EAE_BIT: u8 = 31;
}

/// TCR2 field positions (stage-1 only register)
pub mod tcr2 {
    /// IPS [2:0]: intermediate physical address size
    pub const IPS_HI: u8 = 2;
    pub const IPS_LO: u8 = 0;
    /// TBI0 bit: top byte ignored for TTBR0 walks
    pub const TBI0_BIT: u8 = 5;
}

/// TTBR0 field positions (AArch32 LPAE layout)
pub mod ttbr {
    /// Table base address [31:0] (AArch32 addresses top out at 40 bits;
    /// [47:40] are RES0)
    pub const ADDR_HI: u8 = 31;
    pub const ADDR_LO: u8 = 0;
    pub const RES0_HI: u8 = 47;
    pub const RES0_LO: u8 = 40;
    /// ASID [55:48]
    pub const ASID_HI: u8 = 55;
    pub const ASID_LO: u8 = 48;
}

/// Translation regime of a context bank
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationRegime {
    /// Stage-1 translation, stage-2 bypassed
    Stage1,
    /// Stage-2 only translation
    Stage2,
}

impl TranslationRegime {
    fn cbar_type(self) -> u32 {
        match self {
            Self::Stage1 => cbar::TYPE_STAGE1_BYPASS2,
            Self::Stage2 => cbar::TYPE_STAGE2,
        }
    }
}

/// Cacheability for translation table walks (IRGN/ORGN encoding)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAttr {
    NonCacheable = 0b00,
    WriteBackWriteAllocate = 0b01,
    WriteThrough = 0b10,
    WriteBackNoAllocate = 0b11,
}

/// Shareability for translation table walks (SH encoding)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shareability {
    NonShareable = 0b00,
    OuterShareable = 0b10,
    InnerShareable = 0b11,
}

/// Translation granule
///
/// The AArch32 LPAE scheme fixes the granule at 4 KiB; the variant exists
/// so the table-base alignment rule is stated in one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granule {
    Granule4K,
}

impl Granule {
    /// Granule size in bytes
    pub const fn bytes(self) -> u64 {
        match self {
            Self::Granule4K => 4096,
        }
    }
}

/// Memory attribute indirection table (MAIR0: attribute indices 0..3).
///
/// Translation table entries select an attribute through their AttrIndx
/// field; each byte here defines one index.
#[derive(Debug, Clone, Copy)]
pub struct MairConfig {
    pub attr0: u8,
    pub attr1: u8,
    pub attr2: u8,
    pub attr3: u8,
}

impl MairConfig {
    /// Attribute 0: normal memory, inner/outer non-cacheable. Matches the
    /// canonical block descriptor's AttrIndx of 0.
    pub const fn normal_non_cacheable() -> Self {
        Self {
            attr0: 0x44,
            attr1: 0x00,
            attr2: 0x00,
            attr3: 0x00,
        }
    }

    /// Encode to the MAIR0 register image
    pub fn encode(&self) -> u32 {
        (self.attr0 as u32)
            | (self.attr1 as u32) << 8
            | (self.attr2 as u32) << 16
            | (self.attr3 as u32) << 24
    }
}

impl Default for MairConfig {
    fn default() -> Self {
        Self::normal_non_cacheable()
    }
}

/// Translation control parameters for one bank.
///
/// `t0sz` sets the walked VA width as `max_width - t0sz`; with the AArch32
/// scheme, `t0sz == 0` walks the full 32-bit space. `t1sz == 0` keeps TTBR1
/// disabled. The granule is fixed by the LPAE format and is carried here to
/// anchor the table-base alignment rule.
#[derive(Debug, Clone, Copy)]
pub struct TranslationControl {
    pub t0sz: u8,
    pub inner_cache: CacheAttr,
    pub outer_cache: CacheAttr,
    pub shareability: Shareability,
    pub granule: Granule,
    pub t1sz: u8,
    /// IPS encoding for TCR2 (0 = 32-bit PA space)
    pub pa_size: u8,
    /// Top-byte-ignore for TTBR0 walks
    pub tbi0: bool,
}

impl Default for TranslationControl {
    fn default() -> Self {
        Self {
            t0sz: 0,
            inner_cache: CacheAttr::WriteBackWriteAllocate,
            outer_cache: CacheAttr::WriteBackWriteAllocate,
            shareability: Shareability::InnerShareable,
            granule: Granule::Granule4K,
            t1sz: 0,
            pa_size: 0,
            tbi0: false,
        }
    }
}

impl TranslationControl {
    /// Encode to the TCR register image (EAE always set: long-descriptor)
    pub fn encode_tcr(&self) -> u32 {
        let mut val = 0u32;
        set_bit_range(&mut val, tcr::T0SZ_HI, tcr::T0SZ_LO, self.t0sz as u32);
        set_bit_range(&mut val, tcr::IRGN0_HI, tcr::IRGN0_LO, self.inner_cache as u32);
        set_bit_range(&mut val, tcr::ORGN0_HI, tcr::ORGN0_LO, self.outer_cache as u32);
        set_bit_range(&mut val, tcr::SH0_HI, tcr::SH0_LO, self.shareability as u32);
        set_bit_range(&mut val, tcr::T1SZ_HI, tcr::T1SZ_LO, self.t1sz as u32);
        set_bit(&mut val, tcr::EAE_BIT, true);
        val
    }

    /// Encode to the TCR2 register image
    pub fn encode_tcr2(&self) -> u32 {
        let mut val = 0u32;
        set_bit_range(&mut val, tcr2::IPS_HI, tcr2::IPS_LO, self.pa_size as u32);
        set_bit(&mut val, tcr2::TBI0_BIT, self.tbi0);
        val
    }
}

bitflags! {
    /// Completed programming steps for one context bank
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct BankProgress: u8 {
        const ADDRESS_MODE = 1 << 0;
        const ATTRIBUTES = 1 << 1;
        const TRANSLATION_CONTROL = 1 << 2;
        const TABLE_BASE = 1 << 3;
    }
}

/// Shadow state of one context bank's initialization protocol
#[derive(Debug, Clone, Copy)]
pub struct BankState {
    progress: BankProgress,
    enabled: bool,
    granule: Granule,
}

impl Default for BankState {
    fn default() -> Self {
        Self {
            progress: BankProgress::empty(),
            enabled: false,
            granule: Granule::Granule4K,
        }
    }
}

/// Context bank configurator.
///
/// Holds the only mutable handle to the banks' protocol state; concurrent
/// configuration of the same bank from two paths is excluded by the `&mut`
/// borrow of that state.
pub struct ContextBanks<'r, R> {
    regs: &'r R,
    state: &'r mut [BankState; NUM_CONTEXT_BANKS],
}

impl<'r, R: RegisterSpace> ContextBanks<'r, R> {
    pub(crate) fn new(regs: &'r R, state: &'r mut [BankState; NUM_CONTEXT_BANKS]) -> Self {
        Self { regs, state }
    }

    fn check_index(index: u8) -> Result<()> {
        if index as usize >= NUM_CONTEXT_BANKS {
            return Err(Error::IndexOutOfRange);
        }
        Ok(())
    }

    /// Configuration steps are forbidden on an enabled bank.
    fn check_disabled(&self, index: u8) -> Result<()> {
        if self.state[index as usize].enabled {
            return Err(Error::InvalidOrdering);
        }
        Ok(())
    }

    /// A step may only run once its predecessor has.
    fn check_step(&self, index: u8, prerequisite: BankProgress) -> Result<()> {
        if !self.state[index as usize].progress.contains(prerequisite) {
            return Err(Error::InvalidOrdering);
        }
        Ok(())
    }

    /// Whether the bank currently participates in translation
    pub fn is_enabled(&self, index: u8) -> bool {
        (index as usize) < NUM_CONTEXT_BANKS && self.state[index as usize].enabled
    }

    /// Select the bank's translation regime and address-translation format.
    ///
    /// First step of the protocol. CBAR comes out of reset uninitialized
    /// and must be written before the bank is used; CBA2R selects the
    /// AArch32 or AArch64 table format.
    pub fn set_address_mode(
        &mut self,
        index: u8,
        regime: TranslationRegime,
        width: AddressWidth,
    ) -> Result<()> {
        Self::check_index(index)?;
        self.check_disabled(index)?;

        let mut val = 0u32;
        set_bit_range(&mut val, cbar::TYPE_HI, cbar::TYPE_LO, regime.cbar_type());
        self.regs
            .write32(cb::CBAR_BASE + index as usize * cb::CBAR_STRIDE, val);

        let mut val = 0u32;
        set_bit(&mut val, cba2r::VA64_BIT, width == AddressWidth::Va64);
        self.regs
            .write32(cb::CBA2R_BASE + index as usize * cb::CBA2R_STRIDE, val);

        self.state[index as usize].progress |= BankProgress::ADDRESS_MODE;
        log::trace!("CB{}: regime {:?}, width {:?}", index, regime, width);
        Ok(())
    }

    /// Program the attribute-index table referenced by the bank's
    /// translation table entries.
    pub fn set_memory_attributes(&mut self, index: u8, mair: MairConfig) -> Result<()> {
        Self::check_index(index)?;
        self.check_disabled(index)?;
        self.check_step(index, BankProgress::ADDRESS_MODE)?;

        self.regs.write32(cb::reg(index, cb::MAIR0), mair.encode());
        self.state[index as usize].progress |= BankProgress::ATTRIBUTES;
        Ok(())
    }

    /// Program the size, cacheability and shareability of the VA region
    /// walked through the bank's table base.
    pub fn set_translation_control(
        &mut self,
        index: u8,
        control: &TranslationControl,
    ) -> Result<()> {
        Self::check_index(index)?;
        self.check_disabled(index)?;
        self.check_step(index, BankProgress::ATTRIBUTES)?;

        self.regs
            .write32(cb::reg(index, cb::TCR), control.encode_tcr());
        self.regs
            .write32(cb::reg(index, cb::TCR2), control.encode_tcr2());

        let state = &mut self.state[index as usize];
        state.granule = control.granule;
        state.progress |= BankProgress::TRANSLATION_CONTROL;
        Ok(())
    }

    /// Program the physical base address the bank walks from.
    ///
    /// `table_base` must be aligned to the granule selected by
    /// [`set_translation_control`](Self::set_translation_control); a
    /// misaligned base is rejected before any register write.
    pub fn set_table_base(&mut self, index: u8, asid: u16, table_base: u64) -> Result<()> {
        Self::check_index(index)?;
        self.check_disabled(index)?;
        self.check_step(index, BankProgress::TRANSLATION_CONTROL)?;

        let granule = self.state[index as usize].granule;
        if table_base % granule.bytes() != 0 {
            return Err(Error::MisalignedTableBase);
        }

        let mut val = 0u64;
        set_bit_range(&mut val, ttbr::ADDR_HI, ttbr::ADDR_LO, table_base);
        set_bit_range(&mut val, ttbr::RES0_HI, ttbr::RES0_LO, 0);
        set_bit_range(&mut val, ttbr::ASID_HI, ttbr::ASID_LO, asid as u64);
        self.regs.write64(cb::reg(index, cb::TTBR0), val);

        self.state[index as usize].progress |= BankProgress::TABLE_BASE;
        log::trace!("CB{}: TTBR0 <- {:#018x}", index, val);
        Ok(())
    }

    /// Terminal transition: only after this does the bank translate.
    ///
    /// Enabling requires the full protocol to have run. Disabling returns
    /// the bank to a reconfigurable state while keeping its programmed
    /// registers, so an individual step may be redone and the bank
    /// re-enabled.
    pub fn set_enable(
        &mut self,
        index: u8,
        enabled: bool,
        fault_report: bool,
        fault_interrupt: bool,
    ) -> Result<()> {
        Self::check_index(index)?;
        if enabled && !self.state[index as usize].progress.is_all() {
            return Err(Error::InvalidOrdering);
        }

        let mut val = 0u32;
        set_bit(&mut val, sctlr::M_BIT, enabled);
        set_bit(&mut val, sctlr::CFRE_BIT, fault_report);
        set_bit(&mut val, sctlr::CFIE_BIT, fault_interrupt);
        self.regs.write32(cb::reg(index, cb::SCTLR), val);

        self.state[index as usize].enabled = enabled;
        log::debug!("CB{}: {}", index, if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    /// Force every bank out of translation and restart all protocols.
    ///
    /// Run once before programming begins so no bank carries over an
    /// earlier configuration.
    pub fn disable_all(&mut self) {
        for index in 0..NUM_CONTEXT_BANKS as u8 {
            self.regs.write32(cb::reg(index, cb::SCTLR), 0);
            self.state[index as usize] = BankState::default();
        }
        log::debug!("all context banks disabled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::MemSpace;

    fn program_bank(cb: &mut ContextBanks<'_, MemSpace>, index: u8, base: u64) {
        cb.set_address_mode(index, TranslationRegime::Stage1, AddressWidth::Va32)
            .unwrap();
        cb.set_memory_attributes(index, MairConfig::default()).unwrap();
        cb.set_translation_control(index, &TranslationControl::default())
            .unwrap();
        cb.set_table_base(index, 0, base).unwrap();
    }

    #[test]
    fn full_sequence_register_images() {
        let space = MemSpace::new();
        let mut state = [BankState::default(); NUM_CONTEXT_BANKS];
        let mut cb = ContextBanks::new(&space, &mut state);

        program_bank(&mut cb, 0, 0x4_0000);
        cb.set_enable(0, true, true, true).unwrap();

        assert_eq!(space.read32(cb::CBAR_BASE), cbar::TYPE_STAGE1_BYPASS2 << 16);
        assert_eq!(space.read32(cb::CBA2R_BASE), 0); // VA64 clear
        assert_eq!(space.read32(cb::reg(0, cb::MAIR0)), 0x44);
        // T0SZ 0, IRGN0/ORGN0 WB-WA, SH0 inner shareable, T1SZ 0, EAE
        assert_eq!(space.read32(cb::reg(0, cb::TCR)), 0x8000_3500);
        assert_eq!(space.read32(cb::reg(0, cb::TCR2)), 0);
        assert_eq!(space.read64(cb::reg(0, cb::TTBR0)), 0x4_0000);
        // M | CFRE | CFIE
        assert_eq!(space.read32(cb::reg(0, cb::SCTLR)), 0x61);
    }

    #[test]
    fn asid_lands_in_upper_bits() {
        let space = MemSpace::new();
        let mut state = [BankState::default(); NUM_CONTEXT_BANKS];
        let mut cb = ContextBanks::new(&space, &mut state);

        cb.set_address_mode(1, TranslationRegime::Stage1, AddressWidth::Va32)
            .unwrap();
        cb.set_memory_attributes(1, MairConfig::default()).unwrap();
        cb.set_translation_control(1, &TranslationControl::default())
            .unwrap();
        cb.set_table_base(1, 0xAA, 0x8000_0000).unwrap();

        let ttbr = space.read64(cb::reg(1, cb::TTBR0));
        assert_eq!(ttbr & 0xFFFF_FFFF, 0x8000_0000);
        assert_eq!((ttbr >> 48) & 0xFF, 0xAA);
        assert_eq!((ttbr >> 40) & 0xFF, 0); // RES0
    }

    #[test]
    fn steps_enforced_in_order() {
        let space = MemSpace::new();
        let mut state = [BankState::default(); NUM_CONTEXT_BANKS];
        let mut cb = ContextBanks::new(&space, &mut state);

        // attributes before address mode
        assert_eq!(
            cb.set_memory_attributes(0, MairConfig::default()),
            Err(Error::InvalidOrdering)
        );
        // table base before translation control
        cb.set_address_mode(0, TranslationRegime::Stage1, AddressWidth::Va32)
            .unwrap();
        assert_eq!(cb.set_table_base(0, 0, 0x1000), Err(Error::InvalidOrdering));
        // enable before the protocol completes
        assert_eq!(cb.set_enable(0, true, true, true), Err(Error::InvalidOrdering));
        assert_eq!(space.read32(cb::reg(0, cb::SCTLR)), 0);
    }

    #[test]
    fn reconfiguration_requires_disable() {
        let space = MemSpace::new();
        let mut state = [BankState::default(); NUM_CONTEXT_BANKS];
        let mut cb = ContextBanks::new(&space, &mut state);

        program_bank(&mut cb, 2, 0x4_0000);
        cb.set_enable(2, true, true, true).unwrap();

        // live bank rejects the step, registers untouched
        assert_eq!(cb.set_table_base(2, 0, 0x8000), Err(Error::InvalidOrdering));
        assert_eq!(space.read64(cb::reg(2, cb::TTBR0)), 0x4_0000);

        // disable, retry the single step, re-enable
        cb.set_enable(2, false, true, true).unwrap();
        cb.set_table_base(2, 0, 0x8000).unwrap();
        cb.set_enable(2, true, true, true).unwrap();
        assert_eq!(space.read64(cb::reg(2, cb::TTBR0)), 0x8000);
        assert_eq!(space.read32(cb::reg(2, cb::SCTLR)), 0x61);
    }

    #[test]
    fn misaligned_table_base_rejected_before_write() {
        let space = MemSpace::new();
        let mut state = [BankState::default(); NUM_CONTEXT_BANKS];
        let mut cb = ContextBanks::new(&space, &mut state);

        cb.set_address_mode(0, TranslationRegime::Stage1, AddressWidth::Va32)
            .unwrap();
        cb.set_memory_attributes(0, MairConfig::default()).unwrap();
        cb.set_translation_control(0, &TranslationControl::default())
            .unwrap();

        assert_eq!(
            cb.set_table_base(0, 0, 0x1234),
            Err(Error::MisalignedTableBase)
        );
        assert_eq!(space.read64(cb::reg(0, cb::TTBR0)), 0);

        cb.set_table_base(0, 0, 0x1000).unwrap();
    }

    #[test]
    fn bank_index_bounds() {
        let space = MemSpace::new();
        let mut state = [BankState::default(); NUM_CONTEXT_BANKS];
        let mut cb = ContextBanks::new(&space, &mut state);

        assert_eq!(
            cb.set_address_mode(16, TranslationRegime::Stage1, AddressWidth::Va32),
            Err(Error::IndexOutOfRange)
        );
        assert!(!cb.is_enabled(16));
    }

    #[test]
    fn disable_all_restarts_protocols() {
        let space = MemSpace::new();
        let mut state = [BankState::default(); NUM_CONTEXT_BANKS];
        let mut cb = ContextBanks::new(&space, &mut state);

        program_bank(&mut cb, 0, 0x4_0000);
        cb.set_enable(0, true, true, true).unwrap();
        cb.disable_all();

        assert_eq!(space.read32(cb::reg(0, cb::SCTLR)), 0);
        assert!(!cb.is_enabled(0));
        // protocol restarted: mid-sequence step now out of order again
        assert_eq!(
            cb.set_memory_attributes(0, MairConfig::default()),
            Err(Error::InvalidOrdering)
        );
    }

    #[test]
    fn stage2_and_va64_encodings() {
        let space = MemSpace::new();
        let mut state = [BankState::default(); NUM_CONTEXT_BANKS];
        let mut cb = ContextBanks::new(&space, &mut state);

        cb.set_address_mode(3, TranslationRegime::Stage2, AddressWidth::Va64)
            .unwrap();
        assert_eq!(
            space.read32(cb::CBAR_BASE + 3 * cb::CBAR_STRIDE) >> 16 & 0x3,
            cbar::TYPE_STAGE2
        );
        assert_eq!(space.read32(cb::CBA2R_BASE + 3 * cb::CBA2R_STRIDE) & 1, 1);
    }
}
