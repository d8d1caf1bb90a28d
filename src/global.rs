//! Global configuration registers
//!
//! SCR0 holds the device-wide translation policy (client port bypass, fault
//! reporting, stall policy); SCR1 partitions context banks and stream match
//! groups between the secure and non-secure programming interfaces.

use crate::bits::{set_bit, set_bit_range};
use crate::layout::global;
use crate::space::RegisterSpace;

/// SCR0 field positions
pub mod scr0 {
    /// CLIENTPD: client port disable (1 = all traffic bypasses)
    pub const CLIENTPD_BIT: u8 = 0;
    /// GFRE: return aborts on global faults
    pub const GFRE_BIT: u8 = 1;
    /// GFIE: raise interrupts on global faults
    pub const GFIE_BIT: u8 = 2;
    /// STALLD: disable stalling on context faults
    pub const STALLD_BIT: u8 = 8;
    /// USFCFG: fault unmatched streams instead of bypassing them
    pub const USFCFG_BIT: u8 = 10;
}

/// SCR1 field positions
pub mod scr1 {
    /// NSNUMCBO [4:0]: context banks assigned to the non-secure interface
    pub const NSNUMCBO_HI: u8 = 4;
    pub const NSNUMCBO_LO: u8 = 0;
    /// NSNUMSMRGO [13:8]: stream match groups assigned to the non-secure
    /// interface
    pub const NSNUMSMRGO_HI: u8 = 13;
    pub const NSNUMSMRGO_LO: u8 = 8;
}

/// Device-wide translation policy (SCR0 image)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalConfig {
    /// Bypass every client port, matched or not
    pub client_port_disable: bool,
    /// Return aborts on global faults
    pub global_fault_report: bool,
    /// Raise interrupts on global faults
    pub global_fault_interrupt: bool,
    /// Never stall faulting transactions, terminate them
    pub stall_disable: bool,
    /// Fault unmatched streams rather than bypassing them
    pub unmatched_stream_fault: bool,
}

impl GlobalConfig {
    /// Policy for the programming window: everything bypasses while tables
    /// and banks are being set up, but faults are still reported.
    pub const fn bypass_all() -> Self {
        Self {
            client_port_disable: true,
            global_fault_report: true,
            global_fault_interrupt: true,
            stall_disable: true,
            unmatched_stream_fault: true,
        }
    }

    /// Active policy: matched streams follow their routes, unmatched
    /// streams fault, faulting transactions terminate.
    pub const fn policy_active() -> Self {
        Self {
            client_port_disable: false,
            global_fault_report: true,
            global_fault_interrupt: true,
            stall_disable: true,
            unmatched_stream_fault: true,
        }
    }

    /// Encode to the SCR0 register image
    pub fn encode(&self) -> u32 {
        let mut val = 0u32;
        set_bit(&mut val, scr0::CLIENTPD_BIT, self.client_port_disable);
        set_bit(&mut val, scr0::GFRE_BIT, self.global_fault_report);
        set_bit(&mut val, scr0::GFIE_BIT, self.global_fault_interrupt);
        set_bit(&mut val, scr0::STALLD_BIT, self.stall_disable);
        set_bit(&mut val, scr0::USFCFG_BIT, self.unmatched_stream_fault);
        val
    }
}

/// Global register view
pub struct GlobalControl<'r, R> {
    regs: &'r R,
}

impl<'r, R: RegisterSpace> GlobalControl<'r, R> {
    pub(crate) fn new(regs: &'r R) -> Self {
        Self { regs }
    }

    /// Apply a device-wide policy.
    pub fn set_policy(&self, config: &GlobalConfig) {
        let val = config.encode();
        self.regs.write32(global::SCR0, val);
        log::debug!("SCR0 <- {:#010x}", val);
    }

    /// Current SCR0 image
    pub fn policy_raw(&self) -> u32 {
        self.regs.read32(global::SCR0)
    }

    /// Assign `banks` context banks and `groups` stream match groups to the
    /// non-secure programming interface. Read-modify-write; the other SCR1
    /// fields keep their reset values.
    pub fn set_partition(&self, banks: u8, groups: u8) {
        let mut val = self.regs.read32(global::SCR1);
        set_bit_range(&mut val, scr1::NSNUMCBO_HI, scr1::NSNUMCBO_LO, banks as u32);
        set_bit_range(&mut val, scr1::NSNUMSMRGO_HI, scr1::NSNUMSMRGO_LO, groups as u32);
        self.regs.write32(global::SCR1, val);
        log::debug!("SCR1: {} NS banks, {} NS match groups", banks, groups);
    }

    /// Identification register read, for diagnostics
    pub fn id(&self, index: u8) -> u32 {
        self.regs
            .read32(global::SIDR_BASE + (index & 0x7) as usize * global::SIDR_STRIDE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::MemSpace;

    #[test]
    fn policy_images() {
        // GFRE | GFIE | STALLD | USFCFG, CLIENTPD varies
        assert_eq!(GlobalConfig::bypass_all().encode(), 0x507);
        assert_eq!(GlobalConfig::policy_active().encode(), 0x506);
    }

    #[test]
    fn set_policy_writes_scr0() {
        let regs = MemSpace::new();
        let control = GlobalControl::new(&regs);

        control.set_policy(&GlobalConfig::bypass_all());
        assert_eq!(control.policy_raw(), 0x507);

        control.set_policy(&GlobalConfig::policy_active());
        assert_eq!(regs.read32(global::SCR0), 0x506);
        // client ports now enabled
        assert_eq!(regs.read32(global::SCR0) & 1, 0);
    }

    #[test]
    fn partition_preserves_other_scr1_fields() {
        let regs = MemSpace::new();
        // reset image with an implementation-defined high field set
        regs.write32(global::SCR1, 0x0100_0000);

        let control = GlobalControl::new(&regs);
        control.set_partition(16, 48);

        let val = regs.read32(global::SCR1);
        assert_eq!(val & 0x1F, 16);
        assert_eq!((val >> 8) & 0x3F, 48);
        assert_eq!(val & 0x0100_0000, 0x0100_0000);
    }

    #[test]
    fn id_register_offsets() {
        let regs = MemSpace::new();
        regs.write32(global::SIDR_BASE + 7 * 4, 0xCAFE);
        let control = GlobalControl::new(&regs);
        assert_eq!(control.id(7), 0xCAFE);
        assert_eq!(control.id(0), 0);
    }
}
