//! Fault reporting and TLB maintenance
//!
//! [`FaultReporter`] is the only type that touches the fault-record
//! registers, and it only snapshots and clears them; configuration state is
//! outside its write surface. That split lets a fault handler run against
//! the live device without being able to disturb translation, and lets the
//! init path clear boot-time residue before enabling anything.

use bitflags::bitflags;

use crate::layout::{cb, global, irq, tlb};
use crate::space::RegisterSpace;
use crate::{Error, Result, NUM_CONTEXT_BANKS};

bitflags! {
    /// Global fault status register (SGFSR) bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GlobalFaultStatus: u32 {
        /// Invalid context fault
        const ICF = 1 << 0;
        /// Unmatched stream fault
        const USF = 1 << 1;
        /// Stream match conflict fault
        const SMCF = 1 << 2;
        /// Unimplemented context bank fault
        const UCBF = 1 << 3;
        /// Unimplemented context interrupt fault
        const UCIF = 1 << 4;
        /// Configuration access fault
        const CAF = 1 << 5;
        /// External fault on a configuration access
        const EF = 1 << 6;
        /// Permission fault on a configuration access
        const PF = 1 << 7;
        /// Multiple faults recorded since the last clear
        const MULTI = 1 << 31;
    }
}

bitflags! {
    /// Context fault status register (FSR) bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ContextFaultStatus: u32 {
        /// Translation fault
        const TF = 1 << 1;
        /// Access flag fault
        const AFF = 1 << 2;
        /// Permission fault
        const PF = 1 << 3;
        /// External fault on a table walk
        const EF = 1 << 4;
        /// TLB match conflict fault
        const TLBMCF = 1 << 5;
        /// TLB lock fault
        const TLBLKF = 1 << 6;
        /// Address size fault
        const ASF = 1 << 7;
        /// Transaction stalled
        const SS = 1 << 30;
        /// Multiple faults recorded since the last clear
        const MULTI = 1 << 31;
    }
}

/// Snapshot of the global fault record
#[derive(Debug, Clone, Copy)]
pub struct GlobalFaultRecord {
    pub status: GlobalFaultStatus,
    pub syndrome0: u32,
    pub syndrome1: u32,
    /// Faulting address (secure record)
    pub address: u64,
    /// Faulting address (non-secure record)
    pub ns_address: u64,
}

impl GlobalFaultRecord {
    /// Whether any fault has been recorded since the last clear
    pub fn any(&self) -> bool {
        !self.status.is_empty()
    }
}

/// Snapshot of one context bank's fault record
#[derive(Debug, Clone, Copy)]
pub struct ContextFaultRecord {
    pub bank: u8,
    pub status: ContextFaultStatus,
    pub address: u64,
    pub syndrome: u32,
}

impl ContextFaultRecord {
    /// Whether any fault has been recorded since the last clear
    pub fn any(&self) -> bool {
        !self.status.is_empty()
    }
}

fn read_pair<R: RegisterSpace>(regs: &R, lo: usize, hi: usize) -> u64 {
    (regs.read32(hi) as u64) << 32 | regs.read32(lo) as u64
}

/// Fault record reader and clearer.
///
/// `irq` is the platform interrupt-status block; it is a separate register
/// region from the SMMU space proper.
pub struct FaultReporter<'r, R> {
    regs: &'r R,
    irq: &'r R,
}

impl<'r, R: RegisterSpace> FaultReporter<'r, R> {
    pub(crate) fn new(regs: &'r R, irq: &'r R) -> Self {
        Self { regs, irq }
    }

    /// Snapshot the global fault record without altering it.
    pub fn snapshot_global(&self) -> GlobalFaultRecord {
        let record = GlobalFaultRecord {
            status: GlobalFaultStatus::from_bits_retain(self.regs.read32(global::SGFSR)),
            syndrome0: self.regs.read32(global::SGFSYNR0),
            syndrome1: self.regs.read32(global::SGFSYNR1),
            address: read_pair(self.regs, global::SGFAR_LO, global::SGFAR_HI),
            ns_address: read_pair(self.regs, global::NSGFAR_LO, global::NSGFAR_HI),
        };
        if record.any() {
            log::warn!(
                "global fault: {:?} at {:#x}",
                record.status,
                record.address
            );
        }
        record
    }

    /// Snapshot one context bank's fault record without altering it.
    pub fn snapshot_context(&self, bank: u8) -> Result<ContextFaultRecord> {
        if bank as usize >= NUM_CONTEXT_BANKS {
            return Err(Error::IndexOutOfRange);
        }
        let record = ContextFaultRecord {
            bank,
            status: ContextFaultStatus::from_bits_retain(self.regs.read32(cb::reg(bank, cb::FSR))),
            address: self.regs.read64(cb::reg(bank, cb::FAR)),
            syndrome: self.regs.read32(cb::reg(bank, cb::FSYNR0)),
        };
        if record.any() {
            log::warn!(
                "CB{} fault: {:?} at {:#x}",
                bank,
                record.status,
                record.address
            );
        }
        Ok(record)
    }

    /// Clear every fault record: the top-level interrupt status, the global
    /// record, and each bank's record.
    ///
    /// Status registers are write-one-to-clear and take the all-ones image;
    /// address and syndrome registers are plain writes and take zero.
    pub fn clear_all(&self) {
        self.irq.write32(irq::ISR0, 0xFFFF_FFFF);

        self.regs.write32(global::SGFSR, 0xFFFF_FFFF);
        self.regs.write32(global::SGFSYNR0, 0);
        self.regs.write32(global::SGFSYNR1, 0);
        self.regs.write32(global::SGFAR_LO, 0);
        self.regs.write32(global::SGFAR_HI, 0);
        self.regs.write32(global::NSGFAR_LO, 0);
        self.regs.write32(global::NSGFAR_HI, 0);

        for bank in 0..NUM_CONTEXT_BANKS as u8 {
            self.regs.write32(cb::reg(bank, cb::FSR), 0xFFFF_FFFF);
            self.regs.write64(cb::reg(bank, cb::FAR), 0);
            self.regs.write32(cb::reg(bank, cb::FSYNR0), 0);
        }
        log::debug!("fault records cleared");
    }
}

/// TLB invalidation trigger.
pub struct TlbInvalidator<'r, R> {
    regs: &'r R,
}

impl<'r, R: RegisterSpace> TlbInvalidator<'r, R> {
    pub(crate) fn new(regs: &'r R) -> Self {
        Self { regs }
    }

    /// Drop every cached translation, secure and non-secure.
    ///
    /// Runs before translation is enabled (stale boot-time entries) and
    /// after the tables change (entries cached under the old mapping).
    pub fn invalidate_all(&self) {
        self.regs.write32(tlb::STLBIALL, 0xFFFF_FFFF);
        self.regs.write32(tlb::TLBIALLNSNH, 0xFFFF_FFFF);
        log::trace!("TLB invalidated");
    }
}
