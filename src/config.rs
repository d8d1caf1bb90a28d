//! Declarative device configuration
//!
//! [`Smmu`] owns the register spaces and the context banks' protocol state,
//! and hands out narrow views over them. [`SmmuSetup`] describes a whole
//! system declaratively; [`Smmu::apply`] turns it into the ordered register
//! sequence the hardware requires, with every client port bypassed until
//! the tables, banks and stream maps are all in place.

use heapless::Vec;

use crate::context::{BankState, ContextBanks, MairConfig, TranslationControl, TranslationRegime};
use crate::fault::{FaultReporter, TlbInvalidator};
use crate::global::{GlobalConfig, GlobalControl};
use crate::space::RegisterSpace;
use crate::stream::{StreamId, StreamMatchEntry, StreamMatchTable, StreamRoute, StreamToContextTable};
use crate::{AddressWidth, Error, Result, NUM_CONTEXT_BANKS, NUM_STREAM_ENTRIES};

/// One bus master's stream mapping: which match entry it occupies, what id
/// pattern it matches, and where its traffic goes.
#[derive(Debug, Clone, Copy)]
pub struct MasterBinding {
    /// Stream match table index, 0..47
    pub smr_index: u8,
    /// Stream id to match
    pub stream: StreamId,
    /// Match mask (a set bit is ignored by the comparator)
    pub mask: u16,
    /// Routing decision for matched traffic
    pub route: StreamRoute,
}

/// Full configuration of one context bank.
#[derive(Debug, Clone, Copy)]
pub struct BankSetup {
    /// Context bank index, 0..15
    pub index: u8,
    pub regime: TranslationRegime,
    pub width: AddressWidth,
    pub mair: MairConfig,
    pub control: TranslationControl,
    pub asid: u16,
    /// Physical base of the bank's translation table, granule-aligned
    pub table_base: u64,
}

/// Declarative description of the whole device configuration.
#[derive(Debug, Default)]
pub struct SmmuSetup {
    /// Context banks assigned to the non-secure interface
    pub ns_banks: u8,
    /// Stream match groups assigned to the non-secure interface
    pub ns_match_groups: u8,
    banks: Vec<BankSetup, NUM_CONTEXT_BANKS>,
    masters: Vec<MasterBinding, NUM_STREAM_ENTRIES>,
}

impl SmmuSetup {
    /// Setup with everything assigned to the non-secure interface and no
    /// banks or masters yet.
    pub fn new() -> Self {
        Self {
            ns_banks: NUM_CONTEXT_BANKS as u8,
            ns_match_groups: NUM_STREAM_ENTRIES as u8,
            banks: Vec::new(),
            masters: Vec::new(),
        }
    }

    /// Add a context bank configuration.
    pub fn add_bank(&mut self, bank: BankSetup) -> Result<()> {
        if bank.index as usize >= NUM_CONTEXT_BANKS {
            return Err(Error::IndexOutOfRange);
        }
        self.banks.push(bank).map_err(|_| Error::IndexOutOfRange)
    }

    /// Add a master binding.
    pub fn add_master(&mut self, master: MasterBinding) -> Result<()> {
        if master.smr_index as usize >= NUM_STREAM_ENTRIES {
            return Err(Error::IndexOutOfRange);
        }
        self.masters.push(master).map_err(|_| Error::IndexOutOfRange)
    }

    /// Configured banks
    pub fn banks(&self) -> &[BankSetup] {
        &self.banks
    }

    /// Configured masters
    pub fn masters(&self) -> &[MasterBinding] {
        &self.masters
    }
}

/// The SMMU device.
///
/// `regs` is the SMMU register window, `irq` the platform interrupt-status
/// block. Owns the context banks' protocol state; all configuration flows
/// through the views this type hands out.
pub struct Smmu<R> {
    regs: R,
    irq: R,
    bank_state: [BankState; NUM_CONTEXT_BANKS],
}

impl<R: RegisterSpace> Smmu<R> {
    pub fn new(regs: R, irq: R) -> Self {
        Self {
            regs,
            irq,
            bank_state: [BankState::default(); NUM_CONTEXT_BANKS],
        }
    }

    /// Stream match table view
    pub fn streams(&self) -> StreamMatchTable<'_, R> {
        StreamMatchTable::new(&self.regs)
    }

    /// Stream-to-context routing view
    pub fn routes(&self) -> StreamToContextTable<'_, R> {
        StreamToContextTable::new(&self.regs)
    }

    /// Context bank configurator (exclusive: holds the protocol state)
    pub fn banks(&mut self) -> ContextBanks<'_, R> {
        ContextBanks::new(&self.regs, &mut self.bank_state)
    }

    /// Global control view
    pub fn global(&self) -> GlobalControl<'_, R> {
        GlobalControl::new(&self.regs)
    }

    /// Fault record view
    pub fn faults(&self) -> FaultReporter<'_, R> {
        FaultReporter::new(&self.regs, &self.irq)
    }

    /// TLB maintenance view
    pub fn tlb(&self) -> TlbInvalidator<'_, R> {
        TlbInvalidator::new(&self.regs)
    }

    /// Bring the device from an unknown state to `setup`.
    ///
    /// Sequence: drop cached translations and boot-time fault residue, force
    /// global bypass, rebuild the stream tables, program and enable each
    /// context bank, invalidate again, then lift the bypass. Client traffic
    /// only sees the old policy or the complete new one. An error leaves the
    /// device in bypass with fault reporting live.
    pub fn apply(&mut self, setup: &SmmuSetup) -> Result<()> {
        self.tlb().invalidate_all();
        self.faults().clear_all();

        self.global().set_partition(setup.ns_banks, setup.ns_match_groups);
        self.global().set_policy(&GlobalConfig::bypass_all());

        self.streams().reset_all();
        for master in setup.masters() {
            self.streams().configure(&StreamMatchEntry::matching(
                master.smr_index,
                master.stream,
                master.mask,
            ))?;
            self.routes().configure(master.smr_index, master.route)?;
        }

        self.banks().disable_all();
        for bank in setup.banks() {
            let mut banks = self.banks();
            banks.set_address_mode(bank.index, bank.regime, bank.width)?;
            banks.set_memory_attributes(bank.index, bank.mair)?;
            banks.set_translation_control(bank.index, &bank.control)?;
            banks.set_table_base(bank.index, bank.asid, bank.table_base)?;
            banks.set_enable(bank.index, true, true, true)?;
        }

        self.tlb().invalidate_all();
        self.global().set_policy(&GlobalConfig::policy_active());
        log::info!(
            "SMMU active: {} banks, {} masters",
            setup.banks().len(),
            setup.masters().len()
        );
        Ok(())
    }
}
