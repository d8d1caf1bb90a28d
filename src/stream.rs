//! Stream matching and stream-to-context routing
//!
//! The stream match table (SMR0..SMR47) binds masked stream ids to match
//! entries; the stream-to-context table (S2CR0..S2CR47, same index space)
//! declares what happens to matched traffic: translation through a context
//! bank, untranslated bypass, or an immediate fault.

use crate::bits::{set_bit, set_bit_range};
use crate::layout;
use crate::space::RegisterSpace;
use crate::{Error, Result, NUM_CONTEXT_BANKS, NUM_STREAM_ENTRIES};

/// SMR field positions
pub mod smr {
    /// VALID bit
    pub const VALID_BIT: u8 = 31;
    /// MASK field [30:16]
    pub const MASK_HI: u8 = 30;
    pub const MASK_LO: u8 = 16;
    /// TBU number field [14:10]
    pub const TBU_HI: u8 = 14;
    pub const TBU_LO: u8 = 10;
    /// Master id field [9:0]
    pub const ID_HI: u8 = 9;
    pub const ID_LO: u8 = 0;
}

/// S2CR field positions and type encodings
pub mod s2cr {
    /// TYPE field [17:16]
    pub const TYPE_HI: u8 = 17;
    pub const TYPE_LO: u8 = 16;
    /// Context bank index field CBNDX [7:0]
    pub const CBNDX_HI: u8 = 7;
    pub const CBNDX_LO: u8 = 0;

    /// TYPE values
    pub const TYPE_TRANSLATE: u32 = 0b00;
    pub const TYPE_BYPASS: u32 = 0b01;
    pub const TYPE_FAULT: u32 = 0b10;
}

/// Stream identifier: TBU number [14:10] concatenated with master id [9:0].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamId(u16);

impl StreamId {
    /// Build a stream id from its TBU number and master id parts
    pub const fn from_parts(tbu_number: u8, master_id: u16) -> Self {
        Self((((tbu_number & 0x1F) as u16) << 10) | (master_id & 0x3FF))
    }

    /// Build a stream id from a raw 15-bit value
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw & 0x7FFF)
    }

    /// TBU number part
    pub const fn tbu_number(self) -> u8 {
        ((self.0 >> 10) & 0x1F) as u8
    }

    /// Master id part
    pub const fn master_id(self) -> u16 {
        self.0 & 0x3FF
    }

    /// Raw 15-bit value
    pub const fn raw(self) -> u16 {
        self.0
    }
}

/// One stream match table entry.
///
/// `mask` selects which stream id bits must match exactly: a zero mask bit
/// means "must match", a one bit is ignored by the comparator. A disabled
/// entry (`valid == false`) matches nothing.
#[derive(Debug, Clone, Copy)]
pub struct StreamMatchEntry {
    /// Table index, 0..47
    pub index: u8,
    /// Entry participates in matching
    pub valid: bool,
    /// Match mask over the stream id bits
    pub mask: u16,
    /// TBU number to match
    pub tbu_number: u8,
    /// Master id to match
    pub master_id: u16,
}

impl StreamMatchEntry {
    /// Entry matching `stream` exactly under `mask`
    pub fn matching(index: u8, stream: StreamId, mask: u16) -> Self {
        Self {
            index,
            valid: true,
            mask,
            tbu_number: stream.tbu_number(),
            master_id: stream.master_id(),
        }
    }

    /// Disabled entry (matches nothing)
    pub fn disabled(index: u8) -> Self {
        Self {
            index,
            valid: false,
            mask: 0,
            tbu_number: 0,
            master_id: 0,
        }
    }

    /// Encode to the SMR register image
    pub fn encode(&self) -> u32 {
        let mut val = 0u32;
        set_bit(&mut val, smr::VALID_BIT, self.valid);
        set_bit_range(&mut val, smr::MASK_HI, smr::MASK_LO, self.mask as u32);
        set_bit_range(&mut val, smr::TBU_HI, smr::TBU_LO, self.tbu_number as u32);
        set_bit_range(&mut val, smr::ID_HI, smr::ID_LO, self.master_id as u32);
        val
    }
}

/// Routing decision for one matched stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamRoute {
    /// Translate through the given context bank
    Translate {
        /// Context bank index, 0..15
        bank: u8,
    },
    /// Pass through untranslated
    Bypass,
    /// Fault immediately
    Fault,
}

/// Stream match table view
pub struct StreamMatchTable<'r, R> {
    regs: &'r R,
}

impl<'r, R: RegisterSpace> StreamMatchTable<'r, R> {
    pub(crate) fn new(regs: &'r R) -> Self {
        Self { regs }
    }

    /// Program one match entry.
    pub fn configure(&self, entry: &StreamMatchEntry) -> Result<()> {
        if entry.index as usize >= NUM_STREAM_ENTRIES {
            return Err(Error::IndexOutOfRange);
        }
        let offset =
            layout::stream::SMR_BASE + entry.index as usize * layout::stream::SMR_STRIDE;
        let val = entry.encode();
        self.regs.write32(offset, val);
        log::trace!("SMR{} <- {:#010x}", entry.index, val);
        Ok(())
    }

    /// Disable every match entry.
    ///
    /// Must run before the table is reprogrammed so no stale match survives
    /// a reconfiguration.
    pub fn reset_all(&self) {
        for index in 0..NUM_STREAM_ENTRIES as u8 {
            // index is in range by construction
            let _ = self.configure(&StreamMatchEntry::disabled(index));
        }
        log::debug!("stream match table reset ({} entries)", NUM_STREAM_ENTRIES);
    }
}

/// Stream-to-context table view
pub struct StreamToContextTable<'r, R> {
    regs: &'r R,
}

impl<'r, R: RegisterSpace> StreamToContextTable<'r, R> {
    pub(crate) fn new(regs: &'r R) -> Self {
        Self { regs }
    }

    /// Route the match entry at `index` according to `route`.
    ///
    /// Several entries may route to the same context bank; the bank then
    /// serves a pool of masters through its single table.
    pub fn configure(&self, index: u8, route: StreamRoute) -> Result<()> {
        if index as usize >= NUM_STREAM_ENTRIES {
            return Err(Error::IndexOutOfRange);
        }

        let mut val = 0u32;
        match route {
            StreamRoute::Translate { bank } => {
                if bank as usize >= NUM_CONTEXT_BANKS {
                    return Err(Error::IndexOutOfRange);
                }
                set_bit_range(&mut val, s2cr::TYPE_HI, s2cr::TYPE_LO, s2cr::TYPE_TRANSLATE);
                set_bit_range(&mut val, s2cr::CBNDX_HI, s2cr::CBNDX_LO, bank as u32);
            }
            StreamRoute::Bypass => {
                set_bit_range(&mut val, s2cr::TYPE_HI, s2cr::TYPE_LO, s2cr::TYPE_BYPASS);
            }
            StreamRoute::Fault => {
                set_bit_range(&mut val, s2cr::TYPE_HI, s2cr::TYPE_LO, s2cr::TYPE_FAULT);
            }
        }

        let offset = layout::stream::S2CR_BASE + index as usize * layout::stream::S2CR_STRIDE;
        self.regs.write32(offset, val);
        log::trace!("S2CR{} <- {:#010x}", index, val);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::MemSpace;

    fn smr_offset(index: usize) -> usize {
        layout::stream::SMR_BASE + index * layout::stream::SMR_STRIDE
    }

    fn s2cr_offset(index: usize) -> usize {
        layout::stream::S2CR_BASE + index * layout::stream::S2CR_STRIDE
    }

    #[test]
    fn stream_id_parts() {
        let id = StreamId::from_parts(0x2, 0x62);
        assert_eq!(id.tbu_number(), 0x2);
        assert_eq!(id.master_id(), 0x62);
        assert_eq!(id.raw(), (0x2 << 10) | 0x62);

        let id = StreamId::from_raw(0b00000_1000000000);
        assert_eq!(id.tbu_number(), 0);
        assert_eq!(id.master_id(), 0b10_0000_0000);
    }

    #[test]
    fn smr_register_image() {
        let space = MemSpace::new();
        let table = StreamMatchTable::new(&space);
        table.reset_all();

        let entry = StreamMatchEntry {
            index: 0,
            valid: true,
            mask: 0,
            tbu_number: 0,
            master_id: 0b10_0000_0000,
        };
        table.configure(&entry).unwrap();

        let val = space.read32(smr_offset(0));
        assert_ne!(val & (1 << 31), 0); // valid
        assert_eq!((val >> 16) & 0x7FFF, 0); // mask
        assert_eq!((val >> 10) & 0x1F, 0); // tbu
        assert_eq!(val & 0x3FF, 0b10_0000_0000); // master id
        assert_eq!(val, 0x8000_0200);
    }

    #[test]
    fn reset_all_clears_stale_entries() {
        let space = MemSpace::new();
        let table = StreamMatchTable::new(&space);

        let entry = StreamMatchEntry::matching(47, StreamId::from_parts(1, 5), 0);
        table.configure(&entry).unwrap();
        assert_ne!(space.read32(smr_offset(47)), 0);

        table.reset_all();
        for i in 0..NUM_STREAM_ENTRIES {
            assert_eq!(space.read32(smr_offset(i)), 0);
        }
    }

    #[test]
    fn out_of_range_index_rejected_before_write() {
        let space = MemSpace::new();
        let table = StreamMatchTable::new(&space);
        let entry = StreamMatchEntry::disabled(48);
        assert_eq!(table.configure(&entry), Err(Error::IndexOutOfRange));

        let routes = StreamToContextTable::new(&space);
        assert_eq!(
            routes.configure(48, StreamRoute::Bypass),
            Err(Error::IndexOutOfRange)
        );
        assert_eq!(
            routes.configure(0, StreamRoute::Translate { bank: 16 }),
            Err(Error::IndexOutOfRange)
        );
        assert_eq!(space.read32(s2cr_offset(0)), 0);
    }

    #[test]
    fn s2cr_route_encodings() {
        let space = MemSpace::new();
        let routes = StreamToContextTable::new(&space);

        routes.configure(0, StreamRoute::Translate { bank: 3 }).unwrap();
        let val = space.read32(s2cr_offset(0));
        assert_eq!((val >> 16) & 0x3, s2cr::TYPE_TRANSLATE);
        assert_eq!(val & 0xFF, 3);

        routes.configure(1, StreamRoute::Bypass).unwrap();
        let val = space.read32(s2cr_offset(1));
        assert_eq!((val >> 16) & 0x3, s2cr::TYPE_BYPASS);
        assert_eq!(val & 0xFF, 0); // index field written as zero

        routes.configure(2, StreamRoute::Fault).unwrap();
        let val = space.read32(s2cr_offset(2));
        assert_eq!((val >> 16) & 0x3, s2cr::TYPE_FAULT);
    }

    #[test]
    fn many_entries_may_share_one_bank() {
        let space = MemSpace::new();
        let routes = StreamToContextTable::new(&space);

        routes.configure(0, StreamRoute::Translate { bank: 1 }).unwrap();
        routes.configure(1, StreamRoute::Translate { bank: 1 }).unwrap();

        assert_eq!(space.read32(s2cr_offset(0)) & 0xFF, 1);
        assert_eq!(space.read32(s2cr_offset(1)) & 0xFF, 1);
    }
}
