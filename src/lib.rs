#![cfg_attr(not(test), no_std)]

//! ARM SMMU-v2 (MMU-500 class) configuration driver.
//!
//! Maps inbound DMA-capable bus masters, identified by a stream id, either
//! to a bypass path or to a translation context bank, and builds the
//! single-level 1 GiB block tables those banks walk. The driver turns a
//! declarative description of the system (which masters exist, how their
//! traffic is routed, what memory each context exposes) into the ordered
//! sequence of memory-mapped register writes the hardware requires.
//!
//! Register access goes through the [`space::RegisterSpace`] trait so the
//! same code drives real MMIO on target and an in-memory image in tests.

// Bit-field accessors
pub mod bits;

// Register space abstraction and layout
pub mod layout;
pub mod space;

// Stream matching and stream-to-context routing
pub mod stream;

// Translation tables
pub mod table;

// Context bank programming
pub mod context;

// Fault reporting and TLB maintenance
pub mod fault;

// Global control registers
pub mod global;

// Declarative configuration
pub mod config;

// Re-export commonly used types
pub use config::{BankSetup, MasterBinding, Smmu, SmmuSetup};
pub use context::{ContextBanks, MairConfig, TranslationControl, TranslationRegime};
pub use fault::{FaultReporter, TlbInvalidator};
pub use space::{MemSpace, MmioSpace, RegisterSpace};
pub use stream::{StreamId, StreamMatchEntry, StreamRoute};
pub use table::{BlockDescriptor, TranslationTable};

/// Result type for configuration operations
pub type Result<T> = core::result::Result<T, Error>;

/// Configuration errors
///
/// All variants are detectable before any hardware state changes: a failing
/// call performs no register write. Runtime translation faults are not
/// errors in this sense; they are reported through [`fault::FaultReporter`]
/// snapshots instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Stream, context bank, or table entry index outside its valid range
    IndexOutOfRange,
    /// Translation table base not aligned to the active granule
    MisalignedTableBase,
    /// Context bank programming step attempted in a state that forbids it
    InvalidOrdering,
}

/// Number of stream match / stream-to-context entries
pub const NUM_STREAM_ENTRIES: usize = 48;

/// Number of context banks
pub const NUM_CONTEXT_BANKS: usize = 16;

/// Entries in a top-level translation table (VA bits [31:30] select one)
pub const NUM_TABLE_ENTRIES: usize = 4;

/// Translation table format selected per context bank via CBA2R
///
/// Only the AArch32 LPAE path is fully programmed; see [`context`] for the
/// limits of `Va64` support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressWidth {
    /// AArch32 long-descriptor translation (32-bit VA)
    Va32,
    /// AArch64 translation (64-bit VA)
    Va64,
}

/// Driver version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
