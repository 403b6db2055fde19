//! Risk overlays applied around order placement.

pub mod offset;
pub mod trailing;

pub use offset::{EntryOffset, OffsetBasis, OffsetConfig, OffsetMode};
pub use trailing::TrailingStop;
