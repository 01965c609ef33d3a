mod buffer;
pub use buffer::*;

/// Alias used throughout the dns codec, which only ever writes/reads
/// whole bytes through [`BitsBuffer`] despite its bit-level API.
pub type BitsBuf = BitsBuffer;
