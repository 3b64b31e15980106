//! Wire codec - scalar payloads, column frames, table frames and script literals
//!
//! All multi-byte values are little-endian. A column frame is
//! `[code u8][form u8][rows u32]` followed by a decimal scale (decimal kinds
//! only) and the row payloads; a table frame is `[form u8][rows u32][cols u32]`,
//! the table name, the column names and then one column frame per column.

pub mod array_vector;
pub mod decoder;
pub mod encoder;
pub mod literal;

pub use array_vector::{ArrayState, ArrayVectorCodec};
pub use decoder::ValueDecoder;
pub use encoder::ValueEncoder;

/// Data form codes
pub const FORM_SCALAR: u8 = 0;
pub const FORM_VECTOR: u8 = 1;
pub const FORM_TABLE: u8 = 6;

/// Largest STRING, SYMBOL or BLOB payload accepted
pub const MAX_VALUE_BYTES: usize = 256 * 1024;

/// STRING and SYMBOL cells in column frames are cut to this many bytes
pub const STRING_COLUMN_MAX_BYTES: usize = 65_535;
