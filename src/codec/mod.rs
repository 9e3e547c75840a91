//! Binary codec primitives for RSD varstructs.
//!
//! Everything here is pure: functions take a byte slice plus explicit bounds and
//! return either a decoded value with the next position or a [`DecodeError`].
//! No decoder in this module indexes raw memory without a bounds check first.
//!
//! [`DecodeError`]: crate::DecodeError

pub mod checksum;
pub mod varint;
pub mod varstruct;
pub mod view;

pub use checksum::crc32;
pub use varint::{read_varint, read_varuint, write_varint, write_varuint};
pub use varstruct::{FieldMap, Varstruct, VarstructDecoder, VarstructWriter};
pub use view::ByteView;
