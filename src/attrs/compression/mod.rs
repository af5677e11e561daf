//! Compression codecs used by the `data` stream.

pub mod lznt1;
pub mod xpress;
