//! Content checksums: the `Hash` value, its text codec, and digest helpers.

pub mod digest;
pub mod hash;

pub use digest::{digest_file, digest_reader, hash_bytes, HashMethod};
pub use hash::Hash;
