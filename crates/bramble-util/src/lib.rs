#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod hash;
pub mod path;

pub use hash::{blake3_bytes, entry_hash_seed, hash_hex, xor_hash, EntryHash, ENTRY_HASH_LEN};
pub use path::{is_relative_specifier, normalize_path, relative_id};
