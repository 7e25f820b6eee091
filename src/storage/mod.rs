//! Storage helpers shared by the file-backed stores

pub mod persistence;

pub use persistence::{append_json_line, load_json, save_json, StorageError};
