/// File-backed sector storage.
mod file;
/// In-memory sector storage.
mod memory;
/// The sector storage abstraction.
mod sector_storage;

pub use file::*;
pub use memory::*;
pub use sector_storage::*;
