pub mod disk_format;
pub mod file_header;
pub mod free_map;
pub mod open_file;
pub mod storage;
pub mod volume;
