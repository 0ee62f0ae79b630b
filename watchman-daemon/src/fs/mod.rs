//! File system primitives: hashing, scanning and snapshot records.

pub mod hasher;
pub mod metadata;
pub mod scanner;

pub use hasher::hash_file;
pub use metadata::{FileRecord, Snapshot};
pub use scanner::{ScanOptions, TreeScanner};
