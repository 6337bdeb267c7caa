//! Snapshot storage backends.

pub mod file;
pub mod memory;
pub mod traits;

pub use file::FileSnapshotStorage;
pub use memory::InMemorySnapshotStorage;
pub use traits::SnapshotStorage;
