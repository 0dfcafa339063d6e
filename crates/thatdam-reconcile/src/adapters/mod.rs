//! In-process port adapters for single-node development and tests.

pub mod bus_inproc;
pub mod index_mem;
pub mod storage_fs;

pub use bus_inproc::InProcBus;
pub use index_mem::InMemoryIndex;
pub use storage_fs::FsStorage;

use crate::error::PortError;

/// Reject names that cannot be used as a single path component.
pub(crate) fn validate_name(name: &str) -> Result<(), PortError> {
    let reason = if name.is_empty() {
        "empty"
    } else if name == "." || name == ".." {
        "reserved"
    } else if name.contains(['/', '\\', '\0']) {
        "contains a path separator"
    } else {
        return Ok(());
    };
    Err(PortError::InvalidName {
        name: name.to_string(),
        reason,
    })
}
