//! Library initialization

use once_cell::sync::OnceCell;
use tracing::debug;

use crate::error::{FtlError, Result};

static INITIALIZED: OnceCell<()> = OnceCell::new();

/// Initialize the library
///
/// Idempotent and thread-safe; the first call wins. Every stream operation
/// requires this to have run first.
pub fn init() -> Result<()> {
    INITIALIZED.get_or_init(|| {
        debug!(version = env!("CARGO_PKG_VERSION"), "ftl library initialized");
    });
    Ok(())
}

/// Guard for entry points that need the library ready
pub(crate) fn ensure_initialized() -> Result<()> {
    if INITIALIZED.get().is_none() {
        return Err(FtlError::ConfigError("ftl_rs::init() must be called first"));
    }
    Ok(())
}
