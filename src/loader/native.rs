//! Platform dynamic loader (`dlopen` / `LoadLibraryW`) via `libloading`.

use std::ffi::c_void;
use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};
use tracing::trace;

use super::{ControllerLibrary, DisconFn, Loader};

/// Loads controllers from shared libraries on disk.
///
/// glibc `dlopen` and Win32 `LoadLibraryW` are thread safe, so no locking
/// happens here. See `RegistryConfig::serialize_loader` for platforms where
/// that does not hold.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeLoader;

impl NativeLoader {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// An open shared library. Dropping it closes the handle.
#[derive(Debug)]
pub struct NativeLibrary {
    library: Library,
    path: PathBuf,
}

impl NativeLibrary {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Loader for NativeLoader {
    type Library = NativeLibrary;

    fn open(&self, path: &Path) -> Result<NativeLibrary, String> {
        // Safety: opening a library runs its initializers. Controllers are
        // trusted in-process code; the host chose this path.
        let library = unsafe { Library::new(path) }.map_err(|e| e.to_string())?;
        trace!(path = %path.display(), "opened shared library");
        Ok(NativeLibrary {
            library,
            path: path.to_path_buf(),
        })
    }
}

impl ControllerLibrary for NativeLibrary {
    fn resolve(&self, symbol: &str) -> Result<DisconFn, String> {
        // Look the symbol up as a plain address first so a null export is
        // rejected instead of becoming a null function pointer.
        let address: Symbol<*mut c_void> =
            unsafe { self.library.get(symbol.as_bytes()) }.map_err(|e| e.to_string())?;
        let address = *address;
        if address.is_null() {
            return Err(format!("symbol {symbol} resolved to a null address"));
        }
        // Safety: non-null and exported by the library; the DISCON calling
        // convention is the contract every controller library signs up to.
        Ok(unsafe { std::mem::transmute::<*mut c_void, DisconFn>(address) })
    }

    fn close(self) -> Result<(), String> {
        let path = self.path;
        self.library.close().map_err(|e| e.to_string())?;
        trace!(path = %path.display(), "closed shared library");
        Ok(())
    }
}
