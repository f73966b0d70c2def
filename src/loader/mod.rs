//! Platform loader abstraction.
//!
//! A [`Loader`] opens controller libraries; the library value it returns owns the
//! open handle and closes it when dropped. Entry points are resolved as a typed
//! [`DisconFn`] so nothing downstream ever casts an untyped address.

use std::ffi::{c_char, c_int};
use std::path::Path;
use std::sync::Arc;

pub mod native;
pub mod static_loader;

pub use native::{NativeLibrary, NativeLoader};
pub use static_loader::{StaticLibrary, StaticLoader};

/// The fixed five-argument controller calling convention:
/// `(avrSWAP, aviFAIL, accINFILE, avcOUTNAME, avcMSG)`.
pub type DisconFn =
    unsafe extern "C" fn(*mut f32, *mut c_int, *mut c_char, *mut c_char, *mut c_char);

/// An opened controller library.
pub trait ControllerLibrary: Send + Sync {
    /// Resolve `symbol` as a [`DisconFn`].
    ///
    /// The returned pointer is only valid while `self` is alive.
    fn resolve(&self, symbol: &str) -> Result<DisconFn, String>;

    /// Close the library, reporting what the platform loader says.
    fn close(self) -> Result<(), String>
    where
        Self: Sized,
    {
        drop(self);
        Ok(())
    }
}

/// Something that can open controller libraries by path.
pub trait Loader: Send + Sync {
    type Library: ControllerLibrary;

    /// Open the library at `path`. Errors carry the platform diagnostic.
    fn open(&self, path: &Path) -> Result<Self::Library, String>;

    /// Whether `open` reads `path` from the filesystem. Private per-connection
    /// copies are only made for file-backed loaders.
    fn is_file_backed(&self) -> bool {
        true
    }
}

impl<L: Loader> Loader for Arc<L> {
    type Library = L::Library;

    fn open(&self, path: &Path) -> Result<Self::Library, String> {
        (**self).open(path)
    }

    fn is_file_backed(&self) -> bool {
        (**self).is_file_backed()
    }
}
