//! Private per-connection copies of controller libraries.
//!
//! Platform loaders hand back the already-open handle when the same file is
//! opened twice, so two connections loading one controller would share its
//! static state. Loading from a private copy gives each connection its own
//! instance. The copy is removed when it is dropped.

use std::fs::File;
use std::io;
use std::path::Path;

use tempfile::{Builder, TempPath};
use tracing::debug;

use crate::registry::ConnectionId;

/// A temporary copy of a library, deleted on drop.
#[derive(Debug)]
pub struct IsolatedCopy {
    path: TempPath,
}

impl IsolatedCopy {
    /// Copy `source` to `<name>-<conn>-XXXXXX[.ext]` in `dir`, or in the system
    /// temp directory when `dir` is `None`.
    ///
    /// The extension is kept because some loaders (Win32 `LoadLibraryW`)
    /// append `.dll` to extensionless names.
    pub fn create(source: &Path, conn: ConnectionId, dir: Option<&Path>) -> io::Result<Self> {
        let name = source
            .file_name()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?
            .to_string_lossy()
            .into_owned();
        let prefix = format!("{name}-{conn:03}-");
        let suffix = source
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();

        let mut source_file = File::open(source)?;

        let mut builder = Builder::new();
        builder.prefix(&prefix).suffix(&suffix);
        let mut target = match dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        io::copy(&mut source_file, target.as_file_mut())?;
        target.as_file().sync_all()?;

        let path = target.into_temp_path();
        debug!(
            conn,
            source = %source.display(),
            copy = %path.display(),
            "created private library copy"
        );
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
