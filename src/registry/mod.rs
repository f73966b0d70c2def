//! Connection-indexed controller registry.
//!
//! The registry is a fixed table of slots, one per connection id. Each slot
//! owns at most one open controller library together with the entry point
//! resolved from it, behind its own lock:
//!
//! - `load` releases whatever the slot held before opening the new library,
//! - a library whose symbol cannot be resolved is closed before `load` returns,
//! - `unload` and `shutdown` close the library before the slot forgets it,
//! - dropping the registry unloads every slot.
//!
//! Operations on one connection never lock another connection's slot. The
//! only shared lock is the optional loader lock (`serialize_loader`), taken
//! around open and close but never around dispatch.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::config::RegistryConfig;
use crate::error::{InvalidConnectionId, LoadError};
use crate::isolation::IsolatedCopy;
use crate::loader::{ControllerLibrary, DisconFn, Loader, NativeLoader};

mod dispatch;

pub use dispatch::DisconArgs;

/// Host-assigned connection identifier (the C `int` of the host interface).
pub type ConnectionId = i32;

/// Observable state of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    Empty,
    Loaded,
    /// The last `load` opened a library but could not resolve its symbol.
    Failed,
}

/// Snapshot of a slot, for logging and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotInfo {
    pub status: SlotStatus,
    pub library_path: Option<PathBuf>,
    pub symbol: Option<String>,
    /// Private copy the library was actually opened from, if isolated.
    pub loaded_from: Option<PathBuf>,
    /// Loader diagnostic of the last failed load.
    pub failure: Option<String>,
}

/// Per-call overrides for [`Registry::load_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Open a private copy of the library instead of the file itself. Paths
    /// that do not name an existing file are opened directly.
    pub isolate: bool,
}

/// An open library and the entry point resolved from it.
///
/// `entry` is only reachable through this struct, which also owns the
/// library, so the pointer never outlives the handle it came from.
struct ControllerEntry<Lib> {
    entry: DisconFn,
    library: Lib,
    copy: Option<IsolatedCopy>,
    path: PathBuf,
    symbol: String,
}

enum Slot<Lib> {
    Empty,
    Loaded(ControllerEntry<Lib>),
    Failed {
        path: PathBuf,
        symbol: String,
        reason: String,
    },
}

impl<Lib> Slot<Lib> {
    fn status(&self) -> SlotStatus {
        match self {
            Self::Empty => SlotStatus::Empty,
            Self::Loaded(_) => SlotStatus::Loaded,
            Self::Failed { .. } => SlotStatus::Failed,
        }
    }

    fn info(&self) -> SlotInfo {
        match self {
            Self::Empty => SlotInfo {
                status: SlotStatus::Empty,
                library_path: None,
                symbol: None,
                loaded_from: None,
                failure: None,
            },
            Self::Loaded(entry) => SlotInfo {
                status: SlotStatus::Loaded,
                library_path: Some(entry.path.clone()),
                symbol: Some(entry.symbol.clone()),
                loaded_from: entry.copy.as_ref().map(|c| c.path().to_path_buf()),
                failure: None,
            },
            Self::Failed {
                path,
                symbol,
                reason,
            } => SlotInfo {
                status: SlotStatus::Failed,
                library_path: Some(path.clone()),
                symbol: Some(symbol.clone()),
                loaded_from: None,
                failure: Some(reason.clone()),
            },
        }
    }
}

/// Table of controller connections.
pub struct Registry<L: Loader = NativeLoader> {
    loader: L,
    slots: Box<[Mutex<Slot<L::Library>>]>,
    loader_lock: Option<Mutex<()>>,
    isolate: bool,
    copy_dir: Option<PathBuf>,
}

impl Registry<NativeLoader> {
    /// Registry over the platform loader with settings from `config`.
    #[must_use]
    pub fn native(config: &RegistryConfig) -> Self {
        Self::new(NativeLoader::new(), config)
    }
}

impl<L: Loader> Registry<L> {
    /// Create a registry with every slot `Empty`.
    ///
    /// A `max_connections` of zero yields a registry that rejects every id;
    /// `RegistryConfig::validate` catches that earlier.
    pub fn new(loader: L, config: &RegistryConfig) -> Self {
        let slots = (0..config.max_connections)
            .map(|_| Mutex::new(Slot::Empty))
            .collect();
        Self {
            loader,
            slots,
            loader_lock: config.serialize_loader.then(|| Mutex::new(())),
            isolate: config.isolate_instances,
            copy_dir: config.copy_dir.clone(),
        }
    }

    /// Registry with `capacity` slots and no library copies.
    pub fn with_capacity(loader: L, capacity: usize) -> Self {
        let config = RegistryConfig {
            max_connections: capacity,
            isolate_instances: false,
            ..RegistryConfig::default()
        };
        Self::new(loader, &config)
    }

    /// Number of connection slots (`N`).
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// Load `symbol` from the library at `path` into connection `conn`, using
    /// the configured isolation setting.
    ///
    /// The library's initializers run in this process, and later
    /// [`invoke`](Self::invoke) calls jump into it: only load controllers you
    /// trust to honour the DISCON calling convention.
    pub fn load(
        &self,
        conn: ConnectionId,
        path: impl AsRef<Path>,
        symbol: &str,
    ) -> Result<(), LoadError> {
        let options = LoadOptions {
            isolate: self.isolate,
        };
        self.load_with(conn, path, symbol, options)
    }

    /// [`load`](Self::load) with explicit options.
    pub fn load_with(
        &self,
        conn: ConnectionId,
        path: impl AsRef<Path>,
        symbol: &str,
        options: LoadOptions,
    ) -> Result<(), LoadError> {
        let path = path.as_ref();
        let index = self.index(conn)?;
        if path.as_os_str().is_empty() {
            return Err(LoadError::InvalidArgument("library path is empty"));
        }
        if symbol.is_empty() {
            return Err(LoadError::InvalidArgument("symbol name is empty"));
        }

        let mut slot = self.lock_slot(index);

        if let Slot::Loaded(previous) = std::mem::replace(&mut *slot, Slot::Empty) {
            debug!(
                conn,
                previous = %previous.path.display(),
                "releasing loaded controller before reload"
            );
            self.release(conn, previous);
        }

        let isolate = options.isolate && self.loader.is_file_backed();
        // A bare name is left to the platform loader's search path.
        let copy = if isolate && path.is_file() {
            match IsolatedCopy::create(path, conn, self.copy_dir.as_deref()) {
                Ok(copy) => Some(copy),
                Err(e) => {
                    warn!(conn, path = %path.display(), "failed to copy library: {}", e);
                    return Err(LoadError::LibraryNotFound {
                        path: path.to_path_buf(),
                        reason: e.to_string(),
                    });
                }
            }
        } else {
            if isolate {
                debug!(
                    conn,
                    path = %path.display(),
                    "not a file on disk, opening without a private copy"
                );
            }
            None
        };
        let open_path = copy.as_ref().map_or(path, IsolatedCopy::path);

        let opened = {
            let _loader = self.lock_loader();
            self.loader.open(open_path)
        };
        let library = match opened {
            Ok(library) => library,
            Err(reason) => {
                warn!(conn, path = %path.display(), "failed to load library: {}", reason);
                return Err(LoadError::LibraryNotFound {
                    path: path.to_path_buf(),
                    reason,
                });
            }
        };

        match library.resolve(symbol) {
            Ok(entry) => {
                info!(conn, path = %path.display(), symbol, "controller loaded");
                *slot = Slot::Loaded(ControllerEntry {
                    entry,
                    library,
                    copy,
                    path: path.to_path_buf(),
                    symbol: symbol.to_string(),
                });
                Ok(())
            }
            Err(reason) => {
                warn!(conn, path = %path.display(), symbol, "failed to get function: {}", reason);
                self.close_library(conn, library);
                drop(copy);
                *slot = Slot::Failed {
                    path: path.to_path_buf(),
                    symbol: symbol.to_string(),
                    reason: reason.clone(),
                };
                Err(LoadError::SymbolNotFound {
                    path: path.to_path_buf(),
                    symbol: symbol.to_string(),
                    reason,
                })
            }
        }
    }

    /// Close the library loaded on `conn`.
    ///
    /// Unloading an `Empty` or `Failed` slot does nothing. Only an
    /// out-of-range id is an error; releasing a valid slot never fails.
    pub fn unload(&self, conn: ConnectionId) -> Result<(), InvalidConnectionId> {
        let index = self.index(conn)?;
        let mut slot = self.lock_slot(index);
        if !matches!(*slot, Slot::Loaded(_)) {
            return Ok(());
        }
        if let Slot::Loaded(entry) = std::mem::replace(&mut *slot, Slot::Empty) {
            self.release(conn, entry);
        }
        Ok(())
    }

    /// Unload every loaded connection and reset failed ones to `Empty`.
    pub fn shutdown(&self) {
        let mut released = 0usize;
        for (index, slot) in self.slots.iter().enumerate() {
            let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
            if let Slot::Loaded(entry) = std::mem::replace(&mut *slot, Slot::Empty) {
                let conn = ConnectionId::try_from(index).unwrap_or(ConnectionId::MAX);
                self.release(conn, entry);
                released += 1;
            }
        }
        if released > 0 {
            info!(released, "registry shut down");
        }
    }

    /// State of connection `conn`.
    pub fn status(&self, conn: ConnectionId) -> Result<SlotStatus, InvalidConnectionId> {
        let index = self.index(conn)?;
        Ok(self.lock_slot(index).status())
    }

    /// Snapshot of connection `conn`, or `None` for an out-of-range id.
    #[must_use]
    pub fn describe(&self, conn: ConnectionId) -> Option<SlotInfo> {
        let index = self.index(conn).ok()?;
        Some(self.lock_slot(index).info())
    }

    /// Number of connections currently `Loaded`.
    #[must_use]
    pub fn loaded_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| {
                let slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
                matches!(*slot, Slot::Loaded(_))
            })
            .count()
    }

    fn index(&self, conn: ConnectionId) -> Result<usize, InvalidConnectionId> {
        usize::try_from(conn)
            .ok()
            .filter(|&index| index < self.slots.len())
            .ok_or(InvalidConnectionId {
                id: conn,
                capacity: self.slots.len(),
            })
    }

    // A panic inside a controller call poisons the slot lock; the slot itself
    // is still a complete value, so keep using it.
    fn lock_slot(&self, index: usize) -> MutexGuard<'_, Slot<L::Library>> {
        self.slots[index]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_loader(&self) -> Option<MutexGuard<'_, ()>> {
        self.loader_lock
            .as_ref()
            .map(|lock| lock.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn release(&self, conn: ConnectionId, entry: ControllerEntry<L::Library>) {
        let ControllerEntry {
            library,
            copy,
            path,
            ..
        } = entry;
        self.close_library(conn, library);
        // The copy goes only after the library using it is closed.
        drop(copy);
        info!(conn, path = %path.display(), "controller unloaded");
    }

    fn close_library(&self, conn: ConnectionId, library: L::Library) {
        let _loader = self.lock_loader();
        if let Err(e) = library.close() {
            warn!(conn, "library close reported an error: {}", e);
        }
    }
}

impl<L: Loader> Drop for Registry<L> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<L: Loader> std::fmt::Debug for Registry<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("capacity", &self.slots.len())
            .field("loaded", &self.loaded_count())
            .field("isolate", &self.isolate)
            .finish_non_exhaustive()
    }
}
