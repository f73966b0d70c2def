//! In-process loader for controllers linked into the host.
//!
//! Controllers are registered under a pseudo path before the registry is built.
//! Every open library is counted, which makes this the loader to use when a
//! test needs to see how many handles are currently held.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::{ControllerLibrary, DisconFn, Loader};

type SymbolTable = HashMap<String, DisconFn>;

#[derive(Debug, Default)]
struct Counters {
    open: AtomicUsize,
    opens: AtomicUsize,
}

/// Resolves controllers from a table of registered functions.
#[derive(Debug, Default)]
pub struct StaticLoader {
    libraries: HashMap<PathBuf, Arc<SymbolTable>>,
    counters: Arc<Counters>,
}

impl StaticLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with_symbol(mut self, path: impl Into<PathBuf>, symbol: &str, entry: DisconFn) -> Self {
        self.register(path, symbol, entry);
        self
    }

    /// Export `entry` as `symbol` from the pseudo library `path`.
    pub fn register(&mut self, path: impl Into<PathBuf>, symbol: &str, entry: DisconFn) {
        let table = self.libraries.entry(path.into()).or_default();
        Arc::make_mut(table).insert(symbol.to_string(), entry);
    }

    /// Libraries opened and not yet closed.
    #[must_use]
    pub fn open_handles(&self) -> usize {
        self.counters.open.load(Ordering::SeqCst)
    }

    /// Successful opens over the loader's lifetime.
    #[must_use]
    pub fn total_opens(&self) -> usize {
        self.counters.opens.load(Ordering::SeqCst)
    }
}

/// A handle onto one registered pseudo library.
#[derive(Debug)]
pub struct StaticLibrary {
    symbols: Arc<SymbolTable>,
    counters: Arc<Counters>,
}

impl Loader for StaticLoader {
    type Library = StaticLibrary;

    fn open(&self, path: &Path) -> Result<StaticLibrary, String> {
        let symbols = self
            .libraries
            .get(path)
            .ok_or_else(|| format!("{}: no such library registered", path.display()))?;
        self.counters.open.fetch_add(1, Ordering::SeqCst);
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        Ok(StaticLibrary {
            symbols: Arc::clone(symbols),
            counters: Arc::clone(&self.counters),
        })
    }

    fn is_file_backed(&self) -> bool {
        false
    }
}

impl ControllerLibrary for StaticLibrary {
    fn resolve(&self, symbol: &str) -> Result<DisconFn, String> {
        self.symbols
            .get(symbol)
            .copied()
            .ok_or_else(|| format!("undefined symbol: {symbol}"))
    }
}

impl Drop for StaticLibrary {
    fn drop(&mut self) {
        self.counters.open.fetch_sub(1, Ordering::SeqCst);
    }
}
