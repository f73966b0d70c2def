//! discon-wrapper - load and call DISCON wind turbine controllers at run time
//!
//! A simulation host hands this crate a connection id, the path of a compiled
//! controller library and the name of its entry point. Each connection owns
//! its own library handle, so many controllers (or many instances of one
//! controller) can be loaded, called and unloaded independently.
//!
//! # Modules
//!
//! - [`registry`]: connection table with `load`, `invoke`, `unload` and `shutdown`
//! - [`loader`]: platform loader (`libloading`) and the in-process [`StaticLoader`]
//! - [`isolation`]: private per-connection copies of controller libraries
//! - [`payload`]: owned call buffers and their binary encoding
//! - [`config`]: YAML configuration
//! - [`logging`]: debug levels and subscriber setup
//! - [`ffi`]: C interface for non-Rust hosts
//!
//! ```no_run
//! use discon_wrapper::{Payload, Registry, RegistryConfig};
//!
//! # fn main() -> anyhow::Result<()> {
//! let registry = Registry::native(&RegistryConfig::default());
//! registry.load(3, "./libdiscon.so", "DISCON")?;
//!
//! let mut payload = Payload::with_capacity(164, 32);
//! registry.invoke_payload(3, &mut payload)?;
//! registry.unload(3)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod ffi;
pub mod isolation;
pub mod loader;
pub mod logging;
pub mod payload;
pub mod registry;

pub use config::RegistryConfig;
pub use error::{DispatchError, InvalidConnectionId, LoadError, PayloadError};
pub use loader::{ControllerLibrary, DisconFn, Loader, NativeLoader, StaticLoader};
pub use logging::DebugLevel;
pub use payload::Payload;
pub use registry::{ConnectionId, DisconArgs, LoadOptions, Registry, SlotInfo, SlotStatus};
