//! C interface for hosts that are not written in Rust.
//!
//! The host owns a registry pointer from [`discon_registry_new`] and passes it
//! to every call; there is no process-wide default registry. Status codes:
//! `0` ok, `1` library could not be opened, `2` symbol not found, `3` invalid
//! connection id or argument, `4` nothing loaded on the connection.

use std::ffi::{c_char, c_int, CStr};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

use tracing::error;

use crate::config::RegistryConfig;
use crate::error::{STATUS_INVALID_ARGUMENT, STATUS_OK};
use crate::loader::NativeLoader;
use crate::logging;
use crate::registry::Registry;

/// Opaque registry handle handed to C hosts.
pub type DisconRegistry = Registry<NativeLoader>;

fn guard<T>(fallback: T, f: impl FnOnce() -> T) -> T {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|_| {
        error!("panic stopped at the C boundary");
        fallback
    })
}

unsafe fn c_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok()
}

/// Create a registry with `max_connections` slots and default settings.
/// Returns null if `max_connections` is not positive.
#[no_mangle]
pub extern "C" fn discon_registry_new(max_connections: c_int) -> *mut DisconRegistry {
    guard(ptr::null_mut(), || {
        let Ok(max_connections) = usize::try_from(max_connections) else {
            return ptr::null_mut();
        };
        if max_connections == 0 {
            return ptr::null_mut();
        }
        let config = RegistryConfig {
            max_connections,
            ..RegistryConfig::default()
        };
        Box::into_raw(Box::new(Registry::native(&config)))
    })
}

/// Create a registry from a YAML config file and install the stderr logger at
/// its `debug_level` unless one is already set. Returns null if the file cannot
/// be read or is invalid; the reason is logged.
///
/// # Safety
/// `config_path` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn discon_registry_from_config(
    config_path: *const c_char,
) -> *mut DisconRegistry {
    guard(ptr::null_mut(), || {
        let Some(config_path) = c_str(config_path) else {
            return ptr::null_mut();
        };
        match RegistryConfig::load_from_file(config_path) {
            Ok(config) => {
                // keep whatever subscriber the host already installed
                let _ = logging::init(config.debug_level);
                Box::into_raw(Box::new(Registry::native(&config)))
            }
            Err(e) => {
                error!("failed to create registry from {}: {:#}", config_path, e);
                ptr::null_mut()
            }
        }
    })
}

/// Unload every connection and free the registry. Null is ignored.
///
/// # Safety
/// `registry` must be null or a pointer from this module that has not been
/// freed, with no calls on it still running.
#[no_mangle]
pub unsafe extern "C" fn discon_registry_free(registry: *mut DisconRegistry) {
    if registry.is_null() {
        return;
    }
    guard((), || drop(Box::from_raw(registry)));
}

/// Load `symbol` from the library at `path` into connection `conn`.
///
/// # Safety
/// `registry` must be null or live; `path` and `symbol` must be null or valid
/// NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn discon_registry_load(
    registry: *const DisconRegistry,
    conn: c_int,
    path: *const c_char,
    symbol: *const c_char,
) -> c_int {
    guard(STATUS_INVALID_ARGUMENT, || {
        let Some(registry) = registry.as_ref() else {
            return STATUS_INVALID_ARGUMENT;
        };
        let (Some(path), Some(symbol)) = (c_str(path), c_str(symbol)) else {
            return STATUS_INVALID_ARGUMENT;
        };
        match registry.load(conn, path, symbol) {
            Ok(()) => STATUS_OK,
            Err(e) => e.status_code(),
        }
    })
}

/// Call the controller loaded on `conn`. The buffers are passed through as is.
///
/// # Safety
/// `registry` must be null or live. The buffers must be valid for everything
/// the loaded controller does with them.
#[no_mangle]
pub unsafe extern "C" fn discon_registry_invoke(
    registry: *const DisconRegistry,
    conn: c_int,
    swap: *mut f32,
    fail: *mut c_int,
    in_file: *mut c_char,
    out_name: *mut c_char,
    msg: *mut c_char,
) -> c_int {
    guard(STATUS_INVALID_ARGUMENT, || {
        let Some(registry) = registry.as_ref() else {
            return STATUS_INVALID_ARGUMENT;
        };
        if swap.is_null()
            || fail.is_null()
            || in_file.is_null()
            || out_name.is_null()
            || msg.is_null()
        {
            return STATUS_INVALID_ARGUMENT;
        }
        match registry.invoke_raw(conn, swap, fail, in_file, out_name, msg) {
            Ok(()) => STATUS_OK,
            Err(e) => e.status_code(),
        }
    })
}

/// Unload connection `conn`. Always succeeds; bad ids and empty slots are
/// ignored.
///
/// # Safety
/// `registry` must be null or live.
#[no_mangle]
pub unsafe extern "C" fn discon_registry_unload(registry: *const DisconRegistry, conn: c_int) {
    guard((), || {
        if let Some(registry) = registry.as_ref() {
            if let Err(e) = registry.unload(conn) {
                error!("unload ignored: {}", e);
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{STATUS_LIBRARY_NOT_FOUND, STATUS_NOT_LOADED};
    use crate::logging::DebugLevel;
    use std::ffi::CString;

    #[test]
    fn test_new_rejects_non_positive_sizes() {
        assert!(discon_registry_new(0).is_null());
        assert!(discon_registry_new(-4).is_null());

        let registry = discon_registry_new(4);
        assert!(!registry.is_null());
        unsafe { discon_registry_free(registry) };
        unsafe { discon_registry_free(ptr::null_mut()) };
    }

    #[test]
    fn test_load_status_codes() {
        let registry = discon_registry_new(2);
        let missing = CString::new("/nonexistent/libcontroller.so").unwrap();
        let symbol = CString::new("DISCON").unwrap();

        unsafe {
            assert_eq!(
                discon_registry_load(registry, 0, missing.as_ptr(), symbol.as_ptr()),
                STATUS_LIBRARY_NOT_FOUND
            );
            assert_eq!(
                discon_registry_load(registry, 2, missing.as_ptr(), symbol.as_ptr()),
                STATUS_INVALID_ARGUMENT
            );
            assert_eq!(
                discon_registry_load(registry, 0, ptr::null(), symbol.as_ptr()),
                STATUS_INVALID_ARGUMENT
            );
            assert_eq!(
                discon_registry_load(ptr::null(), 0, missing.as_ptr(), symbol.as_ptr()),
                STATUS_INVALID_ARGUMENT
            );
            discon_registry_free(registry);
        }
    }

    #[test]
    fn test_invoke_and_unload_on_empty_connection() {
        let registry = discon_registry_new(2);
        let mut swap = [0.0f32; 4];
        let mut fail: c_int = 1;
        let mut in_file = [0 as c_char; 4];
        let mut out_name = [0 as c_char; 4];
        let mut msg = [0 as c_char; 4];

        unsafe {
            let status = discon_registry_invoke(
                registry,
                1,
                swap.as_mut_ptr(),
                &mut fail,
                in_file.as_mut_ptr(),
                out_name.as_mut_ptr(),
                msg.as_mut_ptr(),
            );
            assert_eq!(status, STATUS_NOT_LOADED);

            let status = discon_registry_invoke(
                registry,
                1,
                ptr::null_mut(),
                &mut fail,
                in_file.as_mut_ptr(),
                out_name.as_mut_ptr(),
                msg.as_mut_ptr(),
            );
            assert_eq!(status, STATUS_INVALID_ARGUMENT);

            discon_registry_unload(registry, 1);
            discon_registry_unload(registry, 99);
            discon_registry_unload(ptr::null(), 0);
            discon_registry_free(registry);
        }
        assert_eq!(fail, 1);
    }

    #[test]
    fn test_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "max_connections: 3\n").unwrap();
        let path = CString::new(path.to_string_lossy().into_owned()).unwrap();

        unsafe {
            let registry = discon_registry_from_config(path.as_ptr());
            assert!(!registry.is_null());
            assert_eq!((*registry).capacity(), 3);
            discon_registry_free(registry);

            // the subscriber is already installed the second time round
            let registry = discon_registry_from_config(path.as_ptr());
            assert!(!registry.is_null());
            assert!(logging::init(DebugLevel::Verbose).is_err());
            discon_registry_free(registry);

            let missing = CString::new("/nonexistent/config.yaml").unwrap();
            assert!(discon_registry_from_config(missing.as_ptr()).is_null());
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_load_system_library_by_name() {
        let registry = discon_registry_new(2);
        let name = CString::new("libm.so.6").unwrap();
        let symbol = CString::new("cos").unwrap();

        unsafe {
            assert_eq!(
                discon_registry_load(registry, 1, name.as_ptr(), symbol.as_ptr()),
                STATUS_OK
            );
            discon_registry_unload(registry, 1);
            discon_registry_free(registry);
        }
    }
}
