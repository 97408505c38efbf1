//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`PersistencePort`] for the bridge.  Only the "ever paired"
//! flag is stored, as a `u8` under the `yas-bridge` namespace.
//!
//! - Atomic writes: ESP-IDF NVS commits are atomic per `nvs_commit()`.
//! - The simulation backend is an in-memory map (dev/test only).

use log::info;

use crate::app::ports::{PersistencePort, StorageError};

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const NAMESPACE: &str = "yas-bridge";

/// NVS keys and namespaces are limited to 15 bytes plus the terminator.
#[cfg(target_os = "espidf")]
const NVS_NAME_MAX: usize = 15;

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    store: std::cell::RefCell<HashMap<String, u8>>,
}

impl NvsAdapter {
    /// Create a new NvsAdapter and initialise NVS flash.
    ///
    /// On first boot or after a version mismatch the NVS partition is
    /// erased and re-initialised automatically.
    pub fn new() -> Result<Self, StorageError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: nvs_flash_init / nvs_flash_erase are called from the
            // single main-task context before any concurrent NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES as esp_err_t
                || ret == ESP_ERR_NVS_NEW_VERSION_FOUND as esp_err_t
            {
                log::warn!("NVS: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK {
                    return Err(StorageError::IoError);
                }
                if unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(StorageError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(StorageError::IoError);
            }
            info!("NvsAdapter: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsAdapter: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: std::cell::RefCell::new(HashMap::new()),
        })
    }

    /// Null-terminated copy of an NVS name, truncated to the NVS limit.
    #[cfg(target_os = "espidf")]
    fn c_name(name: &str) -> [u8; NVS_NAME_MAX + 1] {
        let mut buf = [0u8; NVS_NAME_MAX + 1];
        let bytes = name.as_bytes();
        let len = bytes.len().min(NVS_NAME_MAX);
        buf[..len].copy_from_slice(&bytes[..len]);
        buf
    }

    /// Open the bridge namespace, execute a closure with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let ns = Self::c_name(NAMESPACE);
        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        // SAFETY: `ns` is null-terminated and outlives the call.
        let ret = unsafe { nvs_open(ns.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }

        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }
}

impl PersistencePort for NvsAdapter {
    fn get_bool(&self, key: &str, default: bool) -> bool {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = format!("{NAMESPACE}::{key}");
            self.store
                .borrow()
                .get(&composite)
                .map_or(default, |v| *v != 0)
        }

        #[cfg(target_os = "espidf")]
        {
            let key_buf = Self::c_name(key);
            let result = Self::with_nvs_handle(false, |handle| {
                let mut value: u8 = 0;
                let ret = unsafe { nvs_get_u8(handle, key_buf.as_ptr() as *const _, &mut value) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(value)
            });
            match result {
                Ok(v) => v != 0,
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND as esp_err_t => default,
                Err(e) => {
                    log::warn!("NvsAdapter: read '{key}' failed ({e}), using default");
                    default
                }
            }
        }
    }

    fn put_bool(&mut self, key: &str, value: bool) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = format!("{NAMESPACE}::{key}");
            self.store.borrow_mut().insert(composite, u8::from(value));
            info!("NvsAdapter: {key}={value} (simulation)");
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let key_buf = Self::c_name(key);
            let result = Self::with_nvs_handle(true, |handle| {
                let ret = unsafe { nvs_set_u8(handle, key_buf.as_ptr() as *const _, u8::from(value)) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            match result {
                Ok(()) => {
                    info!("NvsAdapter: {key}={value}");
                    Ok(())
                }
                Err(e) if e == ESP_ERR_NVS_NOT_ENOUGH_SPACE as esp_err_t => Err(StorageError::Full),
                Err(e) => {
                    log::warn!("NvsAdapter: write '{key}' failed ({e})");
                    Err(StorageError::IoError)
                }
            }
        }
    }
}
