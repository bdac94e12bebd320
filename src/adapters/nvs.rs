//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`StoragePort`] on top of the ESP-IDF NVS API. The simulation
//! backend keeps blobs in a process-local map guarded by a mutex so the
//! adapter can be shared between tasks exactly like the real one.
//!
//! - Atomic writes: ESP-IDF NVS commits are atomic per `nvs_commit()`.
//! - Namespace and key names are limited to 15 bytes by NVS.

use crate::app::ports::{StorageError, StoragePort};
use log::info;

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use log::warn;

/// Longest namespace or key name NVS accepts.
const MAX_NAME_LEN: usize = 15;

#[cfg(target_os = "espidf")]
const MAX_BLOB_SIZE: usize = 4000;

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    store: parking_lot::Mutex<HashMap<String, Vec<u8>>>,
}

impl NvsAdapter {
    /// Create a new NvsAdapter and initialise NVS flash.
    ///
    /// On first boot or after a version mismatch the NVS partition is erased
    /// and re-initialised automatically.
    pub fn new() -> Result<Self, StorageError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: nvs_flash_init / nvs_flash_erase are called from the
            // single main-task context before any concurrent NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES as esp_err_t
                || ret == ESP_ERR_NVS_NEW_VERSION_FOUND as esp_err_t
            {
                warn!("NVS: erasing and re-initialising flash partition");
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
            store: parking_lot::Mutex::new(HashMap::new()),
        })
    }

    /// Copy a name into a NUL-terminated buffer, rejecting empty or
    /// over-long names instead of silently truncating them.
    fn c_name(name: &str) -> Result<[u8; MAX_NAME_LEN + 1], StorageError> {
        let bytes = name.as_bytes();
        if bytes.is_empty() || bytes.len() > MAX_NAME_LEN || bytes.contains(&0) {
            return Err(StorageError::InvalidName);
        }
        let mut buf = [0u8; MAX_NAME_LEN + 1];
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(buf)
    }

    #[cfg(not(target_os = "espidf"))]
    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{}::{}", namespace, key)
    }

    /// Open an NVS namespace, execute a closure with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(namespace: &[u8], write: bool, f: F) -> Result<T, esp_err_t>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, esp_err_t>,
    {
        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let ret = unsafe { nvs_open(namespace.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }

        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }

    #[cfg(target_os = "espidf")]
    fn map_esp_err(ret: esp_err_t) -> StorageError {
        if ret == ESP_ERR_NVS_NOT_FOUND as esp_err_t {
            StorageError::NotFound
        } else if ret == ESP_ERR_NVS_NOT_ENOUGH_SPACE as esp_err_t {
            StorageError::Full
        } else {
            StorageError::IoError
        }
    }
}

impl StoragePort for NvsAdapter {
    fn read_blob(&self, namespace: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let ns = Self::c_name(namespace)?;
        let k = Self::c_name(key)?;

        #[cfg(not(target_os = "espidf"))]
        {
            let _ = (ns, k);
            self.store
                .lock()
                .get(&Self::composite_key(namespace, key))
                .cloned()
                .ok_or(StorageError::NotFound)
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(&ns, false, |handle| {
                let mut size: usize = 0;

                // First call: get size
                let ret = unsafe {
                    nvs_get_blob(handle, k.as_ptr() as *const _, core::ptr::null_mut(), &mut size)
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                if size == 0 || size > MAX_BLOB_SIZE {
                    return Err(ESP_FAIL as esp_err_t);
                }

                let mut buf = vec![0u8; size];
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        k.as_ptr() as *const _,
                        buf.as_mut_ptr() as *mut _,
                        &mut size,
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                buf.truncate(size);
                Ok(buf)
            });
            result.map_err(|e| {
                if e != ESP_ERR_NVS_NOT_FOUND as esp_err_t {
                    warn!("NvsAdapter: read {}/{} failed ({})", namespace, key, e);
                }
                Self::map_esp_err(e)
            })
        }
    }

    fn write_blob(&self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let ns = Self::c_name(namespace)?;
        let k = Self::c_name(key)?;

        #[cfg(not(target_os = "espidf"))]
        {
            let _ = (ns, k);
            self.store
                .lock()
                .insert(Self::composite_key(namespace, key), data.to_vec());
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(&ns, true, |handle| {
                let ret = unsafe {
                    nvs_set_blob(
                        handle,
                        k.as_ptr() as *const _,
                        data.as_ptr() as *const _,
                        data.len(),
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            result.map_err(|e| {
                warn!("NvsAdapter: write {}/{} failed ({})", namespace, key, e);
                Self::map_esp_err(e)
            })
        }
    }

    fn erase_namespace(&self, namespace: &str) -> Result<(), StorageError> {
        let ns = Self::c_name(namespace)?;

        #[cfg(not(target_os = "espidf"))]
        {
            let _ = ns;
            let prefix = format!("{}::", namespace);
            self.store.lock().retain(|k, _| !k.starts_with(&prefix));
            info!("NvsAdapter: namespace '{}' erased (simulation)", namespace);
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(&ns, true, |handle| {
                let ret = unsafe { nvs_erase_all(handle) };
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
                    info!("NvsAdapter: namespace '{}' erased", namespace);
                    Ok(())
                }
                // A namespace that was never opened for writing has nothing to erase.
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND as esp_err_t => Ok(()),
                Err(e) => Err(Self::map_esp_err(e)),
            }
        }
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        let (Ok(ns), Ok(k)) = (Self::c_name(namespace), Self::c_name(key)) else {
            return false;
        };

        #[cfg(not(target_os = "espidf"))]
        {
            let _ = (ns, k);
            self.store
                .lock()
                .contains_key(&Self::composite_key(namespace, key))
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(&ns, false, |handle| {
                let ret =
                    unsafe { nvs_find_key(handle, k.as_ptr() as *const _, core::ptr::null_mut()) };
                Ok(ret == ESP_OK)
            });
            result.unwrap_or(false)
        }
    }
}
