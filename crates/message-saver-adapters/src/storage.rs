use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use message_saver_core::domain::StorageArea;
use message_saver_core::{PortError, StoragePort};

#[derive(Debug, Default)]
struct Areas {
    local: BTreeMap<String, String>,
    session: BTreeMap<String, String>,
}

impl Areas {
    fn area(&mut self, area: StorageArea) -> &mut BTreeMap<String, String> {
        match area {
            StorageArea::Local => &mut self.local,
            StorageArea::Session => &mut self.session,
        }
    }
}

/// Process-local storage; clones share the same maps.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    areas: Arc<Mutex<Areas>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Areas>, PortError> {
        self.areas
            .lock()
            .map_err(|e| PortError::Transport(format!("storage lock poisoned: {e}")))
    }

    pub fn set(&self, area: StorageArea, key: &str, value: &str) -> Result<(), PortError> {
        self.lock()?
            .area(area)
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

impl StoragePort for MemoryStorage {
    fn keys(&self, area: StorageArea) -> Result<Vec<String>, PortError> {
        Ok(self.lock()?.area(area).keys().cloned().collect())
    }

    fn get(&self, area: StorageArea, key: &str) -> Result<Option<String>, PortError> {
        Ok(self.lock()?.area(area).get(key).cloned())
    }

    fn remove(&self, area: StorageArea, key: &str) -> Result<(), PortError> {
        self.lock()?.area(area).remove(key);
        Ok(())
    }

    fn clear(&self, area: StorageArea) -> Result<(), PortError> {
        self.lock()?.area(area).clear();
        Ok(())
    }
}

/// `window.localStorage` / `window.sessionStorage`.
#[cfg(target_arch = "wasm32")]
#[derive(Debug, Clone, Default)]
pub struct BrowserStorage;

#[cfg(target_arch = "wasm32")]
impl BrowserStorage {
    fn storage(area: StorageArea) -> Result<web_sys::Storage, PortError> {
        let window = crate::browser::window()?;
        let storage = match area {
            StorageArea::Local => window.local_storage(),
            StorageArea::Session => window.session_storage(),
        };
        storage
            .map_err(|e| PortError::Transport(format!("storage unavailable: {e:?}")))?
            .ok_or_else(|| PortError::NotFound(format!("{area:?} storage disabled")))
    }
}

#[cfg(target_arch = "wasm32")]
impl StoragePort for BrowserStorage {
    fn keys(&self, area: StorageArea) -> Result<Vec<String>, PortError> {
        let storage = Self::storage(area)?;
        let len = storage
            .length()
            .map_err(|e| PortError::Transport(format!("storage length failed: {e:?}")))?;
        let mut keys = Vec::with_capacity(len as usize);
        for index in 0..len {
            if let Ok(Some(key)) = storage.key(index) {
                keys.push(key);
            }
        }
        Ok(keys)
    }

    fn get(&self, area: StorageArea, key: &str) -> Result<Option<String>, PortError> {
        Self::storage(area)?
            .get_item(key)
            .map_err(|e| PortError::Transport(format!("storage read {key} failed: {e:?}")))
    }

    fn remove(&self, area: StorageArea, key: &str) -> Result<(), PortError> {
        Self::storage(area)?
            .remove_item(key)
            .map_err(|e| PortError::Transport(format!("storage remove {key} failed: {e:?}")))
    }

    fn clear(&self, area: StorageArea) -> Result<(), PortError> {
        Self::storage(area)?
            .clear()
            .map_err(|e| PortError::Transport(format!("storage clear failed: {e:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn areas_are_independent_and_clones_share_state() {
        let storage = MemoryStorage::new();
        let view = storage.clone();
        storage
            .set(StorageArea::Local, "hashconnectData", "{}")
            .expect("set");
        storage
            .set(StorageArea::Session, "wc@2:session", "x")
            .expect("set");

        assert_eq!(view.keys(StorageArea::Local).expect("keys"), vec!["hashconnectData"]);
        view.clear(StorageArea::Local).expect("clear");
        assert!(storage.keys(StorageArea::Local).expect("keys").is_empty());
        assert_eq!(
            storage.get(StorageArea::Session, "wc@2:session").expect("get"),
            Some("x".to_owned())
        );
    }
}
