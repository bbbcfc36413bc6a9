//! Hot-swappable process-wide [`Settings`]. Readers take an owned
//! snapshot per request rather than holding a lock for the request's
//! lifetime, so an update never blocks in-flight work.

use std::sync::RwLock;

use crate::types::Settings;

#[derive(Debug, Default)]
pub struct SettingsStore {
    inner: RwLock<Settings>,
}

impl SettingsStore {
    pub fn new(initial: Settings) -> Self {
        Self { inner: RwLock::new(initial) }
    }

    /// Take an owned copy of the current settings. Cheap: `Settings` is
    /// a handful of scalars and a short string.
    pub fn snapshot(&self) -> Settings {
        self.inner.read().unwrap().clone()
    }

    pub fn update(&self, settings: Settings) {
        *self.inner.write().unwrap() = settings;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CacheMode;

    #[test]
    fn snapshot_reflects_latest_update() {
        let store = SettingsStore::new(Settings::default());
        assert!(store.snapshot().intervene);

        store.update(Settings {
            cache: CacheMode::Off,
            intervene: false,
            upstream: "https://example.test".to_string(),
        });

        let snap = store.snapshot();
        assert!(!snap.intervene);
        assert_eq!(snap.cache, CacheMode::Off);
    }
}
