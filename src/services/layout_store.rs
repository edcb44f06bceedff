use crate::error::Result;
use crate::events::WindowId;
use crate::services::host::{WindowHandle, WindowHost};
use crate::services::state_storage::StateStorage;
use crate::services::window_snapshot::{SnapshotOptions, WindowSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, error, info, warn};

/// Ключ конфигурации экрана: `"[width,height]"`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisplayFingerprint(String);

impl DisplayFingerprint {
    pub fn new(width: u32, height: u32) -> Self {
        Self(format!("[{},{}]", width, height))
    }

    #[cfg(test)]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DisplayFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub type Bucket = HashMap<WindowId, WindowSnapshot>;

/// Итог восстановления раскладки
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    pub restored: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Снимки окон, сгруппированные по конфигурации экрана
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayoutStore {
    buckets: HashMap<DisplayFingerprint, Bucket>,
}

impl LayoutStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Текущий ключ экрана; только чтение
    pub fn fingerprint_key(host: &dyn WindowHost) -> Result<DisplayFingerprint> {
        let (width, height) = host.display_size()?;
        Ok(DisplayFingerprint::new(width, height))
    }

    pub fn contains(&self, fingerprint: &DisplayFingerprint) -> bool {
        self.buckets.contains_key(fingerprint)
    }

    #[cfg(test)]
    pub fn bucket(&self, fingerprint: &DisplayFingerprint) -> Option<&Bucket> {
        self.buckets.get(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Пересобрать корзину текущего экрана из переданных окон
    pub fn save(&mut self, fingerprint: &DisplayFingerprint, windows: &[WindowHandle], options: SnapshotOptions) {
        debug!("Saving window positions...");
        let bucket = self.buckets.entry(fingerprint.clone()).or_default();
        bucket.clear();
        for window in windows {
            let snapshot = WindowSnapshot::capture(window.as_ref(), options);
            bucket.insert(snapshot.id, snapshot);
        }
        debug!("Map size: {}  display size: {}", bucket.len(), fingerprint);
    }

    /// Вернуть окна к снимкам текущего экрана
    pub fn restore(
        &self,
        fingerprint: &DisplayFingerprint,
        windows: &mut [WindowHandle],
        options: SnapshotOptions,
    ) -> RestoreSummary {
        debug!("Restoring window positions...");
        let mut summary = RestoreSummary::default();
        let bucket = self.buckets.get(fingerprint);

        for window in windows.iter_mut() {
            let id = window.id();
            let Some(snapshot) = bucket.and_then(|b| b.get(&id)) else {
                debug!("Did not find: {} {}", id, window.title());
                summary.skipped += 1;
                continue;
            };

            match snapshot.restore(window.as_mut(), options) {
                Ok(_) => summary.restored += 1,
                Err(e) => {
                    warn!("Не удалось восстановить окно {} ({}): {}", id, snapshot.title, e);
                    summary.failed += 1;
                }
            }
        }

        summary
    }

    pub fn serialize(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Разбор сохранённого состояния; при ошибке возвращается пустое хранилище
    pub fn deserialize(data: &str) -> Self {
        match serde_json::from_str(data) {
            Ok(store) => store,
            Err(e) => {
                error!("Сохранённое состояние повреждено, начинаем с пустого: {}", e);
                Self::new()
            }
        }
    }

    pub fn load(storage: &dyn StateStorage, key: &str) -> Self {
        match storage.read_string(key) {
            Ok(Some(data)) => {
                let store = Self::deserialize(&data);
                if store.is_empty() {
                    info!("Сохранённое состояние пусто");
                } else {
                    info!("Загружено раскладок: {}", store.len());
                }
                store
            }
            Ok(None) => {
                info!("Сохранённых раскладок нет");
                Self::new()
            }
            Err(e) => {
                error!("Не удалось прочитать сохранённые раскладки: {}", e);
                Self::new()
            }
        }
    }

    pub fn persist(&self, storage: &dyn StateStorage, key: &str) -> Result<()> {
        storage.write_string(key, &self.serialize()?)
    }
}
