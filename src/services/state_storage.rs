use crate::error::Result;
use crate::keeper_error;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::debug;

/// Durable key-value storage for strings.
///
/// Persistence is best-effort: callers log failures and carry on.
pub trait StateStorage: Send + Sync {
    fn read_string(&self, key: &str) -> Result<Option<String>>;
    fn write_string(&self, key: &str, value: &str) -> Result<()>;
}

/// Хранилище в каталоге: одно значение на файл `<key>.json`
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Каталог по умолчанию: `$XDG_STATE_HOME/winstate-keeper` или его аналог
    pub fn default_dir() -> Result<PathBuf> {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .map(|dir| dir.join(env!("CARGO_PKG_NAME")))
            .ok_or_else(|| keeper_error!(storage, "не удалось определить каталог состояния"))
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl StateStorage for FileStorage {
    fn read_string(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(data) => {
                debug!("Прочитано состояние из {:?}", path);
                Ok(Some(data))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(keeper_error!(storage, "чтение {:?}: {}", path, e)),
        }
    }

    fn write_string(&self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        // Пишем во временный файл и переименовываем, чтобы не оставить обрезанный JSON
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        debug!("Состояние записано в {:?}", path);
        Ok(())
    }
}

/// Хранилище в памяти для dry-run и тестов
#[derive(Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStorage for MemoryStorage {
    fn read_string(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn write_string(&self, key: &str, value: &str) -> Result<()> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_storage_round_trip() {
        let dir = std::env::temp_dir().join(format!("winstate-keeper-test-{}", std::process::id()));
        let storage = FileStorage::new(&dir);

        assert_eq!(storage.read_string("window-states").unwrap(), None);
        storage.write_string("window-states", "{\"a\":1}").unwrap();
        assert_eq!(storage.read_string("window-states").unwrap().as_deref(), Some("{\"a\":1}"));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_memory_storage_overwrites() {
        let storage = MemoryStorage::new();
        storage.write_string("k", "1").unwrap();
        storage.write_string("k", "2").unwrap();
        assert_eq!(storage.read_string("k").unwrap().as_deref(), Some("2"));
    }
}
