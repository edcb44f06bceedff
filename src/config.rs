use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::services::window_snapshot::SnapshotOptions;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    pub logging: LoggingConfig,
    pub refresh: RefreshConfig,
    pub windows: WindowsConfig,
    pub host: HostConfig,
    pub persistence: PersistenceConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    /// Дополнительные директивы EnvFilter, например `winstate_keeper::services=debug`
    #[serde(default)]
    pub filter: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RefreshConfig {
    /// `debounce`: по уведомлениям с задержкой; `polling`: по интервалу
    pub mode: String,
    pub debounce_ms: u64,
    pub polling_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WindowsConfig {
    pub track_workspace: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HostConfig {
    pub backend: String,
    /// Как часто x11-бэкенд перечитывает список окон в поисках изменений
    pub watch_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PersistenceConfig {
    pub enabled: bool,
    /// Пустая строка означает каталог состояния пользователя
    #[serde(default)]
    pub path: String,
    pub key: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            filter: String::new(),
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            mode: "debounce".to_string(),
            debounce_ms: 5000,
            polling_interval_ms: 5000,
        }
    }
}

impl Default for WindowsConfig {
    fn default() -> Self {
        Self { track_workspace: true }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            backend: "x11".to_string(),
            watch_interval_ms: 1000,
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: String::new(),
            key: "window-states".to_string(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();

        // Отсутствующий файл не ошибка: остаются значения по умолчанию
        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("WSK_").split("__"));

        let config: Config = figment
            .extract()
            .with_context(|| format!("Не удалось загрузить конфигурацию из {:?}", config_path))?;

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        // Валидация настроек логирования
        match self.logging.level.as_str() {
            "off" | "error" | "warn" | "info" | "debug" | "trace" => {}
            _ => anyhow::bail!("Неверный уровень логирования: {}", self.logging.level),
        }

        // Валидация настроек обновления
        match self.refresh.mode.as_str() {
            "debounce" | "polling" => {}
            _ => anyhow::bail!("Неверный режим обновления: {}", self.refresh.mode),
        }

        if !(100..=60_000).contains(&self.refresh.debounce_ms) {
            anyhow::bail!("debounce_ms должно быть в диапазоне 100..=60000");
        }

        if self.refresh.polling_interval_ms < 100 {
            anyhow::bail!("polling_interval_ms должно быть минимум 100");
        }

        match self.host.backend.as_str() {
            "x11" | "dry_run" => {}
            _ => anyhow::bail!("Неизвестный бэкенд оконного менеджера: {}", self.host.backend),
        }

        if self.host.watch_interval_ms < 100 {
            anyhow::bail!("watch_interval_ms должно быть минимум 100");
        }

        if self.persistence.enabled && self.persistence.key.trim().is_empty() {
            anyhow::bail!("persistence.key не может быть пустым");
        }

        Ok(())
    }

    pub fn snapshot_options(&self) -> SnapshotOptions {
        SnapshotOptions {
            track_workspace: self.windows.track_workspace,
        }
    }

    /// Каталог для сохранения раскладок, если он задан явно
    pub fn persistence_dir(&self) -> Option<PathBuf> {
        let path = self.persistence.path.trim();
        if path.is_empty() {
            None
        } else {
            Some(PathBuf::from(path))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.refresh.debounce_ms, 5000);
        assert!(config.snapshot_options().track_workspace);
        assert_eq!(config.persistence_dir(), None);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = Config::default();
        config.refresh.mode = "inotify".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.refresh.debounce_ms = 10;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.host.backend = "wayland".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.host.watch_interval_ms = 20;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_merges_file_over_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "winstate.toml",
                r#"
                [refresh]
                mode = "polling"
                polling_interval_ms = 2000

                [windows]
                track_workspace = false
                "#,
            )?;
            jail.set_env("WSK_PERSISTENCE__KEY", "layouts");
            jail.set_env("WSK_HOST__WATCH_INTERVAL_MS", "2500");

            let config = Config::load("winstate.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.refresh.mode, "polling");
            assert_eq!(config.refresh.polling_interval_ms, 2000);
            assert_eq!(config.refresh.debounce_ms, 5000);
            assert!(!config.windows.track_workspace);
            assert_eq!(config.persistence.key, "layouts");
            assert_eq!(config.host.watch_interval_ms, 2500);
            assert_eq!(config.host.backend, "x11");
            Ok(())
        });
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        figment::Jail::expect_with(|_jail| {
            let config = Config::load("absent.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.host.backend, "x11");
            Ok(())
        });
    }
}
