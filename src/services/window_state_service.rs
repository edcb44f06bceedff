use crate::config::Config;
use crate::error::Result;
use crate::keeper_error;
use crate::services::host::WindowHost;
use crate::services::layout_store::LayoutStore;
use crate::services::refresh_coordinator::{RefreshCoordinator, RefreshStrategy};
use crate::services::state_storage::StateStorage;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{error, info, warn};

const NOTIFICATION_BUFFER: usize = 64;

/// Жизненный цикл хранителя раскладки: start/stop поверх координатора
pub struct WindowStateService {
    coordinator: JoinHandle<RefreshCoordinator>,
    subscription: Option<JoinHandle<()>>,
    shutdown: watch::Sender<bool>,
    storage: Option<Arc<dyn StateStorage>>,
    storage_key: String,
}

impl WindowStateService {
    /// Загрузить сохранённые раскладки, подписаться на уведомления и запустить координатор
    pub fn start(
        config: &Config,
        host: Box<dyn WindowHost>,
        storage: Option<Arc<dyn StateStorage>>,
    ) -> Result<Self> {
        info!("Запуск WindowStateService (хост: {})", host.name());

        let storage_key = config.persistence.key.clone();
        let store = match &storage {
            Some(storage) => LayoutStore::load(storage.as_ref(), &storage_key),
            None => LayoutStore::new(),
        };

        let mut strategy = RefreshStrategy::from_config(&config.refresh)?;
        let mut notifications = None;
        let mut subscription = None;

        if let RefreshStrategy::Debounce { .. } = strategy {
            match host.subscribe() {
                Ok(source) => {
                    let (tx, rx) = mpsc::channel(NOTIFICATION_BUFFER);
                    subscription = Some(tokio::spawn(async move {
                        if let Err(e) = source.run(tx).await {
                            error!("Ошибка в источнике уведомлений: {}", e);
                        }
                    }));
                    notifications = Some(rx);
                }
                Err(e) => {
                    warn!("Подписка на уведомления не удалась: {}, переключаемся на polling", e);
                    strategy = RefreshStrategy::Polling {
                        interval: Duration::from_millis(config.refresh.polling_interval_ms),
                    };
                }
            }
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let coordinator = RefreshCoordinator::new(host, store, strategy, config.snapshot_options());
        let coordinator = tokio::spawn(coordinator.run(notifications, shutdown_rx));

        Ok(Self {
            coordinator,
            subscription,
            shutdown,
            storage,
            storage_key,
        })
    }

    /// Отписаться, отменить отложенное обновление, сохранить раскладки
    pub async fn stop(mut self) -> Result<LayoutStore> {
        info!("Остановка WindowStateService");

        if let Some(subscription) = self.subscription.take() {
            subscription.abort();
        }

        // Ошибка отправки означает, что координатор уже завершился
        let _ = self.shutdown.send(true);

        let coordinator = self
            .coordinator
            .await
            .map_err(|e| keeper_error!(internal, "RefreshCoordinator завершился аварийно: {}", e))?;
        let store = coordinator.into_store();

        if let Some(storage) = &self.storage {
            match store.persist(storage.as_ref(), &self.storage_key) {
                Ok(()) => info!("Сохранено раскладок: {}", store.len()),
                Err(e) => warn!("Не удалось сохранить раскладки: {}", e),
            }
        }

        Ok(store)
    }
}
