use crate::config::RefreshConfig;
use crate::error::Result;
use crate::events::HostNotification;
use crate::keeper_error;
use crate::services::host::WindowHost;
use crate::services::layout_store::{DisplayFingerprint, LayoutStore};
use crate::services::window_snapshot::SnapshotOptions;
use std::future::pending;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, interval_at, sleep_until, Duration, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Как координатор узнаёт, что пора обновить раскладку
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshStrategy {
    /// Первое уведомление взводит таймер, остальные до его срабатывания поглощаются
    Debounce { delay: Duration },
    /// Обновление по фиксированному интервалу без подписки на уведомления
    Polling { interval: Duration },
}

impl RefreshStrategy {
    pub fn from_config(config: &RefreshConfig) -> Result<Self> {
        match config.mode.as_str() {
            "debounce" => Ok(RefreshStrategy::Debounce {
                delay: Duration::from_millis(config.debounce_ms),
            }),
            "polling" => Ok(RefreshStrategy::Polling {
                interval: Duration::from_millis(config.polling_interval_ms),
            }),
            other => Err(keeper_error!(internal, "Неизвестный режим обновления: {}", other)),
        }
    }

    fn delay(&self) -> Duration {
        match self {
            RefreshStrategy::Debounce { delay } => *delay,
            RefreshStrategy::Polling { interval } => *interval,
        }
    }
}

/// Какая ветка решения была выбрана
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshAction {
    Save,
    Restore,
}

/// Состояние координатора; меняется только им самим
#[derive(Debug, Clone, Default)]
pub struct RefreshState {
    last_seen: Option<DisplayFingerprint>,
    pending: Option<Instant>,
}

#[cfg(test)]
impl RefreshState {
    pub fn last_seen(&self) -> Option<&DisplayFingerprint> {
        self.last_seen.as_ref()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

pub struct RefreshCoordinator {
    host: Box<dyn WindowHost>,
    store: LayoutStore,
    strategy: RefreshStrategy,
    options: SnapshotOptions,
    state: RefreshState,
    decisions: usize,
}

impl RefreshCoordinator {
    pub fn new(
        host: Box<dyn WindowHost>,
        store: LayoutStore,
        strategy: RefreshStrategy,
        options: SnapshotOptions,
    ) -> Self {
        Self {
            host,
            store,
            strategy,
            options,
            state: RefreshState::default(),
            decisions: 0,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> &RefreshState {
        &self.state
    }

    #[cfg(test)]
    pub fn store(&self) -> &LayoutStore {
        &self.store
    }

    pub fn into_store(self) -> LayoutStore {
        self.store
    }

    /// Сколько раз выполнялось решение save/restore
    #[cfg(test)]
    pub fn decisions(&self) -> usize {
        self.decisions
    }

    /// Idle → PendingDebounce. Уведомления во время ожидания таймер не продлевают.
    pub fn schedule_refresh(&mut self, notification: HostNotification, now: Instant) {
        if self.state.pending.is_some() {
            return;
        }
        debug!("Refresh scheduled. Reason: {}", notification);
        self.state.pending = Some(now + self.strategy.delay());
    }

    /// Отменить отложенное обновление; без ожидающего таймера ничего не делает
    pub fn cancel_pending(&mut self) -> bool {
        self.state.pending.take().is_some()
    }

    /// Решение: при смене экрана восстановить раскладку, иначе сохранить текущую
    pub fn refresh(&mut self) -> Result<RefreshAction> {
        let current = LayoutStore::fingerprint_key(self.host.as_ref())?;

        let action = match &self.state.last_seen {
            Some(last) if *last == current => RefreshAction::Save,
            Some(last) => {
                info!("Screen size changed ({} => {}). Restoring saved layout...", last, current);
                RefreshAction::Restore
            }
            None if self.store.contains(&current) => {
                info!("Найдена сохранённая раскладка для {}. Restoring saved layout...", current);
                RefreshAction::Restore
            }
            None => RefreshAction::Save,
        };

        let mut windows = self.host.windows()?;
        match action {
            RefreshAction::Save => self.store.save(&current, &windows, self.options),
            RefreshAction::Restore => {
                let summary = self.store.restore(&current, &mut windows, self.options);
                info!(
                    "Восстановлено окон: {}, пропущено: {}, с ошибкой: {}",
                    summary.restored, summary.skipped, summary.failed
                );
            }
        }

        self.state.last_seen = Some(current);
        self.decisions += 1;
        Ok(action)
    }

    fn fire(&mut self) {
        if let Err(e) = self.refresh() {
            error!("Не удалось обновить раскладку окон: {}", e);
        }
    }

    /// Цикл координатора. Завершается по сигналу `shutdown` (или при закрытии его
    /// отправителя), отменяя отложенное обновление, и возвращает себя вместе с хранилищем.
    pub async fn run(
        mut self,
        mut notifications: Option<mpsc::Receiver<HostNotification>>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Self {
        info!("RefreshCoordinator запущен ({:?}, хост: {})", self.strategy, self.host.name());

        let mut ticker = match self.strategy {
            RefreshStrategy::Polling { interval: period } => {
                let mut ticker = interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                Some(ticker)
            }
            RefreshStrategy::Debounce { .. } => None,
        };

        loop {
            let deadline = self.state.pending;

            tokio::select! {
                biased;

                _ = shutdown.changed() => break,

                _ = wait_deadline(deadline) => {
                    self.fire();
                    self.state.pending = None;
                }

                _ = next_tick(&mut ticker) => self.fire(),

                notification = next_notification(&mut notifications) => match notification {
                    Some(notification) => self.schedule_refresh(notification, Instant::now()),
                    None => {
                        let period = self.strategy.delay();
                        warn!("Источник уведомлений закрыт, переключаемся на polling каждые {:?}", period);
                        notifications = None;
                        let mut fallback = interval_at(Instant::now() + period, period);
                        fallback.set_missed_tick_behavior(MissedTickBehavior::Delay);
                        ticker = Some(fallback);
                    }
                },
            }
        }

        if self.cancel_pending() {
            debug!("Отложенное обновление отменено");
        }
        info!("RefreshCoordinator остановлен после {} обновлений", self.decisions);
        self
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => pending().await,
    }
}

async fn next_notification(rx: &mut Option<mpsc::Receiver<HostNotification>>) -> Option<HostNotification> {
    match rx {
        Some(rx) => rx.recv().await,
        None => pending().await,
    }
}
