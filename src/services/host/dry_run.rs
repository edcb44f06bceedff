use crate::error::Result;
use crate::events::{HostNotification, Maximized, Rect, WindowId};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};
use tracing::{debug, info};

use super::r#trait::{HostWindow, NotificationSource, WindowHandle, WindowHost};

/// Окно симулятора
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimWindow {
    pub id: WindowId,
    pub title: String,
    pub rect: Rect,
    pub maximized: Maximized,
    pub minimized: bool,
    pub fullscreen: bool,
    pub workspace: Option<u32>,
    pub skip_taskbar: bool,
    // Геометрия, к которой окно вернётся после снятия максимизации
    restore_rect: Rect,
}

impl SimWindow {
    pub fn new(id: u64, title: &str, rect: Rect) -> Self {
        Self {
            id: WindowId(id),
            title: title.to_string(),
            rect,
            maximized: Maximized::None,
            minimized: false,
            fullscreen: false,
            workspace: Some(0),
            skip_taskbar: false,
            restore_rect: rect,
        }
    }

    pub fn with_workspace(mut self, workspace: u32) -> Self {
        self.workspace = Some(workspace);
        self
    }

    pub fn minimized(mut self) -> Self {
        self.minimized = true;
        self
    }

    pub fn skip_taskbar(mut self) -> Self {
        self.skip_taskbar = true;
        self
    }
}

#[derive(Debug)]
struct SimState {
    display: (u32, u32),
    windows: Vec<SimWindow>,
    mutations: usize,
}

impl SimState {
    fn window_mut(&mut self, id: WindowId) -> Option<&mut SimWindow> {
        self.windows.iter_mut().find(|w| w.id == id)
    }

    fn apply_maximize(window: &mut SimWindow, flags: Maximized, display: (u32, u32)) {
        if !window.maximized.is_maximized() {
            window.restore_rect = window.rect;
        }
        let horizontal = window.maximized.horizontal() || flags.horizontal();
        let vertical = window.maximized.vertical() || flags.vertical();
        if horizontal {
            window.rect.x = 0;
            window.rect.width = display.0;
        }
        if vertical {
            window.rect.y = 0;
            window.rect.height = display.1;
        }
        window.maximized = Maximized::from_axes(horizontal, vertical);
    }
}

/// Оконный менеджер, целиком живущий в памяти.
///
/// Ведёт себя как типичный оконный менеджер: игнорирует изменение геометрии
/// максимизированного окна, разворачивает свёрнутое окно при перемещении или
/// максимизации и подгоняет окна под новый размер экрана. Все клоны делят одно
/// состояние, поэтому тесты могут менять его, пока хост принадлежит координатору.
#[derive(Debug, Clone)]
pub struct DryRunHost {
    state: Arc<Mutex<SimState>>,
    notify_interval: Duration,
}

impl Default for DryRunHost {
    fn default() -> Self {
        Self::new(1920, 1080)
    }
}

impl DryRunHost {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                display: (width, height),
                windows: Vec::new(),
                mutations: 0,
            })),
            notify_interval: Duration::from_secs(3),
        }
    }

    /// Набор окон для демонстрационного режима
    pub fn with_demo_windows() -> Self {
        let host = Self::default();
        host.add_window(SimWindow::new(0x100, "Terminal - dry_run", Rect::new(40, 40, 900, 600)));
        host.add_window(SimWindow::new(0x200, "Browser - dry_run", Rect::new(960, 0, 960, 1080)));
        host.add_window(
            SimWindow::new(0x300, "Editor - dry_run", Rect::new(200, 150, 1400, 800)).with_workspace(1),
        );
        host.add_window(SimWindow::new(0x400, "Chat - dry_run", Rect::new(1500, 700, 400, 300)).minimized());
        host.add_window(SimWindow::new(0x500, "Panel - dry_run", Rect::new(0, 0, 1920, 32)).skip_taskbar());
        host
    }

    pub fn add_window(&self, window: SimWindow) {
        self.state.lock().windows.push(window);
    }

    #[cfg(test)]
    pub fn remove_window(&self, id: WindowId) {
        self.state.lock().windows.retain(|w| w.id != id);
    }

    #[cfg(test)]
    pub fn window(&self, id: WindowId) -> Option<SimWindow> {
        self.state.lock().windows.iter().find(|w| w.id == id).cloned()
    }

    /// Изменение окна «пользователем»; не считается вызовом хоста
    #[cfg(test)]
    pub fn update_window(&self, id: WindowId, f: impl FnOnce(&mut SimWindow)) {
        if let Some(window) = self.state.lock().window_mut(id) {
            f(window);
        }
    }

    /// Максимизация окна «пользователем»
    #[cfg(test)]
    pub fn user_maximize(&self, id: WindowId, flags: Maximized) {
        let mut state = self.state.lock();
        let display = state.display;
        if let Some(window) = state.window_mut(id) {
            SimState::apply_maximize(window, flags, display);
        }
    }

    /// Смена размера экрана: максимизированные окна растягиваются, остальные
    /// ужимаются в новые границы
    pub fn set_display_size(&self, width: u32, height: u32) {
        let mut state = self.state.lock();
        state.display = (width, height);
        for window in state.windows.iter_mut() {
            if window.maximized.horizontal() {
                window.rect.width = width;
            }
            if window.maximized.vertical() {
                window.rect.height = height;
            }
            window.rect.width = window.rect.width.min(width);
            window.rect.height = window.rect.height.min(height);
            let max_x = (width - window.rect.width) as i32;
            let max_y = (height - window.rect.height) as i32;
            window.rect.x = window.rect.x.clamp(0, max_x);
            window.rect.y = window.rect.y.clamp(0, max_y);
        }
        debug!("Симулятор: размер экрана {}x{}", width, height);
    }

    /// Количество изменяющих вызовов, сделанных через HostWindow
    #[cfg(test)]
    pub fn mutation_count(&self) -> usize {
        self.state.lock().mutations
    }

    fn handle(&self, id: WindowId) -> WindowHandle {
        Box::new(DryRunWindow {
            id,
            state: Arc::clone(&self.state),
        })
    }
}

impl WindowHost for DryRunHost {
    fn name(&self) -> &'static str {
        "dry_run"
    }

    fn windows(&mut self) -> Result<Vec<WindowHandle>> {
        let ids: Vec<WindowId> = self
            .state
            .lock()
            .windows
            .iter()
            .filter(|w| !w.skip_taskbar)
            .map(|w| w.id)
            .collect();
        Ok(ids.into_iter().map(|id| self.handle(id)).collect())
    }

    fn display_size(&self) -> Result<(u32, u32)> {
        Ok(self.state.lock().display)
    }

    fn subscribe(&self) -> Result<Box<dyn NotificationSource + Send>> {
        Ok(Box::new(DryRunNotificationSource {
            host: self.clone(),
            interval: self.notify_interval,
        }))
    }
}

struct DryRunWindow {
    id: WindowId,
    state: Arc<Mutex<SimState>>,
}

impl DryRunWindow {
    fn read<T: Default>(&self, f: impl FnOnce(&SimWindow) -> T) -> T {
        self.state
            .lock()
            .windows
            .iter()
            .find(|w| w.id == self.id)
            .map(f)
            .unwrap_or_default()
    }

    fn mutate(&mut self, f: impl FnOnce(&mut SimWindow, (u32, u32))) -> Result<()> {
        let mut state = self.state.lock();
        state.mutations += 1;
        let display = state.display;
        if let Some(window) = state.window_mut(self.id) {
            f(window, display);
        }
        Ok(())
    }
}

impl HostWindow for DryRunWindow {
    fn id(&self) -> WindowId {
        self.id
    }

    fn frame_rect(&self) -> Rect {
        self.read(|w| w.rect)
    }

    fn maximized(&self) -> Maximized {
        self.read(|w| w.maximized)
    }

    fn is_minimized(&self) -> bool {
        self.read(|w| w.minimized)
    }

    fn workspace(&self) -> Option<u32> {
        self.read(|w| w.workspace)
    }

    fn is_fullscreen(&self) -> bool {
        self.read(|w| w.fullscreen)
    }

    fn title(&self) -> String {
        self.read(|w| w.title.clone())
    }

    fn move_resize_frame(&mut self, _user_op: bool, rect: Rect) -> Result<()> {
        self.mutate(|w, _| {
            w.minimized = false;
            // Максимизированное окно не меняет геометрию
            if !w.maximized.is_maximized() {
                w.rect = rect;
                w.restore_rect = rect;
            }
        })
    }

    fn maximize(&mut self, flags: Maximized) -> Result<()> {
        self.mutate(|w, display| {
            w.minimized = false;
            SimState::apply_maximize(w, flags, display);
        })
    }

    fn unmaximize(&mut self, flags: Maximized) -> Result<()> {
        self.mutate(|w, _| {
            if flags.horizontal() && w.maximized.horizontal() {
                w.rect.x = w.restore_rect.x;
                w.rect.width = w.restore_rect.width;
            }
            if flags.vertical() && w.maximized.vertical() {
                w.rect.y = w.restore_rect.y;
                w.rect.height = w.restore_rect.height;
            }
            w.maximized = Maximized::from_axes(
                w.maximized.horizontal() && !flags.horizontal(),
                w.maximized.vertical() && !flags.vertical(),
            );
        })
    }

    fn minimize(&mut self) -> Result<()> {
        self.mutate(|w, _| w.minimized = true)
    }

    fn unminimize(&mut self) -> Result<()> {
        self.mutate(|w, _| w.minimized = false)
    }

    fn change_workspace(&mut self, index: u32, _user_op: bool) -> Result<()> {
        self.mutate(|w, _| w.workspace = Some(index))
    }
}

/// Эмулирует поток сигналов: периодические уведомления и смену разрешения
struct DryRunNotificationSource {
    host: DryRunHost,
    interval: Duration,
}

#[async_trait::async_trait]
impl NotificationSource for DryRunNotificationSource {
    async fn run(self: Box<Self>, tx: mpsc::Sender<HostNotification>) -> Result<()> {
        info!("Dry-run режим - уведомления оконного менеджера эмулируются");

        let signals = [
            HostNotification::WindowCreated,
            HostNotification::GrabOpEnd,
            HostNotification::SizeChanged,
            HostNotification::Minimize,
            HostNotification::Unminimize,
            HostNotification::InFullscreenChanged,
            HostNotification::WindowEnteredMonitor,
        ];
        let resolutions = [(1920, 1080), (1280, 720)];

        let mut ticker = interval(self.interval);
        let mut tick: usize = 0;

        loop {
            ticker.tick().await;
            tick += 1;

            let notification = if tick % 5 == 0 {
                let (width, height) = resolutions[(tick / 5) % resolutions.len()];
                info!("Dry-run: эмулируем смену разрешения на {}x{}", width, height);
                self.host.set_display_size(width, height);
                HostNotification::MonitorsChanged
            } else {
                signals[tick % signals.len()]
            };

            if tx.send(notification).await.is_err() {
                debug!("Dry-run: получатель уведомлений закрыт");
                return Ok(());
            }
        }
    }
}
