use crate::debug_if_enabled;
use crate::error::Result;
use crate::events::{Maximized, Rect, WindowId};
use crate::services::host::HostWindow;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Что именно снимать с окна
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotOptions {
    pub track_workspace: bool,
}

impl Default for SnapshotOptions {
    fn default() -> Self {
        Self { track_workspace: true }
    }
}

/// Снимок размещения одного окна
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSnapshot {
    pub rect: Rect,
    pub maximized: Maximized,
    pub minimized: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<u32>,
    // Только для логов
    #[serde(default)]
    pub fullscreen: bool,
    pub id: WindowId,
    #[serde(default)]
    pub title: String,
}

/// Расхождение, оставшееся после восстановления
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mismatch {
    Rect(Rect),
    Maximized(Maximized),
    Minimized(bool),
}

/// Результат восстановления одного окна
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Сколько изменяющих вызовов ушло в оконный менеджер
    pub host_calls: usize,
    pub mismatches: Vec<Mismatch>,
}

impl WindowSnapshot {
    pub fn capture(window: &dyn HostWindow, options: SnapshotOptions) -> Self {
        Self {
            rect: window.frame_rect(),
            maximized: window.maximized(),
            minimized: window.is_minimized(),
            workspace: if options.track_workspace { window.workspace() } else { None },
            fullscreen: window.is_fullscreen(),
            id: window.id(),
            title: window.title(),
        }
    }

    /// Применить снимок к живому окну.
    ///
    /// Порядок важен: геометрия максимизированного окна обычно игнорируется,
    /// поэтому максимизация снимается до перемещения, а сворачивание идёт
    /// последним, так как перемещение и максимизация разворачивают окно.
    ///
    /// Геттеры окна до `sync()` могут отдавать закэшированные значения, поэтому
    /// состояние после каждого шага отслеживается здесь, а не перечитывается.
    pub fn restore(&self, window: &mut dyn HostWindow, options: SnapshotOptions) -> Result<RestoreReport> {
        let mut report = RestoreReport::default();
        let mut maximized = window.maximized();
        // None: после перемещения или максимизации хост мог развернуть окно
        let mut minimized = Some(window.is_minimized());

        if options.track_workspace {
            if let Some(workspace) = self.workspace {
                if window.workspace() != Some(workspace) {
                    window.change_workspace(workspace, true)?;
                    report.host_calls += 1;
                }
            }
        }

        if window.frame_rect() != self.rect {
            if maximized.is_maximized() {
                window.unmaximize(Maximized::Both)?;
                report.host_calls += 1;
                maximized = Maximized::None;
            }
            window.move_resize_frame(true, self.rect)?;
            report.host_calls += 1;
            if minimized == Some(true) {
                minimized = None;
            }
        }

        if maximized != self.maximized {
            let extra = Maximized::from_axes(
                maximized.horizontal() && !self.maximized.horizontal(),
                maximized.vertical() && !self.maximized.vertical(),
            );
            if extra.is_maximized() {
                window.unmaximize(extra)?;
                report.host_calls += 1;
            }

            let missing = Maximized::from_axes(
                self.maximized.horizontal() && !maximized.horizontal(),
                self.maximized.vertical() && !maximized.vertical(),
            );
            if missing.is_maximized() {
                window.maximize(missing)?;
                report.host_calls += 1;
                if minimized == Some(true) {
                    minimized = None;
                }
            }
        }

        if minimized != Some(self.minimized) {
            if self.minimized {
                window.minimize()?;
            } else {
                window.unminimize()?;
            }
            report.host_calls += 1;
        }

        if report.host_calls > 0 {
            window.sync()?;
        }
        report.mismatches = self.differences(window);
        self.log_differences(&report.mismatches);

        Ok(report)
    }

    fn differences(&self, window: &dyn HostWindow) -> Vec<Mismatch> {
        let mut mismatches = Vec::new();
        if window.is_minimized() != self.minimized {
            mismatches.push(Mismatch::Minimized(window.is_minimized()));
        }
        if window.maximized() != self.maximized {
            mismatches.push(Mismatch::Maximized(window.maximized()));
        }
        // Оконный менеджер может применить геометрию асинхронно
        if window.frame_rect() != self.rect {
            mismatches.push(Mismatch::Rect(window.frame_rect()));
        }
        mismatches
    }

    fn log_differences(&self, mismatches: &[Mismatch]) {
        if mismatches.is_empty() {
            return;
        }
        for mismatch in mismatches {
            match mismatch {
                Mismatch::Minimized(actual) => {
                    debug_if_enabled!("Wrong minimized: {}, title:{}", actual, self.title)
                }
                Mismatch::Maximized(actual) => {
                    debug_if_enabled!("Wrong maximized: {}, title:{}", actual, self.title)
                }
                Mismatch::Rect(actual) => {
                    debug_if_enabled!("Wrong rectangle: {}, title:{}", actual, self.title)
                }
            }
        }
        debug_if_enabled!("Expecting: {}", self);
    }
}

impl fmt::Display for WindowSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, isMaximized:{}, isMinimized:{}, isFullscreen:{}, id:{}, title:{}",
            self.rect, self.maximized, self.minimized, self.fullscreen, self.id, self.title
        )?;
        if let Some(workspace) = self.workspace {
            write!(f, ", workspace:{}", workspace)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::host::{DryRunHost, SimWindow, WindowHost};

    fn host_with(window: SimWindow) -> (DryRunHost, Box<dyn HostWindow>) {
        let mut host = DryRunHost::default();
        host.add_window(window);
        let handle = host.windows().unwrap().remove(0);
        (host, handle)
    }

    #[test]
    fn test_capture_reads_live_state() {
        let (_host, window) = host_with(SimWindow::new(42, "Editor", Rect::new(10, 20, 800, 600)).with_workspace(2));
        let snapshot = WindowSnapshot::capture(window.as_ref(), SnapshotOptions::default());

        assert_eq!(snapshot.rect, Rect::new(10, 20, 800, 600));
        assert_eq!(snapshot.workspace, Some(2));
        assert_eq!(snapshot.id, WindowId(42));
        assert_eq!(snapshot.title, "Editor");
        assert!(!snapshot.minimized);
    }

    #[test]
    fn test_capture_without_workspace_tracking() {
        let (_host, window) = host_with(SimWindow::new(1, "a", Rect::new(0, 0, 10, 10)).with_workspace(3));
        let snapshot = WindowSnapshot::capture(window.as_ref(), SnapshotOptions { track_workspace: false });
        assert_eq!(snapshot.workspace, None);
    }

    #[test]
    fn test_restore_matching_window_is_fixed_point() {
        let (host, mut window) = host_with(SimWindow::new(1, "a", Rect::new(0, 0, 800, 600)).minimized());
        let snapshot = WindowSnapshot::capture(window.as_ref(), SnapshotOptions::default());

        let report = snapshot.restore(window.as_mut(), SnapshotOptions::default()).unwrap();

        assert_eq!(report, RestoreReport::default());
        assert_eq!(host.mutation_count(), 0);
    }

    #[test]
    fn test_restore_unmaximizes_before_moving() {
        let (host, mut window) = host_with(SimWindow::new(1, "a", Rect::new(100, 100, 800, 600)));
        let snapshot = WindowSnapshot::capture(window.as_ref(), SnapshotOptions::default());

        host.set_display_size(1280, 720);
        host.user_maximize(WindowId(1), Maximized::Both);
        assert_eq!(window.frame_rect(), Rect::new(0, 0, 1280, 720));

        let report = snapshot.restore(window.as_mut(), SnapshotOptions::default()).unwrap();

        assert_eq!(report.host_calls, 2);
        assert!(report.mismatches.is_empty());
        assert_eq!(window.frame_rect(), Rect::new(100, 100, 800, 600));
        assert_eq!(window.maximized(), Maximized::None);
    }

    #[test]
    fn test_restore_minimizes_last() {
        let (host, mut window) = host_with(SimWindow::new(1, "a", Rect::new(0, 0, 300, 200)).minimized());
        let snapshot = WindowSnapshot::capture(window.as_ref(), SnapshotOptions::default());

        host.update_window(WindowId(1), |w| {
            w.rect = Rect::new(50, 50, 300, 200);
            w.workspace = Some(4);
        });

        let report = snapshot.restore(window.as_mut(), SnapshotOptions::default()).unwrap();

        // Перемещение разворачивает окно, поэтому нужно свернуть его заново
        assert_eq!(report.host_calls, 3);
        let live = host.window(WindowId(1)).unwrap();
        assert!(live.minimized);
        assert_eq!(live.workspace, Some(0));
        assert_eq!(live.rect, Rect::new(0, 0, 300, 200));
    }

    #[test]
    fn test_restore_maximized_snapshot() {
        let (host, mut window) = host_with(SimWindow::new(1, "a", Rect::new(0, 0, 300, 200)));
        host.user_maximize(WindowId(1), Maximized::Vertical);
        let snapshot = WindowSnapshot::capture(window.as_ref(), SnapshotOptions::default());

        host.update_window(WindowId(1), |w| {
            w.maximized = Maximized::None;
        });

        let report = snapshot.restore(window.as_mut(), SnapshotOptions::default()).unwrap();

        assert_eq!(window.maximized(), Maximized::Vertical);
        assert!(report.mismatches.is_empty());
    }

    #[test]
    fn test_restore_reports_unsettled_geometry_without_error() {
        let (host, mut window) = host_with(SimWindow::new(1, "a", Rect::new(0, 0, 300, 200)));
        let mut snapshot = WindowSnapshot::capture(window.as_ref(), SnapshotOptions::default());
        // Снимок максимизированного окна с геометрией, которую хост не воспроизведёт
        snapshot.maximized = Maximized::Both;
        snapshot.rect = Rect::new(5, 5, 100, 100);

        let report = snapshot.restore(window.as_mut(), SnapshotOptions::default()).unwrap();

        assert_eq!(report.mismatches, vec![Mismatch::Rect(Rect::new(0, 0, 1920, 1080))]);
        assert_eq!(host.window(WindowId(1)).unwrap().maximized, Maximized::Both);
    }

    /// Размещение окна, как его видит оконный менеджер
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Placement {
        rect: Rect,
        maximized: Maximized,
        minimized: bool,
    }

    /// Окно, геттеры которого обновляются только в `sync()`, как у X11Window
    struct CachingWindow {
        live: Placement,
        cached: Placement,
        restore_rect: Rect,
    }

    impl CachingWindow {
        fn new(rect: Rect, maximized: Maximized, minimized: bool) -> Self {
            let placement = Placement { rect, maximized, minimized };
            Self { live: placement, cached: placement, restore_rect: rect }
        }
    }

    impl HostWindow for CachingWindow {
        fn id(&self) -> WindowId {
            WindowId(9)
        }

        fn frame_rect(&self) -> Rect {
            self.cached.rect
        }

        fn maximized(&self) -> Maximized {
            self.cached.maximized
        }

        fn is_minimized(&self) -> bool {
            self.cached.minimized
        }

        fn workspace(&self) -> Option<u32> {
            None
        }

        fn is_fullscreen(&self) -> bool {
            false
        }

        fn title(&self) -> String {
            "cached".to_string()
        }

        fn move_resize_frame(&mut self, _user_op: bool, rect: Rect) -> Result<()> {
            if !self.live.maximized.is_maximized() {
                self.live.rect = rect;
                self.restore_rect = rect;
            }
            Ok(())
        }

        fn maximize(&mut self, flags: Maximized) -> Result<()> {
            self.live.maximized = Maximized::from_axes(
                self.live.maximized.horizontal() || flags.horizontal(),
                self.live.maximized.vertical() || flags.vertical(),
            );
            self.live.minimized = false;
            Ok(())
        }

        fn unmaximize(&mut self, flags: Maximized) -> Result<()> {
            self.live.maximized = Maximized::from_axes(
                self.live.maximized.horizontal() && !flags.horizontal(),
                self.live.maximized.vertical() && !flags.vertical(),
            );
            if !self.live.maximized.is_maximized() {
                self.live.rect = self.restore_rect;
            }
            Ok(())
        }

        fn minimize(&mut self) -> Result<()> {
            self.live.minimized = true;
            Ok(())
        }

        fn unminimize(&mut self) -> Result<()> {
            self.live.minimized = false;
            Ok(())
        }

        fn change_workspace(&mut self, _index: u32, _user_op: bool) -> Result<()> {
            Ok(())
        }

        fn sync(&mut self) -> Result<()> {
            self.cached = self.live;
            Ok(())
        }
    }

    fn snapshot_of(rect: Rect, maximized: Maximized, minimized: bool) -> WindowSnapshot {
        WindowSnapshot {
            rect,
            maximized,
            minimized,
            workspace: None,
            fullscreen: false,
            id: WindowId(9),
            title: "cached".to_string(),
        }
    }

    #[test]
    fn test_restore_remaximizes_axis_with_cached_getters() {
        let mut window = CachingWindow::new(Rect::new(500, 0, 800, 1080), Maximized::Vertical, false);
        let snapshot = snapshot_of(Rect::new(100, 0, 800, 1080), Maximized::Vertical, false);

        let report = snapshot.restore(&mut window, SnapshotOptions::default()).unwrap();

        assert_eq!(
            window.live,
            Placement { rect: Rect::new(100, 0, 800, 1080), maximized: Maximized::Vertical, minimized: false }
        );
        assert_eq!(report.host_calls, 3);
        assert!(report.mismatches.is_empty());
    }

    #[test]
    fn test_restore_does_not_repeat_unmaximize_with_cached_getters() {
        let mut window = CachingWindow::new(Rect::new(0, 0, 1920, 1080), Maximized::Both, false);
        window.restore_rect = Rect::new(300, 200, 640, 480);
        let snapshot = snapshot_of(Rect::new(40, 40, 800, 600), Maximized::None, false);

        let report = snapshot.restore(&mut window, SnapshotOptions::default()).unwrap();

        assert_eq!(report.host_calls, 2);
        assert_eq!(window.live.rect, Rect::new(40, 40, 800, 600));
        assert_eq!(window.live.maximized, Maximized::None);
    }

    #[test]
    fn test_restore_reminimizes_after_move_with_cached_getters() {
        let mut window = CachingWindow::new(Rect::new(10, 10, 300, 200), Maximized::None, true);
        let snapshot = snapshot_of(Rect::new(0, 0, 300, 200), Maximized::Vertical, true);

        let report = snapshot.restore(&mut window, SnapshotOptions::default()).unwrap();

        // Максимизация разворачивает окно, свёрнутое состояние ставится заново
        assert!(window.live.minimized);
        assert_eq!(window.live.maximized, Maximized::Vertical);
        assert!(report.mismatches.is_empty());
    }
}
