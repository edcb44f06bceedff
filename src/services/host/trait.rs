use crate::config::Config;
use crate::error::Result;
use crate::events::{HostNotification, Maximized, Rect, WindowId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

/// Live window owned by the window manager.
///
/// Getters return the state as of the last read, updated optimistically by
/// this handle's own mutators; `sync` re-reads it from the host. Mutators are
/// applied synchronously from the caller's point of view, but the host is
/// free to settle them later, so side effects such as a move unminimizing the
/// window only show up after `sync`.
pub trait HostWindow: Send {
    fn id(&self) -> WindowId;
    fn frame_rect(&self) -> Rect;
    fn maximized(&self) -> Maximized;
    fn is_minimized(&self) -> bool;
    /// `None` when the window is on all workspaces or the host has no workspaces
    fn workspace(&self) -> Option<u32>;
    fn is_fullscreen(&self) -> bool;
    fn title(&self) -> String;

    fn move_resize_frame(&mut self, user_op: bool, rect: Rect) -> Result<()>;
    fn maximize(&mut self, flags: Maximized) -> Result<()>;
    fn unmaximize(&mut self, flags: Maximized) -> Result<()>;
    fn minimize(&mut self) -> Result<()>;
    fn unminimize(&mut self) -> Result<()>;
    fn change_workspace(&mut self, index: u32, user_op: bool) -> Result<()>;

    fn sync(&mut self) -> Result<()> {
        Ok(())
    }
}

pub type WindowHandle = Box<dyn HostWindow>;

/// Capabilities of the window manager the keeper runs against
pub trait WindowHost: Send {
    fn name(&self) -> &'static str;

    /// Windows shown in the task bar, in host order
    fn windows(&mut self) -> Result<Vec<WindowHandle>>;

    /// Current display size in pixels
    fn display_size(&self) -> Result<(u32, u32)>;

    /// Subscribe to host notifications. Aborting the returned source's task unsubscribes.
    fn subscribe(&self) -> Result<Box<dyn NotificationSource + Send>>;
}

/// Trait for notification sources that forward host signals to the coordinator
#[async_trait::async_trait]
pub trait NotificationSource {
    /// Run the source until the host stops emitting or the receiver is dropped
    async fn run(self: Box<Self>, tx: mpsc::Sender<HostNotification>) -> Result<()>;
}

/// Factory function to create an appropriate window host based on the dry_run flag
pub fn create_window_host(config: Arc<Config>, dry_run: bool) -> Result<Box<dyn WindowHost>> {
    if dry_run || config.host.backend == "dry_run" {
        info!("Используется симулятор оконного менеджера (dry-run)");
        Ok(Box::new(super::dry_run::DryRunHost::with_demo_windows()))
    } else {
        let watch_interval = Duration::from_millis(config.host.watch_interval_ms);
        Ok(Box::new(super::x11::X11Host::new(watch_interval)?))
    }
}
