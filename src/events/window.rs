use serde::{Deserialize, Serialize};
use std::fmt;

/// Стабильный идентификатор окна, выдаваемый оконным менеджером
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(pub u64);

impl WindowId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Геометрия рамки окна в координатах оконного менеджера
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x:{}, y:{}, w:{}, h:{}", self.x, self.y, self.width, self.height)
    }
}

/// Состояние максимизации окна по осям
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Maximized {
    #[default]
    None,
    Horizontal,
    Vertical,
    Both,
}

impl Maximized {
    pub fn from_axes(horizontal: bool, vertical: bool) -> Self {
        match (horizontal, vertical) {
            (true, true) => Maximized::Both,
            (true, false) => Maximized::Horizontal,
            (false, true) => Maximized::Vertical,
            (false, false) => Maximized::None,
        }
    }

    pub fn is_maximized(&self) -> bool {
        !matches!(self, Maximized::None)
    }

    pub fn horizontal(&self) -> bool {
        matches!(self, Maximized::Horizontal | Maximized::Both)
    }

    pub fn vertical(&self) -> bool {
        matches!(self, Maximized::Vertical | Maximized::Both)
    }
}

impl fmt::Display for Maximized {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Maximized::None => "none",
            Maximized::Horizontal => "horizontal",
            Maximized::Vertical => "vertical",
            Maximized::Both => "both",
        };
        write!(f, "{}", name)
    }
}

/// Уведомление оконного менеджера, запускающее обновление раскладки
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HostNotification {
    WindowCreated,
    GrabOpEnd,
    WindowEnteredMonitor,
    InFullscreenChanged,
    SizeChanged,
    Minimize,
    Unminimize,
    MonitorsChanged,
}

impl HostNotification {
    pub fn reason(&self) -> &'static str {
        match self {
            HostNotification::WindowCreated => "Window created",
            HostNotification::GrabOpEnd => "Grab operation ended",
            HostNotification::WindowEnteredMonitor => "Window entered monitor",
            HostNotification::InFullscreenChanged => "In fullscreen changed",
            HostNotification::SizeChanged => "Size changed",
            HostNotification::Minimize => "Minimize",
            HostNotification::Unminimize => "Unminimize",
            HostNotification::MonitorsChanged => "Monitors changed",
        }
    }
}

impl fmt::Display for HostNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signal: {}", self.reason())
    }
}
