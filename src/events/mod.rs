pub mod window;

pub use window::{HostNotification, Maximized, Rect, WindowId};
