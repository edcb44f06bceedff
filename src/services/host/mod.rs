//! Host service: responsibility and boundaries
//!
//! This module and its submodules are responsible ONLY for talking to the window
//! manager: enumerating windows, reading and applying their placement, reporting
//! the display size and forwarding change notifications.
//! It MUST NOT decide when to save or restore a layout; that belongs to
//! RefreshCoordinator, which works through the traits defined here.

mod dry_run;
mod x11;
mod r#trait;

#[cfg(test)]
pub use self::dry_run::{DryRunHost, SimWindow};
pub use self::r#trait::{create_window_host, HostWindow, WindowHandle, WindowHost};
