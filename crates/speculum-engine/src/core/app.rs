use std::time::Instant;

use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;

/// Control directive returned by app callbacks.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AppControl {
    Continue,
    Exit,
}

/// Application driven by [`Runtime`](crate::window::Runtime).
pub trait App {
    /// Called for every window event before the runtime handles it.
    fn on_window_event(&mut self, event: &WindowEvent) -> AppControl {
        let _ = event;
        AppControl::Continue
    }

    /// The drawable size changed; reconfigure the surface.
    fn on_resize(&mut self, size: PhysicalSize<u32>);

    /// Host frame callback, once per redraw.
    fn on_frame(&mut self, now: Instant) -> AppControl;

    /// Whether another redraw should be requested after this event batch.
    fn wants_frame(&self) -> bool {
        true
    }
}
