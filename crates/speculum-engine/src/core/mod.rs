//! Contract between the window runtime and the application.

mod app;

pub use app::{App, AppControl};
