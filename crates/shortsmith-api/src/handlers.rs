//! Request handlers.

pub mod health;
pub mod runs;
pub mod templates;
pub mod ui;

pub use health::*;
pub use runs::*;
pub use templates::*;
pub use ui::*;
