pub mod config;
pub mod engine;
pub mod error;
pub mod notification;
pub mod session;
pub mod snap_points;

pub use config::*;
pub use engine::*;
pub use error::*;
pub use notification::*;
pub use session::*;
pub use snap_points::*;
