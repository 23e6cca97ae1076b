pub mod ecef;
pub mod geodesy;
pub mod precision;
pub mod projection;

pub use ecef::*;
pub use geodesy::*;
pub use precision::*;
pub use projection::*;
