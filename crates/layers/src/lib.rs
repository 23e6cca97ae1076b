pub mod basemap;
pub mod snapping;

pub use basemap::*;
pub use snapping::*;
