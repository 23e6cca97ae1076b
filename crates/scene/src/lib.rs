pub mod feature;
pub mod selection;
pub mod source;

pub use feature::*;
pub use selection::*;
pub use source::*;
