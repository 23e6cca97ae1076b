pub mod analysis;
pub mod merge;
pub mod query;

pub use analysis::*;
pub use merge::*;
pub use query::*;
