pub mod attempt;
pub mod endpoint;

pub use attempt::*;
pub use endpoint::*;
