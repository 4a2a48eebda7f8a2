pub mod dispatch;
pub mod types;

pub use dispatch::*;
pub use types::*;
