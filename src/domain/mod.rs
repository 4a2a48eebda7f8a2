pub mod battery;
pub mod series;
pub mod site;

pub use battery::*;
pub use series::*;
pub use site::*;
