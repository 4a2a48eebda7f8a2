pub mod emissions;
pub mod pipeline;
pub mod prices;
pub mod production;
pub mod revenue;
pub mod summary;
pub mod weather;

pub use emissions::*;
pub use pipeline::*;
pub use prices::*;
pub use production::*;
pub use revenue::*;
pub use summary::*;
pub use weather::*;
