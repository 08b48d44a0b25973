//! Port traits: the boundary between domain logic and the outside world.

pub mod calendar_port;
pub mod clock_port;
pub mod config_port;
pub mod optimizer_port;
pub mod price_port;
