pub mod broute;
pub mod clock;
pub mod connection_settings;
pub mod echonetlite;
pub mod error;
pub mod sensor;
pub mod skstack;
pub mod transport;

pub use connection_settings::*;
pub use error::*;
