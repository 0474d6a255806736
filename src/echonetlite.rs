pub mod edata;
pub mod frame;
pub mod smart_electric_energy_meter;

pub use edata::*;
pub use frame::*;
pub use smart_electric_energy_meter::PropertyError;
