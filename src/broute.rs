pub mod calibration;
#[cfg(test)]
mod harness;
pub mod scheduler;
pub mod session;
pub mod state;
pub mod timer;

pub use calibration::*;
pub use session::*;
pub use state::*;
pub use timer::*;
