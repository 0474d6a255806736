pub mod authn;
pub mod command;
pub mod line_reader;
pub mod parser;
pub mod send_receive;
pub mod skrxd;

pub use send_receive::*;
pub use skrxd::*;
