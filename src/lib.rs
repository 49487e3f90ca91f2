pub mod config;
pub mod error;
pub mod flow;
pub mod interface;
pub mod io;
pub mod metrics;
pub mod net;
pub mod params;
pub mod sfc;
pub mod sim;
pub mod trace;

pub use error::{Result, SimError};

#[cfg(test)]
mod test;
