//! Input readers and result output.

mod network_reader;
mod result_writer;
mod sf_reader;

pub use network_reader::{NetworkDefaults, parse_graphml, read_network};
pub use result_writer::{METRICS_HEADER, ResultWriter};
pub use sf_reader::{load_resource_function, parse_sf_yaml, read_sf_file};
