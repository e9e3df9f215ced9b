mod registry;

pub use registry::{Config, ConfigRegistry};
