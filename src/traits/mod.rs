mod driver;

pub use driver::{Connection, DatabaseDriver};
