pub mod forecast;
pub mod metric;
pub mod time;

pub use forecast::*;
pub use metric::*;

/// GSP id of the national aggregate.
pub const NATIONAL_GSP_ID: i32 = 0;
