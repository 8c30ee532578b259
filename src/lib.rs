pub mod core;
pub mod error;
pub mod model;
pub mod utils;
