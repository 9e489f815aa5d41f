pub mod agent;
pub mod calculation;
pub mod config;
pub mod core;
pub mod error;
pub mod log;
pub mod orchestration;
pub mod server;
pub mod util;

pub use error::{Error, ParseError, Result};
