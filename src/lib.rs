pub mod aggregate;
pub mod census;
pub mod config;
pub mod countries;
pub mod delta;
pub mod error;
pub mod report;
pub mod reporter;
pub mod scheduler;
pub mod state;
pub mod telegram;

pub use config::Config;
pub use error::Error;
pub use reporter::Reporter;
