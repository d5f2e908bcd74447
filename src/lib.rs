pub mod batch;
pub mod cancel;
pub mod cli;
pub mod error;
pub mod orchestrator;
mod opts;
pub mod params;
pub mod reset;
pub mod worker;

pub use opts::ConnOpts;
