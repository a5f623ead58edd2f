pub mod analysis;
pub mod config;
pub mod engine;
pub mod net;
pub mod options;
pub mod report;
pub mod session;
