pub mod analysis;
pub mod config;
pub mod device;
pub mod error;
pub mod matrix;
pub mod observer;
pub mod output;
pub mod response;
pub mod simulator;
pub mod stats;
