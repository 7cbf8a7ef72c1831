//! Configuration-driven front end for the courier transports.

pub mod controller;

pub use controller::{Courier, Summary, find_config_file};
