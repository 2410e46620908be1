//! fleetrun - run a cross-product of commands across a fleet of hosts over SSH

pub mod aggregator;
pub mod cli;
pub mod dispatcher;
pub mod error;
pub mod executors;
pub mod logging;
pub mod models;
pub mod parser;
pub mod settings;
pub mod state;
