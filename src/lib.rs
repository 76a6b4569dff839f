//! jasmine-runner library
//!
//! Discovers JavaScript spec files, evaluates them with a bundled
//! Jasmine-compatible framework and reports results through a
//! `ResultListener`. The binary entry point is in main.rs.

pub mod config;
pub mod discovery;
pub mod environment;
pub mod junit;
pub mod lines;
pub mod loader;
pub mod protocol;
pub mod reporter;
pub mod resolver;
pub mod runner;
pub mod signals;
pub mod watch;
