#[macro_use]
extern crate log;

pub mod access;
pub mod cli;
pub mod cmd;
pub mod daemon;
pub mod daemon_status;
pub mod env;
pub mod error;
pub mod hell_yaml;
pub mod isolation;
pub mod logger;
pub mod procs;
pub mod provision;
pub mod supervisor;
pub mod web;

pub use miette::Result;
