#[macro_use]
extern crate log;

pub mod cli;
pub mod env;
pub mod error;
pub mod health;
pub mod identity;
pub mod logger;
pub mod pid_file;
pub mod port;
pub mod process_tree;
pub mod procs;
pub mod runtime;
pub mod server_status;
pub mod settings;
pub mod supervisor;

pub use miette::Result;
