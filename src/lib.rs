#[macro_use]
extern crate anyhow;

#[macro_use]
extern crate serde;

pub mod assets;
pub mod cache;
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod hash;
pub mod launcher;
pub mod libraries;
pub mod manifest;
pub mod maven;
pub mod meta;
pub mod planner;
pub mod platform;
pub mod progress;
pub mod resolver;
pub mod store;
pub mod transport;
pub mod util;

pub use error::{Error, Result};
