pub mod cache;
pub mod cli;
pub mod index;
pub mod markers;
pub mod model;
pub mod render;
pub mod resolver;
pub mod tags;

mod api;
mod config;

pub use api::{Wheelfetch, WheelfetchBuilder};
pub use config::WheelfetchConfig;
