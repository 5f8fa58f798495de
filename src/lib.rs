pub mod connection;
pub mod engine;
pub mod error;
pub mod gap_junction;
pub mod manager;
pub mod membership;
pub mod minis;
pub mod params;
pub mod pathway;
pub mod process_group;
pub mod reader;
pub mod registry;
pub mod storage;
pub mod synapse;
pub mod util;

mod types;

pub use error::{Error, Result};
pub use types::{HashMap, HashSet};
