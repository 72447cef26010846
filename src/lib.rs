pub mod config;
pub mod contract;
pub mod pipeline;
pub mod profile;
pub mod source;
pub mod store;
pub mod transform;
