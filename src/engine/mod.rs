pub mod aggregate;
pub mod audit;
pub mod batch;
pub mod cache;
pub mod config;
pub mod gateway;
pub mod offset;
pub mod paths;
pub mod pipeline;
pub mod prompt;
pub mod similarity;
pub mod types;
pub mod util;
pub mod validate;
pub mod warn;
