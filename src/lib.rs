pub mod config;
pub mod fetch;
pub mod model;
pub mod pipeline;
pub mod providers;
pub mod schema;
pub mod transform;
pub mod writer;

#[cfg(test)]
mod testing;
