#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
pub mod accumulate;
pub mod consolidate;
pub mod kernel;
pub mod pipeline;
pub mod progress;
pub mod store;
pub mod types;
pub mod writer;
