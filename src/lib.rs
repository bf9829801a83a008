pub mod accuracy;
pub mod confidence;
pub mod config;
pub mod constraints;
pub mod engine;
pub mod ensemble;
pub mod error;
pub mod factor;
pub mod feed;
pub mod model;
pub mod regional;
pub mod store;
pub mod weights;
