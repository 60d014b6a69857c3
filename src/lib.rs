pub mod batch;
pub mod config;
pub mod crowi;
pub mod error;
pub mod fetch;
pub mod images;
pub mod migrate;
pub mod model;
pub mod path;
pub mod retry;
