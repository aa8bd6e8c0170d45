pub mod config;
pub mod matrix;
pub mod orchestration;
pub mod shared;
pub mod spark;
pub mod state;
