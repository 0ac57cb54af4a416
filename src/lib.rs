pub mod access;
pub mod chunk;
pub mod config;
pub mod error;
pub mod execution;
pub mod types;
pub mod vector;
