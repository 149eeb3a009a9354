pub mod catalog;
pub mod config;
pub mod job;
pub mod models;
pub mod processor;
pub mod storage;
