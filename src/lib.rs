// src/lib.rs
pub mod canonicalize;
pub mod config;
pub mod db;
pub mod escalation;
pub mod matching;
pub mod models;
pub mod review;
pub mod utils;
