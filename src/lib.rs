pub mod geo;
pub mod catalog;
pub mod coverage;
pub mod controller;
pub mod render;
pub mod ui;
pub mod cache;
pub mod config;
