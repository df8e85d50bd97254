pub mod cli;
pub mod config;
pub mod export;
pub mod geocode;
pub mod lookup;
pub mod quota;
pub mod web;
