pub mod case;
pub mod config;
pub mod ready;
