pub mod callbacks;
pub mod config;
pub mod db;
