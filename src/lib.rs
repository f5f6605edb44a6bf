pub mod canonical;
pub mod config;
pub mod db;
pub mod extract;
pub mod hierarchy;
pub mod index;
pub mod matcher;
pub mod model;
pub mod ops;
pub mod output;
pub mod paths;
pub mod validate;
