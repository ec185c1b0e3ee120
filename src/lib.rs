pub mod alias;
pub mod app;
pub mod codec;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod index;
pub mod intern;
pub mod matrix;
pub mod output;
pub mod phenotype;
pub mod store;
