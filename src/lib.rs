mod database {
    pub mod actions;
    pub mod error;
    pub mod form;
    pub mod memory;
    pub mod payload;
    pub mod postgres;
    pub mod repository;
    pub mod schema;
}
mod authentication {
    pub mod cryptography;
    pub mod jwt;
    pub mod middleware;
}
pub mod config;
pub mod constants;
pub mod media;
pub mod routes;

pub use authentication::*;
pub use database::*;
