pub mod audit;
pub mod bog;
pub mod config;
pub mod db;
pub mod dto;
pub mod entity;
pub mod error;
pub mod mail;
pub mod middleware;
pub mod models;
pub mod pricing;
pub mod response;
pub mod routes;
pub mod services;
pub mod state;
