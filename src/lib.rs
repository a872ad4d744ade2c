pub mod audit;
pub mod backend;
pub mod catalog;
pub mod config;
pub mod dashboard;
pub mod dto;
pub mod error;
pub mod form;
pub mod guard;
pub mod media;
pub mod middleware;
pub mod models;
pub mod response;
pub mod routes;
pub mod session;
pub mod state;
pub mod views;
