pub mod agenda;
pub mod config;
pub mod cycle;
pub mod dates;
pub mod error;
pub mod import;
pub mod reschedule;
pub mod review;
pub mod service;
pub mod store;
pub mod web;
