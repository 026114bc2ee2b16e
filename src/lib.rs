pub mod capture;
pub mod config;
pub mod measurement;
pub mod pose;
pub mod record;
pub mod session;
pub mod triangulation;
pub mod view;
