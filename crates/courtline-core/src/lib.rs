// Library root: data model, history store and configuration shared by the
// engine and the command-line front end.

pub mod audit;
pub mod config;
pub mod db;
pub mod history;
pub mod model;
