// Courtline command-line front end: audit persistence and report rendering.

pub mod audit;
pub mod report;
