//! siteinspect - construction-site safety inspection management.
//!
//! Inspectors record site inspections, upload photos, run AI-assisted
//! violation detection, link violations to OSHA standards and generate
//! PDF/DOCX reports for their clients. Every tenant-owned row is scoped
//! by the owning user's ID.

pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod rate_limit;
pub mod render;
pub mod repository;
pub mod schema;
pub mod server;
pub mod services;
pub mod storage;
pub mod utils;
pub mod vision;
pub mod work_queue;

pub use error::{AppError, AppResult};
