//! Infrastructure layer for Skillbox.
//!
//! Contains implementations of the ports defined in `skillbox-core`:
//! the bollard-backed Docker engine, the S3/MinIO object store, Postgres
//! repositories, plus environment configuration loading and tracing
//! initialization.

pub mod config;
pub mod docker;
pub mod postgres;
pub mod s3;
pub mod telemetry;
