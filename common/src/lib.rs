// Shared library for the CBMC CI drivers: prepare, batch-end and webhook

pub mod archive;
pub mod batch;
pub mod bootstrap;
pub mod cloudwatch;
pub mod codebuild;
pub mod config;
pub mod errors;
pub mod git;
pub mod github;
pub mod models;
pub mod pipeline;
pub mod proofs;
pub mod retry;
pub mod storage;
pub mod telemetry;
pub mod webhook;
