// src/lib.rs

// Modules publics, utilisés par le binaire `analyze`.
pub mod config;
pub mod data_pipeline;
pub mod decoders;
pub mod filtering;
pub mod monitoring;
pub mod rpc;
pub mod state;
pub mod venues;
