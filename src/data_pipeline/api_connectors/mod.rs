// src/data_pipeline/api_connectors/mod.rs

pub mod jupiter_price;

pub use jupiter_price::JupiterPriceApi;
