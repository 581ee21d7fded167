// DANS : src/monitoring/metrics.rs

use anyhow::Result;
use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, TextEncoder,
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
};
use tracing::{error, info};
use warp::Filter;

lazy_static! {
    // --- Pagination & File ---
    pub static ref PAGES_FETCHED: IntCounter = register_int_counter!(
        "quote_fill_pages_fetched_total", "Nombre de pages de signatures récupérées"
    ).unwrap();
    pub static ref TRANSACTIONS_FETCHED: IntCounter = register_int_counter!(
        "quote_fill_transactions_fetched_total", "Nombre de transactions complètes mises en file"
    ).unwrap();
    pub static ref TRANSACTIONS_MISSING: IntCounter = register_int_counter!(
        "quote_fill_transactions_missing_total", "Signatures pour lesquelles getTransaction a renvoyé null"
    ).unwrap();
    pub static ref TRANSACTIONS_UNDECODABLE: IntCounter = register_int_counter!(
        "quote_fill_transactions_undecodable_total", "Réponses getTransaction impossibles à convertir, ignorées"
    ).unwrap();
    pub static ref QUEUE_DEPTH: IntGauge = register_int_gauge!(
        "quote_fill_queue_depth", "Transactions en attente entre le fetcher et le consumer"
    ).unwrap();

    // --- Analyse ---
    pub static ref TRANSACTIONS_EXAMINED: IntCounterVec = register_int_counter_vec!(
        "quote_fill_transactions_examined_total",
        "Transactions dépilées par le consumer, par issue du pré-filtre",
        &["stage"] // Labels: "failed", "unrouted", "extracted"
    ).unwrap();
    pub static ref DECODE_FAILURES: IntCounter = register_int_counter!(
        "quote_fill_decode_failures_total", "Erreurs renvoyées par le décodeur de swaps"
    ).unwrap();
    pub static ref RESULTS: IntCounterVec = register_int_counter_vec!(
        "quote_fill_results_total",
        "Résultats décodés, acceptés ou rejetés par l'agrégateur",
        &["verdict"] // Labels: "accepted", "leg_count", "venue", "missing_amounts", ...
    ).unwrap();

    // --- Cache de comptes ---
    pub static ref ACCOUNT_CACHE_LOOKUPS: IntCounterVec = register_int_counter_vec!(
        "quote_fill_account_cache_lookups_total",
        "Clés demandées au cache de comptes",
        &["result"] // Labels: "hit", "miss"
    ).unwrap();

    // --- RPC ---
    pub static ref RPC_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "quote_fill_rpc_requests_total",
        "Compteur total des requêtes RPC, segmenté par méthode et statut",
        &["method", "status"] // Labels: "get_transaction", "success" / "retry" / "failure"
    ).unwrap();
    pub static ref RPC_REQUEST_LATENCY: HistogramVec = register_histogram_vec!(
        "quote_fill_rpc_request_latency_seconds",
        "Latence des appels RPC vers le nœud Solana",
        &["method"]
    ).unwrap();
}

fn render() -> Result<Vec<u8>> {
    let encoder = TextEncoder::new();
    let mut buffer = vec![];
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok(buffer)
}

pub async fn start_metrics_server(port: u16) {
    let metrics_route = warp::path!("metrics").map(|| match render() {
        Ok(buffer) => warp::reply::with_status(
            warp::reply::with_header(buffer, "content-type", "text/plain; version=0.0.4"),
            warp::http::StatusCode::OK,
        ),
        Err(e) => {
            error!(error = %e, "[Monitoring] Échec de l'encodage des métriques.");
            warp::reply::with_status(
                warp::reply::with_header(Vec::new(), "content-type", "text/plain; version=0.0.4"),
                warp::http::StatusCode::INTERNAL_SERVER_ERROR,
            )
        }
    });
    info!(port, "[Monitoring] Serveur de métriques exposé sur /metrics");
    warp::serve(metrics_route).run(([0, 0, 0, 0], port)).await;
}
