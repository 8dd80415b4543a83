//! Smoke check against a running service.

use anyhow::{Context, Result, ensure};
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::http::{BatchEmbedResponse, EmbedResponse, HealthResponse, InfoResponse};

const BATCH_TEXTS: [&str; 3] = ["Hello world", "This is a test", "Embedding service works"];

pub async fn run(base_url: &str) -> Result<()> {
    let client = Client::new();
    let base = base_url.trim_end_matches('/');
    println!("Testing embedding service at {base}");

    let health: HealthResponse = get(&client, &format!("{base}/health")).await?;
    println!(
        "\nHealth: {} (model_loaded: {}, dimension: {:?})",
        health.status, health.model_loaded, health.embedding_dimension
    );
    ensure!(health.model_loaded, "service reports the model is not loaded");

    let single: EmbedResponse =
        post(&client, &format!("{base}/embed"), &json!({"text": "Hello world"})).await?;
    println!("\nSingle embedding: dimension {}", single.dimension);
    println!(
        "First 5 values: {:?}",
        &single.embedding[..single.embedding.len().min(5)]
    );
    ensure!(
        single.embedding.len() == single.dimension,
        "embedding has {} values but dimension says {}",
        single.embedding.len(),
        single.dimension
    );
    ensure!(
        Some(single.dimension) == health.embedding_dimension,
        "embedding width {} disagrees with /health",
        single.dimension
    );

    let batch: BatchEmbedResponse = post(
        &client,
        &format!("{base}/embed-batch"),
        &json!({"texts": BATCH_TEXTS}),
    )
    .await?;
    println!(
        "\nBatch embedding: count {}, dimension {}",
        batch.count, batch.dimension
    );
    ensure!(
        batch.count == BATCH_TEXTS.len() && batch.embeddings.len() == BATCH_TEXTS.len(),
        "expected {} embeddings, got {}",
        BATCH_TEXTS.len(),
        batch.embeddings.len()
    );

    let info: InfoResponse = get(&client, &format!("{base}/info")).await?;
    println!(
        "\nModel info: {} ({} dims, max {} tokens)\n{}",
        info.model_name, info.embedding_dimension, info.max_sequence_length, info.description
    );

    println!("\nAll checks passed.");
    Ok(())
}

async fn get<T: DeserializeOwned>(client: &Client, url: &str) -> Result<T> {
    let resp = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("GET {url}"))?
        .error_for_status()
        .with_context(|| format!("GET {url}"))?;
    Ok(resp.json().await?)
}

async fn post<T: DeserializeOwned, B: Serialize>(client: &Client, url: &str, body: &B) -> Result<T> {
    let resp = client
        .post(url)
        .json(body)
        .send()
        .await
        .with_context(|| format!("POST {url}"))?
        .error_for_status()
        .with_context(|| format!("POST {url}"))?;
    Ok(resp.json().await?)
}
