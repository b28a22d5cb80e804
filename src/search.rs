//! `qactx search`: retrieval without generation.

use anyhow::Result;
use qa_context_core::engine::RetrievalEngine;
use qa_context_core::models::{round2, RetrievalResult};
use serde::Serialize;

use crate::config::Config;
use crate::engine::open_engine;

/// One ranked hit as printed by `search --json`.
#[derive(Debug, Serialize)]
struct HitView<'a> {
    rank: usize,
    index: usize,
    score: f64,
    question: &'a str,
    answer: &'a str,
    source_url: &'a str,
}

pub async fn run_search(
    config: &Config,
    query: &str,
    top_k: Option<usize>,
    json: bool,
) -> Result<()> {
    let engine = open_engine(config).await?;
    let result = search(&engine, query, top_k.unwrap_or(config.retrieval.top_k)).await?;

    if json {
        let hits: Vec<HitView<'_>> = result
            .ranked
            .iter()
            .enumerate()
            .map(|(i, r)| HitView {
                rank: i + 1,
                index: r.index,
                score: round2(r.score),
                question: &r.record.question,
                answer: &r.record.answer,
                source_url: &r.record.source_url,
            })
            .collect();
        let out = serde_json::json!({
            "result": result.to_response(),
            "hits": hits,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    for (i, hit) in result.ranked.iter().enumerate() {
        println!("{}. [{:.2}] {}", i + 1, hit.score, hit.record.question);
        println!(
            "    answer: \"{}\"",
            hit.record.answer.replace('\n', " ").trim()
        );
        if !hit.record.source_url.is_empty() {
            println!("    url: {}", hit.record.source_url);
        }
        println!("    row: {}", hit.index);
        println!();
    }
    println!("--- Context ---");
    println!("{}", result.context_text);
    Ok(())
}

async fn search(engine: &RetrievalEngine, query: &str, top_k: usize) -> Result<RetrievalResult> {
    Ok(engine.query(query, top_k).await?)
}
