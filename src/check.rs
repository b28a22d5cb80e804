//! `qactx check`: load the corpus and index and report whether they line up.

use anyhow::Result;
use qa_context_core::engine::RetrievalEngine;

use crate::config::Config;
use crate::engine::load_engine;
use crate::embedding::DisabledEncoder;

/// Validate corpus/index alignment without loading an embedding model.
///
/// The configured encoder's dims are checked through `embedding.dims`
/// when set; otherwise only row count and corpus fingerprint are checked.
pub fn run_check(config: &Config) -> Result<()> {
    let engine = load_engine(config, std::sync::Arc::new(DisabledEncoder))?;
    print_summary(config, &engine);
    Ok(())
}

fn print_summary(config: &Config, engine: &RetrievalEngine) {
    let (rows, fingerprint) = engine
        .corpus()
        .map(|c| (c.len(), c.fingerprint()))
        .unwrap_or_default();
    let dims = engine.index().map(|i| i.dims()).unwrap_or(0);

    println!("corpus:      {}", config.corpus.path.display());
    println!("index:       {}", config.index.path.display());
    println!("rows:        {}", rows);
    println!("dims:        {}", dims);
    println!("fingerprint: {}", fingerprint);
    println!("state:       {}", engine.state());

    if let Some(expected) = config.embedding.dims {
        if expected != dims {
            println!(
                "warning:     embedding.dims is {} but the index has {} dims",
                expected, dims
            );
        }
    }
}
