//! Taxpayer lookup for the `ruc get` command.

use anyhow::Result;

use crate::config::Config;
use crate::models::TaxpayerRecord;
use crate::store::{RecordStore, SqliteStore};

/// Look up by exact tax id, or by identity document number when
/// `by_document` is set (first tax id starting with the number).
pub async fn get_taxpayer(
    store: &dyn RecordStore,
    key: &str,
    by_document: bool,
) -> Result<Option<TaxpayerRecord>> {
    if by_document {
        store.find_by_key_prefix(key).await
    } else {
        store.find_by_key(key).await
    }
}

/// CLI entry point. Prints the record or exits non-zero when missing.
pub async fn run_get(config: &Config, key: &str, by_document: bool) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let found = get_taxpayer(&store, key, by_document).await?;
    store.pool().close().await;

    let record = match found {
        Some(r) => r,
        None => {
            eprintln!("Error: taxpayer not found: {}", key);
            std::process::exit(1);
        }
    };

    println!("--- Taxpayer ---");
    println!("tax_id:       {}", record.tax_id);
    println!("name:         {}", record.name);
    println!("check_digit:  {}", record.check_digit);
    println!(
        "prior_tax_id: {}",
        record.prior_tax_id.as_deref().unwrap_or("(none)")
    );
    println!("status:       {}", record.status);
    println!("source:       {}", record.source_id);

    Ok(())
}
