//! Tabsplit Simulator
//!
//! Hosts a two-guest dinner on an in-memory store, lets both guests claim
//! concurrently through their own sync clients, settles up, and prints the
//! final settlement as JSON.

use anyhow::{ensure, Context};
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use tabsplit_ledger::{
    metrics::Metrics, BackingStore, Cents, ClaimLedger, Config as LedgerConfig, HostSession,
    MemoryStore, NewItem, NewReceipt, ReceiptStatus,
};
use tabsplit_sync::{SyncClient, SyncConfig};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays valid JSON
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let ledger_config = LedgerConfig::from_env().context("Failed to load ledger config")?;
    let sync_config = match std::env::var("TABSPLIT_SYNC_CONFIG") {
        Ok(path) => {
            info!("Loading sync config from: {}", path);
            SyncConfig::from_file(&path).with_context(|| format!("Failed to load {}", path))?
        }
        Err(_) => SyncConfig::from_env().context("Failed to load sync config")?,
    };

    info!("Starting {} simulation", ledger_config.service_name);

    let store = Arc::new(MemoryStore::spawn(&ledger_config.store));
    let host = HostSession::new(Arc::clone(&store));
    let metrics = Metrics::new().context("Failed to register metrics")?;
    let ledger = ClaimLedger::new(Arc::clone(&store), ledger_config.claims.clone())
        .with_metrics(metrics.clone());

    // Host enters the receipt and shares it
    let receipt = host
        .create_receipt(NewReceipt {
            merchant_name: "Corner Bistro".to_string(),
            subtotal: "25.00".parse()?,
            tax: "1.50".parse()?,
            tip: "3.00".parse()?,
            total: "29.50".parse()?,
            owner: Some("host".to_string()),
            ..Default::default()
        })
        .await?;
    let items = host
        .replace_items(
            receipt.id,
            vec![
                NewItem::new("A", Cents::new(1000), 2),
                NewItem::new("B", Cents::new(500), 1),
            ],
        )
        .await?;
    host.publish(receipt.id).await?;

    let p1 = host.add_participant(receipt.id, "P1", None).await?;
    let p2 = host.add_participant(receipt.id, "P2", None).await?;

    let first = SyncClient::connect(ledger.clone(), receipt.id, p1.id, sync_config.clone()).await?;
    let second = SyncClient::connect(ledger.clone(), receipt.id, p2.id, sync_config).await?;

    let (a, b) = (items[0].id, items[1].id);
    let (claim_a1, claim_a2, claim_b2) = tokio::join!(
        first.claim(a, Decimal::ONE),
        second.claim(a, Decimal::ONE),
        second.claim(b, Decimal::ONE),
    );
    claim_a1?;
    claim_a2?;
    claim_b2?;

    for client in [&first, &second] {
        client
            .wait_until(|v| v.status == ReceiptStatus::FullyClaimed)
            .await?;
    }
    info!("Every item claimed");

    host.mark_paid(p1.id).await?;
    host.mark_paid(p2.id).await?;

    let settled = first
        .wait_until(|v| v.status == ReceiptStatus::Settled)
        .await?;
    let mirrored = second
        .wait_until(|v| v.sequence >= settled.sequence)
        .await?;
    ensure!(
        settled.settlement == mirrored.settlement,
        "Clients disagree at sequence {}",
        settled.sequence
    );

    let audit_ok = ledger.verify_history(receipt.id).await?;
    let history = store.history(receipt.id).await?;

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "receipt_id": receipt.id,
            "status": settled.status,
            "sequence": settled.sequence,
            "settlement": settled.settlement,
            "audit": {
                "events": history.len(),
                "chain_valid": audit_ok,
            },
            "metrics": {
                "claims_committed": metrics.claims_committed.get(),
                "claims_rejected": metrics.claims_rejected.get(),
            },
        }))?
    );

    first.shutdown().await;
    second.shutdown().await;
    store.shutdown().await?;

    info!("Simulation complete");
    Ok(())
}
