//! Basic reconciliation usage example

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use reconcile_core::{CanonicalRow, ReconcileConfig, ReconciliationEngine};
use std::str::FromStr;

fn dec(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap()
}

fn date(month: u32, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(2024, month, day)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("🧾 Reconcile Core - Basic Reconciliation Example\n");

    // 1. Canonical rows as the ingestion layer would deliver them:
    //    customer invoices on 430xxx accounts, supplier rows on 40x/41x.
    println!("📊 Building the ledger extract...");
    let rows = vec![
        // ACME: one invoice settled exactly, one referenced by the payment text
        CanonicalRow::new("430001", date(1, 5), Some(dec("1250.00")), None)
            .with_counterparty("ACME")
            .with_document("FAC-2024-001"),
        CanonicalRow::new("430001", date(1, 12), Some(dec("890.50")), None)
            .with_counterparty("ACME")
            .with_document("FAC-2024-002"),
        CanonicalRow::new("430001", date(1, 20), None, Some(dec("1250.00")))
            .with_counterparty("ACME")
            .with_concept("Transferencia recibida"),
        CanonicalRow::new("430001", date(1, 28), None, Some(dec("890.50")))
            .with_counterparty("ACME")
            .with_concept("Pago fac 2024-002"),
        // BETA: two invoices settled by one combined payment
        CanonicalRow::new("430002", date(2, 1), Some(dec("300.00")), None)
            .with_counterparty("BETA")
            .with_document("FAC-2024-010"),
        CanonicalRow::new("430002", date(2, 8), Some(dec("700.00")), None)
            .with_counterparty("BETA")
            .with_document("FAC-2024-011"),
        CanonicalRow::new("430002", date(2, 25), None, Some(dec("1000.00")))
            .with_counterparty("BETA")
            .with_concept("Transferencia"),
        // GAMMA: partial payment, the rest stays pending
        CanonicalRow::new("430003", date(3, 1), Some(dec("2000.00")), None)
            .with_counterparty("GAMMA")
            .with_document("FAC-2024-020"),
        CanonicalRow::new("430003", date(3, 15), None, Some(dec("500.00")))
            .with_counterparty("GAMMA")
            .with_concept("Pago parcial"),
        // A supplier invoice and its payment (note the inverted raw signs)
        CanonicalRow::new("400010", date(2, 3), None, Some(dec("450.00")))
            .with_counterparty("STEEL CO")
            .with_document("PROV-77"),
        CanonicalRow::new("400010", date(2, 17), Some(dec("450.00")), None)
            .with_counterparty("STEEL CO")
            .with_concept("Pago prov 77"),
    ];
    println!("  ✓ {} rows ready\n", rows.len());

    // 2. Run the engine with a fixed report date so aging is reproducible
    println!("⚙️  Running the waterfall...");
    let config = ReconcileConfig {
        as_of: date(3, 31),
        ..ReconcileConfig::default()
    };
    let engine = ReconciliationEngine::new(config);
    let report = engine.reconcile(&rows)?;
    println!("  ✓ Done\n");

    // 3. Walk the receivables allocation history
    println!("💰 Receivables allocations:");
    for allocation in &report.receivables.allocations {
        println!(
            "  [{}] set {} | {} -> {} | {} ({:.0}%)",
            allocation.counterparty,
            allocation.set_id,
            allocation
                .payment_key
                .as_deref()
                .unwrap_or("(no payment)"),
            allocation
                .invoice_key
                .as_deref()
                .unwrap_or("(no invoice)"),
            allocation.amount,
            allocation.confidence,
        );
        println!("      method: {}", allocation.method.as_str());
    }
    println!();

    // 4. What is still pending, and for how long
    println!("⏳ Pending invoices:");
    for pending in &report.receivables.pending {
        println!(
            "  [{}] {} | {} outstanding for {} days",
            pending.counterparty, pending.invoice_key, pending.amount_pending,
            pending.days_outstanding,
        );
    }
    println!();

    // 5. Block totals
    let receivables = &report.receivables.summary;
    let payables = &report.payables.summary;
    println!("📈 Summary:");
    println!(
        "  Receivables: {} matched ({}), {} unallocated ({}), {} pending ({})",
        receivables.matched_count,
        receivables.matched_total,
        receivables.unallocated_count,
        receivables.unallocated_total,
        receivables.pending_count,
        receivables.pending_total,
    );
    println!(
        "  Payables:    {} matched ({}), {} pending ({})",
        payables.matched_count,
        payables.matched_total,
        payables.pending_count,
        payables.pending_total,
    );

    if !report.diagnostics.is_empty() {
        println!("\n⚠️  Diagnostics:");
        for diagnostic in &report.diagnostics {
            println!("  {:?}: {}", diagnostic.counterparty, diagnostic.message);
        }
    }

    Ok(())
}
