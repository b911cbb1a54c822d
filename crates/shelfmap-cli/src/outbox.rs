use crate::engine::Engine;

/// Deliver every due outbox row once, as the server's minute job does.
///
/// # Errors
///
/// Returns an error if due rows cannot be listed.
pub(crate) async fn run_outbox_drain(engine: &Engine) -> anyhow::Result<()> {
    let report = engine.worker.drain_outbox().await?;
    println!(
        "outbox: {} sent, {} rescheduled, {} failed",
        report.sent, report.retried, report.failed
    );
    Ok(())
}

/// # Errors
///
/// Returns an error if the counts cannot be queried.
pub(crate) async fn run_outbox_status(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let counts = shelfmap_db::count_outbox_by_status(pool).await?;
    println!("{:<10}{:<8}{:<8}", "PENDING", "SENT", "FAILED");
    println!(
        "{:<10}{:<8}{:<8}",
        counts.pending, counts.sent, counts.failed
    );
    Ok(())
}
