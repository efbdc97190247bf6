use std::future::Future;
use std::io::Write;
use std::time::Duration;

use anyhow::Context;
use sqlx::{postgres::PgConnectOptions, ConnectOptions, Connection};
use tracing::debug;

/// Blocks until `DATABASE_URL` accepts a connection, printing progress.
pub async fn wait_for_db(database_url: &str, interval: Duration) -> anyhow::Result<()> {
    let options: PgConnectOptions = database_url.parse().context("parse DATABASE_URL")?;
    wait_until_available(
        || {
            let options = options.clone();
            async move {
                let conn = options.connect().await?;
                conn.close().await?;
                Ok::<_, sqlx::Error>(())
            }
        },
        interval,
        &mut std::io::stdout(),
    )
    .await
}

/// Retries `probe` forever at `interval` until it succeeds.
pub async fn wait_until_available<F, Fut, E>(
    mut probe: F,
    interval: Duration,
    out: &mut impl Write,
) -> anyhow::Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: std::fmt::Display,
{
    writeln!(out, "Waiting for database...")?;
    let secs = interval.as_secs();
    loop {
        match probe().await {
            Ok(()) => break,
            Err(e) => {
                debug!(error = %e, "database probe failed");
                writeln!(
                    out,
                    "Database unavailable, waiting {} second{}...",
                    secs,
                    if secs == 1 { "" } else { "s" }
                )?;
                out.flush()?;
                tokio::time::sleep(interval).await;
            }
        }
    }
    writeln!(out, "Database available!")?;
    Ok(())
}
