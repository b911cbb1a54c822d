//! Store listing and review commands.

use shelfmap_core::{Actor, Coordinate, ProximityQuery, Store, StoreStatus};

use crate::engine::Engine;

/// Trim a name to `width` characters for table output.
fn clip(value: &str, width: usize) -> String {
    if value.chars().count() > width {
        format!("{}...", value.chars().take(width - 3).collect::<String>())
    } else {
        value.to_string()
    }
}

fn fmt_distance(distance_km: Option<f64>) -> String {
    distance_km.map_or_else(|| "-".to_string(), |d| format!("{d:.2} km"))
}

fn print_store_table(stores: &[Store]) {
    println!("{:<38}{:<10}{:<5}{:<18}NAME", "ID", "STATUS", "REV", "OWNER");
    for store in stores {
        println!(
            "{:<38}{:<10}{:<5}{:<18}{}",
            store.id,
            store.status.as_str(),
            store.revision,
            clip(&store.owner_id, 16),
            clip(&store.name, 40)
        );
    }
}

/// List approved stores near a point, nearest first.
///
/// # Errors
///
/// Returns an error if the origin is invalid or the store list cannot be loaded.
pub(crate) async fn run_nearby(
    engine: &Engine,
    lat: f64,
    lng: f64,
    radius_km: Option<f64>,
) -> anyhow::Result<()> {
    let query = ProximityQuery::new(
        Coordinate {
            latitude: lat,
            longitude: lng,
        },
        radius_km,
    )?;
    let result = engine.directory.approved_nearby(Some(&query)).await?;

    if let Some(radius) = result.effective_radius_km {
        println!("radius: {radius:.1} km");
    }
    if result.visible.is_empty() {
        println!("no approved stores in range");
        return Ok(());
    }

    println!("{:<12}{:<38}NAME", "DISTANCE", "ID");
    for nearby in &result.visible {
        println!(
            "{:<12}{:<38}{}",
            fmt_distance(nearby.distance_km),
            nearby.item.id,
            clip(&nearby.item.name, 40)
        );
    }
    Ok(())
}

/// # Errors
///
/// Returns an error if `status` is unknown or the list cannot be loaded.
pub(crate) async fn run_stores(engine: &Engine, status: Option<&str>) -> anyhow::Result<()> {
    let status = status.map(str::parse::<StoreStatus>).transpose()?;
    let stores = engine.directory.stores_by_status(status).await?;

    if stores.is_empty() {
        println!("no stores found");
        return Ok(());
    }
    print_store_table(&stores);
    Ok(())
}

/// Apply a review decision and print any notification warnings.
///
/// # Errors
///
/// Returns an error if `status` is unknown or the transition is refused.
pub(crate) async fn run_set_status(
    engine: &Engine,
    store_id: &str,
    status: &str,
    actor: &str,
    expected_revision: Option<i64>,
) -> anyhow::Result<()> {
    let status: StoreStatus = status.parse()?;
    let outcome = engine
        .manager
        .set_status_by_id(store_id, status, &Actor::new(actor), expected_revision)
        .await?;

    println!(
        "store {} is now {} (revision {})",
        outcome.store.id, outcome.store.status, outcome.store.revision
    );
    for warning in &outcome.warnings {
        println!("warning: {warning}");
    }
    Ok(())
}
