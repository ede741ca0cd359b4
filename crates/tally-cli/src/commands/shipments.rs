//! Shipment listing command

use anyhow::Result;
use tally_core::db::Database;
use tally_core::models::ShipmentStatus;

pub fn cmd_shipments_list(db: &Database, status: Option<&str>) -> Result<()> {
    let status = match status {
        Some(s) => Some(
            s.parse::<ShipmentStatus>()
                .map_err(|e| anyhow::anyhow!(e))?,
        ),
        None => None,
    };

    let shipments = db.list_shipments(status)?;

    if shipments.is_empty() {
        println!("No shipments found.");
        return Ok(());
    }

    println!(
        "{:>6}  {:<10} {:<8} {:<24} {:<12} {}",
        "ID", "Status", "Carrier", "Tracking", "ETA", "Transaction"
    );
    for shipment in &shipments {
        println!(
            "{:>6}  {:<10} {:<8} {:<24} {:<12} {}",
            shipment.id,
            shipment.status.to_string(),
            shipment.carrier.to_string(),
            shipment.tracking_number,
            shipment
                .estimated_delivery
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".to_string()),
            shipment
                .transaction_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string()),
        );
    }

    Ok(())
}
