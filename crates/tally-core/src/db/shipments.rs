//! Shipment operations

use rusqlite::{params, OptionalExtension, Row};

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::{Carrier, NewShipment, Shipment, ShipmentStats, ShipmentStatus, TrackingEvent};

impl Database {
    /// Create a shipment with its initial tracking event
    ///
    /// The carrier is inferred from the tracking number when not supplied.
    /// If a transaction id is given, the transaction is linked back.
    pub fn create_shipment(&self, shipment: &NewShipment) -> Result<i64> {
        let carrier = shipment
            .carrier
            .unwrap_or_else(|| Carrier::infer(&shipment.tracking_number));

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO shipments (transaction_id, tracking_number, carrier, status, estimated_delivery)
             VALUES (?, ?, ?, ?, ?)",
            params![
                shipment.transaction_id,
                shipment.tracking_number,
                carrier.as_str(),
                shipment.status.as_str(),
                shipment.estimated_delivery.map(|d| d.to_string()),
            ],
        )?;
        let shipment_id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO tracking_events (shipment_id, status, description)
             VALUES (?, ?, 'Shipment record created')",
            params![shipment_id, shipment.status.as_str()],
        )?;

        if let Some(transaction_id) = shipment.transaction_id {
            tx.execute(
                "UPDATE transactions SET shipment_id = ? WHERE id = ?",
                params![shipment_id, transaction_id],
            )?;
        }

        tx.commit()?;
        Ok(shipment_id)
    }

    /// Get shipment by ID
    pub fn get_shipment(&self, id: i64) -> Result<Option<Shipment>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM shipments WHERE id = ?",
            Self::SHIPMENT_COLUMNS
        ))?;

        let shipment = stmt
            .query_row(params![id], |row| Self::row_to_shipment(row))
            .optional()?;

        Ok(shipment)
    }

    /// List shipments, optionally filtered by status, newest first
    pub fn list_shipments(&self, status: Option<ShipmentStatus>) -> Result<Vec<Shipment>> {
        let conn = self.conn()?;

        let shipments = if let Some(status) = status {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM shipments WHERE status = ? ORDER BY created_at DESC, id DESC",
                Self::SHIPMENT_COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![status.as_str()], |row| Self::row_to_shipment(row))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        } else {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM shipments ORDER BY created_at DESC, id DESC",
                Self::SHIPMENT_COLUMNS
            ))?;
            let rows = stmt
                .query_map([], |row| Self::row_to_shipment(row))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        };

        Ok(shipments)
    }

    /// Update the editable fields of a shipment
    pub fn update_shipment(
        &self,
        id: i64,
        carrier: Option<Carrier>,
        estimated_delivery: Option<chrono::NaiveDate>,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE shipments SET
                carrier = COALESCE(?, carrier),
                estimated_delivery = ?
             WHERE id = ?",
            params![
                carrier.map(|c| c.as_str()),
                estimated_delivery.map(|d| d.to_string()),
                id
            ],
        )?;
        Ok(())
    }

    /// Update shipment status, appending a tracking event
    pub fn update_shipment_status(
        &self,
        id: i64,
        status: ShipmentStatus,
        description: Option<&str>,
        location: Option<&str>,
    ) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "UPDATE shipments SET status = ? WHERE id = ?",
            params![status.as_str(), id],
        )?;
        tx.execute(
            "INSERT INTO tracking_events (shipment_id, status, description, location)
             VALUES (?, ?, ?, ?)",
            params![id, status.as_str(), description, location],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Tracking events for a shipment, newest first
    pub fn list_tracking_events(&self, shipment_id: i64) -> Result<Vec<TrackingEvent>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, shipment_id, status, description, location, occurred_at
             FROM tracking_events WHERE shipment_id = ?
             ORDER BY occurred_at DESC, id DESC",
        )?;

        let events = stmt
            .query_map(params![shipment_id], |row| {
                let status_str: String = row.get(2)?;
                let occurred_at_str: String = row.get(5)?;
                Ok(TrackingEvent {
                    id: row.get(0)?,
                    shipment_id: row.get(1)?,
                    status: status_str.parse().unwrap_or_default(),
                    description: row.get(3)?,
                    location: row.get(4)?,
                    occurred_at: parse_datetime(&occurred_at_str),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(events)
    }

    /// Delete a shipment and its events, releasing the linked transaction
    pub fn delete_shipment(&self, id: i64) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "UPDATE transactions SET shipment_id = NULL WHERE shipment_id = ?",
            params![id],
        )?;
        tx.execute(
            "DELETE FROM tracking_events WHERE shipment_id = ?",
            params![id],
        )?;
        tx.execute("DELETE FROM shipments WHERE id = ?", params![id])?;

        tx.commit()?;
        Ok(())
    }

    /// Shipment counts by status
    pub fn shipment_stats(&self) -> Result<ShipmentStats> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM shipments GROUP BY status")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut stats = ShipmentStats {
            total: 0,
            pending: 0,
            in_transit: 0,
            delivered: 0,
            returned: 0,
        };

        for (status, count) in rows {
            stats.total += count;
            match status.parse::<ShipmentStatus>() {
                Ok(ShipmentStatus::Pending) => stats.pending = count,
                Ok(ShipmentStatus::InTransit) => stats.in_transit = count,
                Ok(ShipmentStatus::Delivered) => stats.delivered = count,
                Ok(ShipmentStatus::Returned) => stats.returned = count,
                Err(_) => {}
            }
        }

        Ok(stats)
    }

    pub(crate) const SHIPMENT_COLUMNS: &'static str =
        "id, transaction_id, tracking_number, carrier, status, estimated_delivery, created_at";

    /// Helper to convert a row to Shipment (column order per SHIPMENT_COLUMNS)
    fn row_to_shipment(row: &Row) -> rusqlite::Result<Shipment> {
        let carrier_str: String = row.get(3)?;
        let status_str: String = row.get(4)?;
        let estimated_str: Option<String> = row.get(5)?;
        let created_at_str: String = row.get(6)?;

        Ok(Shipment {
            id: row.get(0)?,
            transaction_id: row.get(1)?,
            tracking_number: row.get(2)?,
            carrier: carrier_str.parse().unwrap_or_default(),
            status: status_str.parse().unwrap_or_default(),
            estimated_delivery: estimated_str
                .and_then(|s| chrono::NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
            created_at: parse_datetime(&created_at_str),
        })
    }
}
