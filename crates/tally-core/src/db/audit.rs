//! Audit log operations

use rusqlite::params;

use super::{AuditEntry, Database};
use crate::error::Result;

impl Database {
    /// Record an audit log entry
    pub fn log_audit(
        &self,
        user_email: &str,
        action: &str,
        entity_type: Option<&str>,
        entity_id: Option<i64>,
        details: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO audit_log (user_email, action, entity_type, entity_id, details)
             VALUES (?, ?, ?, ?, ?)",
            params![user_email, action, entity_type, entity_id, details],
        )?;
        Ok(())
    }

    /// List audit log entries, newest first
    pub fn list_audit_log(&self, limit: i64, offset: i64) -> Result<Vec<AuditEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, user_email, action, entity_type, entity_id, details
             FROM audit_log ORDER BY timestamp DESC, id DESC LIMIT ? OFFSET ?",
        )?;

        let entries = stmt
            .query_map(params![limit, offset], |row| {
                Ok(AuditEntry {
                    id: row.get(0)?,
                    timestamp: row.get(1)?,
                    user_email: row.get(2)?,
                    action: row.get(3)?,
                    entity_type: row.get(4)?,
                    entity_id: row.get(5)?,
                    details: row.get(6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(entries)
    }
}
