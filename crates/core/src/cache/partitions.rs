//! Partition operations.
//!
//! Named stores are opened lazily, written with whole-response UPSERTs, read
//! per partition or across all partitions, and deleted as a unit.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, OptionalExtension};

use super::connection::CacheDb;
use crate::Error;
use crate::request::InterceptedRequest;
use crate::response::{Response, ResponseSource};

/// Name and size of an existing partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct PartitionInfo {
    pub name: String,
    pub entries: u64,
}

/// Columns needed to rebuild a stored response.
struct EntryRow {
    status: i64,
    headers_json: String,
    body: Vec<u8>,
}

impl EntryRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self { status: row.get(0)?, headers_json: row.get(1)?, body: row.get(2)? })
    }

    fn into_response(self) -> Result<Response, Error> {
        let status = u16::try_from(self.status).map_err(|_| Error::CorruptEntry(format!("status {}", self.status)))?;
        let headers: BTreeMap<String, String> =
            serde_json::from_str(&self.headers_json).map_err(|e| Error::CorruptEntry(e.to_string()))?;
        Ok(Response { status, headers, body: self.body.into(), source: ResponseSource::Cache })
    }
}

/// Owned copy of an entry, moved onto the database thread.
struct NewEntry {
    key_hash: String,
    method: String,
    url: String,
    status: u16,
    headers_json: String,
    body: Vec<u8>,
}

impl NewEntry {
    fn build(request: &InterceptedRequest, response: &Response) -> Result<Self, Error> {
        let headers_json = serde_json::to_string(&response.headers).map_err(|e| Error::CorruptEntry(e.to_string()))?;
        Ok(Self {
            key_hash: request.cache_key(),
            method: request.method.clone(),
            url: request.url.to_string(),
            status: response.status,
            headers_json,
            body: response.body.to_vec(),
        })
    }

    fn upsert(&self, conn: &rusqlite::Connection, partition: &str, stored_at: &str) -> rusqlite::Result<usize> {
        conn.execute(
            "INSERT INTO entries (partition, key_hash, method, url, status, headers_json, body, stored_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(partition, key_hash) DO UPDATE SET
                method = excluded.method,
                url = excluded.url,
                status = excluded.status,
                headers_json = excluded.headers_json,
                body = excluded.body,
                stored_at = excluded.stored_at",
            params![
                partition,
                &self.key_hash,
                &self.method,
                &self.url,
                self.status as i64,
                &self.headers_json,
                &self.body,
                stored_at
            ],
        )
    }
}

fn ensure_partition(conn: &rusqlite::Connection, name: &str, now: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO partitions (name, created_at) VALUES (?1, ?2) ON CONFLICT(name) DO NOTHING",
        params![name, now],
    )
}

impl CacheDb {
    /// Open a partition, creating it if absent. Idempotent.
    pub async fn open_partition(&self, name: &str) -> Result<(), Error> {
        let name = name.to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                ensure_partition(conn, &name, &now)?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    pub async fn has_partition(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM partitions WHERE name = ?1)",
                    params![name],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    /// Names of every existing partition, oldest first.
    pub async fn partition_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM partitions ORDER BY rowid ASC")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Every partition with its entry count, oldest first.
    pub async fn partitions(&self) -> Result<Vec<PartitionInfo>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<PartitionInfo>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT p.name, COUNT(e.key_hash)
                    FROM partitions p LEFT JOIN entries e ON e.partition = p.name
                    GROUP BY p.name
                    ORDER BY p.rowid ASC",
                )?;
                let infos = stmt
                    .query_map([], |row| {
                        Ok(PartitionInfo { name: row.get(0)?, entries: row.get::<_, i64>(1)? as u64 })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(infos)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a partition and all its entries.
    ///
    /// Returns false if the partition did not exist.
    pub async fn delete_partition(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM entries WHERE partition = ?1", params![name])?;
                let deleted = tx.execute("DELETE FROM partitions WHERE name = ?1", params![name])?;
                tx.commit()?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every partition. Returns the number of partitions removed.
    pub async fn clear_all(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM entries", [])?;
                let deleted = tx.execute("DELETE FROM partitions", [])?;
                tx.commit()?;
                Ok(deleted as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Store a response under the request's identity, replacing any previous
    /// entry. Opens the partition if needed.
    pub async fn put(&self, partition: &str, request: &InterceptedRequest, response: &Response) -> Result<(), Error> {
        let entry = NewEntry::build(request, response)?;
        let partition = partition.to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                ensure_partition(&tx, &partition, &now)?;
                entry.upsert(&tx, &partition, &now)?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Store a batch in one transaction: either every entry lands or none do.
    pub async fn put_all(&self, partition: &str, entries: &[(InterceptedRequest, Response)]) -> Result<(), Error> {
        let rows = entries
            .iter()
            .map(|(request, response)| NewEntry::build(request, response))
            .collect::<Result<Vec<_>, _>>()?;
        let partition = partition.to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                ensure_partition(&tx, &partition, &now)?;
                for row in &rows {
                    row.upsert(&tx, &partition, &now)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Look up a request in one partition.
    pub async fn match_request(&self, partition: &str, request: &InterceptedRequest) -> Result<Option<Response>, Error> {
        let partition = partition.to_string();
        let key_hash = request.cache_key();
        let row = self
            .conn
            .call(move |conn| -> Result<Option<EntryRow>, Error> {
                let row = conn
                    .query_row(
                        "SELECT status, headers_json, body FROM entries WHERE partition = ?1 AND key_hash = ?2",
                        params![partition, key_hash],
                        EntryRow::from_row,
                    )
                    .optional()?;
                Ok(row)
            })
            .await
            .map_err(Error::from)?;

        row.map(EntryRow::into_response).transpose()
    }

    /// Look up a request across all partitions, oldest partition first.
    pub async fn match_any(&self, request: &InterceptedRequest) -> Result<Option<Response>, Error> {
        let key_hash = request.cache_key();
        let row = self
            .conn
            .call(move |conn| -> Result<Option<EntryRow>, Error> {
                let row = conn
                    .query_row(
                        "SELECT e.status, e.headers_json, e.body
                        FROM entries e JOIN partitions p ON p.name = e.partition
                        WHERE e.key_hash = ?1
                        ORDER BY p.rowid ASC
                        LIMIT 1",
                        params![key_hash],
                        EntryRow::from_row,
                    )
                    .optional()?;
                Ok(row)
            })
            .await
            .map_err(Error::from)?;

        row.map(EntryRow::into_response).transpose()
    }

    pub async fn entry_count(&self, partition: &str) -> Result<u64, Error> {
        let partition = partition.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM entries WHERE partition = ?1", params![partition], |row| {
                        row.get(0)
                    })?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete entries of a partition stored more than `max_age` ago.
    ///
    /// Returns the number of deleted entries.
    pub async fn purge_older_than(&self, partition: &str, max_age: chrono::Duration) -> Result<u64, Error> {
        let partition = partition.to_string();
        let cutoff = (Utc::now() - max_age).to_rfc3339();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute(
                    "DELETE FROM entries WHERE partition = ?1 AND stored_at < ?2",
                    params![partition, cutoff],
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}
