use chrono::Utc;
use futures::future::try_join_all;
use std::sync::Arc;

use crate::core::hexgrid::{CellId, HexGrid};
use crate::models::{HelperLocationRecord, HelperStatus, LocationUpdateRequest};
use crate::services::{KeyValueStore, StoreError};

/// Global set of helpers currently reporting AVAILABLE
pub const AVAILABLE_KEY: &str = "geo:available";

fn cell_key(cell_id: &str) -> String {
    format!("geo:cell:{}", cell_id)
}

fn location_key(helper_id: &str) -> String {
    format!("geo:loc:{}", helper_id)
}

/// Cell a helper was last indexed under; outlives the location record
fn cell_of_key(helper_id: &str) -> String {
    format!("geo:cellof:{}", helper_id)
}

/// Cell-bucketed index of helper positions
///
/// Each helper belongs to exactly one cell set (the cell of its most recent
/// location write) and has one location record that expires unless
/// refreshed by heartbeats. The cell membership is tracked under a key with
/// no expiry, so a helper returning after its record lapsed still leaves
/// its old cell. Set members whose record has expired are pruned when
/// reads come across them. Absent data reads as empty; only store faults
/// are errors.
pub struct GeoIndex {
    store: Arc<dyn KeyValueStore>,
    grid: HexGrid,
    location_ttl_secs: u64,
    max_ring_k: u32,
}

impl GeoIndex {
    pub fn new(store: Arc<dyn KeyValueStore>, grid: HexGrid, location_ttl_secs: u64, max_ring_k: u32) -> Self {
        Self {
            store,
            grid,
            location_ttl_secs,
            max_ring_k,
        }
    }

    pub fn grid(&self) -> &HexGrid {
        &self.grid
    }

    pub fn max_ring_k(&self) -> u32 {
        self.max_ring_k
    }

    pub fn cell_for(&self, lat: f64, lng: f64) -> CellId {
        self.grid.cell_for(lat, lng)
    }

    pub fn ring_around(&self, cell: CellId, k: u32) -> Vec<CellId> {
        HexGrid::ring_around(cell, k)
    }

    /// Minimal disk covering `radius_km`, capped at the configured ring limit
    pub fn cells_in_radius(&self, lat: f64, lng: f64, radius_km: f64) -> Vec<CellId> {
        self.grid.cells_in_radius(lat, lng, radius_km, self.max_ring_k)
    }

    pub async fn upsert_location(
        &self,
        helper_id: &str,
        lat: f64,
        lng: f64,
        status: HelperStatus,
    ) -> Result<HelperLocationRecord, StoreError> {
        let update = LocationUpdateRequest {
            helper_id: helper_id.to_string(),
            latitude: lat,
            longitude: lng,
            accuracy_m: None,
            status,
            current_job_id: None,
            device_id: None,
            timestamp: None,
        };
        self.apply_heartbeat(&update).await
    }

    /// Write a location heartbeat, moving the helper between cells if needed
    pub async fn apply_heartbeat(&self, update: &LocationUpdateRequest) -> Result<HelperLocationRecord, StoreError> {
        let cell = self.cell_for(update.latitude, update.longitude);
        let record = HelperLocationRecord {
            helper_id: update.helper_id.clone(),
            latitude: update.latitude,
            longitude: update.longitude,
            cell_id: cell.to_string(),
            status: update.status,
            accuracy_m: update.accuracy_m,
            current_job_id: update.current_job_id.clone(),
            device_id: update.device_id.clone(),
            last_seen: update.timestamp.unwrap_or_else(Utc::now),
        };
        let member = vec![record.helper_id.clone()];

        // First write for a helper has no previous cell
        let previous_cell = self.store.get(&cell_of_key(&record.helper_id)).await?;
        if let Some(previous_cell) = previous_cell.as_ref().filter(|c| **c != record.cell_id) {
            self.store.srem(&cell_key(previous_cell), &member).await?;
            tracing::trace!(
                "Helper {} moved from cell {} to {}",
                record.helper_id,
                previous_cell,
                record.cell_id
            );
        }

        let key = cell_key(&record.cell_id);
        self.store.sadd(&key, &member).await?;
        self.store.expire(&key, self.location_ttl_secs).await?;
        self.store.set(&cell_of_key(&record.helper_id), &record.cell_id).await?;

        if record.status.is_available() {
            self.store.sadd(AVAILABLE_KEY, &member).await?;
        } else {
            self.store.srem(AVAILABLE_KEY, &member).await?;
        }

        let json = serde_json::to_string(&record)?;
        self.store
            .set_ex(&location_key(&record.helper_id), &json, self.location_ttl_secs)
            .await?;

        tracing::debug!(
            helper_id = %record.helper_id,
            cell_id = %record.cell_id,
            status = ?record.status,
            "Location updated"
        );
        Ok(record)
    }

    /// Drop a helper from the index entirely; false if nothing was indexed
    pub async fn remove_helper(&self, helper_id: &str) -> Result<bool, StoreError> {
        let member = vec![helper_id.to_string()];
        let previous_cell = self.store.get(&cell_of_key(helper_id)).await?;

        if let Some(previous_cell) = previous_cell.as_ref() {
            self.store.srem(&cell_key(previous_cell), &member).await?;
        }
        let was_available = self.store.srem(AVAILABLE_KEY, &member).await? > 0;
        let deleted = self
            .store
            .delete(&[location_key(helper_id), cell_of_key(helper_id)])
            .await?
            > 0;

        tracing::debug!("Removed helper {} from geo index", helper_id);
        Ok(previous_cell.is_some() || was_available || deleted)
    }

    /// Drop index entries of helpers whose location record has expired
    ///
    /// Records are re-read first so a heartbeat landing after the caller's
    /// read keeps its helper. Returns how many helpers were pruned.
    pub async fn prune_stale(&self, helper_ids: &[String]) -> Result<usize, StoreError> {
        if helper_ids.is_empty() {
            return Ok(0);
        }
        let keys: Vec<String> = helper_ids.iter().map(|id| location_key(id)).collect();
        let stale: Vec<String> = self
            .store
            .mget(&keys)
            .await?
            .into_iter()
            .zip(helper_ids)
            .filter(|(value, _)| value.is_none())
            .map(|(_, helper_id)| helper_id.clone())
            .collect();
        if stale.is_empty() {
            return Ok(0);
        }

        let cell_of_keys: Vec<String> = stale.iter().map(|id| cell_of_key(id)).collect();
        let cells = self.store.mget(&cell_of_keys).await?;
        for (helper_id, cell) in stale.iter().zip(cells) {
            if let Some(cell) = cell {
                self.store.srem(&cell_key(&cell), std::slice::from_ref(helper_id)).await?;
            }
        }
        self.store.srem(AVAILABLE_KEY, &stale).await?;
        self.store.delete(&cell_of_keys).await?;

        tracing::debug!("Pruned {} stale helpers from geo index", stale.len());
        Ok(stale.len())
    }

    pub async fn location(&self, helper_id: &str) -> Result<Option<HelperLocationRecord>, StoreError> {
        match self.store.get(&location_key(helper_id)).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Batch-fetch location records in input order
    ///
    /// Missing or unreadable records come back as `None`.
    pub async fn locations(&self, helper_ids: &[String]) -> Result<Vec<Option<HelperLocationRecord>>, StoreError> {
        let keys: Vec<String> = helper_ids.iter().map(|id| location_key(id)).collect();
        let values = self.store.mget(&keys).await?;

        Ok(values
            .into_iter()
            .zip(helper_ids)
            .map(|(value, helper_id)| {
                value.and_then(|json| match serde_json::from_str(&json) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        tracing::warn!("Skipping unreadable location for {}: {}", helper_id, e);
                        None
                    }
                })
            })
            .collect())
    }

    /// Helper ids in a cell, sorted
    pub async fn helpers_in_cell(&self, cell: CellId) -> Result<Vec<String>, StoreError> {
        let mut members = self.store.smembers(&cell_key(&cell.to_string())).await?;
        members.sort();
        Ok(members)
    }

    /// Members of several cells, fetched concurrently, in input order
    pub async fn helpers_in_cells(&self, cells: &[CellId]) -> Result<Vec<Vec<String>>, StoreError> {
        try_join_all(cells.iter().map(|cell| self.helpers_in_cell(*cell))).await
    }

    /// Helpers reporting AVAILABLE with a live location record
    pub async fn available_count(&self) -> Result<u64, StoreError> {
        let members = self.store.smembers(AVAILABLE_KEY).await?;
        if members.is_empty() {
            return Ok(0);
        }
        let records = self.locations(&members).await?;

        let mut live = 0;
        let mut expired = Vec::new();
        for (helper_id, record) in members.into_iter().zip(records) {
            match record {
                Some(record) if record.status.is_available() => live += 1,
                Some(_) => {}
                None => expired.push(helper_id),
            }
        }
        self.prune_stale(&expired).await?;
        Ok(live)
    }

    pub async fn is_available(&self, helper_id: &str) -> Result<bool, StoreError> {
        if !self.store.sismember(AVAILABLE_KEY, helper_id).await? {
            return Ok(false);
        }
        match self.location(helper_id).await? {
            Some(record) => Ok(record.status.is_available()),
            None => {
                self.prune_stale(&[helper_id.to_string()]).await?;
                Ok(false)
            }
        }
    }
}
