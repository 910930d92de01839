use std::collections::BTreeMap;

use cellar_check_client::{CatalogCache, CatalogTransport, ClientError};
use cellar_check_core::{PackageKey, ProductKey, VintageAttributes};

/// Day tag for golden snapshots that were backfilled from live remote state
/// instead of being observed at creation time.
pub const BACKFILLED_DAY: i32 = -1;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("no wine seo recorded for product key {0}")]
    UnresolvedWineSeo(ProductKey),
    #[error("product key {0} has no vintage tag to backfill with")]
    MissingVintageTag(ProductKey),
    #[error("no catalog state for wine seo {wine_seo}, vintage {vintage_tag}")]
    MissingRemoteState { wine_seo: String, vintage_tag: i16 },
}

/// Result of one identity-store write. Writes are first-write-wins: an
/// identical rewrite is idempotent, a conflicting rewrite is ignored and
/// reported so callers can surface it as a reconciliation anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum WriteOutcome {
    Written,
    AnomalyIgnored,
}

impl WriteOutcome {
    #[must_use]
    pub fn is_anomaly(self) -> bool {
        matches!(self, Self::AnomalyIgnored)
    }
}

/// Surrogate identifier pair assigned to one package by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageIds {
    pub product_id: i64,
    pub package_id: i64,
}

/// The attribute state considered authoritative for one natural key, plus
/// the logical day it was first observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoldenSnapshot {
    pub attributes: VintageAttributes,
    pub recorded_day: i32,
}

/// Natural-key → surrogate-key mappings discovered over one test run.
///
/// Scoped to one run and passed by reference; there is no process-global
/// state. Sound without locking only under the single-threaded execution
/// model of the oracle.
#[derive(Debug, Default)]
pub struct IdentityStore {
    wine_seos: BTreeMap<ProductKey, String>,
    package_ids: BTreeMap<PackageKey, PackageIds>,
    golden: BTreeMap<ProductKey, GoldenSnapshot>,
}

impl IdentityStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate a product key with the wine seo the catalog assigned it.
    pub fn record_wine_identity(&mut self, key: &ProductKey, wine_seo: &str) -> WriteOutcome {
        if let Some(existing) = self.wine_seos.get(key) {
            if existing == wine_seo {
                return WriteOutcome::Written;
            }
            tracing::warn!(
                "wine seo for {key} already resolved to {existing}; ignoring {wine_seo}"
            );
            return WriteOutcome::AnomalyIgnored;
        }
        self.wine_seos.insert(key.clone(), wine_seo.to_string());
        WriteOutcome::Written
    }

    #[must_use]
    pub fn wine_seo(&self, key: &ProductKey) -> Option<&str> {
        self.wine_seos.get(key).map(String::as_str)
    }

    /// Find the wine seo of any key sharing the given external wine
    /// reference. Sibling vintages resolve through here because package-level
    /// submissions do not carry the seo themselves.
    #[must_use]
    pub fn find_wine_seo_by_ref(&self, wine_ref_ext: Option<&str>) -> Option<&str> {
        let mut found = None;
        for (key, seo) in &self.wine_seos {
            if key.wine_ref_ext.as_deref() == wine_ref_ext {
                found = Some(seo.as_str());
            }
        }
        found
    }

    /// Associate a package key with its surrogate product/package id pair.
    pub fn record_package_identity(&mut self, key: &PackageKey, ids: PackageIds) -> WriteOutcome {
        if let Some(existing) = self.package_ids.get(key) {
            if *existing == ids {
                return WriteOutcome::Written;
            }
            tracing::warn!(
                "package ids for {key} already resolved to ({}, {}); ignoring ({}, {})",
                existing.product_id,
                existing.package_id,
                ids.product_id,
                ids.package_id
            );
            return WriteOutcome::AnomalyIgnored;
        }
        self.package_ids.insert(key.clone(), ids);
        WriteOutcome::Written
    }

    #[must_use]
    pub fn package_ids(&self, key: &PackageKey) -> Option<PackageIds> {
        self.package_ids.get(key).copied()
    }

    /// Record the golden attribute snapshot for a product key.
    pub fn record_golden_snapshot(
        &mut self,
        key: &ProductKey,
        attributes: VintageAttributes,
        day: i32,
    ) -> WriteOutcome {
        let candidate = GoldenSnapshot { attributes, recorded_day: day };
        if let Some(existing) = self.golden.get(key) {
            if *existing == candidate {
                return WriteOutcome::Written;
            }
            tracing::warn!("golden snapshot for {key} already recorded; ignoring rewrite");
            return WriteOutcome::AnomalyIgnored;
        }
        self.golden.insert(key.clone(), candidate);
        WriteOutcome::Written
    }

    #[must_use]
    pub fn golden_snapshot(&self, key: &ProductKey) -> Option<&GoldenSnapshot> {
        self.golden.get(key)
    }

    /// The golden snapshot for a key, backfilled from live remote state when
    /// none was recorded. A backfilled snapshot is tagged with
    /// [`BACKFILLED_DAY`] since its creation day is unknown.
    ///
    /// # Errors
    /// Returns [`StoreError::UnresolvedWineSeo`] or
    /// [`StoreError::MissingVintageTag`] when the key cannot be looked up
    /// remotely, [`StoreError::MissingRemoteState`] when the catalog has no
    /// such vintage, and any [`ClientError`] the fetch raises.
    pub fn golden_or_backfill<T: CatalogTransport>(
        &mut self,
        key: &ProductKey,
        cache: &mut CatalogCache<T>,
    ) -> Result<GoldenSnapshot, StoreError> {
        if let Some(existing) = self.golden.get(key) {
            return Ok(existing.clone());
        }

        let wine_seo = self
            .wine_seos
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::UnresolvedWineSeo(key.clone()))?;
        let vintage_tag =
            key.vintage_tag.ok_or_else(|| StoreError::MissingVintageTag(key.clone()))?;
        let attributes = cache.vintage(&wine_seo, vintage_tag)?.ok_or_else(|| {
            StoreError::MissingRemoteState { wine_seo: wine_seo.clone(), vintage_tag }
        })?;

        let snapshot = GoldenSnapshot { attributes, recorded_day: BACKFILLED_DAY };
        self.golden.insert(key.clone(), snapshot.clone());
        Ok(snapshot)
    }
}
