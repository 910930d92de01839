use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use cellar_check_client::{
    CatalogCache, CatalogTransport, GroupedSubmissionOutcome, SubmissionOutcome,
};
use cellar_check_core::{
    compare_packages, compare_products, compare_wine_attributes, compare_wine_profile,
    product_display_name, wine_name_prefix, CaseLog, PackageKey, PackageRecord, ProductInfo,
    ProductKey, SubmissionRow, VintageAttributes,
};
use cellar_check_store::{IdentityStore, PackageIds, StoreError};
use serde::{Deserialize, Serialize};

/// Submission phase of one fixture row: `A` stages a candidate change, `B`
/// finalizes it and may promote it to a new wine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Phase {
    #[serde(rename = "A")]
    Propose,
    #[serde(rename = "B")]
    Commit,
}

impl Phase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Propose => "A",
            Self::Commit => "B",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "A" => Some(Self::Propose),
            "B" => Some(Self::Commit),
            _ => None,
        }
    }
}

/// One fixture line: the submission payload plus the expectations around it.
/// The three `new_*` flags are mutated during reconciliation, not fixed at
/// load time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingRow {
    pub submission: SubmissionRow,
    pub index: usize,
    pub phase: Phase,
    pub expect_success: bool,
    #[serde(default)]
    pub reject_reason: Option<String>,
    #[serde(default)]
    pub disappear: bool,
    #[serde(default)]
    pub new_wine: bool,
    #[serde(default)]
    pub new_vintage: bool,
    #[serde(default)]
    pub new_package: bool,
}

/// All pending rows of one supplier for one logical day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SupplierBatch {
    pub supplier_id: String,
    pub day: i32,
    pub rows: Vec<PendingRow>,
}

/// One day-zero seed line: a pre-existing catalog row the store absorbs
/// without submission. Surrogate identifiers are already known; the
/// natural-key parts are optional.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeedRow {
    pub index: usize,
    pub supplier_id: String,
    pub untouched: bool,
    pub wine_seo: String,
    pub product_id: i64,
    pub package_id: i64,
    #[serde(default)]
    pub wine_ref_ext: Option<String>,
    pub vintage_tag: i16,
    #[serde(default)]
    pub package_type: Option<String>,
    #[serde(default)]
    pub package_ref_ext: Option<String>,
}

/// Day-zero rows of one supplier, with the fixture's touched/untouched
/// partition flag.
#[derive(Debug, Clone, PartialEq)]
pub struct DayZeroGroup {
    pub untouched: bool,
    pub batch: SupplierBatch,
}

/// Expected per-vintage package count for one day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VintageSummary {
    pub vintage_tag: i16,
    pub package_count: usize,
}

/// Expected per-wine vintage counts for one day, keyed by the synthesized
/// wine name prefix.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WineSummary {
    pub name: String,
    pub vintage_count: usize,
    pub vintages: Vec<VintageSummary>,
}

/// Fixture-declared expected counts for one day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DaySummary {
    pub day: i32,
    pub new_wine_count: usize,
    pub wines: Vec<WineSummary>,
}

/// Lookup table over the fixture's per-day summaries. Days need not be
/// contiguous.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SummaryTable {
    days: Vec<DaySummary>,
}

impl SummaryTable {
    #[must_use]
    pub fn new(days: Vec<DaySummary>) -> Self {
        Self { days }
    }

    #[must_use]
    pub fn day(&self, day: i32) -> Option<&DaySummary> {
        self.days.iter().find(|summary| summary.day == day)
    }

    #[must_use]
    pub fn wine(&self, day: i32, name: &str) -> Option<&WineSummary> {
        self.day(day)?.wines.iter().find(|wine| wine.name == name)
    }

    #[must_use]
    pub fn vintage(&self, day: i32, name: &str, vintage_tag: i16) -> Option<&VintageSummary> {
        self.wine(day, name)?
            .vintages
            .iter()
            .find(|vintage| vintage.vintage_tag == vintage_tag)
    }
}

/// Phase-A rows of one supplier/day, ready for the propose call. Rows
/// flagged `disappear` are withheld from submission.
#[must_use]
pub fn collect_propose_rows(
    batches: &[SupplierBatch],
    supplier_id: &str,
    day: i32,
) -> Option<Vec<SubmissionRow>> {
    let rows: Vec<SubmissionRow> = batches
        .iter()
        .filter(|batch| batch.day == day && batch.supplier_id == supplier_id)
        .flat_map(|batch| &batch.rows)
        .filter(|row| row.phase == Phase::Propose && !row.disappear)
        .map(|row| row.submission.clone())
        .collect();
    if rows.is_empty() {
        None
    } else {
        Some(rows)
    }
}

/// Phase-B rows of every supplier of one day, grouped by supplier id, ready
/// for the commit call.
#[must_use]
pub fn collect_commit_map(
    batches: &[SupplierBatch],
    day: i32,
) -> Option<BTreeMap<String, Vec<SubmissionRow>>> {
    let mut map: BTreeMap<String, Vec<SubmissionRow>> = BTreeMap::new();
    for batch in batches.iter().filter(|batch| batch.day == day) {
        for row in &batch.rows {
            if row.phase == Phase::Commit && !row.disappear {
                map.entry(batch.supplier_id.clone()).or_default().push(row.submission.clone());
            }
        }
    }
    if map.is_empty() {
        None
    } else {
        Some(map)
    }
}

/// True when any supplier has a phase-A row on this day, so the driver can
/// skip the propose call entirely otherwise.
#[must_use]
pub fn has_propose_rows(batches: &[SupplierBatch], day: i32) -> bool {
    batches
        .iter()
        .filter(|batch| batch.day == day)
        .any(|batch| batch.rows.iter().any(|row| row.phase == Phase::Propose))
}

fn surrogate_ids(response: &SubmissionRow, index: usize) -> Result<PackageIds> {
    let product_id = response
        .product_id
        .ok_or_else(|| anyhow!("index {index}: processed row carries no product id"))?;
    let package_id = response
        .package_id
        .ok_or_else(|| anyhow!("index {index}: processed row carries no package id"))?;
    Ok(PackageIds { product_id, package_id })
}

/// Matches server response rows back to pending fixture rows by package key
/// and drives every identity-store mutation of the run.
pub struct Correlator<'a, T: CatalogTransport> {
    store: &'a mut IdentityStore,
    cache: &'a mut CatalogCache<T>,
    log: &'a mut CaseLog,
}

impl<'a, T: CatalogTransport> Correlator<'a, T> {
    pub fn new(
        store: &'a mut IdentityStore,
        cache: &'a mut CatalogCache<T>,
        log: &'a mut CaseLog,
    ) -> Self {
        Self { store, cache, log }
    }

    /// Fold one flat propose response into the matching phase-A rows of one
    /// supplier/day. Response entries with no matching pending row, and
    /// pending rows with no matching entry, are left alone: partial batches
    /// are expected, and unset surrogate fields fail hard at comparison
    /// time.
    ///
    /// # Errors
    /// Returns an error when a processed entry is missing its surrogate
    /// identifiers, or when a lazy golden-snapshot backfill fails remotely.
    pub fn apply_propose_outcome(
        &mut self,
        batches: &mut [SupplierBatch],
        outcome: &SubmissionOutcome,
        day: i32,
        supplier_id: &str,
    ) -> Result<()> {
        for batch in batches
            .iter_mut()
            .filter(|batch| batch.supplier_id == supplier_id && batch.day == day)
        {
            for row in &mut batch.rows {
                if row.phase != Phase::Propose {
                    continue;
                }
                let key = row.submission.package_key();

                if let Some(response) =
                    outcome.processed.iter().find(|entry| entry.package_key() == key)
                {
                    let ids = surrogate_ids(response, row.index)?;
                    row.submission.product_id = Some(ids.product_id);
                    row.submission.package_id = Some(ids.package_id);
                    if self.store.record_package_identity(&key, ids).is_anomaly() {
                        self.log.append(format!(
                            "Index {}: package identity re-derived differently",
                            row.index
                        ));
                    }
                    self.update_identity(row, response, day)?;
                }

                if let Some(response) =
                    outcome.rejected.iter().find(|entry| entry.package_key() == key)
                {
                    row.submission.error_message = Some(
                        response
                            .error_message
                            .clone()
                            .unwrap_or_else(|| "rejected without a reason".to_string()),
                    );
                }
            }
        }
        Ok(())
    }

    /// Fold one supplier-grouped commit response into the matching phase-B
    /// rows of one day. A processed entry carrying a wine seo promotes its
    /// row to "new wine" even when the fixture did not predict one; the
    /// transition is logged as informational rather than rejected.
    ///
    /// # Errors
    /// Returns an error when a processed entry is missing its surrogate
    /// identifiers, when a new wine's entry carries no vintage attributes,
    /// or when a lazy golden-snapshot backfill fails remotely.
    pub fn apply_commit_outcome(
        &mut self,
        batches: &mut [SupplierBatch],
        outcome: &GroupedSubmissionOutcome,
        day: i32,
    ) -> Result<()> {
        for batch in batches.iter_mut().filter(|batch| batch.day == day) {
            let supplier_id = batch.supplier_id.clone();
            for row in &mut batch.rows {
                if row.phase != Phase::Commit {
                    continue;
                }
                let key = row.submission.package_key();

                let processed = outcome
                    .processed
                    .get(&supplier_id)
                    .and_then(|entries| entries.iter().find(|entry| entry.package_key() == key));
                if let Some(response) = processed {
                    if response.wine_seo.is_some() && !row.new_wine {
                        if row.submission.wine_seo.is_none() {
                            self.log.append(format!("Index {}: It is a new wine", row.index));
                        }
                        row.new_wine = true;
                    }
                    if row.new_wine {
                        match &response.wine_seo {
                            None => {
                                self.log
                                    .append(format!("Index {}: It is not a new wine", row.index));
                            }
                            Some(wine_seo) => {
                                row.submission.wine_seo = Some(wine_seo.clone());
                                if self
                                    .store
                                    .record_wine_identity(&key.product, wine_seo)
                                    .is_anomaly()
                                {
                                    self.log.append(format!(
                                        "Index {}: wine seo re-derived differently",
                                        row.index
                                    ));
                                }
                                let vintage = response.vintage.clone().ok_or_else(|| {
                                    anyhow!(
                                        "index {}: processed new wine carries no vintage attributes",
                                        row.index
                                    )
                                })?;
                                if self
                                    .store
                                    .record_golden_snapshot(&key.product, vintage, day)
                                    .is_anomaly()
                                {
                                    self.log.append(format!(
                                        "Index {}: golden snapshot re-derived differently",
                                        row.index
                                    ));
                                }
                            }
                        }
                    } else {
                        self.update_identity(row, response, day)?;
                    }

                    let ids = surrogate_ids(response, row.index)?;
                    row.submission.product_id = Some(ids.product_id);
                    row.submission.package_id = Some(ids.package_id);
                    if self.store.record_package_identity(&key, ids).is_anomaly() {
                        self.log.append(format!(
                            "Index {}: package identity re-derived differently",
                            row.index
                        ));
                    }
                }

                let rejected = outcome
                    .rejected
                    .get(&supplier_id)
                    .and_then(|entries| entries.iter().find(|entry| entry.package_key() == key));
                if let Some(response) = rejected {
                    row.submission.error_message = Some(
                        response
                            .error_message
                            .clone()
                            .unwrap_or_else(|| "rejected without a reason".to_string()),
                    );
                }
            }
        }
        Ok(())
    }

    /// Shared identity-update routine for confirmed non-new-wine rows.
    fn update_identity(
        &mut self,
        row: &mut PendingRow,
        response: &SubmissionRow,
        day: i32,
    ) -> Result<()> {
        let product_key = ProductKey::from_package(&row.submission.package);

        if row.new_wine && self.store.wine_seo(&product_key).is_some() {
            self.log.append(format!("Index {}: This is not a new wine", row.index));
        }

        if response.vintage.is_some() && !row.new_vintage {
            if row.phase != Phase::Commit {
                self.log.append(format!("Index {}: This is a new vintage", row.index));
            }
            row.new_vintage = true;
        }

        // Package-level submissions never carry the wine seo themselves; it
        // is inherited from any sibling vintage already resolved in this run.
        let sibling_seo = self
            .store
            .find_wine_seo_by_ref(product_key.wine_ref_ext.as_deref())
            .map(str::to_string);
        match sibling_seo {
            Some(wine_seo) => {
                if self.store.record_wine_identity(&product_key, &wine_seo).is_anomaly() {
                    self.log.append(format!(
                        "Index {}: wine seo re-derived differently",
                        row.index
                    ));
                }
                row.submission.wine_seo = Some(wine_seo);
            }
            None => {
                tracing::debug!(
                    "index {}: no resolved wine seo to inherit for {product_key}",
                    row.index
                );
            }
        }

        if row.new_vintage {
            if self.store.golden_snapshot(&product_key).is_some() {
                self.log.append(format!("Index {}: This is not a new vintage", row.index));
            } else if let Some(vintage) = row.submission.vintage.clone() {
                let _ = self.store.record_golden_snapshot(&product_key, vintage, day);
            }
        }

        if self.store.golden_snapshot(&product_key).is_none() {
            match self.store.golden_or_backfill(&product_key, self.cache) {
                Ok(_) => {}
                Err(StoreError::UnresolvedWineSeo(_) | StoreError::MissingVintageTag(_)) => {
                    self.log.append(format!(
                        "Index {}: golden snapshot cannot be backfilled for an unresolved key",
                        row.index
                    ));
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    /// Absorb the fixture's day-zero list without submission: fetch the live
    /// state of each seed row, build a day-0 pending row from it, and record
    /// the identities first-write-wins when the natural-key parts are known.
    ///
    /// # Errors
    /// Returns an error when a seed row's live state cannot be fetched or is
    /// absent from the catalog.
    pub fn seed_day_zero(&mut self, seeds: &[SeedRow]) -> Result<Vec<DayZeroGroup>> {
        let mut groups: Vec<DayZeroGroup> = Vec::new();
        for seed in seeds {
            let attributes = self
                .cache
                .vintage(&seed.wine_seo, seed.vintage_tag)?
                .ok_or_else(|| {
                    anyhow!(
                        "day zero wine {} vintage {} not found in catalog",
                        seed.wine_seo,
                        seed.vintage_tag
                    )
                })?;
            let mut package = self
                .cache
                .package(seed.product_id, seed.package_id)?
                .ok_or_else(|| {
                    anyhow!(
                        "day zero package ({}, {}) not found in catalog",
                        seed.product_id,
                        seed.package_id
                    )
                })?;
            package.stock.vintage_tag = Some(seed.vintage_tag);

            let row = PendingRow {
                submission: SubmissionRow {
                    package: package.stock,
                    vintage: Some(attributes.clone()),
                    wine_seo: Some(seed.wine_seo.clone()),
                    product_id: Some(seed.product_id),
                    package_id: Some(seed.package_id),
                    error_message: None,
                },
                index: seed.index,
                phase: Phase::Propose,
                expect_success: true,
                reject_reason: None,
                disappear: false,
                new_wine: false,
                new_vintage: false,
                new_package: false,
            };

            if seed.wine_ref_ext.is_some() && seed.package_type.is_some() {
                let product_key =
                    ProductKey::new(seed.wine_ref_ext.clone(), Some(seed.vintage_tag));
                let package_key = PackageKey::new(
                    product_key.clone(),
                    seed.package_type.clone(),
                    seed.package_ref_ext.clone(),
                );
                if self.store.wine_seo(&product_key).is_none() {
                    let _ = self.store.record_wine_identity(&product_key, &seed.wine_seo);
                }
                if self.store.golden_snapshot(&product_key).is_none() {
                    let _ = self.store.record_golden_snapshot(&product_key, attributes, 0);
                }
                if self.store.package_ids(&package_key).is_none() {
                    let _ = self.store.record_package_identity(
                        &package_key,
                        PackageIds { product_id: seed.product_id, package_id: seed.package_id },
                    );
                }
            }

            match groups.last_mut() {
                Some(group)
                    if group.batch.supplier_id == seed.supplier_id
                        && group.untouched == seed.untouched =>
                {
                    group.batch.rows.push(row);
                }
                _ => groups.push(DayZeroGroup {
                    untouched: seed.untouched,
                    batch: SupplierBatch {
                        supplier_id: seed.supplier_id.clone(),
                        day: 0,
                        rows: vec![row],
                    },
                }),
            }
        }
        Ok(groups)
    }
}

/// Runs the post-submission checks of one fixture row against live remote
/// state. Every sub-check runs; their verdicts are AND-ed so a single
/// failure never hides the rest.
pub struct FactorChecker<'a, T: CatalogTransport> {
    store: &'a mut IdentityStore,
    cache: &'a mut CatalogCache<T>,
    log: &'a mut CaseLog,
}

impl<'a, T: CatalogTransport> FactorChecker<'a, T> {
    pub fn new(
        store: &'a mut IdentityStore,
        cache: &'a mut CatalogCache<T>,
        log: &'a mut CaseLog,
    ) -> Self {
        Self { store, cache, log }
    }

    /// Composite check for one row: package state, vintage attributes
    /// against the golden snapshot, product name, wine profile,
    /// vintage/package counts against the fixture summary, sold-out state,
    /// and the global wine count.
    ///
    /// Unset surrogate fields (a row the server never confirmed) fail hard.
    ///
    /// # Errors
    /// Returns an error only for terminal remote failures; comparison
    /// mismatches come back as `Ok(false)` with the diffs in the case log.
    pub fn check_common_factors(
        &mut self,
        row: &PendingRow,
        supplier_id: &str,
        day: i32,
        summary: &SummaryTable,
        initial_count: usize,
    ) -> Result<bool> {
        let Some(vintage_tag) = row.submission.package.vintage_tag else {
            self.log.append(format!("Index {}: row carries no vintage tag", row.index));
            return Ok(false);
        };
        let Some(wine_seo) = row.submission.wine_seo.clone() else {
            self.log.append(format!("Index {}: wine seo was never resolved", row.index));
            return Ok(false);
        };
        let Some(product_id) = row.submission.product_id else {
            self.log
                .append(format!("Index {}: surrogate product id was never assigned", row.index));
            return Ok(false);
        };

        let mut check = true;

        if !self.check_package_level(supplier_id, row)? {
            check = false;
        }

        let key = ProductKey::from_package(&row.submission.package);
        let golden = match self.store.golden_or_backfill(&key, self.cache) {
            Ok(golden) => golden,
            Err(StoreError::Client(err)) => return Err(err.into()),
            Err(err) => {
                self.log.append(format!("Index {}: {err}", row.index));
                return Ok(false);
            }
        };

        if !self.check_vintage_level(row, &wine_seo, vintage_tag, product_id, &golden.attributes)? {
            check = false;
        }

        let (winery, label) = row
            .submission
            .vintage
            .as_ref()
            .map_or((None, None), |vintage| (vintage.winery.as_deref(), vintage.label.as_deref()));
        if !self.check_product_level(winery, label, vintage_tag, product_id)? {
            check = false;
        }

        if !self.check_wine_profile(&wine_seo, vintage_tag, product_id, &golden.attributes)? {
            check = false;
        }

        let name = wine_name_prefix(winery, label);
        if !self.check_counts(summary, day, &name, vintage_tag, &wine_seo, product_id)? {
            check = false;
        }

        if !self.check_sold_out(row)? {
            check = false;
        }

        let expected_total =
            initial_count + summary.day(day).map_or(0, |summary| summary.new_wine_count);
        if !self.check_wine_count(expected_total)? {
            check = false;
        }

        Ok(check)
    }

    fn check_package_level(&mut self, supplier_id: &str, row: &PendingRow) -> Result<bool> {
        let (Some(product_id), Some(package_id)) =
            (row.submission.product_id, row.submission.package_id)
        else {
            self.log
                .append(format!("Index {}: surrogate package ids were never assigned", row.index));
            return Ok(false);
        };

        let mut expected_stock = row.submission.package.clone();
        if row.disappear {
            expected_stock.quantity = Some(0);
        }
        let expected =
            PackageRecord { supplier_seo: Some(supplier_id.to_string()), stock: expected_stock };

        let Some(actual) = self.cache.package(product_id, package_id)? else {
            self.log.append("Retrieving package data failed");
            return Ok(false);
        };
        if actual.supplier_seo.as_deref() != Some(supplier_id) {
            self.log.append("Supplier seo for this package is wrong");
            return Ok(false);
        }

        let verdict = compare_packages(&expected, &actual);
        if !verdict.passed() {
            self.log.append_verdict(&verdict);
            self.log.append("Package level attribute test failed");
        }
        Ok(verdict.passed())
    }

    fn check_vintage_level(
        &mut self,
        row: &PendingRow,
        wine_seo: &str,
        vintage_tag: i16,
        product_id: i64,
        golden: &VintageAttributes,
    ) -> Result<bool> {
        let Some(actual) = self.fetch_vintage_with_fallback(wine_seo, vintage_tag, product_id)?
        else {
            self.log.append(format!(
                "Vintage data for {wine_seo}, vintage {vintage_tag} is missing from the catalog"
            ));
            return Ok(false);
        };

        // A new vintage is checked against the row's own submitted data; an
        // existing one against the golden snapshot.
        let expected = if row.new_vintage { row.submission.vintage.as_ref() } else { Some(golden) };
        let Some(expected) = expected else {
            self.log.append(format!(
                "Index {}: row claims a new vintage but carries no vintage data",
                row.index
            ));
            return Ok(false);
        };

        let verdict = compare_wine_attributes(expected, &actual);
        if !verdict.passed() {
            self.log.append(format!(
                "Vintage data for {wine_seo}, vintage {vintage_tag} is different from the catalog"
            ));
            self.log.append_verdict(&verdict);
        }
        Ok(verdict.passed())
    }

    fn check_product_level(
        &mut self,
        winery: Option<&str>,
        label: Option<&str>,
        vintage_tag: i16,
        product_id: i64,
    ) -> Result<bool> {
        let Some(entry) = self.cache.product(product_id)? else {
            self.log.append("Retrieving product data failed");
            return Ok(false);
        };
        let expected = ProductInfo {
            product_id: Some(product_id),
            name: Some(product_display_name(winery, label, vintage_tag)),
        };
        let verdict = compare_products(&expected, &entry.info);
        self.log.append_verdict(&verdict);
        Ok(verdict.passed())
    }

    fn check_wine_profile(
        &mut self,
        wine_seo: &str,
        vintage_tag: i16,
        product_id: i64,
        golden: &VintageAttributes,
    ) -> Result<bool> {
        let Some(actual) = self.fetch_vintage_with_fallback(wine_seo, vintage_tag, product_id)?
        else {
            self.log.append(format!("Wine data for {wine_seo} is missing from the catalog"));
            return Ok(false);
        };
        let verdict = compare_wine_profile(golden, &actual);
        self.log.append_verdict(&verdict);
        Ok(verdict.passed())
    }

    fn check_counts(
        &mut self,
        summary: &SummaryTable,
        day: i32,
        name: &str,
        vintage_tag: i16,
        wine_seo: &str,
        product_id: i64,
    ) -> Result<bool> {
        let expected_vintages = summary.wine(day, name).map_or(0, |wine| wine.vintage_count);
        let actual_vintages = self.cache.wine_by_seo(wine_seo)?.map_or(0, |by_tag| by_tag.len());
        if actual_vintages != expected_vintages {
            self.log.append(format!(
                "The vintage count for this wine is wrong expected: {expected_vintages}, actual: {actual_vintages}"
            ));
            return Ok(false);
        }

        let expected_packages =
            summary.vintage(day, name, vintage_tag).map_or(0, |vintage| vintage.package_count);
        let actual_packages =
            self.cache.product(product_id)?.map_or(0, |entry| entry.packages.len());
        if actual_packages != expected_packages {
            self.log.append(format!(
                "The package count for this wine is wrong expected: {expected_packages}, actual: {actual_packages}"
            ));
            return Ok(false);
        }
        Ok(true)
    }

    /// Sold-out agreement: a zero submitted quantity, or the fixture's
    /// disappear flag, must match the remote out-of-stock state.
    ///
    /// # Errors
    /// Returns an error only for terminal remote failures.
    pub fn check_sold_out(&mut self, row: &PendingRow) -> Result<bool> {
        let (Some(product_id), Some(package_id)) =
            (row.submission.product_id, row.submission.package_id)
        else {
            self.log
                .append(format!("Index {}: surrogate package ids were never assigned", row.index));
            return Ok(false);
        };

        let actual_sold_out = match self.cache.package(product_id, package_id)? {
            Some(package) => package.stock.quantity == Some(0),
            None => {
                self.log.append(format!(
                    "No such package is found with product id {product_id}, package id {package_id}"
                ));
                false
            }
        };
        let expected_sold_out = row.submission.package.quantity == Some(0) || row.disappear;
        if expected_sold_out != actual_sold_out {
            let direction = if expected_sold_out {
                "to be sold out but was in stock"
            } else {
                "to be in stock but it was sold out"
            };
            self.log.append(format!(
                "Package with package id {package_id} was expected {direction}"
            ));
        }
        Ok(expected_sold_out == actual_sold_out)
    }

    fn check_wine_count(&mut self, expected: usize) -> Result<bool> {
        let actual = self.cache.wine_seo_list()?.map_or(0, |seos| seos.len());
        if actual != expected {
            self.log.append(format!(
                "The total count of wine expected ({expected}) is different from actual ({actual})"
            ));
            return Ok(false);
        }
        Ok(true)
    }

    fn fetch_vintage_with_fallback(
        &mut self,
        wine_seo: &str,
        vintage_tag: i16,
        product_id: i64,
    ) -> Result<Option<VintageAttributes>> {
        if let Some(attributes) = self.cache.vintage(wine_seo, vintage_tag)? {
            return Ok(Some(attributes));
        }
        Ok(self
            .cache
            .wine_by_product(product_id)?
            .and_then(|by_tag| by_tag.get(&vintage_tag).cloned()))
    }
}

/// Serializes per-day submission payloads to pretty-printed JSON files for
/// audit. A pure side-effect sink with no feedback into the oracle.
pub struct AuditSink {
    base_dir: PathBuf,
}

impl AuditSink {
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    /// Write one supplier's propose payload under
    /// `day-<N>/propose/<supplier>.json`. An existing file is left as-is.
    ///
    /// # Errors
    /// Returns an error when the directory or file cannot be written.
    pub fn write_propose(
        &self,
        day: i32,
        supplier_seo: &str,
        rows: &[SubmissionRow],
    ) -> Result<PathBuf> {
        let dir = self.base_dir.join(format!("day-{day}")).join("propose");
        fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        let path = dir.join(format!("{supplier_seo}.json"));
        if !path.exists() {
            let json = serde_json::to_string_pretty(rows)?;
            fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
        }
        Ok(path)
    }

    /// Write one day's commit payload under `day-<N>/commit/<index>.json`
    /// with the first free index.
    ///
    /// # Errors
    /// Returns an error when the directory or file cannot be written.
    pub fn write_commit(
        &self,
        day: i32,
        batches: &BTreeMap<String, Vec<SubmissionRow>>,
    ) -> Result<PathBuf> {
        let dir = self.base_dir.join(format!("day-{day}")).join("commit");
        fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        let mut index = 1_u32;
        let mut path = dir.join(format!("{index}.json"));
        while path.exists() {
            index += 1;
            path = dir.join(format!("{index}.json"));
        }
        let json = serde_json::to_string_pretty(batches)?;
        fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
        Ok(path)
    }
}
