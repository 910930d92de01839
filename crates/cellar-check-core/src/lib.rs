use std::fmt::{Display, Formatter};

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Vintage tag the catalog uses for non-vintage wines.
pub const NON_VINTAGE_TAG: i16 = 1001;

/// Natural key of one wine vintage: the supplier-scoped external wine
/// reference plus the vintage tag. Both fields are nullable and a null is a
/// distinct, hashable value of its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProductKey {
    pub wine_ref_ext: Option<String>,
    pub vintage_tag: Option<i16>,
}

impl ProductKey {
    #[must_use]
    pub fn new(wine_ref_ext: Option<String>, vintage_tag: Option<i16>) -> Self {
        Self { wine_ref_ext, vintage_tag }
    }

    #[must_use]
    pub fn from_package(stock: &PackageAttributes) -> Self {
        Self {
            wine_ref_ext: stock.wine_ref_ext.clone(),
            vintage_tag: stock.vintage_tag,
        }
    }
}

impl Display for ProductKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}#{}",
            self.wine_ref_ext.as_deref().unwrap_or("-"),
            self.vintage_tag.map_or_else(|| "-".to_string(), |tag| tag.to_string())
        )
    }
}

/// Natural key of one package row: the product key folded first, then the
/// package type and the package external reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageKey {
    pub product: ProductKey,
    pub package_type: Option<String>,
    pub package_ref_ext: Option<String>,
}

impl PackageKey {
    #[must_use]
    pub fn new(
        product: ProductKey,
        package_type: Option<String>,
        package_ref_ext: Option<String>,
    ) -> Self {
        Self { product, package_type, package_ref_ext }
    }

    #[must_use]
    pub fn from_package(stock: &PackageAttributes) -> Self {
        Self {
            product: ProductKey::from_package(stock),
            package_type: stock.package_type.clone(),
            package_ref_ext: stock.package_ref_ext.clone(),
        }
    }
}

impl Display for PackageKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.product,
            self.package_type.as_deref().unwrap_or("-"),
            self.package_ref_ext.as_deref().unwrap_or("-")
        )
    }
}

/// One critic rating of a vintage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WineRating {
    #[serde(rename = "criticsSeo", skip_serializing_if = "Option::is_none", default)]
    pub critic_seo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub score: Option<String>,
}

/// One varietal component of a vintage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WineVarietal {
    #[serde(rename = "varietalSeo", skip_serializing_if = "Option::is_none", default)]
    pub varietal_seo: Option<String>,
    #[serde(rename = "numVal", skip_serializing_if = "Option::is_none", default)]
    pub numeric_value: Option<i16>,
}

/// Denormalized wine + winery + vintage attributes as the catalog reports
/// them. Treated as a value type; identity lives in the keys above.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VintageAttributes {
    #[serde(rename = "typeSeo", skip_serializing_if = "Option::is_none", default)]
    pub wine_type_seo: Option<String>,
    #[serde(rename = "winerySeo", skip_serializing_if = "Option::is_none", default)]
    pub winery_seo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub winery: Option<String>,
    #[serde(rename = "wineryNote", skip_serializing_if = "Option::is_none", default)]
    pub winery_note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub label: Option<String>,
    #[serde(rename = "regionSeo", skip_serializing_if = "Option::is_none", default)]
    pub region_seo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub region: Option<String>,
    #[serde(rename = "countrySeo", skip_serializing_if = "Option::is_none", default)]
    pub country_seo: Option<String>,
    #[serde(rename = "vinNote", skip_serializing_if = "Option::is_none", default)]
    pub vintage_note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub alcohol: Option<i16>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub appellation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ratings: Option<Vec<WineRating>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub varietals: Option<Vec<WineVarietal>>,
}

/// Package-level price/stock attributes of one submission line.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackageAttributes {
    #[serde(rename = "wineRefEXT", skip_serializing_if = "Option::is_none", default)]
    pub wine_ref_ext: Option<String>,
    #[serde(rename = "vintageTag", skip_serializing_if = "Option::is_none", default)]
    pub vintage_tag: Option<i16>,
    #[serde(rename = "pckgType", skip_serializing_if = "Option::is_none", default)]
    pub package_type: Option<String>,
    #[serde(rename = "pckgRefEXT", skip_serializing_if = "Option::is_none", default)]
    pub package_ref_ext: Option<String>,
    #[serde(rename = "pckgName", skip_serializing_if = "Option::is_none", default)]
    pub package_name: Option<String>,
    #[serde(rename = "hrDlvMin", skip_serializing_if = "Option::is_none", default)]
    pub delivery_hours_min: Option<i64>,
    #[serde(rename = "hrDlvMax", skip_serializing_if = "Option::is_none", default)]
    pub delivery_hours_max: Option<i64>,
    #[serde(rename = "qty", skip_serializing_if = "Option::is_none", default)]
    pub quantity: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub price: Option<Decimal>,
}

/// A package as the catalog stores it: the supplier that owns it plus its
/// price/stock attributes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackageRecord {
    #[serde(rename = "supplierSeo", skip_serializing_if = "Option::is_none", default)]
    pub supplier_seo: Option<String>,
    pub stock: PackageAttributes,
}

/// Product-level identity: surrogate id plus display name.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProductInfo {
    #[serde(rename = "productId", skip_serializing_if = "Option::is_none", default)]
    pub product_id: Option<i64>,
    #[serde(rename = "productName", skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,
}

/// One package-level submission line as it crosses the datafeed boundary in
/// both directions: the oracle submits it, and the server echoes it back in
/// the processed/rejected partitions with surrogate identifiers (and, for
/// new wines, full vintage attributes) filled in.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubmissionRow {
    #[serde(rename = "pdpk")]
    pub package: PackageAttributes,
    #[serde(rename = "vin", skip_serializing_if = "Option::is_none", default)]
    pub vintage: Option<VintageAttributes>,
    #[serde(rename = "wineSeo", skip_serializing_if = "Option::is_none", default)]
    pub wine_seo: Option<String>,
    #[serde(rename = "productId", skip_serializing_if = "Option::is_none", default)]
    pub product_id: Option<i64>,
    #[serde(rename = "prodpckgId", skip_serializing_if = "Option::is_none", default)]
    pub package_id: Option<i64>,
    #[serde(rename = "errMsg", skip_serializing_if = "Option::is_none", default)]
    pub error_message: Option<String>,
}

impl SubmissionRow {
    #[must_use]
    pub fn package_key(&self) -> PackageKey {
        PackageKey::from_package(&self.package)
    }
}

/// Synthesized `"{winery} {label }"` prefix shared by product names and the
/// per-day summary lookups. The trailing space is part of the contract.
#[must_use]
pub fn wine_name_prefix(winery: Option<&str>, label: Option<&str>) -> String {
    let label_part = label.map(|label| format!("{label} ")).unwrap_or_default();
    format!("{} {label_part}", winery.unwrap_or_default())
}

/// Product display name: the wine name prefix followed by the vintage tag,
/// rendered as `N.V.` for the non-vintage tag.
#[must_use]
pub fn product_display_name(winery: Option<&str>, label: Option<&str>, vintage_tag: i16) -> String {
    let vintage = if vintage_tag == NON_VINTAGE_TAG {
        "N.V.".to_string()
    } else {
        vintage_tag.to_string()
    };
    format!("{}{vintage}", wine_name_prefix(winery, label))
}

fn fmt_opt<T: Display>(value: Option<&T>) -> String {
    value.map_or_else(|| "null".to_string(), ToString::to_string)
}

fn round_to_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Scale-tolerant price equality: both sides rounded to two decimal places,
/// half away from zero. A missing side only equals another missing side.
#[must_use]
pub fn prices_match(first: Option<Decimal>, second: Option<Decimal>) -> bool {
    match (first, second) {
        (Some(first), Some(second)) => round_to_cents(first) == round_to_cents(second),
        (first, second) => first == second,
    }
}

/// Outcome of one comparison: the differing attribute names plus one
/// human-readable `name: first---second` line per difference. A verdict with
/// no recorded differences passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    scope: &'static str,
    mismatched_fields: Vec<String>,
    detail_lines: Vec<String>,
}

impl Verdict {
    #[must_use]
    pub fn new(scope: &'static str) -> Self {
        Self { scope, mismatched_fields: Vec::new(), detail_lines: Vec::new() }
    }

    fn record_diff(&mut self, field: &str, first: String, second: String) {
        self.mismatched_fields.push(field.to_string());
        self.detail_lines.push(format!("{field}: {first}---{second}"));
    }

    fn record_collection(&mut self, field: &str, check: CollectionCheck) {
        if check.matched {
            return;
        }
        self.mismatched_fields.push(field.to_string());
        self.detail_lines.extend(check.notes);
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        self.mismatched_fields.is_empty()
    }

    #[must_use]
    pub fn mismatched_fields(&self) -> &[String] {
        &self.mismatched_fields
    }

    /// Diagnostic block for the case log, or `None` when the verdict passed.
    #[must_use]
    pub fn describe(&self) -> Option<String> {
        if self.passed() {
            return None;
        }
        let mut block = format!(
            "{} attributes are different({})",
            self.scope,
            self.mismatched_fields.join(", ")
        );
        for line in &self.detail_lines {
            block.push('\n');
            block.push_str(line);
        }
        Some(block)
    }
}

/// Outcome of one order-independent collection comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionCheck {
    pub matched: bool,
    pub notes: Vec<String>,
}

impl CollectionCheck {
    fn passed() -> Self {
        Self { matched: true, notes: Vec::new() }
    }

    fn failed(note: String) -> Self {
        Self { matched: false, notes: vec![note] }
    }
}

/// Order-independent rating comparison. Each first-side element must find
/// *some* second-side element agreeing on the critic seo and *some* element
/// agreeing on the score, independently of each other; a sub-field with no
/// match anywhere is reported per index. A null first side equals a null or
/// empty second side.
#[must_use]
pub fn compare_ratings(
    first: Option<&[WineRating]>,
    second: Option<&[WineRating]>,
) -> CollectionCheck {
    let (first, second) = match (first, second) {
        (None, None) => return CollectionCheck::passed(),
        (None, Some(second)) if second.is_empty() => return CollectionCheck::passed(),
        (None, Some(_)) => {
            return CollectionCheck::failed("first rating list is null".to_string());
        }
        (Some(_), None) => {
            return CollectionCheck::failed("second rating list is null".to_string());
        }
        (Some(first), Some(second)) => (first, second),
    };
    if first.len() != second.len() {
        return CollectionCheck::failed(
            "first rating list and second rating list have different size".to_string(),
        );
    }

    let mut check = CollectionCheck::passed();
    for (index, rating) in first.iter().enumerate() {
        let critic_found = second.iter().any(|other| other.critic_seo == rating.critic_seo);
        let score_found = second.iter().any(|other| other.score == rating.score);
        let mut missing = Vec::new();
        if !critic_found {
            missing.push("criticsSeo");
        }
        if !score_found {
            missing.push("score");
        }
        if !missing.is_empty() {
            check.matched = false;
            check
                .notes
                .push(format!("{index} rating details are different ({})", missing.join(", ")));
        }
    }
    check
}

/// Order-independent varietal comparison with the same existential sub-field
/// rule as [`compare_ratings`].
#[must_use]
pub fn compare_varietals(
    first: Option<&[WineVarietal]>,
    second: Option<&[WineVarietal]>,
) -> CollectionCheck {
    let (first, second) = match (first, second) {
        (None, None) => return CollectionCheck::passed(),
        (None, Some(second)) if second.is_empty() => return CollectionCheck::passed(),
        (None, Some(_)) => {
            return CollectionCheck::failed("first varietal list is null".to_string());
        }
        (Some(_), None) => {
            return CollectionCheck::failed("second varietal list is null".to_string());
        }
        (Some(first), Some(second)) => (first, second),
    };
    if first.len() != second.len() {
        return CollectionCheck::failed(
            "first varietal list and second varietal list have different size".to_string(),
        );
    }

    let mut check = CollectionCheck::passed();
    for (index, varietal) in first.iter().enumerate() {
        let seo_found = second.iter().any(|other| other.varietal_seo == varietal.varietal_seo);
        let value_found =
            second.iter().any(|other| other.numeric_value == varietal.numeric_value);
        let mut missing = Vec::new();
        if !seo_found {
            missing.push("varietalSeo");
        }
        if !value_found {
            missing.push("numVal");
        }
        if !missing.is_empty() {
            check.matched = false;
            check
                .notes
                .push(format!("{index} varietal details are different ({})", missing.join(", ")));
        }
    }
    check
}

/// Package comparison: exact equality per field except the price, which is
/// compared after rounding both sides to two decimal places.
#[must_use]
pub fn compare_packages(expected: &PackageRecord, actual: &PackageRecord) -> Verdict {
    let mut verdict = Verdict::new("package level");
    let scalar_fields = [
        ("supplierSeo", &expected.supplier_seo, &actual.supplier_seo),
        ("pckgType", &expected.stock.package_type, &actual.stock.package_type),
        ("pckgName", &expected.stock.package_name, &actual.stock.package_name),
    ];
    for (name, first, second) in scalar_fields {
        if first != second {
            verdict.record_diff(name, fmt_opt(first.as_ref()), fmt_opt(second.as_ref()));
        }
    }
    let numeric_fields = [
        ("hrDlvMax", expected.stock.delivery_hours_max, actual.stock.delivery_hours_max),
        ("hrDlvMin", expected.stock.delivery_hours_min, actual.stock.delivery_hours_min),
        ("qty", expected.stock.quantity, actual.stock.quantity),
    ];
    for (name, first, second) in numeric_fields {
        if first != second {
            verdict.record_diff(name, fmt_opt(first.as_ref()), fmt_opt(second.as_ref()));
        }
    }
    if !prices_match(expected.stock.price, actual.stock.price) {
        verdict.record_diff(
            "price",
            fmt_opt(expected.stock.price.as_ref()),
            fmt_opt(actual.stock.price.as_ref()),
        );
    }
    verdict
}

/// Product comparison over display name and surrogate id.
#[must_use]
pub fn compare_products(expected: &ProductInfo, actual: &ProductInfo) -> Verdict {
    let mut verdict = Verdict::new("product level");
    if expected.name != actual.name {
        verdict.record_diff(
            "productName",
            fmt_opt(expected.name.as_ref()),
            fmt_opt(actual.name.as_ref()),
        );
    }
    if expected.product_id != actual.product_id {
        verdict.record_diff(
            "productId",
            fmt_opt(expected.product_id.as_ref()),
            fmt_opt(actual.product_id.as_ref()),
        );
    }
    verdict
}

/// Vintage-scoped wine attribute comparison: note, alcohol, appellation,
/// plus the two order-independent collections.
#[must_use]
pub fn compare_wine_attributes(
    expected: &VintageAttributes,
    actual: &VintageAttributes,
) -> Verdict {
    let mut verdict = Verdict::new("vintage level");
    let scalar_fields = [
        ("vinNote", &expected.vintage_note, &actual.vintage_note),
        ("appellation", &expected.appellation, &actual.appellation),
    ];
    for (name, first, second) in scalar_fields {
        if first != second {
            verdict.record_diff(name, fmt_opt(first.as_ref()), fmt_opt(second.as_ref()));
        }
    }
    if expected.alcohol != actual.alcohol {
        verdict.record_diff(
            "alcohol",
            fmt_opt(expected.alcohol.as_ref()),
            fmt_opt(actual.alcohol.as_ref()),
        );
    }
    verdict.record_collection(
        "ratings",
        compare_ratings(expected.ratings.as_deref(), actual.ratings.as_deref()),
    );
    verdict.record_collection(
        "varietals",
        compare_varietals(expected.varietals.as_deref(), actual.varietals.as_deref()),
    );
    verdict
}

/// Wine-scoped profile comparison: the descriptive fields shared by every
/// vintage of one wine.
#[must_use]
pub fn compare_wine_profile(expected: &VintageAttributes, actual: &VintageAttributes) -> Verdict {
    let mut verdict = Verdict::new("wine level");
    let fields = [
        ("typeSeo", &expected.wine_type_seo, &actual.wine_type_seo),
        ("winerySeo", &expected.winery_seo, &actual.winery_seo),
        ("winery", &expected.winery, &actual.winery),
        ("wineryNote", &expected.winery_note, &actual.winery_note),
        ("regionSeo", &expected.region_seo, &actual.region_seo),
        ("region", &expected.region, &actual.region),
        ("countrySeo", &expected.country_seo, &actual.country_seo),
    ];
    for (name, first, second) in fields {
        if first != second {
            verdict.record_diff(name, fmt_opt(first.as_ref()), fmt_opt(second.as_ref()));
        }
    }
    // Labels are compared as plain text; an absent label reads as empty.
    let expected_label = expected.label.as_deref().unwrap_or_default();
    let actual_label = actual.label.as_deref().unwrap_or_default();
    if expected_label != actual_label {
        verdict.record_diff("label", expected_label.to_string(), actual_label.to_string());
    }
    verdict
}

/// Per-case diagnostic buffer. Every anomaly and comparison mismatch of one
/// test case is appended here and flushed as a single block, so a failing
/// case reports every discrepancy in one pass.
#[derive(Debug, Default)]
pub struct CaseLog {
    lines: Vec<String>,
}

impl CaseLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the buffer and announce the beginning of a case.
    pub fn begin_case(&mut self, header: &str, message: &str) {
        self.lines.clear();
        tracing::info!("{header}: {message}");
    }

    pub fn append(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!("{message}");
        self.lines.push(message);
    }

    /// Append a failing verdict's diagnostic block; passing verdicts leave
    /// the buffer untouched.
    pub fn append_verdict(&mut self, verdict: &Verdict) {
        if let Some(block) = verdict.describe() {
            self.append(block);
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Emit everything buffered so far as one block and clear the buffer.
    pub fn flush(&mut self, header: &str) -> String {
        let block = self.lines.join("\n");
        tracing::info!("{header}:\n{block}");
        self.lines.clear();
        block
    }
}

#[cfg(test)]
mod tests {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    use std::str::FromStr;

    use proptest::prelude::*;

    use super::*;

    fn hash_of<T: Hash>(value: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    fn decimal(text: &str) -> Decimal {
        match Decimal::from_str(text) {
            Ok(value) => value,
            Err(err) => panic!("test decimal should parse: {err}"),
        }
    }

    fn rating(critic: &str, score: &str) -> WineRating {
        WineRating { critic_seo: Some(critic.to_string()), score: Some(score.to_string()) }
    }

    fn varietal(seo: &str, value: i16) -> WineVarietal {
        WineVarietal { varietal_seo: Some(seo.to_string()), numeric_value: Some(value) }
    }

    fn package_record(quantity: i64, price: &str) -> PackageRecord {
        PackageRecord {
            supplier_seo: Some("supplier001".to_string()),
            stock: PackageAttributes {
                wine_ref_ext: Some("P1_supplier001".to_string()),
                vintage_tag: Some(2020),
                package_type: Some("BOTTLE75".to_string()),
                package_ref_ext: Some("PKG-1".to_string()),
                package_name: Some("Single Bottle".to_string()),
                delivery_hours_min: Some(24),
                delivery_hours_max: Some(72),
                quantity: Some(quantity),
                price: Some(decimal(price)),
            },
        }
    }

    // Test IDs: TKEY-001
    #[test]
    fn product_keys_with_equal_fields_are_equal_and_hash_equal() {
        let first = ProductKey::new(Some("P1".to_string()), Some(2020));
        let second = ProductKey::new(Some("P1".to_string()), Some(2020));
        assert_eq!(first, second);
        assert_eq!(hash_of(&first), hash_of(&second));

        let both_null = ProductKey::new(None, None);
        assert_eq!(both_null, ProductKey::new(None, None));
        assert_eq!(hash_of(&both_null), hash_of(&ProductKey::new(None, None)));

        assert_ne!(first, ProductKey::new(Some("P1".to_string()), Some(2021)));
        assert_ne!(first, ProductKey::new(Some("P2".to_string()), Some(2020)));
        assert_ne!(first, both_null);
    }

    // Test IDs: TKEY-002
    #[test]
    fn package_key_equality_is_conjunction_of_parts() {
        let product = ProductKey::new(Some("P1".to_string()), Some(2020));
        let key = PackageKey::new(product.clone(), Some("BOTTLE75".to_string()), Some("PKG-1".to_string()));

        assert_eq!(
            key,
            PackageKey::new(product.clone(), Some("BOTTLE75".to_string()), Some("PKG-1".to_string()))
        );
        assert_ne!(
            key,
            PackageKey::new(product.clone(), Some("MAGNUM".to_string()), Some("PKG-1".to_string()))
        );
        assert_ne!(
            key,
            PackageKey::new(product, Some("BOTTLE75".to_string()), Some("PKG-2".to_string()))
        );
        assert_ne!(
            key,
            PackageKey::new(
                ProductKey::new(Some("P1".to_string()), Some(2021)),
                Some("BOTTLE75".to_string()),
                Some("PKG-1".to_string())
            )
        );
    }

    // Test IDs: TKEY-003
    #[test]
    fn keys_derive_from_package_attributes() {
        let stock = PackageAttributes {
            wine_ref_ext: Some("P1_supplier001".to_string()),
            vintage_tag: Some(2019),
            package_type: Some("CASE6".to_string()),
            package_ref_ext: Some("PKG-9".to_string()),
            ..PackageAttributes::default()
        };
        let key = PackageKey::from_package(&stock);
        assert_eq!(key.product.wine_ref_ext.as_deref(), Some("P1_supplier001"));
        assert_eq!(key.product.vintage_tag, Some(2019));
        assert_eq!(key.package_type.as_deref(), Some("CASE6"));
        assert_eq!(key.package_ref_ext.as_deref(), Some("PKG-9"));
    }

    // Test IDs: TCMP-001
    #[test]
    fn price_comparison_rounds_half_up_to_two_places() {
        let expected = package_record(5, "10.00");
        assert!(compare_packages(&expected, &package_record(5, "10.004")).passed());
        let verdict = compare_packages(&expected, &package_record(5, "10.006"));
        assert!(!verdict.passed());
        assert_eq!(verdict.mismatched_fields(), ["price"]);
    }

    // Test IDs: TCMP-002
    #[test]
    fn package_mismatch_reports_field_names_and_value_pairs() {
        let expected = package_record(5, "10.00");
        let mut actual = package_record(0, "12.50");
        actual.stock.package_name = Some("Twin Pack".to_string());

        let verdict = compare_packages(&expected, &actual);
        assert_eq!(verdict.mismatched_fields(), ["pckgName", "qty", "price"]);
        let block = match verdict.describe() {
            Some(block) => block,
            None => panic!("failing verdict should describe itself"),
        };
        assert!(block.starts_with("package level attributes are different(pckgName, qty, price)"));
        assert!(block.contains("qty: 5---0"));
        assert!(block.contains("price: 10.00---12.50"));
    }

    // Test IDs: TCMP-003
    #[test]
    fn rating_comparison_ignores_order() {
        let first: &[WineRating] = &[rating("critic-a", "90"), rating("critic-b", "85")];
        let reordered: &[WineRating] = &[rating("critic-b", "85"), rating("critic-a", "90")];
        assert!(compare_ratings(Some(first), Some(reordered)).matched);

        let missing: &[WineRating] = &[rating("critic-a", "90")];
        let check = compare_ratings(Some(first), Some(missing));
        assert!(!check.matched);
        assert_eq!(
            check.notes,
            ["first rating list and second rating list have different size"]
        );

        let empty: &[WineRating] = &[];
        assert!(compare_ratings(None, Some(empty)).matched);
        assert!(compare_ratings(None, None).matched);
        assert!(!compare_ratings(Some(empty), None).matched);
    }

    // Test IDs: TCMP-004
    // The sub-field match is existential per field, not pairwise: a rating
    // may borrow its critic from one element and its score from another.
    #[test]
    fn rating_sub_fields_match_independently_across_elements() {
        let first: &[WineRating] = &[rating("critic-a", "90"), rating("critic-b", "85")];
        let crossed: &[WineRating] = &[rating("critic-a", "85"), rating("critic-b", "90")];
        assert!(compare_ratings(Some(first), Some(crossed)).matched);

        let second: &[WineRating] = &[rating("critic-a", "85"), rating("critic-c", "90")];
        let check = compare_ratings(Some(first), Some(second));
        assert!(!check.matched);
        assert_eq!(check.notes, ["1 rating details are different (criticsSeo)"]);
    }

    // Test IDs: TCMP-005
    #[test]
    fn varietal_comparison_reports_both_missing_sub_fields() {
        let first: &[WineVarietal] = &[varietal("merlot", 60), varietal("cabernet-franc", 40)];
        let second: &[WineVarietal] = &[varietal("merlot", 60), varietal("syrah", 70)];
        let check = compare_varietals(Some(first), Some(second));
        assert!(!check.matched);
        assert_eq!(check.notes, ["1 varietal details are different (varietalSeo, numVal)"]);
    }

    // Test IDs: TCMP-006
    #[test]
    fn wine_attribute_comparison_covers_scalars_and_collections() {
        let expected = VintageAttributes {
            vintage_note: Some("ripe fruit".to_string()),
            alcohol: Some(1350),
            appellation: Some("Margaux".to_string()),
            ratings: Some(vec![rating("critic-a", "92")]),
            varietals: Some(vec![varietal("merlot", 100)]),
            ..VintageAttributes::default()
        };
        assert!(compare_wine_attributes(&expected, &expected.clone()).passed());

        let mut actual = expected.clone();
        actual.alcohol = Some(1400);
        actual.ratings = Some(vec![rating("critic-b", "92")]);
        let verdict = compare_wine_attributes(&expected, &actual);
        assert_eq!(verdict.mismatched_fields(), ["alcohol", "ratings"]);
    }

    // Test IDs: TCMP-007
    #[test]
    fn wine_profile_comparison_treats_missing_label_as_empty() {
        let expected = VintageAttributes {
            winery: Some("Chateau Demo".to_string()),
            label: None,
            ..VintageAttributes::default()
        };
        let actual = VintageAttributes {
            winery: Some("Chateau Demo".to_string()),
            label: Some(String::new()),
            ..VintageAttributes::default()
        };
        assert!(compare_wine_profile(&expected, &actual).passed());

        let renamed = VintageAttributes {
            winery: Some("Chateau Other".to_string()),
            ..VintageAttributes::default()
        };
        let verdict = compare_wine_profile(&expected, &renamed);
        assert_eq!(verdict.mismatched_fields(), ["winery"]);
    }

    // Test IDs: TNAME-001
    #[test]
    fn product_names_render_vintage_and_non_vintage() {
        assert_eq!(
            product_display_name(Some("Chateau Demo"), Some("Grand Cru"), 2020),
            "Chateau Demo Grand Cru 2020"
        );
        assert_eq!(
            product_display_name(Some("Chateau Demo"), None, NON_VINTAGE_TAG),
            "Chateau Demo N.V."
        );
        assert_eq!(wine_name_prefix(Some("Chateau Demo"), Some("Grand Cru")), "Chateau Demo Grand Cru ");
    }

    // Test IDs: TLOG-001
    #[test]
    fn case_log_accumulates_and_flushes_one_block() {
        let mut log = CaseLog::new();
        log.begin_case("day 3", "supplier001 propose");
        log.append("Index 4: It is a new wine");
        let verdict = compare_products(
            &ProductInfo { product_id: Some(100), name: Some("A".to_string()) },
            &ProductInfo { product_id: Some(101), name: Some("A".to_string()) },
        );
        log.append_verdict(&verdict);
        assert_eq!(log.lines().len(), 2);

        let block = log.flush("day 3 summary");
        assert!(block.starts_with("Index 4: It is a new wine\n"));
        assert!(block.contains("productId: 100---101"));
        assert!(log.is_empty());
    }

    proptest! {
        // Test IDs: TKEY-004
        #[test]
        fn property_product_key_equality_matches_field_equality(
            ref_a in proptest::option::of("[a-z0-9-]{1,12}"),
            ref_b in proptest::option::of("[a-z0-9-]{1,12}"),
            vintage_a in proptest::option::of(1000_i16..2100),
            vintage_b in proptest::option::of(1000_i16..2100),
        ) {
            let first = ProductKey::new(ref_a.clone(), vintage_a);
            let second = ProductKey::new(ref_b.clone(), vintage_b);
            let fields_equal = ref_a == ref_b && vintage_a == vintage_b;
            prop_assert_eq!(first == second, fields_equal);
            if fields_equal {
                prop_assert_eq!(hash_of(&first), hash_of(&second));
            }
        }

        // Test IDs: TCMP-008
        #[test]
        fn property_rating_comparison_is_permutation_invariant(
            scores in proptest::collection::vec((0_u8..5, 80_u16..100), 1..6),
            seed in any::<u64>(),
        ) {
            let ratings: Vec<WineRating> = scores
                .iter()
                .map(|(critic, score)| rating(&format!("critic-{critic}"), &score.to_string()))
                .collect();
            let mut shuffled = ratings.clone();
            let len = shuffled.len();
            for index in 0..len {
                let target = (seed as usize).wrapping_add(index.wrapping_mul(7)) % len;
                shuffled.swap(index, target);
            }
            prop_assert!(compare_ratings(Some(ratings.as_slice()), Some(shuffled.as_slice())).matched);
        }
    }
}
