use std::collections::BTreeMap;
use std::time::Duration;

use cellar_check_core::{
    PackageAttributes, PackageRecord, ProductInfo, SubmissionRow, VintageAttributes, WineRating,
    WineVarietal,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};

/// Logical endpoints of the remote catalog, relative to the configured base
/// URL.
pub const PROPOSE_PATH: &str = "/cmsapi/datafeed-product/debug-test/update";
pub const COMMIT_PATH: &str = "/cmsapi/datafeed-product/debug-test/approve";
pub const WINE_LIST_PATH: &str = "/cmsapi2/wine-meta/wine/list";
pub const WINE_DETAIL_PATH: &str = "/cmsapi2/wine-meta/wine/detail";
pub const PRODUCT_DETAIL_PATH: &str = "/cmsapi/ecom/product/meta/detail";
pub const WINE_SEO_LIST_PATH: &str = "/cmsapi2/common/debug-test/wine-seo-list";
pub const WINERY_DETAIL_PATH: &str = "/cmsapi2/wine-meta/winery/detail";

/// Terminal failures at the remote catalog boundary. None of these are
/// retried; the run that hits one is considered failed.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ClientError {
    #[error("transport failure for {endpoint}: {detail}")]
    Transport { endpoint: String, detail: String },
    #[error("catalog call to {endpoint} failed: code {code}, {message}")]
    Api { endpoint: String, code: String, message: String },
    #[error("malformed payload from {endpoint}: {detail}")]
    Decode { endpoint: String, detail: String },
    #[error("winery id mismatch for {wine_seo}: first {first}, second {second}")]
    WineryMismatch { wine_seo: String, first: i64, second: i64 },
}

impl ClientError {
    fn decode(endpoint: &str, detail: impl Into<String>) -> Self {
        Self::Decode { endpoint: endpoint.to_string(), detail: detail.into() }
    }
}

/// Connection settings for the remote catalog. Credentials are supplied by
/// the collaborator layer; nothing here is baked into library code.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    pub base_url: String,
    pub auth_token: String,
    pub read_app_token: String,
    pub submit_app_token: String,
    /// No timeout by default: a hung remote call hangs the run, which is the
    /// intended test-tool behavior.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// One blocking request/response exchange with the catalog. Implementations
/// receive the fully assembled envelope body and return the raw response
/// envelope.
pub trait CatalogTransport {
    /// # Errors
    /// Returns [`ClientError::Transport`] when the exchange itself fails.
    fn post(&self, endpoint: &str, body: &Value) -> Result<Value, ClientError>;
}

/// `ureq`-backed transport. Every call blocks until the server answers or
/// the transport fails.
pub struct HttpTransport {
    agent: ureq::Agent,
    base_url: String,
    auth_token: String,
}

impl HttpTransport {
    #[must_use]
    pub fn new(config: &RemoteConfig) -> Self {
        let mut builder = ureq::AgentBuilder::new();
        if let Some(timeout_ms) = config.timeout_ms {
            builder = builder.timeout(Duration::from_millis(timeout_ms));
        }
        Self {
            agent: builder.build(),
            base_url: config.base_url.clone(),
            auth_token: config.auth_token.clone(),
        }
    }
}

impl CatalogTransport for HttpTransport {
    fn post(&self, endpoint: &str, body: &Value) -> Result<Value, ClientError> {
        let url = format!("{}{endpoint}", self.base_url);
        let response = self
            .agent
            .post(&url)
            .set("auth-token", &self.auth_token)
            .set("Content-Type", "application/json")
            .send_json(body)
            .map_err(|err| match err {
                ureq::Error::Status(code, _) => ClientError::Transport {
                    endpoint: endpoint.to_string(),
                    detail: format!("http status {code}"),
                },
                ureq::Error::Transport(transport) => ClientError::Transport {
                    endpoint: endpoint.to_string(),
                    detail: transport.to_string(),
                },
            })?;
        response
            .into_json::<Value>()
            .map_err(|err| ClientError::decode(endpoint, err.to_string()))
    }
}

fn enveloped(app_token: &str, content: Value) -> Value {
    json!({
        "header": { "appToken": app_token },
        "content": content,
    })
}

#[derive(Debug, Deserialize)]
struct EnvelopeHeader {
    #[serde(rename = "isSuccess")]
    is_success: Option<bool>,
    #[serde(rename = "errorCode")]
    error_code: Option<Value>,
    #[serde(rename = "errorMsg")]
    error_msg: Option<String>,
}

/// Check the response envelope header and unwrap its content. Only an
/// explicit `isSuccess: false` is a server-reported failure.
fn open_envelope(endpoint: &str, envelope: Value) -> Result<Value, ClientError> {
    let header_value = envelope
        .get("header")
        .cloned()
        .ok_or_else(|| ClientError::decode(endpoint, "response envelope has no header"))?;
    let header: EnvelopeHeader = serde_json::from_value(header_value)
        .map_err(|err| ClientError::decode(endpoint, err.to_string()))?;
    if header.is_success == Some(false) {
        let code = header
            .error_code
            .map_or_else(|| "unknown".to_string(), |code| code.to_string());
        let message = header.error_msg.unwrap_or_default();
        tracing::warn!("catalog call to {endpoint} failed: code {code}, {message}");
        return Err(ClientError::Api { endpoint: endpoint.to_string(), code, message });
    }
    Ok(envelope.get("content").cloned().unwrap_or(Value::Null))
}

// Wire shapes of the read operations. The submission payloads reuse the
// domain records directly; the read side is mapped field by field.

mod flexible_decimal {
    use std::str::FromStr;

    use rust_decimal::Decimal;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    // The catalog reports prices as either a JSON number or a string.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(text)) => {
                Decimal::from_str(&text).map(Some).map_err(D::Error::custom)
            }
            Some(Value::Number(number)) => {
                Decimal::from_str(&number.to_string()).map(Some).map_err(D::Error::custom)
            }
            Some(other) => Err(D::Error::custom(format!("unexpected price value: {other}"))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireVintage {
    #[serde(rename = "wineryId")]
    winery_id: Option<i64>,
    #[serde(rename = "vintageTag")]
    vintage_tag: Option<i16>,
    #[serde(rename = "wineTypeSeoName")]
    wine_type_seo: Option<String>,
    #[serde(rename = "winerySeoName")]
    winery_seo: Option<String>,
    #[serde(rename = "wineryNameEng")]
    winery: Option<String>,
    #[serde(rename = "wineNameEng")]
    label: Option<String>,
    #[serde(rename = "regionSeoName")]
    region_seo: Option<String>,
    #[serde(rename = "regionNameEng")]
    region: Option<String>,
    #[serde(rename = "countrySeoName")]
    country_seo: Option<String>,
    #[serde(rename = "vintageNotePlainEng")]
    vintage_note: Option<String>,
    #[serde(rename = "alcoholBps")]
    alcohol: Option<i16>,
    #[serde(rename = "vmVintageScore4CriticsList", default)]
    scores: Vec<WireScore>,
    #[serde(rename = "vmVintageAttr4VarietyList", default)]
    varieties: Vec<WireVariety>,
    #[serde(rename = "vmVintageAttr4ClassificationList", default)]
    classifications: Vec<WireClassification>,
}

#[derive(Debug, Deserialize)]
struct WireScore {
    #[serde(rename = "criticsSeoName")]
    critic_seo: Option<String>,
    #[serde(rename = "scoreValStr")]
    score: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireVariety {
    #[serde(rename = "attrSeoName")]
    varietal_seo: Option<String>,
    #[serde(rename = "attrValNum")]
    numeric_value: Option<i16>,
}

#[derive(Debug, Deserialize)]
struct WireClassification {
    #[serde(rename = "attrNameEng")]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireWinery {
    #[serde(rename = "notePlainEng")]
    note: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireProduct {
    #[serde(rename = "productNameEng")]
    name: Option<String>,
    #[serde(rename = "vmProdpckgSupplierDetailList", default)]
    packages: Vec<WirePackage>,
}

#[derive(Debug, Deserialize)]
struct WirePackage {
    #[serde(rename = "prodpckgId")]
    package_id: Option<i64>,
    #[serde(rename = "supplierSeoName")]
    supplier_seo: Option<String>,
    #[serde(rename = "pckgTypeCode")]
    package_type: Option<String>,
    #[serde(rename = "prodpckgNameEng")]
    package_name: Option<String>,
    #[serde(rename = "hourMinDelv")]
    delivery_hours_min: Option<i64>,
    #[serde(rename = "hourMaxDelv")]
    delivery_hours_max: Option<i64>,
    #[serde(rename = "qtyForShop")]
    quantity: Option<i64>,
    #[serde(rename = "priceRegular", with = "flexible_decimal", default)]
    price: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct WireSeoEntry {
    #[serde(rename = "wineSeo")]
    wine_seo: Option<String>,
}

fn vintage_from_wire(wire: WireVintage, winery_note: Option<String>) -> VintageAttributes {
    // Empty score/variety arrays map to present-but-empty collections, the
    // way the catalog reports them.
    let ratings = wire
        .scores
        .into_iter()
        .map(|score| WineRating { critic_seo: score.critic_seo, score: score.score })
        .collect();
    let varietals = wire
        .varieties
        .into_iter()
        .map(|variety| WineVarietal {
            varietal_seo: variety.varietal_seo,
            numeric_value: variety.numeric_value,
        })
        .collect();
    let appellation = wire.classifications.into_iter().next().and_then(|entry| entry.name);
    VintageAttributes {
        wine_type_seo: wire.wine_type_seo,
        winery_seo: wire.winery_seo,
        winery: wire.winery,
        winery_note,
        label: wire.label,
        region_seo: wire.region_seo,
        region: wire.region,
        country_seo: wire.country_seo,
        vintage_note: wire.vintage_note,
        alcohol: wire.alcohol,
        appellation,
        ratings: Some(ratings),
        varietals: Some(varietals),
    }
}

/// One product as the catalog stores it: identity plus its packages keyed by
/// package id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductCatalogEntry {
    pub info: ProductInfo,
    pub packages: BTreeMap<i64, PackageRecord>,
}

/// Flat processed/rejected partition returned by the propose call.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct SubmissionOutcome {
    #[serde(default)]
    pub processed: Vec<SubmissionRow>,
    #[serde(default)]
    pub rejected: Vec<SubmissionRow>,
}

/// Per-supplier processed/rejected partition returned by the commit call.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct GroupedSubmissionOutcome {
    #[serde(default)]
    pub processed: BTreeMap<String, Vec<SubmissionRow>>,
    #[serde(default)]
    pub rejected: BTreeMap<String, Vec<SubmissionRow>>,
}

/// Memoizing read-through cache in front of the four catalog read
/// operations, plus the two (uncached) submission operations. Lookups are
/// keyed by surrogate identifiers; a successful read is kept for the life of
/// the cache or until [`CatalogCache::reset`].
pub struct CatalogCache<T: CatalogTransport> {
    transport: T,
    read_app_token: String,
    submit_app_token: String,
    wines_by_seo: BTreeMap<String, BTreeMap<i16, VintageAttributes>>,
    wines_by_product: BTreeMap<i64, BTreeMap<i16, VintageAttributes>>,
    products: BTreeMap<i64, ProductCatalogEntry>,
    wine_seo_list: Option<Vec<String>>,
}

impl CatalogCache<HttpTransport> {
    #[must_use]
    pub fn over_http(config: &RemoteConfig) -> Self {
        Self::new(
            HttpTransport::new(config),
            config.read_app_token.clone(),
            config.submit_app_token.clone(),
        )
    }
}

impl<T: CatalogTransport> CatalogCache<T> {
    #[must_use]
    pub fn new(
        transport: T,
        read_app_token: impl Into<String>,
        submit_app_token: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            read_app_token: read_app_token.into(),
            submit_app_token: submit_app_token.into(),
            wines_by_seo: BTreeMap::new(),
            wines_by_product: BTreeMap::new(),
            products: BTreeMap::new(),
            wine_seo_list: None,
        }
    }

    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Drop every memoized read. Used only between independent test phases,
    /// never mid-phase.
    pub fn reset(&mut self) {
        self.wines_by_seo.clear();
        self.wines_by_product.clear();
        self.products.clear();
        self.wine_seo_list = None;
    }

    fn call(&self, endpoint: &str, app_token: &str, content: Value) -> Result<Value, ClientError> {
        let body = enveloped(app_token, content);
        let envelope = self.transport.post(endpoint, &body)?;
        open_envelope(endpoint, envelope)
    }

    fn fetch_winery_note(&self, winery_id: i64) -> Result<Option<String>, ClientError> {
        let content = self.call(
            WINERY_DETAIL_PATH,
            &self.read_app_token,
            json!({ "keyId": winery_id.to_string() }),
        )?;
        let winery: WireWinery = serde_json::from_value(content)
            .map_err(|err| ClientError::decode(WINERY_DETAIL_PATH, err.to_string()))?;
        Ok(winery.note)
    }

    /// All vintages of one wine, keyed by vintage tag.
    ///
    /// Mapping the payload issues a second remote call for the winery note;
    /// every vintage under one wine seo must agree on the winery id, and a
    /// divergence is a fatal self-contradiction.
    ///
    /// # Errors
    /// Returns a [`ClientError`] on transport failure, a server failure
    /// envelope, an undecodable payload, or a winery-id mismatch.
    pub fn wine_by_seo(
        &mut self,
        wine_seo: &str,
    ) -> Result<Option<BTreeMap<i16, VintageAttributes>>, ClientError> {
        if wine_seo.is_empty() {
            return Ok(None);
        }
        if let Some(cached) = self.wines_by_seo.get(wine_seo) {
            return Ok(Some(cached.clone()));
        }

        let content =
            self.call(WINE_LIST_PATH, &self.read_app_token, json!({ "wineSeo": wine_seo }))?;
        if content.is_null() {
            return Ok(None);
        }
        let vintages: Vec<WireVintage> = serde_json::from_value(content)
            .map_err(|err| ClientError::decode(WINE_LIST_PATH, err.to_string()))?;
        if vintages.is_empty() {
            return Ok(None);
        }

        let winery_id = vintages[0]
            .winery_id
            .ok_or_else(|| ClientError::decode(WINE_LIST_PATH, "vintage has no winery id"))?;
        let winery_note = self.fetch_winery_note(winery_id)?;

        let mut by_tag = BTreeMap::new();
        for wire in vintages {
            let this_winery = wire
                .winery_id
                .ok_or_else(|| ClientError::decode(WINE_LIST_PATH, "vintage has no winery id"))?;
            if this_winery != winery_id {
                return Err(ClientError::WineryMismatch {
                    wine_seo: wine_seo.to_string(),
                    first: winery_id,
                    second: this_winery,
                });
            }
            let tag = wire
                .vintage_tag
                .ok_or_else(|| ClientError::decode(WINE_LIST_PATH, "vintage has no tag"))?;
            by_tag.insert(tag, vintage_from_wire(wire, winery_note.clone()));
        }

        self.wines_by_seo.insert(wine_seo.to_string(), by_tag.clone());
        Ok(Some(by_tag))
    }

    /// Emergency single-vintage lookup by product id, for when the seo-keyed
    /// lookup fails. Returns a single-entry map keyed by the vintage tag.
    ///
    /// # Errors
    /// Same failure modes as [`CatalogCache::wine_by_seo`].
    pub fn wine_by_product(
        &mut self,
        product_id: i64,
    ) -> Result<Option<BTreeMap<i16, VintageAttributes>>, ClientError> {
        if let Some(cached) = self.wines_by_product.get(&product_id) {
            return Ok(Some(cached.clone()));
        }
        tracing::debug!("fetching wine data by product id {product_id}");

        let content = self.call(
            WINE_DETAIL_PATH,
            &self.read_app_token,
            json!({ "productId": product_id.to_string() }),
        )?;
        if content.is_null() {
            return Ok(None);
        }
        let wire: WireVintage = serde_json::from_value(content)
            .map_err(|err| ClientError::decode(WINE_DETAIL_PATH, err.to_string()))?;
        let winery_id = wire
            .winery_id
            .ok_or_else(|| ClientError::decode(WINE_DETAIL_PATH, "vintage has no winery id"))?;
        let tag = wire
            .vintage_tag
            .ok_or_else(|| ClientError::decode(WINE_DETAIL_PATH, "vintage has no tag"))?;
        let winery_note = self.fetch_winery_note(winery_id)?;

        let mut by_tag = BTreeMap::new();
        by_tag.insert(tag, vintage_from_wire(wire, winery_note));
        self.wines_by_product.insert(product_id, by_tag.clone());
        Ok(Some(by_tag))
    }

    /// One vintage of one wine, through the seo-keyed cache. A cached wine
    /// with no such vintage answers `None` without a fresh remote call.
    ///
    /// # Errors
    /// Same failure modes as [`CatalogCache::wine_by_seo`].
    pub fn vintage(
        &mut self,
        wine_seo: &str,
        vintage_tag: i16,
    ) -> Result<Option<VintageAttributes>, ClientError> {
        Ok(self.wine_by_seo(wine_seo)?.and_then(|by_tag| by_tag.get(&vintage_tag).cloned()))
    }

    /// Product identity and its packages keyed by package id.
    ///
    /// # Errors
    /// Returns a [`ClientError`] on transport failure, a server failure
    /// envelope, or an undecodable payload.
    pub fn product(&mut self, product_id: i64) -> Result<Option<ProductCatalogEntry>, ClientError> {
        if let Some(cached) = self.products.get(&product_id) {
            return Ok(Some(cached.clone()));
        }

        let content = self.call(
            PRODUCT_DETAIL_PATH,
            &self.read_app_token,
            json!({ "productId": product_id }),
        )?;
        if content.is_null() {
            return Ok(None);
        }
        let wire: WireProduct = serde_json::from_value(content)
            .map_err(|err| ClientError::decode(PRODUCT_DETAIL_PATH, err.to_string()))?;

        let mut packages = BTreeMap::new();
        for wire_package in wire.packages {
            let package_id = wire_package
                .package_id
                .ok_or_else(|| ClientError::decode(PRODUCT_DETAIL_PATH, "package has no id"))?;
            packages.insert(
                package_id,
                PackageRecord {
                    supplier_seo: wire_package.supplier_seo,
                    stock: PackageAttributes {
                        package_type: wire_package.package_type,
                        package_name: wire_package.package_name,
                        delivery_hours_min: wire_package.delivery_hours_min,
                        delivery_hours_max: wire_package.delivery_hours_max,
                        quantity: wire_package.quantity,
                        price: wire_package.price,
                        ..PackageAttributes::default()
                    },
                },
            );
        }
        let entry = ProductCatalogEntry {
            info: ProductInfo { product_id: Some(product_id), name: wire.name },
            packages,
        };
        self.products.insert(product_id, entry.clone());
        Ok(Some(entry))
    }

    /// One package of one product, through the product cache. A cached
    /// product with no such package answers `None` without a fresh call.
    ///
    /// # Errors
    /// Same failure modes as [`CatalogCache::product`].
    pub fn package(
        &mut self,
        product_id: i64,
        package_id: i64,
    ) -> Result<Option<PackageRecord>, ClientError> {
        Ok(self.product(product_id)?.and_then(|entry| entry.packages.get(&package_id).cloned()))
    }

    /// Every wine seo currently in the catalog.
    ///
    /// # Errors
    /// Returns a [`ClientError`] on transport failure, a server failure
    /// envelope, or an undecodable payload.
    pub fn wine_seo_list(&mut self) -> Result<Option<Vec<String>>, ClientError> {
        if let Some(cached) = &self.wine_seo_list {
            return Ok(Some(cached.clone()));
        }

        let content = self.call(WINE_SEO_LIST_PATH, &self.read_app_token, json!({}))?;
        if content.is_null() {
            return Ok(None);
        }
        let entries: Vec<WireSeoEntry> = serde_json::from_value(content)
            .map_err(|err| ClientError::decode(WINE_SEO_LIST_PATH, err.to_string()))?;
        let seos: Vec<String> = entries.into_iter().filter_map(|entry| entry.wine_seo).collect();
        self.wine_seo_list = Some(seos.clone());
        Ok(Some(seos))
    }

    /// Phase-A write: stage one supplier's submission rows.
    ///
    /// # Errors
    /// Returns a [`ClientError`] on transport failure, a server failure
    /// envelope, or an undecodable response partition.
    pub fn propose_update(
        &mut self,
        supplier_seo: &str,
        rows: &[SubmissionRow],
    ) -> Result<SubmissionOutcome, ClientError> {
        let file_data = serde_json::to_value(rows)
            .map_err(|err| ClientError::decode(PROPOSE_PATH, err.to_string()))?;
        let content = self.call(
            PROPOSE_PATH,
            &self.submit_app_token,
            json!({ "supplierSeo": supplier_seo, "fileData": file_data }),
        )?;
        tracing::debug!("propose response for {supplier_seo}: {content}");
        serde_json::from_value(content)
            .map_err(|err| ClientError::decode(PROPOSE_PATH, err.to_string()))
    }

    /// Phase-B write: finalize the staged rows of every supplier of one day.
    ///
    /// # Errors
    /// Returns a [`ClientError`] on transport failure, a server failure
    /// envelope, or an undecodable response partition.
    pub fn commit_approve(
        &mut self,
        batches: &BTreeMap<String, Vec<SubmissionRow>>,
    ) -> Result<GroupedSubmissionOutcome, ClientError> {
        let content_in = serde_json::to_value(batches)
            .map_err(|err| ClientError::decode(COMMIT_PATH, err.to_string()))?;
        let content = self.call(COMMIT_PATH, &self.submit_app_token, content_in)?;
        tracing::debug!("commit response: {content}");
        serde_json::from_value(content)
            .map_err(|err| ClientError::decode(COMMIT_PATH, err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    use super::*;

    /// Scripted in-memory transport: answers from a queue and records every
    /// request it sees.
    struct ScriptedTransport {
        responses: RefCell<VecDeque<Value>>,
        requests: RefCell<Vec<(String, Value)>>,
        calls: Cell<usize>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Value>) -> Self {
            Self {
                responses: RefCell::new(responses.into()),
                requests: RefCell::new(Vec::new()),
                calls: Cell::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.get()
        }

        fn request(&self, index: usize) -> (String, Value) {
            self.requests.borrow()[index].clone()
        }
    }

    impl CatalogTransport for ScriptedTransport {
        fn post(&self, endpoint: &str, body: &Value) -> Result<Value, ClientError> {
            self.calls.set(self.calls.get() + 1);
            self.requests.borrow_mut().push((endpoint.to_string(), body.clone()));
            match self.responses.borrow_mut().pop_front() {
                Some(response) => Ok(response),
                None => panic!("scripted transport ran out of responses at {endpoint}"),
            }
        }
    }

    fn ok_envelope(content: Value) -> Value {
        json!({ "header": { "isSuccess": true }, "content": content })
    }

    fn wine_list_payload() -> Value {
        ok_envelope(json!([
            {
                "wineryId": 7,
                "vintageTag": 2020,
                "wineTypeSeoName": "red",
                "winerySeoName": "chateau-demo",
                "wineryNameEng": "Chateau Demo",
                "wineNameEng": "Grand Cru",
                "regionSeoName": "bordeaux",
                "regionNameEng": "Bordeaux",
                "countrySeoName": "france",
                "vintageNotePlainEng": "ripe fruit",
                "alcoholBps": 1350,
                "vmVintageScore4CriticsList": [
                    { "criticsSeoName": "critic-a", "scoreValStr": "92" }
                ],
                "vmVintageAttr4VarietyList": [
                    { "attrSeoName": "merlot", "attrValNum": 100 }
                ],
                "vmVintageAttr4ClassificationList": [
                    { "attrNameEng": "Margaux" }
                ]
            }
        ]))
    }

    fn winery_payload() -> Value {
        ok_envelope(json!({ "notePlainEng": "family estate" }))
    }

    fn cache(responses: Vec<Value>) -> CatalogCache<ScriptedTransport> {
        CatalogCache::new(ScriptedTransport::new(responses), "read-token", "submit-token")
    }

    // Test IDs: TCACHE-001
    #[test]
    fn wine_lookup_is_memoized_until_reset() -> Result<(), ClientError> {
        let mut cache = cache(vec![
            wine_list_payload(),
            winery_payload(),
            wine_list_payload(),
            winery_payload(),
        ]);

        let first = cache.wine_by_seo("demo-wine")?;
        assert!(first.is_some());
        assert_eq!(cache.transport().calls(), 2);

        let second = cache.wine_by_seo("demo-wine")?;
        assert_eq!(first, second);
        assert_eq!(cache.transport().calls(), 2);

        cache.reset();
        let third = cache.wine_by_seo("demo-wine")?;
        assert_eq!(first, third);
        assert_eq!(cache.transport().calls(), 4);
        Ok(())
    }

    // Test IDs: TCACHE-002
    #[test]
    fn empty_seo_short_circuits_without_a_call() -> Result<(), ClientError> {
        let mut cache = cache(Vec::new());
        assert_eq!(cache.wine_by_seo("")?, None);
        assert_eq!(cache.transport().calls(), 0);
        Ok(())
    }

    // Test IDs: TCACHE-003
    #[test]
    fn absent_wine_is_not_memoized() -> Result<(), ClientError> {
        let mut cache = cache(vec![ok_envelope(json!([])), ok_envelope(json!([]))]);
        assert_eq!(cache.wine_by_seo("gone-wine")?, None);
        assert_eq!(cache.wine_by_seo("gone-wine")?, None);
        assert_eq!(cache.transport().calls(), 2);
        Ok(())
    }

    // Test IDs: TCACHE-004
    #[test]
    fn diverging_winery_ids_are_a_fatal_contradiction() {
        let two_wineries = ok_envelope(json!([
            { "wineryId": 7, "vintageTag": 2019 },
            { "wineryId": 8, "vintageTag": 2020 }
        ]));
        let mut cache = cache(vec![two_wineries, winery_payload()]);
        match cache.wine_by_seo("demo-wine") {
            Err(ClientError::WineryMismatch { wine_seo, first, second }) => {
                assert_eq!(wine_seo, "demo-wine");
                assert_eq!((first, second), (7, 8));
            }
            other => panic!("expected winery mismatch, got {other:?}"),
        }
    }

    // Test IDs: TCACHE-005
    #[test]
    fn failure_envelope_becomes_an_api_error() {
        let failure = json!({
            "header": { "isSuccess": false, "errorCode": 4001, "errorMsg": "bad token" },
            "content": null
        });
        let mut cache = cache(vec![failure]);
        match cache.wine_by_seo("demo-wine") {
            Err(ClientError::Api { endpoint, code, message }) => {
                assert_eq!(endpoint, WINE_LIST_PATH);
                assert_eq!(code, "4001");
                assert_eq!(message, "bad token");
            }
            other => panic!("expected api error, got {other:?}"),
        }
    }

    // Test IDs: TCACHE-006
    #[test]
    fn wine_payload_maps_into_domain_attributes() -> Result<(), ClientError> {
        let mut cache = cache(vec![wine_list_payload(), winery_payload()]);
        let by_tag = match cache.wine_by_seo("demo-wine")? {
            Some(by_tag) => by_tag,
            None => panic!("wine should be present"),
        };
        let attrs = match by_tag.get(&2020) {
            Some(attrs) => attrs,
            None => panic!("vintage 2020 should be present"),
        };
        assert_eq!(attrs.winery.as_deref(), Some("Chateau Demo"));
        assert_eq!(attrs.winery_note.as_deref(), Some("family estate"));
        assert_eq!(attrs.appellation.as_deref(), Some("Margaux"));
        assert_eq!(attrs.alcohol, Some(1350));
        assert_eq!(
            attrs.ratings,
            Some(vec![WineRating {
                critic_seo: Some("critic-a".to_string()),
                score: Some("92".to_string()),
            }])
        );
        assert_eq!(
            attrs.varietals,
            Some(vec![WineVarietal {
                varietal_seo: Some("merlot".to_string()),
                numeric_value: Some(100),
            }])
        );
        Ok(())
    }

    // Test IDs: TCACHE-007
    #[test]
    fn product_lookup_caches_and_resolves_packages() -> Result<(), ClientError> {
        let product_payload = ok_envelope(json!({
            "productNameEng": "Chateau Demo Grand Cru 2020",
            "vmProdpckgSupplierDetailList": [
                {
                    "prodpckgId": 200,
                    "supplierSeoName": "supplier001",
                    "pckgTypeCode": "BOTTLE75",
                    "prodpckgNameEng": "Single Bottle",
                    "hourMinDelv": 24,
                    "hourMaxDelv": 72,
                    "qtyForShop": 5,
                    "priceRegular": "10.004"
                }
            ]
        }));
        let mut cache = cache(vec![product_payload]);

        let package = match cache.package(100, 200)? {
            Some(package) => package,
            None => panic!("package should be present"),
        };
        assert_eq!(package.supplier_seo.as_deref(), Some("supplier001"));
        assert_eq!(package.stock.quantity, Some(5));

        // A cached product with no such package answers without a new call.
        assert_eq!(cache.package(100, 999)?, None);
        assert_eq!(cache.transport().calls(), 1);
        Ok(())
    }

    // Test IDs: TCACHE-008
    #[test]
    fn wine_seo_list_is_memoized() -> Result<(), ClientError> {
        let listing = ok_envelope(json!([
            { "wineSeo": "demo-wine" },
            { "wineSeo": "other-wine" },
            { "somethingElse": 1 }
        ]));
        let mut cache = cache(vec![listing]);
        let seos = cache.wine_seo_list()?;
        assert_eq!(seos, Some(vec!["demo-wine".to_string(), "other-wine".to_string()]));
        assert_eq!(cache.wine_seo_list()?, seos);
        assert_eq!(cache.transport().calls(), 1);
        Ok(())
    }

    // Test IDs: TSUB-001
    #[test]
    fn propose_serializes_rows_and_decodes_the_flat_partition() -> Result<(), ClientError> {
        let row = SubmissionRow {
            package: PackageAttributes {
                wine_ref_ext: Some("P1_supplier001".to_string()),
                vintage_tag: Some(2020),
                package_type: Some("BOTTLE75".to_string()),
                ..PackageAttributes::default()
            },
            ..SubmissionRow::default()
        };
        let response = ok_envelope(json!({
            "processed": [
                {
                    "pdpk": {
                        "wineRefEXT": "P1_supplier001",
                        "vintageTag": 2020,
                        "pckgType": "BOTTLE75"
                    },
                    "productId": 100,
                    "prodpckgId": 200
                }
            ],
            "rejected": []
        }));
        let mut cache = cache(vec![response]);

        let outcome = cache.propose_update("supplier001", std::slice::from_ref(&row))?;
        assert_eq!(outcome.processed.len(), 1);
        assert_eq!(outcome.processed[0].product_id, Some(100));
        assert_eq!(outcome.processed[0].package_id, Some(200));
        assert!(outcome.rejected.is_empty());

        let (endpoint, body) = cache.transport().request(0);
        assert_eq!(endpoint, PROPOSE_PATH);
        assert_eq!(body["header"]["appToken"], "submit-token");
        assert_eq!(body["content"]["supplierSeo"], "supplier001");
        assert_eq!(body["content"]["fileData"][0]["pdpk"]["wineRefEXT"], "P1_supplier001");
        Ok(())
    }

    // Test IDs: TSUB-002
    #[test]
    fn commit_decodes_the_supplier_grouped_partition() -> Result<(), ClientError> {
        let response = ok_envelope(json!({
            "processed": {
                "supplier001": [
                    {
                        "pdpk": { "wineRefEXT": "P1_supplier001", "vintageTag": 2020 },
                        "wineSeo": "demo-wine",
                        "productId": 100,
                        "prodpckgId": 200
                    }
                ]
            },
            "rejected": {
                "supplier002": [
                    {
                        "pdpk": { "wineRefEXT": "P9_supplier002", "vintageTag": 2018 },
                        "errMsg": "duplicate package reference"
                    }
                ]
            }
        }));
        let mut cache = cache(vec![response]);

        let batches = BTreeMap::from([(
            "supplier001".to_string(),
            vec![SubmissionRow::default()],
        )]);
        let outcome = cache.commit_approve(&batches)?;
        let processed = &outcome.processed["supplier001"];
        assert_eq!(processed[0].wine_seo.as_deref(), Some("demo-wine"));
        let rejected = &outcome.rejected["supplier002"];
        assert_eq!(rejected[0].error_message.as_deref(), Some("duplicate package reference"));
        Ok(())
    }
}
