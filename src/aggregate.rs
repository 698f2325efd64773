//! Reduces a census snapshot to node counts per country.
use crate::census::{Snapshot, COUNTRY_FIELD};
use std::collections::BTreeMap;

/// Serialized form of [`CountryCode::Unknown`]. Lowercase and longer than two
/// characters, so no ISO 3166 alpha-2 code can ever collide with it.
pub const UNKNOWN_TOKEN: &str = "unknown";

/// A node's country, either an ISO alpha-2 code or the unknown bucket.
///
/// `Iso` is declared first so that the derived ordering puts every real code
/// before `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CountryCode {
    Iso(String),
    Unknown,
}

impl CountryCode {
    /// Lenient classification used for census records: anything that is not
    /// exactly two ASCII letters lands in the unknown bucket.
    pub fn classify(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.len() == 2 && raw.bytes().all(|b| b.is_ascii_alphabetic()) {
            CountryCode::Iso(raw.to_ascii_uppercase())
        } else {
            CountryCode::Unknown
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            CountryCode::Iso(code) => code,
            CountryCode::Unknown => UNKNOWN_TOKEN,
        }
    }
}

impl From<CountryCode> for String {
    fn from(code: CountryCode) -> Self {
        code.as_str().to_string()
    }
}

/// Strict parsing used for persisted keys. A key that is neither the reserved
/// token nor a clean uppercase code means the file was not written by us.
impl TryFrom<String> for CountryCode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value == UNKNOWN_TOKEN {
            return Ok(CountryCode::Unknown);
        }
        if value.len() == 2 && value.bytes().all(|b| b.is_ascii_uppercase()) {
            Ok(CountryCode::Iso(value))
        } else {
            Err(format!("invalid country key {:?}", value))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CountryAggregation {
    pub total: u64,
    pub by_country: BTreeMap<CountryCode, u64>,
}

impl CountryAggregation {
    pub fn count(&self, code: &CountryCode) -> u64 {
        self.by_country.get(code).copied().unwrap_or(0)
    }
}

/// Counts the nodes of a snapshot per country.
///
/// Every record lands in exactly one bucket, so `sum(by_country) == total`
/// always holds:
/// - records without a usable country code, or that are not arrays at all,
///   are counted under [`CountryCode::Unknown`];
/// - a declared non-zero `total_nodes` is authoritative. If it is larger than
///   the number of listed records the surplus is merged into the unknown
///   bucket, since those nodes exist but could not be classified;
/// - a declared total smaller than the listed records is inconsistent, the
///   listed count wins.
pub fn aggregate(snapshot: &Snapshot) -> CountryAggregation {
    let mut by_country: BTreeMap<CountryCode, u64> = BTreeMap::new();

    for record in snapshot.nodes.values() {
        let code = record
            .as_array()
            .and_then(|fields| fields.get(COUNTRY_FIELD))
            .and_then(serde_json::Value::as_str)
            .map(CountryCode::classify)
            .unwrap_or(CountryCode::Unknown);
        *by_country.entry(code).or_insert(0) += 1;
    }

    let listed = snapshot.nodes.len() as u64;
    let total = match snapshot.total_nodes {
        Some(declared) if declared > listed => {
            *by_country.entry(CountryCode::Unknown).or_insert(0) += declared - listed;
            declared
        }
        Some(declared) if declared != 0 && declared < listed => {
            tracing::warn!(
                declared,
                listed,
                "census declared fewer nodes than it listed, using the listed count"
            );
            listed
        }
        _ => listed,
    };

    CountryAggregation { total, by_country }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(country: serde_json::Value) -> serde_json::Value {
        json!([70016, "/Satoshi:27.0.0/", 1760000000, 1033, 917000, null, null, country, 0.0, 0.0])
    }

    fn snapshot(records: Vec<serde_json::Value>, total_nodes: Option<u64>) -> Snapshot {
        Snapshot {
            timestamp: Some(1760600000),
            total_nodes,
            nodes: records
                .into_iter()
                .enumerate()
                .map(|(i, r)| (format!("10.0.0.{}:8333", i), r))
                .collect(),
        }
    }

    fn iso(code: &str) -> CountryCode {
        CountryCode::Iso(code.into())
    }

    #[test]
    fn classify_normalizes_and_rejects() {
        assert_eq!(CountryCode::classify("us"), iso("US"));
        assert_eq!(CountryCode::classify(" DE "), iso("DE"));
        assert_eq!(CountryCode::classify(""), CountryCode::Unknown);
        assert_eq!(CountryCode::classify("USA"), CountryCode::Unknown);
        assert_eq!(CountryCode::classify("1A"), CountryCode::Unknown);
        assert_eq!(CountryCode::classify("ÄÖ"), CountryCode::Unknown);
    }

    #[test]
    fn unknown_sorts_after_real_codes() {
        assert!(iso("ZW") < CountryCode::Unknown);
        assert!(iso("AD") < iso("ZW"));
    }

    #[test]
    fn bad_records_go_to_the_unknown_bucket() {
        let snap = snapshot(
            vec![
                record(json!("US")),
                record(json!("US")),
                record(json!("de")),
                record(json!(null)),
                record(json!("")),
                record(json!(42)),
                json!({"not": "an array"}),
                json!([1, 2, 3]),
            ],
            None,
        );
        let agg = aggregate(&snap);

        assert_eq!(agg.total, 8);
        assert_eq!(agg.count(&iso("US")), 2);
        assert_eq!(agg.count(&iso("DE")), 1);
        assert_eq!(agg.count(&CountryCode::Unknown), 5);
        assert_eq!(agg.by_country.values().sum::<u64>(), agg.total);
    }

    #[test]
    fn total_is_counted_when_not_declared() {
        for declared in [None, Some(0)] {
            let snap = snapshot(vec![record(json!("FR")), record(json!("FI"))], declared);
            let agg = aggregate(&snap);
            assert_eq!(agg.total, 2);
            assert_eq!(agg.by_country.values().sum::<u64>(), 2);
        }
    }

    #[test]
    fn declared_surplus_is_merged_into_unknown() {
        let snap = snapshot(vec![record(json!("NL")), record(json!("NL"))], Some(5));
        let agg = aggregate(&snap);
        assert_eq!(agg.total, 5);
        assert_eq!(agg.count(&iso("NL")), 2);
        assert_eq!(agg.count(&CountryCode::Unknown), 3);
    }

    #[test]
    fn declared_deficit_falls_back_to_listed() {
        let snap = snapshot(vec![record(json!("CA")); 3], Some(1));
        let agg = aggregate(&snap);
        assert_eq!(agg.total, 3);
        assert_eq!(agg.by_country.values().sum::<u64>(), 3);
    }

    #[test]
    fn empty_snapshot() {
        let agg = aggregate(&snapshot(vec![], None));
        assert_eq!(agg, CountryAggregation::default());
    }

    #[test]
    fn keys_round_trip_through_json() {
        let agg: BTreeMap<CountryCode, u64> =
            BTreeMap::from([(iso("US"), 3), (CountryCode::Unknown, 2)]);
        let text = serde_json::to_string(&agg).unwrap();
        assert_eq!(text, r#"{"US":3,"unknown":2}"#);
        let back: BTreeMap<CountryCode, u64> = serde_json::from_str(&text).unwrap();
        assert_eq!(back, agg);

        assert!(serde_json::from_str::<BTreeMap<CountryCode, u64>>(r#"{"null":1}"#).is_err());
    }
}
