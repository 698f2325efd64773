//! Change of the per-country counts between two observations.
use crate::aggregate::{CountryAggregation, CountryCode};
use std::collections::BTreeSet;

/// Percentage change with the division by zero spelled out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PctChange {
    /// Ordinary relative change, in percent. Also used for 0 -> 0.
    Ratio(f64),
    /// The previous count was zero and the current one is not.
    New,
}

pub fn pct_change(previous: u64, current: u64) -> PctChange {
    match (previous, current) {
        (0, 0) => PctChange::Ratio(0.0),
        (0, _) => PctChange::New,
        (prev, cur) => PctChange::Ratio((cur as f64 - prev as f64) * 100.0 / prev as f64),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Change {
    pub delta: i64,
    pub pct: PctChange,
}

impl Change {
    pub fn between(previous: u64, current: u64) -> Self {
        Change {
            delta: current as i64 - previous as i64,
            pct: pct_change(previous, current),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Label {
    Total,
    Country(CountryCode),
    Others,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeltaEntry {
    pub label: Label,
    pub count: u64,
    /// `None` when there is no baseline to compare with.
    pub change: Option<Change>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeltaReport {
    pub total: DeltaEntry,
    /// Top countries, largest first.
    pub countries: Vec<DeltaEntry>,
    /// Everything outside the top countries, present only when non-zero.
    pub others: Option<DeltaEntry>,
}

impl DeltaReport {
    pub fn is_first_run(&self) -> bool {
        self.total.change.is_none()
    }
}

/// Builds the report rows for `current` against the optional baseline.
///
/// Countries are ordered by count descending and by code ascending on ties,
/// so equal counts render in the same order on every run. The `Others`
/// baseline is the sum of every previous country that is not in the current
/// top set. When membership shifts between runs this is an approximation of
/// the bucket's change, not an exact per-country sum.
pub fn delta(
    current: &CountryAggregation,
    previous: Option<&CountryAggregation>,
    top_n: usize,
) -> DeltaReport {
    let change = |prev: u64, cur: u64| previous.map(|_| Change::between(prev, cur));

    let mut ranked: Vec<(&CountryCode, u64)> = current
        .by_country
        .iter()
        .map(|(code, count)| (code, *count))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let split = top_n.min(ranked.len());
    let (top, rest) = ranked.split_at(split);

    let countries: Vec<DeltaEntry> = top
        .iter()
        .map(|(code, count)| {
            let prev = previous.map(|p| p.count(code)).unwrap_or(0);
            DeltaEntry {
                label: Label::Country((*code).clone()),
                count: *count,
                change: change(prev, *count),
            }
        })
        .collect();

    let others_count: u64 = rest.iter().map(|(_, count)| count).sum();
    let others = (others_count > 0).then(|| {
        let top_codes: BTreeSet<&CountryCode> = top.iter().map(|(code, _)| *code).collect();
        let others_prev: u64 = previous
            .map(|p| {
                p.by_country
                    .iter()
                    .filter(|(code, _)| !top_codes.contains(code))
                    .map(|(_, count)| count)
                    .sum()
            })
            .unwrap_or(0);
        DeltaEntry {
            label: Label::Others,
            count: others_count,
            change: change(others_prev, others_count),
        }
    });

    DeltaReport {
        total: DeltaEntry {
            label: Label::Total,
            count: current.total,
            change: change(previous.map(|p| p.total).unwrap_or(0), current.total),
        },
        countries,
        others,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn agg(entries: &[(&str, u64)]) -> CountryAggregation {
        let by_country: BTreeMap<CountryCode, u64> = entries
            .iter()
            .map(|(code, count)| {
                let code = if *code == "?" {
                    CountryCode::Unknown
                } else {
                    CountryCode::Iso(code.to_string())
                };
                (code, *count)
            })
            .collect();
        CountryAggregation {
            total: by_country.values().sum(),
            by_country,
        }
    }

    fn code(entry: &DeltaEntry) -> &str {
        match &entry.label {
            Label::Country(code) => code.as_str(),
            Label::Total => "total",
            Label::Others => "others",
        }
    }

    #[test]
    fn pct_change_cases() {
        assert_eq!(pct_change(0, 0), PctChange::Ratio(0.0));
        assert_eq!(pct_change(0, 7), PctChange::New);
        assert_eq!(pct_change(100, 150), PctChange::Ratio(50.0));
        assert_eq!(pct_change(200, 150), PctChange::Ratio(-25.0));
        assert_eq!(pct_change(40, 0), PctChange::Ratio(-100.0));
    }

    #[test]
    fn identical_observations_have_no_change() {
        let current = agg(&[("US", 10), ("DE", 4), ("?", 2)]);
        let report = delta(&current, Some(&current), 2);

        let zero = Some(Change {
            delta: 0,
            pct: PctChange::Ratio(0.0),
        });
        assert_eq!(report.total.change, zero);
        for entry in report.countries.iter().chain(report.others.iter()) {
            assert_eq!(entry.change, zero, "{:?}", entry.label);
        }
    }

    #[test]
    fn us_grows_and_de_appears() {
        let previous = agg(&[("US", 100)]);
        let current = agg(&[("US", 150), ("DE", 20)]);
        let report = delta(&current, Some(&previous), 1);

        assert_eq!(report.countries.len(), 1);
        assert_eq!(code(&report.countries[0]), "US");
        assert_eq!(
            report.countries[0].change,
            Some(Change {
                delta: 50,
                pct: PctChange::Ratio(50.0)
            })
        );

        let others = report.others.unwrap();
        assert_eq!(others.count, 20);
        assert_eq!(
            others.change,
            Some(Change {
                delta: 20,
                pct: PctChange::New
            })
        );

        assert_eq!(report.total.count, 170);
        assert_eq!(report.total.change.unwrap().delta, 70);
    }

    #[test]
    fn first_run_has_no_changes() {
        let current = agg(&[("US", 5), ("FR", 3), ("FI", 1)]);
        let report = delta(&current, None, 2);

        assert!(report.is_first_run());
        assert!(report.countries.iter().all(|e| e.change.is_none()));
        assert!(report.others.unwrap().change.is_none());
    }

    #[test]
    fn ties_break_by_code_and_unknown_sorts_last() {
        let current = agg(&[("NL", 5), ("CH", 5), ("?", 5), ("AU", 9)]);
        let report = delta(&current, None, 10);
        let order: Vec<&str> = report.countries.iter().map(code).collect();
        assert_eq!(order, ["AU", "CH", "NL", "unknown"]);
        assert!(report.others.is_none());
    }

    #[test]
    fn top_and_others_account_for_the_total() {
        let current = agg(&[("US", 50), ("DE", 30), ("FR", 10), ("JP", 7), ("?", 3)]);
        for top_n in 1..=6 {
            let report = delta(&current, None, top_n);
            let shown: u64 = report.countries.iter().map(|e| e.count).sum::<u64>()
                + report.others.as_ref().map(|e| e.count).unwrap_or(0);
            assert_eq!(shown, current.total, "top_n = {}", top_n);
        }
    }

    #[test]
    fn others_baseline_uses_previous_non_top_members() {
        // DE drops out of the top spot it held before, JP climbs in.
        let previous = agg(&[("US", 100), ("DE", 40), ("JP", 10), ("FR", 5)]);
        let current = agg(&[("US", 90), ("JP", 45), ("DE", 30), ("FR", 6)]);
        let report = delta(&current, Some(&previous), 2);

        let order: Vec<&str> = report.countries.iter().map(code).collect();
        assert_eq!(order, ["US", "JP"]);

        let others = report.others.unwrap();
        assert_eq!(others.count, 36);
        // previous DE + FR
        assert_eq!(others.change.unwrap().delta, 36 - 45);
    }

    #[test]
    fn vanished_country_is_not_listed() {
        let previous = agg(&[("US", 10), ("RU", 4)]);
        let current = agg(&[("US", 10)]);
        let report = delta(&current, Some(&previous), 5);

        assert_eq!(report.countries.len(), 1);
        assert!(report.others.is_none());
        assert_eq!(report.total.change.unwrap().delta, -4);
    }
}
