//! Attribution of payment records to referral codes.

use std::collections::BTreeMap;

use crate::commission::{CommissionRate, compute_commission_cents};
use crate::referral::ReferralCode;
use crate::types::{AffiliateSummary, PaymentRecord};

#[derive(Default)]
struct Tally {
    orders: u64,
    paid_orders: u64,
    revenue_cents: u64,
}

impl Tally {
    fn add(&mut self, record: &PaymentRecord) {
        self.orders += 1;
        if record.is_paid() {
            self.paid_orders += 1;
            self.revenue_cents = self
                .revenue_cents
                .saturating_add(record.amount_total.unwrap_or(0));
        }
    }

    fn finish(self, code: ReferralCode, rate: CommissionRate) -> AffiliateSummary {
        AffiliateSummary {
            code,
            order_count: self.orders,
            paid_order_count: self.paid_orders,
            revenue_cents: self.revenue_cents,
            commission_cents: compute_commission_cents(self.revenue_cents, rate),
        }
    }
}

/// Groups records by their (valid) referral code at the default rate.
///
/// Records without a valid `affiliateRef` are skipped. The result is sorted
/// by revenue descending, ties by referral code ascending, so it does not
/// depend on the order of `records`.
pub fn aggregate_by_referrer<'a, I>(records: I) -> Vec<AffiliateSummary>
where
    I: IntoIterator<Item = &'a PaymentRecord>,
{
    let groups = records
        .into_iter()
        .filter_map(|record| record.affiliate_ref().map(|code| (code, record)))
        .fold(BTreeMap::<ReferralCode, Tally>::new(), |mut acc, (code, record)| {
            acc.entry(code).or_default().add(record);
            acc
        });

    let mut rows: Vec<AffiliateSummary> = groups
        .into_iter()
        .map(|(code, tally)| tally.finish(code, CommissionRate::DEFAULT))
        .collect();
    // Stable sort keeps the BTreeMap's ascending code order among ties.
    rows.sort_by(|a, b| b.revenue_cents.cmp(&a.revenue_cents));
    rows
}

/// Totals for one referral code at the affiliate's own rate.
pub fn summarize_for_referrer<'a, I>(
    records: I,
    code: &ReferralCode,
    rate: CommissionRate,
) -> AffiliateSummary
where
    I: IntoIterator<Item = &'a PaymentRecord>,
{
    records
        .into_iter()
        .filter(|record| record.affiliate_ref().as_ref() == Some(code))
        .fold(Tally::default(), |mut tally, record| {
            tally.add(record);
            tally
        })
        .finish(code.clone(), rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{META_AFFILIATE_REF, Metadata, PaymentStatus};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn record(id: &str, code: Option<&str>, status: &str, amount: u64) -> PaymentRecord {
        let mut metadata = Metadata::new();
        if let Some(code) = code {
            metadata.insert(META_AFFILIATE_REF.to_string(), code.to_string());
        }
        PaymentRecord {
            id: id.to_string(),
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            amount_total: Some(amount),
            currency: "usd".to_string(),
            payment_status: PaymentStatus::from(status.to_string()),
            metadata,
        }
    }

    fn code(raw: &str) -> ReferralCode {
        ReferralCode::parse(raw).unwrap()
    }

    fn scenario() -> Vec<PaymentRecord> {
        vec![
            record("cs_1", Some("abc-123"), "paid", 780_000),
            record("cs_2", Some("abc-123"), "unpaid", 500_000),
            record("cs_3", Some("xyz-999"), "paid", 1_680_000),
            record("cs_4", None, "paid", 999),
        ]
    }

    #[test]
    fn aggregates_known_scenario() {
        let rows = aggregate_by_referrer(&scenario());
        assert_eq!(
            rows,
            vec![
                AffiliateSummary {
                    code: code("xyz-999"),
                    order_count: 1,
                    paid_order_count: 1,
                    revenue_cents: 1_680_000,
                    commission_cents: 84_000,
                },
                AffiliateSummary {
                    code: code("abc-123"),
                    order_count: 2,
                    paid_order_count: 1,
                    revenue_cents: 780_000,
                    commission_cents: 39_000,
                },
            ]
        );
    }

    #[test]
    fn empty_input_yields_no_rows() {
        assert!(aggregate_by_referrer(&Vec::<PaymentRecord>::new()).is_empty());
    }

    #[test]
    fn skips_invalid_refs() {
        let records = vec![
            record("cs_1", Some("../../etc"), "paid", 100),
            record("cs_2", Some("a b"), "paid", 100),
            record("cs_3", Some(&"x".repeat(200)), "paid", 100),
        ];
        assert!(aggregate_by_referrer(&records).is_empty());
    }

    #[test]
    fn matches_refs_exactly() {
        let records = vec![
            record("cs_1", Some("abc-123"), "paid", 100),
            record("cs_2", Some("ABC-123"), "paid", 100),
        ];
        let rows = aggregate_by_referrer(&records);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.order_count == 1));
    }

    #[test]
    fn ties_break_by_code_ascending() {
        let records = vec![
            record("cs_1", Some("zeta"), "paid", 500),
            record("cs_2", Some("alpha"), "paid", 500),
            record("cs_3", Some("mid"), "unpaid", 900),
        ];
        let order: Vec<_> = aggregate_by_referrer(&records)
            .into_iter()
            .map(|r| r.code.to_string())
            .collect();
        assert_eq!(order, vec!["alpha", "zeta", "mid"]);
    }

    #[test]
    fn commission_is_applied_to_total_revenue() {
        // 10 + 10 cents at 5% is 1 cent; per-record rounding would give 2.
        let records = vec![
            record("cs_1", Some("abc"), "paid", 10),
            record("cs_2", Some("abc"), "paid", 10),
        ];
        assert_eq!(aggregate_by_referrer(&records)[0].commission_cents, 1);
    }

    #[test]
    fn free_orders_count_but_earn_nothing() {
        let records = vec![
            record("cs_1", Some("abc"), "no_payment_required", 780_000),
            record("cs_2", Some("abc"), "paid", 1_000),
        ];
        assert_eq!(
            aggregate_by_referrer(&records),
            vec![AffiliateSummary {
                code: code("abc"),
                order_count: 2,
                paid_order_count: 1,
                revenue_cents: 1_000,
                commission_cents: 50,
            }]
        );
    }

    #[test]
    fn missing_amount_counts_as_zero_revenue() {
        let mut r = record("cs_1", Some("abc"), "paid", 0);
        r.amount_total = None;
        let summary = summarize_for_referrer([&r], &code("abc"), CommissionRate::DEFAULT);
        assert_eq!(summary.paid_order_count, 1);
        assert_eq!(summary.revenue_cents, 0);
    }

    #[test]
    fn summarizes_one_referrer_with_its_own_rate() {
        let summary =
            summarize_for_referrer(&scenario(), &code("abc-123"), CommissionRate::from_bps(1_000));
        assert_eq!(
            summary,
            AffiliateSummary {
                code: code("abc-123"),
                order_count: 2,
                paid_order_count: 1,
                revenue_cents: 780_000,
                commission_cents: 78_000,
            }
        );
    }

    #[test]
    fn unknown_referrer_summary_is_empty() {
        let summary = summarize_for_referrer(&scenario(), &code("nobody"), CommissionRate::DEFAULT);
        assert_eq!(summary, AffiliateSummary::empty(code("nobody")));
    }

    fn arb_record() -> impl Strategy<Value = PaymentRecord> {
        (
            prop::option::of(prop::sample::select(vec!["abc", "xyz", "q_1", "bad ref"])),
            prop::sample::select(vec!["paid", "unpaid", "no_payment_required"]),
            0u64..5_000_000,
        )
            .prop_map(|(code, status, amount)| record("cs", code, status, amount))
    }

    proptest! {
        #[test]
        fn aggregation_ignores_input_order(
            (records, shuffled) in prop::collection::vec(arb_record(), 0..40)
                .prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle()))
        ) {
            prop_assert_eq!(aggregate_by_referrer(&records), aggregate_by_referrer(&shuffled));
        }

        #[test]
        fn summaries_hold_their_invariants(records in prop::collection::vec(arb_record(), 0..40)) {
            for row in aggregate_by_referrer(&records) {
                prop_assert!(row.paid_order_count <= row.order_count);
                prop_assert_eq!(
                    row.commission_cents,
                    compute_commission_cents(row.revenue_cents, CommissionRate::DEFAULT)
                );
                prop_assert_eq!(
                    &row,
                    &summarize_for_referrer(&records, &row.code, CommissionRate::DEFAULT)
                );
            }
        }
    }
}
