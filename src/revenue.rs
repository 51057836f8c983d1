//! Revenue cut-off resolution.
//!
//! A membership plan's price is split between the platform (admin) and the
//! gym. A fee-based rule whose price range contains the plan price takes
//! priority; otherwise the tier-based chart entry for the plan's tier and
//! billing duration applies.

use bigdecimal::{BigDecimal, RoundingMode, Zero};
use chrono::{Months, NaiveDate};
use scylla::DeserializeRow;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{AppError, Result};

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlanTier {
    Tier1 = 1,
    Tier2 = 2,
    Tier3 = 3,
}

impl PlanTier {
    pub const ALL: &'static [PlanTier] = &[PlanTier::Tier1, PlanTier::Tier2, PlanTier::Tier3];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Tier1 => "Tier 1",
            PlanTier::Tier2 => "Tier 2",
            PlanTier::Tier3 => "Tier 3",
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanTier {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        match compact.to_ascii_lowercase().as_str() {
            "tier1" | "1" => Ok(PlanTier::Tier1),
            "tier2" | "2" => Ok(PlanTier::Tier2),
            "tier3" | "3" => Ok(PlanTier::Tier3),
            _ => Err(AppError::BadRequest(format!("Unknown membership tier '{}'", s))),
        }
    }
}

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlanDuration {
    Daily = 0,
    Weekly = 1,
    Monthly = 2,
    Quarterly = 3,
    SemiAnnual = 4,
    Annual = 5,
}

impl PlanDuration {
    pub const ALL: &'static [PlanDuration] = &[
        PlanDuration::Daily,
        PlanDuration::Weekly,
        PlanDuration::Monthly,
        PlanDuration::Quarterly,
        PlanDuration::SemiAnnual,
        PlanDuration::Annual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanDuration::Daily => "Daily",
            PlanDuration::Weekly => "Weekly",
            PlanDuration::Monthly => "Monthly",
            PlanDuration::Quarterly => "Quarterly",
            PlanDuration::SemiAnnual => "Semi-Annual",
            PlanDuration::Annual => "Annual",
        }
    }

    /// Last day covered by a membership starting on `start`.
    pub fn end_date(&self, start: NaiveDate) -> NaiveDate {
        let months = match self {
            PlanDuration::Daily => return start,
            PlanDuration::Weekly => return start + chrono::Duration::days(6),
            PlanDuration::Monthly => 1,
            PlanDuration::Quarterly => 3,
            PlanDuration::SemiAnnual => 6,
            PlanDuration::Annual => 12,
        };
        start
            .checked_add_months(Months::new(months))
            .and_then(|d| d.pred_opt())
            .unwrap_or(start)
    }
}

impl fmt::Display for PlanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanDuration {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let compact: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match compact.as_str() {
            "daily" | "day" => Ok(PlanDuration::Daily),
            "weekly" | "week" => Ok(PlanDuration::Weekly),
            "monthly" | "month" => Ok(PlanDuration::Monthly),
            "quarterly" | "3months" => Ok(PlanDuration::Quarterly),
            "semiannual" | "6months" => Ok(PlanDuration::SemiAnnual),
            "annual" | "yearly" | "year" => Ok(PlanDuration::Annual),
            _ => Err(AppError::BadRequest(format!("Unknown billing duration '{}'", s))),
        }
    }
}

#[derive(Debug, Clone, DeserializeRow)]
pub struct CutOffChartEntry {
    pub chart_id: Uuid,
    pub tier: String,
    pub duration: String,
    pub admin_cut_percentage: BigDecimal,
    pub gym_owner_cut_percentage: BigDecimal,
}

impl CutOffChartEntry {
    fn matches(&self, tier: PlanTier, duration: PlanDuration) -> bool {
        self.tier.parse::<PlanTier>().ok() == Some(tier)
            && self.duration.parse::<PlanDuration>().ok() == Some(duration)
    }
}

#[derive(Debug, Clone, DeserializeRow)]
pub struct FeeBasedCut {
    pub cut_id: Uuid,
    pub price_range_start: BigDecimal,
    pub price_range_end: BigDecimal,
    pub admin_cut_percentage: BigDecimal,
    pub gym_cut_percentage: BigDecimal,
}

impl FeeBasedCut {
    pub fn contains(&self, price: &BigDecimal) -> bool {
        &self.price_range_start <= price && price <= &self.price_range_end
    }

    pub fn overlaps(&self, other: &FeeBasedCut) -> bool {
        self.price_range_start <= other.price_range_end && other.price_range_start <= self.price_range_end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CutRule {
    FeeBased,
    TierBased,
    Unresolved,
}

impl CutRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            CutRule::FeeBased => "fee-based",
            CutRule::TierBased => "tier-based",
            CutRule::Unresolved => "unresolved",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RevenueSplit {
    pub rule: CutRule,
    /// Id of the chart entry or fee range that produced the split.
    pub source_id: Option<Uuid>,
    pub admin_percentage: BigDecimal,
    pub gym_percentage: BigDecimal,
    pub admin_amount: BigDecimal,
    pub gym_amount: BigDecimal,
}

impl RevenueSplit {
    fn unresolved(price: &BigDecimal) -> Self {
        RevenueSplit {
            rule: CutRule::Unresolved,
            source_id: None,
            admin_percentage: BigDecimal::zero(),
            gym_percentage: BigDecimal::zero(),
            admin_amount: BigDecimal::zero(),
            gym_amount: round_money(price),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.rule != CutRule::Unresolved
    }
}

pub fn round_money(value: &BigDecimal) -> BigDecimal {
    value.with_scale_round(2, RoundingMode::HalfUp)
}

fn split_amounts(price: &BigDecimal, admin_percentage: &BigDecimal) -> (BigDecimal, BigDecimal) {
    let hundred = BigDecimal::from(100);
    let admin_amount = round_money(&(price * admin_percentage / hundred));
    let gym_amount = round_money(price) - &admin_amount;
    (admin_amount, gym_amount)
}

/// Picks the fee range for `price`. With overlapping ranges the lowest
/// start (then lowest end) wins.
pub fn matching_fee_cut<'a>(price: &BigDecimal, fee_cuts: &'a [FeeBasedCut]) -> Option<&'a FeeBasedCut> {
    fee_cuts
        .iter()
        .filter(|cut| cut.contains(price))
        .min_by(|a, b| {
            a.price_range_start
                .cmp(&b.price_range_start)
                .then_with(|| a.price_range_end.cmp(&b.price_range_end))
        })
}

pub fn resolve_split(
    price: &BigDecimal,
    tier: PlanTier,
    duration: PlanDuration,
    fee_cuts: &[FeeBasedCut],
    chart: &[CutOffChartEntry],
) -> RevenueSplit {
    if let Some(cut) = matching_fee_cut(price, fee_cuts) {
        let (admin_amount, gym_amount) = split_amounts(price, &cut.admin_cut_percentage);
        return RevenueSplit {
            rule: CutRule::FeeBased,
            source_id: Some(cut.cut_id),
            admin_percentage: cut.admin_cut_percentage.clone(),
            gym_percentage: cut.gym_cut_percentage.clone(),
            admin_amount,
            gym_amount,
        };
    }

    match chart.iter().find(|entry| entry.matches(tier, duration)) {
        Some(entry) => {
            let (admin_amount, gym_amount) = split_amounts(price, &entry.admin_cut_percentage);
            RevenueSplit {
                rule: CutRule::TierBased,
                source_id: Some(entry.chart_id),
                admin_percentage: entry.admin_cut_percentage.clone(),
                gym_percentage: entry.gym_owner_cut_percentage.clone(),
                admin_amount,
                gym_amount,
            }
        }
        None => RevenueSplit::unresolved(price),
    }
}

/// Like `resolve_split` but works from the plan's stored tier and duration
/// text. Unknown text resolves only through a fee range.
pub fn resolve_for_plan(
    price: &BigDecimal,
    tier: &str,
    duration: &str,
    fee_cuts: &[FeeBasedCut],
    chart: &[CutOffChartEntry],
) -> RevenueSplit {
    match (tier.parse::<PlanTier>(), duration.parse::<PlanDuration>()) {
        (Ok(tier), Ok(duration)) => resolve_split(price, tier, duration, fee_cuts, chart),
        _ => match matching_fee_cut(price, fee_cuts) {
            Some(_) => resolve_split(price, PlanTier::Tier1, PlanDuration::Daily, fee_cuts, &[]),
            None => RevenueSplit::unresolved(price),
        },
    }
}

/// Every pair of fee ranges sharing at least one price.
pub fn find_overlaps(fee_cuts: &[FeeBasedCut]) -> Vec<(Uuid, Uuid)> {
    let mut overlaps = Vec::new();
    for (i, a) in fee_cuts.iter().enumerate() {
        for b in &fee_cuts[i + 1..] {
            if a.overlaps(b) {
                overlaps.push((a.cut_id, b.cut_id));
            }
        }
    }
    overlaps
}

pub fn validate_percentages(admin: &BigDecimal, gym: &BigDecimal) -> Result<()> {
    let hundred = BigDecimal::from(100);
    for (label, value) in [("Admin", admin), ("Gym", gym)] {
        if value < &BigDecimal::zero() || value > &hundred {
            return Err(AppError::Validation(format!(
                "{} cut percentage must be between 0 and 100.",
                label
            )));
        }
    }
    if admin + gym != hundred {
        return Err(AppError::Validation(
            "Admin and gym cut percentages must add up to 100.".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_range(start: &BigDecimal, end: &BigDecimal) -> Result<()> {
    if start < &BigDecimal::zero() {
        return Err(AppError::Validation("Price range start cannot be negative.".to_string()));
    }
    if start > end {
        return Err(AppError::Validation(
            "Price range start must not exceed the range end.".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> BigDecimal {
        s.parse().unwrap()
    }

    fn fee(start: &str, end: &str, admin: &str) -> FeeBasedCut {
        let admin = dec(admin);
        FeeBasedCut {
            cut_id: Uuid::new_v4(),
            price_range_start: dec(start),
            price_range_end: dec(end),
            gym_cut_percentage: BigDecimal::from(100) - &admin,
            admin_cut_percentage: admin,
        }
    }

    fn chart(tier: &str, duration: &str, admin: &str) -> CutOffChartEntry {
        let admin = dec(admin);
        CutOffChartEntry {
            chart_id: Uuid::new_v4(),
            tier: tier.to_string(),
            duration: duration.to_string(),
            gym_owner_cut_percentage: BigDecimal::from(100) - &admin,
            admin_cut_percentage: admin,
        }
    }

    #[test]
    fn fee_range_overrides_tier_chart() {
        let fees = vec![fee("1000", "2000", "15")];
        let table = vec![chart("Tier 1", "Monthly", "30")];
        let split = resolve_split(&dec("1500"), PlanTier::Tier1, PlanDuration::Monthly, &fees, &table);
        assert_eq!(split.rule, CutRule::FeeBased);
        assert_eq!(split.source_id, Some(fees[0].cut_id));
        assert_eq!(split.admin_amount, dec("225.00"));
        assert_eq!(split.gym_amount, dec("1275.00"));
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let fees = vec![fee("1000", "2000", "10")];
        for price in ["1000", "2000", "1000.00"] {
            let split = resolve_split(&dec(price), PlanTier::Tier2, PlanDuration::Annual, &fees, &[]);
            assert_eq!(split.rule, CutRule::FeeBased, "price {}", price);
        }
        let split = resolve_split(&dec("2000.01"), PlanTier::Tier2, PlanDuration::Annual, &fees, &[]);
        assert_eq!(split.rule, CutRule::Unresolved);
    }

    #[test]
    fn falls_back_to_tier_and_duration() {
        let fees = vec![fee("5000", "9000", "10")];
        let table = vec![
            chart("Tier 1", "Monthly", "30"),
            chart("Tier 2", "Monthly", "25"),
            chart("Tier 2", "Annual", "20"),
        ];
        let split = resolve_split(&dec("999"), PlanTier::Tier2, PlanDuration::Monthly, &fees, &table);
        assert_eq!(split.rule, CutRule::TierBased);
        assert_eq!(split.source_id, Some(table[1].chart_id));
        assert_eq!(split.admin_percentage, dec("25"));
        assert_eq!(split.gym_percentage, dec("75"));
        assert_eq!(split.admin_amount, dec("249.75"));
        assert_eq!(split.gym_amount, dec("749.25"));
    }

    #[test]
    fn nothing_matches_is_unresolved() {
        let table = vec![chart("Tier 1", "Monthly", "30")];
        let split = resolve_split(&dec("800"), PlanTier::Tier3, PlanDuration::Weekly, &[], &table);
        assert!(!split.is_resolved());
        assert_eq!(split.admin_amount, BigDecimal::zero());
    }

    #[test]
    fn overlapping_ranges_pick_lowest_start() {
        let wide = fee("0", "5000", "20");
        let narrow = fee("1000", "1500", "5");
        let fees = vec![narrow.clone(), wide.clone()];
        let split = resolve_split(&dec("1200"), PlanTier::Tier1, PlanDuration::Daily, &fees, &[]);
        assert_eq!(split.source_id, Some(wide.cut_id));

        let overlaps = find_overlaps(&fees);
        assert_eq!(overlaps, vec![(narrow.cut_id, wide.cut_id)]);
    }

    #[test]
    fn touching_ranges_overlap_but_adjacent_do_not() {
        let a = fee("0", "999.99", "10");
        let b = fee("1000", "1999.99", "10");
        let c = fee("1999.99", "3000", "10");
        let overlaps = find_overlaps(&[a.clone(), b.clone(), c.clone()]);
        assert_eq!(overlaps, vec![(b.cut_id, c.cut_id)]);
    }

    #[test]
    fn amounts_always_sum_to_price() {
        let fees = vec![fee("0", "100000", "33.333")];
        for price in ["0.01", "10", "99.99", "1234.57", "5000"] {
            let p = dec(price);
            let split = resolve_split(&p, PlanTier::Tier1, PlanDuration::Monthly, &fees, &[]);
            assert_eq!(&split.admin_amount + &split.gym_amount, round_money(&p), "price {}", price);
        }
    }

    #[test]
    fn plan_text_with_unknown_tier_still_uses_fee_range() {
        let fees = vec![fee("100", "200", "12")];
        let table = vec![chart("Tier 1", "Monthly", "30")];
        let split = resolve_for_plan(&dec("150"), "Platinum", "Monthly", &fees, &table);
        assert_eq!(split.rule, CutRule::FeeBased);
        let split = resolve_for_plan(&dec("500"), "Platinum", "Monthly", &fees, &table);
        assert_eq!(split.rule, CutRule::Unresolved);
        let split = resolve_for_plan(&dec("500"), "tier 1", "month", &fees, &table);
        assert_eq!(split.rule, CutRule::TierBased);
    }

    #[test]
    fn percentages_must_total_one_hundred() {
        assert!(validate_percentages(&dec("30"), &dec("70")).is_ok());
        assert!(validate_percentages(&dec("30.5"), &dec("69.5")).is_ok());
        assert!(validate_percentages(&dec("30"), &dec("60")).is_err());
        assert!(validate_percentages(&dec("-10"), &dec("110")).is_err());
    }

    #[test]
    fn range_validation() {
        assert!(validate_range(&dec("0"), &dec("0")).is_ok());
        assert!(validate_range(&dec("10"), &dec("5")).is_err());
        assert!(validate_range(&dec("-1"), &dec("5")).is_err());
    }

    #[test]
    fn duration_end_dates() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        assert_eq!(PlanDuration::Daily.end_date(start), start);
        assert_eq!(PlanDuration::Weekly.end_date(start), NaiveDate::from_ymd_opt(2024, 2, 6).unwrap());
        assert_eq!(PlanDuration::Monthly.end_date(start), NaiveDate::from_ymd_opt(2024, 2, 28).unwrap());
        assert_eq!(PlanDuration::Annual.end_date(start), NaiveDate::from_ymd_opt(2025, 1, 30).unwrap());
    }

    #[test]
    fn tier_and_duration_parse_loosely() {
        assert_eq!("TIER 2".parse::<PlanTier>().unwrap(), PlanTier::Tier2);
        assert_eq!("tier3".parse::<PlanTier>().unwrap(), PlanTier::Tier3);
        assert_eq!("Semi-Annual".parse::<PlanDuration>().unwrap(), PlanDuration::SemiAnnual);
        assert_eq!("yearly".parse::<PlanDuration>().unwrap(), PlanDuration::Annual);
        assert!("fortnightly".parse::<PlanDuration>().is_err());
    }
}
