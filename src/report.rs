//! Payment listings and revenue totals, plus their CSV exports.

use bigdecimal::{BigDecimal, Zero};
use chrono_tz::Tz;
use std::collections::HashMap;
use uuid::Uuid;

use crate::api::DateRange;
use crate::models::{PaymentRow, PaymentStatus};

#[derive(Debug, Clone, PartialEq)]
pub struct RevenueTotals {
    pub payments: usize,
    pub gross: BigDecimal,
    pub admin_share: BigDecimal,
    pub gym_share: BigDecimal,
}

impl Default for RevenueTotals {
    fn default() -> Self {
        RevenueTotals {
            payments: 0,
            gross: BigDecimal::zero(),
            admin_share: BigDecimal::zero(),
            gym_share: BigDecimal::zero(),
        }
    }
}

impl RevenueTotals {
    fn add(&mut self, payment: &PaymentRow) {
        self.payments += 1;
        self.gross += &payment.amount;
        self.admin_share += &payment.admin_cut;
        self.gym_share += &payment.gym_cut;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GymRevenue {
    pub gym_id: Uuid,
    pub gym_name: String,
    pub totals: RevenueTotals,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RevenueReport {
    pub totals: RevenueTotals,
    pub by_gym: Vec<GymRevenue>,
}

/// Payments whose local creation date falls in `range`, optionally
/// narrowed to one status and one gym.
pub fn filter_payments<'a>(
    payments: &'a [PaymentRow],
    range: DateRange,
    status: Option<PaymentStatus>,
    gym_id: Option<Uuid>,
    tz: Tz,
) -> Vec<&'a PaymentRow> {
    payments
        .iter()
        .filter(|p| range.contains(p.created_ts.with_timezone(&tz).date_naive()))
        .filter(|p| status.map_or(true, |s| p.status() == s))
        .filter(|p| gym_id.map_or(true, |g| p.gym_id == g))
        .collect()
}

/// Totals over completed payments only, largest gross first per gym.
pub fn revenue_report(payments: &[&PaymentRow], gym_names: &HashMap<Uuid, String>) -> RevenueReport {
    let mut totals = RevenueTotals::default();
    let mut by_gym: HashMap<Uuid, RevenueTotals> = HashMap::new();

    for payment in payments.iter().filter(|p| p.status() == PaymentStatus::Completed) {
        totals.add(payment);
        by_gym.entry(payment.gym_id).or_default().add(payment);
    }

    let mut by_gym: Vec<GymRevenue> = by_gym
        .into_iter()
        .map(|(gym_id, totals)| GymRevenue {
            gym_id,
            gym_name: gym_names
                .get(&gym_id)
                .cloned()
                .unwrap_or_else(|| "Unknown gym".to_string()),
            totals,
        })
        .collect();
    by_gym.sort_by(|a, b| {
        b.totals
            .gross
            .cmp(&a.totals.gross)
            .then_with(|| a.gym_name.cmp(&b.gym_name))
    });

    RevenueReport { totals, by_gym }
}

/// Quotes a CSV field when it holds a separator, quote or line break.
/// Text that a spreadsheet would read as a formula gets a leading `'`.
pub fn csv_field(value: &str) -> String {
    let value = if value.starts_with(&['=', '+', '-', '@', '\t', '\r'][..]) && !is_number(value) {
        format!("'{}", value)
    } else {
        value.to_string()
    };
    if value.contains(&[',', '"', '\n', '\r'][..]) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value
    }
}

fn is_number(value: &str) -> bool {
    value.parse::<BigDecimal>().is_ok()
}

pub fn csv_line(fields: &[String]) -> String {
    let mut line = fields.iter().map(|f| csv_field(f)).collect::<Vec<_>>().join(",");
    line.push_str("\r\n");
    line
}

pub fn payments_csv(
    payments: &[&PaymentRow],
    member_names: &HashMap<Uuid, String>,
    gym_names: &HashMap<Uuid, String>,
    tz: Tz,
) -> String {
    let mut out = csv_line(&[
        "Payment ID".to_string(),
        "Date".to_string(),
        "Member".to_string(),
        "Gym".to_string(),
        "Amount".to_string(),
        "Admin Cut".to_string(),
        "Gym Cut".to_string(),
        "Rule".to_string(),
        "Method".to_string(),
        "Status".to_string(),
    ]);
    for p in payments {
        out.push_str(&csv_line(&[
            p.payment_id.to_string(),
            p.created_ts.with_timezone(&tz).format("%Y-%m-%d %H:%M").to_string(),
            member_names.get(&p.user_id).cloned().unwrap_or_default(),
            gym_names.get(&p.gym_id).cloned().unwrap_or_default(),
            p.amount.to_string(),
            p.admin_cut.to_string(),
            p.gym_cut.to_string(),
            p.cut_rule.clone(),
            p.payment_method.clone(),
            p.status.clone(),
        ]));
    }
    out
}

pub fn revenue_csv(report: &RevenueReport) -> String {
    let mut out = csv_line(&[
        "Gym".to_string(),
        "Payments".to_string(),
        "Gross".to_string(),
        "Admin Share".to_string(),
        "Gym Share".to_string(),
    ]);
    for row in &report.by_gym {
        out.push_str(&csv_line(&[
            row.gym_name.clone(),
            row.totals.payments.to_string(),
            row.totals.gross.to_string(),
            row.totals.admin_share.to_string(),
            row.totals.gym_share.to_string(),
        ]));
    }
    out.push_str(&csv_line(&[
        "TOTAL".to_string(),
        report.totals.payments.to_string(),
        report.totals.gross.to_string(),
        report.totals.admin_share.to_string(),
        report.totals.gym_share.to_string(),
    ]));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn dec(s: &str) -> BigDecimal {
        s.parse().unwrap()
    }

    fn payment(gym_id: Uuid, amount: &str, admin: &str, status: &str, ts: chrono::DateTime<Utc>) -> PaymentRow {
        let amount = dec(amount);
        let admin = dec(admin);
        PaymentRow {
            payment_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            gym_id,
            plan_id: Uuid::new_v4(),
            membership_id: None,
            gym_cut: &amount - &admin,
            amount,
            admin_cut: admin,
            cut_rule: "tier-based".to_string(),
            payment_method: "cash".to_string(),
            status: status.to_string(),
            created_ts: ts,
        }
    }

    #[test]
    fn csv_quotes_only_when_needed() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("Iron, Inc."), "\"Iron, Inc.\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn csv_neutralizes_formula_text() {
        assert_eq!(csv_field("=HYPERLINK(\"x\")"), "\"'=HYPERLINK(\"\"x\"\")\"");
        assert_eq!(csv_field("+63 912"), "'+63 912");
        assert_eq!(csv_field("@SUM(A1)"), "'@SUM(A1)");
        assert_eq!(csv_field("-Iron Gym"), "'-Iron Gym");
        assert_eq!(csv_field("-150.00"), "-150.00");
        assert_eq!(csv_field("Ana = Bea"), "Ana = Bea");
    }

    #[test]
    fn report_counts_completed_only_and_groups_by_gym() {
        let gym_a = Uuid::new_v4();
        let gym_b = Uuid::new_v4();
        let ts = Utc.with_ymd_and_hms(2024, 5, 10, 3, 0, 0).unwrap();
        let rows = vec![
            payment(gym_a, "1000", "300", "completed", ts),
            payment(gym_a, "500", "150", "completed", ts),
            payment(gym_b, "2000", "400", "completed", ts),
            payment(gym_b, "9999", "999", "refunded", ts),
        ];
        let refs: Vec<&PaymentRow> = rows.iter().collect();
        let names = HashMap::from([(gym_a, "Alpha Gym".to_string()), (gym_b, "Beta, Fitness".to_string())]);

        let report = revenue_report(&refs, &names);
        assert_eq!(report.totals.payments, 3);
        assert_eq!(report.totals.gross, dec("3500"));
        assert_eq!(report.totals.admin_share, dec("850"));
        assert_eq!(report.totals.gym_share, dec("2650"));
        assert_eq!(report.by_gym[0].gym_name, "Beta, Fitness");
        assert_eq!(report.by_gym[1].totals.gross, dec("1500"));

        let csv = revenue_csv(&report);
        let lines: Vec<&str> = csv.split("\r\n").collect();
        assert_eq!(lines[0], "Gym,Payments,Gross,Admin Share,Gym Share");
        assert!(lines[1].starts_with("\"Beta, Fitness\",1,2000"));
        assert!(lines[3].starts_with("TOTAL,3,3500"));
    }

    #[test]
    fn filter_uses_local_dates() {
        let gym = Uuid::new_v4();
        // 2024-05-31 20:00 UTC is already June 1st in Manila.
        let late = Utc.with_ymd_and_hms(2024, 5, 31, 20, 0, 0).unwrap();
        let rows = vec![payment(gym, "100", "10", "completed", late)];
        let june = DateRange {
            from: NaiveDate::from_ymd_opt(2024, 6, 1),
            to: NaiveDate::from_ymd_opt(2024, 6, 30),
        };

        let hits = filter_payments(&rows, june, None, None, chrono_tz::Asia::Manila);
        assert_eq!(hits.len(), 1);
        let hits = filter_payments(&rows, june, None, None, chrono_tz::UTC);
        assert!(hits.is_empty());
        let hits = filter_payments(&rows, june, Some(PaymentStatus::Refunded), None, chrono_tz::Asia::Manila);
        assert!(hits.is_empty());
    }

    #[test]
    fn payments_csv_has_header_and_rows() {
        let gym = Uuid::new_v4();
        let ts = Utc.with_ymd_and_hms(2024, 5, 10, 3, 0, 0).unwrap();
        let rows = vec![payment(gym, "100", "10", "completed", ts)];
        let refs: Vec<&PaymentRow> = rows.iter().collect();
        let gyms = HashMap::from([(gym, "Alpha Gym".to_string())]);
        let csv = payments_csv(&refs, &HashMap::new(), &gyms, chrono_tz::Asia::Manila);
        let lines: Vec<&str> = csv.trim_end().split("\r\n").collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("2024-05-10 11:00"));
        assert!(lines[1].contains("Alpha Gym"));
    }
}
