//! Figures shown on the admin landing page.

use crate::models::{
    EmailRow, EmailStatus, GymRow, GymStatus, MemberRow, MembershipRow, MembershipStatus,
    NotificationRow, OwnerRow, PaymentRow, TournamentRow, TournamentStatus, UserStatus,
    WithdrawalRow, WithdrawalStatus,
};
use crate::report::{revenue_report, RevenueTotals};
use chrono::NaiveDate;
use std::collections::HashMap;

pub struct DashboardInputs<'a> {
    /// Local date used to expire memberships past their end date.
    pub today: NaiveDate,
    pub members: &'a [MemberRow],
    pub owners: &'a [OwnerRow],
    pub gyms: &'a [GymRow],
    pub memberships: &'a [MembershipRow],
    pub payments: &'a [PaymentRow],
    pub withdrawals: &'a [WithdrawalRow],
    pub tournaments: &'a [TournamentRow],
    pub emails: &'a [EmailRow],
    pub notifications: &'a [NotificationRow],
}

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardStats {
    pub members: usize,
    pub suspended_members: usize,
    pub owners: usize,
    /// One entry per gym status, in declaration order.
    pub gyms_by_status: Vec<(GymStatus, usize)>,
    pub active_memberships: usize,
    pub pending_withdrawals: usize,
    pub pending_tournaments: usize,
    pub pending_emails: usize,
    pub failed_emails: usize,
    pub unread_notifications: usize,
    pub revenue: RevenueTotals,
}

pub fn summarize(inputs: &DashboardInputs<'_>) -> DashboardStats {
    let gyms_by_status = GymStatus::ALL
        .iter()
        .map(|status| (*status, inputs.gyms.iter().filter(|g| g.status() == *status).count()))
        .collect();

    let payments: Vec<&PaymentRow> = inputs.payments.iter().collect();
    let revenue = revenue_report(&payments, &HashMap::new()).totals;

    DashboardStats {
        members: inputs.members.len(),
        suspended_members: inputs
            .members
            .iter()
            .filter(|m| m.status() == UserStatus::Suspended)
            .count(),
        owners: inputs.owners.len(),
        gyms_by_status,
        active_memberships: inputs
            .memberships
            .iter()
            .filter(|m| m.effective_status(inputs.today) == MembershipStatus::Active)
            .count(),
        pending_withdrawals: inputs
            .withdrawals
            .iter()
            .filter(|w| w.status() == WithdrawalStatus::Pending)
            .count(),
        pending_tournaments: inputs
            .tournaments
            .iter()
            .filter(|t| t.status() == TournamentStatus::Pending)
            .count(),
        pending_emails: inputs.emails.iter().filter(|e| e.status() == EmailStatus::Pending).count(),
        failed_emails: inputs.emails.iter().filter(|e| e.status() == EmailStatus::Failed).count(),
        unread_notifications: inputs
            .notifications
            .iter()
            .filter(|n| n.recipient_type == "admin" && !n.is_read)
            .count(),
        revenue,
    }
}

impl DashboardStats {
    pub fn gyms_with(&self, status: GymStatus) -> usize {
        self.gyms_by_status
            .iter()
            .find(|(s, _)| *s == status)
            .map_or(0, |(_, n)| *n)
    }

    pub fn total_gyms(&self) -> usize {
        self.gyms_by_status.iter().map(|(_, n)| n).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use chrono::Utc;
    use uuid::Uuid;

    fn gym(status: &str) -> GymRow {
        GymRow {
            gym_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            name: "Iron Temple".to_string(),
            address: None,
            city: Some("Cebu".to_string()),
            description: None,
            status: status.to_string(),
            created_ts: Utc::now(),
        }
    }

    fn payment(amount: i64, admin: i64, status: &str) -> PaymentRow {
        PaymentRow {
            payment_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            gym_id: Uuid::new_v4(),
            plan_id: Uuid::new_v4(),
            membership_id: None,
            amount: BigDecimal::from(amount),
            admin_cut: BigDecimal::from(admin),
            gym_cut: BigDecimal::from(amount - admin),
            cut_rule: "fee-based".to_string(),
            payment_method: "cash".to_string(),
            status: status.to_string(),
            created_ts: Utc::now(),
        }
    }

    fn notification(recipient_type: &str, is_read: bool) -> NotificationRow {
        NotificationRow {
            notification_id: Uuid::new_v4(),
            recipient_type: recipient_type.to_string(),
            recipient_id: None,
            title: "New gym".to_string(),
            message: "A gym applied".to_string(),
            is_read,
            created_ts: Utc::now(),
        }
    }

    #[test]
    fn counts_gyms_and_revenue() {
        let gyms = vec![gym("pending"), gym("pending"), gym("approved")];
        let payments = vec![payment(1000, 200, "completed"), payment(500, 50, "failed")];
        let notifications = vec![
            notification("admin", false),
            notification("admin", true),
            notification("owner", false),
        ];

        let stats = summarize(&DashboardInputs {
            today: Utc::now().date_naive(),
            members: &[],
            owners: &[],
            gyms: &gyms,
            memberships: &[],
            payments: &payments,
            withdrawals: &[],
            tournaments: &[],
            emails: &[],
            notifications: &notifications,
        });

        assert_eq!(stats.gyms_with(GymStatus::Pending), 2);
        assert_eq!(stats.gyms_with(GymStatus::Suspended), 0);
        assert_eq!(stats.total_gyms(), 3);
        assert_eq!(stats.revenue.payments, 1);
        assert_eq!(stats.revenue.gross, BigDecimal::from(1000));
        assert_eq!(stats.revenue.admin_share, BigDecimal::from(200));
        assert_eq!(stats.unread_notifications, 1);
    }

    fn membership(status: &str, end_date: NaiveDate) -> MembershipRow {
        MembershipRow {
            membership_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            gym_id: Uuid::new_v4(),
            plan_id: Uuid::new_v4(),
            start_date: end_date - chrono::Duration::days(30),
            end_date,
            status: status.to_string(),
            created_ts: Utc::now(),
        }
    }

    #[test]
    fn lapsed_memberships_are_not_counted_active() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let memberships = vec![
            membership("active", NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()),
            membership("active", today),
            membership("active", NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()),
            membership("cancelled", NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()),
        ];

        let stats = summarize(&DashboardInputs {
            today,
            members: &[],
            owners: &[],
            gyms: &[],
            memberships: &memberships,
            payments: &[],
            withdrawals: &[],
            tournaments: &[],
            emails: &[],
            notifications: &[],
        });

        assert_eq!(stats.active_memberships, 2);
    }
}
