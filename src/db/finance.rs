use bigdecimal::BigDecimal;
use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use super::{activity_values, logged_batch, require, ScyllaConnector, INSERT_ACTIVITY};
use crate::api::{ChartEntryInput, FeeCutInput};
use crate::error::{AppError, Result};
use crate::models::{
    ActivityEntry, EmailStatus, MembershipRow, MembershipStatus, PaymentRow, PaymentStatus,
    WithdrawalRow, WithdrawalStatus,
};
use crate::revenue::{CutOffChartEntry, FeeBasedCut, PlanDuration, PlanTier};

const CHART_COLUMNS: &str = "chart_id, tier, duration, admin_cut_percentage, gym_owner_cut_percentage";
const FEE_COLUMNS: &str =
    "cut_id, price_range_start, price_range_end, admin_cut_percentage, gym_cut_percentage";
const MEMBERSHIP_COLUMNS: &str =
    "membership_id, user_id, gym_id, plan_id, start_date, end_date, status, created_ts";
const PAYMENT_COLUMNS: &str = "payment_id, user_id, gym_id, plan_id, membership_id, amount, admin_cut, \
    gym_cut, cut_rule, payment_method, status, created_ts";
const WITHDRAWAL_COLUMNS: &str =
    "withdrawal_id, owner_id, amount, payout_method, status, admin_notes, requested_ts, processed_ts";

/// Everything written when an admin records a paid membership.
#[derive(Debug, Clone)]
pub struct NewMembership {
    pub membership_id: Uuid,
    pub payment_id: Uuid,
    pub user_id: Uuid,
    pub gym_id: Uuid,
    pub plan_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub amount: BigDecimal,
    pub admin_cut: BigDecimal,
    pub gym_cut: BigDecimal,
    pub cut_rule: String,
    pub payment_method: String,
    pub recipient: String,
    pub email_subject: String,
    pub email_body: String,
}

impl ScyllaConnector {
    // ---- tier-based cut-off chart ----

    pub async fn list_chart_entries(&self) -> Result<Vec<CutOffChartEntry>> {
        let mut rows: Vec<CutOffChartEntry> = self
            .select(&format!("SELECT {} FROM cut_off_chart", CHART_COLUMNS), ())
            .await?;
        rows.sort_by(|a, b| a.tier.cmp(&b.tier).then_with(|| a.duration.cmp(&b.duration)));
        Ok(rows)
    }

    /// Inserts or replaces the entry for the input's tier and duration.
    pub async fn upsert_chart_entry(&self, input: &ChartEntryInput, activity: &ActivityEntry) -> Result<Uuid> {
        let existing = self
            .list_chart_entries()
            .await?
            .into_iter()
            .find(|e| {
                e.tier.parse::<PlanTier>().ok() == Some(input.tier)
                    && e.duration.parse::<PlanDuration>().ok() == Some(input.duration)
            });
        let chart_id = existing.map(|e| e.chart_id).unwrap_or_else(Uuid::new_v4);

        self.execute_logged(
            "INSERT INTO cut_off_chart (chart_id, tier, duration, admin_cut_percentage, gym_owner_cut_percentage, updated_ts) \
             VALUES (?, ?, ?, ?, ?, ?)",
            (
                chart_id,
                input.tier.as_str(),
                input.duration.as_str(),
                &input.admin_cut_percentage,
                &input.gym_owner_cut_percentage,
                Utc::now(),
            ),
            activity,
        )
        .await?;
        Ok(chart_id)
    }

    pub async fn delete_chart_entry(&self, chart_id: Uuid, activity: &ActivityEntry) -> Result<()> {
        let found: Option<CutOffChartEntry> = self
            .select_one(
                &format!("SELECT {} FROM cut_off_chart WHERE chart_id = ?", CHART_COLUMNS),
                (chart_id,),
            )
            .await?;
        require(found, "Chart entry")?;
        let batch = logged_batch(&["DELETE FROM cut_off_chart WHERE chart_id = ?", INSERT_ACTIVITY]);
        self.session
            .batch(&batch, ((chart_id,), activity_values(activity)))
            .await?;
        Ok(())
    }

    // ---- fee-based cuts ----

    pub async fn list_fee_cuts(&self) -> Result<Vec<FeeBasedCut>> {
        let mut rows: Vec<FeeBasedCut> = self
            .select(&format!("SELECT {} FROM fee_based_cut", FEE_COLUMNS), ())
            .await?;
        rows.sort_by(|a, b| {
            a.price_range_start
                .cmp(&b.price_range_start)
                .then_with(|| a.price_range_end.cmp(&b.price_range_end))
        });
        Ok(rows)
    }

    pub async fn save_fee_cut(
        &self,
        cut_id: Option<Uuid>,
        input: &FeeCutInput,
        activity: &ActivityEntry,
    ) -> Result<Uuid> {
        if let Some(id) = cut_id {
            let exists = self.list_fee_cuts().await?.iter().any(|c| c.cut_id == id);
            if !exists {
                return Err(AppError::NotFound("Fee range not found.".to_string()));
            }
        }
        let cut_id = cut_id.unwrap_or_else(Uuid::new_v4);
        self.execute_logged(
            "INSERT INTO fee_based_cut (cut_id, price_range_start, price_range_end, admin_cut_percentage, gym_cut_percentage, updated_ts) \
             VALUES (?, ?, ?, ?, ?, ?)",
            (
                cut_id,
                &input.price_range_start,
                &input.price_range_end,
                &input.admin_cut_percentage,
                &input.gym_cut_percentage,
                Utc::now(),
            ),
            activity,
        )
        .await?;
        Ok(cut_id)
    }

    pub async fn delete_fee_cut(&self, cut_id: Uuid, activity: &ActivityEntry) -> Result<()> {
        let found: Option<FeeBasedCut> = self
            .select_one(
                &format!("SELECT {} FROM fee_based_cut WHERE cut_id = ?", FEE_COLUMNS),
                (cut_id,),
            )
            .await?;
        require(found, "Fee range")?;
        let batch = logged_batch(&["DELETE FROM fee_based_cut WHERE cut_id = ?", INSERT_ACTIVITY]);
        self.session
            .batch(&batch, ((cut_id,), activity_values(activity)))
            .await?;
        Ok(())
    }

    // ---- memberships ----

    pub async fn list_memberships(&self) -> Result<Vec<MembershipRow>> {
        let mut rows: Vec<MembershipRow> = self
            .select(&format!("SELECT {} FROM membership", MEMBERSHIP_COLUMNS), ())
            .await?;
        rows.sort_by(|a, b| b.created_ts.cmp(&a.created_ts));
        Ok(rows)
    }

    /// Membership, payment, audit row and confirmation email go in together
    /// or not at all.
    pub async fn insert_membership(&self, new: &NewMembership, activity: &ActivityEntry) -> Result<()> {
        let now = Utc::now();
        let batch = logged_batch(&[
            "INSERT INTO membership (membership_id, user_id, gym_id, plan_id, start_date, end_date, status, created_ts) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            "INSERT INTO payment (payment_id, user_id, gym_id, plan_id, membership_id, amount, admin_cut, gym_cut, \
             cut_rule, payment_method, status, created_ts) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            super::messaging::INSERT_EMAIL,
            INSERT_ACTIVITY,
        ]);

        self.session
            .batch(
                &batch,
                (
                    (
                        new.membership_id,
                        new.user_id,
                        new.gym_id,
                        new.plan_id,
                        new.start_date,
                        new.end_date,
                        MembershipStatus::Active.as_str(),
                        now,
                    ),
                    (
                        new.payment_id,
                        new.user_id,
                        new.gym_id,
                        new.plan_id,
                        Some(new.membership_id),
                        &new.amount,
                        &new.admin_cut,
                        &new.gym_cut,
                        &new.cut_rule,
                        &new.payment_method,
                        PaymentStatus::Completed.as_str(),
                        now,
                    ),
                    (
                        Uuid::new_v4(),
                        &new.recipient,
                        &new.email_subject,
                        &new.email_body,
                        EmailStatus::Pending.as_str(),
                        0_i32,
                        now,
                    ),
                    activity_values(activity),
                ),
            )
            .await?;
        Ok(())
    }

    // ---- payments ----

    pub async fn list_payments(&self) -> Result<Vec<PaymentRow>> {
        let mut rows: Vec<PaymentRow> = self
            .select(&format!("SELECT {} FROM payment", PAYMENT_COLUMNS), ())
            .await?;
        rows.sort_by(|a, b| b.created_ts.cmp(&a.created_ts));
        Ok(rows)
    }

    // ---- withdrawals ----

    pub async fn list_withdrawals(&self) -> Result<Vec<WithdrawalRow>> {
        let mut rows: Vec<WithdrawalRow> = self
            .select(&format!("SELECT {} FROM withdrawal", WITHDRAWAL_COLUMNS), ())
            .await?;
        rows.sort_by(|a, b| b.requested_ts.cmp(&a.requested_ts));
        Ok(rows)
    }

    pub async fn change_withdrawal_status(
        &self,
        withdrawal_id: Uuid,
        target: WithdrawalStatus,
        notes: Option<String>,
        activity: &ActivityEntry,
    ) -> Result<WithdrawalRow> {
        let withdrawal: WithdrawalRow = self
            .select_one(
                &format!("SELECT {} FROM withdrawal WHERE withdrawal_id = ?", WITHDRAWAL_COLUMNS),
                (withdrawal_id,),
            )
            .await?
            .ok_or_else(|| AppError::NotFound("Withdrawal request not found.".to_string()))?;

        let current = withdrawal.status();
        if !current.can_move_to(target) {
            return Err(AppError::Conflict(format!(
                "A {} withdrawal cannot be marked {}.",
                current, target
            )));
        }

        let now = Utc::now();
        let message = match &notes {
            Some(n) => format!("Your withdrawal of {} is now {}. Note: {}", withdrawal.amount, target, n),
            None => format!("Your withdrawal of {} is now {}.", withdrawal.amount, target),
        };
        let batch = logged_batch(&[
            "UPDATE withdrawal SET status = ?, admin_notes = ?, processed_ts = ? WHERE withdrawal_id = ?",
            "INSERT INTO notification (notification_id, recipient_type, recipient_id, title, message, is_read, created_ts) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            INSERT_ACTIVITY,
        ]);
        self.session
            .batch(
                &batch,
                (
                    (target.as_str(), notes.or(withdrawal.admin_notes.clone()), now, withdrawal_id),
                    (
                        Uuid::new_v4(),
                        "owner",
                        Some(withdrawal.owner_id),
                        format!("Withdrawal {}", target),
                        message,
                        false,
                        now,
                    ),
                    activity_values(activity),
                ),
            )
            .await?;
        Ok(withdrawal)
    }
}
