use chrono_tz::Tz;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::MembershipInput;
use crate::dashboard::{self, DashboardStats};
use crate::db::{verify_password, NewMembership, ScyllaConnector};
use crate::error::{AppError, Result};
use crate::models::{ActivityEntry, GymRow, GymStatus, MemberRow, PlanRow, UserStatus};
use crate::revenue::{self, PlanDuration, RevenueSplit};
use crate::templates::{escape, fill, get_template_content, TemplateCache};

#[derive(Debug, Clone)]
pub struct StoreStateManager {
    pub db: Arc<ScyllaConnector>,
}

impl StoreStateManager {
    pub fn new(db: Arc<ScyllaConnector>) -> Self {
        Self { db }
    }

    pub async fn authenticate_admin(
        &self,
        email: &str,
        password: &str,
        ip_address: Option<String>,
        user_agent: Option<String>,
        session_hours: i64,
    ) -> Result<(Uuid, String)> {
        let invalid = || AppError::Unauthorized("Invalid email or password.".to_string());

        let admin = self.db.get_admin_by_email(email).await?.ok_or_else(invalid)?;
        if !verify_password(password, &admin.password_hash)? {
            tracing::warn!("Failed login for {}", admin.email);
            return Err(invalid());
        }

        let session_token = self
            .db
            .create_session(admin.admin_id, ip_address.clone(), user_agent.clone(), session_hours)
            .await?;

        let entry = ActivityEntry::admin(admin.admin_id, "login", format!("{} signed in", admin.email))
            .from_client(ip_address, user_agent);
        self.db.record_activity(&entry).await?;

        Ok((admin.admin_id, session_token))
    }

    pub async fn logout(&self, session_token: &str, activity: &ActivityEntry) -> Result<()> {
        self.db.invalidate_session(session_token).await?;
        self.db.record_activity(activity).await
    }

    /// Creates the first admin account when none exists yet.
    pub async fn seed_admin(&self, email: &str, password: &str) -> Result<Option<Uuid>> {
        if self.db.count_admins().await? > 0 {
            return Ok(None);
        }
        let admin_id = self.db.create_admin(email, password, "Administrator").await?;
        tracing::info!("Seeded first admin account {}", email);
        Ok(Some(admin_id))
    }

    /// `tz` decides which local date memberships expire against.
    pub async fn dashboard(&self, tz: Tz) -> Result<DashboardStats> {
        let (members, owners, gyms, memberships, payments) = futures::try_join!(
            self.db.list_members(),
            self.db.list_owners(),
            self.db.list_gyms(),
            self.db.list_memberships(),
            self.db.list_payments(),
        )?;
        let (withdrawals, tournaments, emails, notifications) = futures::try_join!(
            self.db.list_withdrawals(),
            self.db.list_tournaments(),
            self.db.list_emails(),
            self.db.list_notifications(),
        )?;

        Ok(dashboard::summarize(&dashboard::DashboardInputs {
            today: chrono::Utc::now().with_timezone(&tz).date_naive(),
            members: &members,
            owners: &owners,
            gyms: &gyms,
            memberships: &memberships,
            payments: &payments,
            withdrawals: &withdrawals,
            tournaments: &tournaments,
            emails: &emails,
            notifications: &notifications,
        }))
    }

    /// Resolves the revenue split for the plan and writes the membership,
    /// its payment, the confirmation email and the audit entry together.
    pub async fn record_membership(
        &self,
        input: &MembershipInput,
        activity: &ActivityEntry,
        cache: &TemplateCache,
        tz: Tz,
    ) -> Result<NewMembership> {
        let member = self
            .db
            .get_member(input.user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Member not found.".to_string()))?;
        let plan = self
            .db
            .get_plan(input.plan_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Membership plan not found.".to_string()))?;
        let gym = self
            .db
            .get_gym(plan.gym_id)
            .await?
            .ok_or_else(|| AppError::NotFound("The plan's gym no longer exists.".to_string()))?;

        let (fee_cuts, chart) = futures::try_join!(self.db.list_fee_cuts(), self.db.list_chart_entries())?;
        let split = revenue::resolve_for_plan(&plan.price, &plan.tier, &plan.duration, &fee_cuts, &chart);
        check_membership(&member, &plan, &gym, &split)?;

        let duration = plan
            .duration
            .parse::<PlanDuration>()
            .map_err(|_| AppError::Conflict(format!("The plan \"{}\" has an unknown duration.", plan.name)))?;
        let end_date = duration.end_date(input.start_date);

        let template = get_template_content(cache, "email_membership.html")
            .map_err(|_| AppError::Internal("Membership email template is missing".to_string()))?;
        let email_body = fill(
            &template,
            &[
                ("member_name", escape(&member.full_name)),
                ("gym_name", escape(&gym.name)),
                ("plan_name", escape(&plan.name)),
                ("start_date", input.start_date.format("%B %-d, %Y").to_string()),
                ("end_date", end_date.format("%B %-d, %Y").to_string()),
                ("amount", revenue::round_money(&plan.price).to_string()),
                ("payment_method", escape(&input.payment_method)),
                ("issued_at", chrono::Utc::now().with_timezone(&tz).format("%Y-%m-%d %H:%M").to_string()),
            ],
        );

        let new = NewMembership {
            membership_id: Uuid::new_v4(),
            payment_id: Uuid::new_v4(),
            user_id: member.user_id,
            gym_id: gym.gym_id,
            plan_id: plan.plan_id,
            start_date: input.start_date,
            end_date,
            amount: revenue::round_money(&plan.price),
            admin_cut: split.admin_amount.clone(),
            gym_cut: split.gym_amount.clone(),
            cut_rule: split.rule.as_str().to_string(),
            payment_method: input.payment_method.clone(),
            recipient: member.email.clone(),
            email_subject: format!("Your {} membership at {}", plan.name, gym.name),
            email_body,
        };

        self.db.insert_membership(&new, activity).await?;
        tracing::info!(
            "Recorded membership {} for {} at {} ({} rule, admin {}, gym {})",
            new.membership_id,
            member.email,
            gym.name,
            split.rule.as_str(),
            split.admin_amount,
            split.gym_amount
        );
        Ok(new)
    }
}

/// Nothing is written unless the member and plan are active, the gym is
/// approved and a revenue rule covers the plan.
pub fn check_membership(member: &MemberRow, plan: &PlanRow, gym: &GymRow, split: &RevenueSplit) -> Result<()> {
    if member.status() != UserStatus::Active {
        return Err(AppError::Conflict(format!(
            "{} is {} and cannot take a new membership.",
            member.full_name,
            member.status()
        )));
    }
    if !plan.is_active {
        return Err(AppError::Conflict(format!("The plan \"{}\" is no longer offered.", plan.name)));
    }
    if gym.status() != GymStatus::Approved {
        return Err(AppError::Conflict(format!(
            "{} is {}; memberships can only be recorded for approved gyms.",
            gym.name,
            gym.status()
        )));
    }
    if !split.is_resolved() {
        return Err(AppError::Conflict(format!(
            "No revenue rule covers {} ({} {}, {}). Add a fee range or a chart entry first.",
            plan.name, plan.tier, plan.duration, plan.price
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::revenue::{CutRule, FeeBasedCut, PlanTier};
    use bigdecimal::BigDecimal;
    use chrono::Utc;

    fn dec(s: &str) -> BigDecimal {
        s.parse().unwrap()
    }

    fn member(status: &str) -> MemberRow {
        MemberRow {
            user_id: Uuid::new_v4(),
            email: "ana@example.com".to_string(),
            full_name: "Ana Cruz".to_string(),
            phone: None,
            status: status.to_string(),
            created_ts: Utc::now(),
        }
    }

    fn gym(status: &str) -> GymRow {
        GymRow {
            gym_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            name: "Iron Temple".to_string(),
            address: None,
            city: None,
            description: None,
            status: status.to_string(),
            created_ts: Utc::now(),
        }
    }

    fn plan(gym_id: Uuid, is_active: bool) -> PlanRow {
        PlanRow {
            plan_id: Uuid::new_v4(),
            gym_id,
            name: "Gold Monthly".to_string(),
            tier: PlanTier::Tier2.as_str().to_string(),
            duration: PlanDuration::Monthly.as_str().to_string(),
            price: dec("1500"),
            is_active,
        }
    }

    fn split_for(plan: &PlanRow, fee_cuts: &[FeeBasedCut]) -> RevenueSplit {
        revenue::resolve_for_plan(&plan.price, &plan.tier, &plan.duration, fee_cuts, &[])
    }

    fn covering_range() -> Vec<FeeBasedCut> {
        vec![FeeBasedCut {
            cut_id: Uuid::new_v4(),
            price_range_start: dec("1000"),
            price_range_end: dec("2000"),
            admin_cut_percentage: dec("20"),
            gym_cut_percentage: dec("80"),
        }]
    }

    fn conflict_message(result: Result<()>) -> String {
        match result {
            Err(AppError::Conflict(msg)) => msg,
            other => panic!("expected Conflict, got {:?}", other),
        }
    }

    #[test]
    fn accepts_active_member_plan_and_approved_gym() {
        let gym = gym("approved");
        let plan = plan(gym.gym_id, true);
        let split = split_for(&plan, &covering_range());
        assert_eq!(split.rule, CutRule::FeeBased);
        assert!(check_membership(&member("active"), &plan, &gym, &split).is_ok());
    }

    #[test]
    fn rejects_suspended_member() {
        let gym = gym("approved");
        let plan = plan(gym.gym_id, true);
        let split = split_for(&plan, &covering_range());
        let msg = conflict_message(check_membership(&member("suspended"), &plan, &gym, &split));
        assert!(msg.contains("Ana Cruz is suspended"));
    }

    #[test]
    fn rejects_retired_plan() {
        let gym = gym("approved");
        let plan = plan(gym.gym_id, false);
        let split = split_for(&plan, &covering_range());
        let msg = conflict_message(check_membership(&member("active"), &plan, &gym, &split));
        assert!(msg.contains("no longer offered"));
    }

    #[test]
    fn rejects_gym_that_is_not_approved() {
        for status in ["pending", "rejected", "suspended"] {
            let gym = gym(status);
            let plan = plan(gym.gym_id, true);
            let split = split_for(&plan, &covering_range());
            let msg = conflict_message(check_membership(&member("active"), &plan, &gym, &split));
            assert!(msg.contains("approved gyms"), "{}: {}", status, msg);
        }
    }

    #[test]
    fn rejects_plan_without_revenue_rule() {
        let gym = gym("approved");
        let plan = plan(gym.gym_id, true);
        let split = split_for(&plan, &[]);
        assert!(!split.is_resolved());
        let msg = conflict_message(check_membership(&member("active"), &plan, &gym, &split));
        assert!(msg.contains("No revenue rule covers Gold Monthly"));
    }
}
