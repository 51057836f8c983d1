use chrono::Utc;
use uuid::Uuid;

use super::{activity_values, logged_batch, ScyllaConnector, INSERT_ACTIVITY};
use crate::api::OwnerForm;
use crate::error::{AppError, Result};
use crate::models::{ActivityEntry, MemberRow, OwnerRow, OwnerStatus, UserStatus};

const MEMBER_COLUMNS: &str = "user_id, email, full_name, phone, status, created_ts";
const OWNER_COLUMNS: &str = "owner_id, full_name, email, phone, business_name, address, status, created_ts";

impl ScyllaConnector {
    pub async fn list_members(&self) -> Result<Vec<MemberRow>> {
        let mut rows: Vec<MemberRow> = self
            .select(&format!("SELECT {} FROM member", MEMBER_COLUMNS), ())
            .await?;
        rows.sort_by(|a, b| b.created_ts.cmp(&a.created_ts));
        Ok(rows)
    }

    pub async fn get_member(&self, user_id: Uuid) -> Result<Option<MemberRow>> {
        self.select_one(
            &format!("SELECT {} FROM member WHERE user_id = ?", MEMBER_COLUMNS),
            (user_id,),
        )
        .await
    }

    pub async fn set_member_status(
        &self,
        user_id: Uuid,
        status: UserStatus,
        activity: &ActivityEntry,
    ) -> Result<()> {
        self.execute_logged(
            "UPDATE member SET status = ? WHERE user_id = ?",
            (status.as_str(), user_id),
            activity,
        )
        .await
    }

    pub async fn list_owners(&self) -> Result<Vec<OwnerRow>> {
        let mut rows: Vec<OwnerRow> = self
            .select(&format!("SELECT {} FROM gym_owner", OWNER_COLUMNS), ())
            .await?;
        rows.sort_by(|a, b| a.full_name.to_lowercase().cmp(&b.full_name.to_lowercase()));
        Ok(rows)
    }

    pub async fn get_owner(&self, owner_id: Uuid) -> Result<Option<OwnerRow>> {
        self.select_one(
            &format!("SELECT {} FROM gym_owner WHERE owner_id = ?", OWNER_COLUMNS),
            (owner_id,),
        )
        .await
    }

    async fn ensure_owner_email_free(&self, email: &str, except: Option<Uuid>) -> Result<()> {
        let taken = self
            .list_owners()
            .await?
            .into_iter()
            .any(|o| o.email.eq_ignore_ascii_case(email) && Some(o.owner_id) != except);
        if taken {
            return Err(AppError::Conflict(format!(
                "An owner with email {} already exists.",
                email
            )));
        }
        Ok(())
    }

    pub async fn create_owner(&self, form: &OwnerForm, activity: &ActivityEntry) -> Result<Uuid> {
        self.ensure_owner_email_free(&form.email, None).await?;

        let owner_id = Uuid::new_v4();
        self.execute_logged(
            "INSERT INTO gym_owner (owner_id, full_name, email, phone, business_name, address, status, created_ts) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            (
                owner_id,
                form.full_name.trim(),
                form.email.trim().to_lowercase(),
                form.phone_value(),
                form.business_name_value(),
                form.address_value(),
                OwnerStatus::Active.as_str(),
                Utc::now(),
            ),
            activity,
        )
        .await?;
        Ok(owner_id)
    }

    pub async fn update_owner(&self, owner_id: Uuid, form: &OwnerForm, activity: &ActivityEntry) -> Result<()> {
        if self.get_owner(owner_id).await?.is_none() {
            return Err(AppError::NotFound("Owner not found.".to_string()));
        }
        self.ensure_owner_email_free(&form.email, Some(owner_id)).await?;

        self.execute_logged(
            "UPDATE gym_owner SET full_name = ?, email = ?, phone = ?, business_name = ?, address = ? WHERE owner_id = ?",
            (
                form.full_name.trim(),
                form.email.trim().to_lowercase(),
                form.phone_value(),
                form.business_name_value(),
                form.address_value(),
                owner_id,
            ),
            activity,
        )
        .await
    }

    pub async fn set_owner_status(
        &self,
        owner_id: Uuid,
        status: OwnerStatus,
        activity: &ActivityEntry,
    ) -> Result<()> {
        self.execute_logged(
            "UPDATE gym_owner SET status = ? WHERE owner_id = ?",
            (status.as_str(), owner_id),
            activity,
        )
        .await
    }

    /// Owners that still have gyms cannot be removed.
    pub async fn delete_owner(&self, owner_id: Uuid, activity: &ActivityEntry) -> Result<()> {
        let owns_gyms = self
            .list_gyms()
            .await?
            .iter()
            .any(|gym| gym.owner_id == owner_id);
        if owns_gyms {
            return Err(AppError::Conflict(
                "This owner still has gyms. Reassign or remove them first.".to_string(),
            ));
        }

        let batch = logged_batch(&["DELETE FROM gym_owner WHERE owner_id = ?", INSERT_ACTIVITY]);
        self.session
            .batch(&batch, ((owner_id,), activity_values(activity)))
            .await?;
        Ok(())
    }
}
