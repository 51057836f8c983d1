use chrono::Utc;
use uuid::Uuid;

use super::{activity_values, logged_batch, require, ScyllaConnector, INSERT_ACTIVITY};
use crate::api::{AmenityForm, PolicyForm};
use crate::error::{AppError, Result};
use crate::models::{
    ActivityEntry, AmenityRow, GymRow, GymStatus, PlanRow, PolicyRow, ScheduleRow, TournamentRow,
    TournamentStatus,
};

const GYM_COLUMNS: &str = "gym_id, owner_id, name, address, city, description, status, created_ts";
const PLAN_COLUMNS: &str = "plan_id, gym_id, name, tier, duration, price, is_active";
const POLICY_COLUMNS: &str = "policy_id, gym_id, title, content, is_active, updated_ts";
const AMENITY_COLUMNS: &str = "amenity_id, name, description, is_active, created_ts";
const TOURNAMENT_COLUMNS: &str =
    "tournament_id, gym_id, name, description, tournament_date, entry_fee, max_participants, status, created_ts";
const SCHEDULE_COLUMNS: &str = "schedule_id, user_id, gym_id, activity_date, start_time, status, created_ts";

const INSERT_NOTIFICATION: &str = "INSERT INTO notification \
    (notification_id, recipient_type, recipient_id, title, message, is_read, created_ts) \
    VALUES (?, ?, ?, ?, ?, ?, ?)";

impl ScyllaConnector {
    // ---- gyms ----

    pub async fn list_gyms(&self) -> Result<Vec<GymRow>> {
        let mut rows: Vec<GymRow> = self
            .select(&format!("SELECT {} FROM gym", GYM_COLUMNS), ())
            .await?;
        rows.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Ok(rows)
    }

    pub async fn get_gym(&self, gym_id: Uuid) -> Result<Option<GymRow>> {
        self.select_one(&format!("SELECT {} FROM gym WHERE gym_id = ?", GYM_COLUMNS), (gym_id,))
            .await
    }

    /// Moves a gym to `target` and notifies its owner in the same batch.
    pub async fn change_gym_status(
        &self,
        gym_id: Uuid,
        target: GymStatus,
        activity: &ActivityEntry,
    ) -> Result<GymRow> {
        let gym = self
            .get_gym(gym_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Gym not found.".to_string()))?;
        let current = gym.status();
        if !current.can_move_to(target) {
            return Err(AppError::Conflict(format!(
                "A {} gym cannot be marked {}.",
                current, target
            )));
        }

        let batch = logged_batch(&[
            "UPDATE gym SET status = ? WHERE gym_id = ?",
            INSERT_NOTIFICATION,
            INSERT_ACTIVITY,
        ]);
        self.session
            .batch(
                &batch,
                (
                    (target.as_str(), gym_id),
                    (
                        Uuid::new_v4(),
                        "owner",
                        Some(gym.owner_id),
                        format!("Gym {}", target),
                        format!("Your gym \"{}\" is now {}.", gym.name, target),
                        false,
                        Utc::now(),
                    ),
                    activity_values(activity),
                ),
            )
            .await?;
        Ok(gym)
    }

    // ---- membership plans ----

    pub async fn list_plans(&self) -> Result<Vec<PlanRow>> {
        self.select(&format!("SELECT {} FROM membership_plan", PLAN_COLUMNS), ())
            .await
    }

    pub async fn get_plan(&self, plan_id: Uuid) -> Result<Option<PlanRow>> {
        self.select_one(
            &format!("SELECT {} FROM membership_plan WHERE plan_id = ?", PLAN_COLUMNS),
            (plan_id,),
        )
        .await
    }

    // ---- policies ----

    pub async fn list_policies(&self, gym_id: Uuid) -> Result<Vec<PolicyRow>> {
        let mut rows: Vec<PolicyRow> = self
            .select(&format!("SELECT {} FROM gym_policy", POLICY_COLUMNS), ())
            .await?;
        rows.retain(|p| p.gym_id == gym_id);
        rows.sort_by(|a, b| b.updated_ts.cmp(&a.updated_ts));
        Ok(rows)
    }

    pub async fn get_policy(&self, policy_id: Uuid) -> Result<Option<PolicyRow>> {
        self.select_one(
            &format!("SELECT {} FROM gym_policy WHERE policy_id = ?", POLICY_COLUMNS),
            (policy_id,),
        )
        .await
    }

    pub async fn create_policy(&self, gym_id: Uuid, form: &PolicyForm, activity: &ActivityEntry) -> Result<Uuid> {
        if self.get_gym(gym_id).await?.is_none() {
            return Err(AppError::NotFound("Gym not found.".to_string()));
        }
        let policy_id = Uuid::new_v4();
        self.execute_logged(
            "INSERT INTO gym_policy (policy_id, gym_id, title, content, is_active, updated_ts) VALUES (?, ?, ?, ?, ?, ?)",
            (policy_id, gym_id, form.title.trim(), form.content.trim(), form.active(), Utc::now()),
            activity,
        )
        .await?;
        Ok(policy_id)
    }

    pub async fn update_policy(&self, policy_id: Uuid, form: &PolicyForm, activity: &ActivityEntry) -> Result<PolicyRow> {
        let policy = self
            .get_policy(policy_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Policy not found.".to_string()))?;
        self.execute_logged(
            "UPDATE gym_policy SET title = ?, content = ?, is_active = ?, updated_ts = ? WHERE policy_id = ?",
            (form.title.trim(), form.content.trim(), form.active(), Utc::now(), policy_id),
            activity,
        )
        .await?;
        Ok(policy)
    }

    pub async fn delete_policy(&self, policy_id: Uuid, activity: &ActivityEntry) -> Result<PolicyRow> {
        let policy = self
            .get_policy(policy_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Policy not found.".to_string()))?;
        let batch = logged_batch(&["DELETE FROM gym_policy WHERE policy_id = ?", INSERT_ACTIVITY]);
        self.session
            .batch(&batch, ((policy_id,), activity_values(activity)))
            .await?;
        Ok(policy)
    }

    // ---- amenities ----

    pub async fn list_amenities(&self) -> Result<Vec<AmenityRow>> {
        let mut rows: Vec<AmenityRow> = self
            .select(&format!("SELECT {} FROM amenity", AMENITY_COLUMNS), ())
            .await?;
        rows.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Ok(rows)
    }

    async fn ensure_amenity_name_free(&self, name: &str, except: Option<Uuid>) -> Result<()> {
        let taken = self
            .list_amenities()
            .await?
            .iter()
            .any(|a| a.name.trim().eq_ignore_ascii_case(name.trim()) && Some(a.amenity_id) != except);
        if taken {
            return Err(AppError::Conflict(format!("Amenity \"{}\" already exists.", name.trim())));
        }
        Ok(())
    }

    pub async fn create_amenity(&self, form: &AmenityForm, activity: &ActivityEntry) -> Result<Uuid> {
        self.ensure_amenity_name_free(&form.name, None).await?;
        let amenity_id = Uuid::new_v4();
        self.execute_logged(
            "INSERT INTO amenity (amenity_id, name, description, is_active, created_ts) VALUES (?, ?, ?, ?, ?)",
            (amenity_id, form.name.trim(), form.description_value(), form.active(), Utc::now()),
            activity,
        )
        .await?;
        Ok(amenity_id)
    }

    pub async fn update_amenity(&self, amenity_id: Uuid, form: &AmenityForm, activity: &ActivityEntry) -> Result<()> {
        let exists = self.list_amenities().await?.iter().any(|a| a.amenity_id == amenity_id);
        if !exists {
            return Err(AppError::NotFound("Amenity not found.".to_string()));
        }
        self.ensure_amenity_name_free(&form.name, Some(amenity_id)).await?;
        self.execute_logged(
            "UPDATE amenity SET name = ?, description = ?, is_active = ? WHERE amenity_id = ?",
            (form.name.trim(), form.description_value(), form.active(), amenity_id),
            activity,
        )
        .await
    }

    pub async fn delete_amenity(&self, amenity_id: Uuid, activity: &ActivityEntry) -> Result<()> {
        let found: Option<AmenityRow> = self
            .select_one(
                &format!("SELECT {} FROM amenity WHERE amenity_id = ?", AMENITY_COLUMNS),
                (amenity_id,),
            )
            .await?;
        require(found, "Amenity")?;
        let batch = logged_batch(&["DELETE FROM amenity WHERE amenity_id = ?", INSERT_ACTIVITY]);
        self.session
            .batch(&batch, ((amenity_id,), activity_values(activity)))
            .await?;
        Ok(())
    }

    // ---- tournaments ----

    pub async fn list_tournaments(&self) -> Result<Vec<TournamentRow>> {
        let mut rows: Vec<TournamentRow> = self
            .select(&format!("SELECT {} FROM tournament", TOURNAMENT_COLUMNS), ())
            .await?;
        rows.sort_by(|a, b| a.tournament_date.cmp(&b.tournament_date));
        Ok(rows)
    }

    pub async fn change_tournament_status(
        &self,
        tournament_id: Uuid,
        target: TournamentStatus,
        activity: &ActivityEntry,
    ) -> Result<TournamentRow> {
        let tournament: TournamentRow = self
            .select_one(
                &format!("SELECT {} FROM tournament WHERE tournament_id = ?", TOURNAMENT_COLUMNS),
                (tournament_id,),
            )
            .await?
            .ok_or_else(|| AppError::NotFound("Tournament not found.".to_string()))?;
        let current = tournament.status();
        if !current.can_move_to(target) {
            return Err(AppError::Conflict(format!(
                "A {} tournament cannot be marked {}.",
                current, target
            )));
        }
        self.execute_logged(
            "UPDATE tournament SET status = ? WHERE tournament_id = ?",
            (target.as_str(), tournament_id),
            activity,
        )
        .await?;
        Ok(tournament)
    }

    // ---- schedules ----

    pub async fn list_schedules(&self) -> Result<Vec<ScheduleRow>> {
        let mut rows: Vec<ScheduleRow> = self
            .select(&format!("SELECT {} FROM schedule", SCHEDULE_COLUMNS), ())
            .await?;
        rows.sort_by(|a, b| {
            b.activity_date
                .cmp(&a.activity_date)
                .then_with(|| a.start_time.cmp(&b.start_time))
        });
        Ok(rows)
    }
}
