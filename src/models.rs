use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use scylla::DeserializeRow;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AppError;

/// Declares a status enum stored as lowercase text, with its allowed moves.
macro_rules! text_enum {
    (
        $name:ident { $($variant:ident => $text:literal),+ $(,)? }
        moves { $($from:ident => [$($to:ident),*]),* $(,)? }
    ) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            /// Statuses reachable from this one.
            #[allow(unreachable_patterns)]
            pub fn next(&self) -> &'static [$name] {
                match self {
                    $($name::$from => &[$($name::$to),*],)*
                    _ => &[],
                }
            }

            pub fn can_move_to(&self, target: $name) -> bool {
                self.next().contains(&target)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = AppError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    other => Err(AppError::BadRequest(format!(
                        "Unknown {} '{}'", stringify!($name), other
                    ))),
                }
            }
        }
    };
}

text_enum! {
    UserStatus { Active => "active", Suspended => "suspended" }
    moves { Active => [Suspended], Suspended => [Active] }
}

text_enum! {
    OwnerStatus { Active => "active", Inactive => "inactive" }
    moves { Active => [Inactive], Inactive => [Active] }
}

text_enum! {
    GymStatus { Pending => "pending", Approved => "approved", Rejected => "rejected", Suspended => "suspended" }
    moves {
        Pending => [Approved, Rejected],
        Approved => [Suspended],
        Suspended => [Approved],
        Rejected => [Pending],
    }
}

text_enum! {
    MembershipStatus { Active => "active", Expired => "expired", Cancelled => "cancelled" }
    moves { Active => [Cancelled] }
}

text_enum! {
    PaymentStatus { Pending => "pending", Completed => "completed", Failed => "failed", Refunded => "refunded" }
    moves { Pending => [Completed, Failed], Completed => [Refunded] }
}

text_enum! {
    WithdrawalStatus { Pending => "pending", Approved => "approved", Rejected => "rejected", Completed => "completed" }
    moves { Pending => [Approved, Rejected], Approved => [Completed] }
}

text_enum! {
    TournamentStatus { Pending => "pending", Approved => "approved", Rejected => "rejected", Cancelled => "cancelled" }
    moves { Pending => [Approved, Rejected], Approved => [Cancelled] }
}

text_enum! {
    EmailStatus { Pending => "pending", Processing => "processing", Sent => "sent", Failed => "failed" }
    moves { Pending => [Processing], Processing => [Sent, Failed, Pending], Failed => [Pending] }
}

text_enum! {
    ScheduleStatus { Booked => "booked", Completed => "completed", Cancelled => "cancelled", Missed => "missed" }
    moves { Booked => [Completed, Cancelled, Missed] }
}

/// Parses a stored status, logging and falling back when the row holds
/// something unexpected.
pub fn stored_status<T: FromStr>(raw: &str, fallback: T) -> T {
    raw.parse().unwrap_or_else(|_| {
        tracing::warn!("Unexpected stored status value '{}'", raw);
        fallback
    })
}

#[derive(Debug, Clone, DeserializeRow)]
pub struct AdminRow {
    pub admin_id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub created_ts: DateTime<Utc>,
}

#[derive(Debug, Clone, DeserializeRow)]
pub struct MemberRow {
    pub user_id: Uuid,
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub status: String,
    pub created_ts: DateTime<Utc>,
}

impl MemberRow {
    pub fn status(&self) -> UserStatus {
        stored_status(&self.status, UserStatus::Active)
    }
}

#[derive(Debug, Clone, DeserializeRow)]
pub struct OwnerRow {
    pub owner_id: Uuid,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub business_name: Option<String>,
    pub address: Option<String>,
    pub status: String,
    pub created_ts: DateTime<Utc>,
}

impl OwnerRow {
    pub fn status(&self) -> OwnerStatus {
        stored_status(&self.status, OwnerStatus::Active)
    }
}

#[derive(Debug, Clone, DeserializeRow)]
pub struct GymRow {
    pub gym_id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub description: Option<String>,
    pub status: String,
    pub created_ts: DateTime<Utc>,
}

impl GymRow {
    pub fn status(&self) -> GymStatus {
        stored_status(&self.status, GymStatus::Pending)
    }
}

#[derive(Debug, Clone, DeserializeRow)]
pub struct PlanRow {
    pub plan_id: Uuid,
    pub gym_id: Uuid,
    pub name: String,
    pub tier: String,
    pub duration: String,
    pub price: BigDecimal,
    pub is_active: bool,
}

#[derive(Debug, Clone, DeserializeRow)]
pub struct MembershipRow {
    pub membership_id: Uuid,
    pub user_id: Uuid,
    pub gym_id: Uuid,
    pub plan_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: String,
    pub created_ts: DateTime<Utc>,
}

impl MembershipRow {
    pub fn status(&self) -> MembershipStatus {
        stored_status(&self.status, MembershipStatus::Active)
    }

    /// The stored status, except that an active membership whose end date
    /// is before `today` counts as expired.
    pub fn effective_status(&self, today: NaiveDate) -> MembershipStatus {
        match self.status() {
            MembershipStatus::Active if self.end_date < today => MembershipStatus::Expired,
            status => status,
        }
    }
}

#[derive(Debug, Clone, DeserializeRow)]
pub struct PaymentRow {
    pub payment_id: Uuid,
    pub user_id: Uuid,
    pub gym_id: Uuid,
    pub plan_id: Uuid,
    pub membership_id: Option<Uuid>,
    pub amount: BigDecimal,
    pub admin_cut: BigDecimal,
    pub gym_cut: BigDecimal,
    pub cut_rule: String,
    pub payment_method: String,
    pub status: String,
    pub created_ts: DateTime<Utc>,
}

impl PaymentRow {
    pub fn status(&self) -> PaymentStatus {
        stored_status(&self.status, PaymentStatus::Pending)
    }
}

#[derive(Debug, Clone, DeserializeRow)]
pub struct WithdrawalRow {
    pub withdrawal_id: Uuid,
    pub owner_id: Uuid,
    pub amount: BigDecimal,
    pub payout_method: String,
    pub status: String,
    pub admin_notes: Option<String>,
    pub requested_ts: DateTime<Utc>,
    pub processed_ts: Option<DateTime<Utc>>,
}

impl WithdrawalRow {
    pub fn status(&self) -> WithdrawalStatus {
        stored_status(&self.status, WithdrawalStatus::Pending)
    }
}

#[derive(Debug, Clone, DeserializeRow)]
pub struct TournamentRow {
    pub tournament_id: Uuid,
    pub gym_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub tournament_date: NaiveDate,
    pub entry_fee: BigDecimal,
    pub max_participants: i32,
    pub status: String,
    pub created_ts: DateTime<Utc>,
}

impl TournamentRow {
    pub fn status(&self) -> TournamentStatus {
        stored_status(&self.status, TournamentStatus::Pending)
    }
}

#[derive(Debug, Clone, DeserializeRow)]
pub struct ScheduleRow {
    pub schedule_id: Uuid,
    pub user_id: Uuid,
    pub gym_id: Uuid,
    pub activity_date: NaiveDate,
    pub start_time: String,
    pub status: String,
    pub created_ts: DateTime<Utc>,
}

impl ScheduleRow {
    pub fn status(&self) -> ScheduleStatus {
        stored_status(&self.status, ScheduleStatus::Booked)
    }
}

#[derive(Debug, Clone, DeserializeRow)]
pub struct PolicyRow {
    pub policy_id: Uuid,
    pub gym_id: Uuid,
    pub title: String,
    pub content: String,
    pub is_active: bool,
    pub updated_ts: DateTime<Utc>,
}

#[derive(Debug, Clone, DeserializeRow)]
pub struct AmenityRow {
    pub amenity_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_ts: DateTime<Utc>,
}

#[derive(Debug, Clone, DeserializeRow)]
pub struct ActivityLogRow {
    pub log_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub actor_type: String,
    pub action: String,
    pub details: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_ts: DateTime<Utc>,
}

#[derive(Debug, Clone, DeserializeRow)]
pub struct EmailRow {
    pub email_id: Uuid,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub status: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_ts: DateTime<Utc>,
    pub sent_ts: Option<DateTime<Utc>>,
}

impl EmailRow {
    pub fn status(&self) -> EmailStatus {
        stored_status(&self.status, EmailStatus::Pending)
    }
}

#[derive(Debug, Clone, DeserializeRow)]
pub struct NotificationRow {
    pub notification_id: Uuid,
    pub recipient_type: String,
    pub recipient_id: Option<Uuid>,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub created_ts: DateTime<Utc>,
}

/// Who performed an audited action and from where.
#[derive(Debug, Clone)]
pub struct ActivityEntry {
    pub actor_id: Option<Uuid>,
    pub actor_type: String,
    pub action: String,
    pub details: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ActivityEntry {
    pub fn admin(admin_id: Uuid, action: &str, details: impl Into<String>) -> Self {
        Self {
            actor_id: Some(admin_id),
            actor_type: "admin".to_string(),
            action: action.to_string(),
            details: details.into(),
            ip_address: None,
            user_agent: None,
        }
    }

    pub fn from_client(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gym_status_moves() {
        assert!(GymStatus::Pending.can_move_to(GymStatus::Approved));
        assert!(GymStatus::Pending.can_move_to(GymStatus::Rejected));
        assert!(!GymStatus::Pending.can_move_to(GymStatus::Suspended));
        assert!(GymStatus::Suspended.can_move_to(GymStatus::Approved));
        assert!(!GymStatus::Approved.can_move_to(GymStatus::Approved));
    }

    #[test]
    fn withdrawal_terminal_states_have_no_moves() {
        assert!(WithdrawalStatus::Rejected.next().is_empty());
        assert!(WithdrawalStatus::Completed.next().is_empty());
        assert!(!WithdrawalStatus::Pending.can_move_to(WithdrawalStatus::Completed));
        assert!(WithdrawalStatus::Approved.can_move_to(WithdrawalStatus::Completed));
    }

    #[test]
    fn email_retry_from_failed_or_stuck_processing() {
        assert!(EmailStatus::Failed.can_move_to(EmailStatus::Pending));
        assert!(EmailStatus::Processing.can_move_to(EmailStatus::Pending));
        assert!(!EmailStatus::Sent.can_move_to(EmailStatus::Pending));
        assert!(!EmailStatus::Pending.can_move_to(EmailStatus::Sent));
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
    fn active_membership_past_end_date_is_expired() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let yesterday = today.pred_opt().unwrap();

        assert_eq!(membership("active", yesterday).effective_status(today), MembershipStatus::Expired);
        // The last day is still covered.
        assert_eq!(membership("active", today).effective_status(today), MembershipStatus::Active);
        assert_eq!(membership("cancelled", yesterday).effective_status(today), MembershipStatus::Cancelled);
    }

    #[test]
    fn status_text_is_case_insensitive() {
        assert_eq!("Approved".parse::<TournamentStatus>().unwrap(), TournamentStatus::Approved);
        assert_eq!(" cancelled ".parse::<TournamentStatus>().unwrap(), TournamentStatus::Cancelled);
        assert!("archived".parse::<TournamentStatus>().is_err());
    }

    #[test]
    fn stored_status_falls_back() {
        assert_eq!(stored_status("garbage", GymStatus::Pending), GymStatus::Pending);
        assert_eq!(stored_status("approved", GymStatus::Pending), GymStatus::Approved);
    }

    #[test]
    fn every_variant_round_trips_through_text() {
        for status in PaymentStatus::ALL {
            assert_eq!(status.as_str().parse::<PaymentStatus>().unwrap(), *status);
        }
    }
}
