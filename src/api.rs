use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use email_address::EmailAddress;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::revenue::{self, PlanDuration, PlanTier};

lazy_static! {
    static ref PHONE_RE: Regex = Regex::new(r"^\+?[0-9][0-9 -]{6,19}$").expect("phone pattern compiles");
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn checkbox(value: &Option<String>) -> bool {
    matches!(value.as_deref(), Some("on") | Some("true") | Some("1"))
}

pub fn parse_decimal(label: &str, raw: &str) -> Result<BigDecimal> {
    BigDecimal::from_str(raw.trim())
        .map_err(|_| AppError::Validation(format!("{} must be a number.", label)))
}

pub fn parse_date(label: &str, raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::Validation(format!("{} must be a date (YYYY-MM-DD).", label)))
}

pub fn parse_uuid(label: &str, raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| AppError::Validation(format!("Select a valid {}.", label)))
}

pub fn validate_email(email: &str) -> Result<()> {
    if EmailAddress::is_valid(email.trim()) {
        Ok(())
    } else {
        Err(AppError::Validation("Enter a valid email address.".to_string()))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// Flash message carried through a redirect.
#[derive(Debug, Default, Deserialize)]
pub struct FlashQuery {
    pub success: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub q: Option<String>,
    pub status: Option<String>,
    pub success: Option<String>,
    pub error: Option<String>,
}

impl ListQuery {
    pub fn search(&self) -> Option<String> {
        non_empty(&self.q).map(|s| s.to_lowercase())
    }

    pub fn status_filter(&self) -> Option<String> {
        non_empty(&self.status).map(|s| s.to_lowercase())
    }

    pub fn flash(&self) -> FlashQuery {
        FlashQuery { success: self.success.clone(), error: self.error.clone() }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ReportQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    pub status: Option<String>,
    pub gym_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn contains(&self, day: NaiveDate) -> bool {
        self.from.map_or(true, |from| day >= from) && self.to.map_or(true, |to| day <= to)
    }
}

impl ReportQuery {
    pub fn range(&self) -> Result<DateRange> {
        let from = non_empty(&self.from).map(|s| parse_date("From date", &s)).transpose()?;
        let to = non_empty(&self.to).map(|s| parse_date("To date", &s)).transpose()?;
        if let (Some(f), Some(t)) = (from, to) {
            if f > t {
                return Err(AppError::Validation("From date must not be after the To date.".to_string()));
            }
        }
        Ok(DateRange { from, to })
    }

    pub fn status_filter(&self) -> Option<String> {
        non_empty(&self.status).map(|s| s.to_lowercase())
    }

    pub fn gym(&self) -> Result<Option<Uuid>> {
        non_empty(&self.gym_id).map(|s| parse_uuid("gym", &s)).transpose()
    }

    /// Query string reproducing this filter, for export links.
    pub fn to_query_string(&self) -> String {
        let mut parts = Vec::new();
        for (key, value) in [("from", &self.from), ("to", &self.to), ("status", &self.status), ("gym_id", &self.gym_id)] {
            if let Some(v) = non_empty(value) {
                parts.push(format!("{}={}", key, urlencoding::encode(&v)));
            }
        }
        parts.join("&")
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ScheduleQuery {
    pub gym_id: Option<String>,
    pub date: Option<String>,
}

impl ScheduleQuery {
    pub fn gym(&self) -> Result<Option<Uuid>> {
        non_empty(&self.gym_id).map(|s| parse_uuid("gym", &s)).transpose()
    }

    pub fn day(&self) -> Result<Option<NaiveDate>> {
        non_empty(&self.date).map(|s| parse_date("Date", &s)).transpose()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ActivityQuery {
    pub action: Option<String>,
}

impl ActivityQuery {
    pub fn action(&self) -> Option<String> {
        non_empty(&self.action)
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusForm {
    pub status: String,
    pub notes: Option<String>,
}

impl StatusForm {
    pub fn notes(&self) -> Option<String> {
        non_empty(&self.notes)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OwnerForm {
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub business_name: Option<String>,
    pub address: Option<String>,
}

impl OwnerForm {
    pub fn validate(&self) -> Result<()> {
        if self.full_name.trim().is_empty() {
            return Err(AppError::Validation("Owner name is required.".to_string()));
        }
        validate_email(&self.email)?;
        if let Some(phone) = self.phone_value() {
            if !PHONE_RE.is_match(&phone) {
                return Err(AppError::Validation("Enter a valid phone number.".to_string()));
            }
        }
        Ok(())
    }

    pub fn phone_value(&self) -> Option<String> {
        non_empty(&self.phone)
    }

    pub fn business_name_value(&self) -> Option<String> {
        non_empty(&self.business_name)
    }

    pub fn address_value(&self) -> Option<String> {
        non_empty(&self.address)
    }
}

#[derive(Debug, Deserialize)]
pub struct PolicyForm {
    pub title: String,
    pub content: String,
    pub is_active: Option<String>,
}

impl PolicyForm {
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(AppError::Validation("Policy title is required.".to_string()));
        }
        if self.content.trim().is_empty() {
            return Err(AppError::Validation("Policy content is required.".to_string()));
        }
        Ok(())
    }

    pub fn active(&self) -> bool {
        checkbox(&self.is_active)
    }
}

#[derive(Debug, Deserialize)]
pub struct AmenityForm {
    pub name: String,
    pub description: Option<String>,
    pub is_active: Option<String>,
}

impl AmenityForm {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::Validation("Amenity name is required.".to_string()));
        }
        Ok(())
    }

    pub fn description_value(&self) -> Option<String> {
        non_empty(&self.description)
    }

    pub fn active(&self) -> bool {
        checkbox(&self.is_active)
    }
}

#[derive(Debug, Deserialize)]
pub struct ChartEntryForm {
    pub tier: String,
    pub duration: String,
    pub admin_cut_percentage: String,
    pub gym_owner_cut_percentage: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartEntryInput {
    pub tier: PlanTier,
    pub duration: PlanDuration,
    pub admin_cut_percentage: BigDecimal,
    pub gym_owner_cut_percentage: BigDecimal,
}

impl ChartEntryForm {
    pub fn parse(&self) -> Result<ChartEntryInput> {
        let tier = self.tier.parse::<PlanTier>().map_err(|e| AppError::Validation(e.user_message()))?;
        let duration = self.duration.parse::<PlanDuration>().map_err(|e| AppError::Validation(e.user_message()))?;
        let admin = parse_decimal("Admin cut", &self.admin_cut_percentage)?;
        let gym = parse_decimal("Gym cut", &self.gym_owner_cut_percentage)?;
        revenue::validate_percentages(&admin, &gym)?;
        Ok(ChartEntryInput {
            tier,
            duration,
            admin_cut_percentage: admin,
            gym_owner_cut_percentage: gym,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct FeeCutForm {
    pub price_range_start: String,
    pub price_range_end: String,
    pub admin_cut_percentage: String,
    pub gym_cut_percentage: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeeCutInput {
    pub price_range_start: BigDecimal,
    pub price_range_end: BigDecimal,
    pub admin_cut_percentage: BigDecimal,
    pub gym_cut_percentage: BigDecimal,
}

impl FeeCutForm {
    pub fn parse(&self) -> Result<FeeCutInput> {
        let start = parse_decimal("Price range start", &self.price_range_start)?;
        let end = parse_decimal("Price range end", &self.price_range_end)?;
        revenue::validate_range(&start, &end)?;
        let admin = parse_decimal("Admin cut", &self.admin_cut_percentage)?;
        let gym = parse_decimal("Gym cut", &self.gym_cut_percentage)?;
        revenue::validate_percentages(&admin, &gym)?;
        Ok(FeeCutInput {
            price_range_start: start,
            price_range_end: end,
            admin_cut_percentage: admin,
            gym_cut_percentage: gym,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct MembershipForm {
    pub user_id: String,
    pub plan_id: String,
    pub start_date: String,
    pub payment_method: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MembershipInput {
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub start_date: NaiveDate,
    pub payment_method: String,
}

pub const PAYMENT_METHODS: &[&str] = &["cash", "gcash", "card", "bank transfer"];

impl MembershipForm {
    pub fn parse(&self) -> Result<MembershipInput> {
        let method = self.payment_method.trim().to_lowercase();
        if !PAYMENT_METHODS.contains(&method.as_str()) {
            return Err(AppError::Validation("Select a payment method.".to_string()));
        }
        Ok(MembershipInput {
            user_id: parse_uuid("member", &self.user_id)?,
            plan_id: parse_uuid("membership plan", &self.plan_id)?,
            start_date: parse_date("Start date", &self.start_date)?,
            payment_method: method,
        })
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct EmailQueueCounts {
    pub pending: usize,
    pub processing: usize,
    pub sent: usize,
    pub failed: usize,
}

#[derive(Debug, Serialize)]
pub struct EmailQueueStatusResponse {
    pub success: bool,
    pub error_message: Option<String>,
    pub counts: Option<EmailQueueCounts>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(name: &str, email: &str, phone: Option<&str>) -> OwnerForm {
        OwnerForm {
            full_name: name.to_string(),
            email: email.to_string(),
            phone: phone.map(str::to_string),
            business_name: None,
            address: Some("   ".to_string()),
        }
    }

    #[test]
    fn owner_form_validation() {
        assert!(owner("Ana Cruz", "ana@example.com", Some("+63 917 555 0101")).validate().is_ok());
        assert!(owner("Ana Cruz", "ana@example.com", None).validate().is_ok());
        assert!(owner(" ", "ana@example.com", None).validate().is_err());
        assert!(owner("Ana", "not-an-email", None).validate().is_err());
        assert!(owner("Ana", "ana@example.com", Some("call me")).validate().is_err());
    }

    #[test]
    fn blank_optional_fields_become_none() {
        let form = owner("Ana", "ana@example.com", Some(""));
        assert_eq!(form.phone_value(), None);
        assert_eq!(form.address_value(), None);
    }

    #[test]
    fn chart_entry_form_parses_and_checks_total() {
        let form = ChartEntryForm {
            tier: "Tier 2".to_string(),
            duration: "Monthly".to_string(),
            admin_cut_percentage: "25".to_string(),
            gym_owner_cut_percentage: "75".to_string(),
        };
        let input = form.parse().unwrap();
        assert_eq!(input.tier, PlanTier::Tier2);
        assert_eq!(input.duration, PlanDuration::Monthly);

        let bad = ChartEntryForm { gym_owner_cut_percentage: "70".to_string(), ..form };
        assert!(matches!(bad.parse(), Err(AppError::Validation(_))));
    }

    #[test]
    fn fee_cut_form_rejects_inverted_range() {
        let form = FeeCutForm {
            price_range_start: "2000".to_string(),
            price_range_end: "1000".to_string(),
            admin_cut_percentage: "10".to_string(),
            gym_cut_percentage: "90".to_string(),
        };
        assert!(form.parse().is_err());
    }

    #[test]
    fn fee_cut_form_rejects_non_numbers() {
        let form = FeeCutForm {
            price_range_start: "abc".to_string(),
            price_range_end: "1000".to_string(),
            admin_cut_percentage: "10".to_string(),
            gym_cut_percentage: "90".to_string(),
        };
        let err = form.parse().unwrap_err();
        assert_eq!(err.user_message(), "Price range start must be a number.");
    }

    #[test]
    fn membership_form_requires_known_method() {
        let form = MembershipForm {
            user_id: Uuid::new_v4().to_string(),
            plan_id: Uuid::new_v4().to_string(),
            start_date: "2024-06-01".to_string(),
            payment_method: "Bitcoin".to_string(),
        };
        assert!(form.parse().is_err());

        let form = MembershipForm { payment_method: "GCash".to_string(), ..form };
        let input = form.parse().unwrap();
        assert_eq!(input.payment_method, "gcash");
        assert_eq!(input.start_date, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
    }

    #[test]
    fn report_range_checks_order() {
        let query = ReportQuery {
            from: Some("2024-05-01".to_string()),
            to: Some("2024-04-01".to_string()),
            ..Default::default()
        };
        assert!(query.range().is_err());

        let query = ReportQuery { from: Some("2024-04-01".to_string()), to: Some("".to_string()), ..Default::default() };
        let range = query.range().unwrap();
        assert!(range.contains(NaiveDate::from_ymd_opt(2030, 1, 1).unwrap()));
        assert!(!range.contains(NaiveDate::from_ymd_opt(2024, 3, 31).unwrap()));
    }

    #[test]
    fn report_query_string_skips_blanks() {
        let query = ReportQuery {
            from: Some("2024-04-01".to_string()),
            to: None,
            status: Some(" ".to_string()),
            gym_id: None,
        };
        assert_eq!(query.to_query_string(), "from=2024-04-01");
    }
}
