use actix_web::{get, post, web, HttpResponse};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::{
    badge, csv_response, empty_row, error_page, finish, flash_of, fmt_money, fmt_ts, lookup, name_map,
    opt_text,
};
use crate::api::{
    ChartEntryForm, DateRange, FeeCutForm, FlashQuery, ListQuery, MembershipForm, ReportQuery, StatusForm,
    PAYMENT_METHODS,
};
use crate::auth::LoggedAdmin;
use crate::config::AppConfig;
use crate::error::{AppError, Result as AppResult};
use crate::models::{MembershipStatus, PaymentRow, PaymentStatus, UserStatus, WithdrawalStatus};
use crate::report;
use crate::revenue::{self, CutRule, PlanDuration, PlanTier};
use crate::state::StoreStateManager;
use crate::templates::{escape, options, page_response, TemplateCache};

const CHART_PATH: &str = "/admin/cut-off-chart";
const MEMBERSHIPS_PATH: &str = "/admin/memberships";
const PAYMENTS_PATH: &str = "/admin/payments";
const WITHDRAWALS_PATH: &str = "/admin/withdrawals";

fn pct(value: &bigdecimal::BigDecimal) -> String {
    format!("{}%", value.normalized())
}

// ---- cut-off chart ----

#[get("/admin/cut-off-chart")]
pub async fn cut_off_chart_page(
    mut admin: LoggedAdmin,
    state_manager: web::Data<Arc<StoreStateManager>>,
    cache: web::Data<TemplateCache>,
    query: web::Query<FlashQuery>,
) -> Result<HttpResponse, actix_web::Error> {
    admin.validate(&state_manager).await?;

    let loaded = futures::try_join!(
        state_manager.db.list_plans(),
        state_manager.db.list_gyms(),
        state_manager.db.list_chart_entries(),
        state_manager.db.list_fee_cuts(),
    );
    let (plans, gyms, chart, fee_cuts) = match loaded {
        Ok(found) => found,
        Err(e) => return Ok(error_page(&cache, "Loading cut-off chart", &e)),
    };
    let gym_names = name_map(&gyms, |g| g.gym_id, |g| g.name.as_str());

    // Every plan with the rule that currently applies to it.
    let mut plan_rows = String::new();
    for plan in &plans {
        let split = revenue::resolve_for_plan(&plan.price, &plan.tier, &plan.duration, &fee_cuts, &chart);
        let (rule, admin_cell, gym_cell) = match split.rule {
            CutRule::Unresolved => (
                "<span class=\"badge badge-failed\">no rule</span>".to_string(),
                "-".to_string(),
                "-".to_string(),
            ),
            _ => (
                badge(split.rule.as_str()),
                format!("{} ({})", fmt_money(&split.admin_amount), pct(&split.admin_percentage)),
                format!("{} ({})", fmt_money(&split.gym_amount), pct(&split.gym_percentage)),
            ),
        };
        plan_rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td class=\"num\">{}</td><td>{}</td><td>{}</td><td>{}</td><td class=\"num\">{}</td><td class=\"num\">{}</td></tr>",
            escape(&plan.name),
            lookup(&gym_names, &plan.gym_id),
            fmt_money(&plan.price),
            escape(&plan.tier),
            escape(&plan.duration),
            rule,
            admin_cell,
            gym_cell,
        ));
    }
    if plan_rows.is_empty() {
        plan_rows = empty_row(8, "No membership plans yet.");
    }

    let chart_rows: String = chart
        .iter()
        .map(|entry| {
            format!(
                "<tr><td>{}</td><td>{}</td><td class=\"num\">{}</td><td class=\"num\">{}</td><td>\
                 <form method=\"post\" action=\"{}/tiers/{}/delete\" class=\"inline\" onsubmit=\"return confirm('Delete this chart entry?')\">\
                 <button type=\"submit\" class=\"btn btn-danger\">Delete</button></form></td></tr>",
                escape(&entry.tier),
                escape(&entry.duration),
                pct(&entry.admin_cut_percentage),
                pct(&entry.gym_owner_cut_percentage),
                CHART_PATH,
                entry.chart_id,
            )
        })
        .collect();
    let chart_rows = if chart_rows.is_empty() { empty_row(5, "The tier chart is empty.") } else { chart_rows };

    let fee_rows: String = fee_cuts
        .iter()
        .map(|cut| {
            format!(
                "<tr><td colspan=\"5\"><form method=\"post\" action=\"{base}/fees/{id}\" class=\"row-form\">\
                 <input type=\"text\" name=\"price_range_start\" value=\"{start}\" required>\
                 <input type=\"text\" name=\"price_range_end\" value=\"{end}\" required>\
                 <input type=\"text\" name=\"admin_cut_percentage\" value=\"{admin}\" required>\
                 <input type=\"text\" name=\"gym_cut_percentage\" value=\"{gym}\" required>\
                 <button type=\"submit\" class=\"btn\">Save</button></form>\
                 <form method=\"post\" action=\"{base}/fees/{id}/delete\" class=\"inline\" onsubmit=\"return confirm('Delete this fee range?')\">\
                 <button type=\"submit\" class=\"btn btn-danger\">Delete</button></form></td></tr>",
                base = CHART_PATH,
                id = cut.cut_id,
                start = cut.price_range_start.normalized(),
                end = cut.price_range_end.normalized(),
                admin = cut.admin_cut_percentage.normalized(),
                gym = cut.gym_cut_percentage.normalized(),
            )
        })
        .collect();
    let fee_rows = if fee_rows.is_empty() { empty_row(5, "No fee ranges defined.") } else { fee_rows };

    let overlap_warnings: String = revenue::find_overlaps(&fee_cuts)
        .iter()
        .filter_map(|(a, b)| {
            let a = fee_cuts.iter().find(|c| c.cut_id == *a)?;
            let b = fee_cuts.iter().find(|c| c.cut_id == *b)?;
            Some(format!(
                "<div class=\"flash flash-error\">Fee ranges {}-{} and {}-{} overlap. Prices in both use the range with the lower start.</div>",
                fmt_money(&a.price_range_start),
                fmt_money(&a.price_range_end),
                fmt_money(&b.price_range_start),
                fmt_money(&b.price_range_end),
            ))
        })
        .collect();

    let tiers: Vec<&str> = PlanTier::ALL.iter().map(|t| t.as_str()).collect();
    let durations: Vec<&str> = PlanDuration::ALL.iter().map(|d| d.as_str()).collect();

    Ok(page_response(
        &cache,
        "cut_off_chart.html",
        "Revenue Cut-off Chart",
        flash_of(&query).as_ref(),
        &[
            ("overlap_warnings", overlap_warnings),
            ("plan_rows", plan_rows),
            ("chart_rows", chart_rows),
            ("fee_rows", fee_rows),
            ("tier_options", options(&tiers, "")),
            ("duration_options", options(&durations, "")),
        ],
    ))
}

#[post("/admin/cut-off-chart/tiers")]
pub async fn upsert_chart_entry(
    mut admin: LoggedAdmin,
    state_manager: web::Data<Arc<StoreStateManager>>,
    form: web::Form<ChartEntryForm>,
) -> Result<HttpResponse, actix_web::Error> {
    admin.validate(&state_manager).await?;

    let result: AppResult<String> = async {
        let input = form.parse()?;
        let entry = admin.activity(
            "chart.upsert",
            format!(
                "{} {}: admin {}%, gym {}%",
                input.tier, input.duration, input.admin_cut_percentage, input.gym_owner_cut_percentage
            ),
        );
        state_manager.db.upsert_chart_entry(&input, &entry).await?;
        Ok(format!("Chart entry for {} {} saved.", input.tier, input.duration))
    }
    .await;

    Ok(finish(CHART_PATH, "Saving chart entry", result))
}

#[post("/admin/cut-off-chart/tiers/{chart_id}/delete")]
pub async fn delete_chart_entry(
    mut admin: LoggedAdmin,
    state_manager: web::Data<Arc<StoreStateManager>>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, actix_web::Error> {
    admin.validate(&state_manager).await?;
    let chart_id = path.into_inner();

    let entry = admin.activity("chart.delete", format!("Deleted chart entry {}", chart_id));
    let result = state_manager
        .db
        .delete_chart_entry(chart_id, &entry)
        .await
        .map(|()| "Chart entry deleted.".to_string());
    Ok(finish(CHART_PATH, "Deleting chart entry", result))
}

#[post("/admin/cut-off-chart/fees")]
pub async fn create_fee_cut(
    mut admin: LoggedAdmin,
    state_manager: web::Data<Arc<StoreStateManager>>,
    form: web::Form<FeeCutForm>,
) -> Result<HttpResponse, actix_web::Error> {
    admin.validate(&state_manager).await?;

    let result: AppResult<String> = async {
        let input = form.parse()?;
        let entry = admin.activity(
            "fee_cut.create",
            format!(
                "{} to {}: admin {}%, gym {}%",
                input.price_range_start, input.price_range_end, input.admin_cut_percentage, input.gym_cut_percentage
            ),
        );
        state_manager.db.save_fee_cut(None, &input, &entry).await?;
        Ok(format!(
            "Fee range {} to {} added.",
            fmt_money(&input.price_range_start),
            fmt_money(&input.price_range_end)
        ))
    }
    .await;

    Ok(finish(CHART_PATH, "Adding fee range", result))
}

#[post("/admin/cut-off-chart/fees/{cut_id}")]
pub async fn update_fee_cut(
    mut admin: LoggedAdmin,
    state_manager: web::Data<Arc<StoreStateManager>>,
    path: web::Path<Uuid>,
    form: web::Form<FeeCutForm>,
) -> Result<HttpResponse, actix_web::Error> {
    admin.validate(&state_manager).await?;
    let cut_id = path.into_inner();

    let result: AppResult<String> = async {
        let input = form.parse()?;
        let entry = admin.activity(
            "fee_cut.update",
            format!(
                "Range {} now {} to {}: admin {}%, gym {}%",
                cut_id,
                input.price_range_start,
                input.price_range_end,
                input.admin_cut_percentage,
                input.gym_cut_percentage
            ),
        );
        state_manager.db.save_fee_cut(Some(cut_id), &input, &entry).await?;
        Ok("Fee range saved.".to_string())
    }
    .await;

    Ok(finish(CHART_PATH, "Updating fee range", result))
}

#[post("/admin/cut-off-chart/fees/{cut_id}/delete")]
pub async fn delete_fee_cut(
    mut admin: LoggedAdmin,
    state_manager: web::Data<Arc<StoreStateManager>>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, actix_web::Error> {
    admin.validate(&state_manager).await?;
    let cut_id = path.into_inner();

    let entry = admin.activity("fee_cut.delete", format!("Deleted fee range {}", cut_id));
    let result = state_manager
        .db
        .delete_fee_cut(cut_id, &entry)
        .await
        .map(|()| "Fee range deleted.".to_string());
    Ok(finish(CHART_PATH, "Deleting fee range", result))
}

// ---- memberships ----

#[get("/admin/memberships")]
pub async fn memberships_page(
    mut admin: LoggedAdmin,
    state_manager: web::Data<Arc<StoreStateManager>>,
    cache: web::Data<TemplateCache>,
    config: web::Data<AppConfig>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, actix_web::Error> {
    admin.validate(&state_manager).await?;

    let loaded = futures::try_join!(
        state_manager.db.list_memberships(),
        state_manager.db.list_members(),
        state_manager.db.list_gyms(),
        state_manager.db.list_plans(),
    );
    let (memberships, members, gyms, plans) = match loaded {
        Ok(found) => found,
        Err(e) => return Ok(error_page(&cache, "Listing memberships", &e)),
    };
    let member_names = name_map(&members, |m| m.user_id, |m| m.full_name.as_str());
    let gym_names = name_map(&gyms, |g| g.gym_id, |g| g.name.as_str());
    let plan_names = name_map(&plans, |p| p.plan_id, |p| p.name.as_str());

    let today = chrono::Utc::now().with_timezone(&config.timezone).date_naive();
    let status = query.status_filter();
    let search = query.search();
    let rows: String = memberships
        .iter()
        .filter(|m| status.as_deref().map_or(true, |s| m.effective_status(today).as_str() == s))
        .filter(|m| {
            search.as_deref().map_or(true, |needle| {
                [&member_names, &gym_names]
                    .iter()
                    .zip([m.user_id, m.gym_id])
                    .any(|(names, id)| names.get(&id).map_or(false, |n| n.to_lowercase().contains(needle)))
            })
        })
        .map(|m| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                lookup(&member_names, &m.user_id),
                lookup(&gym_names, &m.gym_id),
                lookup(&plan_names, &m.plan_id),
                m.start_date.format("%Y-%m-%d"),
                m.end_date.format("%Y-%m-%d"),
                badge(m.effective_status(today).as_str()),
                fmt_ts(&m.created_ts, config.timezone),
            )
        })
        .collect();
    let rows = if rows.is_empty() { empty_row(7, "No memberships match.") } else { rows };

    let member_options: String = members
        .iter()
        .filter(|m| m.status() == UserStatus::Active)
        .map(|m| {
            format!(
                "<option value=\"{}\">{} ({})</option>",
                m.user_id,
                escape(&m.full_name),
                escape(&m.email)
            )
        })
        .collect();
    let plan_options: String = plans
        .iter()
        .filter(|p| p.is_active)
        .map(|p| {
            format!(
                "<option value=\"{}\">{}: {} ({}, {}, {})</option>",
                p.plan_id,
                lookup(&gym_names, &p.gym_id),
                escape(&p.name),
                escape(&p.tier),
                escape(&p.duration),
                fmt_money(&p.price)
            )
        })
        .collect();

    let statuses: Vec<&str> = MembershipStatus::ALL.iter().map(|s| s.as_str()).collect();
    Ok(page_response(
        &cache,
        "memberships.html",
        "Memberships",
        flash_of(&query.flash()).as_ref(),
        &[
            ("q", escape(query.q.as_deref().unwrap_or(""))),
            (
                "status_options",
                format!(
                    "<option value=\"\">All statuses</option>{}",
                    options(&statuses, status.as_deref().unwrap_or(""))
                ),
            ),
            ("rows", rows),
            ("member_options", member_options),
            ("plan_options", plan_options),
            ("method_options", options(PAYMENT_METHODS, "cash")),
            ("today", chrono::Utc::now().with_timezone(&config.timezone).format("%Y-%m-%d").to_string()),
        ],
    ))
}

#[post("/admin/memberships")]
pub async fn record_membership(
    mut admin: LoggedAdmin,
    state_manager: web::Data<Arc<StoreStateManager>>,
    cache: web::Data<TemplateCache>,
    config: web::Data<AppConfig>,
    form: web::Form<MembershipForm>,
) -> Result<HttpResponse, actix_web::Error> {
    admin.validate(&state_manager).await?;

    let result: AppResult<String> = async {
        let input = form.parse()?;
        let entry = admin.activity(
            "membership.create",
            format!("Member {} on plan {} from {}", input.user_id, input.plan_id, input.start_date),
        );
        let recorded = state_manager
            .record_membership(&input, &entry, &cache, config.timezone)
            .await?;
        Ok(format!(
            "Membership recorded until {}. Admin share {}, gym share {}.",
            recorded.end_date.format("%Y-%m-%d"),
            fmt_money(&recorded.admin_cut),
            fmt_money(&recorded.gym_cut)
        ))
    }
    .await;

    Ok(finish(MEMBERSHIPS_PATH, "Recording membership", result))
}

// ---- payments & revenue ----

struct PaymentData {
    payments: Vec<PaymentRow>,
    member_names: HashMap<Uuid, String>,
    gym_names: HashMap<Uuid, String>,
}

async fn load_payment_data(state_manager: &StoreStateManager) -> AppResult<PaymentData> {
    let (payments, members, gyms) = futures::try_join!(
        state_manager.db.list_payments(),
        state_manager.db.list_members(),
        state_manager.db.list_gyms(),
    )?;
    Ok(PaymentData {
        payments,
        member_names: name_map(&members, |m| m.user_id, |m| m.full_name.as_str()),
        gym_names: name_map(&gyms, |g| g.gym_id, |g| g.name.as_str()),
    })
}

fn payment_filters(query: &ReportQuery) -> AppResult<(DateRange, Option<PaymentStatus>, Option<Uuid>)> {
    let range = query.range()?;
    let status = query
        .status_filter()
        .map(|s| s.parse::<PaymentStatus>())
        .transpose()
        .map_err(|e| AppError::Validation(e.user_message()))?;
    Ok((range, status, query.gym()?))
}

fn gym_select(gym_names: &HashMap<Uuid, String>, selected: Option<Uuid>) -> String {
    let mut gyms: Vec<(&Uuid, &String)> = gym_names.iter().collect();
    gyms.sort_by(|a, b| a.1.to_lowercase().cmp(&b.1.to_lowercase()));
    let mut out = "<option value=\"\">All gyms</option>".to_string();
    for (id, name) in gyms {
        out.push_str(&format!(
            "<option value=\"{}\"{}>{}</option>",
            id,
            if Some(*id) == selected { " selected" } else { "" },
            escape(name)
        ));
    }
    out
}

#[get("/admin/payments")]
pub async fn payments_page(
    mut admin: LoggedAdmin,
    state_manager: web::Data<Arc<StoreStateManager>>,
    cache: web::Data<TemplateCache>,
    config: web::Data<AppConfig>,
    query: web::Query<ReportQuery>,
) -> Result<HttpResponse, actix_web::Error> {
    admin.validate(&state_manager).await?;

    let (range, status, gym) = match payment_filters(&query) {
        Ok(filters) => filters,
        Err(e) => return Ok(error_page(&cache, "Filtering payments", &e)),
    };
    let data = match load_payment_data(&state_manager).await {
        Ok(data) => data,
        Err(e) => return Ok(error_page(&cache, "Listing payments", &e)),
    };

    let tz = config.timezone;
    let filtered = report::filter_payments(&data.payments, range, status, gym, tz);
    let rows: String = filtered
        .iter()
        .map(|p| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td class=\"num\">{}</td><td class=\"num\">{}</td>\
                 <td class=\"num\">{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                fmt_ts(&p.created_ts, tz),
                lookup(&data.member_names, &p.user_id),
                lookup(&data.gym_names, &p.gym_id),
                fmt_money(&p.amount),
                fmt_money(&p.admin_cut),
                fmt_money(&p.gym_cut),
                escape(&p.cut_rule),
                escape(&p.payment_method),
                badge(p.status().as_str()),
            )
        })
        .collect();
    let rows = if rows.is_empty() { empty_row(9, "No payments match.") } else { rows };

    let totals = report::revenue_report(&filtered, &data.gym_names).totals;
    let statuses: Vec<&str> = PaymentStatus::ALL.iter().map(|s| s.as_str()).collect();
    let export_query = query.to_query_string();

    Ok(page_response(
        &cache,
        "payments.html",
        "Payments",
        None,
        &[
            ("from", escape(query.from.as_deref().unwrap_or(""))),
            ("to", escape(query.to.as_deref().unwrap_or(""))),
            (
                "status_options",
                format!(
                    "<option value=\"\">All statuses</option>{}",
                    options(&statuses, status.map(|s| s.as_str()).unwrap_or(""))
                ),
            ),
            ("gym_options", gym_select(&data.gym_names, gym)),
            ("count", filtered.len().to_string()),
            ("completed_gross", fmt_money(&totals.gross)),
            ("completed_admin", fmt_money(&totals.admin_share)),
            ("rows", rows),
            ("export_href", format!("{}/export.csv?{}", PAYMENTS_PATH, export_query)),
        ],
    ))
}

#[get("/admin/payments/export.csv")]
pub async fn payments_export(
    mut admin: LoggedAdmin,
    state_manager: web::Data<Arc<StoreStateManager>>,
    config: web::Data<AppConfig>,
    query: web::Query<ReportQuery>,
) -> Result<HttpResponse, actix_web::Error> {
    admin.validate(&state_manager).await?;

    let result: AppResult<String> = async {
        let (range, status, gym) = payment_filters(&query)?;
        let data = load_payment_data(&state_manager).await?;
        let filtered = report::filter_payments(&data.payments, range, status, gym, config.timezone);
        Ok(report::payments_csv(&filtered, &data.member_names, &data.gym_names, config.timezone))
    }
    .await;

    Ok(match result {
        Ok(csv) => csv_response("payments.csv", csv),
        Err(e) => finish(PAYMENTS_PATH, "Exporting payments", Err(e)),
    })
}

fn build_revenue_report(data: &PaymentData, query: &ReportQuery, tz: chrono_tz::Tz) -> AppResult<report::RevenueReport> {
    let range = query.range()?;
    let filtered = report::filter_payments(&data.payments, range, None, query.gym()?, tz);
    Ok(report::revenue_report(&filtered, &data.gym_names))
}

#[get("/admin/reports/revenue")]
pub async fn revenue_report_page(
    mut admin: LoggedAdmin,
    state_manager: web::Data<Arc<StoreStateManager>>,
    cache: web::Data<TemplateCache>,
    config: web::Data<AppConfig>,
    query: web::Query<ReportQuery>,
) -> Result<HttpResponse, actix_web::Error> {
    admin.validate(&state_manager).await?;

    let data = match load_payment_data(&state_manager).await {
        Ok(data) => data,
        Err(e) => return Ok(error_page(&cache, "Loading revenue report", &e)),
    };
    let revenue = match build_revenue_report(&data, &query, config.timezone) {
        Ok(revenue) => revenue,
        Err(e) => return Ok(error_page(&cache, "Building revenue report", &e)),
    };

    let rows: String = revenue
        .by_gym
        .iter()
        .map(|g| {
            format!(
                "<tr><td>{}</td><td class=\"num\">{}</td><td class=\"num\">{}</td><td class=\"num\">{}</td><td class=\"num\">{}</td></tr>",
                escape(&g.gym_name),
                g.totals.payments,
                fmt_money(&g.totals.gross),
                fmt_money(&g.totals.admin_share),
                fmt_money(&g.totals.gym_share),
            )
        })
        .collect();
    let rows = if rows.is_empty() { empty_row(5, "No completed payments in this period.") } else { rows };

    Ok(page_response(
        &cache,
        "revenue_report.html",
        "Revenue Report",
        None,
        &[
            ("from", escape(query.from.as_deref().unwrap_or(""))),
            ("to", escape(query.to.as_deref().unwrap_or(""))),
            ("gym_options", gym_select(&data.gym_names, query.gym().ok().flatten())),
            ("payments", revenue.totals.payments.to_string()),
            ("gross", fmt_money(&revenue.totals.gross)),
            ("admin_share", fmt_money(&revenue.totals.admin_share)),
            ("gym_share", fmt_money(&revenue.totals.gym_share)),
            ("rows", rows),
            ("export_href", format!("/admin/reports/revenue/export.csv?{}", query.to_query_string())),
        ],
    ))
}

#[get("/admin/reports/revenue/export.csv")]
pub async fn revenue_report_export(
    mut admin: LoggedAdmin,
    state_manager: web::Data<Arc<StoreStateManager>>,
    config: web::Data<AppConfig>,
    query: web::Query<ReportQuery>,
) -> Result<HttpResponse, actix_web::Error> {
    admin.validate(&state_manager).await?;

    let result: AppResult<String> = async {
        let data = load_payment_data(&state_manager).await?;
        let revenue = build_revenue_report(&data, &query, config.timezone)?;
        Ok(report::revenue_csv(&revenue))
    }
    .await;

    Ok(match result {
        Ok(csv) => csv_response("revenue-report.csv", csv),
        Err(e) => finish("/admin/reports/revenue", "Exporting revenue report", Err(e)),
    })
}

// ---- withdrawals ----

#[get("/admin/withdrawals")]
pub async fn withdrawals_page(
    mut admin: LoggedAdmin,
    state_manager: web::Data<Arc<StoreStateManager>>,
    cache: web::Data<TemplateCache>,
    config: web::Data<AppConfig>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, actix_web::Error> {
    admin.validate(&state_manager).await?;

    let (withdrawals, owners) = match futures::try_join!(state_manager.db.list_withdrawals(), state_manager.db.list_owners()) {
        Ok(found) => found,
        Err(e) => return Ok(error_page(&cache, "Listing withdrawals", &e)),
    };
    let owner_names = name_map(&owners, |o| o.owner_id, |o| o.full_name.as_str());

    let tz = config.timezone;
    let status = query.status_filter();
    let rows: String = withdrawals
        .iter()
        .filter(|w| status.as_deref().map_or(true, |s| w.status().as_str() == s))
        .map(|w| {
            let next = w.status().next();
            let action = if next.is_empty() {
                "<span class=\"muted\">No actions</span>".to_string()
            } else {
                let targets: Vec<&str> = next.iter().map(|s| s.as_str()).collect();
                format!(
                    "<form method=\"post\" action=\"{}/{}/status\" class=\"row-form\">\
                     <select name=\"status\">{}</select>\
                     <input type=\"text\" name=\"notes\" placeholder=\"Notes for the owner\">\
                     <button type=\"submit\" class=\"btn\">Update</button></form>",
                    WITHDRAWALS_PATH,
                    w.withdrawal_id,
                    options(&targets, "")
                )
            };
            format!(
                "<tr><td>{}</td><td>{}</td><td class=\"num\">{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                fmt_ts(&w.requested_ts, tz),
                lookup(&owner_names, &w.owner_id),
                fmt_money(&w.amount),
                escape(&w.payout_method),
                badge(w.status().as_str()),
                opt_text(&w.admin_notes),
                w.processed_ts.as_ref().map(|ts| fmt_ts(ts, tz)).unwrap_or_default(),
                action,
            )
        })
        .collect();
    let rows = if rows.is_empty() { empty_row(8, "No withdrawal requests match.") } else { rows };

    let statuses: Vec<&str> = WithdrawalStatus::ALL.iter().map(|s| s.as_str()).collect();
    Ok(page_response(
        &cache,
        "withdrawals.html",
        "Withdrawals",
        flash_of(&query.flash()).as_ref(),
        &[
            (
                "status_options",
                format!(
                    "<option value=\"\">All statuses</option>{}",
                    options(&statuses, status.as_deref().unwrap_or(""))
                ),
            ),
            ("rows", rows),
        ],
    ))
}

#[post("/admin/withdrawals/{withdrawal_id}/status")]
pub async fn set_withdrawal_status(
    mut admin: LoggedAdmin,
    state_manager: web::Data<Arc<StoreStateManager>>,
    path: web::Path<Uuid>,
    form: web::Form<StatusForm>,
) -> Result<HttpResponse, actix_web::Error> {
    admin.validate(&state_manager).await?;
    let withdrawal_id = path.into_inner();

    let result: AppResult<String> = async {
        let target: WithdrawalStatus = form.status.parse()?;
        let notes = form.notes();
        let entry = admin.activity(
            "withdrawal.status",
            match &notes {
                Some(n) => format!("Withdrawal {} set to {}: {}", withdrawal_id, target, n),
                None => format!("Withdrawal {} set to {}", withdrawal_id, target),
            },
        );
        let withdrawal = state_manager
            .db
            .change_withdrawal_status(withdrawal_id, target, notes, &entry)
            .await?;
        Ok(format!("Withdrawal of {} is now {}.", fmt_money(&withdrawal.amount), target))
    }
    .await;

    Ok(finish(WITHDRAWALS_PATH, "Changing withdrawal status", result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentages_drop_trailing_zeros() {
        let value: bigdecimal::BigDecimal = "30.00".parse().unwrap();
        assert_eq!(pct(&value), "30%");
        let value: bigdecimal::BigDecimal = "12.50".parse().unwrap();
        assert_eq!(pct(&value), "12.5%");
    }

    #[test]
    fn gym_select_sorts_and_marks_selection() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let names = HashMap::from([(a, "Zen Fitness".to_string()), (b, "Alpha Gym".to_string())]);
        let html = gym_select(&names, Some(a));
        let alpha = html.find(&escape("Alpha Gym")).unwrap();
        let zen = html.find(&escape("Zen Fitness")).unwrap();
        assert!(alpha < zen);
        assert!(html.contains(&format!("<option value=\"{}\" selected>", a)));
    }

    #[test]
    fn payment_filters_reject_unknown_status() {
        let query = ReportQuery { status: Some("lost".to_string()), ..Default::default() };
        assert!(matches!(payment_filters(&query), Err(AppError::Validation(_))));
    }
}
