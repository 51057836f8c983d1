use actix_web::{get, post, web, HttpResponse};
use std::sync::Arc;
use uuid::Uuid;

use super::{
    badge, empty_row, error_page, finish, flash_of, fmt_money, fmt_ts, lookup, name_map, opt_text,
    status_buttons,
};
use crate::api::{AmenityForm, FlashQuery, ListQuery, PolicyForm, ScheduleQuery, StatusForm};
use crate::auth::LoggedAdmin;
use crate::config::AppConfig;
use crate::error::{AppError, Result as AppResult};
use crate::models::{GymStatus, TournamentStatus};
use crate::state::StoreStateManager;
use crate::templates::{escape, options, page_response, TemplateCache};

const GYMS_PATH: &str = "/admin/gyms";
const AMENITIES_PATH: &str = "/admin/amenities";
const TOURNAMENTS_PATH: &str = "/admin/tournaments";

fn policies_path(gym_id: Uuid) -> String {
    format!("{}/{}/policies", GYMS_PATH, gym_id)
}

fn checked(flag: bool) -> &'static str {
    if flag {
        " checked"
    } else {
        ""
    }
}

// ---- gyms ----

#[get("/admin/gyms")]
pub async fn gyms_page(
    mut admin: LoggedAdmin,
    state_manager: web::Data<Arc<StoreStateManager>>,
    cache: web::Data<TemplateCache>,
    config: web::Data<AppConfig>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, actix_web::Error> {
    admin.validate(&state_manager).await?;

    let (gyms, owners) = match futures::try_join!(state_manager.db.list_gyms(), state_manager.db.list_owners()) {
        Ok(found) => found,
        Err(e) => return Ok(error_page(&cache, "Listing gyms", &e)),
    };
    let owner_names = name_map(&owners, |o| o.owner_id, |o| o.full_name.as_str());

    let status = query.status_filter();
    let search = query.search();
    let rows: String = gyms
        .iter()
        .filter(|g| status.as_deref().map_or(true, |s| g.status().as_str() == s))
        .filter(|g| {
            search.as_deref().map_or(true, |needle| {
                g.name.to_lowercase().contains(needle)
                    || g.city.as_deref().map_or(false, |c| c.to_lowercase().contains(needle))
            })
        })
        .map(|g| {
            format!(
                "<tr><td>{name}</td><td>{owner}</td><td>{city}</td><td>{address}</td><td>{status}</td><td>{created}</td>\
                 <td>{actions}<a class=\"btn\" href=\"{policies}\">Policies</a></td></tr>",
                name = escape(&g.name),
                owner = lookup(&owner_names, &g.owner_id),
                city = opt_text(&g.city),
                address = opt_text(&g.address),
                status = badge(g.status().as_str()),
                created = fmt_ts(&g.created_ts, config.timezone),
                actions = status_buttons(&format!("{}/{}/status", GYMS_PATH, g.gym_id), g.status().next()),
                policies = policies_path(g.gym_id),
            )
        })
        .collect();
    let rows = if rows.is_empty() { empty_row(7, "No gyms match.") } else { rows };

    let statuses: Vec<&str> = GymStatus::ALL.iter().map(|s| s.as_str()).collect();
    Ok(page_response(
        &cache,
        "gyms.html",
        "Gyms",
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
        ],
    ))
}

#[post("/admin/gyms/{gym_id}/status")]
pub async fn set_gym_status(
    mut admin: LoggedAdmin,
    state_manager: web::Data<Arc<StoreStateManager>>,
    path: web::Path<Uuid>,
    form: web::Form<StatusForm>,
) -> Result<HttpResponse, actix_web::Error> {
    admin.validate(&state_manager).await?;
    let gym_id = path.into_inner();

    let result: AppResult<String> = async {
        let target: GymStatus = form.status.parse()?;
        let entry = admin.activity("gym.status", format!("Gym {} set to {}", gym_id, target));
        let gym = state_manager.db.change_gym_status(gym_id, target, &entry).await?;
        Ok(format!("{} is now {}.", gym.name, target))
    }
    .await;

    Ok(finish(GYMS_PATH, "Changing gym status", result))
}

// ---- policies ----

#[get("/admin/gyms/{gym_id}/policies")]
pub async fn policies_page(
    mut admin: LoggedAdmin,
    state_manager: web::Data<Arc<StoreStateManager>>,
    cache: web::Data<TemplateCache>,
    config: web::Data<AppConfig>,
    path: web::Path<Uuid>,
    query: web::Query<FlashQuery>,
) -> Result<HttpResponse, actix_web::Error> {
    admin.validate(&state_manager).await?;
    let gym_id = path.into_inner();

    let loaded = futures::try_join!(state_manager.db.get_gym(gym_id), state_manager.db.list_policies(gym_id));
    let (gym, policies) = match loaded {
        Ok((Some(gym), policies)) => (gym, policies),
        Ok((None, _)) => {
            return Ok(error_page(&cache, "Listing policies", &AppError::NotFound("Gym not found.".to_string())))
        }
        Err(e) => return Ok(error_page(&cache, "Listing policies", &e)),
    };

    let rows: String = policies
        .iter()
        .map(|p| {
            format!(
                "<tr><td colspan=\"4\"><form method=\"post\" action=\"/admin/policies/{id}\" class=\"row-form\">\
                 <input type=\"text\" name=\"title\" value=\"{title}\" required>\
                 <textarea name=\"content\" rows=\"3\" required>{content}</textarea>\
                 <label><input type=\"checkbox\" name=\"is_active\" value=\"on\"{active}> Active</label>\
                 <span class=\"muted\">Updated {updated}</span>\
                 <button type=\"submit\" class=\"btn\">Save</button></form>\
                 <form method=\"post\" action=\"/admin/policies/{id}/delete\" class=\"inline\" onsubmit=\"return confirm('Delete this policy?')\">\
                 <button type=\"submit\" class=\"btn btn-danger\">Delete</button></form></td></tr>",
                id = p.policy_id,
                title = escape(&p.title),
                content = escape(&p.content),
                active = checked(p.is_active),
                updated = fmt_ts(&p.updated_ts, config.timezone),
            )
        })
        .collect();
    let rows = if rows.is_empty() { empty_row(4, "This gym has no policies yet.") } else { rows };

    Ok(page_response(
        &cache,
        "policies.html",
        &format!("Policies: {}", gym.name),
        flash_of(&query).as_ref(),
        &[
            ("gym_name", escape(&gym.name)),
            ("create_action", policies_path(gym_id)),
            ("rows", rows),
        ],
    ))
}

#[post("/admin/gyms/{gym_id}/policies")]
pub async fn create_policy(
    mut admin: LoggedAdmin,
    state_manager: web::Data<Arc<StoreStateManager>>,
    path: web::Path<Uuid>,
    form: web::Form<PolicyForm>,
) -> Result<HttpResponse, actix_web::Error> {
    admin.validate(&state_manager).await?;
    let gym_id = path.into_inner();

    let result: AppResult<String> = async {
        form.validate()?;
        let entry = admin.activity("policy.create", format!("Added policy \"{}\" to gym {}", form.title.trim(), gym_id));
        state_manager.db.create_policy(gym_id, &form, &entry).await?;
        Ok(format!("Policy \"{}\" added.", form.title.trim()))
    }
    .await;

    Ok(finish(&policies_path(gym_id), "Adding policy", result))
}

#[post("/admin/policies/{policy_id}")]
pub async fn update_policy(
    mut admin: LoggedAdmin,
    state_manager: web::Data<Arc<StoreStateManager>>,
    path: web::Path<Uuid>,
    form: web::Form<PolicyForm>,
) -> Result<HttpResponse, actix_web::Error> {
    admin.validate(&state_manager).await?;
    let policy_id = path.into_inner();

    // The owning gym is only known once the policy is loaded.
    let policy = match state_manager.db.get_policy(policy_id).await {
        Ok(Some(policy)) => policy,
        Ok(None) => return Ok(finish(GYMS_PATH, "Updating policy", Err(AppError::NotFound("Policy not found.".to_string())))),
        Err(e) => return Ok(finish(GYMS_PATH, "Updating policy", Err(e))),
    };

    let result: AppResult<String> = async {
        form.validate()?;
        let entry = admin.activity("policy.update", format!("Updated policy \"{}\"", form.title.trim()));
        state_manager.db.update_policy(policy_id, &form, &entry).await?;
        Ok(format!("Policy \"{}\" saved.", form.title.trim()))
    }
    .await;

    Ok(finish(&policies_path(policy.gym_id), "Updating policy", result))
}

#[post("/admin/policies/{policy_id}/delete")]
pub async fn delete_policy(
    mut admin: LoggedAdmin,
    state_manager: web::Data<Arc<StoreStateManager>>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, actix_web::Error> {
    admin.validate(&state_manager).await?;
    let policy_id = path.into_inner();

    let entry = admin.activity("policy.delete", format!("Deleted policy {}", policy_id));
    Ok(match state_manager.db.delete_policy(policy_id, &entry).await {
        Ok(policy) => finish(
            &policies_path(policy.gym_id),
            "Deleting policy",
            Ok(format!("Policy \"{}\" deleted.", policy.title)),
        ),
        Err(e) => finish(GYMS_PATH, "Deleting policy", Err(e)),
    })
}

// ---- amenities ----

#[get("/admin/amenities")]
pub async fn amenities_page(
    mut admin: LoggedAdmin,
    state_manager: web::Data<Arc<StoreStateManager>>,
    cache: web::Data<TemplateCache>,
    query: web::Query<FlashQuery>,
) -> Result<HttpResponse, actix_web::Error> {
    admin.validate(&state_manager).await?;

    let amenities = match state_manager.db.list_amenities().await {
        Ok(amenities) => amenities,
        Err(e) => return Ok(error_page(&cache, "Listing amenities", &e)),
    };

    let rows: String = amenities
        .iter()
        .map(|a| {
            format!(
                "<tr><td colspan=\"4\"><form method=\"post\" action=\"{base}/{id}\" class=\"row-form\">\
                 <input type=\"text\" name=\"name\" value=\"{name}\" required>\
                 <input type=\"text\" name=\"description\" value=\"{description}\">\
                 <label><input type=\"checkbox\" name=\"is_active\" value=\"on\"{active}> Active</label>\
                 <button type=\"submit\" class=\"btn\">Save</button></form>\
                 <form method=\"post\" action=\"{base}/{id}/delete\" class=\"inline\" onsubmit=\"return confirm('Delete this amenity?')\">\
                 <button type=\"submit\" class=\"btn btn-danger\">Delete</button></form></td></tr>",
                base = AMENITIES_PATH,
                id = a.amenity_id,
                name = escape(&a.name),
                description = opt_text(&a.description),
                active = checked(a.is_active),
            )
        })
        .collect();
    let rows = if rows.is_empty() { empty_row(4, "No amenities yet.") } else { rows };

    Ok(page_response(
        &cache,
        "amenities.html",
        "Amenities",
        flash_of(&query).as_ref(),
        &[("rows", rows)],
    ))
}

#[post("/admin/amenities")]
pub async fn create_amenity(
    mut admin: LoggedAdmin,
    state_manager: web::Data<Arc<StoreStateManager>>,
    form: web::Form<AmenityForm>,
) -> Result<HttpResponse, actix_web::Error> {
    admin.validate(&state_manager).await?;

    let result: AppResult<String> = async {
        form.validate()?;
        let entry = admin.activity("amenity.create", format!("Added amenity \"{}\"", form.name.trim()));
        state_manager.db.create_amenity(&form, &entry).await?;
        Ok(format!("Amenity \"{}\" added.", form.name.trim()))
    }
    .await;

    Ok(finish(AMENITIES_PATH, "Adding amenity", result))
}

#[post("/admin/amenities/{amenity_id}")]
pub async fn update_amenity(
    mut admin: LoggedAdmin,
    state_manager: web::Data<Arc<StoreStateManager>>,
    path: web::Path<Uuid>,
    form: web::Form<AmenityForm>,
) -> Result<HttpResponse, actix_web::Error> {
    admin.validate(&state_manager).await?;
    let amenity_id = path.into_inner();

    let result: AppResult<String> = async {
        form.validate()?;
        let entry = admin.activity("amenity.update", format!("Updated amenity \"{}\"", form.name.trim()));
        state_manager.db.update_amenity(amenity_id, &form, &entry).await?;
        Ok(format!("Amenity \"{}\" saved.", form.name.trim()))
    }
    .await;

    Ok(finish(AMENITIES_PATH, "Updating amenity", result))
}

#[post("/admin/amenities/{amenity_id}/delete")]
pub async fn delete_amenity(
    mut admin: LoggedAdmin,
    state_manager: web::Data<Arc<StoreStateManager>>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, actix_web::Error> {
    admin.validate(&state_manager).await?;
    let amenity_id = path.into_inner();

    let entry = admin.activity("amenity.delete", format!("Deleted amenity {}", amenity_id));
    let result = state_manager
        .db
        .delete_amenity(amenity_id, &entry)
        .await
        .map(|()| "Amenity deleted.".to_string());
    Ok(finish(AMENITIES_PATH, "Deleting amenity", result))
}

// ---- tournaments ----

#[get("/admin/tournaments")]
pub async fn tournaments_page(
    mut admin: LoggedAdmin,
    state_manager: web::Data<Arc<StoreStateManager>>,
    cache: web::Data<TemplateCache>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, actix_web::Error> {
    admin.validate(&state_manager).await?;

    let (tournaments, gyms) = match futures::try_join!(state_manager.db.list_tournaments(), state_manager.db.list_gyms()) {
        Ok(found) => found,
        Err(e) => return Ok(error_page(&cache, "Listing tournaments", &e)),
    };
    let gym_names = name_map(&gyms, |g| g.gym_id, |g| g.name.as_str());

    let status = query.status_filter();
    let rows: String = tournaments
        .iter()
        .filter(|t| status.as_deref().map_or(true, |s| t.status().as_str() == s))
        .map(|t| {
            format!(
                "<tr><td>{name}<div class=\"muted\">{description}</div></td><td>{gym}</td><td>{date}</td>\
                 <td class=\"num\">{fee}</td><td class=\"num\">{max}</td><td>{status}</td><td>{actions}</td></tr>",
                name = escape(&t.name),
                description = opt_text(&t.description),
                gym = lookup(&gym_names, &t.gym_id),
                date = t.tournament_date.format("%Y-%m-%d"),
                fee = fmt_money(&t.entry_fee),
                max = t.max_participants,
                status = badge(t.status().as_str()),
                actions = status_buttons(&format!("{}/{}/status", TOURNAMENTS_PATH, t.tournament_id), t.status().next()),
            )
        })
        .collect();
    let rows = if rows.is_empty() { empty_row(7, "No tournaments match.") } else { rows };

    let statuses: Vec<&str> = TournamentStatus::ALL.iter().map(|s| s.as_str()).collect();
    Ok(page_response(
        &cache,
        "tournaments.html",
        "Tournaments",
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

#[post("/admin/tournaments/{tournament_id}/status")]
pub async fn set_tournament_status(
    mut admin: LoggedAdmin,
    state_manager: web::Data<Arc<StoreStateManager>>,
    path: web::Path<Uuid>,
    form: web::Form<StatusForm>,
) -> Result<HttpResponse, actix_web::Error> {
    admin.validate(&state_manager).await?;
    let tournament_id = path.into_inner();

    let result: AppResult<String> = async {
        let target: TournamentStatus = form.status.parse()?;
        let entry = admin.activity("tournament.status", format!("Tournament {} set to {}", tournament_id, target));
        let tournament = state_manager
            .db
            .change_tournament_status(tournament_id, target, &entry)
            .await?;
        Ok(format!("{} is now {}.", tournament.name, target))
    }
    .await;

    Ok(finish(TOURNAMENTS_PATH, "Changing tournament status", result))
}

// ---- schedules ----

#[get("/admin/schedules")]
pub async fn schedules_page(
    mut admin: LoggedAdmin,
    state_manager: web::Data<Arc<StoreStateManager>>,
    cache: web::Data<TemplateCache>,
    config: web::Data<AppConfig>,
    query: web::Query<ScheduleQuery>,
) -> Result<HttpResponse, actix_web::Error> {
    admin.validate(&state_manager).await?;

    let filters = query.gym().and_then(|gym| query.day().map(|day| (gym, day)));
    let (gym_filter, day_filter) = match filters {
        Ok(filters) => filters,
        Err(e) => return Ok(error_page(&cache, "Filtering schedules", &e)),
    };

    let loaded = futures::try_join!(
        state_manager.db.list_schedules(),
        state_manager.db.list_members(),
        state_manager.db.list_gyms(),
    );
    let (schedules, members, gyms) = match loaded {
        Ok(found) => found,
        Err(e) => return Ok(error_page(&cache, "Listing schedules", &e)),
    };
    let member_names = name_map(&members, |m| m.user_id, |m| m.full_name.as_str());
    let gym_names = name_map(&gyms, |g| g.gym_id, |g| g.name.as_str());

    let rows: String = schedules
        .iter()
        .filter(|s| gym_filter.map_or(true, |g| s.gym_id == g))
        .filter(|s| day_filter.map_or(true, |d| s.activity_date == d))
        .map(|s| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                s.activity_date.format("%Y-%m-%d"),
                escape(&s.start_time),
                lookup(&member_names, &s.user_id),
                lookup(&gym_names, &s.gym_id),
                badge(s.status().as_str()),
                fmt_ts(&s.created_ts, config.timezone),
            )
        })
        .collect();
    let rows = if rows.is_empty() { empty_row(6, "No bookings match.") } else { rows };

    let selected_gym = gym_filter.map(|g| g.to_string()).unwrap_or_default();
    let gym_options: String = gyms
        .iter()
        .map(|g| {
            let id = g.gym_id.to_string();
            format!(
                "<option value=\"{}\"{}>{}</option>",
                id,
                if id == selected_gym { " selected" } else { "" },
                escape(&g.name)
            )
        })
        .collect();

    Ok(page_response(
        &cache,
        "schedules.html",
        "Schedules",
        None,
        &[
            ("gym_options", format!("<option value=\"\">All gyms</option>{}", gym_options)),
            ("date", day_filter.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default()),
            ("rows", rows),
        ],
    ))
}
