use actix_web::{get, post, web, HttpResponse};
use std::sync::Arc;
use uuid::Uuid;

use super::{badge, empty_row, error_page, finish, flash_of, fmt_ts, opt_text, status_buttons};
use crate::api::{ListQuery, OwnerForm, StatusForm};
use crate::auth::LoggedAdmin;
use crate::config::AppConfig;
use crate::error::{AppError, Result as AppResult};
use crate::models::{OwnerRow, OwnerStatus, UserStatus};
use crate::state::StoreStateManager;
use crate::templates::{escape, options, page_response, Flash, TemplateCache};

const USERS_PATH: &str = "/admin/users";
const OWNERS_PATH: &str = "/admin/owners";

fn matches_search(search: &Option<String>, fields: &[Option<&str>]) -> bool {
    match search {
        None => true,
        Some(needle) => fields
            .iter()
            .flatten()
            .any(|field| field.to_lowercase().contains(needle.as_str())),
    }
}

fn status_select<S: std::fmt::Display>(all: &[S], selected: &Option<String>) -> String {
    let values: Vec<String> = all.iter().map(|s| s.to_string()).collect();
    let values: Vec<&str> = values.iter().map(String::as_str).collect();
    format!(
        "<option value=\"\">All statuses</option>{}",
        options(&values, selected.as_deref().unwrap_or(""))
    )
}

// ---- members ----

#[get("/admin/users")]
pub async fn users_page(
    mut admin: LoggedAdmin,
    state_manager: web::Data<Arc<StoreStateManager>>,
    cache: web::Data<TemplateCache>,
    config: web::Data<AppConfig>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, actix_web::Error> {
    admin.validate(&state_manager).await?;

    let members = match state_manager.db.list_members().await {
        Ok(members) => members,
        Err(e) => return Ok(error_page(&cache, "Listing members", &e)),
    };

    let search = query.search();
    let status = query.status_filter();
    let rows: String = members
        .iter()
        .filter(|m| matches_search(&search, &[Some(m.full_name.as_str()), Some(m.email.as_str()), m.phone.as_deref()]))
        .filter(|m| status.as_deref().map_or(true, |s| m.status().as_str() == s))
        .map(|m| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape(&m.full_name),
                escape(&m.email),
                opt_text(&m.phone),
                badge(m.status().as_str()),
                fmt_ts(&m.created_ts, config.timezone),
                status_buttons(&format!("{}/{}/status", USERS_PATH, m.user_id), m.status().next()),
            )
        })
        .collect();
    let rows = if rows.is_empty() { empty_row(6, "No members match.") } else { rows };

    Ok(page_response(
        &cache,
        "users.html",
        "Members",
        flash_of(&query.flash()).as_ref(),
        &[
            ("q", escape(query.q.as_deref().unwrap_or(""))),
            ("status_options", status_select(UserStatus::ALL, &status)),
            ("rows", rows),
        ],
    ))
}

#[post("/admin/users/{user_id}/status")]
pub async fn set_user_status(
    mut admin: LoggedAdmin,
    state_manager: web::Data<Arc<StoreStateManager>>,
    path: web::Path<Uuid>,
    form: web::Form<StatusForm>,
) -> Result<HttpResponse, actix_web::Error> {
    admin.validate(&state_manager).await?;
    let user_id = path.into_inner();

    let result: AppResult<String> = async {
        let target: UserStatus = form.status.parse()?;
        let member = state_manager
            .db
            .get_member(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Member not found.".to_string()))?;
        if !member.status().can_move_to(target) {
            return Err(AppError::Conflict(format!("{} is already {}.", member.full_name, member.status())));
        }
        let entry = admin.activity("member.status", format!("{} set to {}", member.email, target));
        state_manager.db.set_member_status(user_id, target, &entry).await?;
        Ok(format!("{} is now {}.", member.full_name, target))
    }
    .await;

    Ok(finish(USERS_PATH, "Changing member status", result))
}

// ---- gym owners ----

#[get("/admin/owners")]
pub async fn owners_page(
    mut admin: LoggedAdmin,
    state_manager: web::Data<Arc<StoreStateManager>>,
    cache: web::Data<TemplateCache>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, actix_web::Error> {
    admin.validate(&state_manager).await?;

    let (owners, gyms) = match futures::try_join!(state_manager.db.list_owners(), state_manager.db.list_gyms()) {
        Ok(found) => found,
        Err(e) => return Ok(error_page(&cache, "Listing owners", &e)),
    };

    let search = query.search();
    let status = query.status_filter();
    let rows: String = owners
        .iter()
        .filter(|o| {
            matches_search(
                &search,
                &[Some(o.full_name.as_str()), Some(o.email.as_str()), o.phone.as_deref(), o.business_name.as_deref()],
            )
        })
        .filter(|o| status.as_deref().map_or(true, |s| o.status().as_str() == s))
        .map(|o| {
            let gym_count = gyms.iter().filter(|g| g.owner_id == o.owner_id).count();
            format!(
                "<tr><td>{name}</td><td>{email}</td><td>{phone}</td><td>{business}</td><td>{gyms}</td><td>{status}</td>\
                 <td><a class=\"btn\" href=\"{base}/{id}/edit\">Edit</a>{toggle}\
                 <form method=\"post\" action=\"{base}/{id}/delete\" class=\"inline\" onsubmit=\"return confirm('Delete this owner?')\">\
                 <button type=\"submit\" class=\"btn btn-danger\">Delete</button></form></td></tr>",
                name = escape(&o.full_name),
                email = escape(&o.email),
                phone = opt_text(&o.phone),
                business = opt_text(&o.business_name),
                gyms = gym_count,
                status = badge(o.status().as_str()),
                base = OWNERS_PATH,
                id = o.owner_id,
                toggle = status_buttons(&format!("{}/{}/status", OWNERS_PATH, o.owner_id), o.status().next()),
            )
        })
        .collect();
    let rows = if rows.is_empty() { empty_row(7, "No owners match.") } else { rows };

    Ok(page_response(
        &cache,
        "owners.html",
        "Gym Owners",
        flash_of(&query.flash()).as_ref(),
        &[
            ("q", escape(query.q.as_deref().unwrap_or(""))),
            ("status_options", status_select(OwnerStatus::ALL, &status)),
            ("rows", rows),
        ],
    ))
}

fn owner_form_page(
    cache: &TemplateCache,
    action: &str,
    heading: &str,
    form: &OwnerForm,
    flash: Option<&Flash>,
) -> HttpResponse {
    let opt = |v: &Option<String>| escape(v.as_deref().unwrap_or(""));
    page_response(
        cache,
        "owner_form.html",
        heading,
        flash,
        &[
            ("heading", escape(heading)),
            ("action", action.to_string()),
            ("full_name", escape(&form.full_name)),
            ("email", escape(&form.email)),
            ("phone", opt(&form.phone)),
            ("business_name", opt(&form.business_name)),
            ("address", opt(&form.address)),
        ],
    )
}

fn owner_to_form(owner: &OwnerRow) -> OwnerForm {
    OwnerForm {
        full_name: owner.full_name.clone(),
        email: owner.email.clone(),
        phone: owner.phone.clone(),
        business_name: owner.business_name.clone(),
        address: owner.address.clone(),
    }
}

#[get("/admin/owners/new")]
pub async fn new_owner_page(
    mut admin: LoggedAdmin,
    state_manager: web::Data<Arc<StoreStateManager>>,
    cache: web::Data<TemplateCache>,
) -> Result<HttpResponse, actix_web::Error> {
    admin.validate(&state_manager).await?;
    Ok(owner_form_page(&cache, OWNERS_PATH, "Add Gym Owner", &OwnerForm::default(), None))
}

#[post("/admin/owners")]
pub async fn create_owner(
    mut admin: LoggedAdmin,
    state_manager: web::Data<Arc<StoreStateManager>>,
    cache: web::Data<TemplateCache>,
    form: web::Form<OwnerForm>,
) -> Result<HttpResponse, actix_web::Error> {
    admin.validate(&state_manager).await?;
    let form = form.into_inner();

    let result: AppResult<uuid::Uuid> = async {
        form.validate()?;
        let entry = admin.activity("owner.create", format!("Added owner {} <{}>", form.full_name.trim(), form.email.trim()));
        state_manager.db.create_owner(&form, &entry).await
    }
    .await;

    Ok(match result {
        Ok(_) => super::redirect_flash(OWNERS_PATH, &Flash::success(format!("Owner {} added.", form.full_name.trim()))),
        Err(e) => {
            super::log_failure("Adding owner", &e);
            owner_form_page(&cache, OWNERS_PATH, "Add Gym Owner", &form, Some(&Flash::error(e.user_message())))
        }
    })
}

#[get("/admin/owners/{owner_id}/edit")]
pub async fn edit_owner_page(
    mut admin: LoggedAdmin,
    state_manager: web::Data<Arc<StoreStateManager>>,
    cache: web::Data<TemplateCache>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, actix_web::Error> {
    admin.validate(&state_manager).await?;
    let owner_id = path.into_inner();

    match state_manager.db.get_owner(owner_id).await {
        Ok(Some(owner)) => Ok(owner_form_page(
            &cache,
            &format!("{}/{}", OWNERS_PATH, owner_id),
            "Edit Gym Owner",
            &owner_to_form(&owner),
            None,
        )),
        Ok(None) => Ok(error_page(&cache, "Editing owner", &AppError::NotFound("Owner not found.".to_string()))),
        Err(e) => Ok(error_page(&cache, "Editing owner", &e)),
    }
}

#[post("/admin/owners/{owner_id}")]
pub async fn update_owner(
    mut admin: LoggedAdmin,
    state_manager: web::Data<Arc<StoreStateManager>>,
    cache: web::Data<TemplateCache>,
    path: web::Path<Uuid>,
    form: web::Form<OwnerForm>,
) -> Result<HttpResponse, actix_web::Error> {
    admin.validate(&state_manager).await?;
    let owner_id = path.into_inner();
    let form = form.into_inner();

    let result: AppResult<()> = async {
        form.validate()?;
        let entry = admin.activity("owner.update", format!("Updated owner {} <{}>", form.full_name.trim(), form.email.trim()));
        state_manager.db.update_owner(owner_id, &form, &entry).await
    }
    .await;

    Ok(match result {
        Ok(()) => super::redirect_flash(OWNERS_PATH, &Flash::success(format!("Owner {} updated.", form.full_name.trim()))),
        Err(e) => {
            super::log_failure("Updating owner", &e);
            owner_form_page(
                &cache,
                &format!("{}/{}", OWNERS_PATH, owner_id),
                "Edit Gym Owner",
                &form,
                Some(&Flash::error(e.user_message())),
            )
        }
    })
}

#[post("/admin/owners/{owner_id}/status")]
pub async fn set_owner_status(
    mut admin: LoggedAdmin,
    state_manager: web::Data<Arc<StoreStateManager>>,
    path: web::Path<Uuid>,
    form: web::Form<StatusForm>,
) -> Result<HttpResponse, actix_web::Error> {
    admin.validate(&state_manager).await?;
    let owner_id = path.into_inner();

    let result: AppResult<String> = async {
        let target: OwnerStatus = form.status.parse()?;
        let owner = state_manager
            .db
            .get_owner(owner_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Owner not found.".to_string()))?;
        if !owner.status().can_move_to(target) {
            return Err(AppError::Conflict(format!("{} is already {}.", owner.full_name, owner.status())));
        }
        let entry = admin.activity("owner.status", format!("{} set to {}", owner.email, target));
        state_manager.db.set_owner_status(owner_id, target, &entry).await?;
        Ok(format!("{} is now {}.", owner.full_name, target))
    }
    .await;

    Ok(finish(OWNERS_PATH, "Changing owner status", result))
}

#[post("/admin/owners/{owner_id}/delete")]
pub async fn delete_owner(
    mut admin: LoggedAdmin,
    state_manager: web::Data<Arc<StoreStateManager>>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, actix_web::Error> {
    admin.validate(&state_manager).await?;
    let owner_id = path.into_inner();

    let result: AppResult<String> = async {
        let owner = state_manager
            .db
            .get_owner(owner_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Owner not found.".to_string()))?;
        let entry = admin.activity("owner.delete", format!("Deleted owner {}", owner.email));
        state_manager.db.delete_owner(owner_id, &entry).await?;
        Ok(format!("Owner {} deleted.", owner.full_name))
    }
    .await;

    Ok(finish(OWNERS_PATH, "Deleting owner", result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_matches_any_present_field() {
        let needle = Some("cruz".to_string());
        assert!(matches_search(&needle, &[Some("Ana Cruz"), None]));
        assert!(matches_search(&needle, &[Some("Ana"), Some("ana.cruz@example.com")]));
        assert!(!matches_search(&needle, &[Some("Ben"), None]));
        assert!(matches_search(&None, &[None]));
    }

    #[test]
    fn status_select_keeps_choice() {
        let html = status_select(OwnerStatus::ALL, &Some("inactive".to_string()));
        assert!(html.starts_with("<option value=\"\">All statuses</option>"));
        assert!(html.contains("<option value=\"inactive\" selected>"));
    }
}
