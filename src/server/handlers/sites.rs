//! Legacy site pages. Same shape as the client pages.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Form;

use super::super::auth::CurrentUser;
use super::super::htmx::{redirect, HxRequest};
use super::super::template_structs::{
    Choice, FormValues, NavUser, Pager, SiteDetailTemplate, SiteFormTemplate, SiteRow, SitesTemplate,
};
use super::super::AppState;
use super::helpers::{echo, form_errors, query_suffix, render, render_status, ListParams};
use crate::error::{AppResult, FieldError};
use crate::models::{NewSite, Site, SiteUpdate, User};

fn values_from_input(input: &NewSite) -> FormValues {
    FormValues {
        name: input.name.clone(),
        client_id: echo(&input.client_id),
        address_line1: echo(&input.address_line1),
        address_line2: echo(&input.address_line2),
        city: echo(&input.city),
        state: echo(&input.state),
        postal_code: echo(&input.postal_code),
        notes: echo(&input.notes),
        ..Default::default()
    }
}

fn values_from_site(site: &Site) -> FormValues {
    FormValues {
        name: site.name.clone(),
        client_id: echo(&site.client_id),
        address_line1: echo(&site.address_line1),
        address_line2: echo(&site.address_line2),
        city: echo(&site.city),
        state: echo(&site.state),
        postal_code: echo(&site.postal_code),
        notes: echo(&site.notes),
        ..Default::default()
    }
}

fn update_from_form(input: NewSite) -> SiteUpdate {
    SiteUpdate {
        name: Some(input.name),
        client_id: Some(echo(&input.client_id)),
        address_line1: Some(echo(&input.address_line1)),
        address_line2: Some(echo(&input.address_line2)),
        city: Some(echo(&input.city)),
        state: Some(echo(&input.state)),
        postal_code: Some(echo(&input.postal_code)),
        notes: Some(echo(&input.notes)),
    }
}

async fn form_page(
    state: &AppState,
    user: &User,
    title: &str,
    action: String,
    values: FormValues,
    errors: Vec<FieldError>,
) -> AppResult<SiteFormTemplate> {
    let clients = state
        .services
        .clients
        .all(&user.id)
        .await?
        .iter()
        .map(|c| Choice::new(&c.id, &c.name, &values.client_id))
        .collect();
    Ok(SiteFormTemplate {
        title: title.to_string(),
        nav: Some(NavUser::from(user)),
        action,
        values,
        clients,
        errors,
    })
}

pub async fn list_sites(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<ListParams>,
) -> AppResult<Response> {
    let page = state
        .services
        .sites
        .list(&user.id, Some(params.q()), params.page)
        .await?;
    render(&SitesTemplate {
        title: "Sites",
        nav: Some(NavUser::from(&user)),
        q: params.q().to_string(),
        sites: page.items.iter().map(SiteRow::from).collect(),
        pager: Pager::of(&page, query_suffix(&[("q", params.q())])),
    })
}

pub async fn new_site(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> AppResult<Response> {
    let page = form_page(
        &state,
        &user,
        "New site",
        "/sites".to_string(),
        FormValues::default(),
        Vec::new(),
    )
    .await?;
    render(&page)
}

pub async fn create_site(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Form(input): Form<NewSite>,
) -> AppResult<Response> {
    match state.services.sites.create(&user.id, input.clone()).await {
        Ok(site) => Ok(Redirect::to(&format!("/sites/{}", site.id)).into_response()),
        Err(err) => {
            let errors = form_errors(err)?;
            let page = form_page(
                &state,
                &user,
                "New site",
                "/sites".to_string(),
                values_from_input(&input),
                errors,
            )
            .await?;
            render_status(StatusCode::UNPROCESSABLE_ENTITY, &page)
        }
    }
}

pub async fn site_detail(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let site = state.services.sites.get(&user.id, &id).await?;
    let client_name = match site.client_id.as_deref() {
        Some(client_id) => state.services.clients.get(&user.id, client_id).await?.name,
        None => String::new(),
    };
    render(&SiteDetailTemplate {
        title: site.name.clone(),
        nav: Some(NavUser::from(&user)),
        site: SiteRow::from(&site),
        client_name,
    })
}

pub async fn edit_site(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let site = state.services.sites.get(&user.id, &id).await?;
    let page = form_page(
        &state,
        &user,
        "Edit site",
        format!("/sites/{}", site.id),
        values_from_site(&site),
        Vec::new(),
    )
    .await?;
    render(&page)
}

pub async fn submit_site(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    Form(input): Form<NewSite>,
) -> AppResult<Response> {
    let values = values_from_input(&input);
    match state
        .services
        .sites
        .update(&user.id, &id, update_from_form(input))
        .await
    {
        Ok(site) => Ok(Redirect::to(&format!("/sites/{}", site.id)).into_response()),
        Err(err) => {
            let errors = form_errors(err)?;
            let page = form_page(&state, &user, "Edit site", format!("/sites/{}", id), values, errors)
                .await?;
            render_status(StatusCode::UNPROCESSABLE_ENTITY, &page)
        }
    }
}

pub async fn update_site(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    hx: HxRequest,
    Path(id): Path<String>,
    Form(input): Form<SiteUpdate>,
) -> AppResult<Response> {
    let site = state.services.sites.update(&user.id, &id, input).await?;
    Ok(redirect(hx, &format!("/sites/{}", site.id)))
}

pub async fn delete_site(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    hx: HxRequest,
    Path(id): Path<String>,
) -> AppResult<Response> {
    state.services.sites.delete(&user.id, &id).await?;
    Ok(redirect(hx, "/sites"))
}
