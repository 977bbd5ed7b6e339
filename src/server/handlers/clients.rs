//! Client pages.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Redirect, IntoResponse, Response};
use axum::Form;

use super::super::auth::CurrentUser;
use super::super::htmx::{redirect, HxRequest};
use super::super::template_structs::{
    ClientDetailTemplate, ClientFormTemplate, ClientRow, ClientsTemplate, FormValues, InspectionRow,
    NavUser, Pager,
};
use super::super::AppState;
use super::helpers::{echo, form_errors, query_suffix, render, render_status, ListParams};
use crate::error::{AppResult, FieldError};
use crate::models::{Client, ClientUpdate, NewClient, User};
use crate::repository::InspectionFilter;

fn values_from_input(input: &NewClient) -> FormValues {
    FormValues {
        name: input.name.clone(),
        contact_name: echo(&input.contact_name),
        email: echo(&input.email),
        phone: echo(&input.phone),
        address_line1: echo(&input.address_line1),
        address_line2: echo(&input.address_line2),
        city: echo(&input.city),
        state: echo(&input.state),
        postal_code: echo(&input.postal_code),
        notes: echo(&input.notes),
        ..Default::default()
    }
}

fn values_from_client(client: &Client) -> FormValues {
    FormValues {
        name: client.name.clone(),
        contact_name: echo(&client.contact_name),
        email: echo(&client.email),
        phone: echo(&client.phone),
        address_line1: echo(&client.address_line1),
        address_line2: echo(&client.address_line2),
        city: echo(&client.city),
        state: echo(&client.state),
        postal_code: echo(&client.postal_code),
        notes: echo(&client.notes),
        ..Default::default()
    }
}

/// Every field of the edit form, as a full update.
fn update_from_form(input: NewClient) -> ClientUpdate {
    ClientUpdate {
        name: Some(input.name),
        contact_name: Some(echo(&input.contact_name)),
        email: Some(echo(&input.email)),
        phone: Some(echo(&input.phone)),
        address_line1: Some(echo(&input.address_line1)),
        address_line2: Some(echo(&input.address_line2)),
        city: Some(echo(&input.city)),
        state: Some(echo(&input.state)),
        postal_code: Some(echo(&input.postal_code)),
        notes: Some(echo(&input.notes)),
    }
}

fn form_page(
    user: &User,
    title: &str,
    action: String,
    values: FormValues,
    errors: Vec<FieldError>,
) -> ClientFormTemplate {
    ClientFormTemplate {
        title: title.to_string(),
        nav: Some(NavUser::from(user)),
        action,
        values,
        errors,
    }
}

pub async fn list_clients(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<ListParams>,
) -> AppResult<Response> {
    let page = state
        .services
        .clients
        .list(&user.id, Some(params.q()), params.page)
        .await?;
    render(&ClientsTemplate {
        title: "Clients",
        nav: Some(NavUser::from(&user)),
        q: params.q().to_string(),
        clients: page.items.iter().map(ClientRow::from).collect(),
        pager: Pager::of(&page, query_suffix(&[("q", params.q())])),
    })
}

pub async fn new_client(CurrentUser(user): CurrentUser) -> AppResult<Response> {
    render(&form_page(
        &user,
        "New client",
        "/clients".to_string(),
        FormValues::default(),
        Vec::new(),
    ))
}

pub async fn create_client(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Form(input): Form<NewClient>,
) -> AppResult<Response> {
    match state.services.clients.create(&user.id, input.clone()).await {
        Ok(client) => Ok(Redirect::to(&format!("/clients/{}", client.id)).into_response()),
        Err(err) => {
            let errors = form_errors(err)?;
            render_status(
                StatusCode::UNPROCESSABLE_ENTITY,
                &form_page(&user, "New client", "/clients".to_string(), values_from_input(&input), errors),
            )
        }
    }
}

pub async fn client_detail(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let client = state.services.clients.get(&user.id, &id).await?;
    let filter = InspectionFilter {
        client_id: Some(client.id.clone()),
        ..Default::default()
    };
    let inspections = state.services.inspections.list(&user.id, &filter, None).await?;
    render(&ClientDetailTemplate {
        title: client.name.clone(),
        nav: Some(NavUser::from(&user)),
        client: ClientRow::from(&client),
        inspections: inspections.items.iter().map(InspectionRow::from).collect(),
    })
}

pub async fn edit_client(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let client = state.services.clients.get(&user.id, &id).await?;
    render(&form_page(
        &user,
        "Edit client",
        format!("/clients/{}", client.id),
        values_from_client(&client),
        Vec::new(),
    ))
}

/// Form post from the edit page.
pub async fn submit_client(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    Form(input): Form<NewClient>,
) -> AppResult<Response> {
    let values = values_from_input(&input);
    match state
        .services
        .clients
        .update(&user.id, &id, update_from_form(input))
        .await
    {
        Ok(client) => Ok(Redirect::to(&format!("/clients/{}", client.id)).into_response()),
        Err(err) => {
            let errors = form_errors(err)?;
            render_status(
                StatusCode::UNPROCESSABLE_ENTITY,
                &form_page(&user, "Edit client", format!("/clients/{}", id), values, errors),
            )
        }
    }
}

/// Partial update; only the submitted fields change.
pub async fn update_client(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    hx: HxRequest,
    Path(id): Path<String>,
    Form(input): Form<ClientUpdate>,
) -> AppResult<Response> {
    let client = state.services.clients.update(&user.id, &id, input).await?;
    Ok(redirect(hx, &format!("/clients/{}", client.id)))
}

pub async fn delete_client(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    hx: HxRequest,
    Path(id): Path<String>,
) -> AppResult<Response> {
    state.services.clients.delete(&user.id, &id).await?;
    Ok(redirect(hx, "/clients"))
}
