//! Regulation search and detail pages.

use axum::extract::{Path, Query, State};
use axum::response::Response;

use super::super::auth::CurrentUser;
use super::super::template_structs::{
    Choice, NavUser, Pager, RegulationDetailTemplate, RegulationRow, RegulationsTemplate,
};
use super::super::AppState;
use super::helpers::{query_suffix, render, ListParams};
use crate::error::AppResult;

/// Category names, served from the stats cache when fresh.
async fn categories(state: &AppState) -> AppResult<Vec<String>> {
    if let Some(cached) = state.stats_cache.get_categories() {
        return Ok(cached);
    }
    let names: Vec<String> = state
        .services
        .regulations
        .categories()
        .await?
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    state.stats_cache.set_categories(names.clone());
    Ok(names)
}

pub async fn list_regulations(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<ListParams>,
) -> AppResult<Response> {
    let category = params.category.as_deref().unwrap_or("").trim();
    let page = state
        .services
        .regulations
        .search(Some(params.q()), Some(category), params.page)
        .await?;
    let categories = categories(&state)
        .await?
        .iter()
        .map(|c| Choice::new(c, c, category))
        .collect();

    render(&RegulationsTemplate {
        title: "Regulations",
        nav: Some(NavUser::from(&user)),
        q: params.q().to_string(),
        categories,
        regulations: page.items.iter().map(RegulationRow::from).collect(),
        pager: Pager::of(
            &page,
            query_suffix(&[("q", params.q()), ("category", category)]),
        ),
    })
}

pub async fn regulation_detail(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let regulation = state.services.regulations.get(&id).await?;
    render(&RegulationDetailTemplate {
        title: format!("{} {}", regulation.standard_number, regulation.title),
        nav: Some(NavUser::from(&user)),
        regulation: RegulationRow::from(&regulation),
        full_text: regulation.full_text,
    })
}
