//! `/explore/*` lineage handlers.
//!
//! Query parameters are taken as raw strings so a missing or non-integer
//! `depth` is reported the same way as a non-positive one.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use provena_types::{LineageGraph, ProvenaError, Result};

use crate::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct ExploreParams {
    pub starting_id: Option<String>,
    pub depth: Option<String>,
}

impl ExploreParams {
    pub fn parse(&self) -> Result<(&str, i64)> {
        let starting_id = self
            .starting_id
            .as_deref()
            .ok_or_else(|| ProvenaError::QueryInputError("starting_id is required".into()))?;
        let raw = self
            .depth
            .as_deref()
            .ok_or_else(|| ProvenaError::QueryInputError("depth is required".into()))?;
        let depth = raw.trim().parse::<i64>().map_err(|_| {
            ProvenaError::QueryInputError(format!("depth must be a positive integer, got '{raw}'"))
        })?;
        Ok((starting_id, depth))
    }
}

pub async fn upstream(
    State(state): State<AppState>,
    Query(params): Query<ExploreParams>,
) -> std::result::Result<Json<LineageGraph>, ApiError> {
    let (id, depth) = params.parse()?;
    Ok(Json(state.lineage.upstream(id, depth).await?))
}

pub async fn downstream(
    State(state): State<AppState>,
    Query(params): Query<ExploreParams>,
) -> std::result::Result<Json<LineageGraph>, ApiError> {
    let (id, depth) = params.parse()?;
    Ok(Json(state.lineage.downstream(id, depth).await?))
}

pub async fn contributing_datasets(
    State(state): State<AppState>,
    Query(params): Query<ExploreParams>,
) -> std::result::Result<Json<LineageGraph>, ApiError> {
    let (id, depth) = params.parse()?;
    Ok(Json(state.lineage.upstream_datasets(id, depth).await?))
}

pub async fn effected_datasets(
    State(state): State<AppState>,
    Query(params): Query<ExploreParams>,
) -> std::result::Result<Json<LineageGraph>, ApiError> {
    let (id, depth) = params.parse()?;
    Ok(Json(state.lineage.downstream_datasets(id, depth).await?))
}

pub async fn contributing_agents(
    State(state): State<AppState>,
    Query(params): Query<ExploreParams>,
) -> std::result::Result<Json<LineageGraph>, ApiError> {
    let (id, depth) = params.parse()?;
    Ok(Json(state.lineage.upstream_agents(id, depth).await?))
}

pub async fn effected_agents(
    State(state): State<AppState>,
    Query(params): Query<ExploreParams>,
) -> std::result::Result<Json<LineageGraph>, ApiError> {
    let (id, depth) = params.parse()?;
    Ok(Json(state.lineage.downstream_agents(id, depth).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(id: Option<&str>, depth: Option<&str>) -> ExploreParams {
        ExploreParams {
            starting_id: id.map(String::from),
            depth: depth.map(String::from),
        }
    }

    #[test]
    fn depth_parses_as_integer() {
        let p = params(Some("10378.1/5"), Some(" 3 "));
        assert_eq!(p.parse().unwrap(), ("10378.1/5", 3));
        // Range checks belong to the lineage engine.
        assert_eq!(params(Some("x"), Some("-2")).parse().unwrap().1, -2);
    }

    #[test]
    fn missing_or_non_integer_depth_is_query_input_error() {
        for p in [
            params(Some("x"), None),
            params(Some("x"), Some("two")),
            params(Some("x"), Some("1.5")),
            params(None, Some("1")),
        ] {
            assert!(matches!(
                p.parse().unwrap_err(),
                ProvenaError::QueryInputError(_)
            ));
        }
    }
}
