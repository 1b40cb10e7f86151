//! Read-only catalog endpoints backing the registration form.

use crate::server::AppState;
use axum::extract::{Query, State};
use axum::response::Json;
use registrar_types::{Department, University};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct DepartmentQuery {
	pub university: Option<u64>,
}

/// Handles GET /api/catalog/universities.
pub async fn list_universities(State(state): State<AppState>) -> Json<Vec<University>> {
	Json(state.engine.catalog().universities.clone())
}

/// Handles GET /api/catalog/departments.
///
/// Without a `university` filter every department is listed.
pub async fn list_departments(
	State(state): State<AppState>,
	Query(query): Query<DepartmentQuery>,
) -> Json<Vec<Department>> {
	let catalog = state.engine.catalog();
	let departments = match query.university {
		Some(university_id) => catalog
			.departments_for(university_id)
			.into_iter()
			.cloned()
			.collect(),
		None => catalog.departments.clone(),
	};
	Json(departments)
}
