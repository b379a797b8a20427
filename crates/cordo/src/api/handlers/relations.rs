//! Relation handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, instrument};

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::relation::{Relation, RelationDefinition};

/// The closed set of relation definitions.
#[instrument]
pub async fn list_definitions() -> Json<Value> {
    let definitions: Vec<Value> = RelationDefinition::all()
        .into_iter()
        .map(|def| {
            json!({
                "definition": def,
                "cascading_delete": def.cascading_delete(),
            })
        })
        .collect();
    Json(json!({"definitions": definitions}))
}

/// Body of `POST /relations`.
#[derive(Debug, Deserialize)]
pub struct CreateRelationRequest {
    pub definition: RelationDefinition,
    pub from_document_id: String,
    pub to_document_id: String,
    #[serde(default)]
    pub from_to_note: Option<String>,
    #[serde(default)]
    pub to_from_note: Option<String>,
}

/// Both stored rows of a created relation.
#[derive(Debug, Serialize)]
pub struct RelationPairResponse {
    pub from: Relation,
    pub to: Relation,
}

/// Create a relation: two mirrored rows sharing a pair id.
#[instrument(skip(state, request), fields(definition = %request.definition))]
pub async fn create_relation(
    State(state): State<AppState>,
    Json(request): Json<CreateRelationRequest>,
) -> ApiResult<(StatusCode, Json<RelationPairResponse>)> {
    if request.from_document_id == request.to_document_id {
        return Err(ApiError::bad_request("a relation needs two distinct documents"));
    }

    // Both endpoints must be real sessions.
    state.sessions.get(&request.from_document_id).await?;
    state.sessions.get(&request.to_document_id).await?;

    if state
        .relations
        .pair_exists(
            request.definition,
            &request.from_document_id,
            &request.to_document_id,
        )
        .await?
    {
        return Err(ApiError::conflict(format!(
            "a {} relation between {} and {} already exists",
            request.definition, request.from_document_id, request.to_document_id
        )));
    }

    let (from, to) = state
        .relations
        .create_pair(
            request.definition,
            &request.from_document_id,
            &request.to_document_id,
            request.from_to_note.as_deref(),
            request.to_from_note.as_deref(),
        )
        .await?;

    info!(pair_id = %from.pair_id, "Created relation");
    Ok((StatusCode::CREATED, Json(RelationPairResponse { from, to })))
}

/// Body of `PATCH /relations/{id}`: note only.
#[derive(Debug, Deserialize)]
pub struct UpdateRelationRequest {
    pub note: Option<String>,
}

/// Update the note on one row of a pair.
#[instrument(skip(state, request))]
pub async fn update_relation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateRelationRequest>,
) -> ApiResult<Json<Relation>> {
    if !state
        .relations
        .update_note(&id, request.note.as_deref())
        .await?
    {
        return Err(ApiError::not_found(format!("relation {}", id)));
    }

    let relation = state
        .relations
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("relation {}", id)))?;
    Ok(Json(relation))
}

/// Delete both rows of the pair the given row belongs to.
#[instrument(skip(state))]
pub async fn delete_relation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    if !state.relations.delete_pair(&id).await? {
        return Err(ApiError::not_found(format!("relation {}", id)));
    }
    Ok(StatusCode::NO_CONTENT)
}
