//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the material and phrase endpoints and the
//! master definition for the OpenAPI specification.

use crate::error::ApiResult;
use crate::web::{chat, middleware::Identity, state::AppState};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use talki_core::{
    domain::{Material, MaterialStatus, MaterialUpdate, NewMaterial, Phrase},
    ports::PortError,
};
use tracing::info;
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;

const MAX_TITLE_LEN: usize = 255;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        create_material_handler,
        list_materials_handler,
        get_material_handler,
        update_material_handler,
        delete_material_handler,
        material_status_handler,
        list_phrases_handler,
        chat::create_chat_handler,
        chat::get_chat_by_material_handler,
        chat::get_chat_handler,
        chat::list_messages_handler,
        chat::send_message_handler,
    ),
    components(
        schemas(
            CreateMaterialRequest, CreateMaterialResponse, UpdateMaterialRequest,
            MaterialResponse, StatusResponse, PhraseResponse,
            chat::CreateChatRequest, chat::ChatResponse, chat::MessageResponse,
            chat::SendMessageRequest, chat::SendMessageResponse,
        )
    ),
    tags(
        (name = "Talki API", description = "Materials, generated phrases and practice chats.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateMaterialRequest {
    pub title: String,
    pub content: String,
}

/// The response payload sent after a material is accepted for processing.
#[derive(Debug, Serialize, ToSchema)]
pub struct CreateMaterialResponse {
    pub id: Uuid,
    pub message: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateMaterialRequest {
    pub title: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct MaterialSearch {
    /// Case-insensitive substring of the title.
    pub search: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MaterialResponse {
    pub id: Uuid,
    pub uid: String,
    pub title: String,
    pub content: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Material> for MaterialResponse {
    fn from(material: Material) -> Self {
        Self {
            id: material.id,
            uid: material.owner_uid,
            title: material.title,
            content: material.content,
            status: material.status.to_string(),
            created_at: material.created_at,
            updated_at: material.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    /// One of `processing`, `completed` or `failed`.
    pub status: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PhraseResponse {
    pub id: Uuid,
    pub text: String,
    pub importance: String,
}

impl From<Phrase> for PhraseResponse {
    fn from(phrase: Phrase) -> Self {
        Self {
            id: phrase.id,
            text: phrase.text,
            importance: phrase.importance.to_string(),
        }
    }
}

fn validate_title(title: &str) -> Result<(), PortError> {
    if title.trim().is_empty() {
        return Err(PortError::Validation("title is required".to_string()));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(PortError::Validation(format!(
            "title must be at most {} characters",
            MAX_TITLE_LEN
        )));
    }
    Ok(())
}

fn validate_content(content: &str) -> Result<(), PortError> {
    if content.trim().is_empty() {
        return Err(PortError::Validation("content is required".to_string()));
    }
    Ok(())
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Liveness check.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up"))
)]
pub async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Submit a material. Phrase generation starts in the background; poll the
/// status endpoint to follow it.
#[utoipa::path(
    post,
    path = "/materials",
    request_body = CreateMaterialRequest,
    responses(
        (status = 201, description = "Material accepted for processing", body = CreateMaterialResponse),
        (status = 400, description = "Missing title or content"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn create_material_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateMaterialRequest>,
) -> ApiResult<(StatusCode, Json<CreateMaterialResponse>)> {
    validate_title(&req.title)?;
    validate_content(&req.content)?;

    let material = app_state
        .materials
        .create_material(NewMaterial {
            owner_uid: identity.0.clone(),
            title: req.title,
            content: req.content,
        })
        .await?;

    // Not awaited: the client follows progress through the status endpoint.
    app_state.phrase_jobs.spawn(material.id, identity.0.clone());

    info!("Material {} created for {}", material.id, identity.0);
    Ok((
        StatusCode::CREATED,
        Json(CreateMaterialResponse {
            id: material.id,
            message: "Material created successfully".to_string(),
        }),
    ))
}

/// List the caller's materials, newest first.
#[utoipa::path(
    get,
    path = "/materials",
    params(MaterialSearch),
    responses((status = 200, description = "The caller's materials", body = [MaterialResponse]))
)]
pub async fn list_materials_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<MaterialSearch>,
) -> ApiResult<Json<Vec<MaterialResponse>>> {
    let search = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let materials = app_state.materials.list_materials(&identity.0, search).await?;
    info!("Retrieved {} materials for {}", materials.len(), identity.0);
    Ok(Json(materials.into_iter().map(MaterialResponse::from).collect()))
}

#[utoipa::path(
    get,
    path = "/materials/{id}",
    params(("id" = Uuid, Path, description = "Material id")),
    responses(
        (status = 200, description = "The material", body = MaterialResponse),
        (status = 404, description = "No such material for this user")
    )
)]
pub async fn get_material_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(material_id): Path<Uuid>,
) -> ApiResult<Json<MaterialResponse>> {
    let material = app_state.materials.get_material(material_id, &identity.0).await?;
    Ok(Json(material.into()))
}

/// Edit a material's title or content. Existing phrases are kept as they are.
#[utoipa::path(
    put,
    path = "/materials/{id}",
    params(("id" = Uuid, Path, description = "Material id")),
    request_body = UpdateMaterialRequest,
    responses(
        (status = 200, description = "The updated material", body = MaterialResponse),
        (status = 400, description = "Blank title or content"),
        (status = 404, description = "No such material for this user")
    )
)]
pub async fn update_material_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(material_id): Path<Uuid>,
    Json(req): Json<UpdateMaterialRequest>,
) -> ApiResult<Json<MaterialResponse>> {
    if let Some(title) = &req.title {
        validate_title(title)?;
    }
    if let Some(content) = &req.content {
        validate_content(content)?;
    }

    let material = app_state
        .materials
        .update_material(
            material_id,
            &identity.0,
            MaterialUpdate {
                title: req.title,
                content: req.content,
            },
        )
        .await?;
    info!("Updated material {} for {}", material_id, identity.0);
    Ok(Json(material.into()))
}

/// Delete a material together with its phrases and chats.
#[utoipa::path(
    delete,
    path = "/materials/{id}",
    params(("id" = Uuid, Path, description = "Material id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "No such material for this user")
    )
)]
pub async fn delete_material_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(material_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    app_state
        .materials
        .delete_material(material_id, &identity.0)
        .await?;
    info!("Deleted material {} for {}", material_id, identity.0);
    Ok(StatusCode::NO_CONTENT)
}

/// Poll the phrase generation status of a material.
#[utoipa::path(
    get,
    path = "/materials/{id}/status",
    params(("id" = Uuid, Path, description = "Material id")),
    responses(
        (status = 200, description = "Current status", body = StatusResponse),
        (status = 404, description = "No such material for this user")
    )
)]
pub async fn material_status_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(material_id): Path<Uuid>,
) -> ApiResult<Json<StatusResponse>> {
    let status = app_state
        .materials
        .get_material_status(material_id, &identity.0)
        .await?;
    Ok(Json(StatusResponse {
        status: status.to_string(),
    }))
}

/// The phrases generated for a material. Empty until generation completes, so a
/// poll never sees a partially stored set.
#[utoipa::path(
    get,
    path = "/materials/{id}/phrases",
    params(("id" = Uuid, Path, description = "Material id")),
    responses(
        (status = 200, description = "Generated phrases", body = [PhraseResponse]),
        (status = 404, description = "No such material for this user")
    )
)]
pub async fn list_phrases_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(material_id): Path<Uuid>,
) -> ApiResult<Json<Vec<PhraseResponse>>> {
    // Ownership check; phrases themselves carry no owner.
    let material = app_state.materials.get_material(material_id, &identity.0).await?;
    if material.status != MaterialStatus::Completed {
        return Ok(Json(Vec::new()));
    }
    let phrases = app_state.phrases.get_phrases_for_material(material_id).await?;
    Ok(Json(phrases.into_iter().map(PhraseResponse::from).collect()))
}
