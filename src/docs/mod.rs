use utoipa::OpenApi;
use crate::models::*;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn health_check_doc() {}

/// Create a threat model
#[utoipa::path(
    post,
    path = "/api/v1/threat_models",
    request_body = ThreatModelCreateRequest,
    responses(
        (status = 201, description = "Threat model created", body = ThreatModel),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn threat_model_create_doc() {}

#[utoipa::path(
    get,
    path = "/api/v1/threat_models/{threat_model_id}",
    params(("threat_model_id" = String, Path, description = "Threat model UUID")),
    responses(
        (status = 200, description = "Threat model", body = ThreatModel),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn threat_model_get_doc() {}

/// Delete a threat model and its diagrams
#[utoipa::path(
    delete,
    path = "/api/v1/threat_models/{threat_model_id}",
    params(("threat_model_id" = String, Path, description = "Threat model UUID")),
    responses(
        (status = 204, description = "Threat model deleted"),
        (status = 404, description = "Not found", body = ErrorResponse),
        (status = 409, description = "A diagram is being edited collaboratively", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn threat_model_delete_doc() {}

#[utoipa::path(
    post,
    path = "/api/v1/threat_models/{threat_model_id}/diagrams",
    params(("threat_model_id" = String, Path, description = "Threat model UUID")),
    request_body = DiagramCreateRequest,
    responses(
        (status = 201, description = "Diagram created", body = Diagram),
        (status = 404, description = "Threat model not found", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn diagram_create_doc() {}

#[utoipa::path(
    get,
    path = "/api/v1/threat_models/{threat_model_id}/diagrams/{diagram_id}",
    params(
        ("threat_model_id" = String, Path, description = "Threat model UUID"),
        ("diagram_id" = String, Path, description = "Diagram UUID")
    ),
    responses(
        (status = 200, description = "Diagram", body = Diagram),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn diagram_get_doc() {}

/// Replace a diagram
#[utoipa::path(
    put,
    path = "/api/v1/threat_models/{threat_model_id}/diagrams/{diagram_id}",
    params(
        ("threat_model_id" = String, Path, description = "Threat model UUID"),
        ("diagram_id" = String, Path, description = "Diagram UUID")
    ),
    request_body = DiagramUpdateRequest,
    responses(
        (status = 200, description = "Diagram updated", body = Diagram),
        (status = 404, description = "Not found", body = ErrorResponse),
        (status = 409, description = "The diagram is being edited collaboratively", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn diagram_update_doc() {}

/// Partially update a diagram
#[utoipa::path(
    patch,
    path = "/api/v1/threat_models/{threat_model_id}/diagrams/{diagram_id}",
    params(
        ("threat_model_id" = String, Path, description = "Threat model UUID"),
        ("diagram_id" = String, Path, description = "Diagram UUID")
    ),
    request_body = DiagramPatchRequest,
    responses(
        (status = 200, description = "Diagram updated", body = Diagram),
        (status = 404, description = "Not found", body = ErrorResponse),
        (status = 409, description = "The diagram is being edited collaboratively", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn diagram_patch_doc() {}

#[utoipa::path(
    delete,
    path = "/api/v1/threat_models/{threat_model_id}/diagrams/{diagram_id}",
    params(
        ("threat_model_id" = String, Path, description = "Threat model UUID"),
        ("diagram_id" = String, Path, description = "Diagram UUID")
    ),
    responses(
        (status = 204, description = "Diagram deleted"),
        (status = 404, description = "Not found", body = ErrorResponse),
        (status = 409, description = "The diagram is being edited collaboratively", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn diagram_delete_doc() {}

/// Current collaboration session of a diagram
#[utoipa::path(
    get,
    path = "/api/v1/threat_models/{threat_model_id}/diagrams/{diagram_id}/collaborate",
    params(
        ("threat_model_id" = String, Path, description = "Threat model UUID"),
        ("diagram_id" = String, Path, description = "Diagram UUID")
    ),
    responses(
        (status = 200, description = "Live session", body = CollaborationInfoResponse),
        (status = 404, description = "No live session", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn collaborate_info_doc() {}

/// Start (or join) the collaboration session of a diagram
#[utoipa::path(
    post,
    path = "/api/v1/threat_models/{threat_model_id}/diagrams/{diagram_id}/collaborate",
    params(
        ("threat_model_id" = String, Path, description = "Threat model UUID"),
        ("diagram_id" = String, Path, description = "Diagram UUID")
    ),
    responses(
        (status = 201, description = "Session started", body = CollaborationStartResponse),
        (status = 404, description = "Diagram not found", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn collaborate_start_doc() {}

/// End the collaboration session of a diagram
#[utoipa::path(
    delete,
    path = "/api/v1/threat_models/{threat_model_id}/diagrams/{diagram_id}/collaborate",
    params(
        ("threat_model_id" = String, Path, description = "Threat model UUID"),
        ("diagram_id" = String, Path, description = "Diagram UUID")
    ),
    responses(
        (status = 204, description = "Session ended, or there was none")
    )
)]
#[allow(dead_code)]
pub async fn collaborate_end_doc() {}

#[utoipa::path(
    get,
    path = "/api/v1/collaboration/sessions",
    responses(
        (status = 200, description = "All live sessions", body = [CollaborationSession])
    )
)]
#[allow(dead_code)]
pub async fn collaboration_sessions_doc() {}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check_doc,
        threat_model_create_doc,
        threat_model_get_doc,
        threat_model_delete_doc,
        diagram_create_doc,
        diagram_get_doc,
        diagram_update_doc,
        diagram_patch_doc,
        diagram_delete_doc,
        collaborate_info_doc,
        collaborate_start_doc,
        collaborate_end_doc,
        collaboration_sessions_doc,
    ),
    components(
        schemas(
            HealthResponse,
            ErrorResponse,
            ThreatModel,
            ThreatModelCreateRequest,
            Diagram,
            DiagramCreateRequest,
            DiagramUpdateRequest,
            DiagramPatchRequest,
            Participant,
            CollaborationSession,
            CollaborationInfoResponse,
            CollaborationStartResponse,
            Operation,
            CollabMessage,
            EventKind,
            ClientMessage,
        )
    ),
    tags(
        (name = "api", description = "Threat model, diagram and collaboration endpoints")
    )
)]
pub struct ApiDoc;
