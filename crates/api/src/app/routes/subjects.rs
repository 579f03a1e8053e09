use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use kacaf_auth::{explain_authorization, Action};
use kacaf_core::{SubjectId, SubjectKind};
use kacaf_decisions::{Decision, Opinion};

use crate::app::{dto, errors, services::AppServices};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(submit))
        .route("/pending", get(pending))
        .route("/:id", get(get_subject))
        .route("/:id/advice", post(advise))
        .route("/:id/decision", post(decide))
        .route("/:id/authorization", get(explain))
}

fn parse_subject_id(raw: &str) -> Result<SubjectId, axum::response::Response> {
    raw.parse()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid subject id"))
}

pub async fn submit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<PrincipalContext>,
    Json(body): Json<dto::SubmitSubjectRequest>,
) -> axum::response::Response {
    let subject_id = body.id.unwrap_or_default();

    match services
        .engine()
        .submit(caller.principal(), subject_id, body.kind, body.details)
    {
        Ok(subject) => (StatusCode::CREATED, Json(dto::SubjectView::new(&subject))).into_response(),
        Err(e) => errors::workflow_error_to_response(e, caller.is_anonymous()),
    }
}

pub async fn pending(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<PrincipalContext>,
    Query(query): Query<dto::PendingQuery>,
) -> axum::response::Response {
    match services.engine().pending_subjects(caller.principal(), query.kind) {
        Ok(subjects) => {
            let views: Vec<_> = subjects.iter().map(dto::SubjectView::new).collect();
            (StatusCode::OK, Json(serde_json::json!({ "subjects": views }))).into_response()
        }
        Err(e) => errors::workflow_error_to_response(e, caller.is_anonymous()),
    }
}

pub async fn get_subject(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let subject_id = match parse_subject_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.engine().load_subject(caller.principal(), subject_id) {
        Ok(subject) => (StatusCode::OK, Json(dto::SubjectView::new(&subject))).into_response(),
        Err(e) => errors::workflow_error_to_response(e, caller.is_anonymous()),
    }
}

pub async fn advise(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AdviceRequest>,
) -> axum::response::Response {
    let subject_id = match parse_subject_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let opinion = Opinion {
        stance: body.stance,
        note: body.note,
    };

    match services
        .engine()
        .add_advisory_input(caller.principal(), subject_id, opinion)
    {
        Ok(receipt) => match &receipt.subject {
            Some(subject) => (StatusCode::OK, Json(dto::SubjectView::new(subject))).into_response(),
            None => (StatusCode::OK, Json(dto::AdviceAck::from(&receipt))).into_response(),
        },
        Err(e) => errors::workflow_error_to_response(e, caller.is_anonymous()),
    }
}

pub async fn decide(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::DecisionRequest>,
) -> axum::response::Response {
    let subject_id = match parse_subject_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let decision: Decision = match body.decision.parse() {
        Ok(d) => d,
        Err(e) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", format!("{e}"));
        }
    };

    match services
        .engine()
        .decide(caller.principal(), subject_id, decision, body.comments)
    {
        Ok(subject) => (StatusCode::OK, Json(dto::SubjectView::new(&subject))).into_response(),
        Err(e) => errors::workflow_error_to_response(e, caller.is_anonymous()),
    }
}

/// GET /subjects/:id/authorization?action=decide - explain the caller's access.
pub async fn explain(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Query(query): Query<dto::AuthorizationQuery>,
) -> axum::response::Response {
    let subject_id = match parse_subject_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let subject = match services.engine().load_subject(caller.principal(), subject_id) {
        Ok(s) => s,
        Err(e) => return errors::workflow_error_to_response(e, caller.is_anonymous()),
    };
    let Some(kind) = subject.kind() else {
        return errors::json_error(StatusCode::NOT_FOUND, "not_found", "subject not found");
    };

    let action = match action_for(&query.action, kind) {
        Ok(a) => a,
        Err(msg) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_action", msg),
    };

    let resource = subject.as_resource();
    let resource = matches!(action, Action::Read | Action::WriteOwn).then_some(&resource);
    let explanation = explain_authorization(caller.principal(), &action, resource);

    (StatusCode::OK, Json(explanation)).into_response()
}

fn action_for(raw: &str, kind: SubjectKind) -> Result<Action, String> {
    match raw {
        "decide" => Ok(Action::Decide(kind)),
        "advise" => Ok(Action::Advise(kind)),
        "submit" => Ok(Action::Submit(kind)),
        other => other.parse().map_err(|e| format!("{e}")),
    }
}
