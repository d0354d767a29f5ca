use actix_web::error::BlockingError;
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use basedb::operation::{self, Request, Response, ResponseBody};
use basedb::BaseDbError;
use std::collections::HashMap;

use crate::AppState;

type Params = web::Query<HashMap<String, String>>;

/// Configure all API routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/database")
            .route("", web::get().to(list_databases))
            .route("/", web::get().to(list_databases))
            .route("/{database}", web::route().to(database_operation))
            .route("/{database}/{collection}", web::route().to(collection_operation)),
    );
}

// ── Helpers ─────────────────────────────────────────────────────────

fn respond(result: Result<basedb::Result<Response>, BlockingError>) -> HttpResponse {
    match result {
        Ok(Ok(response)) => match response.into_body() {
            ResponseBody::Json(value) => HttpResponse::Ok().json(value),
            ResponseBody::Raw(bytes) => HttpResponse::Ok()
                .content_type("application/json")
                .body(bytes),
        },
        Ok(Err(e)) => err_response(e),
        Err(e) => {
            log::error!("Blocking task failed: {e}");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "status": "error",
                "error": "Internal server error"
            }))
        }
    }
}

fn err_response(e: BaseDbError) -> HttpResponse {
    let status =
        StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if e.is_client_error() {
        log::debug!("Request rejected ({status}): {e}");
    } else {
        log::error!("Internal error: {e}");
    }
    HttpResponse::build(status).json(operation::error_body(&e))
}

fn command_of(params: &HashMap<String, String>) -> String {
    params.get("command").cloned().unwrap_or_default()
}

// ── Handlers ────────────────────────────────────────────────────────

async fn list_databases(state: web::Data<AppState>) -> HttpResponse {
    respond(web::block(move || operation::list_databases(&state.store)).await)
}

async fn database_operation(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: Params,
    req: HttpRequest,
) -> HttpResponse {
    let database = path.into_inner();
    let params = query.into_inner();
    let method = req.method().as_str().to_string();

    respond(
        web::block(move || {
            let request = Request::new(&method, &params, &[]);
            operation::execute_database(&state.store, &database, &command_of(&params), &request)
        })
        .await,
    )
}

async fn collection_operation(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    query: Params,
    req: HttpRequest,
    body: web::Bytes,
) -> HttpResponse {
    let (database, collection) = path.into_inner();
    let params = query.into_inner();
    let method = req.method().as_str().to_string();

    respond(
        web::block(move || {
            let request = Request::new(&method, &params, &body);
            operation::execute_collection(
                &state.store,
                &database,
                &collection,
                &command_of(&params),
                &request,
            )
        })
        .await,
    )
}
