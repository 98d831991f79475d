use actix_session::storage::CookieSessionStore;
use actix_session::{Session, SessionMiddleware};
use actix_web::cookie::Key;
use actix_web::http::StatusCode;
use actix_web::{middleware, web, App, HttpRequest, HttpResponse, HttpServer, ResponseError, Result};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};

use crate::config::Config;
use crate::engine::Engine;
use crate::error::MatchError;
use crate::parser::parse_participants;
use crate::schedule::{Candidate, SlotGrid, TieBreakPrompt};
use crate::store::FileStore;

const SESSION_KEY: &str = "session_id";
const SESSION_HEADER: &str = "X-Session-Id";

pub struct AppState {
    pub engine: Mutex<Engine<FileStore>>,
}

#[derive(Deserialize)]
pub struct AvailabilityRequest {
    entity: String,
    slots: String,
}

#[derive(Deserialize)]
pub struct TieBreakRequest {
    group: usize,
    order: String,
}

#[derive(Serialize)]
pub struct PromptResponse {
    complete: bool,
    prompt: Option<TieBreakPrompt>,
}

#[derive(Serialize)]
pub struct RoundResponse {
    complete: bool,
    grid: SlotGrid,
    candidates: Vec<Candidate>,
}

impl ResponseError for MatchError {
    fn status_code(&self) -> StatusCode {
        match self {
            MatchError::Validation { .. } | MatchError::Csv(_) => StatusCode::BAD_REQUEST,
            MatchError::RecoverableInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            MatchError::UnknownSession(_) => StatusCode::NOT_FOUND,
            MatchError::InternalConsistency(_) | MatchError::Io(_) | MatchError::Json(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "success": false,
            "recoverable": self.is_recoverable(),
            "error": self.to_string(),
        }))
    }
}

fn engine(state: &AppState) -> Result<MutexGuard<'_, Engine<FileStore>>> {
    state
        .engine
        .lock()
        .map_err(|_| actix_web::error::ErrorInternalServerError("engine lock poisoned"))
}

/// Session id from the explicit header, else from the cookie session
fn session_id(req: &HttpRequest, session: &Session) -> Result<String> {
    if let Some(id) = req
        .headers()
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    {
        return Ok(id.to_string());
    }
    session
        .get::<String>(SESSION_KEY)?
        .ok_or_else(|| {
            MatchError::UnknownSession("no session; upload a participant table first".to_string())
                .into()
        })
}

// Participant CSV upload; opens a new matching session
async fn upload(
    body: web::Bytes,
    session: Session,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let table = parse_participants(&body[..])?;
    let id = engine(&state)?.load_session(&table)?;
    session.insert(SESSION_KEY, &id)?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "session_id": id,
        "participants": table.participants.len(),
        "requests": table.requests.len(),
        "slots": table.slot_count,
    })))
}

async fn block_availability(
    req: HttpRequest,
    session: Session,
    body: web::Json<AvailabilityRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let id = session_id(&req, &session)?;
    let grid = engine(&state)?.block_unavailability(&id, &body.entity, &body.slots)?;
    Ok(HttpResponse::Ok().json(grid))
}

async fn next_prompt(
    req: HttpRequest,
    session: Session,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let id = session_id(&req, &session)?;
    let prompt = engine(&state)?.next_tie_break_prompt(&id)?;
    Ok(HttpResponse::Ok().json(PromptResponse {
        complete: prompt.is_none(),
        prompt,
    }))
}

async fn resolve(
    req: HttpRequest,
    session: Session,
    body: web::Json<TieBreakRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let id = session_id(&req, &session)?;
    let engine = engine(&state)?;
    let (grid, candidates) = engine.resolve_tie_break(&id, body.group, &body.order)?;
    let complete = engine.is_complete(&id)?;
    Ok(HttpResponse::Ok().json(RoundResponse {
        complete,
        grid,
        candidates,
    }))
}

async fn get_grid(
    req: HttpRequest,
    session: Session,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let id = session_id(&req, &session)?;
    let snapshot = engine(&state)?.snapshot(&id)?;
    Ok(HttpResponse::Ok().json(snapshot.grid))
}

async fn get_candidates(
    req: HttpRequest,
    session: Session,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let id = session_id(&req, &session)?;
    let snapshot = engine(&state)?.snapshot(&id)?;
    Ok(HttpResponse::Ok().json(snapshot.candidates))
}

async fn get_summary(
    req: HttpRequest,
    session: Session,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let id = session_id(&req, &session)?;
    let summary = engine(&state)?.summary(&id)?;
    Ok(HttpResponse::Ok().json(summary))
}

async fn abandon(
    req: HttpRequest,
    session: Session,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let id = session_id(&req, &session)?;
    engine(&state)?.abandon(&id)?;
    session.remove(SESSION_KEY);
    Ok(HttpResponse::Ok().json(serde_json::json!({"success": true})))
}

/// Registers the API routes; shared by the server and the handler tests
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/upload", web::post().to(upload))
        .route("/api/availability", web::post().to(block_availability))
        .route("/api/tiebreak", web::get().to(next_prompt))
        .route("/api/tiebreak", web::post().to(resolve))
        .route("/api/grid", web::get().to(get_grid))
        .route("/api/candidates", web::get().to(get_candidates))
        .route("/api/summary", web::get().to(get_summary))
        .route("/api/session", web::delete().to(abandon));
}

pub async fn start_server(config: Config) -> std::io::Result<()> {
    let store = FileStore::new(&config.data_dir)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    let app_state = web::Data::new(AppState {
        engine: Mutex::new(Engine::new(store)),
    });
    // Sessions only live as long as the process key; state itself is on disk
    let key = Key::generate();

    tracing::info!(
        bind = %config.bind,
        port = config.port,
        data_dir = %config.data_dir.display(),
        "Starting web server"
    );

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(middleware::Logger::default())
            .wrap(
                SessionMiddleware::builder(CookieSessionStore::default(), key.clone())
                    .cookie_secure(false)
                    .build(),
            )
            .configure(configure)
    })
    .bind((config.bind.as_str(), config.port))?
    .run()
    .await
}
