//! REST API layer using Axum
//!
//! Public routes serve the inventory document and the login; every write to
//! the inventory and all administrator management sit behind the bearer
//! token middleware. Administrator management additionally requires the
//! `super admin` role.

use axum::{
    extract::{FromRequest, FromRequestParts, Path, State},
    http::{header, Request},
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use crate::auth::{hash_password, verify_password, AuthError, TokenKeys};
use crate::error::ApiError;
use crate::inventory::parse_count;
use crate::models::{AdministratorSummary, Claims, InventoryDocument, Loan, Role};
use crate::storage::{NewAdministrator, Storage};

/// `Json` body whose rejections use the `{"detail"}` error body.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// `Path` parameters whose rejections use the `{"detail"}` error body.
#[derive(FromRequestParts)]
#[from_request(via(Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

/// Shared app state for REST handlers (Arc-wrapped for concurrency)
pub struct AppState {
    storage: Storage,
    keys: TokenKeys,
    bcrypt_cost: u32,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub detail: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct MaterialRequest {
    pub materiaux: String,
    pub atelier: String,
    /// Defaults to 1, must be at least 1.
    #[serde(default)]
    pub nombre: Option<i64>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct MaterialResponse {
    pub message: String,
    pub atelier: String,
    pub materiaux: String,
    pub nombre: u32,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct LoanRequest {
    pub nom: String,
    pub numero: i64,
    #[schema(value_type = Vec<Object>)]
    pub materiaux: Vec<Map<String, Value>>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct LoanResponse {
    pub message: String,
    pub id: u64,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct SignInRequest {
    pub email: String,
    pub name: String,
    pub password: String,
    #[serde(default)]
    pub is_super_admin: bool,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct SignInResponse {
    pub message: String,
    pub id: u64,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub message: String,
    pub token: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct AdminGroup {
    pub admin: Vec<AdministratorSummary>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct SuperAdminGroup {
    pub super_admin: Vec<AdministratorSummary>,
}

/// `liste` is `[{"admin": [...]}, {"super_admin": [...]}]`, the shape the
/// front ends already read.
#[derive(Serialize, Deserialize, ToSchema)]
pub struct AdministratorListResponse {
    #[schema(value_type = Vec<Object>)]
    pub liste: (AdminGroup, SuperAdminGroup),
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct DeletedResponse {
    pub message: bool,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        root_handler,
        health_handler,
        front_handler,
        add_material_handler,
        add_loan_handler,
        remove_material_handler,
        remove_loan_handler,
        signin_handler,
        login_handler,
        read_administrators_handler,
        delete_administrator_handler,
    ),
    components(schemas(
        MessageResponse,
        ErrorResponse,
        MaterialRequest,
        MaterialResponse,
        LoanRequest,
        LoanResponse,
        SignInRequest,
        SignInResponse,
        LoginRequest,
        LoginResponse,
        AdminGroup,
        SuperAdminGroup,
        AdministratorListResponse,
        AdministratorSummary,
        DeletedResponse,
    )),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_token)
        .ok_or(ApiError::InvalidToken)?;

    let claims = state.keys.validate_jwt(token).map_err(|e| {
        warn!(error = %e, "rejected token");
        ApiError::from(e)
    })?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Token of an `Authorization` value; the scheme name is case-insensitive.
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Runs each request inside a span tagged with a fresh request id.
async fn trace_requests(req: Request<axum::body::Body>, next: Next) -> Response {
    let span = info_span!(
        "request",
        id = %Uuid::new_v4(),
        method = %req.method(),
        path = %req.uri().path(),
    );
    async move {
        let started = Instant::now();
        let response = next.run(req).await;
        info!(
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request completed"
        );
        response
    }
    .instrument(span)
    .await
}

fn require_super_admin(claims: &Claims) -> Result<(), ApiError> {
    if claims.role == Role::SuperAdmin {
        Ok(())
    } else {
        warn!(admin_id = claims.id, "super admin route refused");
        Err(ApiError::Forbidden)
    }
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
}

/// Create Axum router with the inventory and administrator endpoints
pub fn create_router(storage: Storage, keys: TokenKeys, bcrypt_cost: u32) -> Router {
    let state = Arc::new(AppState {
        storage,
        keys,
        bcrypt_cost,
    });

    let auth_routes = Router::new()
        .route("/ajoutermateriaux", post(add_material_handler))
        .route("/ajouteremprunts", post(add_loan_handler))
        .route("/supprimermateriaux/:atelier/:materiaux", delete(remove_material_handler))
        .route("/supprimeremprunts/:id", delete(remove_loan_handler))
        .route("/signin", post(signin_handler))
        .route("/administrator/read", get(read_administrators_handler))
        .route("/administrator/delete/:id", delete(delete_administrator_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/front", get(front_handler))
        .route("/login", post(login_handler))
        .merge(auth_routes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(state)
        .layer(middleware::from_fn(trace_requests))
}

#[utoipa::path(get, path = "/", responses((status = 200, body = MessageResponse)))]
async fn root_handler() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "Bonjour depuis le backend ! ".to_string(),
    })
}

/// Health check handler
#[utoipa::path(get, path = "/health", responses((status = 200, body = MessageResponse)))]
async fn health_handler(State(state): State<Arc<AppState>>) -> Result<Json<MessageResponse>, ApiError> {
    state.storage.load_inventory()?;
    Ok(Json(MessageResponse {
        message: "ok".to_string(),
    }))
}

/// The whole inventory document: one material list per workshop plus `emprunts`.
#[utoipa::path(get, path = "/front", responses((status = 200, description = "Inventory document")))]
async fn front_handler(State(state): State<Arc<AppState>>) -> Result<Json<InventoryDocument>, ApiError> {
    Ok(Json(state.storage.load_inventory()?))
}

#[utoipa::path(
    post,
    path = "/ajoutermateriaux",
    request_body = MaterialRequest,
    responses(
        (status = 200, body = MaterialResponse),
        (status = 401, body = ErrorResponse),
        (status = 422, body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
async fn add_material_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    ApiJson(payload): ApiJson<MaterialRequest>,
) -> Result<Json<MaterialResponse>, ApiError> {
    let nombre = parse_count(payload.nombre)?;
    let outcome = state.storage.update_inventory(|doc| {
        doc.add_material(&payload.atelier, &payload.materiaux, nombre)
            .map_err(ApiError::from)
    })?;

    info!(
        admin_id = claims.id,
        atelier = %payload.atelier,
        materiaux = %payload.materiaux.trim(),
        nombre,
        ?outcome,
        "material added"
    );
    Ok(Json(MaterialResponse {
        message: outcome.message().to_string(),
        atelier: payload.atelier,
        materiaux: payload.materiaux,
        nombre,
    }))
}

#[utoipa::path(
    post,
    path = "/ajouteremprunts",
    request_body = LoanRequest,
    responses(
        (status = 200, body = LoanResponse),
        (status = 401, body = ErrorResponse),
        (status = 422, body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
async fn add_loan_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    ApiJson(payload): ApiJson<LoanRequest>,
) -> Result<Json<LoanResponse>, ApiError> {
    if payload.nom.trim().is_empty() {
        return Err(ApiError::Validation("le champ `nom` ne peut pas être vide".to_string()));
    }

    let loan = Loan {
        id: state.storage.next_loan_id()?,
        nom: payload.nom.trim().to_string(),
        numero: payload.numero,
        materiaux: payload.materiaux,
    };
    let id = loan.id;
    state.storage.update_inventory(|doc| {
        doc.add_loan(loan.clone());
        Ok::<_, ApiError>(())
    })?;

    info!(admin_id = claims.id, loan_id = id, "loan added");
    Ok(Json(LoanResponse {
        message: "Emprunt ajouté !".to_string(),
        id,
    }))
}

#[utoipa::path(
    delete,
    path = "/supprimermateriaux/{atelier}/{materiaux}",
    params(
        ("atelier" = String, Path, description = "Workshop name"),
        ("materiaux" = String, Path, description = "Material name, matched trimmed and case-insensitively"),
    ),
    responses(
        (status = 200, body = MessageResponse),
        (status = 401, body = ErrorResponse),
        (status = 404, body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
async fn remove_material_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    ApiPath((atelier, materiaux)): ApiPath<(String, String)>,
) -> Result<Json<MessageResponse>, ApiError> {
    let found = state
        .storage
        .update_inventory(|doc| Ok::<_, ApiError>(doc.remove_material(&atelier, &materiaux)))?;
    if !found {
        return Err(ApiError::NotFound("Aucun matériau trouvé".to_string()));
    }

    info!(admin_id = claims.id, %atelier, %materiaux, "material removed or decremented");
    Ok(Json(MessageResponse {
        message: "Matériau supprimé ou décrémenté".to_string(),
    }))
}

#[utoipa::path(
    delete,
    path = "/supprimeremprunts/{id}",
    params(("id" = u64, Path, description = "Loan id")),
    responses(
        (status = 200, body = MessageResponse),
        (status = 401, body = ErrorResponse),
        (status = 404, body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
async fn remove_loan_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<u64>,
) -> Result<Json<MessageResponse>, ApiError> {
    let found = state
        .storage
        .update_inventory(|doc| Ok::<_, ApiError>(doc.remove_loan(id)))?;
    if !found {
        return Err(ApiError::NotFound("Aucun emprunt trouvé".to_string()));
    }

    info!(admin_id = claims.id, loan_id = id, "loan removed");
    Ok(Json(MessageResponse {
        message: "Suppression effectué !".to_string(),
    }))
}

#[utoipa::path(
    post,
    path = "/signin",
    request_body = SignInRequest,
    responses(
        (status = 200, body = SignInResponse),
        (status = 403, body = ErrorResponse),
        (status = 409, body = ErrorResponse),
        (status = 422, body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
async fn signin_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    ApiJson(payload): ApiJson<SignInRequest>,
) -> Result<Json<SignInResponse>, ApiError> {
    require_super_admin(&claims)?;

    let email = payload.email.trim().to_string();
    if !is_valid_email(&email) {
        return Err(ApiError::Validation(format!("adresse email invalide: {email}")));
    }
    if payload.name.trim().is_empty() || payload.password.is_empty() {
        return Err(ApiError::Validation("le nom et le mot de passe sont obligatoires".to_string()));
    }
    // Cheap early exit; the store still enforces uniqueness on insert.
    if state.storage.email_exists(&email)? {
        return Err(ApiError::EmailTaken);
    }

    let cost = state.bcrypt_cost;
    let password = payload.password;
    let hashed_password = tokio::task::spawn_blocking(move || hash_password(&password, cost))
        .await?
        .map_err(AuthError::from)?;

    let admin = state.storage.create_administrator(NewAdministrator {
        email,
        name: payload.name.trim().to_string(),
        hashed_password,
        is_super_admin: payload.is_super_admin,
    })?;

    info!(
        created_by = claims.id,
        admin_id = admin.id,
        super_admin = admin.is_super_admin,
        "administrator created"
    );
    Ok(Json(SignInResponse {
        message: "Admintrateur ajouté !".to_string(),
        id: admin.id,
    }))
}

#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, body = LoginResponse),
        (status = 401, body = ErrorResponse),
    )
)]
async fn login_handler(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let Some(admin) = state.storage.find_administrator_by_email(&payload.email)? else {
        info!("login refused: unknown email");
        return Err(ApiError::InvalidCredentials);
    };

    let password = payload.password;
    let hashed = admin.hashed_password.clone();
    let valid = tokio::task::spawn_blocking(move || verify_password(&password, &hashed))
        .await?
        .map_err(AuthError::from)?;
    if !valid {
        info!(admin_id = admin.id, "login refused: wrong password");
        return Err(ApiError::InvalidCredentials);
    }

    let token = state.keys.create_jwt(&admin)?;
    info!(admin_id = admin.id, role = ?admin.role(), "login");
    Ok(Json(LoginResponse {
        message: "Connection réussi !".to_string(),
        token,
    }))
}

#[utoipa::path(
    get,
    path = "/administrator/read",
    responses(
        (status = 200, body = AdministratorListResponse),
        (status = 403, body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
async fn read_administrators_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<AdministratorListResponse>, ApiError> {
    require_super_admin(&claims)?;

    let (super_admin, admin): (Vec<_>, Vec<_>) = state
        .storage
        .list_administrators()?
        .into_iter()
        .partition(|a| a.is_super_admin);

    Ok(Json(AdministratorListResponse {
        liste: (
            AdminGroup {
                admin: admin.iter().map(AdministratorSummary::from).collect(),
            },
            SuperAdminGroup {
                super_admin: super_admin.iter().map(AdministratorSummary::from).collect(),
            },
        ),
    }))
}

#[utoipa::path(
    delete,
    path = "/administrator/delete/{id}",
    params(("id" = u64, Path, description = "Administrator id")),
    responses(
        (status = 200, body = DeletedResponse),
        (status = 403, body = ErrorResponse),
        (status = 404, body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
async fn delete_administrator_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<u64>,
) -> Result<Json<DeletedResponse>, ApiError> {
    require_super_admin(&claims)?;

    if !state.storage.delete_administrator(id)? {
        return Err(ApiError::NotFound("Aucun administrateur trouvé".to_string()));
    }
    info!(deleted_by = claims.id, admin_id = id, "administrator deleted");
    Ok(Json(DeletedResponse { message: true }))
}
