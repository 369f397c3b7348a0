use actix_web::{web, HttpResponse, Responder};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;

use crate::auth::{AuthService, AuthUser, TokenKind};
use crate::models::*;
use crate::pagination::{PageRequest, DEFAULT_PER_PAGE};
use crate::store::{Store, StoreError};

pub struct AppState {
    pub store: Arc<Store>,
    pub auth_service: Arc<AuthService>,
}

/// Domain errors carry their own HTTP status; anything unexpected from the
/// storage layer is a 500 with a generic message.
fn error_response(e: StoreError) -> HttpResponse {
    match e {
        StoreError::NotFound(msg) => HttpResponse::NotFound().json(ApiResponse::<()>::error(msg)),
        StoreError::BadRequest(msg) => {
            HttpResponse::BadRequest().json(ApiResponse::<()>::error(msg))
        }
        StoreError::Forbidden(msg) => {
            HttpResponse::Forbidden().json(ApiResponse::<()>::error(msg))
        }
        StoreError::Database(e) => {
            log::error!("database error: {}", e);
            HttpResponse::InternalServerError().json(ApiResponse::<()>::error("Internal server error"))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    page: Option<i64>,
    per_page: Option<i64>,
}

impl PageQuery {
    fn to_request(&self) -> PageRequest {
        PageRequest {
            page: self.page.unwrap_or(1),
            per_page: self.per_page.unwrap_or(DEFAULT_PER_PAGE),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    q: String,
    page: Option<i64>,
    per_page: Option<i64>,
}

// ==================== Health Check ====================

pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339()
    }))
}

// ==================== Auth Endpoints ====================

pub async fn signup(state: web::Data<AppState>, body: web::Json<SignupRequest>) -> impl Responder {
    for (field, value) in [
        ("email", &body.email),
        ("username", &body.username),
        ("name", &body.name),
        ("password", &body.password),
    ] {
        if value.is_empty() || value.chars().count() > 255 {
            return HttpResponse::BadRequest().json(ApiResponse::<()>::error(format!(
                "{} must be between 1 and 255 characters",
                field
            )));
        }
    }

    let password_hash = match state.auth_service.hash_password(&body.password) {
        Ok(hash) => hash,
        Err(_) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to hash password"))
        }
    };

    let mut user = User {
        id: String::new(),
        email: body.email.clone(),
        username: body.username.clone(),
        name: body.name.clone(),
        avatar: body.avatar.clone(),
        password_hash,
        deleted_at: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    if let Err(e) = state.store.create_user(&mut user) {
        return error_response(e);
    }

    let tokens = match state.auth_service.generate_token_pair(&user.id) {
        Ok(t) => t,
        Err(_) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to generate tokens"))
        }
    };

    HttpResponse::Created().json(ApiResponse::success(AuthResponse {
        user,
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
    }))
}

pub async fn login(state: web::Data<AppState>, body: web::Json<LoginRequest>) -> impl Responder {
    let user = match state.store.get_user_by_email(&body.email) {
        Ok(u) => u,
        Err(StoreError::NotFound(_)) => {
            return HttpResponse::Unauthorized()
                .json(ApiResponse::<()>::error("Invalid email or password"))
        }
        Err(e) => return error_response(e),
    };

    let valid = state
        .auth_service
        .verify_password(&body.password, &user.password_hash)
        .unwrap_or(false);

    if !valid || user.is_deleted() {
        return HttpResponse::Unauthorized()
            .json(ApiResponse::<()>::error("Invalid email or password"));
    }

    let tokens = match state.auth_service.generate_token_pair(&user.id) {
        Ok(t) => t,
        Err(_) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to generate tokens"))
        }
    };

    HttpResponse::Ok().json(ApiResponse::success(AuthResponse {
        user,
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
    }))
}

pub async fn refresh(state: web::Data<AppState>, body: web::Json<RefreshRequest>) -> impl Responder {
    let claims = match state
        .auth_service
        .validate_token(&body.refresh_token, TokenKind::Refresh)
    {
        Ok(c) => c,
        Err(_) => {
            return HttpResponse::Unauthorized()
                .json(ApiResponse::<()>::error("Invalid refresh token"))
        }
    };

    let user = match state.store.get_user(&claims.sub) {
        Ok(u) if !u.is_deleted() => u,
        _ => {
            return HttpResponse::Unauthorized()
                .json(ApiResponse::<()>::error("Invalid refresh token"))
        }
    };

    let tokens = match state.auth_service.generate_token_pair(&user.id) {
        Ok(t) => t,
        Err(_) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to generate tokens"))
        }
    };

    HttpResponse::Ok().json(ApiResponse::success(AuthResponse {
        user,
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
    }))
}

// ==================== User Endpoints ====================

pub async fn get_current_user(
    state: web::Data<AppState>,
    auth_user: web::ReqData<AuthUser>,
) -> impl Responder {
    match state.store.get_user(&auth_user.user_id) {
        Ok(user) => HttpResponse::Ok().json(ApiResponse::success(user)),
        Err(e) => error_response(e),
    }
}

pub async fn search_users(
    state: web::Data<AppState>,
    auth_user: web::ReqData<AuthUser>,
    query: web::Query<SearchQuery>,
) -> impl Responder {
    let page = PageRequest {
        page: query.page.unwrap_or(1),
        per_page: query.per_page.unwrap_or(DEFAULT_PER_PAGE),
    };
    match state.store.search_users(&auth_user.user_id, &query.q, &page) {
        Ok(result) => HttpResponse::Ok().json(ApiResponse::success(result)),
        Err(e) => error_response(e),
    }
}

pub async fn get_user_detail(
    state: web::Data<AppState>,
    auth_user: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> impl Responder {
    let username = path.into_inner();
    match state.store.user_detail(&auth_user.user_id, &username) {
        Ok(detail) => HttpResponse::Ok().json(ApiResponse::success(detail)),
        Err(e) => error_response(e),
    }
}

pub async fn delete_user(
    state: web::Data<AppState>,
    auth_user: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> impl Responder {
    let username = path.into_inner();
    match state.store.delete_user(&auth_user.user_id, &username) {
        Ok(user) => HttpResponse::Ok().json(ApiResponse::success(user)),
        Err(e) => error_response(e),
    }
}

pub async fn follow_user(
    state: web::Data<AppState>,
    auth_user: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> impl Responder {
    let username = path.into_inner();
    match state.store.follow_user(&auth_user.user_id, &username) {
        Ok(detail) => HttpResponse::Ok().json(ApiResponse::success(detail)),
        Err(e) => error_response(e),
    }
}

pub async fn unfollow_user(
    state: web::Data<AppState>,
    auth_user: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> impl Responder {
    let username = path.into_inner();
    match state.store.unfollow_user(&auth_user.user_id, &username) {
        Ok(detail) => HttpResponse::Ok().json(ApiResponse::success(detail)),
        Err(e) => error_response(e),
    }
}

pub async fn list_followers(
    state: web::Data<AppState>,
    auth_user: web::ReqData<AuthUser>,
    path: web::Path<String>,
    query: web::Query<PageQuery>,
) -> impl Responder {
    let username = path.into_inner();
    match state
        .store
        .list_followers(&auth_user.user_id, &username, &query.to_request())
    {
        Ok(result) => HttpResponse::Ok().json(ApiResponse::success(result)),
        Err(e) => error_response(e),
    }
}

pub async fn list_following(
    state: web::Data<AppState>,
    auth_user: web::ReqData<AuthUser>,
    path: web::Path<String>,
    query: web::Query<PageQuery>,
) -> impl Responder {
    let username = path.into_inner();
    match state
        .store
        .list_following(&auth_user.user_id, &username, &query.to_request())
    {
        Ok(result) => HttpResponse::Ok().json(ApiResponse::success(result)),
        Err(e) => error_response(e),
    }
}

// ==================== Post Endpoints ====================

pub async fn create_post(
    state: web::Data<AppState>,
    auth_user: web::ReqData<AuthUser>,
    body: web::Json<CreatePostRequest>,
) -> impl Responder {
    match state.store.create_post(&auth_user.user_id, &body.content) {
        Ok(post) => HttpResponse::Created().json(ApiResponse::success(post)),
        Err(e) => error_response(e),
    }
}

pub async fn delete_post(
    state: web::Data<AppState>,
    auth_user: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> impl Responder {
    let post_id = path.into_inner();
    match state.store.delete_post(&auth_user.user_id, &post_id) {
        Ok(post) => HttpResponse::Ok().json(ApiResponse::success(post)),
        Err(e) => error_response(e),
    }
}

pub async fn like_post(
    state: web::Data<AppState>,
    auth_user: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> impl Responder {
    let post_id = path.into_inner();
    match state.store.like_post(&auth_user.user_id, &post_id) {
        Ok(post) => HttpResponse::Ok().json(ApiResponse::success(post)),
        Err(e) => error_response(e),
    }
}

pub async fn unlike_post(
    state: web::Data<AppState>,
    auth_user: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> impl Responder {
    let post_id = path.into_inner();
    match state.store.unlike_post(&auth_user.user_id, &post_id) {
        Ok(post) => HttpResponse::Ok().json(ApiResponse::success(post)),
        Err(e) => error_response(e),
    }
}

pub async fn list_user_posts(
    state: web::Data<AppState>,
    auth_user: web::ReqData<AuthUser>,
    path: web::Path<String>,
    query: web::Query<PageQuery>,
) -> impl Responder {
    let username = path.into_inner();
    match state
        .store
        .list_user_posts(&auth_user.user_id, &username, &query.to_request())
    {
        Ok(result) => HttpResponse::Ok().json(ApiResponse::success(result)),
        Err(e) => error_response(e),
    }
}

pub async fn get_feed(
    state: web::Data<AppState>,
    auth_user: web::ReqData<AuthUser>,
    query: web::Query<PageQuery>,
) -> impl Responder {
    match state.store.feed(&auth_user.user_id, &query.to_request()) {
        Ok(result) => HttpResponse::Ok().json(ApiResponse::success(result)),
        Err(e) => error_response(e),
    }
}

// ==================== Route Configuration ====================

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        // Health check
        .route("/health", web::get().to(health))
        // Auth routes (no auth required)
        .route("/api/auth/signup", web::post().to(signup))
        .route("/api/auth/login", web::post().to(login))
        .route("/api/auth/refresh", web::post().to(refresh))
        // Users (literal segments registered before the {username} capture)
        .route("/api/users/me", web::get().to(get_current_user))
        .route("/api/users/search", web::get().to(search_users))
        .route("/api/users/{username}", web::get().to(get_user_detail))
        .route("/api/users/{username}", web::delete().to(delete_user))
        .route("/api/users/{username}/follow", web::post().to(follow_user))
        .route("/api/users/{username}/follow", web::delete().to(unfollow_user))
        .route("/api/users/{username}/followers", web::get().to(list_followers))
        .route("/api/users/{username}/following", web::get().to(list_following))
        // Posts
        .route("/api/posts", web::post().to(create_post))
        .route("/api/posts/feed", web::get().to(get_feed))
        .route("/api/posts/user/{username}", web::get().to(list_user_posts))
        .route("/api/posts/{id}", web::delete().to(delete_post))
        .route("/api/posts/{id}/like", web::post().to(like_post))
        .route("/api/posts/{id}/like", web::delete().to(unlike_post));
}
