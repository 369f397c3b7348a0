use actix_web::body::EitherBody;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::error::ErrorUnauthorized;
use actix_web::http::header::{HeaderName, HeaderValue};
use actix_web::{Error, HttpMessage};
use chrono::{DateTime, Duration, Utc};
use futures_util::future::{ok, Ready};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// How close to expiry an access token may get before the middleware
/// silently mints a fresh pair.
pub const ROTATION_WINDOW_MINUTES: i64 = 15;

const ACCESS_TOKEN_HOURS: i64 = 1;
const REFRESH_TOKEN_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    pub exp: i64,    // expiration timestamp
    pub iat: i64,    // issued at
    pub kind: TokenKind,
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

pub struct AuthService {
    jwt_secret: String,
}

impl AuthService {
    pub fn new(jwt_secret: String) -> Self {
        Self { jwt_secret }
    }

    /// Hash a password using bcrypt
    pub fn hash_password(&self, password: &str) -> Result<String, bcrypt::BcryptError> {
        bcrypt::hash(password, 10)
    }

    /// Verify a password against a bcrypt hash
    pub fn verify_password(&self, password: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
        bcrypt::verify(password, hash)
    }

    /// Mint a fresh access + refresh pair for a user
    pub fn generate_token_pair(
        &self,
        user_id: &str,
    ) -> Result<TokenPair, jsonwebtoken::errors::Error> {
        Ok(TokenPair {
            access_token: self.generate_token(
                user_id,
                TokenKind::Access,
                Duration::hours(ACCESS_TOKEN_HOURS),
            )?,
            refresh_token: self.generate_token(
                user_id,
                TokenKind::Refresh,
                Duration::days(REFRESH_TOKEN_DAYS),
            )?,
        })
    }

    fn generate_token(
        &self,
        user_id: &str,
        kind: TokenKind,
        ttl: Duration,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
            kind,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
    }

    /// Validate a JWT and require the expected kind; a refresh token is
    /// never accepted where an access token is required, and vice versa.
    pub fn validate_token(
        &self,
        token: &str,
        kind: TokenKind,
    ) -> Result<Claims, jsonwebtoken::errors::Error> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::default(),
        )?;
        if token_data.claims.kind != kind {
            return Err(jsonwebtoken::errors::ErrorKind::InvalidToken.into());
        }
        Ok(token_data.claims)
    }
}

/// Token Lifecycle Policy: rotate once the access token is within the
/// rotation window of expiry. Pure; callers decide what rotation means.
pub fn should_rotate(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expires_at - now <= Duration::minutes(ROTATION_WINDOW_MINUTES)
}

/// Authenticated viewer identity, injected into request extensions by the
/// middleware. Handlers only ever see an already-resolved viewer id.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

fn extract_claims(req: &ServiceRequest, auth: &AuthService) -> Result<Claims, Error> {
    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ErrorUnauthorized("Missing Authorization header"))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ErrorUnauthorized("Invalid Authorization header format"))?;

    auth.validate_token(token, TokenKind::Access)
        .map_err(|_| ErrorUnauthorized("Invalid token"))
}

fn is_public(path: &str) -> bool {
    matches!(
        path,
        "/health" | "/api/auth/signup" | "/api/auth/login" | "/api/auth/refresh"
    )
}

/// Middleware that resolves the viewer from the bearer token and, on the
/// way out, rotates token pairs that are close to expiry. Rotation is
/// best-effort: any failure means "do not rotate", never a failed request.
pub struct RequireAuth {
    auth: Arc<AuthService>,
}

impl RequireAuth {
    pub fn new(auth: Arc<AuthService>) -> Self {
        Self { auth }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequireAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RequireAuthMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(RequireAuthMiddleware {
            service,
            auth: self.auth.clone(),
        })
    }
}

pub struct RequireAuthMiddleware<S> {
    service: S,
    auth: Arc<AuthService>,
}

impl<S, B> Service<ServiceRequest> for RequireAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if is_public(req.path()) {
            let fut = self.service.call(req);
            return Box::pin(async move { Ok(fut.await?.map_into_left_body()) });
        }

        let claims = match extract_claims(&req, &self.auth) {
            Ok(claims) => claims,
            Err(e) => {
                // Answer unauthenticated requests directly instead of
                // bubbling the error through the service chain.
                let (req, _payload) = req.into_parts();
                let res = e.error_response().map_into_right_body();
                return Box::pin(async move { Ok(ServiceResponse::new(req, res)) });
            }
        };

        req.extensions_mut().insert(AuthUser {
            user_id: claims.sub.clone(),
        });

        let auth = self.auth.clone();
        let fut = self.service.call(req);

        Box::pin(async move {
            let mut res = fut.await?.map_into_left_body();

            if let Some(expires_at) = DateTime::from_timestamp(claims.exp, 0) {
                if should_rotate(expires_at, Utc::now()) {
                    if let Ok(pair) = auth.generate_token_pair(&claims.sub) {
                        attach_token_headers(res.headers_mut(), &pair);
                    }
                }
            }

            Ok(res)
        })
    }
}

fn attach_token_headers(headers: &mut actix_web::http::header::HeaderMap, pair: &TokenPair) {
    if let (Ok(access), Ok(refresh)) = (
        HeaderValue::from_str(&pair.access_token),
        HeaderValue::from_str(&pair.refresh_token),
    ) {
        headers.insert(HeaderName::from_static("x-access-token"), access);
        headers.insert(HeaderName::from_static("x-refresh-token"), refresh);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_auth_service() -> AuthService {
        AuthService::new("test_secret".to_string())
    }

    #[test]
    fn test_password_hashing() {
        let auth = create_test_auth_service();
        let password = "my_secure_password";

        let hash = auth.hash_password(password).unwrap();
        assert!(auth.verify_password(password, &hash).unwrap());
        assert!(!auth.verify_password("wrong_password", &hash).unwrap());
    }

    #[test]
    fn test_token_pair_round_trip() {
        let auth = create_test_auth_service();
        let pair = auth.generate_token_pair("user_123").unwrap();

        let access = auth
            .validate_token(&pair.access_token, TokenKind::Access)
            .unwrap();
        assert_eq!(access.sub, "user_123");
        assert!(access.exp > Utc::now().timestamp());

        let refresh = auth
            .validate_token(&pair.refresh_token, TokenKind::Refresh)
            .unwrap();
        assert_eq!(refresh.sub, "user_123");
        assert!(refresh.exp > access.exp);
    }

    #[test]
    fn test_refresh_token_rejected_as_access_token() {
        let auth = create_test_auth_service();
        let pair = auth.generate_token_pair("user_123").unwrap();

        assert!(auth
            .validate_token(&pair.refresh_token, TokenKind::Access)
            .is_err());
        assert!(auth
            .validate_token(&pair.access_token, TokenKind::Refresh)
            .is_err());
    }

    #[test]
    fn test_rotation_window_boundary() {
        let now = Utc::now();
        assert!(should_rotate(now + Duration::minutes(10), now));
        assert!(!should_rotate(now + Duration::minutes(20), now));
        assert!(should_rotate(now + Duration::minutes(15), now));
        // Already expired still counts as inside the window.
        assert!(should_rotate(now - Duration::minutes(1), now));
    }
}
