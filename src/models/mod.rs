use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// User account. A null `deleted_at` means the account is active;
/// soft-deleted accounts keep their row (and their edges) but are
/// invisible to search, listings and counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub username: String,
    pub name: String,
    pub avatar: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Profile is 1:1 with User, created empty at signup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    pub bio: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    pub birthdate: Option<NaiveDate>,
}

/// Post body. Deletion is logical: the row and its likes are retained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub author_id: String,
    pub content: String,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A user as seen by another user: no email, no secrets, plus the
/// viewer-relative follow flags. Computed per request, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPublic {
    pub id: String,
    pub username: String,
    pub name: String,
    pub avatar: Option<String>,
    pub is_following: bool,
    pub is_followed_by: bool,
    pub created_at: DateTime<Utc>,
}

/// Full profile view: UserPublic fields plus the profile and the
/// aggregate counts (only active counterpart accounts are counted).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDetail {
    pub id: String,
    pub username: String,
    pub name: String,
    pub avatar: Option<String>,
    pub profile: Profile,
    pub followers_count: i64,
    pub following_count: i64,
    pub is_following: bool,
    pub is_followed_by: bool,
    pub created_at: DateTime<Utc>,
}

/// A post annotated for a viewer: author card, like count, liked flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostView {
    pub id: String,
    pub content: String,
    pub author: UserPublic,
    pub likes_count: i64,
    pub is_liked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Request/Response types for the API

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub username: String,
    pub name: String,
    pub password: String,
    pub avatar: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}
