use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

use crate::models::*;
use crate::pagination::{PageMeta, PageRequest, Paginated};
use crate::search::{register_similarity, SIMILARITY_THRESHOLD};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Forbidden(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Unique/primary-key violations are the signal for the idempotent-insert
/// paths (follow, like) and for duplicate signups. Attempt the insert and
/// classify the failure, never check-then-insert.
fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Soft-delete filter fragments, composed into each query that must only
/// see active rows.
const ACTIVE_USER: &str = "u.deleted_at IS NULL";
const ACTIVE_POST: &str = "p.deleted_at IS NULL";

/// Thread-safe SQLite store
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path
    pub fn new(db_path: &str) -> StoreResult<Self> {
        let conn = Connection::open(db_path)?;
        register_similarity(&conn)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store for testing
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        register_similarity(&conn)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                username TEXT UNIQUE NOT NULL,
                name TEXT NOT NULL,
                avatar TEXT,
                password_hash TEXT NOT NULL,
                deleted_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS profiles (
                user_id TEXT PRIMARY KEY,
                bio TEXT,
                location TEXT,
                website TEXT,
                birthdate TEXT,
                FOREIGN KEY (user_id) REFERENCES users(id)
            );

            CREATE TABLE IF NOT EXISTS posts (
                id TEXT PRIMARY KEY,
                author_id TEXT NOT NULL,
                content TEXT NOT NULL,
                deleted_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (author_id) REFERENCES users(id)
            );

            CREATE TABLE IF NOT EXISTS follows (
                follower_id TEXT NOT NULL,
                following_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (follower_id, following_id),
                FOREIGN KEY (follower_id) REFERENCES users(id),
                FOREIGN KEY (following_id) REFERENCES users(id)
            );

            CREATE TABLE IF NOT EXISTS likes (
                user_id TEXT NOT NULL,
                post_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (user_id, post_id),
                FOREIGN KEY (user_id) REFERENCES users(id),
                FOREIGN KEY (post_id) REFERENCES posts(id)
            );

            CREATE INDEX IF NOT EXISTS idx_users_deleted_at ON users(deleted_at);
            CREATE INDEX IF NOT EXISTS idx_posts_author_created ON posts(author_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_follows_following_created ON follows(following_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_follows_follower_created ON follows(follower_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_likes_post_id ON likes(post_id);
            "#,
        )?;
        Ok(())
    }

    // ==================== User Operations ====================

    /// Insert the user and its empty profile in one transaction. A unique
    /// violation (email or username taken) is a caller error, not a crash.
    pub fn create_user(&self, user: &mut User) -> StoreResult<()> {
        let mut conn = self.conn.lock().unwrap();
        user.id = Uuid::new_v4().to_string();
        let now = Utc::now();
        user.created_at = now;
        user.updated_at = now;

        let tx = conn.transaction()?;
        let inserted = tx.execute(
            r#"INSERT INTO users (id, email, username, name, avatar, password_hash, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
            params![
                &user.id,
                &user.email,
                &user.username,
                &user.name,
                &user.avatar,
                &user.password_hash,
                user.created_at.to_rfc3339(),
                user.updated_at.to_rfc3339(),
            ],
        );
        if let Err(e) = inserted {
            if is_unique_violation(&e) {
                return Err(StoreError::BadRequest(
                    "A user with this email or username already exists".to_string(),
                ));
            }
            return Err(StoreError::Database(e));
        }
        tx.execute(
            "INSERT INTO profiles (user_id) VALUES (?1)",
            params![&user.id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Fetch by id regardless of soft-delete state (login/session paths).
    pub fn get_user(&self, id: &str) -> StoreResult<User> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM users WHERE id = ?1",
            params![id],
            row_to_user,
        )
        .map_err(not_found("User not found"))
    }

    pub fn get_user_by_email(&self, email: &str) -> StoreResult<User> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM users WHERE email = ?1",
            params![email],
            row_to_user,
        )
        .map_err(not_found("User not found"))
    }

    /// Resolve an active user by username. A missing row and a soft-deleted
    /// row are both NotFound, with distinct messages.
    pub fn get_active_user_by_username(&self, username: &str) -> StoreResult<User> {
        let conn = self.conn.lock().unwrap();
        let user = conn
            .query_row(
                "SELECT * FROM users WHERE username = ?1",
                params![username],
                row_to_user,
            )
            .map_err(not_found("User not found"))?;
        if user.is_deleted() {
            return Err(StoreError::NotFound(
                "This account has been deleted".to_string(),
            ));
        }
        Ok(user)
    }

    /// Soft-delete the viewer's own account. Edges and posts are retained;
    /// the account simply stops appearing in search, listings and counts.
    pub fn delete_user(&self, viewer_id: &str, username: &str) -> StoreResult<User> {
        let user = self.get_active_user_by_username(username)?;
        if user.id != viewer_id {
            return Err(StoreError::Forbidden(
                "You can only delete your own account".to_string(),
            ));
        }

        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE users SET deleted_at = ?1, updated_at = ?1 WHERE id = ?2",
            params![&now, &user.id],
        )?;
        drop(conn);

        self.get_user(&user.id)
    }

    fn get_profile(&self, user_id: &str) -> StoreResult<Profile> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT bio, location, website, birthdate FROM profiles WHERE user_id = ?1",
            params![user_id],
            |row| {
                let birthdate: Option<String> = row.get("birthdate")?;
                Ok(Profile {
                    bio: row.get("bio")?,
                    location: row.get("location")?,
                    website: row.get("website")?,
                    birthdate: birthdate
                        .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
                })
            },
        )
        .map_err(not_found("Profile not found"))
    }

    // ==================== Relationship Graph ====================

    /// Full detail view: profile, active-only follower/following counts and
    /// the viewer-relative follow flags, all computed against the same
    /// active-user predicate the listings use.
    pub fn user_detail(&self, viewer_id: &str, username: &str) -> StoreResult<UserDetail> {
        let user = self.get_active_user_by_username(username)?;
        let profile = self.get_profile(&user.id)?;

        let conn = self.conn.lock().unwrap();
        let (followers_count, following_count, is_following, is_followed_by) = conn.query_row(
            &format!(
                r#"SELECT
                    (SELECT COUNT(*) FROM follows f JOIN users u ON u.id = f.follower_id
                     WHERE f.following_id = ?1 AND {ACTIVE_USER}) AS followers_count,
                    (SELECT COUNT(*) FROM follows f JOIN users u ON u.id = f.following_id
                     WHERE f.follower_id = ?1 AND {ACTIVE_USER}) AS following_count,
                    EXISTS(SELECT 1 FROM follows WHERE follower_id = ?2 AND following_id = ?1) AS is_following,
                    EXISTS(SELECT 1 FROM follows WHERE follower_id = ?1 AND following_id = ?2) AS is_followed_by"#
            ),
            params![&user.id, viewer_id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, bool>(2)?,
                    row.get::<_, bool>(3)?,
                ))
            },
        )?;

        Ok(UserDetail {
            id: user.id,
            username: user.username,
            name: user.name,
            avatar: user.avatar,
            profile,
            followers_count,
            following_count,
            is_following,
            is_followed_by,
            created_at: user.created_at,
        })
    }

    /// Follow a user. Idempotent: a duplicate edge insert loses the race at
    /// the primary key and is treated as success.
    pub fn follow_user(&self, viewer_id: &str, username: &str) -> StoreResult<UserDetail> {
        let target = self.get_active_user_by_username(username)?;
        if target.id == viewer_id {
            return Err(StoreError::BadRequest(
                "You cannot follow yourself".to_string(),
            ));
        }

        let conn = self.conn.lock().unwrap();
        let inserted = conn.execute(
            "INSERT INTO follows (follower_id, following_id, created_at) VALUES (?1, ?2, ?3)",
            params![viewer_id, &target.id, Utc::now().to_rfc3339()],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                log::debug!("duplicate follow {} -> {}", viewer_id, target.id);
            }
            Err(e) => return Err(StoreError::Database(e)),
        }
        drop(conn);

        self.user_detail(viewer_id, username)
    }

    /// Unfollow is strict: removing an edge that does not exist means the
    /// caller's view of the graph is stale, so it surfaces as NotFound.
    pub fn unfollow_user(&self, viewer_id: &str, username: &str) -> StoreResult<UserDetail> {
        let target = self.get_active_user_by_username(username)?;

        let conn = self.conn.lock().unwrap();
        let removed = conn.execute(
            "DELETE FROM follows WHERE follower_id = ?1 AND following_id = ?2",
            params![viewer_id, &target.id],
        )?;
        if removed == 0 {
            return Err(StoreError::NotFound(
                "You are not following this user".to_string(),
            ));
        }
        drop(conn);

        self.user_detail(viewer_id, username)
    }

    pub fn list_followers(
        &self,
        viewer_id: &str,
        username: &str,
        page: &PageRequest,
    ) -> StoreResult<Paginated<UserPublic>> {
        let target = self.get_active_user_by_username(username)?;
        self.list_across_follows(viewer_id, &target.id, FollowDirection::Followers, page)
    }

    pub fn list_following(
        &self,
        viewer_id: &str,
        username: &str,
        page: &PageRequest,
    ) -> StoreResult<Paginated<UserPublic>> {
        let target = self.get_active_user_by_username(username)?;
        self.list_across_follows(viewer_id, &target.id, FollowDirection::Following, page)
    }

    /// Active users joined across the follow edge table, newest edge first,
    /// username as the tie-break, follow-flag annotated for the viewer.
    fn list_across_follows(
        &self,
        viewer_id: &str,
        target_id: &str,
        direction: FollowDirection,
        page: &PageRequest,
    ) -> StoreResult<Paginated<UserPublic>> {
        page.validate().map_err(StoreError::BadRequest)?;

        // Which side of the edge we join on, and which side we filter by.
        let (join_col, where_col) = match direction {
            FollowDirection::Followers => ("follower_id", "following_id"),
            FollowDirection::Following => ("following_id", "follower_id"),
        };

        let conn = self.conn.lock().unwrap();
        let total_count: i64 = conn.query_row(
            &format!(
                r#"SELECT COUNT(*) FROM follows f JOIN users u ON u.id = f.{join_col}
                   WHERE f.{where_col} = ?1 AND {ACTIVE_USER}"#
            ),
            params![target_id],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            r#"SELECT u.id, u.username, u.name, u.avatar, u.created_at,
                      EXISTS(SELECT 1 FROM follows WHERE follower_id = ?2 AND following_id = u.id) AS is_following,
                      EXISTS(SELECT 1 FROM follows WHERE follower_id = u.id AND following_id = ?2) AS is_followed_by
               FROM follows f JOIN users u ON u.id = f.{join_col}
               WHERE f.{where_col} = ?1 AND {ACTIVE_USER}
               ORDER BY f.created_at DESC, u.username ASC
               LIMIT ?3 OFFSET ?4"#
        ))?;
        let users = stmt
            .query_map(
                params![target_id, viewer_id, page.per_page, page.offset()],
                row_to_user_public,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        let meta = PageMeta::new(page, total_count, users.len());
        Ok(Paginated::new(users, meta))
    }

    // ==================== User Search ====================

    /// Ranked user search. One CASE expression scores the tiers; the WHERE
    /// clause repeats the same predicates, so ranking and inclusion can
    /// never disagree. Exact and prefix hits always outrank fuzzy hits.
    pub fn search_users(
        &self,
        viewer_id: &str,
        query: &str,
        page: &PageRequest,
    ) -> StoreResult<Paginated<UserPublic>> {
        page.validate().map_err(StoreError::BadRequest)?;
        let term = query.trim();
        if term.is_empty() {
            return Err(StoreError::BadRequest(
                "Search query is required".to_string(),
            ));
        }
        if term.chars().count() > 255 {
            return Err(StoreError::BadRequest(
                "Search query is too long".to_string(),
            ));
        }

        let matches = format!(
            r#"{ACTIVE_USER} AND (
                lower(u.username) = lower(?1)
                OR lower(u.name) = lower(?1)
                OR lower(u.username) LIKE lower(?1) || '%'
                OR lower(u.name) LIKE lower(?1) || '%'
                OR similarity(u.username, ?1) > {SIMILARITY_THRESHOLD}
                OR similarity(u.name, ?1) > {SIMILARITY_THRESHOLD}
            )"#
        );

        let conn = self.conn.lock().unwrap();
        let total_count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM users u WHERE {matches}"),
            params![term],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            r#"SELECT u.id, u.username, u.name, u.avatar, u.created_at,
                      EXISTS(SELECT 1 FROM follows WHERE follower_id = ?2 AND following_id = u.id) AS is_following,
                      EXISTS(SELECT 1 FROM follows WHERE follower_id = u.id AND following_id = ?2) AS is_followed_by
               FROM users u
               WHERE {matches}
               ORDER BY
                   CASE
                       WHEN lower(u.username) = lower(?1) THEN 100.0
                       WHEN lower(u.name) = lower(?1) THEN 95.0
                       WHEN lower(u.username) LIKE lower(?1) || '%' THEN 80.0
                       WHEN lower(u.name) LIKE lower(?1) || '%' THEN 70.0
                       ELSE max(similarity(u.username, ?1), similarity(u.name, ?1)) * 40.0
                   END DESC,
                   u.username ASC
               LIMIT ?3 OFFSET ?4"#
        ))?;
        let users = stmt
            .query_map(
                params![term, viewer_id, page.per_page, page.offset()],
                row_to_user_public,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        let meta = PageMeta::new(page, total_count, users.len());
        Ok(Paginated::new(users, meta))
    }

    // ==================== Post Operations ====================

    pub fn create_post(&self, author_id: &str, content: &str) -> StoreResult<PostView> {
        let len = content.chars().count();
        if len == 0 || len > 1024 {
            return Err(StoreError::BadRequest(
                "Post content must be between 1 and 1024 characters".to_string(),
            ));
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT INTO posts (id, author_id, content, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?4)"#,
            params![&id, author_id, content, &now],
        )?;
        drop(conn);

        self.post_view(author_id, &id)
    }

    fn get_active_post(&self, id: &str) -> StoreResult<Post> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT * FROM posts p WHERE p.id = ?1 AND {ACTIVE_POST}"),
            params![id],
            row_to_post,
        )
        .map_err(not_found("Post not found"))
    }

    /// Soft-delete a post. Only the author may delete it; the row and its
    /// like edges are retained for history.
    pub fn delete_post(&self, viewer_id: &str, post_id: &str) -> StoreResult<PostView> {
        let post = self.get_active_post(post_id)?;
        if post.author_id != viewer_id {
            return Err(StoreError::Forbidden(
                "You can only delete your own posts".to_string(),
            ));
        }

        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE posts SET deleted_at = ?1, updated_at = ?1 WHERE id = ?2",
            params![&now, post_id],
        )?;
        drop(conn);

        self.post_view(viewer_id, post_id)
    }

    /// Like a post. Same idempotence contract as follow: attempt the edge
    /// insert, swallow the duplicate-key failure.
    pub fn like_post(&self, viewer_id: &str, post_id: &str) -> StoreResult<PostView> {
        let post = self.get_active_post(post_id)?;

        let conn = self.conn.lock().unwrap();
        let inserted = conn.execute(
            "INSERT INTO likes (user_id, post_id, created_at) VALUES (?1, ?2, ?3)",
            params![viewer_id, &post.id, Utc::now().to_rfc3339()],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                log::debug!("duplicate like {} -> {}", viewer_id, post.id);
            }
            Err(e) => return Err(StoreError::Database(e)),
        }
        drop(conn);

        self.post_view(viewer_id, post_id)
    }

    pub fn unlike_post(&self, viewer_id: &str, post_id: &str) -> StoreResult<PostView> {
        let post = self.get_active_post(post_id)?;

        let conn = self.conn.lock().unwrap();
        let removed = conn.execute(
            "DELETE FROM likes WHERE user_id = ?1 AND post_id = ?2",
            params![viewer_id, &post.id],
        )?;
        if removed == 0 {
            return Err(StoreError::NotFound(
                "You have not liked this post".to_string(),
            ));
        }
        drop(conn);

        self.post_view(viewer_id, post_id)
    }

    /// Single annotated post, regardless of soft-delete state. Used to echo
    /// a post back after a mutation, including right after its deletion.
    fn post_view(&self, viewer_id: &str, post_id: &str) -> StoreResult<PostView> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!(
                r#"{POST_VIEW_SELECT}
                   FROM posts p JOIN users a ON a.id = p.author_id
                   WHERE p.id = ?2"#
            ),
            params![viewer_id, post_id],
            row_to_post_view,
        )
        .map_err(not_found("Post not found"))
    }

    /// A user's active posts, newest first.
    pub fn list_user_posts(
        &self,
        viewer_id: &str,
        username: &str,
        page: &PageRequest,
    ) -> StoreResult<Paginated<PostView>> {
        page.validate().map_err(StoreError::BadRequest)?;
        let author = self.get_active_user_by_username(username)?;

        let conn = self.conn.lock().unwrap();
        let total_count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM posts p WHERE p.author_id = ?1 AND {ACTIVE_POST}"),
            params![&author.id],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            r#"{POST_VIEW_SELECT}
               FROM posts p JOIN users a ON a.id = p.author_id
               WHERE p.author_id = ?2 AND {ACTIVE_POST}
               ORDER BY p.created_at DESC
               LIMIT ?3 OFFSET ?4"#
        ))?;
        let posts = stmt
            .query_map(
                params![viewer_id, &author.id, page.per_page, page.offset()],
                row_to_post_view,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        let meta = PageMeta::new(page, total_count, posts.len());
        Ok(Paginated::new(posts, meta))
    }

    /// The viewer's feed: active posts by the viewer or by anyone the
    /// viewer follows, authors still active, newest first.
    pub fn feed(&self, viewer_id: &str, page: &PageRequest) -> StoreResult<Paginated<PostView>> {
        page.validate().map_err(StoreError::BadRequest)?;

        let feed_filter = format!(
            r#"{ACTIVE_POST} AND a.deleted_at IS NULL AND (
                p.author_id = ?1
                OR p.author_id IN (SELECT following_id FROM follows WHERE follower_id = ?1)
            )"#
        );

        let conn = self.conn.lock().unwrap();
        let total_count: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM posts p JOIN users a ON a.id = p.author_id WHERE {feed_filter}"
            ),
            params![viewer_id],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            r#"{POST_VIEW_SELECT}
               FROM posts p JOIN users a ON a.id = p.author_id
               WHERE {feed_filter}
               ORDER BY p.created_at DESC
               LIMIT ?2 OFFSET ?3"#
        ))?;
        let posts = stmt
            .query_map(
                params![viewer_id, page.per_page, page.offset()],
                row_to_post_view,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        let meta = PageMeta::new(page, total_count, posts.len());
        Ok(Paginated::new(posts, meta))
    }
}

enum FollowDirection {
    Followers,
    Following,
}

/// Annotated post projection. ?1 is always the viewer id. The like count
/// only counts likes from still-active accounts, matching how follower
/// counts ignore soft-deleted users.
const POST_VIEW_SELECT: &str = r#"SELECT p.id, p.content, p.created_at, p.updated_at,
       a.id AS author_id, a.username AS author_username, a.name AS author_name,
       a.avatar AS author_avatar, a.created_at AS author_created_at,
       EXISTS(SELECT 1 FROM follows WHERE follower_id = ?1 AND following_id = a.id) AS author_is_following,
       EXISTS(SELECT 1 FROM follows WHERE follower_id = a.id AND following_id = ?1) AS author_is_followed_by,
       (SELECT COUNT(*) FROM likes l JOIN users lu ON lu.id = l.user_id
        WHERE l.post_id = p.id AND lu.deleted_at IS NULL) AS likes_count,
       EXISTS(SELECT 1 FROM likes WHERE user_id = ?1 AND post_id = p.id) AS is_liked"#;

fn not_found(message: &str) -> impl FnOnce(rusqlite::Error) -> StoreError + '_ {
    move |e| match e {
        rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(message.to_string()),
        _ => StoreError::Database(e),
    }
}

fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    let deleted_at: Option<String> = row.get("deleted_at")?;
    Ok(User {
        id: row.get("id")?,
        email: row.get("email")?,
        username: row.get("username")?,
        name: row.get("name")?,
        avatar: row.get("avatar")?,
        password_hash: row.get("password_hash")?,
        deleted_at: deleted_at.map(parse_datetime).transpose()?,
        created_at: parse_datetime(row.get::<_, String>("created_at")?)?,
        updated_at: parse_datetime(row.get::<_, String>("updated_at")?)?,
    })
}

fn row_to_user_public(row: &rusqlite::Row) -> rusqlite::Result<UserPublic> {
    Ok(UserPublic {
        id: row.get("id")?,
        username: row.get("username")?,
        name: row.get("name")?,
        avatar: row.get("avatar")?,
        is_following: row.get("is_following")?,
        is_followed_by: row.get("is_followed_by")?,
        created_at: parse_datetime(row.get::<_, String>("created_at")?)?,
    })
}

fn row_to_post(row: &rusqlite::Row) -> rusqlite::Result<Post> {
    let deleted_at: Option<String> = row.get("deleted_at")?;
    Ok(Post {
        id: row.get("id")?,
        author_id: row.get("author_id")?,
        content: row.get("content")?,
        deleted_at: deleted_at.map(parse_datetime).transpose()?,
        created_at: parse_datetime(row.get::<_, String>("created_at")?)?,
        updated_at: parse_datetime(row.get::<_, String>("updated_at")?)?,
    })
}

fn row_to_post_view(row: &rusqlite::Row) -> rusqlite::Result<PostView> {
    Ok(PostView {
        id: row.get("id")?,
        content: row.get("content")?,
        author: UserPublic {
            id: row.get("author_id")?,
            username: row.get("author_username")?,
            name: row.get("author_name")?,
            avatar: row.get("author_avatar")?,
            is_following: row.get("author_is_following")?,
            is_followed_by: row.get("author_is_followed_by")?,
            created_at: parse_datetime(row.get::<_, String>("author_created_at")?)?,
        },
        likes_count: row.get("likes_count")?,
        is_liked: row.get("is_liked")?,
        created_at: parse_datetime(row.get::<_, String>("created_at")?)?,
        updated_at: parse_datetime(row.get::<_, String>("updated_at")?)?,
    })
}

/// A timestamp that fails to parse is a corrupt row; surface it instead of
/// substituting a value that would scramble ordering.
fn parse_datetime(s: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
}
