use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};

use crate::domain::{
    repository::{StoreError, StoreResult, UserRepository},
    user::{Group, GroupId, NewUser, PasswordHash, User, UserChanges, UserId},
};

use super::sqlite;

const SELECT_USER: &str = "SELECT id, username, email, password, first_name, last_name, is_active, is_staff, \
                           is_superuser, date_joined, last_login FROM users";

const SCHEMA: [&str; 4] = [
    "CREATE TABLE IF NOT EXISTS auth_groups (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL UNIQUE,
        password TEXT NOT NULL,
        first_name TEXT NOT NULL DEFAULT '',
        last_name TEXT NOT NULL DEFAULT '',
        is_active INTEGER NOT NULL DEFAULT 1,
        is_staff INTEGER NOT NULL DEFAULT 0,
        is_superuser INTEGER NOT NULL DEFAULT 0,
        date_joined TEXT NOT NULL,
        last_login TEXT
    )",
    "CREATE TABLE IF NOT EXISTS user_groups (
        user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        group_id INTEGER NOT NULL REFERENCES auth_groups(id) ON DELETE CASCADE,
        PRIMARY KEY (user_id, group_id)
    )",
    "CREATE TABLE IF NOT EXISTS auth_tokens (
        key TEXT PRIMARY KEY,
        user_id TEXT NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
        created TEXT NOT NULL
    )",
];

#[derive(Clone)]
pub struct SqliteUserRepository {
    pool: SqlitePool,
}

impl SqliteUserRepository {
    pub fn new(pool: SqlitePool) -> Self { Self { pool } }

    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        Ok(Self::new(sqlite::connect(database_url).await?))
    }
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn init(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn create(&self, input: NewUser, password: PasswordHash, token: String) -> StoreResult<User> {
        let mut tx = self.pool.begin().await?;

        let missing = missing_groups(&mut tx, &input.groups).await?;
        if !missing.is_empty() {
            return Err(StoreError::MissingGroups(missing));
        }

        let user = User {
            id: UserId::default(),
            username: input.username,
            email: input.email,
            password,
            first_name: input.first_name,
            last_name: input.last_name,
            is_active: input.is_active,
            is_staff: input.is_staff,
            is_superuser: input.is_superuser,
            groups: input.groups,
            date_joined: Utc::now(),
            last_login: None,
        };
        sqlx::query(
            "INSERT INTO users (id, username, email, password, first_name, last_name, is_active, is_staff,
                                is_superuser, date_joined, last_login)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )
        .bind(user.id.to_string())
        .bind(&user.username)
        .bind(&user.email)
        .bind(user.password.as_str())
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.is_active)
        .bind(user.is_staff)
        .bind(user.is_superuser)
        .bind(user.date_joined)
        .bind(user.last_login)
        .execute(&mut *tx)
        .await?;

        replace_groups(&mut tx, user.id, &user.groups).await?;

        sqlx::query("INSERT INTO auth_tokens (key, user_id, created) VALUES (?1, ?2, ?3)")
            .bind(&token)
            .bind(user.id.to_string())
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(user)
    }

    async fn get(&self, id: UserId) -> StoreResult<Option<User>> {
        let mut conn = self.pool.acquire().await?;
        fetch_user(&mut conn, id).await
    }

    async fn list(&self) -> StoreResult<Vec<User>> {
        let rows = sqlx::query(&format!("{SELECT_USER} ORDER BY date_joined, id"))
            .fetch_all(&self.pool)
            .await?;
        let memberships: Vec<(String, GroupId)> =
            sqlx::query_as("SELECT user_id, group_id FROM user_groups ORDER BY group_id")
                .fetch_all(&self.pool)
                .await?;

        let mut groups_by_user: HashMap<String, Vec<GroupId>> = HashMap::new();
        for (user_id, group_id) in memberships {
            groups_by_user.entry(user_id).or_default().push(group_id);
        }

        rows.iter()
            .map(|row| {
                let id: String = row.try_get("id")?;
                row_to_user(row, groups_by_user.remove(&id).unwrap_or_default())
            })
            .collect()
    }

    async fn email_exists(&self, email: &str) -> StoreResult<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM users WHERE email = ?1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    async fn update(&self, id: UserId, changes: UserChanges, password: Option<PasswordHash>) -> StoreResult<Option<User>> {
        let mut tx = self.pool.begin().await?;
        let Some(mut user) = fetch_user(&mut tx, id).await? else { return Ok(None) };

        if let Some(groups) = &changes.groups {
            let missing = missing_groups(&mut tx, groups).await?;
            if !missing.is_empty() {
                return Err(StoreError::MissingGroups(missing));
            }
        }
        let replace_memberships = changes.groups.is_some();

        changes.apply(&mut user);
        if let Some(hash) = password {
            user.password = hash;
        }

        sqlx::query(
            "UPDATE users SET username = ?2, email = ?3, password = ?4, first_name = ?5, last_name = ?6,
                              is_active = ?7, is_staff = ?8, is_superuser = ?9
             WHERE id = ?1",
        )
        .bind(user.id.to_string())
        .bind(&user.username)
        .bind(&user.email)
        .bind(user.password.as_str())
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.is_active)
        .bind(user.is_staff)
        .bind(user.is_superuser)
        .execute(&mut *tx)
        .await?;

        if replace_memberships {
            replace_groups(&mut tx, user.id, &user.groups).await?;
        }

        tx.commit().await?;
        Ok(Some(user))
    }

    async fn delete(&self, id: UserId) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM user_groups WHERE user_id = ?1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM auth_tokens WHERE user_id = ?1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM users WHERE id = ?1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_by_token(&self, key: &str) -> StoreResult<Option<User>> {
        let mut conn = self.pool.acquire().await?;
        let user_id: Option<String> = sqlx::query_scalar("SELECT user_id FROM auth_tokens WHERE key = ?1")
            .bind(key)
            .fetch_optional(&mut *conn)
            .await?;
        let Some(user_id) = user_id else { return Ok(None) };
        let id = parse_user_id(&user_id)?;
        fetch_user(&mut conn, id).await
    }

    async fn token_for(&self, id: UserId) -> StoreResult<Option<String>> {
        let key = sqlx::query_scalar("SELECT key FROM auth_tokens WHERE user_id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(key)
    }

    async fn ensure_group(&self, name: &str) -> StoreResult<Group> {
        sqlx::query("INSERT INTO auth_groups (name) VALUES (?1) ON CONFLICT(name) DO NOTHING")
            .bind(name)
            .execute(&self.pool)
            .await?;
        let (id, name): (GroupId, String) = sqlx::query_as("SELECT id, name FROM auth_groups WHERE name = ?1")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok(Group { id, name })
    }
}

async fn fetch_user(conn: &mut SqliteConnection, id: UserId) -> StoreResult<Option<User>> {
    let row = sqlx::query(&format!("{SELECT_USER} WHERE id = ?1"))
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;
    let Some(row) = row else { return Ok(None) };
    let groups: Vec<GroupId> = sqlx::query_scalar("SELECT group_id FROM user_groups WHERE user_id = ?1 ORDER BY group_id")
        .bind(id.to_string())
        .fetch_all(&mut *conn)
        .await?;
    row_to_user(&row, groups).map(Some)
}

/// Ids from `ids` with no matching group, checked with a single query.
async fn missing_groups(conn: &mut SqliteConnection, ids: &[GroupId]) -> StoreResult<Vec<GroupId>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut query = QueryBuilder::<Sqlite>::new("SELECT id FROM auth_groups WHERE id IN (");
    let mut separated = query.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");
    let found: Vec<GroupId> = query.build_query_scalar().fetch_all(&mut *conn).await?;
    Ok(ids.iter().copied().filter(|id| !found.contains(id)).collect())
}

async fn replace_groups(conn: &mut SqliteConnection, id: UserId, groups: &[GroupId]) -> StoreResult<()> {
    sqlx::query("DELETE FROM user_groups WHERE user_id = ?1")
        .bind(id.to_string())
        .execute(&mut *conn)
        .await?;
    for group_id in groups {
        sqlx::query("INSERT INTO user_groups (user_id, group_id) VALUES (?1, ?2)")
            .bind(id.to_string())
            .bind(*group_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

fn parse_user_id(raw: &str) -> StoreResult<UserId> {
    raw.parse().map_err(|e| StoreError::Corrupt(format!("user id {raw:?}: {e}")))
}

fn row_to_user(row: &SqliteRow, groups: Vec<GroupId>) -> StoreResult<User> {
    let id: String = row.try_get("id")?;
    Ok(User {
        id: parse_user_id(&id)?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password: PasswordHash(row.try_get("password")?),
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        is_active: row.try_get("is_active")?,
        is_staff: row.try_get("is_staff")?,
        is_superuser: row.try_get("is_superuser")?,
        groups,
        date_joined: row.try_get("date_joined")?,
        last_login: row.try_get("last_login")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn repo() -> SqliteUserRepository {
        let repo = SqliteUserRepository::connect("sqlite::memory:").await.unwrap();
        repo.init().await.unwrap();
        repo
    }

    fn new_user(name: &str, groups: Vec<GroupId>) -> NewUser {
        NewUser {
            username: name.into(),
            email: format!("{name}@example.com"),
            first_name: String::new(),
            last_name: String::new(),
            is_active: true,
            is_staff: false,
            is_superuser: false,
            groups,
        }
    }

    fn hash() -> PasswordHash { PasswordHash("$argon2id$stub".into()) }

    #[tokio::test]
    async fn token_collision_rolls_back_the_user() {
        let repo = repo().await;
        repo.create(new_user("ada", vec![]), hash(), "same".into()).await.unwrap();
        let err = repo.create(new_user("bob", vec![]), hash(), "same".into()).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(ref column) if column == "key"), "{err:?}");
        let users = repo.list().await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].username, "ada");
    }

    #[tokio::test]
    async fn create_with_unknown_group_writes_nothing() {
        let repo = repo().await;
        let staff = repo.ensure_group("staff").await.unwrap();
        let err = repo.create(new_user("ada", vec![staff.id, staff.id + 100]), hash(), "k1".into()).await.unwrap_err();
        assert!(matches!(err, StoreError::MissingGroups(ref ids) if ids == &vec![staff.id + 100]));
        assert!(repo.list().await.unwrap().is_empty());
        assert!(repo.find_by_token("k1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn token_resolves_to_its_user() {
        let repo = repo().await;
        let user = repo.create(new_user("ada", vec![]), hash(), "k1".into()).await.unwrap();
        let found = repo.find_by_token("k1").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert_eq!(repo.token_for(user.id).await.unwrap().as_deref(), Some("k1"));
    }

    #[tokio::test]
    async fn update_replaces_memberships_atomically() {
        let repo = repo().await;
        let a = repo.ensure_group("a").await.unwrap();
        let b = repo.ensure_group("b").await.unwrap();
        let user = repo.create(new_user("ada", vec![a.id]), hash(), "k1".into()).await.unwrap();

        let bad = UserChanges { groups: Some(vec![b.id, 999]), first_name: Some("Ada".into()), ..Default::default() };
        assert!(matches!(repo.update(user.id, bad, None).await, Err(StoreError::MissingGroups(_))));
        let unchanged = repo.get(user.id).await.unwrap().unwrap();
        assert_eq!(unchanged.groups, vec![a.id]);
        assert_eq!(unchanged.first_name, "");

        let good = UserChanges { groups: Some(vec![b.id]), ..Default::default() };
        let updated = repo.update(user.id, good, None).await.unwrap().unwrap();
        assert_eq!(updated.groups, vec![b.id]);
        assert_eq!(repo.get(user.id).await.unwrap().unwrap().groups, vec![b.id]);
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let repo = repo().await;
        repo.create(new_user("ada", vec![]), hash(), "k1".into()).await.unwrap();
        let mut twin = new_user("other", vec![]);
        twin.email = "ada@example.com".into();
        let err = repo.create(twin, hash(), "k2".into()).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(ref column) if column == "email"));
        assert!(repo.email_exists("ada@example.com").await.unwrap());
    }

    #[tokio::test]
    async fn delete_removes_token_and_memberships() {
        let repo = repo().await;
        let g = repo.ensure_group("g").await.unwrap();
        let user = repo.create(new_user("ada", vec![g.id]), hash(), "k1".into()).await.unwrap();
        assert!(repo.delete(user.id).await.unwrap());
        assert!(!repo.delete(user.id).await.unwrap());
        assert!(repo.find_by_token("k1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ensure_group_is_idempotent() {
        let repo = repo().await;
        let first = repo.ensure_group("ops").await.unwrap();
        let second = repo.ensure_group("ops").await.unwrap();
        assert_eq!(first, second);
    }
}
