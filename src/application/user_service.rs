use async_trait::async_trait;
use thiserror::Error;

use crate::application::credentials::{self, HashError, PasswordHasher};
use crate::domain::repository::{StoreError, UserRepository};
use crate::domain::user::{self, Avatar, GroupId, NewUser, User, UserChanges, UserId};
use crate::domain::validation::{FieldErrors, Payload, UpdateMode};

#[derive(Debug, Error)]
pub enum UserError {
    #[error("invalid user payload")]
    Validation(FieldErrors),
    #[error("user not found")]
    NotFound,
    #[error("email is already in use")]
    EmailTaken,
    #[error("unknown groups: {0:?}")]
    GroupNotFound(Vec<GroupId>),
    #[error("avatar of {size} bytes exceeds the upload limit")]
    AvatarTooLarge { size: usize },
    #[error(transparent)]
    Hash(#[from] HashError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[async_trait]
pub trait UserService: Send + Sync + 'static {
    async fn create(&self, payload: &Payload) -> Result<User, UserError>;
    async fn get(&self, id: UserId) -> Result<User, UserError>;
    async fn list(&self) -> Result<Vec<User>, UserError>;
    async fn update(&self, id: UserId, payload: &Payload, avatar: Option<Avatar>) -> Result<User, UserError>;
    async fn partial_update(&self, id: UserId, payload: &Payload, avatar: Option<Avatar>) -> Result<User, UserError>;
    async fn delete(&self, id: UserId) -> Result<(), UserError>;
    /// Resolves an access token to its owner.
    async fn authenticate(&self, token: &str) -> Result<Option<User>, UserError>;
}

#[derive(Clone)]
pub struct UserServiceImpl<R: UserRepository> {
    repo: R,
    hasher: PasswordHasher,
}

impl<R: UserRepository> UserServiceImpl<R> {
    pub fn new(repo: R, hasher: PasswordHasher) -> Self { Self { repo, hasher } }

    pub fn repository(&self) -> &R { &self.repo }

    async fn change(&self, id: UserId, payload: &Payload, avatar: Option<Avatar>, mode: UpdateMode) -> Result<User, UserError> {
        if self.repo.get(id).await?.is_none() {
            return Err(UserError::NotFound);
        }
        if let Some(avatar) = avatar.filter(Avatar::exceeds_limit) {
            tracing::warn!(user_id = %id, size = avatar.size, "avatar rejected");
            return Err(UserError::AvatarTooLarge { size: avatar.size });
        }

        let (changes, password) = UserChanges::from_payload(payload, mode).map_err(UserError::Validation)?;
        let password = match password {
            Some(p) => Some(self.hasher.hash_blocking(p).await?),
            None => None,
        };

        let user = self
            .repo
            .update(id, changes, password)
            .await
            .map_err(|err| match err {
                StoreError::MissingGroups(ids) => UserError::GroupNotFound(ids),
                other => conflict_to_user_error(other),
            })?
            .ok_or(UserError::NotFound)?;
        tracing::info!(user_id = %user.id, ?mode, "user updated");
        Ok(user)
    }
}

#[async_trait]
impl<R: UserRepository> UserService for UserServiceImpl<R> {
    async fn create(&self, payload: &Payload) -> Result<User, UserError> {
        if let Some(email) = user::payload_email(payload) {
            if self.repo.email_exists(email).await? {
                tracing::warn!(email, "user create rejected: email in use");
                return Err(UserError::EmailTaken);
            }
        }

        let (input, password) = NewUser::from_payload(payload).map_err(UserError::Validation)?;
        let password = self.hasher.hash_blocking(password).await?;

        let user = self
            .repo
            .create(input, password, credentials::generate_token())
            .await
            .map_err(|err| match err {
                StoreError::MissingGroups(ids) => {
                    let mut errors = FieldErrors::new();
                    for id in ids {
                        errors.add("groups", format!("Invalid pk \"{id}\" - object does not exist."));
                    }
                    UserError::Validation(errors)
                }
                other => conflict_to_user_error(other),
            })?;
        tracing::info!(user_id = %user.id, username = %user.username, "user created");
        Ok(user)
    }

    async fn get(&self, id: UserId) -> Result<User, UserError> {
        self.repo.get(id).await?.ok_or(UserError::NotFound)
    }

    async fn list(&self) -> Result<Vec<User>, UserError> { Ok(self.repo.list().await?) }

    async fn update(&self, id: UserId, payload: &Payload, avatar: Option<Avatar>) -> Result<User, UserError> {
        self.change(id, payload, avatar, UpdateMode::Full).await
    }

    async fn partial_update(&self, id: UserId, payload: &Payload, avatar: Option<Avatar>) -> Result<User, UserError> {
        self.change(id, payload, avatar, UpdateMode::Partial).await
    }

    async fn delete(&self, id: UserId) -> Result<(), UserError> {
        if !self.repo.delete(id).await? {
            return Err(UserError::NotFound);
        }
        tracing::info!(user_id = %id, "user deleted");
        Ok(())
    }

    async fn authenticate(&self, token: &str) -> Result<Option<User>, UserError> {
        Ok(self.repo.find_by_token(token).await?)
    }
}

fn conflict_to_user_error(err: StoreError) -> UserError {
    match err {
        StoreError::Conflict(column) if column == "email" => UserError::EmailTaken,
        StoreError::Conflict(column) if column == "username" => {
            UserError::Validation(FieldErrors::single("username", user::DUPLICATE_USERNAME))
        }
        other => UserError::Store(other),
    }
}
