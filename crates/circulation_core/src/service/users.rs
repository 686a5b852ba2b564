//! User directory and signed-in session record.
//!
//! Credentials are only length-checked here; verifying them at sign-in is
//! the job of an external collaborator.

use crate::model::user::{validate_password, User, UserId, UserRole};
use crate::repo::circulation_repo::CirculationRepository;
use crate::service::error::{CirculationError, CirculationResult, EntityRef};
use log::info;

/// Default minimum password length.
pub const MIN_PASSWORD_LEN: usize = 4;

/// Account list plus the store-wide signed-in user.
pub struct UserDirectory<R: CirculationRepository> {
    repo: R,
    min_password_len: usize,
}

impl<R: CirculationRepository> UserDirectory<R> {
    /// Directory enforcing [`MIN_PASSWORD_LEN`].
    pub fn new(repo: R) -> Self {
        Self {
            repo,
            min_password_len: MIN_PASSWORD_LEN,
        }
    }

    /// Overrides [`MIN_PASSWORD_LEN`] for new and changed passwords.
    pub fn with_min_password_len(mut self, min_password_len: usize) -> Self {
        self.min_password_len = min_password_len;
        self
    }

    /// Creates an account.
    ///
    /// # Contract
    /// - `name` is trimmed and must not be empty.
    /// - `password` must reach the configured minimum length.
    /// - Nothing is written when validation fails.
    pub fn add_user(
        &self,
        name: &str,
        role: UserRole,
        password: &str,
    ) -> CirculationResult<User> {
        let user = User::new(name.trim(), role, password);
        user.validate(self.min_password_len)?;

        let mut users = self.repo.load_users()?;
        users.push(user.clone());
        self.repo.save_users(&users)?;
        info!(
            "event=user_add module=users status=ok user_id={} role={}",
            user.id,
            role.as_str()
        );
        Ok(user)
    }

    /// Unknown ids map to `NotFound(EntityRef::User)`.
    pub fn get_user(&self, user_id: UserId) -> CirculationResult<User> {
        self.repo
            .load_users()?
            .into_iter()
            .find(|user| user.id == user_id)
            .ok_or(CirculationError::NotFound(EntityRef::User(user_id)))
    }

    /// Replaces the stored credential after the same length check as
    /// [`Self::add_user`].
    pub fn change_password(&self, user_id: UserId, new_password: &str) -> CirculationResult<()> {
        validate_password(new_password, self.min_password_len)?;

        let mut users = self.repo.load_users()?;
        let user = users
            .iter_mut()
            .find(|user| user.id == user_id)
            .ok_or(CirculationError::NotFound(EntityRef::User(user_id)))?;
        user.credential = new_password.to_string();
        self.repo.save_users(&users)?;
        info!("event=user_password module=users status=ok user_id={user_id}");
        Ok(())
    }

    /// Removes a user. Loans keep their borrower snapshot.
    pub fn remove_user(&self, user_id: UserId) -> CirculationResult<()> {
        let mut users = self.repo.load_users()?;
        let before = users.len();
        users.retain(|user| user.id != user_id);
        if users.len() == before {
            return Err(CirculationError::NotFound(EntityRef::User(user_id)));
        }
        self.repo.save_users(&users)?;
        info!("event=user_remove module=users status=ok user_id={user_id}");
        Ok(())
    }

    /// Case-insensitive name search, optionally narrowed to one role.
    pub fn search_users(
        &self,
        name_fragment: &str,
        role: Option<UserRole>,
    ) -> CirculationResult<Vec<User>> {
        let needle = name_fragment.trim().to_lowercase();
        Ok(self
            .repo
            .load_users()?
            .into_iter()
            .filter(|user| user.name.to_lowercase().contains(&needle))
            .filter(|user| role.map_or(true, |role| user.role == role))
            .collect())
    }

    /// Signed-in user, if any. Shared by every process on the store.
    pub fn current_session(&self) -> CirculationResult<Option<User>> {
        Ok(self.repo.load_session()?)
    }

    /// Records `user_id` as the signed-in user of this store.
    pub fn sign_in(&self, user_id: UserId) -> CirculationResult<User> {
        let user = self.get_user(user_id)?;
        self.repo.save_session(Some(&user))?;
        info!("event=session_start module=users status=ok user_id={user_id}");
        Ok(user)
    }

    /// Removes the session key; a no-op when nobody is signed in.
    pub fn sign_out(&self) -> CirculationResult<()> {
        self.repo.save_session(None)?;
        info!("event=session_end module=users status=ok");
        Ok(())
    }
}
