use crate::auth::User;

/// Credentials of the request being served.
///
/// Every core call receives one of these explicitly; nothing in the
/// scheduling engine reads session state from anywhere else.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user: User,
    pub auth_token: String,
}

impl RequestContext {
    pub fn new(user: User, auth_token: impl Into<String>) -> Self {
        Self {
            user,
            auth_token: auth_token.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.auth_token
    }

    /// True when the caller is the given user id or an admin.
    pub fn acts_for(&self, user_id: &str) -> bool {
        self.user.id == user_id || self.user.is_admin()
    }
}
