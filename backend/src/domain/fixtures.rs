//! Fixed users used to establish a known baseline for tests and bootstrap.

use super::NewUser;

/// Email, screen name, and age of each fixture user, in creation order.
pub const FIXTURE_USERS: [(&str, &str, u32); 2] =
    [("foo@x.test", "foo", 20), ("bar@x.test", "bar", 30)];

/// Fixture users as unsaved values, in creation order.
///
/// # Examples
/// ```
/// use user_registry::domain::fixtures::fixture_users;
///
/// let users = fixture_users();
/// assert_eq!(users.len(), 2);
/// assert!(users.iter().all(|user| user.validate().is_ok()));
/// ```
pub fn fixture_users() -> Vec<NewUser> {
    FIXTURE_USERS
        .iter()
        .map(|(email, screen_name, age)| NewUser::new(*email, *screen_name, *age))
        .collect()
}
