use std::fmt;

use users::os::unix::UserExt;
use users::{get_user_by_name, get_user_groups};

/// The `Account` struct represents a resolved user account: the identity
/// the session process is launched under.
#[derive(Clone)]
pub struct Account {
    username: String,
    home: String,
    shell: String,
    uid: u32,
    gid: u32,
    groups: Vec<u32>,
}

impl Account {
    /// Resolves an account from the system user database.
    ///
    /// # Arguments
    /// * `username` - The name of the user to look up.
    ///
    /// # Returns
    /// An `Option` containing the `Account`, or `None` if the user is
    /// unknown or has no usable home directory.
    pub fn from_name(username: &str) -> Option<Account> {
        let user = get_user_by_name(username)?;
        let uid = user.uid();
        let gid = user.primary_group_id();
        let home = user.home_dir().to_str()?.to_string();
        let shell = user.shell().to_str().unwrap_or("/bin/sh").to_string();

        let groups: Vec<u32> = get_user_groups(username, gid)
            .unwrap_or_default()
            .iter()
            .filter(|group| {
                // only return the root group if the user is the root user
                if uid == 0 {
                    return true;
                }
                group.gid() > 0
            })
            .map(|group| group.gid())
            .collect();

        Some(Account {
            username: username.to_string(),
            home,
            shell,
            uid,
            gid,
            groups,
        })
    }

    /// Returns the username of the account.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns the home directory of the account.
    pub fn home(&self) -> &str {
        &self.home
    }

    /// Returns the login shell of the account.
    pub fn shell(&self) -> &str {
        &self.shell
    }

    /// Returns the user ID of the account.
    pub fn uid(&self) -> u32 {
        self.uid
    }

    /// Returns the group ID of the account.
    pub fn gid(&self) -> u32 {
        self.gid
    }

    /// Returns the list of group IDs the account belongs to.
    pub fn groups(&self) -> &[u32] {
        &self.groups
    }
}

impl fmt::Display for Account {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "username = {}, home = {}, uid = {}, gid = {}, groups = {:?}", self.username, self.home, self.uid, self.gid, &self.groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_root_account() {
        if let Some(account) = Account::from_name("root") {
            assert_eq!(account.uid(), 0);
            assert!(!account.home().is_empty());
        }
    }

    #[test]
    fn unknown_user_yields_none() {
        assert!(Account::from_name("no-such-user-here").is_none());
    }
}
