//! User registry and permission sets for the protocol engine.
//!
//! Permissions use the classic FTP permission letters:
//! `e` change directory, `l` list, `r` retrieve, `a` append, `d` delete,
//! `f` rename, `m` make directory, `w` store, `M` chmod.

use anyhow::anyhow;

/// Full non-administrative permission set granted to the registered user.
pub const FULL_PERMS: &str = "elradfmwM";
/// Read/list-only permission set granted to the anonymous identity.
pub const ANON_PERMS: &str = "elr";

pub const ANONYMOUS: &str = "anonymous";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Perm {
    Cwd,
    List,
    Retrieve,
    Append,
    Delete,
    Rename,
    Mkdir,
    Store,
    Chmod,
}

impl Perm {
    fn bit(self) -> u16 {
        match self {
            Perm::Cwd => 1 << 0,
            Perm::List => 1 << 1,
            Perm::Retrieve => 1 << 2,
            Perm::Append => 1 << 3,
            Perm::Delete => 1 << 4,
            Perm::Rename => 1 << 5,
            Perm::Mkdir => 1 << 6,
            Perm::Store => 1 << 7,
            Perm::Chmod => 1 << 8,
        }
    }

    fn from_letter(letter: char) -> Option<Self> {
        match letter {
            'e' => Some(Perm::Cwd),
            'l' => Some(Perm::List),
            'r' => Some(Perm::Retrieve),
            'a' => Some(Perm::Append),
            'd' => Some(Perm::Delete),
            'f' => Some(Perm::Rename),
            'm' => Some(Perm::Mkdir),
            'w' => Some(Perm::Store),
            'M' => Some(Perm::Chmod),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Permissions {
    bits: u16,
}

impl Permissions {
    /// Parses a permission-letter spec such as `"elradfmwM"`.
    pub fn from_spec(spec: &str) -> anyhow::Result<Self> {
        let mut bits = 0;
        for letter in spec.chars() {
            let perm = Perm::from_letter(letter)
                .ok_or_else(|| anyhow!("unknown permission letter '{letter}' in spec '{spec}'"))?;
            bits |= perm.bit();
        }
        Ok(Permissions { bits })
    }

    pub fn allows(&self, perm: Perm) -> bool {
        self.bits & perm.bit() != 0
    }
}

#[derive(Debug, Clone)]
pub struct UserAccount {
    /// `None` means any password is accepted (anonymous login).
    pub password: Option<String>,
    pub root: std::path::PathBuf,
    pub perms: Permissions,
}

/// The one registered user plus the anonymous identity, each mapped to a
/// filesystem root and a permission set.
#[derive(Debug, Clone, Default)]
pub struct UserRegistry {
    users: std::collections::HashMap<String, UserAccount>,
}

impl UserRegistry {
    pub fn add_user(
        &mut self,
        name: &str,
        password: &str,
        root: &std::path::Path,
        perms: Permissions,
    ) {
        self.users.insert(
            name.to_string(),
            UserAccount {
                password: Some(password.to_string()),
                root: root.to_path_buf(),
                perms,
            },
        );
    }

    pub fn add_anonymous(&mut self, root: &std::path::Path, perms: Permissions) {
        self.users.insert(
            ANONYMOUS.to_string(),
            UserAccount {
                password: None,
                root: root.to_path_buf(),
                perms,
            },
        );
    }

    pub fn lookup(&self, name: &str) -> Option<&UserAccount> {
        self.users.get(name)
    }

    /// Checks credentials; anonymous accepts any password (including none).
    pub fn authenticate(&self, name: &str, password: &str) -> Option<&UserAccount> {
        let account = self.users.get(name)?;
        match &account.password {
            None => Some(account),
            Some(expected) if expected == password => Some(account),
            Some(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_spec_allows_everything() {
        let perms = Permissions::from_spec(FULL_PERMS).unwrap();
        for perm in [
            Perm::Cwd,
            Perm::List,
            Perm::Retrieve,
            Perm::Append,
            Perm::Delete,
            Perm::Rename,
            Perm::Mkdir,
            Perm::Store,
            Perm::Chmod,
        ] {
            assert!(perms.allows(perm), "{perm:?} should be allowed");
        }
    }

    #[test]
    fn anon_spec_is_read_only() {
        let perms = Permissions::from_spec(ANON_PERMS).unwrap();
        assert!(perms.allows(Perm::List));
        assert!(perms.allows(Perm::Retrieve));
        assert!(perms.allows(Perm::Cwd));
        assert!(!perms.allows(Perm::Store));
        assert!(!perms.allows(Perm::Mkdir));
        assert!(!perms.allows(Perm::Delete));
    }

    #[test]
    fn unknown_letter_is_rejected() {
        assert!(Permissions::from_spec("elz").is_err());
    }

    #[test]
    fn registry_authenticates_user_and_anonymous() {
        let mut registry = UserRegistry::default();
        let root = std::env::temp_dir();
        registry.add_user("u", "pw", &root, Permissions::from_spec(FULL_PERMS).unwrap());
        registry.add_anonymous(&root, Permissions::from_spec(ANON_PERMS).unwrap());
        assert!(registry.authenticate("u", "pw").is_some());
        assert!(registry.authenticate("u", "wrong").is_none());
        assert!(registry.authenticate(ANONYMOUS, "whatever").is_some());
        assert!(registry.authenticate("ghost", "pw").is_none());
    }
}
