//! Provisioning and lifecycle of the two filesystem roots backing the
//! server: the anonymous root and the registered user's home.
//!
//! The anonymous root is always a freshly created temporary directory. The
//! home root is temporary only when the caller did not supply one; a
//! caller-supplied home is adopted as-is and never deleted by this module.

/// Creates a unique directory under the system temp dir, retrying with an
/// incrementing suffix on collision.
pub(crate) fn create_temp_dir(prefix: &str) -> std::io::Result<std::path::PathBuf> {
    let mut idx = 0u32;
    loop {
        let dir = std::env::temp_dir().join(format!("{prefix}{}_{idx}", std::process::id()));
        match std::fs::create_dir(&dir) {
            Ok(()) => return Ok(dir),
            Err(error) if error.kind() == std::io::ErrorKind::AlreadyExists => idx += 1,
            Err(error) => return Err(error),
        }
    }
}

#[derive(Debug)]
pub struct ServerRoots {
    anon_root: std::path::PathBuf,
    home_root: std::path::PathBuf,
    home_is_temporary: bool,
}

impl ServerRoots {
    /// Creates the anonymous root and, when no home directory is given, a
    /// temporary home root.
    pub fn provision(
        home_dir: Option<&std::path::Path>,
        use_tls: bool,
    ) -> std::io::Result<Self> {
        let anon_root = create_temp_dir("anon_root_")?;
        let (home_root, home_is_temporary) = match home_dir {
            Some(dir) => (dir.to_path_buf(), false),
            None => {
                let prefix = if use_tls { "ftp_home_tls_" } else { "ftp_home_" };
                (create_temp_dir(prefix)?, true)
            }
        };
        Ok(ServerRoots {
            anon_root,
            home_root,
            home_is_temporary,
        })
    }

    pub fn anon_root(&self) -> &std::path::Path {
        &self.anon_root
    }

    pub fn home_root(&self) -> &std::path::Path {
        &self.home_root
    }

    pub fn home_is_temporary(&self) -> bool {
        self.home_is_temporary
    }

    /// The local base path backing either root.
    pub fn base_path(&self, anon: bool) -> &std::path::Path {
        if anon {
            &self.anon_root
        } else {
            &self.home_root
        }
    }

    /// Recursively removes the anonymous root and, if it was created by this
    /// module, the home root. Missing paths are ignored so wiping is safe on
    /// an already-stopped instance.
    pub fn wipe(&self) {
        if let Err(error) = std::fs::remove_dir_all(&self.anon_root) {
            if error.kind() != std::io::ErrorKind::NotFound {
                tracing::debug!("failed removing {:?}: {error}", &self.anon_root);
            }
        }
        if self.home_is_temporary {
            if let Err(error) = std::fs::remove_dir_all(&self.home_root) {
                if error.kind() != std::io::ErrorKind::NotFound {
                    tracing::debug!("failed removing {:?}: {error}", &self.home_root);
                }
            }
        }
    }

    /// Wipes and recreates the roots so longer-scoped fixtures can hand each
    /// test a clean filesystem. A caller-supplied home is left untouched.
    pub fn reset(&self) -> std::io::Result<()> {
        self.wipe();
        std::fs::create_dir_all(&self.anon_root)?;
        if self.home_is_temporary {
            std::fs::create_dir_all(&self.home_root)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provision_creates_both_temporary_roots() {
        let roots = ServerRoots::provision(None, false).unwrap();
        assert!(roots.anon_root().is_dir());
        assert!(roots.home_root().is_dir());
        assert!(roots.home_is_temporary());
        roots.wipe();
        assert!(!roots.anon_root().exists());
        assert!(!roots.home_root().exists());
    }

    #[test]
    fn tls_home_uses_distinct_prefix() {
        let roots = ServerRoots::provision(None, true).unwrap();
        let name = roots.home_root().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("ftp_home_tls_"), "unexpected name: {name}");
        roots.wipe();
    }

    #[test]
    fn reset_recreates_empty_temporary_roots() {
        let roots = ServerRoots::provision(None, false).unwrap();
        std::fs::write(roots.home_root().join("f.txt"), "x").unwrap();
        std::fs::create_dir(roots.anon_root().join("sub")).unwrap();
        roots.reset().unwrap();
        assert!(roots.anon_root().is_dir());
        assert!(roots.home_root().is_dir());
        assert_eq!(std::fs::read_dir(roots.home_root()).unwrap().count(), 0);
        assert_eq!(std::fs::read_dir(roots.anon_root()).unwrap().count(), 0);
        roots.wipe();
    }

    #[test]
    fn caller_supplied_home_survives_wipe_and_reset() {
        let supplied = create_temp_dir("supplied_home_").unwrap();
        std::fs::write(supplied.join("keep.txt"), "keep").unwrap();
        let roots = ServerRoots::provision(Some(&supplied), false).unwrap();
        assert!(!roots.home_is_temporary());
        roots.reset().unwrap();
        assert!(supplied.join("keep.txt").is_file());
        roots.wipe();
        assert!(supplied.is_dir());
        assert!(!roots.anon_root().exists());
        std::fs::remove_dir_all(&supplied).unwrap();
    }

    #[test]
    fn double_wipe_is_harmless() {
        let roots = ServerRoots::provision(None, false).unwrap();
        roots.wipe();
        roots.wipe();
        assert!(!roots.anon_root().exists());
    }
}
