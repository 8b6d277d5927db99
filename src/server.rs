//! Server assembly and lifecycle.
//!
//! [`FtpServer::build`] performs all fallible setup eagerly: config
//! resolution, root provisioning, certificate validation (or generation)
//! and socket binding all happen before any connection is served, so a
//! broken setup fails at construction and not inside a test body.

use tokio_util::sync::CancellationToken;

use crate::auth::{Permissions, UserRegistry, ANON_PERMS, FULL_PERMS};
use crate::config::{Overrides, ServerConfig};
use crate::engine::{FtpEngine, HandlerKind};
use crate::error::FixtureError;
use crate::net::acquire_listener;
use crate::roots::ServerRoots;
use crate::tls::{self, ValidatedCert};

#[derive(Debug)]
pub struct FtpServer {
    config: ServerConfig,
    roots: ServerRoots,
    cert: Option<ValidatedCert>,
    /// Directory holding a generated default certificate; owned and deleted
    /// by this server. `None` when the certificate was caller-supplied.
    cert_dir: Option<std::path::PathBuf>,
    listener: Option<std::net::TcpListener>,
    port: u16,
    cancel: CancellationToken,
    stopped: bool,
}

impl FtpServer {
    pub fn build(overrides: Overrides, use_tls: bool) -> Result<Self, FixtureError> {
        let config = ServerConfig::resolve(overrides, use_tls);
        let roots = ServerRoots::provision(config.home_dir.as_deref(), use_tls)?;
        let mut cert_dir = None;
        let cert = if use_tls {
            let path = match &config.cert_path {
                Some(path) => path.clone(),
                None => {
                    let dir = crate::roots::create_temp_dir("ftp_cert_")?;
                    let path = tls::write_default_cert(&dir).map_err(|error| {
                        FixtureError::InvalidCertificate {
                            path: dir.clone(),
                            reason: format!("failed to generate a default certificate: {error:#}"),
                        }
                    })?;
                    cert_dir = Some(dir);
                    path
                }
            };
            match tls::validate_cert_file(&path) {
                Ok(validated) => Some(validated),
                Err(error) => {
                    // undo the partial setup before failing construction
                    roots.wipe();
                    if let Some(dir) = &cert_dir {
                        let _ = std::fs::remove_dir_all(dir);
                    }
                    return Err(error);
                }
            }
        } else {
            None
        };
        let (listener, port) = match acquire_listener(config.requested_port) {
            Ok(bound) => bound,
            Err(error) => {
                roots.wipe();
                if let Some(dir) = &cert_dir {
                    let _ = std::fs::remove_dir_all(dir);
                }
                return Err(error.into());
            }
        };
        tracing::debug!("server bound on port {port}, tls: {use_tls}");
        Ok(FtpServer {
            config,
            roots,
            cert,
            cert_dir,
            listener: Some(listener),
            port,
            cancel: CancellationToken::new(),
            stopped: false,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn roots(&self) -> &ServerRoots {
        &self.roots
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn cert_path(&self) -> Option<&std::path::Path> {
        self.cert.as_ref().map(|cert| cert.path.as_path())
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn registry(&self) -> anyhow::Result<UserRegistry> {
        let mut registry = UserRegistry::default();
        registry.add_user(
            &self.config.username,
            &self.config.password,
            self.roots.home_root(),
            Permissions::from_spec(FULL_PERMS)?,
        );
        registry.add_anonymous(self.roots.anon_root(), Permissions::from_spec(ANON_PERMS)?);
        Ok(registry)
    }

    /// Detaches the engine for the hosting thread to run. Can only be
    /// called once per server.
    pub fn take_engine(&mut self) -> anyhow::Result<FtpEngine> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| anyhow::anyhow!("engine already taken"))?;
        let handler = match &self.cert {
            Some(cert) => HandlerKind::Tls(tokio_rustls::TlsAcceptor::from(
                cert.server_config.clone(),
            )),
            None => HandlerKind::Plain,
        };
        Ok(FtpEngine::new(listener, self.registry()?, handler))
    }

    /// Stops accepting and tears down active sessions; filesystem state
    /// is left in place so callers can order socket closure before the
    /// wipe.
    pub fn close_all(&self) {
        self.cancel.cancel();
    }

    /// Stops serving and removes everything this server created on disk.
    /// Idempotent; also runs on drop.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.cancel.cancel();
        self.roots.wipe();
        if let Some(dir) = &self.cert_dir {
            if let Err(error) = std::fs::remove_dir_all(dir) {
                if error.kind() != std::io::ErrorKind::NotFound {
                    tracing::debug!("failed removing {dir:?}: {error}");
                }
            }
        }
    }
}

impl Drop for FtpServer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_provisions_roots_and_binds_a_port() {
        let mut server = FtpServer::build(Overrides::default(), false).unwrap();
        assert_ne!(server.port(), 0);
        assert!(server.roots().anon_root().is_dir());
        assert!(server.roots().home_root().is_dir());
        assert!(server.cert_path().is_none());
        let anon = server.roots().anon_root().to_path_buf();
        server.stop();
        server.stop();
        assert!(!anon.exists());
    }

    #[test]
    fn tls_build_generates_and_cleans_a_default_cert() {
        let cert_path;
        {
            let server = FtpServer::build(Overrides::default(), true).unwrap();
            cert_path = server.cert_path().unwrap().to_path_buf();
            assert!(cert_path.is_file());
        }
        assert!(!cert_path.exists());
    }

    #[test]
    fn tls_build_with_broken_cert_fails_and_leaves_nothing() {
        let dir = std::env::temp_dir().join(format!("srv_badcert_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let bogus = dir.join("bogus.pem");
        std::fs::write(&bogus, "nope").unwrap();
        let overrides = Overrides {
            cert_path: Some(bogus.clone()),
            ..Default::default()
        };
        let error = FtpServer::build(overrides, true).unwrap_err();
        assert!(matches!(error, FixtureError::InvalidCertificate { .. }));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn engine_can_only_be_taken_once() {
        let mut server = FtpServer::build(Overrides::default(), false).unwrap();
        assert!(server.take_engine().is_ok());
        assert!(server.take_engine().is_err());
    }
}
