//! Background hosting of the server engine.
//!
//! The engine runs on its own named thread with a current-thread tokio
//! runtime, so the fixture works the same whether the consuming test is
//! sync or already inside an async runtime. Shutdown is cooperative via
//! the server's cancellation token and joins the thread.

use crate::error::FixtureError;
use crate::server::FtpServer;

#[derive(Debug)]
pub struct ServerHost {
    server: FtpServer,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl ServerHost {
    /// Takes the engine out of `server` and starts serving it in the
    /// background. Returns once the thread is spawned; the socket is
    /// already bound, so clients can connect immediately.
    pub fn start(mut server: FtpServer) -> Result<Self, FixtureError> {
        let engine = server
            .take_engine()
            .map_err(|error| std::io::Error::other(format!("{error:#}")))?;
        let cancel = server.cancel_token();
        let thread = std::thread::Builder::new()
            .name("ftp-fixture-server".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(error) => {
                        tracing::error!("failed to build server runtime: {error}");
                        return;
                    }
                };
                if let Err(error) = runtime.block_on(engine.serve_forever(cancel)) {
                    tracing::error!("server loop failed: {error:#}");
                }
            })?;
        Ok(ServerHost {
            server,
            thread: Some(thread),
        })
    }

    pub fn server(&self) -> &FtpServer {
        &self.server
    }

    /// Stops the server and joins the hosting thread. The listening
    /// socket and sessions are closed before the filesystem state is
    /// removed. Idempotent; also runs on drop.
    pub fn stop(&mut self) {
        self.server.close_all();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("server thread panicked");
            }
        }
        self.server.stop();
    }

    /// Wipes and recreates the temporary roots while the server keeps
    /// running, for reuse across tests within a longer scope.
    pub fn reset_roots(&self) -> std::io::Result<()> {
        self.server.roots().reset()
    }
}

impl Drop for ServerHost {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Overrides;

    #[test]
    fn sockets_close_before_roots_are_wiped() {
        let server = FtpServer::build(Overrides::default(), false).unwrap();
        let port = server.port();
        let home = server.roots().home_root().to_path_buf();
        let mut host = ServerHost::start(server).unwrap();
        host.server().close_all();
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while std::net::TcpStream::connect(("127.0.0.1", port)).is_ok() {
            assert!(std::time::Instant::now() < deadline, "listener still accepting");
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        // closed but not yet wiped
        assert!(home.is_dir());
        host.stop();
        assert!(!home.exists());
    }

    #[test]
    fn started_server_accepts_and_stop_refuses() {
        let server = FtpServer::build(Overrides::default(), false).unwrap();
        let port = server.port();
        let mut host = ServerHost::start(server).unwrap();
        let probe = std::net::TcpStream::connect(("127.0.0.1", port));
        assert!(probe.is_ok());
        host.stop();
        host.stop();
        // the listening socket is closed once the host is stopped
        let after = std::net::TcpStream::connect(("127.0.0.1", port));
        assert!(after.is_err());
    }
}
