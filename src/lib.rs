//! An ephemeral, locally hosted FTP server for tests.
//!
//! Spawning a [`FtpFixture`] binds a listening socket, provisions
//! temporary directories for the anonymous tree and the registered user's
//! home, and serves real FTP (optionally with explicit TLS) from a
//! background thread. Helpers on the handle seed the served tree with
//! files and turn relative paths into the URLs a client would use.
//! Stopping the fixture (or dropping it) shuts the server down and removes
//! everything it created.
//!
//! ```no_run
//! use ftp_fixture::{FtpFixture, Overrides, PutOptions, UploadSpec};
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut fixture = FtpFixture::spawn(Overrides::default())?;
//!     let specs = [UploadSpec::from(("local/data.csv", "uploads/data.csv"))];
//!     fixture.put_files(&specs, &PutOptions::default())?;
//!     let url = fixture.format_file_path("uploads/data.csv", "url", false)?;
//!     // hand `url` to the code under test, then tear down
//!     fixture.stop();
//!     Ok(())
//! }
//! ```

mod auth;
mod config;
mod engine;
mod error;
mod fixture;
mod host;
mod net;
mod roots;
mod server;
mod tls;
mod url;
mod validate;
mod walk;

pub use config::{FixtureScope, Overrides, ServerConfig, DEFAULT_PASSWORD, DEFAULT_USERNAME};
pub use error::{FixtureError, Result};
pub use fixture::{
    CertData, ContentEntry, FileContent, FtpFixture, PutOptions, PutOutput, UploadSpec,
};
pub use url::LoginData;
