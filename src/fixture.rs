//! The consumer-facing fixture handle.
//!
//! [`FtpFixture`] bundles a running background server with helpers for the
//! local filesystem view of its two roots: resolving paths and URLs,
//! uploading files into the served tree, and reading what the tree holds.
//! All helpers operate on the filesystem directly; the FTP protocol is
//! only ever exercised by the consumer's own client.

use crate::config::Overrides;
use crate::error::{FixtureError, Result};
use crate::host::ServerHost;
use crate::server::FtpServer;
use crate::url::{normalize_separators, LoginData, PathTranslator};
use crate::validate::{self, Rule};
use crate::walk::FileWalk;

/// File contents in the requested read mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent {
    /// `read_mode: "r"`, the file decoded as UTF-8.
    Text(String),
    /// `read_mode: "rb"`, the raw bytes.
    Bytes(Vec<u8>),
}

/// A file path (formatted per the requested style) with its contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentEntry {
    pub path: String,
    pub content: FileContent,
}

/// The server certificate, either by location or by value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertData {
    Path(std::path::PathBuf),
    Content(FileContent),
}

/// One file to upload into the served tree.
#[derive(Debug, Clone)]
pub enum UploadSpec {
    /// Upload under the source's own file name at the root of the tree.
    Local(std::path::PathBuf),
    /// Upload the source under an explicit relative destination path.
    Mapped { src: std::path::PathBuf, dest: String },
}

impl From<&str> for UploadSpec {
    fn from(path: &str) -> Self {
        UploadSpec::Local(std::path::PathBuf::from(path))
    }
}

impl From<std::path::PathBuf> for UploadSpec {
    fn from(path: std::path::PathBuf) -> Self {
        UploadSpec::Local(path)
    }
}

impl From<(&str, &str)> for UploadSpec {
    fn from((src, dest): (&str, &str)) -> Self {
        UploadSpec::Mapped {
            src: std::path::PathBuf::from(src),
            dest: dest.to_string(),
        }
    }
}

/// Options for [`FtpFixture::put_files`].
#[derive(Debug, Clone)]
pub struct PutOptions {
    /// `"rel_path"` or `"url"`; how returned paths are formatted.
    pub style: String,
    /// Upload into the anonymous tree instead of the user's home.
    pub anon: bool,
    /// Replace files that already exist; when unset an existing file is
    /// kept and a warning is logged.
    pub overwrite: bool,
    /// Which paths to report: `"input"` (everything requested, even if
    /// skipped), `"new"` (only files actually written) or `"all"` (every
    /// file in the tree after the upload).
    pub return_paths: String,
    /// Report contents alongside paths.
    pub return_content: bool,
    /// `"r"` or `"rb"`; how contents are read when requested.
    pub read_mode: String,
}

impl Default for PutOptions {
    fn default() -> Self {
        PutOptions {
            style: "rel_path".to_string(),
            anon: false,
            overwrite: false,
            return_paths: "input".to_string(),
            return_content: false,
            read_mode: "r".to_string(),
        }
    }
}

/// What [`FtpFixture::put_files`] reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutput {
    Paths(Vec<String>),
    Entries(Vec<ContentEntry>),
}

fn read_content(path: &std::path::Path, read_mode: &str) -> std::io::Result<FileContent> {
    if read_mode == "rb" {
        Ok(FileContent::Bytes(std::fs::read(path)?))
    } else {
        Ok(FileContent::Text(std::fs::read_to_string(path)?))
    }
}

#[derive(Debug)]
pub struct FtpFixture {
    host: ServerHost,
    translator: PathTranslator,
}

impl FtpFixture {
    /// Starts a plaintext fixture server.
    pub fn spawn(overrides: Overrides) -> Result<Self> {
        Self::spawn_inner(overrides, false)
    }

    /// Starts a fixture server that offers explicit TLS (`AUTH TLS`).
    pub fn spawn_tls(overrides: Overrides) -> Result<Self> {
        Self::spawn_inner(overrides, true)
    }

    fn spawn_inner(overrides: Overrides, use_tls: bool) -> Result<Self> {
        let server = FtpServer::build(overrides, use_tls)?;
        let translator = PathTranslator::new(
            server.port(),
            &server.config().username,
            &server.config().password,
            use_tls,
        );
        let host = ServerHost::start(server)?;
        Ok(FtpFixture { host, translator })
    }

    pub fn server_port(&self) -> u16 {
        self.host.server().port()
    }

    pub fn username(&self) -> &str {
        &self.host.server().config().username
    }

    pub fn password(&self) -> &str {
        &self.host.server().config().password
    }

    pub fn server_home(&self) -> &std::path::Path {
        self.host.server().roots().home_root()
    }

    pub fn anon_root(&self) -> &std::path::Path {
        self.host.server().roots().anon_root()
    }

    pub fn uses_tls(&self) -> bool {
        self.host.server().config().use_tls
    }

    /// The served certificate file; `None` on a plaintext fixture.
    pub fn cert_path(&self) -> Option<&std::path::Path> {
        self.host.server().cert_path()
    }

    /// Connection data for a client, as separate fields (`style: "dict"`)
    /// or a single URL (`style: "url"`).
    pub fn get_login_data(&self, style: &str, anon: bool) -> Result<LoginData> {
        let rules = [Rule {
            name: "style",
            valid_values: &["dict", "url"],
        }];
        validate::check_args(&[("style", style)], &rules, false)?;
        Ok(match style {
            "url" => LoginData::Url(self.translator.base_url(anon)),
            _ => self.translator.login_details(anon),
        })
    }

    fn format_unchecked(&self, rel: &str, style: &str, anon: bool) -> String {
        match style {
            "url" => self.translator.to_url(rel, anon),
            _ => normalize_separators(rel),
        }
    }

    /// Formats a path relative to the served tree in the requested style.
    pub fn format_file_path(&self, rel_path: &str, style: &str, anon: bool) -> Result<String> {
        validate::check_args(&[("style", style)], &[], false)?;
        Ok(self.format_unchecked(rel_path, style, anon))
    }

    /// The local directory backing the anonymous tree or the user's home.
    pub fn get_local_base_path(&self, anon: bool) -> &std::path::Path {
        self.host.server().roots().base_path(anon)
    }

    /// Lazily walks the served tree, yielding one formatted path per file.
    pub fn iter_file_paths(
        &self,
        style: &str,
        anon: bool,
    ) -> Result<impl Iterator<Item = std::io::Result<String>>> {
        validate::check_args(&[("style", style)], &[], false)?;
        let base = self.get_local_base_path(anon).to_path_buf();
        let style = style.to_string();
        let translator = self.translator.clone();
        Ok(FileWalk::new(&base).map(move |entry| {
            entry.map(|path| {
                let rel = path
                    .strip_prefix(&base)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .replace('\\', "/");
                match style.as_str() {
                    "url" => translator.to_url(&rel, anon),
                    _ => rel,
                }
            })
        }))
    }

    /// Every file in the served tree, formatted per `style` and sorted.
    pub fn get_file_paths(&self, style: &str, anon: bool) -> Result<Vec<String>> {
        let mut paths = self
            .iter_file_paths(style, anon)?
            .collect::<std::io::Result<Vec<_>>>()?;
        paths.sort();
        Ok(paths)
    }

    /// Lazily walks the served tree, yielding each file's formatted path
    /// with its contents.
    pub fn iter_file_contents(
        &self,
        style: &str,
        anon: bool,
        read_mode: &str,
    ) -> Result<impl Iterator<Item = Result<ContentEntry>>> {
        validate::check_args(&[("style", style), ("read_mode", read_mode)], &[], false)?;
        let base = self.get_local_base_path(anon).to_path_buf();
        let style = style.to_string();
        let read_mode = read_mode.to_string();
        let translator = self.translator.clone();
        Ok(FileWalk::new(&base).map(move |entry| {
            let path = entry?;
            let rel = path
                .strip_prefix(&base)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            let content = read_content(&path, &read_mode)?;
            let formatted = match style.as_str() {
                "url" => translator.to_url(&rel, anon),
                _ => rel,
            };
            Ok(ContentEntry {
                path: formatted,
                content,
            })
        }))
    }

    /// Reads files from the served tree. `paths` may mix relative paths and
    /// fixture URLs; `None` reads every file in the tree. A path that does
    /// not name an existing regular file fails with the input spelled the
    /// way the caller gave it.
    pub fn get_file_contents(
        &self,
        paths: Option<&[&str]>,
        style: &str,
        anon: bool,
        read_mode: &str,
    ) -> Result<Vec<ContentEntry>> {
        validate::check_args(&[("style", style), ("read_mode", read_mode)], &[], false)?;
        let base = self.get_local_base_path(anon).to_path_buf();
        let selected: Vec<(String, String)> = match paths {
            Some(list) => list
                .iter()
                .map(|given| {
                    let rel = self.translator.to_relative(given, anon);
                    ((*given).to_string(), rel)
                })
                .collect(),
            None => self
                .iter_file_paths("rel_path", anon)?
                .map(|entry| entry.map(|rel| (rel.clone(), rel)))
                .collect::<std::io::Result<Vec<_>>>()?,
        };
        let mut out = Vec::new();
        for (given, rel) in selected {
            let local = base.join(&rel);
            if !local.is_file() {
                return Err(FixtureError::NoSuchFile(given));
            }
            out.push(ContentEntry {
                path: self.format_unchecked(&rel, style, anon),
                content: read_content(&local, read_mode)?,
            });
        }
        Ok(out)
    }

    /// Copies local files into the served tree and reports the result per
    /// `options`. Existing files are skipped (with a warning) unless
    /// `overwrite` is set; skipped files still count for
    /// `return_paths: "input"` but not for `"new"`.
    pub fn put_files(&self, specs: &[UploadSpec], options: &PutOptions) -> Result<PutOutput> {
        validate::check_args(
            &[
                ("style", &options.style),
                ("read_mode", &options.read_mode),
                ("return_paths", &options.return_paths),
            ],
            &[],
            false,
        )?;
        let base = self.get_local_base_path(options.anon).to_path_buf();
        let mut reported: Vec<String> = Vec::new();
        for spec in specs {
            let (src, dest_rel) = match spec {
                UploadSpec::Local(path) => {
                    let Some(name) = path.file_name() else {
                        return Err(FixtureError::MalformedSpec(format!(
                            "{path:?} has no file name"
                        )));
                    };
                    (path.clone(), name.to_string_lossy().to_string())
                }
                UploadSpec::Mapped { src, dest } => {
                    let dest = normalize_separators(dest);
                    // the final segment must be a usable file name, not blank
                    let file_name = dest.rsplit('/').next().unwrap_or_default();
                    if file_name.trim().is_empty() {
                        return Err(FixtureError::MalformedSpec(format!(
                            "destination '{dest}' has no file name"
                        )));
                    }
                    (src.clone(), dest)
                }
            };
            if !src.is_file() {
                return Err(FixtureError::NoSuchFile(src.to_string_lossy().to_string()));
            }
            let target = base.join(&dest_rel);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let written = if target.exists() && !options.overwrite {
                tracing::warn!(
                    "{target:?} does already exist and won't be overwritten; \
                     set overwrite to change this"
                );
                false
            } else {
                std::fs::copy(&src, &target)?;
                true
            };
            match options.return_paths.as_str() {
                "input" => reported.push(dest_rel),
                "new" if written => reported.push(dest_rel),
                _ => {}
            }
        }
        if options.return_paths == "all" {
            return if options.return_content {
                self.get_file_contents(None, &options.style, options.anon, &options.read_mode)
                    .map(PutOutput::Entries)
            } else {
                self.get_file_paths(&options.style, options.anon)
                    .map(PutOutput::Paths)
            };
        }
        if options.return_content {
            let refs: Vec<&str> = reported.iter().map(String::as_str).collect();
            self.get_file_contents(Some(&refs), &options.style, options.anon, &options.read_mode)
                .map(PutOutput::Entries)
        } else {
            Ok(PutOutput::Paths(
                reported
                    .iter()
                    .map(|rel| self.format_unchecked(rel, &options.style, options.anon))
                    .collect(),
            ))
        }
    }

    /// The certificate the TLS fixture serves with. Fails with
    /// [`FixtureError::WrongFixture`] on a plaintext fixture.
    pub fn get_cert(&self, style: &str, read_mode: &str) -> Result<CertData> {
        let rules = [Rule {
            name: "style",
            valid_values: &["path", "content"],
        }];
        validate::check_args(&[("style", style), ("read_mode", read_mode)], &rules, false)?;
        let Some(path) = self.host.server().cert_path() else {
            return Err(FixtureError::WrongFixture);
        };
        Ok(match style {
            "content" => CertData::Content(read_content(path, read_mode)?),
            _ => CertData::Path(path.to_path_buf()),
        })
    }

    /// Wipes and recreates the temporary roots while the server keeps
    /// running, so a shared fixture starts each test with a clean tree.
    pub fn reset_tmp_dirs(&self) -> Result<()> {
        self.host.reset_roots()?;
        Ok(())
    }

    /// Shuts the server down and removes everything it created on disk.
    /// Idempotent; also runs on drop.
    pub fn stop(&mut self) {
        self.host.stop();
    }
}
