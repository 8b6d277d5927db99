//! Per-connection FTP command loop.
//!
//! A session starts in plaintext. `AUTH TLS` (when the engine carries a
//! TLS handler) upgrades the control channel in place; `PROT P` makes
//! subsequent data channels TLS as well. The command loop itself is
//! generic over the stream type so the same code drives both phases.

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufStream};

use super::HandlerKind;
use crate::auth::{Perm, Permissions, UserRegistry, ANONYMOUS};

const DATA_ACCEPT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

trait DataStream: AsyncRead + AsyncWrite + Send + Unpin {}
impl<S: AsyncRead + AsyncWrite + Send + Unpin> DataStream for S {}

struct LoggedIn {
    root: std::path::PathBuf,
    perms: Permissions,
}

struct Session {
    registry: std::sync::Arc<UserRegistry>,
    handler: HandlerKind,
    pending_user: Option<String>,
    user: Option<LoggedIn>,
    /// Working directory relative to the user's root.
    cwd: std::path::PathBuf,
    rename_from: Option<std::path::PathBuf>,
    data: Option<tokio::net::TcpListener>,
    prot_private: bool,
    secured: bool,
}

enum Next {
    Closed,
    StartTls,
}

pub(super) async fn run(
    socket: tokio::net::TcpStream,
    registry: std::sync::Arc<UserRegistry>,
    handler: HandlerKind,
) -> anyhow::Result<()> {
    let mut session = Session {
        registry,
        handler: handler.clone(),
        pending_user: None,
        user: None,
        cwd: std::path::PathBuf::new(),
        rename_from: None,
        data: None,
        prot_private: false,
        secured: false,
    };
    let mut stream = BufStream::new(socket);
    reply(&mut stream, "220 local FTP fixture ready.").await?;
    match drive(&mut stream, &mut session).await? {
        Next::Closed => Ok(()),
        Next::StartTls => {
            let HandlerKind::Tls(acceptor) = handler else {
                anyhow::bail!("TLS upgrade requested without a TLS handler");
            };
            // the 234 reply was flushed before the handshake starts
            let tls = acceptor.accept(stream.into_inner()).await?;
            session.secured = true;
            let mut stream = BufStream::new(tls);
            match drive(&mut stream, &mut session).await? {
                Next::Closed => Ok(()),
                Next::StartTls => anyhow::bail!("repeated TLS upgrade on secured connection"),
            }
        }
    }
}

async fn reply<S>(stream: &mut BufStream<S>, text: &str) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    tracing::trace!("-> {text}");
    stream.write_all(text.as_bytes()).await?;
    stream.write_all(b"\r\n").await?;
    stream.flush().await
}

fn split_command(line: &str) -> (String, &str) {
    match line.split_once(' ') {
        Some((verb, arg)) => (verb.to_ascii_uppercase(), arg.trim()),
        None => (line.to_ascii_uppercase(), ""),
    }
}

/// Commands allowed before a successful login.
fn allowed_unauthenticated(verb: &str) -> bool {
    matches!(
        verb,
        "USER" | "PASS" | "QUIT" | "AUTH" | "PBSZ" | "PROT" | "FEAT" | "SYST" | "NOOP" | "TYPE"
    )
}

/// Maps a command argument onto a path relative to the user's root.
/// Absolute arguments are taken from the root; `..` never escapes it.
fn resolve_virtual(cwd: &std::path::Path, arg: &str) -> std::path::PathBuf {
    let normalized = arg.replace('\\', "/");
    let mut rel = if normalized.starts_with('/') {
        std::path::PathBuf::new()
    } else {
        cwd.to_path_buf()
    };
    for component in std::path::Path::new(&normalized).components() {
        match component {
            std::path::Component::Normal(part) => rel.push(part),
            std::path::Component::ParentDir => {
                rel.pop();
            }
            _ => {}
        }
    }
    rel
}

fn virtual_display(rel: &std::path::Path) -> String {
    let joined = rel
        .components()
        .filter_map(|component| match component {
            std::path::Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/");
    format!("/{joined}")
}

fn list_line(name: &str, metadata: &std::fs::Metadata) -> String {
    let (kind, size) = if metadata.is_dir() {
        ('d', 0)
    } else {
        ('-', metadata.len())
    };
    format!("{kind}rwxr-xr-x   1 ftp      ftp  {size:>12} Jan  1 00:00 {name}")
}

impl Session {
    fn authenticated(&self) -> Option<&LoggedIn> {
        self.user.as_ref()
    }

    /// Accepts the pending passive data connection, wrapping it in TLS when
    /// the client negotiated `PROT P`.
    async fn open_data_stream(&mut self) -> anyhow::Result<Box<dyn DataStream>> {
        let listener = self
            .data
            .take()
            .context("no passive listener pending")?;
        let (tcp, _) = tokio::time::timeout(DATA_ACCEPT_TIMEOUT, listener.accept())
            .await
            .context("timed out waiting for the data connection")??;
        if self.prot_private {
            if let HandlerKind::Tls(acceptor) = &self.handler {
                let tls = acceptor.accept(tcp).await?;
                return Ok(Box::new(tls));
            }
        }
        Ok(Box::new(tcp))
    }
}

async fn drive<S>(stream: &mut BufStream<S>, session: &mut Session) -> anyhow::Result<Next>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        if stream.read_line(&mut line).await? == 0 {
            return Ok(Next::Closed);
        }
        let input = line.trim_end_matches(['\r', '\n']);
        let (verb, arg) = split_command(input);
        tracing::trace!("<- {verb} {arg}");

        if session.authenticated().is_none() && !allowed_unauthenticated(&verb) {
            reply(stream, "530 Log in with USER and PASS first.").await?;
            continue;
        }

        match verb.as_str() {
            "USER" => {
                session.pending_user = Some(arg.to_string());
                session.user = None;
                if arg == ANONYMOUS {
                    reply(stream, "331 Anonymous login ok, send any password.").await?;
                } else {
                    reply(stream, "331 Username ok, send password.").await?;
                }
            }
            "PASS" => match session.pending_user.take() {
                None => reply(stream, "503 Login with USER first.").await?,
                Some(name) => match session.registry.authenticate(&name, arg) {
                    Some(account) => {
                        session.user = Some(LoggedIn {
                            root: account.root.clone(),
                            perms: account.perms,
                        });
                        session.cwd = std::path::PathBuf::new();
                        tracing::debug!("user '{name}' logged in");
                        reply(stream, "230 Login successful.").await?;
                    }
                    None => reply(stream, "530 Authentication failed.").await?,
                },
            },
            "QUIT" => {
                reply(stream, "221 Goodbye.").await?;
                return Ok(Next::Closed);
            }
            "AUTH" => {
                if !arg.eq_ignore_ascii_case("TLS") {
                    reply(stream, "504 Unsupported security mechanism.").await?;
                } else if session.secured {
                    reply(stream, "503 Already using TLS.").await?;
                } else if matches!(session.handler, HandlerKind::Tls(_)) {
                    reply(stream, "234 AUTH TLS successful.").await?;
                    return Ok(Next::StartTls);
                } else {
                    reply(stream, "502 TLS not enabled on this server.").await?;
                }
            }
            "PBSZ" => reply(stream, "200 PBSZ=0 successful.").await?,
            "PROT" => {
                if arg.eq_ignore_ascii_case("P") {
                    if session.secured {
                        session.prot_private = true;
                        reply(stream, "200 Protection set to Private").await?;
                    } else {
                        reply(stream, "503 PROT P requires a secured control connection.").await?;
                    }
                } else if arg.eq_ignore_ascii_case("C") {
                    session.prot_private = false;
                    reply(stream, "200 Protection set to Clear").await?;
                } else {
                    reply(stream, "502 Unrecognized PROT type.").await?;
                }
            }
            "SYST" => reply(stream, "215 UNIX Type: L8").await?,
            "FEAT" => {
                stream.write_all(b"211-Features supported:\r\n").await?;
                stream.write_all(b" EPSV\r\n PASV\r\n SIZE\r\n UTF8\r\n").await?;
                if matches!(session.handler, HandlerKind::Tls(_)) {
                    stream.write_all(b" AUTH TLS\r\n PBSZ\r\n PROT\r\n").await?;
                }
                reply(stream, "211 End FEAT.").await?;
            }
            "TYPE" => reply(stream, "200 Type set ok.").await?,
            "NOOP" => reply(stream, "200 Ok.").await?,
            "PWD" => {
                let display = virtual_display(&session.cwd);
                reply(stream, &format!("257 \"{display}\" is the current directory.")).await?;
            }
            "CWD" => {
                let user = session.authenticated().context("login checked above")?;
                if !user.perms.allows(Perm::Cwd) {
                    reply(stream, "550 Permission denied.").await?;
                    continue;
                }
                let rel = resolve_virtual(&session.cwd, arg);
                let path = user.root.join(&rel);
                if path.is_dir() {
                    session.cwd = rel;
                    let display = virtual_display(&session.cwd);
                    reply(stream, &format!("250 \"{display}\" is the current directory.")).await?;
                } else {
                    reply(stream, "550 Failed to change directory.").await?;
                }
            }
            "CDUP" => {
                session.cwd.pop();
                let display = virtual_display(&session.cwd);
                reply(stream, &format!("250 \"{display}\" is the current directory.")).await?;
            }
            "PASV" => {
                let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await?;
                let port = listener.local_addr()?.port();
                session.data = Some(listener);
                reply(
                    stream,
                    &format!("227 Entering passive mode (127,0,0,1,{},{}).", port >> 8, port & 0xff),
                )
                .await?;
            }
            "EPSV" => {
                let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await?;
                let port = listener.local_addr()?.port();
                session.data = Some(listener);
                reply(stream, &format!("229 Entering extended passive mode (|||{port}|).")).await?;
            }
            "LIST" | "NLST" => {
                let user = session.authenticated().context("login checked above")?;
                if !user.perms.allows(Perm::List) {
                    reply(stream, "550 Permission denied.").await?;
                    continue;
                }
                let rel = resolve_virtual(&session.cwd, arg);
                let path = user.root.join(&rel);
                if !path.exists() {
                    reply(stream, "550 No such file or directory.").await?;
                    continue;
                }
                if session.data.is_none() {
                    reply(stream, "503 Use PASV or EPSV first.").await?;
                    continue;
                }
                let names_only = verb == "NLST";
                reply(stream, "150 Directory listing follows.").await?;
                let mut data = session.open_data_stream().await?;
                let mut listing = String::new();
                if path.is_dir() {
                    let mut entries = tokio::fs::read_dir(&path).await?;
                    while let Some(entry) = entries.next_entry().await? {
                        let name = entry.file_name().to_string_lossy().to_string();
                        if names_only {
                            listing.push_str(&name);
                        } else {
                            listing.push_str(&list_line(&name, &entry.metadata().await?));
                        }
                        listing.push_str("\r\n");
                    }
                } else {
                    let name = path
                        .file_name()
                        .map(|name| name.to_string_lossy().to_string())
                        .unwrap_or_default();
                    if names_only {
                        listing.push_str(&name);
                    } else {
                        listing.push_str(&list_line(&name, &tokio::fs::metadata(&path).await?));
                    }
                    listing.push_str("\r\n");
                }
                data.write_all(listing.as_bytes()).await?;
                data.shutdown().await?;
                reply(stream, "226 Transfer complete.").await?;
            }
            "RETR" => {
                let user = session.authenticated().context("login checked above")?;
                if !user.perms.allows(Perm::Retrieve) {
                    reply(stream, "550 Permission denied.").await?;
                    continue;
                }
                let rel = resolve_virtual(&session.cwd, arg);
                let path = user.root.join(&rel);
                let mut file = match tokio::fs::File::open(&path).await {
                    Ok(file) => file,
                    Err(_) => {
                        reply(stream, "550 Failed to open file.").await?;
                        continue;
                    }
                };
                if session.data.is_none() {
                    reply(stream, "503 Use PASV or EPSV first.").await?;
                    continue;
                }
                reply(stream, "150 Sending file.").await?;
                let mut data = session.open_data_stream().await?;
                tokio::io::copy(&mut file, &mut data).await?;
                data.shutdown().await?;
                reply(stream, "226 Transfer complete.").await?;
            }
            "STOR" | "APPE" => {
                let user = session.authenticated().context("login checked above")?;
                let needed = if verb == "APPE" { Perm::Append } else { Perm::Store };
                if !user.perms.allows(needed) {
                    reply(stream, "550 Permission denied.").await?;
                    continue;
                }
                let rel = resolve_virtual(&session.cwd, arg);
                let path = user.root.join(&rel);
                let open = if verb == "APPE" {
                    tokio::fs::OpenOptions::new().create(true).append(true).open(&path).await
                } else {
                    tokio::fs::File::create(&path).await
                };
                let mut file = match open {
                    Ok(file) => file,
                    Err(_) => {
                        reply(stream, "550 Failed to open file for writing.").await?;
                        continue;
                    }
                };
                if session.data.is_none() {
                    reply(stream, "503 Use PASV or EPSV first.").await?;
                    continue;
                }
                reply(stream, "150 Ready to receive file.").await?;
                let mut data = session.open_data_stream().await?;
                tokio::io::copy(&mut data, &mut file).await?;
                file.flush().await?;
                reply(stream, "226 Transfer complete.").await?;
            }
            "DELE" => {
                let user = session.authenticated().context("login checked above")?;
                if !user.perms.allows(Perm::Delete) {
                    reply(stream, "550 Permission denied.").await?;
                    continue;
                }
                let rel = resolve_virtual(&session.cwd, arg);
                let path = user.root.join(&rel);
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => reply(stream, "250 File removed.").await?,
                    Err(_) => reply(stream, "550 Failed to delete file.").await?,
                }
            }
            "RMD" => {
                let user = session.authenticated().context("login checked above")?;
                if !user.perms.allows(Perm::Delete) {
                    reply(stream, "550 Permission denied.").await?;
                    continue;
                }
                let rel = resolve_virtual(&session.cwd, arg);
                let path = user.root.join(&rel);
                match tokio::fs::remove_dir_all(&path).await {
                    Ok(()) => reply(stream, "250 Directory removed.").await?,
                    Err(_) => reply(stream, "550 Failed to remove directory.").await?,
                }
            }
            "MKD" => {
                let user = session.authenticated().context("login checked above")?;
                if !user.perms.allows(Perm::Mkdir) {
                    reply(stream, "550 Permission denied.").await?;
                    continue;
                }
                let rel = resolve_virtual(&session.cwd, arg);
                let path = user.root.join(&rel);
                match tokio::fs::create_dir(&path).await {
                    Ok(()) => {
                        let display = virtual_display(&rel);
                        reply(stream, &format!("257 \"{display}\" directory created.")).await?;
                    }
                    Err(_) => reply(stream, "550 Failed to create directory.").await?,
                }
            }
            "RNFR" => {
                let user = session.authenticated().context("login checked above")?;
                if !user.perms.allows(Perm::Rename) {
                    reply(stream, "550 Permission denied.").await?;
                    continue;
                }
                let rel = resolve_virtual(&session.cwd, arg);
                if user.root.join(&rel).exists() {
                    session.rename_from = Some(rel);
                    reply(stream, "350 Ready for destination name.").await?;
                } else {
                    reply(stream, "550 No such file or directory.").await?;
                }
            }
            "RNTO" => {
                let root = session
                    .authenticated()
                    .context("login checked above")?
                    .root
                    .clone();
                match session.rename_from.take() {
                    None => reply(stream, "503 Use RNFR first.").await?,
                    Some(from_rel) => {
                        let from = root.join(&from_rel);
                        let to = root.join(resolve_virtual(&session.cwd, arg));
                        match tokio::fs::rename(&from, &to).await {
                            Ok(()) => reply(stream, "250 Renaming ok.").await?,
                            Err(_) => reply(stream, "550 Failed to rename.").await?,
                        }
                    }
                }
            }
            "SIZE" => {
                let user = session.authenticated().context("login checked above")?;
                let rel = resolve_virtual(&session.cwd, arg);
                let path = user.root.join(&rel);
                match tokio::fs::metadata(&path).await {
                    Ok(metadata) if metadata.is_file() => {
                        reply(stream, &format!("213 {}", metadata.len())).await?;
                    }
                    _ => reply(stream, "550 No such file.").await?,
                }
            }
            _ => reply(stream, &format!("500 Command \"{verb}\" not understood.")).await?,
        }
    }
}
