//! Minimal blocking FTP client used to exercise the fixture over the wire.
#![allow(dead_code)]

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;

#[derive(Debug)]
pub struct Reply {
    pub code: u16,
    pub text: String,
}

pub struct FtpClient {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
}

fn parse_code(line: &str) -> u16 {
    line.get(..3)
        .and_then(|digits| digits.parse().ok())
        .unwrap_or_else(|| panic!("unparseable reply line: {line:?}"))
}

impl FtpClient {
    pub fn connect(port: u16) -> std::io::Result<Self> {
        let stream = TcpStream::connect(("127.0.0.1", port))?;
        stream.set_read_timeout(Some(std::time::Duration::from_secs(10)))?;
        let reader = BufReader::new(stream.try_clone()?);
        let mut client = FtpClient { stream, reader };
        let greeting = client.read_reply()?;
        assert_eq!(greeting.code, 220, "{}", greeting.text);
        Ok(client)
    }

    pub fn read_reply(&mut self) -> std::io::Result<Reply> {
        let mut line = String::new();
        self.reader.read_line(&mut line)?;
        let code = parse_code(&line);
        // multiline replies end with "<code> <text>"
        if line.as_bytes().get(3) == Some(&b'-') {
            loop {
                let mut next = String::new();
                self.reader.read_line(&mut next)?;
                let terminal =
                    next.len() >= 4 && parse_code(&next) == code && next.as_bytes()[3] == b' ';
                line.push_str(&next);
                if terminal {
                    break;
                }
            }
        }
        Ok(Reply {
            code,
            text: line.trim_end().to_string(),
        })
    }

    pub fn cmd(&mut self, command: &str) -> std::io::Result<Reply> {
        write!(self.stream, "{command}\r\n")?;
        self.stream.flush()?;
        self.read_reply()
    }

    pub fn login(&mut self, user: &str, pass: &str) -> std::io::Result<Reply> {
        let first = self.cmd(&format!("USER {user}"))?;
        assert_eq!(first.code, 331, "{}", first.text);
        self.cmd(&format!("PASS {pass}"))
    }

    /// Opens a passive data connection.
    pub fn pasv(&mut self) -> std::io::Result<TcpStream> {
        let reply = self.cmd("PASV")?;
        assert_eq!(reply.code, 227, "{}", reply.text);
        let digits: Vec<u16> = reply
            .text
            .chars()
            .map(|c| if c.is_ascii_digit() { c } else { ' ' })
            .collect::<String>()
            .split_whitespace()
            .skip(1) // the reply code itself
            .filter_map(|part| part.parse().ok())
            .collect();
        assert!(digits.len() >= 6, "bad PASV reply: {}", reply.text);
        let port = digits[4] * 256 + digits[5];
        TcpStream::connect(("127.0.0.1", port))
    }

    pub fn retrieve(&mut self, path: &str) -> std::io::Result<Vec<u8>> {
        let mut data = self.pasv()?;
        let reply = self.cmd(&format!("RETR {path}"))?;
        assert_eq!(reply.code, 150, "{}", reply.text);
        let mut buf = Vec::new();
        data.read_to_end(&mut buf)?;
        drop(data);
        let done = self.read_reply()?;
        assert_eq!(done.code, 226, "{}", done.text);
        Ok(buf)
    }

    /// Uploads `contents`; returns the server's final (or refusing) reply.
    pub fn store(&mut self, path: &str, contents: &[u8]) -> std::io::Result<Reply> {
        let mut data = self.pasv()?;
        let reply = self.cmd(&format!("STOR {path}"))?;
        if reply.code != 150 {
            return Ok(reply);
        }
        data.write_all(contents)?;
        data.shutdown(std::net::Shutdown::Write)?;
        drop(data);
        self.read_reply()
    }

    pub fn nlst(&mut self) -> std::io::Result<Vec<String>> {
        let mut data = self.pasv()?;
        let reply = self.cmd("NLST")?;
        assert_eq!(reply.code, 150, "{}", reply.text);
        let mut buf = String::new();
        data.read_to_string(&mut buf)?;
        drop(data);
        let done = self.read_reply()?;
        assert_eq!(done.code, 226, "{}", done.text);
        Ok(buf.lines().map(str::to_string).collect())
    }
}

/// Creates a unique scratch directory for a test's local source files.
pub fn scratch_dir(tag: &str) -> std::path::PathBuf {
    let mut idx = 0;
    loop {
        let dir = std::env::temp_dir().join(format!("ftp_scratch_{tag}_{}_{idx}", std::process::id()));
        match std::fs::create_dir(&dir) {
            Ok(()) => return dir,
            Err(_) => idx += 1,
        }
    }
}
