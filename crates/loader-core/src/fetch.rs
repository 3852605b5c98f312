// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Retrieve files over HTTP, HTTPS and FTP into the RAM filesystem.
// Author: Lukas Bower
#![forbid(unsafe_code)]

//! Remote file retrieval.
//!
//! Downloads land in `<dest>.part` and are renamed into place only once
//! complete, so a failed transfer never leaves a truncated image behind.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Write};
use std::net::TcpStream;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::error::FetchError;

/// Downloads a URL into a local file.
pub trait Fetcher {
    /// Fetch `url` into `dest`, returning the number of bytes written.
    fn fetch(
        &self,
        url: &str,
        proxy: Option<&str>,
        headers: &[(String, String)],
        dest: &Path,
    ) -> Result<u64, FetchError>;
}

/// True for `http://`, `https://` and `ftp://` locations.
#[must_use]
pub fn is_remote(location: &str) -> bool {
    ["http://", "https://", "ftp://"]
        .iter()
        .any(|scheme| location.get(..scheme.len()).is_some_and(|head| head.eq_ignore_ascii_case(scheme)))
}

/// URL schemes the fetcher handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// Plain HTTP.
    Http,
    /// HTTP over TLS.
    Https,
    /// Anonymous or authenticated FTP.
    Ftp,
}

impl Scheme {
    fn default_port(self) -> u16 {
        match self {
            Self::Http => 80,
            Self::Https => 443,
            Self::Ftp => 21,
        }
    }
}

/// Components of a remote URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteUrl {
    /// Scheme.
    pub scheme: Scheme,
    /// User name, if embedded.
    pub user: Option<String>,
    /// Password, if embedded.
    pub password: Option<String>,
    /// Host name or address.
    pub host: String,
    /// Port, explicit or scheme default.
    pub port: u16,
    /// Absolute path, at least `/`.
    pub path: String,
}

impl RemoteUrl {
    /// Split `url` into components.
    pub fn parse(url: &str) -> Result<Self, FetchError> {
        let invalid = || FetchError::InvalidUrl(url.to_owned());
        let (scheme, rest) = url.split_once("://").ok_or_else(invalid)?;
        let scheme = match scheme.to_ascii_lowercase().as_str() {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            "ftp" => Scheme::Ftp,
            _ => return Err(invalid()),
        };
        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, "/"),
        };
        let (credentials, hostport) = match authority.rsplit_once('@') {
            Some((creds, hostport)) => (Some(creds), hostport),
            None => (None, authority),
        };
        let (user, password) = match credentials {
            Some(creds) => match creds.split_once(':') {
                Some((user, pass)) => (Some(user.to_owned()), Some(pass.to_owned())),
                None => (Some(creds.to_owned()), None),
            },
            None => (None, None),
        };
        let parse_port = |port: &str| port.parse::<u16>().map_err(|_| invalid());
        let (host, port) = if let Some(bracketed) = hostport.strip_prefix('[') {
            let (host, tail) = bracketed.split_once(']').ok_or_else(invalid)?;
            match tail.strip_prefix(':') {
                Some(port) => (host, parse_port(port)?),
                None => (host, scheme.default_port()),
            }
        } else {
            match hostport.split_once(':') {
                Some((host, port)) => (host, parse_port(port)?),
                None => (hostport, scheme.default_port()),
            }
        };
        if host.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            scheme,
            user,
            password,
            host: host.to_owned(),
            port,
            path: path.to_owned(),
        })
    }
}

fn connect_error(url: &str, err: impl std::fmt::Display) -> FetchError {
    FetchError::Connect {
        url: url.to_owned(),
        reason: err.to_string(),
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

/// Stream `reader` into `dest` through a `.part` file.
fn store(reader: &mut dyn io::Read, dest: &Path) -> Result<u64, FetchError> {
    let part = partial_path(dest);
    let io_err = |source| FetchError::Io {
        path: part.clone(),
        source,
    };
    let result = File::create(&part)
        .and_then(|mut file| {
            let written = io::copy(reader, &mut file)?;
            file.sync_all()?;
            Ok(written)
        })
        .and_then(|written| fs::rename(&part, dest).map(|()| written));
    match result {
        Ok(written) => Ok(written),
        Err(err) => {
            let _ = fs::remove_file(&part);
            Err(io_err(err))
        }
    }
}

/// [`Fetcher`] using `ureq` for HTTP(S) and a passive-mode FTP client.
#[derive(Debug, Default, Clone, Copy)]
pub struct NetFetcher;

impl NetFetcher {
    fn http(
        url: &str,
        proxy: Option<&str>,
        headers: &[(String, String)],
        dest: &Path,
    ) -> Result<u64, FetchError> {
        let mut builder = ureq::AgentBuilder::new();
        if let Some(proxy) = proxy.filter(|p| !p.is_empty()) {
            let proxy = ureq::Proxy::new(proxy).map_err(|_| FetchError::InvalidUrl(proxy.to_owned()))?;
            builder = builder.proxy(proxy);
        }
        let agent = builder.build();
        let mut request = agent.get(url);
        for (name, value) in headers {
            request = request.set(name, value);
        }
        let response = match request.call() {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => {
                return Err(FetchError::Status {
                    url: url.to_owned(),
                    status: code.to_string(),
                })
            }
            Err(ureq::Error::Transport(transport)) => return Err(connect_error(url, transport)),
        };
        let mut reader = response.into_reader();
        store(&mut reader, dest)
    }

    fn ftp(url: &str, parts: &RemoteUrl, dest: &Path) -> Result<u64, FetchError> {
        let control = TcpStream::connect((parts.host.as_str(), parts.port))
            .map_err(|err| connect_error(url, err))?;
        let mut session = FtpSession::new(control, url).map_err(|err| connect_error(url, err))?;
        session.expect(&[220])?;

        let user = parts.user.as_deref().unwrap_or("anonymous");
        let password = parts.password.as_deref().unwrap_or("-loader@");
        let (code, _) = session.command(&format!("USER {user}"))?;
        if code == 331 {
            session.command_expect(&format!("PASS {password}"), &[230, 202])?;
        } else if code != 230 {
            return Err(session.status(code));
        }
        session.command_expect("TYPE I", &[200])?;
        let (_, pasv) = session.command_expect("PASV", &[227])?;
        let (host, port) = parse_pasv(&pasv).ok_or_else(|| session.status(227))?;
        let mut data = TcpStream::connect((host.as_str(), port)).map_err(|err| connect_error(url, err))?;
        session.command_expect(&format!("RETR {}", parts.path), &[125, 150])?;
        let written = store(&mut data, dest)?;
        drop(data);
        session.expect(&[226, 250])?;
        let _ = session.command("QUIT");
        Ok(written)
    }
}

impl Fetcher for NetFetcher {
    fn fetch(
        &self,
        url: &str,
        proxy: Option<&str>,
        headers: &[(String, String)],
        dest: &Path,
    ) -> Result<u64, FetchError> {
        let parts = RemoteUrl::parse(url)?;
        info!("fetching {url}");
        let written = match parts.scheme {
            Scheme::Http | Scheme::Https => Self::http(url, proxy, headers, dest)?,
            Scheme::Ftp => Self::ftp(url, &parts, dest)?,
        };
        debug!("wrote {written} bytes to {}", dest.display());
        Ok(written)
    }
}

struct FtpSession<'u> {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    url: &'u str,
}

impl<'u> FtpSession<'u> {
    fn new(control: TcpStream, url: &'u str) -> io::Result<Self> {
        Ok(Self {
            writer: control.try_clone()?,
            reader: BufReader::new(control),
            url,
        })
    }

    fn status(&self, code: u16) -> FetchError {
        FetchError::Status {
            url: self.url.to_owned(),
            status: code.to_string(),
        }
    }

    fn read_reply(&mut self) -> Result<(u16, String), FetchError> {
        let mut text = String::new();
        let mut line = String::new();
        loop {
            line.clear();
            let read = self
                .reader
                .read_line(&mut line)
                .map_err(|err| connect_error(self.url, err))?;
            if read == 0 {
                return Err(connect_error(self.url, "connection closed"));
            }
            text.push_str(&line);
            let code = line.get(..3).and_then(|digits| digits.parse::<u16>().ok());
            if let (Some(code), Some(' ')) = (code, line.chars().nth(3)) {
                return Ok((code, text));
            }
        }
    }

    fn expect(&mut self, codes: &[u16]) -> Result<(u16, String), FetchError> {
        let (code, text) = self.read_reply()?;
        if codes.contains(&code) {
            Ok((code, text))
        } else {
            Err(FetchError::Status {
                url: self.url.to_owned(),
                status: text.trim_end().to_owned(),
            })
        }
    }

    fn command(&mut self, line: &str) -> Result<(u16, String), FetchError> {
        self.writer
            .write_all(format!("{line}\r\n").as_bytes())
            .map_err(|err| connect_error(self.url, err))?;
        self.read_reply()
    }

    fn command_expect(&mut self, line: &str, codes: &[u16]) -> Result<(u16, String), FetchError> {
        let (code, text) = self.command(line)?;
        if codes.contains(&code) {
            Ok((code, text))
        } else {
            Err(FetchError::Status {
                url: self.url.to_owned(),
                status: text.trim_end().to_owned(),
            })
        }
    }
}

/// Parse the `(h1,h2,h3,h4,p1,p2)` tuple of a `227` reply.
fn parse_pasv(reply: &str) -> Option<(String, u16)> {
    let start = reply.find('(')?;
    let end = reply[start..].find(')')? + start;
    let numbers: Vec<u16> = reply[start + 1..end]
        .split(',')
        .map(|n| n.trim().parse().ok())
        .collect::<Option<_>>()?;
    match numbers.as_slice() {
        [a, b, c, d, hi, lo] if numbers.iter().all(|n| *n < 256) => {
            Some((format!("{a}.{b}.{c}.{d}"), hi * 256 + lo))
        }
        _ => None,
    }
}
