//! Just enough FTP to crawl and download.
//!
//! Control replies follow RFC 959 (including `123-` multi-line replies).
//! Passive mode prefers `EPSV` (RFC 2428) and falls back to `PASV`; in both
//! cases the data connection goes to the control connection's peer address,
//! never to whatever address a NAT-confused server advertises. Listings use
//! `MLSD` (RFC 3659) when the server supports it, `LIST` otherwise.

use super::listing::{self, ListEntry};
use crate::consts::PASV_ADDRESS_REGEX;
use crate::error::{Error, ErrorKind, Result};
use std::future::Future;
use std::io;
use std::net::IpAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Reply {
    pub code: u16,
    pub text: String,
}

/// Await `fut`, turning both I/O failures and the timeout into
/// [`Connectivity`](ErrorKind::Connectivity) errors.
async fn within<T>(limit: Duration, what: &str, fut: impl Future<Output = io::Result<T>>) -> Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(ErrorKind::connectivity(format!("{what}: {err}"))),
        Err(_) => Err(ErrorKind::connectivity(format!("{what}: timed out after {limit:?}"))),
    }
}

pub(crate) struct FtpClient {
    control: BufReader<TcpStream>,
    peer: IpAddr,
    timeout: Duration,
    mlsd: bool,
}

impl FtpClient {
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let stream = within(timeout, "connecting", TcpStream::connect((host, port))).await?;
        let peer = stream.peer_addr().map_err(ErrorKind::connectivity)?.ip();
        let mut client = Self {
            control: BufReader::new(stream),
            peer,
            timeout,
            mlsd: true,
        };
        let mut greeting = client.read_reply().await?;
        // 120: "service ready in n minutes", the real greeting follows.
        while greeting.code == 120 {
            greeting = client.read_reply().await?;
        }
        if greeting.code != 220 {
            exn::bail!(ErrorKind::Connectivity(format!("server refused session: {} {}", greeting.code, greeting.text)));
        }
        Ok(client)
    }

    pub async fn login(&mut self, user: &str, password: &str) -> Result<()> {
        let reply = self.command(&format!("USER {user}")).await?;
        match reply.code {
            230 => return Ok(()),
            331 | 332 => {},
            _ => exn::bail!(ErrorKind::Connectivity(format!("login rejected: {} {}", reply.code, reply.text))),
        }
        let reply = self.command(&format!("PASS {password}")).await?;
        match reply.code {
            230 | 202 => Ok(()),
            _ => exn::bail!(ErrorKind::Connectivity(format!("login rejected: {} {}", reply.code, reply.text))),
        }
    }

    pub async fn binary(&mut self) -> Result<()> {
        let reply = self.command("TYPE I").await?;
        match reply.code {
            200 => Ok(()),
            _ => Err(unexpected("TYPE I", "", &reply)),
        }
    }

    /// Entries of `dir`, excluding `.` and `..`.
    pub async fn list(&mut self, dir: &str) -> Result<Vec<ListEntry>> {
        if self.mlsd {
            let data = self.open_data().await?;
            let reply = self.command(&format!("MLSD {dir}")).await?;
            match reply.code {
                125 | 150 => return Ok(listing::parse_mlsd(&self.read_listing(data).await?)),
                500 | 502 | 504 => {
                    tracing::debug!(code = reply.code, "MLSD unsupported, falling back to LIST");
                    self.mlsd = false;
                },
                _ => return Err(unexpected("MLSD", dir, &reply)),
            }
        }
        let data = self.open_data().await?;
        let reply = self.command(&format!("LIST {dir}")).await?;
        match reply.code {
            125 | 150 => Ok(listing::parse_list(&self.read_listing(data).await?)),
            _ => Err(unexpected("LIST", dir, &reply)),
        }
    }

    pub async fn size(&mut self, path: &str) -> Result<u64> {
        let reply = self.command(&format!("SIZE {path}")).await?;
        match reply.code {
            213 => reply
                .text
                .trim()
                .parse()
                .map_err(|_| Error::from(ErrorKind::Protocol(format!("bad SIZE reply: {}", reply.text)))),
            _ => Err(unexpected("SIZE", path, &reply)),
        }
    }

    /// Raw `MDTM` value, or `None` when the server doesn't support it.
    pub async fn modified(&mut self, path: &str) -> Result<Option<String>> {
        let reply = self.command(&format!("MDTM {path}")).await?;
        Ok(match reply.code {
            213 => Some(reply.text.trim().to_string()),
            _ => None,
        })
    }

    /// Start downloading `path` from byte `offset`. The caller reads the
    /// returned data connection to EOF, then calls [`finish_transfer`](Self::finish_transfer).
    pub async fn retrieve(&mut self, path: &str, offset: u64) -> Result<TcpStream> {
        let data = self.open_data().await?;
        if offset > 0 {
            let reply = self.command(&format!("REST {offset}")).await?;
            if reply.code != 350 {
                return Err(unexpected("REST", path, &reply));
            }
        }
        let reply = self.command(&format!("RETR {path}")).await?;
        match reply.code {
            125 | 150 => Ok(data),
            _ => Err(unexpected("RETR", path, &reply)),
        }
    }

    pub async fn finish_transfer(&mut self) -> Result<()> {
        let reply = self.read_reply().await?;
        match reply.code {
            226 | 250 => Ok(()),
            _ => Err(unexpected("transfer", "", &reply)),
        }
    }

    pub async fn quit(mut self) {
        if let Err(err) = self.command("QUIT").await {
            tracing::trace!(error = %err, "QUIT failed");
        }
    }

    async fn read_listing(&mut self, mut data: TcpStream) -> Result<String> {
        let mut raw = Vec::new();
        within(self.timeout, "reading listing", data.read_to_end(&mut raw)).await?;
        drop(data);
        self.finish_transfer().await?;
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }

    async fn open_data(&mut self) -> Result<TcpStream> {
        let reply = self.command("EPSV").await?;
        let port = match reply.code {
            229 => parse_epsv(&reply.text)?,
            _ => {
                let reply = self.command("PASV").await?;
                if reply.code != 227 {
                    return Err(unexpected("PASV", "", &reply));
                }
                parse_pasv(&reply.text)?
            },
        };
        within(self.timeout, "opening data connection", TcpStream::connect((self.peer, port))).await
    }

    async fn command(&mut self, command: &str) -> Result<Reply> {
        match command.strip_prefix("PASS ") {
            Some(_) => tracing::trace!("> PASS ****"),
            None => tracing::trace!("> {command}"),
        }
        let line = format!("{command}\r\n");
        within(self.timeout, "sending command", self.control.get_mut().write_all(line.as_bytes())).await?;
        self.read_reply().await
    }

    async fn read_reply(&mut self) -> Result<Reply> {
        let first = self.read_line().await?;
        let code = parse_code(&first)?;
        let mut text = first.get(4..).unwrap_or_default().to_string();
        if first.as_bytes().get(3) == Some(&b'-') {
            let terminator = format!("{code} ");
            loop {
                let line = self.read_line().await?;
                text.push('\n');
                if line.starts_with(&terminator) || line == code.to_string() {
                    text.push_str(line.get(4..).unwrap_or_default());
                    break;
                }
                text.push_str(&line);
            }
        }
        tracing::trace!("< {code} {text}");
        Ok(Reply { code, text })
    }

    async fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let read = within(self.timeout, "reading reply", self.control.read_line(&mut line)).await?;
        if read == 0 {
            exn::bail!(ErrorKind::Connectivity("connection closed by server".into()));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

/// Map an unexpected reply to the most useful error kind.
fn unexpected(command: &str, subject: &str, reply: &Reply) -> Error {
    let detail = format!("{command} {subject}: {} {}", reply.code, reply.text);
    Error::from(match reply.code {
        // Service closing / not logged in: the session itself is gone.
        421 | 530 => ErrorKind::Connectivity(detail),
        550 => ErrorKind::NotFound(subject.to_string()),
        _ => ErrorKind::Protocol(detail),
    })
}

fn parse_code(line: &str) -> Result<u16> {
    line.get(..3)
        .filter(|code| code.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|code| code.parse().ok())
        .ok_or_else(|| Error::from(ErrorKind::Protocol(format!("malformed reply: {line}"))))
}

/// Port from `229 Entering Extended Passive Mode (|||6446|)`.
fn parse_epsv(text: &str) -> Result<u16> {
    let inner = text
        .split_once('(')
        .and_then(|(_, rest)| rest.split_once(')'))
        .map(|(inner, _)| inner);
    inner
        .and_then(|inner| {
            let delimiter = inner.chars().next()?;
            inner.split(delimiter).nth(3)?.parse().ok()
        })
        .ok_or_else(|| Error::from(ErrorKind::Protocol(format!("malformed EPSV reply: {text}"))))
}

/// Port from `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2)`. The advertised
/// host is ignored.
fn parse_pasv(text: &str) -> Result<u16> {
    let captures = PASV_ADDRESS_REGEX
        .captures(text)
        .ok_or_else(|| Error::from(ErrorKind::Protocol(format!("malformed PASV reply: {text}"))))?;
    let octet = |i: usize| captures[i].parse::<u16>().ok().filter(|v| *v <= 255);
    match (octet(5), octet(6)) {
        (Some(high), Some(low)) => Ok(high * 256 + low),
        _ => exn::bail!(ErrorKind::Protocol(format!("malformed PASV reply: {text}"))),
    }
}
