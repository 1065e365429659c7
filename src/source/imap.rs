//! IMAP mail source: one TLS session held across poll cycles.
//!
//! Raw IMAP over rustls; all socket I/O is blocking and runs inside
//! `spawn_blocking`. The session is moved into the blocking task and handed
//! back afterwards, so the async side never holds it across an await.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use secrecy::ExposeSecret;
use tracing::{debug, info, warn};

use crate::config::ImapConfig;
use crate::error::SourceError;
use crate::pipeline::types::Item;
use crate::source::MailSource;
use crate::source::parse::parse_message;
use crate::source::whitelist::WhitelistPolicy;

/// Error type for blocking IMAP operations.
type ImapError = Box<dyn std::error::Error + Send + Sync>;

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// Matches a trailing literal announcement such as `{1234}`.
static LITERAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(\d+)\}\r?\n?$").expect("valid literal regex"));

/// A tagged command's untagged lines and any literals that arrived with it.
#[derive(Debug, Default)]
struct Response {
    lines: Vec<String>,
    literals: Vec<Vec<u8>>,
    status: String,
}

impl Response {
    fn is_ok(&self) -> bool {
        self.status
            .split_whitespace()
            .nth(1)
            .is_some_and(|s| s.eq_ignore_ascii_case("OK"))
    }
}

/// An IMAP session over any byte stream; `open` yields the TLS one.
struct ImapSession<S = TlsStream> {
    stream: BufReader<S>,
    tag: u32,
}

impl ImapSession<TlsStream> {
    /// TCP → TLS → greeting → LOGIN → SELECT.
    fn open(config: &ImapConfig) -> Result<Self, ImapError> {
        let tcp = TcpStream::connect((config.host.as_str(), config.port))?;
        tcp.set_read_timeout(Some(config.read_timeout))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name = rustls_pki_types::ServerName::try_from(config.host.clone())?;
        let conn = rustls::ClientConnection::new(tls_config, server_name)?;

        let mut session = Self::new(rustls::StreamOwned::new(conn, tcp));

        let greeting = session.read_line()?;
        if !greeting.starts_with("* OK") && !greeting.starts_with("* PREAUTH") {
            return Err(format!("unexpected greeting: {}", greeting.trim()).into());
        }

        let login = session.command(&format!(
            "LOGIN {} {}",
            quote(&config.username),
            quote(config.password.expose_secret())
        ))?;
        if !login.is_ok() {
            return Err("IMAP login failed".into());
        }

        let select = session.command(&format!("SELECT {}", quote(&config.mailbox)))?;
        if !select.is_ok() {
            return Err(format!("SELECT {} failed: {}", config.mailbox, select.status.trim()).into());
        }

        Ok(session)
    }
}

impl<S: Read + Write> ImapSession<S> {
    fn new(stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
            tag: 0,
        }
    }

    fn read_line(&mut self) -> Result<String, ImapError> {
        let mut buf = Vec::new();
        let n = self.stream.read_until(b'\n', &mut buf)?;
        if n == 0 {
            return Err("IMAP connection closed".into());
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    fn read_exact(&mut self, len: usize) -> Result<Vec<u8>, ImapError> {
        let mut buf = vec![0u8; len];
        self.stream.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Send one tagged command and read until its tagged completion line.
    fn command(&mut self, cmd: &str) -> Result<Response, ImapError> {
        self.tag += 1;
        let tag = format!("A{}", self.tag);
        let writer = self.stream.get_mut();
        writer.write_all(format!("{tag} {cmd}\r\n").as_bytes())?;
        writer.flush()?;

        let mut response = Response::default();
        loop {
            let line = self.read_line()?;
            if line.starts_with(&format!("{tag} ")) {
                response.status = line;
                return Ok(response);
            }
            if let Some(len) = literal_len(&line) {
                let literal = self.read_exact(len)?;
                response.literals.push(literal);
            }
            response.lines.push(line);
        }
    }

    fn search_unseen(&mut self) -> Result<Vec<String>, ImapError> {
        let resp = self.command("UID SEARCH UNSEEN")?;
        if !resp.is_ok() {
            return Err(format!("SEARCH failed: {}", resp.status.trim()).into());
        }
        Ok(parse_search_response(&resp.lines))
    }

    fn fetch_rfc822(&mut self, uid: &str) -> Result<Option<Vec<u8>>, ImapError> {
        let resp = self.command(&format!("UID FETCH {uid} RFC822"))?;
        if !resp.is_ok() {
            return Err(format!("FETCH {uid} failed: {}", resp.status.trim()).into());
        }
        Ok(resp.literals.into_iter().next())
    }

    fn mark_seen(&mut self, uids: &[String]) -> Result<(), ImapError> {
        if uids.is_empty() {
            return Ok(());
        }
        let resp = self.command(&format!("UID STORE {} +FLAGS (\\Seen)", uids.join(",")))?;
        if !resp.is_ok() {
            return Err(format!("STORE failed: {}", resp.status.trim()).into());
        }
        Ok(())
    }

    fn logout(mut self) -> Result<(), ImapError> {
        self.command("LOGOUT").map(|_| ())
    }
}

/// Fetch unseen mail, filter by whitelist, mark everything examined as \Seen.
fn fetch_batch<S: Read + Write>(
    session: &mut ImapSession<S>,
    whitelist: &WhitelistPolicy,
) -> Result<Vec<Item>, ImapError> {
    let uids = session.search_unseen()?;
    if uids.is_empty() {
        debug!("No new emails found");
        return Ok(Vec::new());
    }
    info!(count = uids.len(), "Found new emails");

    let mut items = Vec::new();
    let mut examined = Vec::with_capacity(uids.len());

    for uid in uids {
        let raw = session.fetch_rfc822(&uid)?;
        examined.push(uid.clone());

        let Some(item) = raw.as_deref().and_then(|raw| parse_message(&uid, raw)) else {
            warn!(uid = %uid, "Could not parse message; skipping");
            continue;
        };

        if !whitelist.allows(&item.sender) {
            info!(uid = %uid, sender = %item.sender, "Skipping email from non-whitelisted sender");
            continue;
        }

        items.push(item);
    }

    session.mark_seen(&examined)?;
    Ok(items)
}

/// Mailbox source backed by a persistent IMAP session.
pub struct ImapSource {
    config: Arc<ImapConfig>,
    whitelist: Arc<WhitelistPolicy>,
    session: Option<ImapSession>,
}

impl ImapSource {
    pub fn new(config: ImapConfig, whitelist: WhitelistPolicy) -> Self {
        Self {
            config: Arc::new(config),
            whitelist: Arc::new(whitelist),
            session: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    fn connection_error(&self, reason: impl ToString) -> SourceError {
        SourceError::Connection {
            host: self.config.host.clone(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl MailSource for ImapSource {
    fn name(&self) -> &str {
        "imap"
    }

    async fn connect(&mut self) -> Result<(), SourceError> {
        // A stale session is replaced, not reused.
        self.session = None;

        info!(host = %self.config.host, port = self.config.port, "Connecting to IMAP server");
        let cfg = Arc::clone(&self.config);
        let session = tokio::task::spawn_blocking(move || ImapSession::open(&cfg))
            .await
            .map_err(|e| self.connection_error(format!("connect task panicked: {e}")))?
            .map_err(|e| self.connection_error(e))?;

        self.session = Some(session);
        info!(mailbox = %self.config.mailbox, "Connected to IMAP server");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), SourceError> {
        let Some(session) = self.session.take() else {
            debug!("IMAP disconnect requested with no open session");
            return Ok(());
        };

        tokio::task::spawn_blocking(move || session.logout())
            .await
            .map_err(|e| SourceError::Transport(format!("logout task panicked: {e}")))?
            .map_err(|e| SourceError::Transport(format!("logout failed: {e}")))?;

        info!("Disconnected from IMAP server");
        Ok(())
    }

    async fn fetch_new(&mut self) -> Result<Vec<Item>, SourceError> {
        let mut session = self.session.take().ok_or(SourceError::NotConnected)?;
        let whitelist = Arc::clone(&self.whitelist);

        let (session, result) = tokio::task::spawn_blocking(move || {
            let result = fetch_batch(&mut session, &whitelist);
            (session, result)
        })
        .await
        .map_err(|e| SourceError::Transport(format!("fetch task panicked: {e}")))?;

        match result {
            Ok(items) => {
                self.session = Some(session);
                Ok(items)
            }
            // The session is in an unknown protocol state; drop it.
            Err(e) => Err(SourceError::Transport(e.to_string())),
        }
    }
}

/// Quote a string as an IMAP quoted-string.
fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Size of a literal announced at the end of a response line.
fn literal_len(line: &str) -> Option<usize> {
    LITERAL_RE
        .captures(line)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Collect ids from `* SEARCH` lines.
fn parse_search_response(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .filter_map(|l| l.strip_prefix("* SEARCH"))
        .flat_map(|rest| rest.split_whitespace())
        .filter(|id| id.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
        .collect()
}
