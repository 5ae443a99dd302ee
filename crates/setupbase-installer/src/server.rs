use std::io::{BufRead, BufReader, Write};
use std::net::{Ipv4Addr, TcpListener, TcpStream};

use anyhow::{Context, Result};
use setupbase_core::SetupError;

pub fn parse_server_port(value: &str) -> Result<u16> {
    match value.trim().parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(SetupError::InvalidServerPort {
            value: value.to_string(),
        }
        .into()),
    }
}

/// Loopback endpoint of the privileged helper process.
///
/// Connections are handled one at a time. When an authorization key is set, the
/// first line of every connection must match it. `shutdown` ends [`FsServer::serve`].
#[derive(Debug)]
pub struct FsServer {
    listener: TcpListener,
    authorization_key: Option<String>,
}

enum ConnectionOutcome {
    Continue,
    Shutdown,
}

impl FsServer {
    pub fn bind(port: u16) -> Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port))
            .with_context(|| format!("failed to bind server to 127.0.0.1:{port}"))?;
        Ok(Self {
            listener,
            authorization_key: None,
        })
    }

    pub fn set_authorization_key(&mut self, key: impl Into<String>) {
        self.authorization_key = Some(key.into());
    }

    pub fn local_port(&self) -> Result<u16> {
        Ok(self
            .listener
            .local_addr()
            .context("failed to read server address")?
            .port())
    }

    /// Runs until a client asks for shutdown.
    pub fn serve(self) -> Result<()> {
        tracing::debug!(port = ?self.local_port().ok(), "server listening");
        for stream in self.listener.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(err) => {
                    tracing::warn!(error = %err, "failed to accept connection");
                    continue;
                }
            };
            match self.handle_connection(stream) {
                Ok(ConnectionOutcome::Shutdown) => break,
                Ok(ConnectionOutcome::Continue) => {}
                Err(err) => tracing::warn!(error = %format!("{err:#}"), "connection failed"),
            }
        }
        tracing::debug!("server finished");
        Ok(())
    }

    fn handle_connection(&self, stream: TcpStream) -> Result<ConnectionOutcome> {
        let mut writer = stream.try_clone().context("failed to clone connection")?;
        let mut lines = BufReader::new(stream).lines();

        if let Some(expected) = &self.authorization_key {
            let presented = lines.next().transpose().context("failed to read key")?;
            if presented.as_deref().map(str::trim) != Some(expected.as_str()) {
                tracing::warn!("rejected connection with wrong authorization key");
                return Ok(ConnectionOutcome::Continue);
            }
        }

        for line in lines {
            let line = line.context("failed to read request")?;
            match line.trim() {
                "" => {}
                "ping" => writeln!(writer, "pong").context("failed to write reply")?,
                "shutdown" => {
                    writeln!(writer, "bye").context("failed to write reply")?;
                    return Ok(ConnectionOutcome::Shutdown);
                }
                other => writeln!(writer, "error unknown command {other}")
                    .context("failed to write reply")?,
            }
        }
        Ok(ConnectionOutcome::Continue)
    }
}
