//! Event-socket client
//!
//! Inbound connection to the call engine's command socket: the engine
//! greets with `auth/request`, the client answers `auth <password>`, then
//! each `api <command>` is answered by an `api/response` frame whose body
//! length is given by `Content-Length`.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

use super::command::{is_success, CommandOutcome, EngineCommand};
use super::errors::{EngineError, EngineResult};
use super::{CallEngine, EngineFuture};

const CONNECT_ATTEMPTS: u32 = 3;

/// Command socket of one node's call engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineEndpoint {
    pub nodeid: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_password")]
    pub password: String,
}

fn default_port() -> u16 {
    8021
}

fn default_password() -> String {
    "ClueCon".to_string()
}

impl EngineEndpoint {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Command-socket client; one connection per command run
#[derive(Debug, Clone)]
pub struct EslClient {
    endpoint: EngineEndpoint,
    retry_delay: Duration,
    io_timeout: Duration,
}

impl EslClient {
    pub fn new(endpoint: EngineEndpoint) -> Self {
        Self {
            endpoint,
            retry_delay: Duration::from_secs(5),
            io_timeout: Duration::from_secs(10),
        }
    }

    /// Pause between failed connection attempts
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn endpoint(&self) -> &EngineEndpoint {
        &self.endpoint
    }

    async fn connect(&self) -> EngineResult<Connection> {
        let address = self.endpoint.address();
        let mut reason = String::new();
        for attempt in 1..=CONNECT_ATTEMPTS {
            match timeout(self.io_timeout, TcpStream::connect(&address)).await {
                Ok(Ok(stream)) => {
                    let mut connection = Connection {
                        stream: BufReader::new(stream),
                        io_timeout: self.io_timeout,
                    };
                    connection.authenticate(&self.endpoint.password).await?;
                    return Ok(connection);
                }
                Ok(Err(e)) => reason = e.to_string(),
                Err(_) => reason = "connect timed out".to_string(),
            }
            if attempt < CONNECT_ATTEMPTS {
                sleep(self.retry_delay).await;
            }
        }
        Err(EngineError::Unreachable { address, reason })
    }

    async fn run_all(&self, commands: &[EngineCommand]) -> EngineResult<Vec<CommandOutcome>> {
        let mut connection = self.connect().await?;
        let mut outcomes = Vec::with_capacity(commands.len());
        for command in commands {
            let reply = connection.api(&command.to_string()).await?;
            outcomes.push(CommandOutcome {
                success: is_success(&reply),
                command: command.clone(),
                reply: reply.trim().to_string(),
            });
        }
        connection.close().await;
        Ok(outcomes)
    }
}

impl CallEngine for EslClient {
    fn run<'a>(&'a self, commands: &'a [EngineCommand]) -> EngineFuture<'a> {
        Box::pin(self.run_all(commands))
    }
}

struct Frame {
    headers: BTreeMap<String, String>,
    body: String,
}

impl Frame {
    fn content_type(&self) -> &str {
        self.headers.get("Content-Type").map(String::as_str).unwrap_or("")
    }

    fn reply_text(&self) -> &str {
        self.headers.get("Reply-Text").map(String::as_str).unwrap_or("")
    }
}

struct Connection {
    stream: BufReader<TcpStream>,
    io_timeout: Duration,
}

impl Connection {
    async fn authenticate(&mut self, password: &str) -> EngineResult<()> {
        let greeting = self.read_frame().await?;
        if greeting.content_type() != "auth/request" {
            return Err(EngineError::protocol(format!(
                "expected auth/request, got '{}'",
                greeting.content_type()
            )));
        }
        self.send(&format!("auth {}", password)).await?;
        let reply = self.read_frame().await?;
        if !reply.reply_text().starts_with("+OK") {
            return Err(EngineError::AuthRejected(reply.reply_text().to_string()));
        }
        Ok(())
    }

    async fn api(&mut self, command: &str) -> EngineResult<String> {
        self.send(&format!("api {}", command)).await?;
        loop {
            let frame = self.read_frame().await?;
            if frame.content_type() == "api/response" {
                return Ok(frame.body);
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.send("exit").await;
    }

    async fn send(&mut self, line: &str) -> EngineResult<()> {
        let wire = format!("{}\n\n", line);
        timeout(self.io_timeout, self.stream.write_all(wire.as_bytes()))
            .await
            .map_err(|_| EngineError::Timeout("write".into()))?
            .map_err(|e| EngineError::protocol(format!("write error: {}", e)))
    }

    async fn read_frame(&mut self) -> EngineResult<Frame> {
        timeout(self.io_timeout, self.read_frame_inner())
            .await
            .map_err(|_| EngineError::Timeout("read".into()))?
    }

    async fn read_frame_inner(&mut self) -> EngineResult<Frame> {
        let mut headers = BTreeMap::new();
        loop {
            let mut line = String::new();
            let n = self
                .stream
                .read_line(&mut line)
                .await
                .map_err(|e| EngineError::protocol(format!("read error: {}", e)))?;
            if n == 0 {
                return Err(EngineError::protocol("connection closed"));
            }
            let line = line.trim_end_matches(&['\r', '\n'][..]);
            if line.is_empty() {
                if headers.is_empty() {
                    continue;
                }
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                headers.insert(name.trim().to_string(), value.trim().to_string());
            }
        }

        let body = match headers.get("Content-Length") {
            Some(len) => {
                let len: usize = len
                    .parse()
                    .map_err(|_| EngineError::protocol(format!("bad Content-Length '{}'", len)))?;
                let mut buf = vec![0u8; len];
                self.stream
                    .read_exact(&mut buf)
                    .await
                    .map_err(|e| EngineError::protocol(format!("read error: {}", e)))?;
                String::from_utf8_lossy(&buf).into_owned()
            }
            None => String::new(),
        };
        Ok(Frame { headers, body })
    }
}
