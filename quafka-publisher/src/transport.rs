//! Duplex line transport beneath a connection.

use async_trait::async_trait;
use quafka_core::{config::ConnectionConfig, Error, Result};
use std::{fmt, time::Duration};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    time::timeout,
};
use tracing::debug;

/// An open request/response channel.
#[async_trait]
pub trait LineChannel: Send + fmt::Debug {
    /// Write `line` plus terminator and read one response line.
    ///
    /// The response ends at `\n` or at end of stream; a stream that ends before
    /// any byte arrives is an error.
    async fn round_trip(&mut self, line: &str) -> Result<String>;

    /// Close the channel.
    async fn shutdown(&mut self) -> Result<()>;
}

/// Opens [`LineChannel`]s.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Open a channel to the endpoint in `config`, bounded by `config.timeout`.
    async fn open(&self, config: &ConnectionConfig) -> Result<Box<dyn LineChannel>>;
}

/// TCP [`Transport`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransport;

#[async_trait]
impl Transport for TcpTransport {
    async fn open(&self, config: &ConnectionConfig) -> Result<Box<dyn LineChannel>> {
        let address = config.address();
        let stream = timeout(config.timeout, TcpStream::connect(&address))
            .await
            .map_err(|e| {
                Error::timeout(format!("connect to {address} timed out after {:?}", config.timeout))
                    .with_source(e)
            })?
            .map_err(|e| Error::network(format!("connect to {address} failed: {e}")).with_source(e))?;
        stream.set_nodelay(true)?;

        debug!("Opened TCP channel to {}", address);
        let (reader, writer) = stream.into_split();
        Ok(Box::new(TcpLineChannel {
            reader: BufReader::new(reader),
            writer,
            response_timeout: config.timeout,
        }))
    }
}

struct TcpLineChannel {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    response_timeout: Duration,
}

impl fmt::Debug for TcpLineChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpLineChannel")
            .field("peer", &self.writer.peer_addr().ok())
            .field("response_timeout", &self.response_timeout)
            .finish()
    }
}

#[async_trait]
impl LineChannel for TcpLineChannel {
    async fn round_trip(&mut self, line: &str) -> Result<String> {
        let mut request = String::with_capacity(line.len() + 1);
        request.push_str(line);
        request.push('\n');
        self.writer.write_all(request.as_bytes()).await?;
        self.writer.flush().await?;

        let mut buf = Vec::with_capacity(128);
        let read = timeout(self.response_timeout, self.reader.read_until(b'\n', &mut buf))
            .await
            .map_err(|e| {
                Error::timeout(format!("no response within {:?}", self.response_timeout))
                    .with_source(e)
            })??;
        if read == 0 {
            return Err(Error::network("connection closed by peer"));
        }

        let response = String::from_utf8_lossy(&buf);
        Ok(response.trim_end_matches(['\r', '\n']).to_string())
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}
