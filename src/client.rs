//! Blocking client for the line protocol, used by viewer hosts.

use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::protocol::{
    Ack, Request, ScrollDebug, SearchParams, SearchReply, SessionReply, WindowParams, WindowReply,
};
use crate::search::Direction;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed reply: {0}")]
    Json(#[from] serde_json::Error),
    #[error("connection closed by server")]
    Closed,
    #[error("server error: {0}")]
    Remote(String),
}

pub struct Client {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Client {
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self, TransportError> {
        let writer = TcpStream::connect(addr)?;
        writer.set_nodelay(true)?;
        let reader = BufReader::new(writer.try_clone()?);
        Ok(Self { reader, writer })
    }

    fn send(&mut self, request: &Request) -> Result<(), TransportError> {
        let mut line = serde_json::to_vec(request)?;
        line.push(b'\n');
        self.writer.write_all(&line)?;
        self.writer.flush()?;
        Ok(())
    }

    fn call<T: DeserializeOwned>(&mut self, request: &Request) -> Result<T, TransportError> {
        self.send(request)?;

        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Err(TransportError::Closed);
        }
        let value: Value = serde_json::from_str(&line)?;
        if value.get("success").and_then(Value::as_bool) != Some(true) {
            let error = value
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("reply without success flag");
            return Err(TransportError::Remote(error.to_string()));
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn open_session(
        &mut self,
        session_id: &str,
        path: &Path,
    ) -> Result<SessionReply, TransportError> {
        self.call(&Request::OpenSession {
            session_id: session_id.to_string(),
            path: path.to_path_buf(),
        })
    }

    pub fn close_session(&mut self, session_id: &str) -> Result<(), TransportError> {
        self.call::<Ack>(&Request::CloseSession {
            session_id: session_id.to_string(),
        })
        .map(|_| ())
    }

    pub fn get_window(&mut self, params: WindowParams) -> Result<WindowReply, TransportError> {
        self.call(&Request::GetLogWindow(params))
    }

    pub fn search(
        &mut self,
        session_id: &str,
        keyword: &str,
        from_line: u64,
        direction: Direction,
    ) -> Result<Option<u64>, TransportError> {
        let params = SearchParams {
            session_id: session_id.to_string(),
            keyword: keyword.to_string(),
            from_line,
        };
        let request = match direction {
            Direction::Forward => Request::SearchNext(params),
            Direction::Backward => Request::SearchPrev(params),
        };
        self.call::<SearchReply>(&request).map(|reply| reply.found())
    }

    /// Telemetry only: errors are logged and swallowed.
    pub fn scroll_debug(&mut self, debug: ScrollDebug) {
        if let Err(err) = self.send(&Request::ScrollDebug(debug)) {
            log::debug!("scroll-debug not delivered: {err}");
        }
    }
}
