//! Line-delimited JSON over TCP, one thread per connection.

use std::io::{self, BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use crate::service::LogWindowService;

pub struct Server {
    listener: TcpListener,
    service: Arc<LogWindowService>,
}

impl Server {
    pub fn bind(service: LogWindowService) -> io::Result<Self> {
        let listener = TcpListener::bind(&service.config().listen_addr)?;
        Ok(Self {
            listener,
            service: Arc::new(service),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until the listener fails.
    pub fn run(self) -> io::Result<()> {
        let _reaper = spawn_reaper(&self.service);
        log::info!("listening on {}", self.listener.local_addr()?);

        for stream in self.listener.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(err) => {
                    log::warn!("accept failed: {err}");
                    continue;
                }
            };
            let service = Arc::clone(&self.service);
            thread::spawn(move || {
                let peer = stream
                    .peer_addr()
                    .map_or_else(|_| "unknown".to_string(), |addr| addr.to_string());
                log::debug!("connection from {peer}");
                if let Err(err) = serve_connection(stream, &service) {
                    log::warn!("connection {peer} ended with error: {err}");
                }
            });
        }
        Ok(())
    }

    /// Runs the accept loop on a background thread.
    pub fn spawn(self) -> io::Result<(SocketAddr, thread::JoinHandle<io::Result<()>>)> {
        let addr = self.local_addr()?;
        Ok((addr, thread::spawn(move || self.run())))
    }
}

fn serve_connection(stream: TcpStream, service: &LogWindowService) -> io::Result<()> {
    let mut writer = stream.try_clone()?;
    let reader = BufReader::new(stream);

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if let Some(reply) = service.handle_line(&line) {
            writer.write_all(reply.as_bytes())?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }
    }
    Ok(())
}

/// Periodically expires idle sessions. The returned sender stops the thread
/// when dropped.
fn spawn_reaper(service: &Arc<LogWindowService>) -> Option<mpsc::Sender<()>> {
    let timeout = service.config().session_idle_timeout()?;
    let tick = (timeout / 2).max(Duration::from_secs(1));
    let weak = Arc::downgrade(service);
    let (stop, stopped) = mpsc::channel::<()>();

    thread::spawn(move || {
        while let Err(mpsc::RecvTimeoutError::Timeout) = stopped.recv_timeout(tick) {
            let Some(service) = weak.upgrade() else {
                break;
            };
            let reaped = service.reap_idle(Instant::now());
            if reaped > 0 {
                log::info!("expired {reaped} idle sessions");
            }
        }
    });
    Some(stop)
}
