#![allow(dead_code)]

use panelmail::network::Endpoint;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;

/// A tiny but valid PNG (1x1, transparent).
pub const PNG: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f,
    0x15, 0xc4, 0x89, 0x00, 0x00, 0x00, 0x0a, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0d, 0x0a, 0x2d, 0xb4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

pub fn endpoint(base: &str, work_dir: &Path) -> Endpoint {
    Endpoint::new(base.parse().expect("Invalid mock server URL"), work_dir)
}

/// A message accepted by [`FakeSmtp`].
#[derive(Debug, Clone, Default)]
pub struct Received {
    pub mail_from: String,
    pub rcpt_to: Vec<String>,
    pub data: String,
}

/// Minimal SMTP relay on a background thread that records every message.
///
/// Runs on plain threads so it keeps answering while a test blocks on
/// `cargo run`.
pub struct FakeSmtp {
    pub port: u16,
    received: Arc<Mutex<Vec<Received>>>,
}

impl FakeSmtp {
    pub fn start() -> Self {
        Self::spawn(false)
    }

    /// A relay that rejects every recipient.
    pub fn start_rejecting() -> Self {
        Self::spawn(true)
    }

    pub fn address(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    pub fn received(&self) -> Vec<Received> {
        self.received.lock().unwrap().clone()
    }

    fn spawn(reject_recipients: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind fake SMTP server");
        let port = listener.local_addr().unwrap().port();
        let received = Arc::new(Mutex::new(Vec::new()));

        let store = Arc::clone(&received);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let _ = handle_session(stream, &store, reject_recipients);
                });
            }
        });

        Self { port, received }
    }
}

fn handle_session(
    stream: TcpStream,
    store: &Mutex<Vec<Received>>,
    reject_recipients: bool,
) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;
    let mut current = Received::default();

    writer.write_all(b"220 localhost fake ESMTP\r\n")?;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Ok(());
        }
        let command = line.trim_end().to_ascii_uppercase();

        if command.starts_with("EHLO") || command.starts_with("HELO") {
            writer.write_all(b"250 localhost\r\n")?;
        } else if command.starts_with("MAIL FROM") {
            current = Received {
                mail_from: line.trim_end().to_string(),
                ..Received::default()
            };
            writer.write_all(b"250 OK\r\n")?;
        } else if command.starts_with("RCPT TO") {
            if reject_recipients {
                writer.write_all(b"550 No such user here\r\n")?;
            } else {
                current.rcpt_to.push(line.trim_end().to_string());
                writer.write_all(b"250 OK\r\n")?;
            }
        } else if command == "DATA" {
            writer.write_all(b"354 End data with <CR><LF>.<CR><LF>\r\n")?;
            loop {
                let mut data_line = String::new();
                if reader.read_line(&mut data_line)? == 0 {
                    return Ok(());
                }
                if data_line == ".\r\n" || data_line == ".\n" {
                    break;
                }
                current.data.push_str(&data_line);
            }
            store.lock().unwrap().push(current.clone());
            writer.write_all(b"250 OK queued\r\n")?;
        } else if command == "QUIT" {
            writer.write_all(b"221 Bye\r\n")?;
            return Ok(());
        } else if command == "RSET" || command == "NOOP" {
            writer.write_all(b"250 OK\r\n")?;
        } else {
            writer.write_all(b"502 Command not implemented\r\n")?;
        }
    }
}
