//! # Balda Text Client
//!
//! A thin terminal client for the balda server. It does not interpret the
//! game at all: every line typed on stdin is sent to the server, and every
//! line the server writes is printed. This is the same experience a telnet
//! session gives, minus the option negotiation noise.
//!
//! ## Behaviour
//!
//! - Server lines are printed as they arrive, with the `\r\n` terminator
//!   replaced by the local newline.
//! - Input lines are sent terminated with `\r\n`.
//! - When stdin closes, the client keeps printing until the server hangs up.
//! - When the server hangs up, the client stops immediately.

use log::{debug, info};
use shared::{strip_line_ending, LINE_ENDING};
use std::io;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// Connects to `addr` and relays stdin/stdout until the server closes.
pub async fn run(addr: &str) -> io::Result<()> {
    let stream = TcpStream::connect(addr).await?;
    info!("Connected to {}", addr);
    let (reader, writer) = stream.into_split();
    relay(reader, writer, tokio::io::stdin(), tokio::io::stdout()).await
}

/// Copies lines both ways between a server connection and a terminal.
pub async fn relay<SR, SW, I, O>(
    server_reader: SR,
    mut server_writer: SW,
    input: I,
    mut output: O,
) -> io::Result<()>
where
    SR: AsyncRead + Unpin,
    SW: AsyncWrite + Unpin,
    I: AsyncRead + Unpin,
    O: AsyncWrite + Unpin,
{
    let mut server_lines = BufReader::new(server_reader).lines();
    let mut input_lines = BufReader::new(input).lines();
    let mut input_open = true;

    loop {
        tokio::select! {
            line = server_lines.next_line() => match line? {
                Some(line) => {
                    output.write_all(strip_line_ending(&line).as_bytes()).await?;
                    output.write_all(b"\n").await?;
                    output.flush().await?;
                }
                None => {
                    info!("Server closed the connection");
                    break;
                }
            },
            line = input_lines.next_line(), if input_open => match line? {
                Some(line) => {
                    debug!("Sending '{}'", line);
                    server_writer.write_all(line.as_bytes()).await?;
                    server_writer.write_all(LINE_ENDING.as_bytes()).await?;
                    server_writer.flush().await?;
                }
                None => {
                    debug!("Input closed");
                    input_open = false;
                }
            },
        }
    }
    Ok(())
}
