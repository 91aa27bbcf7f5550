use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::RunnerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    fn label(self) -> &'static str {
        match self {
            OutputStream::Stdout => "stdout",
            OutputStream::Stderr => "stderr",
        }
    }
}

#[derive(Debug)]
pub struct OutputChunk {
    pub text: String,
    pub stream: OutputStream,
}

/// Forwards everything read from `rd` as text chunks, in arrival order.
///
/// Chunks are emitted per read, never re-assembled into lines. A UTF-8 sequence
/// cut by a read boundary is carried over to the next chunk; bytes that can
/// never form valid UTF-8 are replaced.
pub fn pump_chunks<R>(
    mut rd: R,
    stream: OutputStream,
    tx: mpsc::Sender<OutputChunk>,
) -> JoinHandle<Result<u64, RunnerError>>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; 16 * 1024];
        let mut carry: Vec<u8> = Vec::new();
        let mut total = 0u64;

        loop {
            let n = rd.read(&mut buf).await.map_err(|e| RunnerError::StreamIo {
                stream: stream.label(),
                source: e,
            })?;
            if n == 0 {
                break;
            }
            total += n as u64;

            carry.extend_from_slice(&buf[..n]);
            let text = take_utf8_prefix(&mut carry);
            if !text.is_empty() && tx.send(OutputChunk { text, stream }).await.is_err() {
                // Receiver gone; keep draining so the child never blocks on a full pipe.
                continue;
            }
        }

        if !carry.is_empty() {
            let text = String::from_utf8_lossy(&carry).into_owned();
            let _ = tx.send(OutputChunk { text, stream }).await;
        }

        Ok(total)
    })
}

/// Removes and returns the longest decodable prefix of `carry`, leaving an
/// incomplete trailing sequence (at most 3 bytes) in place.
fn take_utf8_prefix(carry: &mut Vec<u8>) -> String {
    let mut out = String::new();
    loop {
        match std::str::from_utf8(carry) {
            Ok(s) => {
                out.push_str(s);
                carry.clear();
                return out;
            }
            Err(e) => {
                let valid = e.valid_up_to();
                out.push_str(std::str::from_utf8(&carry[..valid]).unwrap_or_default());
                match e.error_len() {
                    Some(bad) => {
                        out.push(char::REPLACEMENT_CHARACTER);
                        carry.drain(..valid + bad);
                    }
                    None => {
                        carry.drain(..valid);
                        return out;
                    }
                }
            }
        }
    }
}
