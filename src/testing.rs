//! In-memory instrument stand-ins shared by the unit tests.

use std::collections::VecDeque;
use std::io::{self, Read, Write};

/// Duplex stream that replays scripted instrument output and records what was written.
///
/// Each chunk is handed out by separate `read` calls, which lets tests control what a
/// buffered reader can see at a given moment.
#[derive(Debug, Default)]
pub struct ScriptedStream {
    chunks: VecDeque<Vec<u8>>,
    written: Vec<u8>,
    writes_before_failure: Option<usize>,
}

impl ScriptedStream {
    pub fn new(output: &[u8]) -> Self {
        Self::with_chunks(vec![output.to_vec()])
    }

    pub fn with_chunks(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            chunks: chunks.into_iter().filter(|c| !c.is_empty()).collect(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn fail_writes(self) -> Self {
        self.fail_writes_after(0)
    }

    /// Accept `writes` write calls, then fail every one after that.
    #[must_use]
    pub fn fail_writes_after(mut self, writes: usize) -> Self {
        self.writes_before_failure = Some(writes);
        self
    }

    pub fn written(&self) -> &[u8] {
        &self.written
    }

    pub fn written_lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.written)
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl Read for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(chunk) = self.chunks.front_mut() else {
            return Ok(0);
        };
        let n = buf.len().min(chunk.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        chunk.drain(..n);
        if chunk.is_empty() {
            self.chunks.pop_front();
        }
        Ok(n)
    }
}

impl Write for ScriptedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(left) = &mut self.writes_before_failure {
            if *left == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "connection reset by peer",
                ));
            }
            *left -= 1;
        }
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
