use crate::block_decoder::{decode_block, BinaryBlock, BlockError};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Screenshot request: colour on, invert off, PNG.
pub const SCREENSHOT_COMMAND: &str = ":DISP:DATA? ON,FALSE,PNG";

/// Resets the instrument's running measurement statistics.
pub const CLEAR_STATS_COMMAND: &str = ":MEAS:STAT:RES";

const TERMINATOR: u8 = b'\n';

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection closed by instrument after {received} bytes without a line terminator")]
    ConnectionClosed { received: usize },

    #[error("UTF-8 conversion error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Block decode error: {0}")]
    Block(#[from] BlockError),
}

impl LinkError {
    /// Failures that leave the connection unusable.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Block(_))
    }
}

/// Line-oriented SCPI connection to one instrument.
///
/// All reads go through a single buffered reader, so bytes buffered during a line read are
/// still there for the next block read and vice versa.
#[derive(Debug)]
pub struct InstrumentLink<S: Read + Write> {
    stream: BufReader<S>,
    stray_terminator: bool,
}

impl InstrumentLink<TcpStream> {
    /// Connect to `host:port`. `timeout` applies to every socket read and write; `None` blocks
    /// indefinitely.
    pub fn connect(host: &str, port: u16, timeout: Option<Duration>) -> Result<Self, LinkError> {
        log::debug!("Connecting to instrument at {}:{}", host, port);
        let mut last_error = None;
        for addr in (host, port).to_socket_addrs()? {
            match TcpStream::connect(addr) {
                Ok(stream) => {
                    stream.set_read_timeout(timeout)?;
                    stream.set_write_timeout(timeout)?;
                    stream.set_nodelay(true)?;
                    log::info!("Connected to instrument at {}", addr);
                    return Ok(Self::new(stream));
                }
                Err(e) => {
                    log::debug!("Connection to {} failed: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{host}:{port} resolved to no addresses"),
                )
            })
            .into())
    }
}

impl<S: Read + Write> InstrumentLink<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
            stray_terminator: false,
        }
    }

    /// Send `query` and block until one response line arrives. The terminator is stripped.
    pub fn exchange(&mut self, query: &str) -> Result<String, LinkError> {
        self.write_line(query)?;

        let mut line = self.read_line()?;
        if std::mem::take(&mut self.stray_terminator) && line.is_empty() {
            log::debug!("Skipping block terminator left from previous screenshot");
            line = self.read_line()?;
        }
        Ok(line)
    }

    /// Send a command that has no response.
    pub fn send_command(&mut self, command: &str) -> Result<(), LinkError> {
        self.write_line(command)
    }

    /// Request a screenshot and decode the returned block.
    ///
    /// Write failures are connection errors; anything that goes wrong while reading the block
    /// is returned as [`LinkError::Block`].
    pub fn fetch_block(&mut self) -> Result<BinaryBlock, LinkError> {
        self.write_line(SCREENSHOT_COMMAND)?;
        if std::mem::take(&mut self.stray_terminator) {
            self.skip_pending_terminator().map_err(BlockError::Io)?;
        }
        match decode_block(&mut self.stream) {
            Ok(block) => {
                log::debug!("Received block of {} bytes", block.len());
                self.discard_block_terminator();
                Ok(block)
            }
            Err(e) => {
                self.discard_buffered_line();
                Err(e.into())
            }
        }
    }

    /// Give back the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream.into_inner()
    }

    pub fn get_ref(&self) -> &S {
        self.stream.get_ref()
    }

    fn write_line(&mut self, text: &str) -> Result<(), LinkError> {
        log::trace!("-> {}", text);
        let stream = self.stream.get_mut();
        let mut line = Vec::with_capacity(text.len() + 1);
        line.extend_from_slice(text.as_bytes());
        line.push(TERMINATOR);
        stream.write_all(&line)?;
        stream.flush()?;
        Ok(())
    }

    fn read_line(&mut self) -> Result<String, LinkError> {
        let mut response = Vec::new();
        self.stream.read_until(TERMINATOR, &mut response)?;

        if response.last() != Some(&TERMINATOR) {
            return Err(LinkError::ConnectionClosed {
                received: response.len(),
            });
        }
        response.pop();
        if response.last() == Some(&b'\r') {
            response.pop();
        }

        let line = String::from_utf8(response)?;
        log::trace!("<- {}", line);
        Ok(line)
    }

    /// Drop whatever is left of a reply that was not a block, as far as it has been buffered.
    fn discard_buffered_line(&mut self) {
        let buffered = self.stream.buffer();
        let n = buffered
            .iter()
            .position(|&b| b == TERMINATOR)
            .map_or(buffered.len(), |i| i + 1);
        self.stream.consume(n);
    }

    /// Consume the newline owed by the previous block, waiting for it if necessary.
    fn skip_pending_terminator(&mut self) -> std::io::Result<()> {
        if self.stream.fill_buf()?.first() == Some(&TERMINATOR) {
            log::debug!("Skipping block terminator left from previous screenshot");
            self.stream.consume(1);
        }
        Ok(())
    }

    /// The instrument follows a block with a newline. Drop it now if it already arrived,
    /// otherwise remember to skip it in front of the next response.
    fn discard_block_terminator(&mut self) {
        match self.stream.buffer().first() {
            Some(&TERMINATOR) => self.stream.consume(1),
            Some(_) => {}
            None => self.stray_terminator = true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedStream;

    #[test]
    fn test_exchange_writes_terminated_query() {
        let mut link = InstrumentLink::new(ScriptedStream::new(b"VOLT;1.25e-01\n"));
        let response = link.exchange(":CHAN1:UNIT?;:MEAS:ITEM? VAVG,CHAN1").unwrap();

        assert_eq!(response, "VOLT;1.25e-01");
        assert_eq!(
            link.get_ref().written(),
            b":CHAN1:UNIT?;:MEAS:ITEM? VAVG,CHAN1\n"
        );
    }

    #[test]
    fn test_exchange_reads_one_line_at_a_time() {
        let mut link = InstrumentLink::new(ScriptedStream::new(b"first\r\nsecond\n"));
        assert_eq!(link.exchange("A?").unwrap(), "first");
        assert_eq!(link.exchange("B?").unwrap(), "second");
    }

    #[test]
    fn test_exchange_fails_on_eof_before_terminator() {
        let mut link = InstrumentLink::new(ScriptedStream::new(b"VOLT;1.0"));
        let err = link.exchange("A?").unwrap_err();
        assert!(matches!(err, LinkError::ConnectionClosed { received: 8 }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_exchange_fails_on_write_error() {
        let mut link = InstrumentLink::new(ScriptedStream::new(b"ok\n").fail_writes());
        assert!(matches!(link.exchange("A?"), Err(LinkError::Io(_))));
    }

    #[test]
    fn test_send_command_expects_no_response() {
        let mut link = InstrumentLink::new(ScriptedStream::new(b""));
        link.send_command(CLEAR_STATS_COMMAND).unwrap();
        assert_eq!(link.get_ref().written(), b":MEAS:STAT:RES\n");
    }

    #[test]
    fn test_fetch_block_then_exchange() {
        let mut input = b"#18\x89PNG\n\x1a\n\x00\n".to_vec();
        input.extend_from_slice(b"VOLT\n");
        let mut link = InstrumentLink::new(ScriptedStream::new(&input));

        let block = link.fetch_block().unwrap();
        assert_eq!(block.as_bytes(), b"\x89PNG\n\x1a\n\x00");
        assert_eq!(link.exchange(":CHAN1:UNIT?").unwrap(), "VOLT");
        assert_eq!(
            link.get_ref().written(),
            b":DISP:DATA? ON,FALSE,PNG\n:CHAN1:UNIT?\n"
        );
    }

    #[test]
    fn test_late_block_terminator_is_skipped() {
        // Block and terminator arrive in separate reads.
        let stream = ScriptedStream::with_chunks(vec![b"#13abc".to_vec(), b"\nVOLT\n".to_vec()]);
        let mut link = InstrumentLink::new(stream);

        assert_eq!(link.fetch_block().unwrap().as_bytes(), b"abc");
        assert_eq!(link.exchange(":CHAN1:UNIT?").unwrap(), "VOLT");
    }

    #[test]
    fn test_late_block_terminator_before_next_block() {
        let stream = ScriptedStream::with_chunks(vec![
            b"#13abc".to_vec(),
            b"\n#13def\nVOLT\n".to_vec(),
        ]);
        let mut link = InstrumentLink::new(stream);

        assert_eq!(link.fetch_block().unwrap().as_bytes(), b"abc");
        assert_eq!(link.fetch_block().unwrap().as_bytes(), b"def");
        assert_eq!(link.exchange(":CHAN1:UNIT?").unwrap(), "VOLT");
    }

    #[test]
    fn test_truncated_block_then_closed_connection() {
        let mut link = InstrumentLink::new(ScriptedStream::new(b"#210abc"));

        let err = link.fetch_block().unwrap_err();
        assert!(matches!(
            err,
            LinkError::Block(BlockError::Truncated {
                part: "payload",
                expected: 10,
                received: 3
            })
        ));
        assert!(!err.is_fatal());

        let err = link.exchange(":CHAN1:UNIT?").unwrap_err();
        assert!(matches!(err, LinkError::ConnectionClosed { received: 0 }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_bad_block_is_not_fatal() {
        let mut link = InstrumentLink::new(ScriptedStream::new(b"ERR\n"));
        let err = link.fetch_block().unwrap_err();
        assert!(matches!(
            err,
            LinkError::Block(BlockError::MissingMarker { found: b'E' })
        ));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_link_usable_after_bad_block() {
        let mut link = InstrumentLink::new(ScriptedStream::new(b"ERR: no image\nVOLT\n"));
        assert!(link.fetch_block().is_err());
        assert_eq!(link.exchange(":CHAN1:UNIT?").unwrap(), "VOLT");
    }
}
