//! In-memory transport for codec tests.

use std::io::{self, Cursor, Read, Write};
use std::time::Duration;

use crate::Transport;

/// Feeds scripted input bytes and captures everything written.
pub struct MockTransport {
    input: Cursor<Vec<u8>>,
    output: Vec<u8>,
}

impl MockTransport {
    pub fn new(input: &[u8]) -> Self {
        Self {
            input: Cursor::new(input.to_vec()),
            output: Vec::new(),
        }
    }

    pub fn written(&self) -> Vec<u8> {
        self.output.clone()
    }
}

impl Read for MockTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.input.read(buf)
    }
}

impl Write for MockTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.output.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for MockTransport {
    fn set_read_timeout(&mut self, _timeout: Option<Duration>) -> io::Result<()> {
        Ok(())
    }
}
