use std::io::{self, BufRead};

/// Reads command lines from the terminal, a pipe or a script file.
pub struct LineReader {
    source: Box<dyn BufRead>,
    buf: Vec<u8>,
}

impl LineReader {
    pub fn new(source: Box<dyn BufRead>) -> Self {
        Self {
            source,
            buf: Vec::new(),
        }
    }

    /// Returns the next line without its terminator, or `None` at end of
    /// input. A last line without a newline is still returned.
    pub fn read_line(&mut self) -> io::Result<Option<String>> {
        self.buf.clear();
        loop {
            match self.source.read_until(b'\n', &mut self.buf) {
                Ok(0) if self.buf.is_empty() => return Ok(None),
                Ok(_) => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
        }
        Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
    }
}
