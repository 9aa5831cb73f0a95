//! The line-input seam. The core only needs something that hands it
//! complete lines and reports EOF; a richer line editor can slot in
//! behind the same trait without the core noticing.

use std::io::{self, BufRead, Write};

pub trait LineInput {
    /// Show the prompt and read one line. `Ok(None)` is end of input
    /// (Ctrl+D on an empty line).
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>>;
}

/// Plain blocking reader on the shell's stdin.
pub struct StdinInput;

impl LineInput for StdinInput {
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        print!("{prompt}");
        io::stdout().flush()?;

        let mut buf = String::new();
        let bytes_read = io::stdin().lock().read_line(&mut buf)?;
        if bytes_read == 0 {
            // EOF: move past the prompt before the shell exits.
            println!();
            return Ok(None);
        }
        if buf.ends_with('\n') {
            buf.pop();
        }
        Ok(Some(buf))
    }
}
