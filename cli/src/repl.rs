//! Blocking line-editor front-end for the interactive REPL (spec.md §6).

use std::io::{self, Write};

/// Prints the prompt and blocks for one line of input.
pub fn readline() -> Result<String, String> {
    print!("logfathom> ");
    io::stdout().flush().map_err(|e| e.to_string())?;

    let mut buf = String::new();
    let bytes = io::stdin().read_line(&mut buf).map_err(|e| e.to_string())?;
    if bytes == 0 {
        return Ok("quit".to_string());
    }
    Ok(buf)
}
