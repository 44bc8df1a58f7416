//! Line-based terminal prompts.

use anyhow::{Context, Result};
use std::io::{self, Write};

/// Ask for a value, returning `default` when the answer is empty.
pub fn input(label: &str, hint: &str, default: &str) -> Result<String> {
    if !hint.is_empty() {
        println!("{}", hint);
    }
    if default.is_empty() {
        print!("{}: ", label);
    } else {
        print!("{} [{}]: ", label, default);
    }
    io::stdout().flush()?;

    let answer = read_line()?;
    if answer.is_empty() {
        Ok(default.to_string())
    } else {
        Ok(answer)
    }
}

/// Ask a yes/no question. Anything but `y` or `yes` is a no.
pub fn confirm(question: &str) -> Result<bool> {
    print!("{} [y/N]: ", question);
    io::stdout().flush()?;

    let answer = read_line()?.to_lowercase();
    Ok(answer == "y" || answer == "yes")
}

fn read_line() -> Result<String> {
    let mut line = String::new();
    io::stdin()
        .read_line(&mut line)
        .context("failed to read from stdin")?;
    Ok(line.trim().to_string())
}
