//! `.retry` bookkeeping: out of scope per spec.md §1, kept minimal. A
//! failed invocation writes the spec paths that failed to `.retry` in
//! the current directory; `--retry` reads them back instead of the
//! positional spec arguments.

use std::io::Write;
use std::path::PathBuf;

const RETRY_FILE: &str = ".retry";

pub fn read() -> anyhow::Result<Vec<PathBuf>> {
    let content = std::fs::read_to_string(RETRY_FILE)
        .map_err(|err| anyhow::anyhow!("no {RETRY_FILE} to read ({err})"))?;
    Ok(content.lines().filter(|l| !l.trim().is_empty()).map(PathBuf::from).collect())
}

pub fn write(failed: &[PathBuf]) -> anyhow::Result<()> {
    if failed.is_empty() {
        let _ = std::fs::remove_file(RETRY_FILE);
        return Ok(());
    }
    let mut file = std::fs::File::create(RETRY_FILE)?;
    for path in failed {
        writeln!(file, "{}", path.display())?;
    }
    Ok(())
}
