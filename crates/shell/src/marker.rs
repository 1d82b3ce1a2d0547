//! High-entropy prompt sentinel (§9 design note: "a marker unlikely to
//! collide with user output").

use uuid::Uuid;

/// A fresh marker string, unique per session. Wrapped in newlines when
/// installed as `PS1` so it always appears on a line of its own.
pub fn generate() -> String {
    format!("SHELLINSPECTOR-{}", Uuid::now_v7().simple())
}

/// Locate `\n<marker>\n` in `buf`, returning the byte range of the whole
/// match (including both newlines) if present.
pub fn find(buf: &[u8], marker: &str) -> Option<std::ops::Range<usize>> {
    let needle = format!("\n{marker}\n");
    let needle = needle.as_bytes();
    buf.windows(needle.len())
        .position(|w| w == needle)
        .map(|start| start..start + needle.len())
}
