//! Writing `#pqr` metadata back into a script
//!
//! The first marker line is replaced with one freshly serialized key=value
//! line and any later marker lines are dropped. Every other line is kept
//! byte for byte in its original order. Without a marker line, the new line
//! goes after a shebang or at the top of the file.
//!
//! Field values may not contain line breaks or `;`, since either would let a
//! value spill into the next field or out of the comment into code.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::error::{LauncherError, Result, ResultExt};
use crate::scripts::{is_marker_line, ScriptHeader, MARKER};

const FORBIDDEN_VALUE_CHARS: [char; 3] = ['\n', '\r', ';'];

/// Reject field values that cannot be stored on a single marker line
pub fn validate_header(header: &ScriptHeader) -> Result<()> {
    let fields = [
        ("cat", &header.category),
        ("mac", &header.interp_mac),
        ("win", &header.interp_win),
        ("linux", &header.interp_linux),
        ("def", &header.interp_default),
    ];
    for (field, value) in fields {
        if value.contains(&FORBIDDEN_VALUE_CHARS[..]) {
            return Err(LauncherError::InvalidMetadata {
                field,
                value: value.clone(),
            });
        }
    }
    Ok(())
}

/// Serialize a header as a single key=value marker line
pub fn format_header_line(header: &ScriptHeader) -> Result<String> {
    validate_header(header)?;
    let mut line = format!(
        "{} cat={}; mac={}; win={}; linux={}; term={}",
        MARKER,
        header.category,
        header.interp_mac,
        header.interp_win,
        header.interp_linux,
        header.terminal
    );
    if !header.interp_default.is_empty() {
        line.push_str(&format!("; def={}", header.interp_default));
    }
    Ok(line)
}

/// Rewrite `content` with `header` as its only marker line
pub fn rewrite_header(content: &str, header: &ScriptHeader) -> Result<String> {
    let new_line = format_header_line(header)?;
    let segments: Vec<&str> = content.split('\n').collect();
    let crlf = segments.first().is_some_and(|s| s.ends_with('\r'));

    let mut out: Vec<String> = Vec::with_capacity(segments.len() + 1);
    let mut replaced = false;
    for segment in &segments {
        if !is_marker_line(segment) {
            out.push((*segment).to_string());
        } else if !replaced {
            let ending = if segment.ends_with('\r') { "\r" } else { "" };
            out.push(format!("{}{}", new_line, ending));
            replaced = true;
        }
    }

    if !replaced {
        let line = if crlf {
            format!("{}\r", new_line)
        } else {
            new_line
        };
        let shebang = segments
            .first()
            .is_some_and(|s| s.trim_start().starts_with("#!"));
        out.insert(usize::from(shebang), line);
    }

    Ok(out.join("\n"))
}

/// Read `path`, rewrite its metadata and write it back in place
#[instrument(skip_all, fields(path = %path.display()))]
pub fn write_header(path: &Path, header: &ScriptHeader) -> Result<()> {
    validate_header(header)?;
    let wrap = |source: io::Error| LauncherError::MetadataWrite {
        path: path.to_path_buf(),
        source: Arc::new(source),
    };

    let bytes = fs::read(path).map_err(wrap)?;
    let content = String::from_utf8(bytes)
        .map_err(|e| wrap(io::Error::new(io::ErrorKind::InvalidData, e)))?;
    let updated = rewrite_header(&content, header)?;

    let temp_path = temp_path_for(path);
    fs::write(&temp_path, &updated).map_err(wrap)?;
    let persisted = fs::metadata(path)
        .and_then(|meta| fs::set_permissions(&temp_path, meta.permissions()))
        .and_then(|()| fs::rename(&temp_path, path));
    if let Err(e) = persisted {
        fs::remove_file(&temp_path).warn_on_err();
        return Err(wrap(e));
    }

    info!(category = %header.category, terminal = header.terminal, "Wrote script metadata");
    Ok(())
}

/// Hidden sibling so the rename stays on one filesystem
fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp", name))
}
