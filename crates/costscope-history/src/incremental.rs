//! Byte-offset incremental file reads.

use costscope_core::error::CoreError;
use std::fs::File;
use std::borrow::Cow;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// New complete lines appended since the previous offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta {
    /// Decoded text, ending at the last newline read
    pub text: String,
    /// Offset to resume from on the next read
    pub next_offset: u64,
    /// The file was shorter than the stored offset and was re-read from 0
    pub truncated: bool,
    start: u64,
    raw: Vec<u8>,
}

impl Delta {
    /// Each complete line (without its `\n`) with the file offset just
    /// past it, so a consumer can stop mid-delta and resume exactly there.
    pub fn lines(&self) -> impl Iterator<Item = (Cow<'_, str>, u64)> + '_ {
        let mut end = self.start;
        self.raw.split_inclusive(|b| *b == b'\n').map(move |line| {
            end += line.len() as u64;
            let body = line.strip_suffix(b"\n").unwrap_or(line);
            (String::from_utf8_lossy(body), end)
        })
    }
}

/// Read complete lines written after `offset`.
///
/// A file shorter than `offset` was truncated or rotated and is read from
/// the start. A trailing line without `\n` is held back until a later read
/// sees it finished. `Ok(None)` means nothing new.
pub fn read_delta(path: &Path, offset: u64) -> Result<Option<Delta>, CoreError> {
    let mut file = File::open(path)?;
    let size = file.metadata()?.len();

    let (start, truncated) = if size < offset {
        (0, true)
    } else {
        (offset, false)
    };
    if size == start {
        return Ok(None);
    }

    file.seek(SeekFrom::Start(start))?;
    let mut raw = Vec::with_capacity((size - start) as usize);
    file.take(size - start).read_to_end(&mut raw)?;

    let Some(last_newline) = raw.iter().rposition(|b| *b == b'\n') else {
        return Ok(truncated.then(|| Delta {
            text: String::new(),
            next_offset: 0,
            truncated,
            start: 0,
            raw: Vec::new(),
        }));
    };
    raw.truncate(last_newline + 1);

    Ok(Some(Delta {
        next_offset: start + raw.len() as u64,
        text: String::from_utf8_lossy(&raw).into_owned(),
        truncated,
        start,
        raw,
    }))
}
