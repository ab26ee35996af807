//! Capturing the dump from the kernel's pipe.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use tracing::info;

use crate::errors::HandlerError;

/// Stream `reader` (the kernel's pipe in production) verbatim into `path`.
///
/// Core images can exceed 100 MB, so the bytes move through a fixed-size
/// copy buffer instead of being collected in memory. Returns the number of
/// bytes written.
///
/// If the destination cannot be opened or written there is nothing for the
/// later stages to work on, so the error is fatal to the run.
pub fn write_dump(reader: &mut impl Read, path: &Path) -> Result<u64, HandlerError> {
    let map_err = |source: io::Error| HandlerError::DumpWrite {
        path: path.to_owned(),
        source,
    };
    let file = File::create(path).map_err(map_err)?;
    let mut writer = BufWriter::new(file);
    let written = io::copy(reader, &mut writer).map_err(map_err)?;
    writer.flush().map_err(map_err)?;
    info!("captured {written} bytes into {}", path.display());
    Ok(written)
}
