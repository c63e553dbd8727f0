//! Raw frame files: back-to-back little-endian `f32` images, row-major.

use std::fs;
use std::path::Path;

use ndarray::Array2;

use crate::{CliError, Result};

const SAMPLE_BYTES: usize = std::mem::size_of::<f32>();

/// Reads every frame stored in `path`.
pub fn read_frames(path: &Path, shape: (usize, usize)) -> Result<Vec<Array2<f32>>> {
    let bytes = fs::read(path)?;
    let frame_bytes = shape.0 * shape.1 * SAMPLE_BYTES;
    if bytes.is_empty() || bytes.len() % frame_bytes != 0 {
        return Err(CliError::Format(format!(
            "{}: {} bytes is not a whole number of {}x{} f32 frames",
            path.display(),
            bytes.len(),
            shape.0,
            shape.1
        )));
    }
    bytes
        .chunks_exact(frame_bytes)
        .map(|chunk| {
            let values: Vec<f32> = chunk
                .chunks_exact(SAMPLE_BYTES)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
            Array2::from_shape_vec(shape, values)
                .map_err(|e| CliError::Format(format!("{}: {e}", path.display())))
        })
        .collect()
}

/// Reads the frames of several files in order.
pub fn read_all(paths: &[impl AsRef<Path>], shape: (usize, usize)) -> Result<Vec<Array2<f32>>> {
    let mut frames = Vec::new();
    for path in paths {
        let path = path.as_ref();
        let mut chunk = read_frames(path, shape)?;
        log::debug!("{}: {} frame(s)", path.display(), chunk.len());
        frames.append(&mut chunk);
    }
    Ok(frames)
}

#[cfg(test)]
pub(crate) fn write_frames(path: &Path, frames: &[Array2<f32>]) -> std::io::Result<()> {
    let mut bytes = Vec::new();
    for frame in frames {
        for v in frame {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
    }
    fs::write(path, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_multiple_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stack.raw");
        let a = Array2::from_shape_fn((3, 2), |(r, c)| (r * 2 + c) as f32);
        let b = a.mapv(|v| -v);
        write_frames(&path, &[a.clone(), b.clone()]).unwrap();

        let frames = read_frames(&path, (3, 2)).unwrap();
        assert_eq!(frames, vec![a, b]);
    }

    #[test]
    fn test_rejects_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.raw");
        fs::write(&path, [0u8; 10]).unwrap();
        assert!(matches!(read_frames(&path, (2, 2)), Err(CliError::Format(_))));
        assert!(matches!(
            read_frames(&dir.path().join("missing.raw"), (2, 2)),
            Err(CliError::Io(_))
        ));
    }
}
