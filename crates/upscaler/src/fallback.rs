//! Procedural plasma written into a CPU buffer when no upscale destination is
//! registered. Every channel of a pixel receives the same value.

use crate::types::BYTES_PER_PIXEL;

/// Animation phase used when the host does not configure one.
pub const DEFAULT_PATTERN_TIME: f32 = 4.0;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FillError {
    #[error("row pitch {row_pitch} is smaller than one row of {width} pixels")]
    RowPitchTooSmall { row_pitch: usize, width: u32 },
    #[error("buffer holds {actual} bytes but {required} are needed")]
    BufferTooSmall { required: usize, actual: usize },
}

pub fn fill(buffer: &mut [u8], width: u32, height: u32, row_pitch: usize) -> Result<(), FillError> {
    fill_with_time(buffer, width, height, row_pitch, DEFAULT_PATTERN_TIME)
}

/// Writes the pattern for phase `time`. Bytes between the end of a row and
/// the next `row_pitch` boundary are left as they were.
pub fn fill_with_time(
    buffer: &mut [u8],
    width: u32,
    height: u32,
    row_pitch: usize,
    time: f32,
) -> Result<(), FillError> {
    if width == 0 || height == 0 {
        return Ok(());
    }

    let row_bytes = width as usize * BYTES_PER_PIXEL as usize;
    if row_pitch < row_bytes {
        return Err(FillError::RowPitchTooSmall { row_pitch, width });
    }
    let required = row_pitch * (height as usize - 1) + row_bytes;
    if buffer.len() < required {
        return Err(FillError::BufferTooSmall {
            required,
            actual: buffer.len(),
        });
    }

    for (y, row) in buffer.chunks_mut(row_pitch).take(height as usize).enumerate() {
        for (x, pixel) in row[..row_bytes]
            .chunks_exact_mut(BYTES_PER_PIXEL as usize)
            .enumerate()
        {
            pixel.fill(plasma_value(x as u32, y as u32, time));
        }
    }
    Ok(())
}

/// Average of four sine waves, each shifted into `[0, 254]`.
pub fn plasma_value(x: u32, y: u32, time: f32) -> u8 {
    let (x, y) = (x as f32, y as f32);
    let wave = |phase: f32| 127.0 + 127.0 * phase.sin();
    let sum = wave(x / 7.0 + time)
        + wave(y / 5.0 - time)
        + wave((x + y) / 6.0 - time)
        + wave((x * x + y * y).sqrt() / 4.0 - time);
    (sum as i32 / 4).clamp(0, 254) as u8
}
