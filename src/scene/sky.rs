// src/scene/sky.rs
// Radiance HDR (.hdr) sky probe loader: RGBE scanlines to linear RGBA32F.
// A missing or malformed file degrades to a procedural gradient sky.

use std::fs;
use std::path::Path;

use crate::error::{RenderError, RenderResult};

/// Square sky probe, `size * size` linear RGBA32F texels.
pub struct Sky {
    pub size: u32,
    pub data: Vec<[f32; 4]>,
}

impl Sky {
    /// Load a sky probe, falling back to the gradient sky on any failure.
    pub fn load_or_fallback(path: &Path) -> Self {
        match load_hdr(path) {
            Ok(sky) => sky,
            Err(e) => {
                log::warn!("sky {} unavailable: {e}; using gradient", path.display());
                Self::gradient()
            }
        }
    }

    /// Constant dark gradient used when no probe is available.
    pub fn gradient() -> Self {
        let size = 64u32;
        let mut data = Vec::with_capacity((size * size) as usize);
        for y in 0..size {
            let t = y as f32 / (size - 1) as f32;
            let horizon = [0.12, 0.14, 0.18];
            let zenith = [0.02, 0.03, 0.06];
            for _ in 0..size {
                data.push([
                    horizon[0] + (zenith[0] - horizon[0]) * t,
                    horizon[1] + (zenith[1] - horizon[1]) * t,
                    horizon[2] + (zenith[2] - horizon[2]) * t,
                    1.0,
                ]);
            }
        }
        Sky { size, data }
    }
}

fn load_hdr(path: &Path) -> RenderResult<Sky> {
    let bytes = fs::read(path)?;
    let mut cursor = 0usize;

    let mut line = read_line(&bytes, &mut cursor)?;
    if !line.starts_with("#?") {
        return Err(RenderError::scene("missing radiance signature"));
    }
    // Header runs until the first empty line
    loop {
        line = read_line(&bytes, &mut cursor)?;
        if line.is_empty() {
            break;
        }
    }

    let resolution = read_line(&bytes, &mut cursor)?;
    let parts: Vec<&str> = resolution.split_whitespace().collect();
    if parts.len() != 4 || parts[0] != "-Y" || parts[2] != "+X" {
        return Err(RenderError::scene(format!(
            "unsupported resolution line '{resolution}'"
        )));
    }
    let height: u32 = parts[1]
        .parse()
        .map_err(|_| RenderError::scene("bad height"))?;
    let width: u32 = parts[3]
        .parse()
        .map_err(|_| RenderError::scene("bad width"))?;
    if width != height {
        return Err(RenderError::scene(format!(
            "sky probe must be square, got {width}x{height}"
        )));
    }

    let mut data = Vec::with_capacity((width * height) as usize);
    let mut scanline = vec![0u8; width as usize * 4];

    for _ in 0..height {
        read_scanline(&bytes, &mut cursor, width, &mut scanline)?;
        for x in 0..width as usize {
            data.push(rgbe_to_linear(
                scanline[x],
                scanline[width as usize + x],
                scanline[2 * width as usize + x],
                scanline[3 * width as usize + x],
            ));
        }
    }

    Ok(Sky { size: width, data })
}

fn read_line(bytes: &[u8], cursor: &mut usize) -> RenderResult<String> {
    let start = *cursor;
    while *cursor < bytes.len() && bytes[*cursor] != b'\n' {
        *cursor += 1;
    }
    if *cursor >= bytes.len() {
        return Err(RenderError::scene("truncated header"));
    }
    let line = String::from_utf8_lossy(&bytes[start..*cursor]).into_owned();
    *cursor += 1;
    Ok(line)
}

/// One RLE scanline into planar RGBE channels.
fn read_scanline(
    bytes: &[u8],
    cursor: &mut usize,
    width: u32,
    out: &mut [u8],
) -> RenderResult<()> {
    let take = |cursor: &mut usize| -> RenderResult<u8> {
        let b = *bytes
            .get(*cursor)
            .ok_or_else(|| RenderError::scene("truncated scanline"))?;
        *cursor += 1;
        Ok(b)
    };

    let b0 = take(cursor)?;
    let b1 = take(cursor)?;
    let b2 = take(cursor)?;
    let b3 = take(cursor)?;

    // New-style RLE marker: 0x02 0x02 then the width
    if b0 != 2 || b1 != 2 || ((b2 as u32) << 8 | b3 as u32) != width {
        return Err(RenderError::scene("flat RGBE scanlines unsupported"));
    }

    for channel in 0..4usize {
        let row = &mut out[channel * width as usize..(channel + 1) * width as usize];
        let mut x = 0usize;
        while x < width as usize {
            let code = take(cursor)?;
            if code > 128 {
                let value = take(cursor)?;
                let run = (code - 128) as usize;
                for _ in 0..run {
                    if x >= row.len() {
                        return Err(RenderError::scene("run overflows scanline"));
                    }
                    row[x] = value;
                    x += 1;
                }
            } else {
                for _ in 0..code as usize {
                    if x >= row.len() {
                        return Err(RenderError::scene("literal overflows scanline"));
                    }
                    row[x] = take(cursor)?;
                    x += 1;
                }
            }
        }
    }
    Ok(())
}

fn rgbe_to_linear(r: u8, g: u8, b: u8, e: u8) -> [f32; 4] {
    if e == 0 {
        return [0.0, 0.0, 0.0, 1.0];
    }
    let scale = (2.0f32).powi(e as i32 - 136);
    [
        (r as f32 + 0.5) * scale,
        (g as f32 + 0.5) * scale,
        (b as f32 + 0.5) * scale,
        1.0,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gradient_is_square_and_finite() {
        let sky = Sky::gradient();
        assert_eq!(sky.data.len(), (sky.size * sky.size) as usize);
        assert!(sky.data.iter().all(|t| t.iter().all(|c| c.is_finite())));
    }

    #[test]
    fn missing_file_falls_back() {
        let sky = Sky::load_or_fallback(Path::new("/nonexistent/probe.hdr"));
        assert_eq!(sky.size, 64);
    }

    #[test]
    fn rgbe_decode_matches_reference_points() {
        assert_eq!(rgbe_to_linear(0, 0, 0, 0), [0.0, 0.0, 0.0, 1.0]);
        // e = 136 gives a scale of 1.0
        let texel = rgbe_to_linear(127, 255, 0, 136);
        assert!((texel[0] - 127.5).abs() < 1e-3);
        assert!((texel[1] - 255.5).abs() < 1e-3);
        assert_eq!(texel[2], 0.5);
    }
}
