// src/scene/bluenoise.rs
// Blue-noise sampler tables (scrambled Sobol). The real tables ship as a
// sidecar binary; when absent, hash-seeded stand-ins keep the sampler
// functional at reduced quality.

use std::fs;
use std::path::Path;

use crate::error::{RenderError, RenderResult};

pub const SOBOL_ENTRIES: usize = 256 * 256;
pub const TILE_ENTRIES: usize = 128 * 128 * 8;

const MAGIC: u32 = 0x424e_5354; // "TSNB"

pub struct BlueNoise {
    pub sobol_256spp_256d: Vec<u32>,
    pub scrambling_tile: Vec<u32>,
    pub ranking_tile: Vec<u32>,
}

impl BlueNoise {
    pub fn load_or_fallback(path: &Path) -> Self {
        match load(path) {
            Ok(tables) => tables,
            Err(e) => {
                log::warn!(
                    "blue-noise tables {} unavailable: {e}; using hash fallback",
                    path.display()
                );
                Self::fallback()
            }
        }
    }

    /// Deterministic stand-in tables derived from an integer hash.
    pub fn fallback() -> Self {
        let fill = |salt: u32, len: usize| -> Vec<u32> {
            (0..len as u32)
                .map(|i| {
                    let mut h = i.wrapping_mul(0x9e37_79b9) ^ salt;
                    h ^= h >> 16;
                    h = h.wrapping_mul(0x7feb_352d);
                    h ^= h >> 15;
                    h = h.wrapping_mul(0x846c_a68b);
                    h ^ (h >> 16)
                })
                .collect()
        };
        Self {
            sobol_256spp_256d: fill(0x0000_5073, SOBOL_ENTRIES),
            scrambling_tile: fill(0x0000_9c4b, TILE_ENTRIES),
            ranking_tile: fill(0x0000_e1d5, TILE_ENTRIES),
        }
    }
}

fn load(path: &Path) -> RenderResult<BlueNoise> {
    let bytes = fs::read(path)?;
    let expected = 16 + 4 * (SOBOL_ENTRIES + 2 * TILE_ENTRIES);
    if bytes.len() != expected {
        return Err(RenderError::scene(format!(
            "expected {expected} bytes, found {}",
            bytes.len()
        )));
    }
    let header: [u32; 4] = bytemuck::pod_read_unaligned(&bytes[..16]);
    if header[0] != MAGIC {
        return Err(RenderError::scene("bad magic"));
    }
    if header[1] as usize != SOBOL_ENTRIES
        || header[2] as usize != TILE_ENTRIES
        || header[3] as usize != TILE_ENTRIES
    {
        return Err(RenderError::scene("table shape mismatch"));
    }

    let mut offset = 16usize;
    let mut take = |len: usize| -> Vec<u32> {
        let slice = &bytes[offset..offset + len * 4];
        offset += len * 4;
        bytemuck::pod_collect_to_vec(slice)
    };

    Ok(BlueNoise {
        sobol_256spp_256d: take(SOBOL_ENTRIES),
        scrambling_tile: take(TILE_ENTRIES),
        ranking_tile: take(TILE_ENTRIES),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_tables_have_expected_shapes() {
        let tables = BlueNoise::fallback();
        assert_eq!(tables.sobol_256spp_256d.len(), SOBOL_ENTRIES);
        assert_eq!(tables.scrambling_tile.len(), TILE_ENTRIES);
        assert_eq!(tables.ranking_tile.len(), TILE_ENTRIES);
    }

    #[test]
    fn fallback_is_deterministic() {
        let a = BlueNoise::fallback();
        let b = BlueNoise::fallback();
        assert_eq!(a.sobol_256spp_256d[..64], b.sobol_256spp_256d[..64]);
    }
}
