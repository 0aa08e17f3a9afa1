use anyhow::{anyhow, Result};

/// Raw pixel layouts a frame source may hand over.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb24,
    Rgba32,
    Nv12,
}

pub(crate) fn normalize_to_rgb(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<Vec<u8>> {
    match format {
        PixelFormat::Rgb24 => {
            let expected = packed_len(width, height, 3)?;
            if pixels.len() != expected {
                return Err(anyhow!(
                    "RGB frame length mismatch: expected {}, got {}",
                    expected,
                    pixels.len()
                ));
            }
            Ok(pixels.to_vec())
        }
        PixelFormat::Rgba32 => rgba_to_rgb(pixels, width, height),
        PixelFormat::Nv12 => nv12_to_rgb(pixels, width, height),
    }
}

fn packed_len(width: u32, height: u32, channels: u32) -> Result<usize> {
    width
        .checked_mul(height)
        .and_then(|v| v.checked_mul(channels))
        .map(|v| v as usize)
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}

fn rgba_to_rgb(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let expected = packed_len(width, height, 4)?;
    if pixels.len() != expected {
        return Err(anyhow!(
            "RGBA frame length mismatch: expected {}, got {}",
            expected,
            pixels.len()
        ));
    }
    let mut rgb = Vec::with_capacity(expected / 4 * 3);
    for px in pixels.chunks_exact(4) {
        rgb.extend_from_slice(&px[..3]);
    }
    Ok(rgb)
}

/// NV12: a full-resolution luma plane followed by interleaved U/V at half
/// resolution in both directions. BT.601 full-range, 8.8 fixed point.
fn nv12_to_rgb(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    if width % 2 != 0 || height % 2 != 0 {
        return Err(anyhow!("NV12 frames need even dimensions, got {}x{}", width, height));
    }
    let luma_len = packed_len(width, height, 1)?;
    let expected = luma_len + luma_len / 2;
    if pixels.len() != expected {
        return Err(anyhow!(
            "NV12 frame length mismatch: expected {}, got {}",
            expected,
            pixels.len()
        ));
    }
    let w = width as usize;
    let (luma, chroma) = pixels.split_at(luma_len);

    let mut rgb = Vec::with_capacity(luma_len * 3);
    for (row, luma_row) in luma.chunks_exact(w).enumerate() {
        let chroma_row = &chroma[(row / 2) * w..];
        for (col, &y) in luma_row.iter().enumerate() {
            let uv = (col / 2) * 2;
            let y = i32::from(y) << 8;
            let u = i32::from(chroma_row[uv]) - 128;
            let v = i32::from(chroma_row[uv + 1]) - 128;
            rgb.push(fixed_to_u8(y + 359 * v));
            rgb.push(fixed_to_u8(y - 88 * u - 183 * v));
            rgb.push(fixed_to_u8(y + 454 * u));
        }
    }
    Ok(rgb)
}

fn fixed_to_u8(value: i32) -> u8 {
    ((value + 128) >> 8).clamp(0, 255) as u8
}
