//! Section colors
//!
//! Every section name maps to one of a small fixed palette so a viewer can
//! draw the same section the same way across frames and captures, without any
//! configuration. Different names may share a color.

use std::sync::OnceLock;

use framescope_common::PALETTE_SIZE;

/// Golden-ratio conjugate; stepping the hue by it spreads colors evenly
const GOLDEN_RATIO_CONJUGATE: f64 = 0.618_033_988_749_895;
const PALETTE_START_HUE: f64 = 0.85;
const PALETTE_SATURATION: f64 = 0.6;
const PALETTE_VALUE: f64 = 200.0 / 255.0;

/// Color of lock-acquisition sections
pub const LOCK_COLOR: Color = Color::rgba(0xFF, 0x00, 0x00, 0xFF);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    #[must_use]
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Pack as `0xAABBGGRR`, the layout immediate-mode UIs expect
    #[must_use]
    pub const fn to_packed(self) -> u32 {
        (self.a as u32) << 24 | (self.b as u32) << 16 | (self.g as u32) << 8 | self.r as u32
    }

    #[must_use]
    pub const fn from_packed(packed: u32) -> Self {
        Self {
            r: (packed & 0xFF) as u8,
            g: ((packed >> 8) & 0xFF) as u8,
            b: ((packed >> 16) & 0xFF) as u8,
            a: (packed >> 24) as u8,
        }
    }

    /// `#rrggbb` for text exports
    #[must_use]
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl From<Color> for u32 {
    fn from(color: Color) -> u32 {
        color.to_packed()
    }
}

/// Pick the palette color for a section name.
///
/// Pure: the same bytes always produce the same color, in every process.
#[must_use]
pub fn color_from_name(name: &str) -> Color {
    let hash = murmur3_32(name.as_bytes(), 0);
    palette()[hash as usize % PALETTE_SIZE]
}

/// The shared palette, built on first use
pub fn palette() -> &'static [Color; PALETTE_SIZE] {
    static PALETTE: OnceLock<[Color; PALETTE_SIZE]> = OnceLock::new();
    PALETTE.get_or_init(build_palette)
}

fn build_palette() -> [Color; PALETTE_SIZE] {
    let mut colors = [Color::rgba(0, 0, 0, 0xFF); PALETTE_SIZE];
    let mut hue = PALETTE_START_HUE;
    for color in &mut colors {
        hue = (hue + GOLDEN_RATIO_CONJUGATE) % 1.0;
        *color = hsv_to_rgb(hue * 360.0, PALETTE_SATURATION, PALETTE_VALUE);
    }
    colors
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::many_single_char_names)]
fn hsv_to_rgb(hue_deg: f64, saturation: f64, value: f64) -> Color {
    let chroma = value * saturation;
    let sector = (hue_deg / 60.0) % 6.0;
    let x = chroma * (1.0 - ((sector % 2.0) - 1.0).abs());
    let m = value - chroma;

    let (r, g, b) = match sector as u32 {
        0 => (chroma, x, 0.0),
        1 => (x, chroma, 0.0),
        2 => (0.0, chroma, x),
        3 => (0.0, x, chroma),
        4 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };

    let to_byte = |channel: f64| ((channel + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    Color::rgba(to_byte(r), to_byte(g), to_byte(b), 0xFF)
}

/// `MurmurHash3_x86_32`
fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    const C1: u32 = 0xcc9e_2d51;
    const C2: u32 = 0x1b87_3593;

    let scramble = |mut k: u32| {
        k = k.wrapping_mul(C1);
        k = k.rotate_left(15);
        k.wrapping_mul(C2)
    };

    let mut hash = seed;
    let mut blocks = data.chunks_exact(4);
    for block in &mut blocks {
        let k = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);
        hash ^= scramble(k);
        hash = hash.rotate_left(13);
        hash = hash.wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    let tail = blocks.remainder();
    if !tail.is_empty() {
        let k = tail
            .iter()
            .enumerate()
            .fold(0u32, |k, (i, byte)| k | u32::from(*byte) << (8 * i));
        hash ^= scramble(k);
    }

    // Length is mixed in modulo 2^32, as the reference algorithm does
    #[allow(clippy::cast_possible_truncation)]
    let len = data.len() as u32;
    hash ^= len;
    hash ^= hash >> 16;
    hash = hash.wrapping_mul(0x85eb_ca6b);
    hash ^= hash >> 13;
    hash = hash.wrapping_mul(0xc2b2_ae35);
    hash ^= hash >> 16;
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_murmur3_known_vectors() {
        assert_eq!(murmur3_32(b"", 0), 0);
        assert_eq!(murmur3_32(b"", 1), 0x514E_28B7);
        assert_eq!(
            murmur3_32(b"The quick brown fox jumps over the lazy dog", 0),
            0x2E4F_F723
        );
    }

    #[test]
    fn test_color_from_name_is_pure() {
        let owned = String::from("radio_process");
        assert_eq!(color_from_name("radio_process"), color_from_name(&owned));
        assert_eq!(color_from_name(""), color_from_name(""));
    }

    #[test]
    fn test_color_comes_from_palette() {
        for name in ["main_loop", "vendor_task", "apply_agc_block", "x"] {
            assert!(palette().contains(&color_from_name(name)));
        }
    }

    #[test]
    fn test_palette_colors_are_distinct_and_opaque() {
        let colors = palette();
        for (i, a) in colors.iter().enumerate() {
            assert_eq!(a.a, 0xFF);
            for b in &colors[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_packed_round_trip() {
        let color = Color::rgba(0x12, 0x34, 0x56, 0x78);
        assert_eq!(color.to_packed(), 0x7856_3412);
        assert_eq!(Color::from_packed(color.to_packed()), color);
        assert_eq!(color.to_hex(), "#123456");
    }
}
