//! Per-pixel color transforms over packed `0xAARRGGBB` values.
//!
//! Every operation mutates the slice in place and treats each pixel in
//! isolation. When `has_alpha` is false the output alpha is forced opaque,
//! otherwise it is copied through untouched.

const MAX_CHANNEL: f32 = 255.0;

#[inline]
pub fn unpack(pixel: u32) -> (u8, u8, u8, u8) {
    (
        (pixel >> 24) as u8,
        (pixel >> 16) as u8,
        (pixel >> 8) as u8,
        pixel as u8,
    )
}

#[inline]
pub fn pack(a: u8, r: u8, g: u8, b: u8) -> u32 {
    (a as u32) << 24 | (r as u32) << 16 | (g as u32) << 8 | b as u32
}

#[inline]
fn clamp_channel(value: f32) -> u8 {
    value.round().clamp(0.0, MAX_CHANNEL) as u8
}

#[inline]
fn output_alpha(alpha: u8, has_alpha: bool) -> u8 {
    if has_alpha {
        alpha
    } else {
        u8::MAX
    }
}

/// Replaces R, G and B with the pixel's integer luminance.
pub fn grayscale(pixels: &mut [u32], has_alpha: bool) {
    for pixel in pixels.iter_mut() {
        let (a, r, g, b) = unpack(*pixel);
        // Weights sum to 1000 so a gray pixel maps onto itself.
        let luma = (299 * r as u32 + 587 * g as u32 + 114 * b as u32 + 500) / 1000;
        let luma = luma.min(u8::MAX as u32) as u8;
        *pixel = pack(output_alpha(a, has_alpha), luma, luma, luma);
    }
}

/// Applies the classic sepia color matrix.
pub fn sepia(pixels: &mut [u32], has_alpha: bool) {
    for pixel in pixels.iter_mut() {
        let (a, r, g, b) = unpack(*pixel);
        let (r, g, b) = (r as f32, g as f32, b as f32);

        let sr = 0.393 * r + 0.769 * g + 0.189 * b;
        let sg = 0.349 * r + 0.686 * g + 0.168 * b;
        let sb = 0.272 * r + 0.534 * g + 0.131 * b;

        *pixel = pack(
            output_alpha(a, has_alpha),
            clamp_channel(sr),
            clamp_channel(sg),
            clamp_channel(sb),
        );
    }
}

/// Target color of [`tint`], as (red, green, blue).
pub const TINT_TARGET: (u8, u8, u8) = (0x70, 0x42, 0x37);

/// Blends each channel toward [`TINT_TARGET`] by its weight.
///
/// A weight of `0.0` leaves the channel as is and `1.0` replaces it with
/// the target. Weights outside `[0.0, 1.0]` extrapolate; the result is
/// clamped to `0..=255`.
pub fn tint(pixels: &mut [u32], has_alpha: bool, r_weight: f32, g_weight: f32, b_weight: f32) {
    let (r_target, g_target, b_target) = TINT_TARGET;

    for pixel in pixels.iter_mut() {
        let (a, r, g, b) = unpack(*pixel);
        *pixel = pack(
            output_alpha(a, has_alpha),
            blend(r, r_target, r_weight),
            blend(g, g_target, g_weight),
            blend(b, b_target, b_weight),
        );
    }
}

#[inline]
fn blend(channel: u8, target: u8, weight: f32) -> u8 {
    let channel = channel as f32;
    clamp_channel(channel + (target as f32 - channel) * weight)
}
