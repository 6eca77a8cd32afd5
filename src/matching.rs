//! Template matching
//!
//! Scores every placement of the template with the zero-mean normalized
//! cross-correlation coefficient (range -1.0 to 1.0, 1.0 = identical up to
//! brightness and contrast). Window means and variances come from a
//! summed-area table; the best placement is picked with imageproc.
//!
//! Large searches run coarse-to-fine: both images are downscaled by the
//! pyramid factor, the best coarse placement is found, and the score is then
//! recomputed at full resolution in a small window around it.

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbaImage};
use imageproc::definitions::Image;
use imageproc::template_matching::find_extremes;

/// Smallest template side kept after downscaling for the coarse pass
const MIN_COARSE_SIDE: u32 = 6;

/// Variance below which a window counts as flat
const FLAT_EPSILON: f64 = 1e-6;

/// Matching parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchOptions {
    /// Minimum score for a placement to count as a match
    pub threshold: f32,
    /// Match on luminance only instead of the three colour channels
    pub grayscale: bool,
    /// Downscale factor for the coarse pass (1 disables it)
    pub pyramid_factor: u32,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            grayscale: true,
            pyramid_factor: 4,
        }
    }
}

/// Best placement of a template inside a screen image
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    /// Left edge in screen pixels
    pub x: u32,
    /// Top edge in screen pixels
    pub y: u32,
    /// Correlation coefficient at this placement
    pub score: f32,
}

/// Find the best placement of `template` in `screen` scoring at least the
/// threshold
pub fn find_template(
    screen: &RgbaImage,
    template: &RgbaImage,
    options: &MatchOptions,
) -> Option<Placement> {
    let (sw, sh) = screen.dimensions();
    let (tw, th) = template.dimensions();
    if tw == 0 || th == 0 || tw > sw || th > sh {
        return None;
    }

    let screen_planes = planes(screen, options.grayscale);
    let template_planes = planes(template, options.grayscale);

    let best = match coarse_candidate(&screen_planes, &template_planes, options.pyramid_factor) {
        Some((cx, cy)) => refine(&screen_planes, &template_planes, cx, cy, options.pyramid_factor),
        None => best_placement(&screen_planes, &template_planes),
    };

    if best.score >= options.threshold {
        Some(best)
    } else {
        None
    }
}

/// Split an image into the planes that get matched
fn planes(img: &RgbaImage, grayscale: bool) -> Vec<GrayImage> {
    if grayscale {
        return vec![imageops::grayscale(img)];
    }
    (0..3)
        .map(|c| GrayImage::from_fn(img.width(), img.height(), |x, y| Luma([img.get_pixel(x, y)[c]])))
        .collect()
}

fn downscale(planes: &[GrayImage], factor: u32) -> Vec<GrayImage> {
    planes
        .iter()
        .map(|p| imageops::resize(p, p.width() / factor, p.height() / factor, FilterType::Triangle))
        .collect()
}

/// Best placement on downscaled images, in full-resolution pixels
fn coarse_candidate(screen: &[GrayImage], template: &[GrayImage], factor: u32) -> Option<(u32, u32)> {
    if factor <= 1 {
        return None;
    }
    let (tw, th) = template[0].dimensions();
    if tw / factor < MIN_COARSE_SIDE || th / factor < MIN_COARSE_SIDE {
        return None;
    }

    let small_screen = downscale(screen, factor);
    let small_template = downscale(template, factor);
    let coarse = best_placement(&small_screen, &small_template);
    Some((coarse.x * factor, coarse.y * factor))
}

/// Re-score around a coarse candidate at full resolution
fn refine(screen: &[GrayImage], template: &[GrayImage], cx: u32, cy: u32, factor: u32) -> Placement {
    let (sw, sh) = screen[0].dimensions();
    let (tw, th) = template[0].dimensions();
    let pad = factor * 2;

    let x0 = cx.saturating_sub(pad).min(sw - tw);
    let y0 = cy.saturating_sub(pad).min(sh - th);
    let x1 = (cx + tw + pad).min(sw);
    let y1 = (cy + th + pad).min(sh);

    let window: Vec<GrayImage> = screen
        .iter()
        .map(|p| imageops::crop_imm(p, x0, y0, x1 - x0, y1 - y0).to_image())
        .collect();

    let local = best_placement(&window, template);
    Placement {
        x: x0 + local.x,
        y: y0 + local.y,
        score: local.score,
    }
}

/// Exhaustive search, averaging the score maps of all planes
fn best_placement(screen: &[GrayImage], template: &[GrayImage]) -> Placement {
    let mut total: Option<Image<Luma<f32>>> = None;
    for (s, t) in screen.iter().zip(template) {
        let map = score_map(s, t);
        match total.as_mut() {
            Some(acc) => {
                for (a, b) in acc.pixels_mut().zip(map.pixels()) {
                    a[0] += b[0];
                }
            }
            None => total = Some(map),
        }
    }

    let Some(mut total) = total else {
        return Placement { x: 0, y: 0, score: f32::MIN };
    };
    let planes = screen.len() as f32;
    for p in total.pixels_mut() {
        p[0] /= planes;
    }

    let extremes = find_extremes(&total);
    Placement {
        x: extremes.max_value_location.0,
        y: extremes.max_value_location.1,
        score: extremes.max_value,
    }
}

/// Correlation coefficient for every placement of `template` in `image`
///
/// The numerator is accumulated in f64 against the mean-centred template.
/// Bright images make the raw products large, and subtracting the means
/// afterwards loses the signal to rounding.
fn score_map(image: &GrayImage, template: &GrayImage) -> Image<Luma<f32>> {
    let (tw, th) = template.dimensions();
    let n = f64::from(tw) * f64::from(th);
    let t_mean = template.pixels().map(|p| f64::from(p[0])).sum::<f64>() / n;
    let centred: Vec<f64> = template.pixels().map(|p| f64::from(p[0]) - t_mean).collect();
    let t_var: f64 = centred.iter().map(|v| v * v).sum();
    let table = SummedArea::new(image);

    Image::from_fn(image.width() - tw + 1, image.height() - th + 1, |x, y| {
        let (i_sum, i_sq) = table.window(x, y, tw, th);
        let i_var = i_sq - i_sum * i_sum / n;
        let cross = centred_cross(image, &centred, tw, x, y);
        Luma([coefficient(cross, t_mean, t_var, i_sum / n, i_var)])
    })
}

/// Sum of image pixels times centred template values at (`x`, `y`)
fn centred_cross(image: &GrayImage, centred: &[f64], tw: u32, x: u32, y: u32) -> f64 {
    let raw = image.as_raw();
    let stride = image.width() as usize;
    let (tw, x, y) = (tw as usize, x as usize, y as usize);
    centred
        .chunks_exact(tw)
        .enumerate()
        .map(|(row, t_row)| {
            let start = (y + row) * stride + x;
            raw[start..start + tw]
                .iter()
                .zip(t_row)
                .map(|(&i, &t)| f64::from(i) * t)
                .sum::<f64>()
        })
        .sum()
}

fn coefficient(cross: f64, t_mean: f64, t_var: f64, i_mean: f64, i_var: f64) -> f32 {
    let t_flat = t_var <= FLAT_EPSILON;
    let i_flat = i_var <= FLAT_EPSILON;
    if t_flat || i_flat {
        // Two flat patches only correlate when their levels agree.
        return if t_flat && i_flat && (t_mean - i_mean).abs() < 1.0 {
            1.0
        } else {
            0.0
        };
    }
    (cross / (t_var * i_var).sqrt()).clamp(-1.0, 1.0) as f32
}

/// Summed-area table of pixel values and squared values
struct SummedArea {
    stride: usize,
    sums: Vec<f64>,
    squares: Vec<f64>,
}

impl SummedArea {
    fn new(image: &GrayImage) -> Self {
        let (w, h) = (image.width() as usize, image.height() as usize);
        let stride = w + 1;
        let mut sums = vec![0.0; stride * (h + 1)];
        let mut squares = vec![0.0; stride * (h + 1)];

        for y in 0..h {
            let mut row_sum = 0.0;
            let mut row_sq = 0.0;
            for x in 0..w {
                let v = f64::from(image.get_pixel(x as u32, y as u32)[0]);
                row_sum += v;
                row_sq += v * v;
                let idx = (y + 1) * stride + x + 1;
                sums[idx] = sums[idx - stride] + row_sum;
                squares[idx] = squares[idx - stride] + row_sq;
            }
        }

        Self { stride, sums, squares }
    }

    /// (sum, sum of squares) of the `w` x `h` window at (`x`, `y`)
    fn window(&self, x: u32, y: u32, w: u32, h: u32) -> (f64, f64) {
        let (x0, y0) = (x as usize, y as usize);
        let (x1, y1) = (x0 + w as usize, y0 + h as usize);
        let at = |table: &[f64], x: usize, y: usize| table[y * self.stride + x];
        let area = |table: &[f64]| at(table, x1, y1) - at(table, x0, y1) - at(table, x1, y0) + at(table, x0, y0);
        (area(&self.sums), area(&self.squares))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    /// Deterministic noise texture
    fn noise(width: u32, height: u32, seed: u32) -> RgbaImage {
        let mut state = seed;
        RgbaImage::from_fn(width, height, |_, _| {
            let mut next = || {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (state >> 24) as u8
            };
            Rgba([next(), next(), next(), 255])
        })
    }

    /// Smooth gradient with a framed "button" drawn at (`bx`, `by`)
    fn screen_with_button(bx: u32, by: u32) -> RgbaImage {
        RgbaImage::from_fn(200, 160, |x, y| {
            let inside = x >= bx && x < bx + 48 && y >= by && y < by + 32;
            if !inside {
                let v = ((x + y) / 3) as u8;
                return Rgba([v, v, v, 255]);
            }
            let (lx, ly) = (x - bx, y - by);
            let border = lx < 4 || lx >= 44 || ly < 4 || ly >= 28;
            let cross = (20..28).contains(&lx) || (12..20).contains(&ly);
            let v = if border { 240 } else if cross { 180 } else { 30 };
            Rgba([v, v / 2, 255 - v, 255])
        })
    }

    fn exact(pyramid_factor: u32) -> MatchOptions {
        MatchOptions {
            threshold: 0.9,
            grayscale: true,
            pyramid_factor,
        }
    }

    #[test]
    fn finds_exact_crop_in_noise() {
        let screen = noise(120, 90, 7);
        let template = imageops::crop_imm(&screen, 37, 21, 20, 14).to_image();

        let found = find_template(&screen, &template, &exact(1)).unwrap();
        assert_eq!((found.x, found.y), (37, 21));
        assert!(found.score > 0.99);
    }

    #[test]
    fn coarse_to_fine_finds_button() {
        let screen = screen_with_button(88, 64);
        let template = imageops::crop_imm(&screen, 88, 64, 48, 32).to_image();

        let found = find_template(&screen, &template, &exact(4)).unwrap();
        assert_eq!((found.x, found.y), (88, 64));
        assert!(found.score > 0.99);
    }

    #[test]
    fn brightness_shift_still_matches() {
        let screen = screen_with_button(40, 52);
        let mut template = imageops::crop_imm(&screen, 40, 52, 48, 32).to_image();
        for p in template.pixels_mut() {
            p[0] = p[0].saturating_sub(10);
            p[1] = p[1].saturating_sub(10);
            p[2] = p[2].saturating_sub(10);
        }

        let found = find_template(&screen, &template, &MatchOptions::default()).unwrap();
        assert_eq!((found.x, found.y), (40, 52));
    }

    #[test]
    fn absent_button_is_not_found() {
        let button = screen_with_button(0, 0);
        let template = imageops::crop_imm(&button, 0, 0, 48, 32).to_image();
        let screen = noise(200, 160, 3);

        assert_eq!(find_template(&screen, &template, &MatchOptions::default()), None);
    }

    #[test]
    fn colour_mode_matches_channels() {
        let screen = noise(100, 80, 11);
        let template = imageops::crop_imm(&screen, 12, 40, 16, 16).to_image();
        let options = MatchOptions {
            grayscale: false,
            ..exact(1)
        };

        let found = find_template(&screen, &template, &options).unwrap();
        assert_eq!((found.x, found.y), (12, 40));
    }

    #[test]
    fn oversized_or_empty_template_never_matches() {
        let screen = noise(30, 30, 1);
        assert_eq!(find_template(&screen, &noise(31, 10, 2), &exact(1)), None);
        assert_eq!(find_template(&screen, &RgbaImage::new(0, 5), &exact(1)), None);
    }

    /// Light grey low-contrast button (205/220 with a 0/1 dither) on a
    /// darker gradient
    fn screen_with_bright_button(bx: u32, by: u32) -> RgbaImage {
        RgbaImage::from_fn(240, 160, |x, y| {
            let inside = x >= bx && x < bx + 64 && y >= by && y < by + 24;
            if !inside {
                let v = ((x + y) / 3) as u8;
                return Rgba([v, v, v, 255]);
            }
            let (lx, ly) = (x - bx, y - by);
            let border = lx < 3 || lx >= 61 || ly < 3 || ly >= 21;
            let base: u8 = if border { 220 } else { 205 };
            let v = base + ((lx + ly) % 2) as u8;
            Rgba([v, v, v, 255])
        })
    }

    #[test]
    fn bright_low_contrast_button_scores_exact() {
        let screen = screen_with_bright_button(120, 100);
        let template = imageops::crop_imm(&screen, 120, 100, 64, 24).to_image();

        for factor in [1, 4] {
            let found = find_template(&screen, &template, &exact(factor))
                .unwrap_or_else(|| panic!("no match with pyramid factor {}", factor));
            assert_eq!((found.x, found.y), (120, 100), "pyramid factor {}", factor);
            assert!(found.score > 0.99, "pyramid factor {}: {}", factor, found.score);
        }
    }

    #[test]
    fn summed_area_windows() {
        let img = GrayImage::from_fn(4, 3, |x, y| Luma([(x + 4 * y) as u8]));
        let table = SummedArea::new(&img);
        // 5 + 6 + 9 + 10
        assert_eq!(table.window(1, 1, 2, 2), (30.0, 242.0));
        assert_eq!(table.window(0, 0, 4, 3).0, 66.0);
    }
}
