//! Palette reduction for composed sheets
//!
//! Median cut over a pixel histogram in CIE LAB space. Used by the built-in compressor:
//! a sheet remapped to a small palette deflates far better than the raw composition.

use image::{Rgba, RgbaImage};
use std::cmp::Ordering;
use std::collections::HashMap;

/// `[L, a, b]`
type Lab = [f64; 3];

/// sRGB (D65) to CIE LAB
fn to_lab([r, g, b, _]: [u8; 4]) -> Lab {
    let linear = |c: u8| {
        let c = c as f64 / 255.0;
        if c <= 0.04045 {
            c / 12.92
        } else {
            ((c + 0.055) / 1.055).powf(2.4)
        }
    };
    let (r, g, b) = (linear(r), linear(g), linear(b));

    let x = (r * 0.4124564 + g * 0.3575761 + b * 0.1804375) / 0.95047;
    let y = r * 0.2126729 + g * 0.7151522 + b * 0.0721750;
    let z = (r * 0.0193339 + g * 0.1191920 + b * 0.9503041) / 1.08883;

    let f = |t: f64| {
        const DELTA: f64 = 6.0 / 29.0;
        if t > DELTA * DELTA * DELTA {
            t.cbrt()
        } else {
            t / (3.0 * DELTA * DELTA) + 4.0 / 29.0
        }
    };
    let (fx, fy, fz) = (f(x), f(y), f(z));
    [116.0 * fy - 16.0, 500.0 * (fx - fy), 200.0 * (fy - fz)]
}

/// CIE76 distance
fn delta_e(a: &Lab, b: &Lab) -> f64 {
    a.iter().zip(b).map(|(p, q)| (p - q) * (p - q)).sum::<f64>().sqrt()
}

fn is_clear(rgba: [u8; 4]) -> bool {
    rgba[3] == 0
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    rgba: [u8; 4],
    lab: Lab,
    count: u32,
}

/// A set of histogram entries that will become one palette color
#[derive(Debug)]
struct Bucket {
    entries: Vec<Entry>,
}

impl Bucket {
    fn pixels(&self) -> u64 {
        self.entries.iter().map(|e| e.count as u64).sum()
    }

    /// LAB channel with the largest range, and that range
    fn widest(&self) -> (usize, f64) {
        (0..3)
            .map(|channel| {
                let (lo, hi) = self.entries.iter().fold((f64::MAX, f64::MIN), |(lo, hi), e| {
                    (lo.min(e.lab[channel]), hi.max(e.lab[channel]))
                });
                (channel, hi - lo)
            })
            .fold((0, f64::MIN), |best, next| if next.1 > best.1 { next } else { best })
    }

    /// Split at the pixel-weighted median of the widest channel. Both halves are non-empty.
    fn split(mut self) -> (Bucket, Bucket) {
        let (channel, _) = self.widest();
        self.entries.sort_by(|a, b| {
            a.lab[channel].partial_cmp(&b.lab[channel]).unwrap_or(Ordering::Equal)
        });

        let half = self.pixels() / 2;
        let mut seen = 0u64;
        let cut = self
            .entries
            .iter()
            .position(|e| {
                seen += e.count as u64;
                seen >= half
            })
            .map_or(self.entries.len() / 2, |i| i + 1)
            .clamp(1, self.entries.len() - 1);

        let upper = self.entries.split_off(cut);
        (self, Bucket { entries: upper })
    }

    /// Member closest to the weighted LAB mean, carrying the weighted mean alpha
    fn representative(&self) -> [u8; 4] {
        let total = self.pixels().max(1) as f64;
        let mut mean = [0.0; 3];
        let mut alpha = 0.0;
        for e in &self.entries {
            for (m, v) in mean.iter_mut().zip(e.lab) {
                *m += v * e.count as f64 / total;
            }
            alpha += e.rgba[3] as f64 * e.count as f64 / total;
        }

        let nearest = self.entries.iter().min_by(|a, b| {
            delta_e(&a.lab, &mean).partial_cmp(&delta_e(&b.lab, &mean)).unwrap_or(Ordering::Equal)
        });
        match nearest {
            Some(e) => [e.rgba[0], e.rgba[1], e.rgba[2], alpha.round() as u8],
            None => [0, 0, 0, 255],
        }
    }
}

/// Build a palette of at most `max_colors` entries from a histogram.
///
/// Fully transparent pixels share one reserved entry.
fn build_palette(histogram: &HashMap<[u8; 4], u32>, max_colors: usize) -> Vec<[u8; 4]> {
    let has_clear = histogram.keys().any(|c| is_clear(*c));
    let budget = (if has_clear { max_colors.saturating_sub(1) } else { max_colors }).max(1);

    let entries: Vec<Entry> = histogram
        .iter()
        .filter(|(rgba, _)| !is_clear(**rgba))
        .map(|(rgba, count)| Entry { rgba: *rgba, lab: to_lab(*rgba), count: *count })
        .collect();

    let mut buckets = vec![Bucket { entries }];
    while buckets.len() < budget {
        let candidate = buckets
            .iter()
            .enumerate()
            .filter(|(_, b)| b.entries.len() > 1)
            .max_by_key(|(_, b)| b.pixels())
            .map(|(i, _)| i);
        let Some(index) = candidate else {
            break;
        };
        let (lower, upper) = buckets.swap_remove(index).split();
        buckets.push(lower);
        buckets.push(upper);
    }

    let mut palette: Vec<[u8; 4]> = buckets
        .iter()
        .filter(|b| !b.entries.is_empty())
        .map(Bucket::representative)
        .collect();
    if has_clear {
        palette.push([0, 0, 0, 0]);
    }
    palette
}

/// Index of the palette entry nearest to `rgba`. Transparent maps to transparent.
fn nearest(rgba: [u8; 4], palette: &[([u8; 4], Lab)]) -> usize {
    if is_clear(rgba) {
        return palette.iter().position(|(p, _)| is_clear(*p)).unwrap_or(0);
    }

    let lab = to_lab(rgba);
    let cost = |(p, p_lab): &([u8; 4], Lab)| {
        delta_e(&lab, p_lab) + (rgba[3] as f64 - p[3] as f64).abs() / 2.55
    };
    palette
        .iter()
        .enumerate()
        .filter(|(_, (p, _))| !is_clear(*p))
        .min_by(|(_, a), (_, b)| cost(a).partial_cmp(&cost(b)).unwrap_or(Ordering::Equal))
        .map_or(0, |(i, _)| i)
}

/// Remap every pixel of `image` onto a palette of at most `max_colors` entries.
///
/// Images that already fit are returned unchanged.
pub fn quantize_image(image: &RgbaImage, max_colors: usize) -> RgbaImage {
    let mut histogram: HashMap<[u8; 4], u32> = HashMap::new();
    for pixel in image.pixels() {
        *histogram.entry(pixel.0).or_default() += 1;
    }
    if histogram.len() <= max_colors {
        return image.clone();
    }

    let palette: Vec<([u8; 4], Lab)> = build_palette(&histogram, max_colors.max(2))
        .into_iter()
        .map(|rgba| (rgba, to_lab(rgba)))
        .collect();

    let mut mapped: HashMap<[u8; 4], Rgba<u8>> = HashMap::with_capacity(histogram.len());
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        let rgba = pixel.0;
        *pixel = *mapped.entry(rgba).or_insert_with(|| Rgba(palette[nearest(rgba, &palette)].0));
    }
    out
}
