//! Red-region fish classifier.
//!
//! ```text
//!   RGB ─▶ HSV red mask ─▶ 4-connected regions ─▶ shape filter ─▶ count ≥ N ?
//! ```
//!
//! A region qualifies when its pixel area exceeds `min_region_area`, its
//! bounding box elongation (long side / short side) sits inside the aspect
//! band, and it fills at least `min_fill_ratio` of that box.  The frame is
//! positive when at least `min_positive_regions` regions qualify.

use std::collections::VecDeque;

use crate::app::ports::Classifier;
use crate::config::ClassifierConfig;

use super::{Frame, draw_rectangle};

const ANNOTATION_COLOUR: [u8; 3] = [0, 255, 0];

/// Inclusive pixel bounds of one qualifying region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionBox {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub area: u32,
}

impl RegionBox {
    pub fn width(&self) -> u32 {
        self.right - self.left + 1
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top + 1
    }
}

/// Result handed from the classifier to the feed controller.
#[derive(Debug, Clone)]
pub struct Classification {
    pub positive: bool,
    pub regions: Vec<RegionBox>,
    /// Input frame with every qualifying region outlined.
    pub annotated: Frame,
}

pub struct ColorRegionClassifier {
    config: ClassifierConfig,
}

impl ColorRegionClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    fn is_red(&self, [r, g, b]: [u8; 3]) -> bool {
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        if max < self.config.min_value || max == 0 {
            return false;
        }
        let delta = f32::from(max - min);
        let saturation = delta * 255.0 / f32::from(max);
        if saturation < f32::from(self.config.min_saturation) {
            return false;
        }
        let hue = hue_degrees(r, g, b, max, delta);
        let tol = self.config.hue_tolerance_deg;
        hue <= tol || hue >= 360.0 - tol
    }

    fn mask(&self, frame: &Frame) -> Vec<bool> {
        frame
            .pixels()
            .chunks_exact(3)
            .map(|px| self.is_red([px[0], px[1], px[2]]))
            .collect()
    }

    fn qualifies(&self, region: &RegionBox) -> bool {
        if region.area <= self.config.min_region_area {
            return false;
        }
        let (w, h) = (region.width() as f32, region.height() as f32);
        let elongation = w.max(h) / w.min(h);
        if elongation < self.config.min_aspect_ratio || elongation > self.config.max_aspect_ratio {
            return false;
        }
        let fill = region.area as f32 / (w * h);
        fill > self.config.min_fill_ratio
    }
}

impl Classifier for ColorRegionClassifier {
    fn classify(&self, frame: &Frame) -> Classification {
        let mask = self.mask(frame);
        let regions: Vec<RegionBox> = connected_regions(&mask, frame.width(), frame.height())
            .into_iter()
            .filter(|r| self.qualifies(r))
            .collect();

        let mut annotated = frame.clone();
        for r in &regions {
            draw_rectangle(&mut annotated, r.left, r.top, r.right, r.bottom, ANNOTATION_COLOUR);
        }

        Classification {
            positive: regions.len() >= self.config.min_positive_regions as usize,
            regions,
            annotated,
        }
    }
}

fn hue_degrees(r: u8, g: u8, b: u8, max: u8, delta: f32) -> f32 {
    if delta <= 0.0 {
        return 0.0;
    }
    let (rf, gf, bf) = (f32::from(r), f32::from(g), f32::from(b));
    let h = if max == r {
        60.0 * ((gf - bf) / delta)
    } else if max == g {
        60.0 * ((bf - rf) / delta + 2.0)
    } else {
        60.0 * ((rf - gf) / delta + 4.0)
    };
    if h < 0.0 { h + 360.0 } else { h }
}

/// Label 4-connected `true` runs of `mask` and return their bounding boxes.
fn connected_regions(mask: &[bool], width: u32, height: u32) -> Vec<RegionBox> {
    let (w, h) = (width as usize, height as usize);
    let mut seen = vec![false; mask.len()];
    let mut regions = Vec::new();
    let mut queue = VecDeque::new();

    for start in 0..mask.len() {
        if !mask[start] || seen[start] {
            continue;
        }
        seen[start] = true;
        queue.push_back(start);
        let mut region = RegionBox {
            left: u32::MAX,
            top: u32::MAX,
            right: 0,
            bottom: 0,
            area: 0,
        };

        while let Some(i) = queue.pop_front() {
            let (x, y) = (i % w, i / w);
            region.area += 1;
            region.left = region.left.min(x as u32);
            region.right = region.right.max(x as u32);
            region.top = region.top.min(y as u32);
            region.bottom = region.bottom.max(y as u32);

            let mut visit = |j: usize| {
                if mask[j] && !seen[j] {
                    seen[j] = true;
                    queue.push_back(j);
                }
            };
            if x > 0 {
                visit(i - 1);
            }
            if x + 1 < w {
                visit(i + 1);
            }
            if y > 0 {
                visit(i - w);
            }
            if y + 1 < h {
                visit(i + w);
            }
        }
        regions.push(region);
    }
    regions
}
