use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Every output dimension is a multiple of this factor; the downstream
/// editing model rejects or crops anything else.
pub const ALIGNMENT: u32 = 32;

const AUTO_EXTREME_RATIO: f64 = 2.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AspectBucket {
    pub ratio_w: u32,
    pub ratio_h: u32,
}

impl AspectBucket {
    pub const fn new(ratio_w: u32, ratio_h: u32) -> Self {
        Self { ratio_w, ratio_h }
    }

    pub fn ratio(self) -> f64 {
        f64::from(self.ratio_w) / f64::from(self.ratio_h)
    }

    fn log_ratio(self) -> f64 {
        self.ratio().ln()
    }
}

impl Display for AspectBucket {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.ratio_w, self.ratio_h)
    }
}

// Ratios strictly increase from 1:4 to 4:1. 23:11 is the one bucket
// without a portrait mirror.
pub const BUCKET_CATALOG: [AspectBucket; 22] = [
    AspectBucket::new(1, 4),
    AspectBucket::new(9, 28),
    AspectBucket::new(23, 44),
    AspectBucket::new(4, 7),
    AspectBucket::new(5, 8),
    AspectBucket::new(2, 3),
    AspectBucket::new(27, 37),
    AspectBucket::new(7, 9),
    AspectBucket::new(29, 35),
    AspectBucket::new(15, 17),
    AspectBucket::new(1, 1),
    AspectBucket::new(17, 15),
    AspectBucket::new(35, 29),
    AspectBucket::new(9, 7),
    AspectBucket::new(37, 27),
    AspectBucket::new(3, 2),
    AspectBucket::new(8, 5),
    AspectBucket::new(7, 4),
    AspectBucket::new(44, 23),
    AspectBucket::new(23, 11),
    AspectBucket::new(28, 9),
    AspectBucket::new(4, 1),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionTier {
    #[serde(rename = "1k")]
    OneK,
    #[serde(rename = "2k")]
    TwoK,
    #[serde(rename = "4k")]
    FourK,
}

impl ResolutionTier {
    pub fn pixel_budget(self) -> u32 {
        match self {
            Self::OneK => 1 << 20,
            Self::TwoK => 1 << 22,
            Self::FourK => 1 << 24,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::OneK => "1k",
            Self::TwoK => "2k",
            Self::FourK => "4k",
        }
    }

    pub fn all() -> [ResolutionTier; 3] {
        [Self::OneK, Self::TwoK, Self::FourK]
    }
}

impl Display for ResolutionTier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TierChoice {
    #[serde(rename = "auto")]
    Auto,
    #[default]
    #[serde(rename = "1k")]
    OneK,
    #[serde(rename = "2k")]
    TwoK,
    #[serde(rename = "4k")]
    FourK,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SizeRequest {
    pub width: u32,
    pub height: u32,
    pub tier: TierChoice,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizePolicy {
    pub pixel_tolerance: f64,
    pub min_2k_input_pixels: u32,
    pub min_4k_input_pixels: u32,
}

impl Default for SizePolicy {
    fn default() -> Self {
        Self {
            pixel_tolerance: 0.10,
            min_2k_input_pixels: 2_000_000,
            min_4k_input_pixels: 8_000_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeSize {
    pub width: u32,
    pub height: u32,
    pub bucket: AspectBucket,
    pub tier: ResolutionTier,
}

impl SafeSize {
    pub fn megapixels(self) -> f64 {
        f64::from(self.width) * f64::from(self.height) / 1_000_000.0
    }
}

impl Display for SafeSize {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{} ({} @ {}, {:.1}MP)",
            self.width,
            self.height,
            self.bucket,
            self.tier,
            self.megapixels()
        )
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("input dimensions must be positive (received {width}x{height})")]
    InvalidInput { width: u32, height: u32 },
}

/// Comparison happens in log space so that wide and tall ratios are
/// weighted evenly; ties go to the bucket nearest square.
pub fn nearest_bucket(aspect_ratio: f64) -> AspectBucket {
    let target = aspect_ratio.ln();
    let mut best = BUCKET_CATALOG[0];
    let mut best_distance = f64::INFINITY;
    for bucket in BUCKET_CATALOG {
        let distance = (bucket.log_ratio() - target).abs();
        let wins = distance < best_distance
            || (distance == best_distance && bucket.log_ratio().abs() < best.log_ratio().abs());
        if wins {
            best = bucket;
            best_distance = distance;
        }
    }
    best
}

pub fn resolve_tier(request: &SizeRequest, policy: &SizePolicy) -> ResolutionTier {
    match request.tier {
        TierChoice::OneK => ResolutionTier::OneK,
        TierChoice::TwoK => ResolutionTier::TwoK,
        TierChoice::FourK => ResolutionTier::FourK,
        TierChoice::Auto => {
            let pixels = request.width.saturating_mul(request.height);
            let aspect = f64::from(request.width) / f64::from(request.height);
            if pixels >= policy.min_4k_input_pixels {
                ResolutionTier::FourK
            } else if pixels >= policy.min_2k_input_pixels {
                // Very wide or very tall inputs lose detail below 4k.
                if aspect > AUTO_EXTREME_RATIO || aspect < 1.0 / AUTO_EXTREME_RATIO {
                    ResolutionTier::FourK
                } else {
                    ResolutionTier::TwoK
                }
            } else {
                ResolutionTier::OneK
            }
        }
    }
}

pub fn aligned_dimensions(
    bucket: AspectBucket,
    tier: ResolutionTier,
    pixel_tolerance: f64,
) -> (u32, u32) {
    snap_to_budget(bucket.ratio(), f64::from(tier.pixel_budget()), pixel_tolerance)
}

fn snap_to_budget(ratio: f64, budget: f64, pixel_tolerance: f64) -> (u32, u32) {
    let raw_height = (budget / ratio).sqrt();
    let raw_width = raw_height * ratio;
    let mut width = round_to_alignment(raw_width);
    let mut height = round_to_alignment(raw_height);

    let product = f64::from(width) * f64::from(height);
    if (product - budget).abs() > budget * pixel_tolerance {
        // Single corrective step on the dimension the rounding moved furthest.
        let step = if product > budget {
            -i64::from(ALIGNMENT)
        } else {
            i64::from(ALIGNMENT)
        };
        let width_error = (f64::from(width) - raw_width).abs();
        let height_error = (f64::from(height) - raw_height).abs();
        if width_error >= height_error {
            width = nudge(width, step);
        } else {
            height = nudge(height, step);
        }
    }
    (width, height)
}

fn round_to_alignment(raw: f64) -> u32 {
    let steps = (raw / f64::from(ALIGNMENT)).round() as u32;
    steps.max(1) * ALIGNMENT
}

fn nudge(dimension: u32, step: i64) -> u32 {
    (i64::from(dimension) + step).max(i64::from(ALIGNMENT)) as u32
}

pub fn resolve_size(request: &SizeRequest, policy: &SizePolicy) -> Result<SafeSize, CoreError> {
    if request.width == 0 || request.height == 0 {
        return Err(CoreError::InvalidInput {
            width: request.width,
            height: request.height,
        });
    }
    let aspect = f64::from(request.width) / f64::from(request.height);
    let tier = resolve_tier(request, policy);
    let bucket = nearest_bucket(aspect);
    let (width, height) = aligned_dimensions(bucket, tier, policy.pixel_tolerance);
    Ok(SafeSize {
        width,
        height,
        bucket,
        tier,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(width: u32, height: u32, tier: TierChoice) -> SizeRequest {
        SizeRequest { width, height, tier }
    }

    const SWEEP_SHAPES: [(u32, u32); 9] = [
        (1, 1),
        (13, 7),
        (100, 800),
        (799, 601),
        (1920, 1080),
        (3024, 4032),
        (9999, 123),
        (123, 9999),
        (8192, 8192),
    ];

    #[test]
    fn full_hd_snaps_to_seven_by_four_at_one_k() {
        let size = resolve_size(&request(1920, 1080, TierChoice::OneK), &SizePolicy::default())
            .expect("resolution should succeed");
        assert_eq!(size.bucket, AspectBucket::new(7, 4));
        assert_eq!((size.width, size.height), (1344, 768));
    }

    #[test]
    fn square_input_selects_square_bucket_at_every_tier() {
        for (tier, expected) in [
            (TierChoice::OneK, 1024),
            (TierChoice::TwoK, 2048),
            (TierChoice::FourK, 4096),
        ] {
            let size = resolve_size(&request(900, 900, tier), &SizePolicy::default())
                .expect("resolution should succeed");
            assert_eq!(size.bucket, AspectBucket::new(1, 1));
            assert_eq!((size.width, size.height), (expected, expected));
        }
    }

    #[test]
    fn ratio_outside_catalog_clamps_to_widest_bucket() {
        let tall = resolve_size(&request(100, 800, TierChoice::OneK), &SizePolicy::default())
            .expect("resolution should succeed");
        assert_eq!(tall.bucket, AspectBucket::new(1, 4));
        assert_eq!((tall.width, tall.height), (512, 2048));

        let wide = resolve_size(&request(10_000, 100, TierChoice::OneK), &SizePolicy::default())
            .expect("resolution should succeed");
        assert_eq!(wide.bucket, AspectBucket::new(4, 1));
        assert_eq!((wide.width, wide.height), (2048, 512));
    }

    #[test]
    fn zero_dimension_is_rejected() {
        let policy = SizePolicy::default();
        assert_eq!(
            resolve_size(&request(0, 1080, TierChoice::OneK), &policy),
            Err(CoreError::InvalidInput { width: 0, height: 1080 })
        );
        assert_eq!(
            resolve_size(&request(1920, 0, TierChoice::Auto), &policy),
            Err(CoreError::InvalidInput { width: 1920, height: 0 })
        );
    }

    #[test]
    fn outputs_are_always_aligned_and_positive() {
        let policy = SizePolicy::default();
        for &(width, height) in &SWEEP_SHAPES {
            for tier in [
                TierChoice::Auto,
                TierChoice::OneK,
                TierChoice::TwoK,
                TierChoice::FourK,
            ] {
                let size = resolve_size(&request(width, height, tier), &policy)
                    .expect("resolution should succeed");
                assert!(size.width >= ALIGNMENT, "{size} for {width}x{height}");
                assert!(size.height >= ALIGNMENT, "{size} for {width}x{height}");
                assert_eq!(size.width % ALIGNMENT, 0, "{size} for {width}x{height}");
                assert_eq!(size.height % ALIGNMENT, 0, "{size} for {width}x{height}");
            }
        }
    }

    #[test]
    fn tier_scaling_is_monotonic() {
        let policy = SizePolicy::default();
        for &(width, height) in &SWEEP_SHAPES {
            let pixels = |tier| {
                let size = resolve_size(&request(width, height, tier), &policy)
                    .expect("resolution should succeed");
                u64::from(size.width) * u64::from(size.height)
            };
            let one_k = pixels(TierChoice::OneK);
            let two_k = pixels(TierChoice::TwoK);
            let four_k = pixels(TierChoice::FourK);
            assert!(one_k <= two_k, "{width}x{height}: {one_k} > {two_k}");
            assert!(two_k <= four_k, "{width}x{height}: {two_k} > {four_k}");
        }
    }

    #[test]
    fn transposed_inputs_produce_transposed_outputs() {
        let policy = SizePolicy::default();
        for &(width, height) in &[(1920, 1080), (640, 480), (832, 1248), (2000, 1500), (350, 1400)] {
            let landscape = resolve_size(&request(width, height, TierChoice::OneK), &policy)
                .expect("resolution should succeed");
            let portrait = resolve_size(&request(height, width, TierChoice::OneK), &policy)
                .expect("resolution should succeed");
            assert_eq!((landscape.width, landscape.height), (portrait.height, portrait.width));
        }
    }

    #[test]
    fn resolving_an_output_keeps_its_bucket() {
        let policy = SizePolicy::default();
        for &(width, height) in &SWEEP_SHAPES {
            for tier in [TierChoice::OneK, TierChoice::TwoK, TierChoice::FourK] {
                let first = resolve_size(&request(width, height, tier), &policy)
                    .expect("resolution should succeed");
                let second = resolve_size(&request(first.width, first.height, tier), &policy)
                    .expect("resolution should succeed");
                assert_eq!(second.bucket, first.bucket);
                assert_eq!((second.width, second.height), (first.width, first.height));
            }
        }
    }

    #[test]
    fn catalog_ratios_strictly_increase() {
        for pair in BUCKET_CATALOG.windows(2) {
            assert!(pair[0].ratio() < pair[1].ratio(), "{} vs {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn auto_tier_tracks_input_pixels() {
        let policy = SizePolicy::default();
        assert_eq!(
            resolve_tier(&request(640, 480, TierChoice::Auto), &policy),
            ResolutionTier::OneK
        );
        assert_eq!(
            resolve_tier(&request(1920, 1080, TierChoice::Auto), &policy),
            ResolutionTier::TwoK
        );
        assert_eq!(
            resolve_tier(&request(3840, 2160, TierChoice::Auto), &policy),
            ResolutionTier::FourK
        );
    }

    #[test]
    fn auto_tier_escalates_extreme_ratios() {
        let policy = SizePolicy::default();
        assert_eq!(
            resolve_tier(&request(3000, 1000, TierChoice::Auto), &policy),
            ResolutionTier::FourK
        );
        assert_eq!(
            resolve_tier(&request(1000, 3000, TierChoice::Auto), &policy),
            ResolutionTier::FourK
        );
        assert_eq!(
            resolve_tier(&request(2400, 1200, TierChoice::Auto), &policy),
            ResolutionTier::TwoK
        );
    }

    #[test]
    fn fixed_tier_ignores_policy_thresholds() {
        let policy = SizePolicy {
            min_2k_input_pixels: 1,
            min_4k_input_pixels: 1,
            ..SizePolicy::default()
        };
        assert_eq!(
            resolve_tier(&request(4096, 4096, TierChoice::OneK), &policy),
            ResolutionTier::OneK
        );
    }

    #[test]
    fn budget_nudge_moves_one_alignment_step() {
        // Synthetic budgets small enough for the minimum clamp to distort
        // the product; real tier budgets stay inside the band.
        assert_eq!(snap_to_budget(1.0, 2048.0, 0.05), (64, 32));
        assert_eq!(snap_to_budget(1.0, 2048.0, 1.0), (32, 32));
        assert_eq!(snap_to_budget(1.0, 2700.0, 0.01), (32, 64));
    }

    #[test]
    fn summary_line_is_stable() {
        let size = resolve_size(&request(1920, 1080, TierChoice::OneK), &SizePolicy::default())
            .expect("resolution should succeed");
        assert_eq!(size.to_string(), "1344x768 (7:4 @ 1k, 1.0MP)");
    }

    #[test]
    fn omitted_tier_defaults_to_one_k() {
        assert_eq!(TierChoice::default(), TierChoice::OneK);
    }
}
