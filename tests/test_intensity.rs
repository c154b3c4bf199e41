use seismo_rust::intensity::{
    composite_acceleration, AxisFilter, IntensityEstimator, RingBuffer, SeismometerConfig,
};

const ADC_TO_GAL: f32 = 1.13426;

fn settled_filter(level: u16) -> AxisFilter {
    let mut filter = AxisFilter::new(&SeismometerConfig::default());
    for _ in 0..600 {
        filter.update(level);
    }
    filter
}

// ============================================================
// Step response while the one-second offset window refreshes
// ============================================================
#[test]
fn test_step_response_tracks_offset_refresh() {
    let delta = 100.0_f32;
    let mut filter = settled_filter(2048);
    assert!(filter.filtered().abs() < 0.01);

    for k in 1..=400 {
        let filtered = filter.update(2148);
        if k == 50 || k == 100 || k == 150 {
            let smoothed_fraction = 1.0 - 0.94_f32.powi(k);
            let offset_fraction = k as f32 / 200.0;
            let expected = delta * (smoothed_fraction - offset_fraction) * ADC_TO_GAL;
            assert!(
                (filtered - expected).abs() < 0.05,
                "tick {}: filtered {} expected {}",
                k,
                filtered,
                expected
            );
        }
    }

    // Offset window fully refreshed: the step is absorbed into the baseline.
    assert!(filter.filtered().abs() < 0.01, "got {}", filter.filtered());
}

#[test]
fn test_step_response_peaks_before_offset_catches_up() {
    let mut filter = settled_filter(2048);
    let peak = (0..200)
        .map(|_| filter.update(2148))
        .fold(f32::MIN, f32::max);
    // 100 * (1 - 0.94^k - k/200) peaks near k = 41 at about 71.6 counts.
    assert!(peak > 75.0 && peak < 85.0, "peak {}", peak);
}

// ============================================================
// Percentile pick
// ============================================================
#[test]
fn test_top_300_of_1000_at_rank_60() {
    let mut est = IntensityEstimator::with_window(1000, 60, 2.0, 0.94);
    let mut intensity = 0.0;
    for i in 0..1000 {
        let value = if i % 10 < 3 { 10.0 } else { 0.0 };
        intensity = est.update(value);
    }
    assert_eq!(est.pick(), 10.0);
    assert!((intensity - 2.94).abs() < 1e-9, "got {}", intensity);
}

#[test]
fn test_reference_config_matches_literal_rank() {
    // Rank is 0.3 x rate into a 5 x rate window, not 30% of the window.
    let est = IntensityEstimator::new(&SeismometerConfig::default());
    assert_eq!(est.percentile_rank(), 60);
    assert_eq!(est.capacity(), 1000);
}

#[test]
fn test_pick_is_sixty_first_largest() {
    let mut est = IntensityEstimator::new(&SeismometerConfig::default());
    for i in 1..=1000 {
        est.update(i as f32);
    }
    assert_eq!(est.pick(), 940.0);
    let expected = 2.0 * 940.0_f64.log10() + 0.94;
    assert!((est.intensity() - expected).abs() < 1e-12);
}

// ============================================================
// Ring buffer and composite
// ============================================================
#[test]
fn test_ring_buffer_keeps_latest_window() {
    let mut buf = RingBuffer::<f32>::new(8);
    for k in 1..=20 {
        buf.push(k as f32);
        let sorted = buf.sorted_descending();
        assert_eq!(sorted.len(), 8);
        assert!(sorted.windows(2).all(|w| w[0] >= w[1]));

        let written = k.min(8);
        let latest: Vec<f32> = (k - written + 1..=k).rev().map(|v| v as f32).collect();
        assert_eq!(&sorted[..written], latest.as_slice());
        assert!(sorted[written..].iter().all(|&v| v == 0.0));
    }
}

#[test]
fn test_composite_of_filtered_axes() {
    let mut x = settled_filter(2048);
    let mut y = settled_filter(2048);
    let mut z = settled_filter(2048);

    let ax = x.update(2148);
    let ay = y.update(2048);
    let az = z.update(1948);
    let composite = composite_acceleration([ax, ay, az]);

    assert!(ax > 0.0 && az < 0.0);
    assert!((composite - (ax * ax + ay * ay + az * az).sqrt()).abs() < 1e-6);
}
