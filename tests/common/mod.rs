use geocluster::Options;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub fn get_options(radius: f64, extent: f64, min_points: usize, max_zoom: u8) -> Options {
    Options {
        radius,
        extent,
        max_zoom,
        min_zoom: 0,
        min_points,
        node_size: 64,
    }
}

/// Reproducible points spread over the inhabitable part of the globe.
pub fn world_points(count: usize, seed: u64) -> Vec<(f64, f64)> {
    let mut rng = StdRng::seed_from_u64(seed);

    (0..count)
        .map(|_| {
            (
                rng.gen_range(-180.0..180.0),
                rng.gen_range(-85.0..85.0),
            )
        })
        .collect()
}
