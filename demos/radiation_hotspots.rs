use hotspot::{StreamingKmeans, VecSource};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Minimal end-to-end: synthetic geotagged readings -> streaming k-means
    // -> hotspot centroids.
    //
    // This example intentionally stays small: it exists primarily to show
    // the Source-plus-engine wiring against data that has an obvious answer.

    // Two dense regions of (latitude, longitude) readings, roughly around
    // Fukushima and Chernobyl, plus a couple of corrupt rows that upstream
    // parsing let through.
    // Interleaved so that first-K-seen seeding picks one seed per region.
    let mut readings: Vec<Vec<f64>> = Vec::new();
    for i in 0..200 {
        let jitter = (i as f64 * 0.731).sin() * 0.25;
        readings.push(vec![37.4 + jitter, 141.0 - jitter]);
        if i < 150 {
            let jitter = (i as f64 * 0.547).cos() * 0.25;
            readings.push(vec![51.3 - jitter, 30.1 + jitter]);
        }
    }
    readings.push(vec![f64::NAN, 141.0]);
    readings.push(vec![51.3, f64::INFINITY]);

    let source = VecSource::new(readings);

    let fit = StreamingKmeans::new(2).with_max_iter(10).fit(&source)?;

    println!("passes={} skipped={}", fit.stats.passes, fit.stats.skipped_non_finite);
    for (k, centroid) in fit.centroids.rows().into_iter().enumerate() {
        println!(
            "  hotspot {}: lat={:.3} lon={:.3} (assigned {})",
            k,
            centroid[0],
            centroid[1],
            fit.stats.last_pass_counts[k]
        );
    }

    Ok(())
}
