// Mapping-quality estimation
//
// Translates the search's probability estimates for one read into a bounded
// confidence score. The score is a log-odds quality: -10 * log10 of the
// probability that the reported location is wrong, clamped to [0, 70], then
// reduced for repeat-cluster ambiguity and for edit distance.

use lazy_static::lazy_static;

/// Ceiling of the quality scale; a perfect unique match saturates here.
pub const MAX_MAPQ: u8 = 70;

lazy_static! {
    static ref MAPQ_PROBABILITY: [f64; MAX_MAPQ as usize + 1] = {
        let mut table = [0.0; MAX_MAPQ as usize + 1];
        for (q, p) in table.iter_mut().enumerate() {
            *p = 1.0 - 10f64.powf(-(q as f64) / 10.0);
        }
        table
    };
}

/// Probability that an alignment reported with quality `mapq` is at the
/// correct genome location.
pub fn mapq_to_probability(mapq: u8) -> f64 {
    MAPQ_PROBABILITY[mapq.min(MAX_MAPQ) as usize]
}

/// Compute the mapping quality of one aligned read.
///
/// `p_all` is the probability mass over every candidate placement the search
/// evaluated, `p_best` the mass of the reported candidate, `edit_distance`
/// the reported candidate's score, and `cluster_size` the number of
/// near-identical genome regions containing the candidate, when a similarity
/// map is available.
///
/// Panics if `p_all < p_best`, `p_best < 0`, or `p_all == 0`; those are
/// contract violations in the search engine, not conditions a caller can
/// recover from.
pub fn compute_mapq(p_all: f64, p_best: f64, edit_distance: u32, cluster_size: Option<u32>) -> u8 {
    assert!(
        p_all >= p_best,
        "best-candidate mass {} exceeds total mass {}",
        p_best,
        p_all
    );
    assert!(p_best >= 0.0, "negative candidate mass {}", p_best);
    assert!(p_all > 0.0, "zero total probability mass");

    let correctness = p_best / p_all;
    let mut mapq = if correctness >= 1.0 {
        MAX_MAPQ as i32
    } else {
        (MAX_MAPQ as i32).min((-10.0 * (1.0 - correctness).log10()) as i32)
    };

    // A big cluster of near-identical regions means the read could belong to
    // any member; the penalty is deliberately gentle.
    if let Some(cluster) = cluster_size {
        mapq = (mapq - (cluster / 4000) as i32).max(0);
    }

    // Fixed linear penalty per edit away from a perfect match.
    mapq = (mapq - 2 * edit_distance as i32).max(0);

    mapq as u8
}
