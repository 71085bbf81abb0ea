// Criterion benchmarks for Helper Match

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use helper_match::core::{
    distance::{estimate_eta_minutes, haversine_distance},
    hexgrid::HexGrid,
    scoring::{score_candidate, ScoringParams},
    HelperRanker,
};
use helper_match::models::{CandidateHelper, HelperProfile, MatchRequest};

const LAT: f64 = 40.7128;
const LNG: f64 = -74.0060;

fn create_candidate(id: usize) -> CandidateHelper {
    let offset = (id as f64 * 0.0007) % 0.05;
    let distance = haversine_distance(LAT, LNG, LAT + offset, LNG + offset);
    CandidateHelper::new(
        format!("h-{}", id),
        LAT + offset,
        LNG + offset,
        distance,
        estimate_eta_minutes(distance, 20.0),
    )
}

fn create_profile(id: usize) -> HelperProfile {
    HelperProfile {
        helper_id: format!("h-{}", id),
        rating: 3.0 + (id % 20) as f64 / 10.0,
        review_count: (id * 7 % 120) as u32,
        avg_response_secs: (id % 300) as f64,
        completion_rate: 0.9,
        skills: if id % 3 == 0 {
            vec!["plumbing".to_string(), "painting".to_string()]
        } else {
            vec!["cleaning".to_string()]
        },
    }
}

fn bench_haversine_distance(c: &mut Criterion) {
    c.bench_function("haversine_distance", |b| {
        b.iter(|| {
            haversine_distance(
                black_box(40.7128),
                black_box(-74.0060),
                black_box(40.72),
                black_box(-74.01),
            )
        });
    });
}

fn bench_hexgrid(c: &mut Criterion) {
    let grid = HexGrid::default();
    let center = grid.cell_for(LAT, LNG);

    c.bench_function("cell_for", |b| {
        b.iter(|| grid.cell_for(black_box(LAT), black_box(LNG)));
    });

    let mut group = c.benchmark_group("ring_around");
    for k in [1u32, 3, 6].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(k), k, |b, &k| {
            b.iter(|| HexGrid::ring_around(black_box(center), k));
        });
    }
    group.finish();
}

fn bench_scoring(c: &mut Criterion) {
    let request = MatchRequest::new("job-1", "req-1", LAT, LNG).with_skills(["plumbing"]);
    let params = ScoringParams::default();

    let mut group = c.benchmark_group("scoring");

    for candidate_count in [10, 50, 200].iter() {
        let candidates: Vec<(CandidateHelper, HelperProfile)> = (0..*candidate_count)
            .map(|i| (create_candidate(i), create_profile(i)))
            .collect();

        group.bench_with_input(
            BenchmarkId::new("score_and_sort", candidate_count),
            candidate_count,
            |b, _| {
                b.iter(|| {
                    let mut scored: Vec<CandidateHelper> = candidates
                        .iter()
                        .map(|(candidate, profile)| {
                            let (scores, _) = score_candidate(candidate, Some(profile), &request, &params);
                            let mut candidate = candidate.clone();
                            candidate.scores = scores;
                            candidate
                        })
                        .collect();
                    scored.sort_by(|a, b| b.total_score().total_cmp(&a.total_score()));
                    black_box(HelperRanker::top_n(&scored, 10))
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_haversine_distance, bench_hexgrid, bench_scoring);

criterion_main!(benches);
