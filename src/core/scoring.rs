use crate::models::{CandidateHelper, HelperProfile, MatchRequest, ScoreBreakdown, ScoringWeights};

/// Helpers below this distance get the proximity boost
const NEARBY_KM: f64 = 1.0;
const NEARBY_BOOST: f64 = 1.2;

/// Helpers answering faster than this get the responsiveness boost
const FAST_RESPONSE_SECS: f64 = 10.0;
const FAST_RESPONSE_BOOST: f64 = 1.1;

/// Reviews needed before a rating is trusted at face value
const FULL_CONFIDENCE_REVIEWS: f64 = 50.0;
const NEUTRAL_RATING_SCORE: f64 = 3.0 / 5.0;

const VERSATILITY_BONUS_PER_SKILL: f64 = 0.02;
const MAX_VERSATILITY_BONUS: f64 = 0.1;

/// Score assumed when no profile is cached for the helper
const UNKNOWN_SKILL_SCORE: f64 = 0.5;

/// Established helpers rated below the threshold are halved
const LOW_RATING_PENALTY: f64 = 0.5;
const PENALTY_MIN_REVIEWS: u32 = 5;

/// Everything besides the candidate that scoring depends on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringParams {
    pub weights: ScoringWeights,
    pub min_rating_threshold: f64,
    pub max_distance_km: f64,
    pub max_response_time_secs: f64,
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            min_rating_threshold: 3.0,
            max_distance_km: 10.0,
            max_response_time_secs: 300.0,
        }
    }
}

/// Skills the helper has and lacks for a job, compared case-insensitively
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SkillMatch {
    pub matched: Vec<String>,
    pub missing: Vec<String>,
    pub extra: usize,
}

pub fn match_skills(required: &[String], offered: &[String]) -> SkillMatch {
    let offered_lower: Vec<String> = offered.iter().map(|s| s.trim().to_lowercase()).collect();
    let required_lower: Vec<String> = required.iter().map(|s| s.trim().to_lowercase()).collect();

    let mut result = SkillMatch::default();
    for (skill, lower) in required.iter().zip(&required_lower) {
        if offered_lower.contains(lower) {
            result.matched.push(skill.clone());
        } else {
            result.missing.push(skill.clone());
        }
    }

    result.extra = offered_lower
        .iter()
        .filter(|skill| !required_lower.contains(skill))
        .count();
    result
}

/// Proximity score (0-1), exponentially decaying with distance
#[inline]
pub fn proximity_score(distance_km: f64, max_distance_km: f64) -> f64 {
    if max_distance_km <= 0.0 || distance_km >= max_distance_km {
        return 0.0;
    }

    let mut score = (-3.0 * distance_km.max(0.0) / max_distance_km).exp();
    if distance_km < NEARBY_KM {
        score *= NEARBY_BOOST;
    }
    score.clamp(0.0, 1.0)
}

/// Rating score (0-1), pulled toward neutral until enough reviews exist
#[inline]
pub fn rating_score(rating: f64, review_count: u32) -> f64 {
    let raw = (rating / 5.0).clamp(0.0, 1.0);
    let confidence = (review_count as f64 / FULL_CONFIDENCE_REVIEWS).min(1.0);

    (confidence * raw + (1.0 - confidence) * NEUTRAL_RATING_SCORE).clamp(0.0, 1.0)
}

/// Response-time score (0-1), linear down to zero at the threshold
#[inline]
pub fn response_time_score(avg_response_secs: f64, max_response_secs: f64) -> f64 {
    if max_response_secs <= 0.0 || avg_response_secs >= max_response_secs {
        return 0.0;
    }

    let mut score = 1.0 - avg_response_secs.max(0.0) / max_response_secs;
    if avg_response_secs < FAST_RESPONSE_SECS {
        score *= FAST_RESPONSE_BOOST;
    }
    score.clamp(0.0, 1.0)
}

/// Skill score (0-1)
///
/// No requirement scores 1.0; an unknown helper scores 0.5; a known helper
/// listing no skills scores 0.0.
pub fn skill_score(required: &[String], profile: Option<&HelperProfile>) -> (f64, SkillMatch) {
    if required.is_empty() {
        return (1.0, SkillMatch::default());
    }

    let Some(profile) = profile else {
        return (
            UNKNOWN_SKILL_SCORE,
            SkillMatch {
                missing: required.to_vec(),
                ..SkillMatch::default()
            },
        );
    };

    let skills = match_skills(required, &profile.skills);
    if profile.skills.is_empty() {
        return (0.0, skills);
    }

    let coverage = skills.matched.len() as f64 / required.len() as f64;
    let bonus = (skills.extra as f64 * VERSATILITY_BONUS_PER_SKILL).min(MAX_VERSATILITY_BONUS);
    ((coverage + bonus).clamp(0.0, 1.0), skills)
}

/// Whether the low-rating penalty applies to this track record
#[inline]
pub fn has_poor_track_record(rating: f64, review_count: u32, min_rating_threshold: f64) -> bool {
    rating < min_rating_threshold && review_count > PENALTY_MIN_REVIEWS
}

/// Score one candidate against a request
///
/// Pure function of its inputs. A missing profile is scored with the neutral
/// defaults from `HelperProfile::neutral`.
///
/// Scoring formula:
/// total = (
///     proximity * w.proximity +
///     rating * w.rating +
///     response_time * w.response_time +
///     skill * w.skill_match
/// ) * (0.5 if established and rated below threshold)
pub fn score_candidate(
    candidate: &CandidateHelper,
    profile: Option<&HelperProfile>,
    request: &MatchRequest,
    params: &ScoringParams,
) -> (ScoreBreakdown, SkillMatch) {
    let neutral;
    let effective = match profile {
        Some(p) => p,
        None => {
            neutral = HelperProfile::neutral(candidate.helper_id.as_str());
            &neutral
        }
    };

    let weights = params.weights.normalized();

    let proximity = proximity_score(candidate.distance_km, params.max_distance_km);
    let rating = rating_score(effective.rating, effective.review_count);
    let response_time = response_time_score(effective.avg_response_secs, params.max_response_time_secs);
    let (skill, skills) = skill_score(&request.required_skills, profile);

    let mut total = proximity * weights.proximity
        + rating * weights.rating
        + response_time * weights.response_time
        + skill * weights.skill_match;

    if has_poor_track_record(effective.rating, effective.review_count, params.min_rating_threshold) {
        total *= LOW_RATING_PENALTY;
    }

    let breakdown = ScoreBreakdown {
        proximity,
        rating,
        response_time,
        skill,
        total: total.clamp(0.0, 1.0),
    };
    (breakdown, skills)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(distance_km: f64) -> CandidateHelper {
        CandidateHelper::new("h-1", 40.7128, -74.0060, distance_km, distance_km * 3.0)
    }

    fn profile(rating: f64, reviews: u32, response_secs: f64, skills: &[&str]) -> HelperProfile {
        HelperProfile {
            helper_id: "h-1".to_string(),
            rating,
            review_count: reviews,
            avg_response_secs: response_secs,
            completion_rate: 0.95,
            skills: skills.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn request(skills: &[&str]) -> MatchRequest {
        MatchRequest::new("job-1", "req-1", 40.7128, -74.0060).with_skills(skills.iter().copied())
    }

    #[test]
    fn test_proximity_score() {
        // Very close = boosted and capped
        assert_eq!(proximity_score(0.1, 10.0), 1.0);

        // At max distance = zero score
        assert_eq!(proximity_score(10.0, 10.0), 0.0);
        assert_eq!(proximity_score(25.0, 10.0), 0.0);

        // Half distance = e^-1.5
        let half = proximity_score(5.0, 10.0);
        assert!((half - (-1.5f64).exp()).abs() < 1e-9);
    }

    #[test]
    fn test_rating_score_confidence_blend() {
        // No reviews = neutral regardless of rating
        assert!((rating_score(5.0, 0) - 0.6).abs() < 1e-9);
        assert!((rating_score(1.0, 0) - 0.6).abs() < 1e-9);

        // Established = close to true rating
        assert!((rating_score(4.8, 120) - 0.96).abs() < 1e-9);

        // Halfway confidence blends evenly
        let blended = rating_score(5.0, 25);
        assert!((blended - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_response_time_score() {
        assert_eq!(response_time_score(300.0, 300.0), 0.0);
        assert!((response_time_score(150.0, 300.0) - 0.5).abs() < 1e-9);

        // Boost pushes past 1.0 and is capped
        assert_eq!(response_time_score(8.0, 300.0), 1.0);

        let boosted = response_time_score(9.0, 20.0);
        assert!((boosted - 0.55 * 1.1).abs() < 1e-9);
    }

    #[test]
    fn test_skill_score_cases() {
        let required = vec!["plumbing".to_string()];

        assert_eq!(skill_score(&[], None).0, 1.0);
        assert_eq!(skill_score(&required, None).0, 0.5);
        assert_eq!(skill_score(&required, Some(&profile(4.5, 10, 30.0, &[]))).0, 0.0);

        let (full, skills) = skill_score(&required, Some(&profile(4.5, 10, 30.0, &["Plumbing"])));
        assert_eq!(full, 1.0);
        assert_eq!(skills.matched, vec!["plumbing"]);

        let two = vec!["plumbing".to_string(), "electrical".to_string()];
        let (half, skills) = skill_score(&two, Some(&profile(4.5, 10, 30.0, &["plumbing", "painting"])));
        assert!((half - 0.52).abs() < 1e-9);
        assert_eq!(skills.missing, vec!["electrical"]);
        assert_eq!(skills.extra, 1);
    }

    #[test]
    fn test_versatility_bonus_is_capped() {
        let two = vec!["plumbing".to_string(), "electrical".to_string()];
        let many = profile(4.5, 10, 30.0, &["plumbing", "a", "b", "c", "d", "e", "f", "g", "h"]);

        let (score, _) = skill_score(&two, Some(&many));
        assert!((score - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_strong_nearby_candidate_scores_high() {
        let params = ScoringParams::default();
        let (scores, _) = score_candidate(
            &candidate(0.5),
            Some(&profile(4.8, 120, 8.0, &["plumbing"])),
            &request(&["plumbing"]),
            &params,
        );

        assert!(scores.proximity >= 0.85);
        assert!(scores.rating > 0.9);
        assert!(scores.response_time > 0.99);
        assert_eq!(scores.skill, 1.0);
        assert!(scores.total > 0.95);
    }

    #[test]
    fn test_low_rating_penalty_only_for_established_helpers() {
        let params = ScoringParams::default();
        let req = request(&[]);

        let (established, _) = score_candidate(&candidate(2.0), Some(&profile(2.5, 40, 30.0, &[])), &req, &params);
        let (newcomer, _) = score_candidate(&candidate(2.0), Some(&profile(2.5, 3, 30.0, &[])), &req, &params);

        let unpenalized = established.proximity * 0.35
            + established.rating * 0.25
            + established.response_time * 0.20
            + established.skill * 0.20;
        assert!((established.total - unpenalized * 0.5).abs() < 1e-9);
        assert!(newcomer.total > established.total);
    }

    #[test]
    fn test_missing_profile_uses_neutral_defaults() {
        let params = ScoringParams::default();
        let (scores, skills) = score_candidate(&candidate(2.0), None, &request(&["plumbing"]), &params);

        assert!((scores.rating - 0.6).abs() < 1e-9);
        assert!((scores.response_time - 0.8).abs() < 1e-9);
        assert_eq!(scores.skill, 0.5);
        assert_eq!(skills.missing, vec!["plumbing"]);
    }

    #[test]
    fn test_scores_stay_in_unit_interval() {
        let params = ScoringParams::default();
        let distances = [0.0, 0.2, 0.99, 1.0, 5.0, 9.99, 10.0, 50.0];
        let ratings = [0.0, 1.0, 2.9, 3.0, 4.5, 5.0];
        let reviews = [0, 5, 6, 50, 500];
        let responses = [0.0, 5.0, 9.9, 10.0, 120.0, 300.0, 900.0];
        let skill_sets: [&[&str]; 3] = [&[], &["plumbing"], &["plumbing", "x", "y", "z"]];

        for &d in &distances {
            for &rating in &ratings {
                for &count in &reviews {
                    for &resp in &responses {
                        for skills in skill_sets {
                            let p = profile(rating, count, resp, skills);
                            let (s, _) = score_candidate(&candidate(d), Some(&p), &request(&["plumbing"]), &params);
                            for value in [s.proximity, s.rating, s.response_time, s.skill, s.total] {
                                assert!((0.0..=1.0).contains(&value), "score {} out of range", value);
                            }
                        }
                    }
                }
            }
        }
    }
}
