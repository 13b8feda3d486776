//! Performance clustering
//!
//! Fixed k=3 k-means over raw session feature vectors: random distinct
//! initial centroids, exactly ten assignment/update rounds, no convergence
//! test. An empty cluster keeps its previous centroid.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::insights::types::{ClusterCharacteristics, ClusterLabel, PerformanceCluster};
use crate::stats;
use crate::types::{AgentRole, PerformanceMetric, Session};

pub const CLUSTER_COUNT: usize = 3;
pub const CLUSTER_ITERATIONS: usize = 10;

/// Feature vector layout
pub const FEATURE_NAMES: [&str; 6] = [
    "message_count",
    "error_count",
    "tool_calls",
    "avg_response_ms",
    "cost",
    "duration_ms",
];

/// Clustering input for one session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionFeatures {
    pub session_id: String,
    pub vector: [f64; 6],
    pub score: f64,
    pub manager_messages: usize,
    pub worker_messages: usize,
}

impl SessionFeatures {
    pub fn extract(session: &Session, metrics: &[PerformanceMetric]) -> Self {
        Self {
            session_id: session.id.clone(),
            vector: [
                session.message_count() as f64,
                session.error_count() as f64,
                session.tool_call_count() as f64,
                session.avg_response_time(metrics).unwrap_or(0.0),
                session.total_cost(metrics),
                session.duration_ms().unwrap_or(0.0),
            ],
            score: session.success_score(),
            manager_messages: session.role_count(AgentRole::Manager),
            worker_messages: session.role_count(AgentRole::Worker),
        }
    }
}

/// Cluster sessions into high, average and under performers
///
/// Always returns exactly three clusters whose session lists partition the
/// input. `seed` makes the initial centroid choice reproducible.
pub fn cluster_sessions(features: &[SessionFeatures], seed: Option<u64>) -> Vec<PerformanceCluster> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut centroids = initial_centroids(features, &mut rng);
    let mut assignment = vec![0usize; features.len()];

    for _ in 0..CLUSTER_ITERATIONS {
        for (i, f) in features.iter().enumerate() {
            assignment[i] = nearest(&centroids, &f.vector);
        }
        for (k, centroid) in centroids.iter_mut().enumerate() {
            let members: Vec<&SessionFeatures> = features
                .iter()
                .zip(&assignment)
                .filter(|(_, a)| **a == k)
                .map(|(f, _)| f)
                .collect();
            if !members.is_empty() {
                *centroid = mean_vector(&members);
            }
        }
    }

    let mut groups: Vec<(Vec<f64>, Vec<&SessionFeatures>)> = centroids
        .into_iter()
        .enumerate()
        .map(|(k, centroid)| {
            let members: Vec<&SessionFeatures> = features
                .iter()
                .zip(&assignment)
                .filter(|(_, a)| **a == k)
                .map(|(f, _)| f)
                .collect();
            (centroid, members)
        })
        .collect();

    // Empty clusters rank last
    groups.sort_by(|a, b| {
        group_score(&b.1)
            .partial_cmp(&group_score(&a.1))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    groups
        .into_iter()
        .zip(ClusterLabel::ranked())
        .map(|((centroid, members), label)| build_cluster(label, centroid, &members))
        .collect()
}

fn initial_centroids(features: &[SessionFeatures], rng: &mut StdRng) -> Vec<Vec<f64>> {
    let mut indices: Vec<usize> = (0..features.len()).collect();
    indices.shuffle(rng);

    let mut centroids: Vec<Vec<f64>> = Vec::with_capacity(CLUSTER_COUNT);
    for &i in &indices {
        if centroids.len() == CLUSTER_COUNT {
            break;
        }
        let candidate = features[i].vector.to_vec();
        if !centroids.contains(&candidate) {
            centroids.push(candidate);
        }
    }
    // Fewer distinct points than clusters: pad with copies, which stay empty
    while centroids.len() < CLUSTER_COUNT {
        let filler = centroids.last().cloned().unwrap_or_else(|| vec![0.0; FEATURE_NAMES.len()]);
        centroids.push(filler);
    }
    centroids
}

fn nearest(centroids: &[Vec<f64>], point: &[f64]) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (k, centroid) in centroids.iter().enumerate() {
        let d = stats::euclidean_distance(centroid, point);
        if d < best_distance {
            best = k;
            best_distance = d;
        }
    }
    best
}

fn mean_vector(members: &[&SessionFeatures]) -> Vec<f64> {
    (0..FEATURE_NAMES.len())
        .map(|d| members.iter().map(|m| m.vector[d]).sum::<f64>() / members.len() as f64)
        .collect()
}

fn group_score(members: &[&SessionFeatures]) -> f64 {
    if members.is_empty() {
        return f64::NEG_INFINITY;
    }
    members.iter().map(|m| m.score).sum::<f64>() / members.len() as f64
}

fn build_cluster(label: ClusterLabel, centroid: Vec<f64>, members: &[&SessionFeatures]) -> PerformanceCluster {
    let avg = |d: usize| {
        if members.is_empty() {
            0.0
        } else {
            members.iter().map(|m| m.vector[d]).sum::<f64>() / members.len() as f64
        }
    };
    let manager: usize = members.iter().map(|m| m.manager_messages).sum();
    let worker: usize = members.iter().map(|m| m.worker_messages).sum();
    let manager_worker_ratio = if worker > 0 {
        manager as f64 / worker as f64
    } else {
        manager as f64
    };

    let characteristics = ClusterCharacteristics {
        avg_messages: avg(0),
        avg_errors: avg(1),
        avg_tool_calls: avg(2),
        avg_response_ms: avg(3),
        avg_cost: avg(4),
        avg_duration_ms: avg(5),
        manager_worker_ratio,
    };

    PerformanceCluster {
        label,
        improvement_areas: improvement_areas(&characteristics),
        centroid,
        sessions: members.iter().map(|m| m.session_id.clone()).collect(),
        avg_score: if members.is_empty() { 0.0 } else { group_score(members) },
        characteristics,
    }
}

fn improvement_areas(c: &ClusterCharacteristics) -> Vec<String> {
    let mut areas = Vec::new();
    if c.avg_errors > 2.0 {
        areas.push(format!("Reduce error count (avg {:.1} per session)", c.avg_errors));
    }
    if c.avg_response_ms > 5000.0 {
        areas.push(format!("Improve response times (avg {:.0}ms)", c.avg_response_ms));
    }
    if c.manager_worker_ratio > 2.0 {
        areas.push("Rebalance work: manager sends more than twice the worker's messages".to_string());
    }
    if c.avg_cost > 10.0 {
        areas.push(format!("Reduce session cost (avg ${:.2})", c.avg_cost));
    }
    areas
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;
    use std::collections::HashSet;

    fn features(id: &str, vector: [f64; 6], score: f64) -> SessionFeatures {
        SessionFeatures {
            session_id: id.to_string(),
            vector,
            score,
            manager_messages: 5,
            worker_messages: 5,
        }
    }

    #[test]
    fn test_separated_groups_are_ranked() {
        let mut input = Vec::new();
        // Three distinct shapes, so every initial draw takes one centroid from each
        for i in 0..4 {
            input.push(features(&format!("good{}", i), [10.0, 0.0, 3.0, 1000.0, 1.0, 60_000.0], 1.0));
            input.push(features(&format!("mid{}", i), [30.0, 1.0, 8.0, 3000.0, 3.0, 300_000.0], 0.6));
            input.push(features(&format!("bad{}", i), [80.0, 6.0, 20.0, 9000.0, 12.0, 900_000.0], 0.1));
        }

        let clusters = cluster_sessions(&input, Some(7));
        assert_eq!(clusters.len(), 3);
        assert_eq!(clusters[0].label, ClusterLabel::HighPerformers);
        assert_eq!(clusters[2].label, ClusterLabel::UnderPerformers);
        assert!(clusters[0].avg_score >= clusters[1].avg_score);

        assert!(clusters[0].sessions.iter().all(|s| s.starts_with("good")));
        let under = &clusters[2];
        assert_eq!(under.sessions.len(), 4);
        assert!(under.sessions.iter().all(|s| s.starts_with("bad")));
        assert_eq!(under.improvement_areas.len(), 3);
    }

    #[test]
    fn test_fewer_sessions_than_clusters() {
        let input = vec![features("only", [1.0; 6], 0.9)];
        let clusters = cluster_sessions(&input, Some(1));
        assert_eq!(clusters.len(), 3);
        assert_eq!(clusters[0].sessions, vec!["only".to_string()]);
        assert!(clusters[1].sessions.is_empty());

        assert_eq!(cluster_sessions(&[], None).len(), 3);
    }

    #[test]
    fn test_seed_is_reproducible() {
        let input: Vec<SessionFeatures> = (0..12)
            .map(|i| features(&format!("s{}", i), [i as f64 * 3.0, (i % 4) as f64, 2.0, 1000.0 * i as f64, 1.0, 1.0], 0.5))
            .collect();
        let a = cluster_sessions(&input, Some(42));
        let b = cluster_sessions(&input, Some(42));
        assert_eq!(a, b);
    }

    #[quickcheck]
    fn prop_clusters_partition_input(raw: Vec<(u8, u8, u16)>, seed: u64) -> bool {
        let input: Vec<SessionFeatures> = raw
            .iter()
            .enumerate()
            .map(|(i, (m, e, r))| {
                features(
                    &format!("s{}", i),
                    [*m as f64, *e as f64, 0.0, *r as f64, 0.0, 0.0],
                    (*m % 10) as f64 / 10.0,
                )
            })
            .collect();

        let clusters = cluster_sessions(&input, Some(seed));
        let assigned: Vec<&String> = clusters.iter().flat_map(|c| c.sessions.iter()).collect();
        let unique: HashSet<&String> = assigned.iter().copied().collect();

        clusters.len() == CLUSTER_COUNT
            && assigned.len() == input.len()
            && unique.len() == input.len()
    }
}
