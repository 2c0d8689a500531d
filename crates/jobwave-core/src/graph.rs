//! Dependency grapher: DAG construction, cycle detection, and wave partitioning.
//!
//! Uses `petgraph` to model job dependencies as a directed graph. Topological
//! sort detects cycles (Tarjan SCC then names every job on one), and depth
//! layering produces waves where all jobs in a wave can run concurrently.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use jobwave_types::job::{Job, Wave};
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Construction errors. Any of these fails the whole partition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// The dependency relation contains at least one cycle.
    #[error("cycle detected involving jobs: {}", jobs.join(", "))]
    CycleDetected { jobs: Vec<String> },

    /// A job depends on an ID that is neither in the set nor satisfied externally.
    #[error("job '{job}' depends on unknown job '{dependency}'")]
    UnknownDependency { job: String, dependency: String },

    /// Two jobs share an ID.
    #[error("duplicate job id '{0}'")]
    DuplicateJob(String),

    /// An explicit wave override would run a job before one of its dependencies.
    #[error("job '{job}' pinned to wave {requested} but its dependencies need wave {minimum} or later")]
    InvalidWaveOverride {
        job: String,
        requested: u32,
        minimum: u32,
    },

    /// A dependency sits in the last representable wave, so nothing can follow it.
    #[error("job '{job}' depends on '{dependency}' in wave {wave}, which has no later wave")]
    WaveOverflow {
        job: String,
        dependency: String,
        wave: u32,
    },
}

// ---------------------------------------------------------------------------
// Graph construction
// ---------------------------------------------------------------------------

/// Directed graph with an edge from each dependency to its dependent.
struct JobGraph<'a> {
    graph: DiGraph<&'a str, ()>,
    index: HashMap<&'a str, NodeIndex>,
}

fn build_graph<'a>(
    jobs: &'a [Job],
    satisfied_externally: &HashSet<String>,
) -> Result<JobGraph<'a>, GraphError> {
    let mut graph = DiGraph::<&str, ()>::with_capacity(jobs.len(), jobs.len());
    let mut index: HashMap<&str, NodeIndex> = HashMap::with_capacity(jobs.len());

    for job in jobs {
        let node = graph.add_node(job.id.as_str());
        if index.insert(job.id.as_str(), node).is_some() {
            return Err(GraphError::DuplicateJob(job.id.clone()));
        }
    }

    for job in jobs {
        let to = index[job.id.as_str()];
        for dep in &job.depends_on {
            match index.get(dep.as_str()) {
                Some(&from) => {
                    graph.update_edge(from, to, ());
                }
                None if satisfied_externally.contains(dep) => {}
                None => {
                    return Err(GraphError::UnknownDependency {
                        job: job.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }
    }

    Ok(JobGraph { graph, index })
}

/// Every job that sits on a cycle, sorted.
fn cycle_members(graph: &DiGraph<&str, ()>) -> Vec<String> {
    let mut members: Vec<String> = tarjan_scc(graph)
        .into_iter()
        .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
        .flatten()
        .map(|node| graph[node].to_string())
        .collect();
    members.sort();
    members
}

// ---------------------------------------------------------------------------
// Wave assignment
// ---------------------------------------------------------------------------

/// Compute the effective wave of every job.
///
/// `wave(j) = 0` without in-set dependencies, otherwise
/// `1 + max(wave(d))`. An explicit override replaces the computed value when
/// it is at least as late; dependents are computed from the overridden value.
pub fn assign_waves(
    jobs: &[Job],
    satisfied_externally: &HashSet<String>,
) -> Result<HashMap<String, u32>, GraphError> {
    let JobGraph { graph, index } = build_graph(jobs, satisfied_externally)?;

    let sorted = toposort(&graph, None).map_err(|_| GraphError::CycleDetected {
        jobs: cycle_members(&graph),
    })?;

    let by_id: HashMap<&str, &Job> = jobs.iter().map(|j| (j.id.as_str(), j)).collect();
    let mut waves: HashMap<String, u32> = HashMap::with_capacity(jobs.len());

    for node in sorted {
        let job_id = graph[node];
        let job = by_id[job_id];
        let mut minimum = 0;
        for dep in job.depends_on.iter().filter(|dep| index.contains_key(dep.as_str())) {
            let dep_wave = waves[dep.as_str()];
            let after = dep_wave.checked_add(1).ok_or_else(|| GraphError::WaveOverflow {
                job: job.id.clone(),
                dependency: dep.clone(),
                wave: dep_wave,
            })?;
            minimum = minimum.max(after);
        }

        let wave = match job.wave {
            Some(requested) if requested < minimum => {
                return Err(GraphError::InvalidWaveOverride {
                    job: job.id.clone(),
                    requested,
                    minimum,
                });
            }
            Some(requested) => requested,
            None => minimum,
        };
        waves.insert(job.id.clone(), wave);
    }

    Ok(waves)
}

/// Partition a job set into ordered waves.
///
/// Jobs keep their input order within a wave. Wave indices with no jobs
/// (possible only through overrides) are omitted, so `Wave::index` is the
/// authoritative number. On error no waves are returned.
pub fn partition_into_waves(
    jobs: &[Job],
    satisfied_externally: &HashSet<String>,
) -> Result<Vec<Wave>, GraphError> {
    if jobs.is_empty() {
        return Ok(vec![]);
    }

    let assigned = assign_waves(jobs, satisfied_externally)?;

    let mut buckets: BTreeMap<u32, Vec<String>> = BTreeMap::new();
    for job in jobs {
        buckets
            .entry(assigned[&job.id])
            .or_default()
            .push(job.id.clone());
    }

    Ok(buckets
        .into_iter()
        .map(|(index, job_ids)| Wave { index, job_ids })
        .collect())
}

// ---------------------------------------------------------------------------
// Transitive dependents
// ---------------------------------------------------------------------------

/// All jobs that depend on `job_id`, directly or transitively, in BFS order.
///
/// If `job_id` is not found, returns an empty vec.
pub fn transitive_dependents(job_id: &str, jobs: &[Job]) -> Vec<String> {
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for job in jobs {
        for dep in &job.depends_on {
            dependents
                .entry(dep.as_str())
                .or_default()
                .push(job.id.as_str());
        }
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut order = Vec::new();
    let mut queue: VecDeque<&str> = VecDeque::from([job_id]);

    while let Some(current) = queue.pop_front() {
        for &next in dependents.get(current).into_iter().flatten() {
            if next != job_id && visited.insert(next) {
                order.push(next.to_string());
                queue.push_back(next);
            }
        }
    }

    order
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
