mod common;

use std::collections::{HashMap, HashSet};

use common::{Script, ScriptedRunner, orchestrator, orchestrator_with};
use jobwave_core::graph::{GraphError, partition_into_waves, transitive_dependents};
use jobwave_core::repository::{InMemoryJobRepository, JobRepository};
use jobwave_types::config::{ExecuteOptions, FailurePolicy, SchedulerConfig};
use jobwave_types::job::{Job, JobStatus};
use proptest::prelude::*;
use uuid::Uuid;

fn name(i: usize) -> String {
    format!("job_{i}")
}

// Acyclic job sets: job N may only depend on jobs 0..N-1.
fn dag_strategy(max_jobs: usize) -> impl Strategy<Value = Vec<Job>> {
    (1..=max_jobs).prop_flat_map(|count| {
        proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..4), count).prop_map(
            |raw_deps| {
                raw_deps
                    .into_iter()
                    .enumerate()
                    .map(|(i, picks)| {
                        let deps: HashSet<String> = if i == 0 {
                            HashSet::new()
                        } else {
                            picks.into_iter().map(|p| name(p % i)).collect()
                        };
                        let mut deps: Vec<String> = deps.into_iter().collect();
                        deps.sort();
                        Job::new(name(i)).depends_on(deps)
                    })
                    .collect()
            },
        )
    })
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn every_job_lands_after_its_dependencies(jobs in dag_strategy(12)) {
        let waves = partition_into_waves(&jobs, &HashSet::new()).unwrap();

        let wave_of: HashMap<&str, u32> = waves
            .iter()
            .flat_map(|w| w.job_ids.iter().map(move |id| (id.as_str(), w.index)))
            .collect();

        prop_assert_eq!(wave_of.len(), jobs.len());
        for job in &jobs {
            for dep in &job.depends_on {
                prop_assert!(wave_of[job.id.as_str()] > wave_of[dep.as_str()]);
            }
        }
    }

    #[test]
    fn any_cycle_yields_no_waves(jobs in dag_strategy(12), pick in any::<usize>()) {
        prop_assume!(jobs.len() >= 2);
        let mut jobs = jobs;
        let k = 1 + pick % (jobs.len() - 1);
        // job_0 -> job_k -> job_0
        jobs[0].depends_on.push(name(k));
        if !jobs[k].depends_on.contains(&name(0)) {
            jobs[k].depends_on.push(name(0));
        }

        match partition_into_waves(&jobs, &HashSet::new()) {
            Err(GraphError::CycleDetected { jobs: members }) => {
                prop_assert!(members.contains(&name(0)));
                prop_assert!(members.contains(&name(k)));
            }
            other => prop_assert!(false, "expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn dependents_of_failures_never_complete(
        jobs in dag_strategy(10),
        failing in proptest::collection::hash_set(0..10usize, 0..4),
        concurrent in any::<bool>(),
    ) {
        let runner = ScriptedRunner::new(
            failing.iter().map(|&i| (name(i), Script::Fail("scripted"))),
        );
        let config = SchedulerConfig {
            failure_policy: FailurePolicy::ContinueWithBlocked,
            ..SchedulerConfig::default()
        };
        let repo = InMemoryJobRepository::new();
        let options = ExecuteOptions {
            concurrent: Some(concurrent),
            ..ExecuteOptions::default()
        };

        let stored = runtime().block_on(async {
            let orch = orchestrator_with(runner, repo.clone(), config);
            let report = orch.execute(jobs.clone(), options).await.unwrap();
            repo.list_jobs(&report.execution_id).await.unwrap()
        });
        let status: HashMap<&str, JobStatus> =
            stored.iter().map(|j| (j.id.as_str(), j.status)).collect();

        for job in &stored {
            if job.status != JobStatus::Failed {
                continue;
            }
            for dependent in transitive_dependents(&job.id, &jobs) {
                prop_assert_eq!(status[dependent.as_str()], JobStatus::Blocked);
            }
        }
    }

    #[test]
    fn concurrent_and_sequential_agree(
        jobs in dag_strategy(8),
        failing in proptest::collection::hash_set(0..8usize, 0..3),
    ) {
        let scripts: Vec<(String, Script)> = failing
            .iter()
            .map(|&i| (name(i), Script::Fail("scripted")))
            .collect();

        let (concurrent, sequential) = runtime().block_on(async {
            let a = orchestrator(ScriptedRunner::new(scripts.clone()), InMemoryJobRepository::new())
                .execute(jobs.clone(), ExecuteOptions::default())
                .await
                .unwrap();
            let b = orchestrator(ScriptedRunner::new(scripts.clone()), InMemoryJobRepository::new())
                .execute(jobs.clone(), ExecuteOptions::sequential())
                .await
                .unwrap();
            (a, b)
        });

        let mut concurrent = concurrent;
        let mut sequential = sequential;
        concurrent.execution_id = Uuid::nil();
        sequential.execution_id = Uuid::nil();
        prop_assert_eq!(concurrent, sequential);
    }
}
