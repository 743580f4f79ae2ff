use anyhow::Result;
use approx::assert_abs_diff_eq;
use polytype::{ptp, tp, TypeScheme};
use progsearch::frontier::{FrontierEntry, ResultAggregator};
use progsearch::lang::{PrimitiveSemantics, Semantics};
use progsearch::worker::{
    AllOrNothing, Example, JobRequest, SearchWorker, TopDownWorker, WorkerOptions,
};
use progsearch::{
    CostWindow, Evaluation, Frontier, Grammar, GrammarSource, JobScheduler, Program, SearchConfig,
    SearchError, SolverBackend, Task,
};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn peano() -> Arc<Grammar> {
    Arc::new(Grammar::unnormalized(
        f64::NEG_INFINITY,
        vec![
            ("zero", ptp!(int), -1.0),
            ("succ", ptp!(@arrow[tp!(int), tp!(int)]), -1.0),
        ],
    )
    .expect("peano weights are costs"))
}

fn config() -> SearchConfig {
    SearchConfig {
        cpus: 2,
        enumeration_timeout_s: 5.0,
        maximum_frontier: 1,
        launch_slack_s: 0.0,
        ..SearchConfig::default()
    }
}

/// A task scored by a table of program text to likelihood; anything else
/// misses.
fn scored(name: &str, request: TypeScheme, table: &[(&str, f64)]) -> Arc<Task> {
    let table: Vec<(String, f64)> = table.iter().map(|(p, l)| (p.to_string(), *l)).collect();
    Arc::new(Task::new(
        name,
        request,
        Vec::new(),
        Arc::new(move |program: &Program, _: &Task| {
            let text = program.to_string();
            table
                .iter()
                .find(|(p, _)| *p == text)
                .map_or_else(Evaluation::miss, |(_, l)| Evaluation::hit(*l))
        }),
    ))
}

fn programs(frontier: &Frontier) -> Vec<String> {
    frontier
        .entries()
        .iter()
        .map(|e| e.program.to_string())
        .collect()
}

#[test]
fn zero_and_succ_enumerate_in_cost_order() -> Result<()> {
    let grammar = peano();
    let found: Vec<(f64, String)> = grammar
        .enumerate(&ptp!(int), CostWindow::new(0.0, 3.0))
        .map(|(cost, program)| (cost, program.to_string()))
        .collect();
    assert_eq!(found.len(), 2);
    assert_abs_diff_eq!(found[0].0, 1.0);
    assert_eq!(found[0].1, "zero");
    assert_abs_diff_eq!(found[1].0, 2.0);
    assert_eq!(found[1].1, "(succ zero)");
    Ok(())
}

#[test]
fn consecutive_windows_match_one_wide_window() -> Result<()> {
    let grammar = Grammar::uniform(vec![
        ("one", ptp!(int)),
        ("+", ptp!(@arrow[tp!(int), tp!(int), tp!(int)])),
        ("double", ptp!(@arrow[tp!(int), tp!(int)])),
    ]);
    let request = ptp!(@arrow[tp!(int), tp!(int)]);

    let whole: Vec<(f64, Program)> = grammar
        .enumerate(&request, CostWindow::new(0.0, 7.5))
        .collect();
    let mut pieces = Vec::new();
    let mut window = CostWindow::initial(1.5);
    while window.lower < 7.5 {
        pieces.extend(grammar.enumerate(&request, window));
        window = window.next(1.5);
    }

    assert!(!whole.is_empty());
    assert_eq!(whole.len(), pieces.len());
    let distinct: HashSet<&Program> = pieces.iter().map(|(_, p)| p).collect();
    assert_eq!(distinct.len(), pieces.len());
    assert!(pieces.windows(2).all(|w| w[0].0 <= w[1].0));

    let key = |(cost, program): &(f64, Program)| (cost.to_bits(), program.to_string());
    let mut whole_keys: Vec<_> = whole.iter().map(key).collect();
    let mut piece_keys: Vec<_> = pieces.iter().map(key).collect();
    whole_keys.sort();
    piece_keys.sort();
    assert_eq!(whole_keys, piece_keys);
    Ok(())
}

#[test]
fn frontiers_keep_the_best_k_and_no_more() -> Result<()> {
    let accept_all = Arc::new(Task::new(
        "anything",
        ptp!(int),
        Vec::new(),
        Arc::new(|_: &Program, _: &Task| Evaluation::hit(-1.0)),
    ));
    let scheduler = JobScheduler::new(SearchConfig {
        maximum_frontier: 3,
        enumeration_timeout_s: 0.3,
        ..config()
    })?;
    let outcome = scheduler.search(&GrammarSource::Shared(peano()), &[accept_all])?;

    let frontier = &outcome.frontiers[0];
    assert_eq!(frontier.len(), 3);
    assert_eq!(
        programs(frontier),
        vec!["zero", "(succ zero)", "(succ (succ zero))"]
    );
    let posteriors: Vec<f64> = frontier.entries().iter().map(FrontierEntry::posterior).collect();
    assert_eq!(posteriors, vec![-2.0, -3.0, -4.0]);
    assert!(outcome.programs_enumerated[0] > 3);
    Ok(())
}

#[test]
fn tasks_sharing_a_job_keep_independent_frontiers() -> Result<()> {
    let a = scored("a", ptp!(int), &[("zero", 0.0)]);
    let b = scored(
        "b",
        ptp!(int),
        &[("zero", -5.0), ("(succ zero)", -1.5), ("(succ (succ zero))", 0.0)],
    );
    let scheduler = JobScheduler::new(config())?;
    let outcome = scheduler.search(&GrammarSource::Shared(peano()), &[a, b])?;

    assert_eq!(programs(&outcome.frontiers[0]), vec!["zero"]);
    assert_eq!(programs(&outcome.frontiers[1]), vec!["(succ (succ zero))"]);
    assert_abs_diff_eq!(outcome.frontiers[1].entries()[0].posterior(), -3.0);
    assert!(outcome.best_search_times[0] <= outcome.best_search_times[1]);
    Ok(())
}

#[test]
fn single_job_search_matches_a_direct_worker_run() -> Result<()> {
    let grammar = peano();
    let target = || scored("three", ptp!(int), &[("(succ (succ (succ zero)))", 0.0)]);

    let scheduler = JobScheduler::new(config())?;
    let scheduled = scheduler.search(&GrammarSource::Shared(grammar.clone()), &[target()])?;

    let direct = TopDownWorker.run(&JobRequest {
        id: 0,
        grammar,
        request: ptp!(int),
        tasks: vec![target()],
        capacities: vec![1],
        window: CostWindow::new(0.0, 6.0),
        timeout: Duration::from_secs(5),
        elapsed: Duration::ZERO,
        cpus: 1,
        evaluation_timeout: None,
        rule_table: None,
        options: WorkerOptions::default(),
    })?;

    let strip = |f: &Frontier| -> Vec<(String, f64, f64)> {
        f.entries()
            .iter()
            .map(|e| (e.program.to_string(), e.log_prior, e.log_likelihood))
            .collect()
    };
    assert_eq!(strip(&scheduled.frontiers[0]), strip(&direct.frontiers[0]));
    assert!(scheduled.best_search_times[0].is_some());
    Ok(())
}

#[test]
fn threaded_jobs_find_what_inline_search_finds() -> Result<()> {
    let grammar = Grammar::unnormalized(
        f64::NEG_INFINITY,
        vec![
            ("zero", ptp!(int), -1.0),
            ("succ", ptp!(@arrow[tp!(int), tp!(int)]), -1.0),
            ("nil", ptp!(list(tp!(int))), -1.0),
            ("cons", ptp!(@arrow[tp!(int), tp!(list(tp!(int))), tp!(list(tp!(int)))]), -1.0),
        ],
    )?;
    let source = GrammarSource::from(grammar);
    let number = || scored("two", ptp!(int), &[("(succ (succ zero))", 0.0)]);
    let list = scored("singleton", ptp!(list(tp!(int))), &[("(cons zero nil)", 0.0)]);

    let scheduler = JobScheduler::new(config())?;
    let inline = scheduler.search(&source, &[number()])?;
    let threaded = scheduler.search(&source, &[number(), list])?;

    assert_eq!(programs(&inline.frontiers[0]), programs(&threaded.frontiers[0]));
    assert_eq!(programs(&threaded.frontiers[1]), vec!["(cons zero nil)"]);
    Ok(())
}

fn panicking(name: &str, request: TypeScheme) -> Arc<Task> {
    Arc::new(Task::new(
        name,
        request,
        Vec::new(),
        Arc::new(|program: &Program, _: &Task| -> Evaluation {
            if program.size() > 2 {
                panic!("evaluator crashed on {program}");
            }
            Evaluation::miss()
        }),
    ))
}

#[test]
fn a_crashing_worker_fails_the_inline_search() -> Result<()> {
    let scheduler = JobScheduler::new(config())?;
    let result = scheduler.search(
        &GrammarSource::Shared(peano()),
        &[panicking("doomed", ptp!(int))],
    );
    match result {
        Err(SearchError::WorkerFailure { job, message }) => {
            assert_eq!(job, 0);
            assert!(message.contains("evaluator crashed"));
        }
        other => panic!("expected a worker failure, got {other:?}"),
    }
    Ok(())
}

#[test]
fn a_crashing_worker_fails_the_threaded_search() -> Result<()> {
    let grammar = Grammar::unnormalized(
        f64::NEG_INFINITY,
        vec![
            ("zero", ptp!(int), -1.0),
            ("succ", ptp!(@arrow[tp!(int), tp!(int)]), -1.0),
            ("true", ptp!(bool), -1.0),
            ("not", ptp!(@arrow[tp!(bool), tp!(bool)]), -1.0),
        ],
    )?;
    let fine = scored("fine", ptp!(bool), &[("(not true)", -1.0)]);
    let scheduler = JobScheduler::new(SearchConfig {
        enumeration_timeout_s: 1.0,
        ..config()
    })?;
    let result = scheduler.search(
        &GrammarSource::from(grammar),
        &[fine, panicking("doomed", ptp!(int))],
    );
    assert!(matches!(result, Err(SearchError::WorkerFailure { .. })));
    Ok(())
}

#[test]
fn tied_solutions_report_the_earlier_time_in_any_arrival_order() -> Result<()> {
    let at = |name: &str, millis: u64| {
        Frontier::from_entries(vec![FrontierEntry::new(
            Program::primitive(name),
            -2.0,
            0.0,
            Duration::from_millis(millis),
        )])
    };
    for (first, second) in [((1, 40), (2, 90)), ((2, 90), (1, 40))] {
        let mut aggregator = ResultAggregator::new(1, 5);
        aggregator.merge(0, &at(&format!("p{}", first.0), first.1), None, 1);
        aggregator.merge(0, &at(&format!("p{}", second.0), second.1), None, 1);
        assert_eq!(aggregator.best_time(0), Some(Duration::from_millis(40)));
        assert_eq!(aggregator.programs_enumerated(0), 2);
    }
    Ok(())
}

fn arithmetic(name: &str, args: &[Value]) -> Option<Value> {
    match (name, args) {
        ("zero", []) => Some(json!(0)),
        ("succ", [x]) => Some(json!(x.as_i64()? + 1)),
        ("double", [x]) => Some(json!(x.as_i64()? * 2)),
        _ => None,
    }
}

#[test]
fn bottom_up_backend_solves_through_the_scheduler() -> Result<()> {
    let base = Grammar::uniform(vec![
        ("zero", ptp!(int)),
        ("succ", ptp!(@arrow[tp!(int), tp!(int)])),
        ("double", ptp!(@arrow[tp!(int), tp!(int)])),
    ]);
    let semantics: Arc<dyn Semantics> = Arc::new(PrimitiveSemantics::new(&base, arithmetic));
    let grammar = base.with_semantics(semantics.clone());
    let example = |i: i64, o: i64| Example {
        inputs: vec![json!(i)],
        output: json!(o),
    };
    let task = Arc::new(Task::new(
        "double-plus-one",
        ptp!(@arrow[tp!(int), tp!(int)]),
        vec![example(0, 1), example(3, 7), example(10, 21)],
        Arc::new(AllOrNothing::new(semantics)),
    ));

    let scheduler = JobScheduler::new(SearchConfig {
        backend: SolverBackend::BottomUp {
            observational_equivalence: true,
            sound: true,
        },
        ..config()
    })?;
    let outcome = scheduler.search(&GrammarSource::from(grammar), &[task])?;
    assert_eq!(
        programs(&outcome.frontiers[0]),
        vec!["(lambda (succ (double $0)))"]
    );
    Ok(())
}

#[test]
fn mismatched_grammar_map_is_rejected() -> Result<()> {
    let scheduler = JobScheduler::new(config())?;
    let tasks = [
        scored("a", ptp!(int), &[]),
        scored("b", ptp!(int), &[]),
    ];
    let result = scheduler.search(&GrammarSource::PerTask(vec![peano()]), &tasks);
    assert!(matches!(
        result,
        Err(SearchError::GrammarMismatch {
            grammars: 1,
            tasks: 2
        })
    ));
    Ok(())
}

#[cfg(unix)]
#[test]
fn malformed_solver_output_is_dumped_with_the_request() -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let dir = std::env::temp_dir().join(format!("progsearch-solver-{}", std::process::id()));
    std::fs::create_dir_all(&dir)?;
    let solver = dir.join("garbled");
    std::fs::write(&solver, "#!/bin/sh\ncat > /dev/null\necho 'segfault in solver'\n")?;
    std::fs::set_permissions(&solver, std::fs::Permissions::from_mode(0o755))?;

    let scheduler = JobScheduler::new(SearchConfig {
        backend: SolverBackend::External {
            solver: solver.clone(),
        },
        enumeration_timeout_s: 2.0,
        ..config()
    })?;
    let result = scheduler.search(
        &GrammarSource::Shared(peano()),
        &[scored("two", ptp!(int), &[("(succ (succ zero))", 0.0)])],
    );
    std::fs::remove_dir_all(&dir)?;

    match result {
        Err(SearchError::WorkerFailure { job, message }) => {
            assert_eq!(job, 0);
            assert!(message.contains("segfault in solver"), "{message}");
            assert!(message.contains("\"DSL\""), "{message}");
            assert!(message.contains("\"name\":\"two\""), "{message}");
        }
        other => panic!("expected a worker failure, got {other:?}"),
    }
    Ok(())
}
