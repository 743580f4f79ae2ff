//! CLI wiring for the search scheduler.

use crate::config::SearchConfig;
use crate::jobs::GrammarSource;
use crate::report::SearchReport;
use crate::scheduler::JobScheduler;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use progsearch_lang::{
    parse_scheme, CostWindow, Grammar, GrammarJson, PrimitiveSemantics, Semantics, TypeSpec,
};
use progsearch_worker::{AllOrNothing, Example, SolverBackend, Task};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "progsearch", about = "Parallel program enumeration over typed grammars")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::ValueEnum, Clone, Debug)]
pub enum BackendArg {
    TopDown,
    BottomUp,
    External,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Search for programs solving every task of a problem file.
    Search {
        #[arg(long)]
        problem: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        cpus: Option<usize>,
        /// Compute budget per job, in seconds.
        #[arg(long)]
        timeout: Option<f64>,
        #[arg(long)]
        max_frontier: Option<usize>,
        #[arg(long, value_enum)]
        backend: Option<BackendArg>,
        /// Solver binary for the external backend.
        #[arg(long)]
        solver: Option<PathBuf>,
        #[arg(long, default_value_t = false)]
        isolation: bool,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the programs of a request whose cost lies in a window.
    Enumerate {
        #[arg(long)]
        problem: PathBuf,
        #[arg(long)]
        request: String,
        #[arg(long, default_value_t = 0.0)]
        lower: f64,
        #[arg(long, default_value_t = 6.0)]
        upper: f64,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
}

/// A grammar plus example-driven tasks, as read from disk.
#[derive(Debug, Deserialize)]
pub struct ProblemFile {
    pub grammar: GrammarJson,
    #[serde(default)]
    pub tasks: Vec<ProblemTask>,
}

#[derive(Debug, Deserialize)]
pub struct ProblemTask {
    pub name: String,
    pub request: TypeSpec,
    pub examples: Vec<Example>,
}

impl ProblemFile {
    pub fn load(path: &Path) -> Result<Self> {
        let blob = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let problem = serde_json::from_slice(&blob)
            .with_context(|| format!("parsing problem file {}", path.display()))?;
        Ok(problem)
    }

    /// The grammar, interpreted with the built-in integer arithmetic, and
    /// its tasks scored all-or-nothing on their examples.
    pub fn build(&self) -> Result<(Arc<Grammar>, Vec<Arc<Task>>)> {
        let grammar = Grammar::from_json(&self.grammar)?;
        let semantics: Arc<dyn Semantics> =
            Arc::new(PrimitiveSemantics::new(&grammar, arithmetic));
        let grammar = Arc::new(grammar.with_semantics(semantics.clone()));
        let tasks = self
            .tasks
            .iter()
            .map(|task| {
                let request = task
                    .request
                    .parse()
                    .with_context(|| format!("request of task `{}`", task.name))?
                    .generalize(&[]);
                Ok(Arc::new(Task::new(
                    task.name.clone(),
                    request,
                    task.examples.clone(),
                    Arc::new(AllOrNothing::new(semantics.clone())),
                )))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok((grammar, tasks))
    }
}

/// Integer arithmetic for the primitives a problem file may use. Any name
/// that parses as an integer is a constant.
pub fn arithmetic(name: &str, args: &[Value]) -> Option<Value> {
    let int = |v: &Value| v.as_i64();
    let value = match (name, args) {
        ("zero", []) => 0,
        ("one", []) => 1,
        ("succ" | "incr", [x]) => int(x)?.checked_add(1)?,
        ("pred" | "decr", [x]) => int(x)?.checked_sub(1)?,
        ("double", [x]) => int(x)?.checked_mul(2)?,
        ("negate", [x]) => int(x)?.checked_neg()?,
        ("+", [a, b]) => int(a)?.checked_add(int(b)?)?,
        ("-", [a, b]) => int(a)?.checked_sub(int(b)?)?,
        ("*", [a, b]) => int(a)?.checked_mul(int(b)?)?,
        ("max", [a, b]) => int(a)?.max(int(b)?),
        ("min", [a, b]) => int(a)?.min(int(b)?),
        (literal, []) => literal.parse().ok()?,
        _ => return None,
    };
    Some(json!(value))
}

fn backend(
    arg: BackendArg,
    solver: Option<PathBuf>,
    current: &SolverBackend,
) -> Result<SolverBackend> {
    Ok(match arg {
        BackendArg::TopDown => SolverBackend::TopDown,
        BackendArg::BottomUp => match current {
            SolverBackend::BottomUp { .. } => current.clone(),
            _ => SolverBackend::BottomUp {
                observational_equivalence: true,
                sound: true,
            },
        },
        BackendArg::External => match solver {
            Some(solver) => SolverBackend::External { solver },
            None => bail!("--backend external needs --solver <PATH>"),
        },
    })
}

pub fn run_cli(cli: Cli) -> Result<()> {
    tracing_subscriber::fmt::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .init();

    match cli.command {
        Command::Search {
            problem,
            config,
            cpus,
            timeout,
            max_frontier,
            backend: backend_arg,
            solver,
            isolation,
            output,
        } => {
            let mut config = match config {
                Some(path) => SearchConfig::load_from_file(&path)?,
                None => SearchConfig::default(),
            };
            if let Some(cpus) = cpus {
                config.cpus = cpus;
            }
            if let Some(timeout) = timeout {
                config.enumeration_timeout_s = timeout;
            }
            if let Some(max_frontier) = max_frontier {
                config.maximum_frontier = max_frontier;
            }
            if let Some(arg) = backend_arg {
                config.backend = backend(arg, solver, &config.backend)?;
            }
            config.isolation |= isolation;

            let (grammar, tasks) = ProblemFile::load(&problem)?.build()?;
            info!(
                tasks = tasks.len(),
                productions = grammar.productions.len(),
                "loaded problem"
            );

            let scheduler = JobScheduler::new(config)?;
            let outcome = scheduler.search(&GrammarSource::Shared(grammar), &tasks)?;
            let report = SearchReport::new(&scheduler.config().backend, &tasks, &outcome);

            println!("solved={}/{}", report.solved(), report.tasks.len());
            for task in &report.tasks {
                match task.solutions.first() {
                    Some(best) => println!(
                        "- {}: {} posterior={:.3} time_s={:.3} programs={}",
                        task.name,
                        best.program,
                        best.posterior,
                        task.best_search_time_s.unwrap_or_default(),
                        task.programs_enumerated
                    ),
                    None => println!(
                        "- {}: unsolved programs={}",
                        task.name, task.programs_enumerated
                    ),
                }
            }

            if let Some(path) = output {
                report.save(&path)?;
                info!(path = %path.display(), "report written");
            }
        }
        Command::Enumerate {
            problem,
            request,
            lower,
            upper,
            limit,
        } => {
            let (grammar, _) = ProblemFile::load(&problem)?.build()?;
            let request = parse_scheme(&request)?;
            for (cost, program) in grammar
                .enumerate(&request, CostWindow::new(lower, upper))
                .take(limit)
            {
                println!("{cost:.3}\t{program}");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROBLEM: &str = r#"{
        "grammar": {
            "logVariable": 0.0,
            "productions": [
                {"expression": "1", "type": "int", "logProbability": 0.0},
                {"expression": "+", "type": "int -> int -> int", "logProbability": 0.0},
                {"expression": "double", "type": "int -> int", "logProbability": 0.0}
            ]
        },
        "tasks": [
            {"name": "inc", "request": "int -> int",
             "examples": [{"inputs": [1], "output": 2}, {"inputs": [5], "output": 6}]}
        ]
    }"#;

    #[test]
    fn arithmetic_covers_literals_and_overflow() {
        assert_eq!(arithmetic("+", &[json!(2), json!(3)]), Some(json!(5)));
        assert_eq!(arithmetic("42", &[]), Some(json!(42)));
        assert_eq!(arithmetic("succ", &[json!(i64::MAX)]), None);
        assert_eq!(arithmetic("+", &[json!(1)]), None);
        assert_eq!(arithmetic("unknown", &[]), None);
    }

    #[test]
    fn problem_file_builds_scored_tasks() {
        let problem: ProblemFile = serde_json::from_str(PROBLEM).unwrap();
        let (grammar, tasks) = problem.build().unwrap();
        assert_eq!(tasks.len(), 1);
        let solution = grammar.parse("(lambda (+ $0 1))").unwrap();
        assert!(tasks[0].score(&solution, None).success);
        let wrong = grammar.parse("(lambda (double $0))").unwrap();
        assert!(!tasks[0].score(&wrong, None).success);
    }

    #[test]
    fn external_backend_needs_a_solver() {
        assert!(backend(BackendArg::External, None, &SolverBackend::TopDown).is_err());
        let chosen = backend(
            BackendArg::External,
            Some(PathBuf::from("/opt/solver")),
            &SolverBackend::TopDown,
        )
        .unwrap();
        assert_eq!(
            chosen,
            SolverBackend::External {
                solver: PathBuf::from("/opt/solver")
            }
        );
    }

    #[test]
    fn cli_parses_search_flags() {
        let cli = Cli::parse_from([
            "progsearch",
            "search",
            "--problem",
            "p.json",
            "--cpus",
            "4",
            "--backend",
            "bottom-up",
        ]);
        match cli.command {
            Command::Search { cpus, backend, .. } => {
                assert_eq!(cpus, Some(4));
                assert!(matches!(backend, Some(BackendArg::BottomUp)));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
