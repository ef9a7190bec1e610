mod logic;
mod play;
mod scenario;
mod store;
mod util;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use colored::Colorize;
use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use logic::{LogicTester, ScenarioResult};
use play::PlayOptions;
use scenario::{ScenarioCtx, get_scenario, list_scenarios};
use store::FileStore;
use taletalk_game::{ContentLibrary, DialogueConfig, StoryEngine};
use util::split_csv;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum TestMode {
    /// Run scripted scenarios against the engine and report
    Scenarios,
    /// Chat with a character in the terminal
    Play,
}

#[derive(Debug, Parser)]
#[command(name = "taletalk-tester", version = "0.1.0")]
#[command(about = "Headless scenario runner and terminal play mode for the TaleTalk dialogue engine")]
struct Args {
    /// What to do: run scenarios or play interactively
    #[arg(long, value_enum, default_value_t = TestMode::Scenarios)]
    mode: TestMode,

    /// Scenarios to run (comma-separated, `all` for every scenario)
    #[arg(long, default_value = "smoke")]
    scenarios: String,

    /// List all available scenarios and exit
    #[arg(long)]
    list_scenarios: bool,

    /// Number of iterations per scenario
    #[arg(long, default_value_t = 1)]
    iterations: usize,

    /// Output report format
    #[arg(long, default_value = "console")]
    #[arg(value_parser = ["json", "markdown", "console"])]
    report: String,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Optional path to write the report output instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Dialogue configuration file (JSON); missing fields use defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Skip typing delays
    #[arg(long)]
    instant: bool,

    // Play-mode options
    /// Directory holding saved progress and ratings
    #[arg(long, default_value = ".taletalk")]
    store_dir: PathBuf,

    /// Story to open in play mode
    #[arg(long, default_value = "1984")]
    story: String,

    /// Character to talk to (defaults to the story's first character)
    #[arg(long)]
    character: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if maybe_list_scenarios(&args)? {
        return Ok(());
    }

    let config = load_config(&args)?;
    let content = Arc::new(ContentLibrary::builtin().context("built-in content is invalid")?);

    match args.mode {
        TestMode::Play => run_play(&args, content, config).await,
        TestMode::Scenarios => {
            announce_banner();
            let start_time = Instant::now();
            let scenarios = expand_scenarios(&args.scenarios);
            let ctx = ScenarioCtx::new(content, config, args.verbose);
            let results = run_scenarios(&args, &scenarios, ctx);
            write_reports(&args, &results, start_time)?;

            if results.iter().any(|r| !r.passed) {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

fn maybe_list_scenarios(args: &Args) -> Result<bool> {
    if !args.list_scenarios {
        return Ok(false);
    }
    let mut output_target = OutputTarget::new(args.output.clone())?;
    writeln!(output_target.writer(), "Available scenarios:")?;
    for (key, description) in list_scenarios() {
        writeln!(output_target.writer(), "  {key:25} - {description}")?;
    }
    output_target.flush_inner()?;
    Ok(true)
}

fn load_config(args: &Args) -> Result<DialogueConfig> {
    let config = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            DialogueConfig::from_json(&raw)
                .with_context(|| format!("failed to parse {}", path.display()))?
        }
        None => DialogueConfig::default(),
    };
    if args.instant {
        return Ok(DialogueConfig {
            typing_delay_ms: 0,
            greeting_delay_ms: 0,
            ..config
        });
    }
    Ok(config)
}

fn announce_banner() {
    println!("{}", "📚 TaleTalk Scenario Tester".bright_cyan().bold());
    println!("{}", "================================".cyan());
}

fn expand_scenarios(scenarios_arg: &str) -> Vec<String> {
    let mut scenarios = split_csv(scenarios_arg);
    if scenarios.iter().any(|s| s == "all") {
        scenarios.retain(|s| s != "all");
        for (key, _) in list_scenarios() {
            if !scenarios.iter().any(|s| s == key) {
                scenarios.push(key.to_string());
            }
        }
    }
    scenarios
}

fn run_scenarios(args: &Args, scenarios: &[String], ctx: ScenarioCtx) -> Vec<ScenarioResult> {
    println!("{}", "🧠 Running Scenarios".bright_yellow().bold());
    println!("{}", "-".repeat(30).yellow());

    let tester = LogicTester::new(ctx);
    let mut results = Vec::new();
    for scenario_name in scenarios {
        if let Some(scenario) = get_scenario(scenario_name) {
            results.push(tester.run_scenario(&scenario, args.iterations));
        } else {
            eprintln!("⚠️  Unknown scenario: {}", scenario_name.yellow());
        }
    }
    results
}

async fn run_play(args: &Args, content: Arc<ContentLibrary>, config: DialogueConfig) -> Result<()> {
    let store = FileStore::open(&args.store_dir)
        .with_context(|| format!("failed to open store at {}", args.store_dir.display()))?;
    log::info!("Using store at {}", store.dir().display());
    let engine = StoryEngine::new(content, config, store);
    let options = PlayOptions {
        story: args.story.clone(),
        character: args.character.clone(),
    };

    println!("{}", "📚 TaleTalk".bright_cyan().bold());
    println!("{}", "/help 로 명령을 볼 수 있습니다".dimmed());
    let stdin = std::io::stdin();
    let mut out = stdout();
    play::run(&engine, &options, stdin.lock(), &mut out).await
}

fn write_reports(args: &Args, results: &[ScenarioResult], start_time: Instant) -> Result<()> {
    let mut output_target = OutputTarget::new(args.output.clone())?;

    match args.report.as_str() {
        "json" => {
            if results.is_empty() {
                writeln!(&mut output_target, "[]")?;
            } else {
                logic::reports::generate_json_report(&mut output_target, results)?;
            }
        }
        "markdown" => {
            if results.is_empty() {
                writeln!(
                    &mut output_target,
                    "# TaleTalk Scenario Results\n\n_No scenarios executed._"
                )?;
            } else {
                logic::reports::generate_markdown_report(&mut output_target, results)?;
            }
        }
        _ => {
            if results.is_empty() {
                writeln!(&mut output_target, "No scenarios executed.")?;
            } else {
                logic::reports::generate_console_report(
                    &mut output_target,
                    results,
                    start_time.elapsed(),
                )?;
            }
        }
    }

    if args.report != "json" {
        let duration = start_time.elapsed();
        writeln!(&mut output_target)?;
        writeln!(&mut output_target, "🏁 Total time: {duration:?}")?;
    }
    output_target.flush_inner()?;
    Ok(())
}

enum OutputTarget {
    Stdout(BufWriter<std::io::Stdout>),
    File(BufWriter<File>),
}

impl OutputTarget {
    fn new(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Self::File(BufWriter::new(file)))
        } else {
            Ok(Self::Stdout(BufWriter::new(stdout())))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Stdout(w) => w,
            Self::File(w) => w,
        }
    }

    fn flush_inner(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout(w) => w.flush(),
            Self::File(w) => w.flush(),
        }
    }
}

impl Write for OutputTarget {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::temp_path;
    use std::time::Duration;

    fn base_args() -> Args {
        Args {
            mode: TestMode::Scenarios,
            scenarios: "smoke".to_string(),
            list_scenarios: false,
            iterations: 1,
            report: "json".to_string(),
            verbose: false,
            output: None,
            config: None,
            instant: false,
            store_dir: PathBuf::from(".taletalk"),
            story: "1984".to_string(),
            character: None,
        }
    }

    fn sample_result(passed: bool) -> ScenarioResult {
        ScenarioResult {
            scenario_name: "Smoke Test".to_string(),
            passed,
            iterations_run: 1,
            successful_iterations: usize::from(passed),
            failures: if passed {
                Vec::new()
            } else {
                vec!["Iteration 1: greeting missing".to_string()]
            },
            average_duration: Duration::from_millis(1),
            performance_data: vec![Duration::from_millis(1)],
        }
    }

    fn ctx() -> ScenarioCtx {
        let content = Arc::new(ContentLibrary::builtin().unwrap());
        ScenarioCtx::new(content, DialogueConfig::instant(), false)
    }

    #[test]
    fn write_reports_emits_json_output() {
        let temp = temp_path("report.json");
        let args = Args {
            output: Some(temp.clone()),
            ..base_args()
        };
        write_reports(&args, &[], Instant::now()).unwrap();
        let content = std::fs::read_to_string(temp).unwrap();
        assert_eq!(content.trim(), "[]");
    }

    #[test]
    fn write_reports_emits_json_for_results() {
        let temp = temp_path("report-full.json");
        let args = Args {
            output: Some(temp.clone()),
            ..base_args()
        };
        write_reports(&args, &[sample_result(true)], Instant::now()).unwrap();
        let content = std::fs::read_to_string(temp).unwrap();
        let parsed: Vec<ScenarioResult> = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed.len(), 1);
        assert!(content.contains("scenario_name"));
    }

    #[test]
    fn write_reports_markdown_empty_results() {
        let temp = temp_path("report.md");
        let args = Args {
            report: "markdown".to_string(),
            output: Some(temp.clone()),
            ..base_args()
        };
        write_reports(&args, &[], Instant::now()).unwrap();
        let content = std::fs::read_to_string(temp).unwrap();
        assert!(content.contains("No scenarios executed"));
    }

    #[test]
    fn write_reports_console_lists_failures() {
        let temp = temp_path("report.txt");
        let args = Args {
            report: "console".to_string(),
            output: Some(temp.clone()),
            ..base_args()
        };
        write_reports(&args, &[sample_result(false)], Instant::now()).unwrap();
        let content = std::fs::read_to_string(temp).unwrap();
        assert!(content.contains("greeting missing"));
        assert!(content.contains("Total time"));
    }

    #[test]
    fn maybe_list_scenarios_writes_output() {
        let temp = temp_path("scenarios.txt");
        let args = Args {
            list_scenarios: true,
            output: Some(temp.clone()),
            ..base_args()
        };
        assert!(maybe_list_scenarios(&args).unwrap());
        let content = std::fs::read_to_string(temp).unwrap();
        assert!(content.contains("Available scenarios"));
        assert!(content.contains("full-arc"));
    }

    #[test]
    fn maybe_list_scenarios_returns_false_when_disabled() {
        assert!(!maybe_list_scenarios(&base_args()).unwrap());
    }

    #[test]
    fn expand_all_adds_every_scenario_once() {
        let scenarios = expand_scenarios("smoke,all");
        assert_eq!(scenarios.len(), list_scenarios().len());
        assert_eq!(scenarios[0], "smoke");
    }

    #[test]
    fn run_scenarios_skips_unknown_names() {
        let args = base_args();
        let results = run_scenarios(
            &args,
            &["smoke".to_string(), "nope".to_string()],
            ctx(),
        );
        assert_eq!(results.len(), 1);
        assert!(results[0].passed);
    }

    #[test]
    fn load_config_reads_file_and_instant_flag() {
        let path = temp_path("config.json");
        std::fs::write(&path, r#"{ "typing_delay_ms": 300, "recent_limit": 5 }"#).unwrap();
        let args = Args {
            config: Some(path.clone()),
            ..base_args()
        };
        let config = load_config(&args).unwrap();
        assert_eq!(config.typing_delay_ms, 300);
        assert_eq!(config.recent_limit, 5);

        let args = Args {
            config: Some(path),
            instant: true,
            ..base_args()
        };
        let config = load_config(&args).unwrap();
        assert_eq!(config.typing_delay_ms, 0);
        assert_eq!(config.recent_limit, 5);
    }

    #[test]
    fn load_config_reports_missing_file() {
        let args = Args {
            config: Some(temp_path("missing-config.json")),
            ..base_args()
        };
        assert!(load_config(&args).is_err());
    }

    #[test]
    fn output_target_stdout_writes() {
        let mut target = OutputTarget::new(None).unwrap();
        target.write_all(b"ok").unwrap();
        target.flush().unwrap();
    }
}
