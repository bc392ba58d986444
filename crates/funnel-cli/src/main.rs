mod wizard;

use std::fs;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use funnel_engine::{
    AnalyticsSink, Delivery, Engine, EngineError, EngineOptions, HttpTransport, MemoryTransport,
    NavState, SessionId, SubmissionTransport, build_step_view,
};
use funnel_spec::{AnswerShape, AnswerStore, AnswerValue, FunnelSpec, QuestionSpec};
use wizard::{
    Input, Prompter, RenderMode, Verbosity, WizardPresenter, fields_answer, parse_answer,
};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Conversational funnel runner",
    long_about = "Runs funnel definitions in the terminal and checks definitions and answers"
)]
struct Cli {
    /// Log debug output to stderr (RUST_LOG overrides).
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Walk through a funnel question by question.
    Run {
        /// Path to the funnel definition JSON.
        #[arg(long, value_name = "FUNNEL")]
        funnel: PathBuf,
        /// Optional JSON object of answers to prefill before starting.
        #[arg(long, value_name = "ANSWERS")]
        answers: Option<PathBuf>,
        /// REST base URL receiving analytics events and the submission.
        /// Defaults to the definition's form submit URL; without either,
        /// nothing leaves the process.
        #[arg(long, env = "FUNNEL_ENDPOINT", value_name = "URL")]
        endpoint: Option<String>,
        /// Nonce sent with every request; overrides the definition's form nonce.
        #[arg(long)]
        nonce: Option<String>,
        /// Session identifier; defaults to the definition's or a fresh one.
        #[arg(long)]
        session: Option<String>,
        /// Write the recorded analytics events to this file.
        #[arg(long, value_name = "FILE")]
        events_out: Option<PathBuf>,
        /// Render output mode for each step.
        #[arg(long, value_enum, default_value_t = RenderMode::Text)]
        format: RenderMode,
    },
    /// Check that a funnel definition is well formed.
    Check {
        #[arg(long, value_name = "FUNNEL")]
        funnel: PathBuf,
    },
    /// Validate a set of answers against a funnel definition.
    Validate {
        #[arg(long, value_name = "FUNNEL")]
        funnel: PathBuf,
        #[arg(long, value_name = "ANSWERS")]
        answers: PathBuf,
    },
    /// Print the JSON Schema of funnel definitions.
    Schema,
}

struct RunArgs {
    answers: Option<PathBuf>,
    session: Option<String>,
    events_out: Option<PathBuf>,
    format: RenderMode,
    verbose: bool,
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;
    match cli.command {
        Command::Run {
            funnel,
            answers,
            endpoint,
            nonce,
            session,
            events_out,
            format,
        } => {
            let spec = load_funnel(&funnel)?;
            let args = RunArgs {
                answers,
                session,
                events_out,
                format,
                verbose: cli.verbose,
            };
            let transport = match (endpoint, &spec.form) {
                (Some(endpoint), form) => {
                    let transport = HttpTransport::new(endpoint);
                    match form.as_ref().and_then(|form| form.nonce.clone()) {
                        Some(nonce) => Some(transport.with_nonce(nonce)),
                        None => Some(transport),
                    }
                }
                (None, Some(form)) => Some(HttpTransport::from_form(form)),
                (None, None) => None,
            };
            match transport {
                Some(mut transport) => {
                    if let Some(nonce) = nonce {
                        transport = transport.with_nonce(nonce);
                    }
                    info!(url = %transport.submit_url(), "posting to endpoint");
                    run_funnel(&spec, Rc::new(transport), args)
                }
                None => run_funnel(&spec, Rc::new(MemoryTransport::new()), args),
            }
        }
        Command::Check { funnel } => run_check(&funnel),
        Command::Validate { funnel, answers } => run_validate(&funnel, &answers),
        Command::Schema => {
            let schema = schemars::schema_for!(FunnelSpec);
            println!("{}", serde_json::to_string_pretty(&schema)?);
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) -> CliResult<()> {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::builder()
        .with_default_directive(format!("funnel_engine={}", level).parse()?)
        .from_env_lossy()
        .add_directive(format!("funnel_cli={}", level).parse()?);
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
    Ok(())
}

fn load_funnel(path: &Path) -> CliResult<FunnelSpec> {
    let contents = fs::read_to_string(path)?;
    let spec = FunnelSpec::from_json(&contents)
        .map_err(|err| format!("{}: {}", path.display(), err))?;
    debug!(funnel = %spec.id, questions = spec.questions.len(), "definition loaded");
    Ok(spec)
}

fn load_answers(path: &Path) -> CliResult<serde_json::Map<String, Value>> {
    let contents = fs::read_to_string(path)?;
    match serde_json::from_str(&contents)? {
        Value::Object(map) => Ok(map),
        _ => Err(format!("{}: answers must be a JSON object", path.display()).into()),
    }
}

fn run_check(path: &Path) -> CliResult<()> {
    let spec = load_funnel(path)?;
    println!("Funnel '{}' ({}) is well formed", spec.name, spec.id);
    println!("Questions: {}", spec.questions.len());
    for question in &spec.questions {
        let mut line = format!(
            "  {}. {} [{}] {}",
            question.position,
            question.id,
            question.kind.as_str(),
            question.text
        );
        if question.is_required() {
            line.push_str(" *");
        }
        if !question.conditional.is_empty() {
            line.push_str(" (conditional)");
        }
        println!("{}", line);
    }
    Ok(())
}

fn run_validate(funnel_path: &Path, answers_path: &Path) -> CliResult<()> {
    let spec = load_funnel(funnel_path)?;
    let answers = load_answers(answers_path)?;
    let mut store = AnswerStore::new(&spec);
    for (question_id, value) in &answers {
        store.set_answer_json(question_id, value)?;
    }

    let visibility = store.visibility();
    let mut valid = true;
    for question in &spec.questions {
        if !visibility.get(&question.id).copied().unwrap_or(false) {
            println!("  {} - hidden", question.id);
            continue;
        }
        let result = store.check_question(question);
        if result.valid {
            println!("  {} - ok", question.id);
        } else {
            valid = false;
            println!("  {} - {}", question.id, result.errors.join("; "));
        }
    }

    println!(
        "Validation result: {}",
        if valid { "valid" } else { "invalid" }
    );
    if valid {
        Ok(())
    } else {
        Err("validation failed".into())
    }
}

fn run_funnel<T>(spec: &FunnelSpec, transport: Rc<T>, args: RunArgs) -> CliResult<()>
where
    T: AnalyticsSink + SubmissionTransport + 'static,
{
    let mut options = EngineOptions::with_transport(transport);
    if let Some(session) = args.session {
        options = options.session(SessionId::new(session));
    }
    let mut engine = Engine::new(spec, options)?;
    if let Some(path) = &args.answers {
        for (question_id, value) in load_answers(path)? {
            engine.set_answer_json(&question_id, &value)?;
        }
    }

    let mut presenter = WizardPresenter::new(Verbosity::from_verbose(args.verbose), args.format);
    let stdin = io::stdin();
    let mut prompter = Prompter::new(stdin.lock());
    engine.start()?;

    while let NavState::OnQuestion(_) = engine.state() {
        let view = build_step_view(&engine);
        presenter.show_header(&view);
        presenter.show_step(&view);
        let Some(question) = engine.current_question() else {
            break;
        };

        let reply = if question.answer_shape() == AnswerShape::Fields {
            prompt_fields(&mut prompter, &presenter, question)?
        } else {
            match prompter.read()? {
                Input::Back => Reply::Back,
                Input::Quit => Reply::Quit,
                Input::Line(line) => match parse_answer(question, &line) {
                    Ok(value) => Reply::Answer(value),
                    Err(err) => {
                        presenter.show_parse_error(&err);
                        continue;
                    }
                },
            }
        };

        match reply {
            Reply::Back => {
                if let Err(err) = engine.back() {
                    presenter.show_notice(&err.to_string());
                }
            }
            Reply::Quit => {
                engine.abandon()?;
            }
            Reply::Answer(value) => {
                if engine.answer(value)?.is_some() {
                    continue;
                }
                match engine.advance() {
                    Ok(_) => {}
                    Err(EngineError::ValidationFailure { errors, .. }) => {
                        presenter.show_errors(&errors)
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        }
    }

    let view = build_step_view(&engine);
    presenter.show_completion(&view, engine.submission());

    if let Some(path) = &args.events_out {
        fs::write(path, serde_json::to_string_pretty(engine.tracker().events())?)?;
    }

    match engine.delivery() {
        Some(Delivery::Failed(err)) => Err(format!("{} ({})", err, err.cause()).into()),
        _ => Ok(()),
    }
}

enum Reply {
    Back,
    Quit,
    Answer(AnswerValue),
}

/// Asks for each field of a fields question in turn.
fn prompt_fields<R: BufRead>(
    prompter: &mut Prompter<R>,
    presenter: &WizardPresenter,
    question: &QuestionSpec,
) -> CliResult<Reply> {
    let mut values = Vec::new();
    for field in &question.options.fields {
        presenter.show_field_prompt(field.display_label(), field.required);
        match prompter.read()? {
            Input::Line(line) => values.push((field.name.clone(), line)),
            Input::Back => return Ok(Reply::Back),
            Input::Quit => return Ok(Reply::Quit),
        }
    }
    Ok(Reply::Answer(fields_answer(values)))
}
