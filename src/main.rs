use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use axum_prometheus::PrometheusMetricLayer;
use clap::{Args, Parser, Subcommand};
use cohort_select::config::AppConfig;
use cohort_select::error::AppError;
use cohort_select::telemetry;
use cohort_select::workflows::selection::{
    quiz_submissions_from_csv, selection_router, Candidate, CsvTabularStore, QuestionBank,
    RecordedAssessments, SelectionPipeline, Table, TracingNotifier,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use serde_json::json;
use std::fs::File;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

type CliPipeline =
    SelectionPipeline<CsvTabularStore, TracingNotifier, RecordedAssessments, QuestionBank>;

#[derive(Clone)]
struct AppState {
    readiness: Arc<AtomicBool>,
    metrics: PrometheusHandle,
}

#[derive(Parser, Debug)]
#[command(
    name = "Cohort Select",
    about = "Run the bootcamp candidate selection pipeline from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Print the current pipeline stage and record counts
    Status,
    /// Create any missing stage tables
    Init,
    /// Quiz generation, registration, invitations, and grading
    Quiz {
        #[command(subcommand)]
        command: QuizCommand,
    },
    /// Rank passed candidates and send speech invitations
    Shortlist,
    /// Speech submission processing
    Speech {
        #[command(subcommand)]
        command: SpeechCommand,
    },
    /// Combine scores and select the final cohort
    Finalize,
    /// Clear one stage table back to its header row
    Reset {
        #[arg(long, value_parser = parse_table)]
        table: Table,
    },
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    port: Option<u16>,
    /// Question bank used by quiz generation requests
    #[arg(long)]
    question_bank: Option<PathBuf>,
    /// Recorded speech assessments (name,email,link,transcript,analysis)
    #[arg(long)]
    recordings: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum QuizCommand {
    /// Store a new quiz drawn from a question bank
    Generate {
        #[arg(long)]
        bank: PathBuf,
        /// Topics to favour; repeat for several
        #[arg(long = "topic")]
        topics: Vec<String>,
    },
    /// Record a candidate as PENDING
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
    },
    /// Invite every PENDING candidate to the quiz
    Invite {
        #[arg(long)]
        link: String,
    },
    /// Grade a quiz export (name,email,answer...)
    Check {
        #[arg(long)]
        responses: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum SpeechCommand {
    /// Score recorded submissions (name,email,link,transcript,analysis)
    Process {
        #[arg(long)]
        submissions: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    if let Err(err) = run_cli().await {
        eprintln!("application error: {err}");
        std::process::exit(1);
    }
}

async fn run_cli() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    match command {
        Command::Serve(args) => run_server(config, args).await,
        Command::Status => print_json(&build_pipeline(&config, None, None)?.status()?),
        Command::Init => {
            let created = build_pipeline(&config, None, None)?.initialize()?;
            let names: Vec<&str> = created.iter().map(|table| table.title()).collect();
            print_json(&json!({ "created": names }))
        }
        Command::Quiz { command } => run_quiz(&config, command),
        Command::Shortlist => {
            print_json(&build_pipeline(&config, None, None)?.extract_shortlist()?)
        }
        Command::Speech {
            command: SpeechCommand::Process { submissions },
        } => {
            let (recordings, submissions) =
                RecordedAssessments::from_csv(File::open(submissions)?)?;
            let pipeline = build_pipeline(&config, None, Some(recordings))?;
            print_json(&pipeline.process_speech_submissions(&submissions)?)
        }
        Command::Finalize => print_json(&build_pipeline(&config, None, None)?.finalize()?),
        Command::Reset { table } => {
            build_pipeline(&config, None, None)?.reset(table)?;
            print_json(&json!({ "reset": table.title() }))
        }
    }
}

fn run_quiz(config: &AppConfig, command: QuizCommand) -> Result<(), AppError> {
    match command {
        QuizCommand::Generate { bank, topics } => {
            let bank = QuestionBank::from_path(bank)?;
            if bank.is_empty() {
                return Err(AppError::Usage(
                    "question bank contains no complete questions".to_string(),
                ));
            }
            let pipeline = build_pipeline(config, Some(bank), None)?;
            print_json(&pipeline.generate_quiz(&topics)?)
        }
        QuizCommand::Register { name, email } => {
            let pipeline = build_pipeline(config, None, None)?;
            print_json(&pipeline.register_candidates(&[Candidate::new(name, email)])?)
        }
        QuizCommand::Invite { link } => {
            let pipeline = build_pipeline(config, None, None)?;
            print_json(&pipeline.send_quiz_invitations(&link)?)
        }
        QuizCommand::Check { responses } => {
            let submissions = quiz_submissions_from_csv(File::open(responses)?)?;
            let pipeline = build_pipeline(config, None, None)?;
            print_json(&pipeline.check_quiz_responses(&submissions)?)
        }
    }
}

fn build_pipeline(
    config: &AppConfig,
    bank: Option<QuestionBank>,
    recordings: Option<RecordedAssessments>,
) -> Result<CliPipeline, AppError> {
    let store = CsvTabularStore::open(&config.store.data_dir)?;
    Ok(SelectionPipeline::new(
        Arc::new(store),
        Arc::new(TracingNotifier::default()),
        Arc::new(recordings.unwrap_or_default()),
        Arc::new(bank.unwrap_or_default()),
        config.selection.clone(),
    ))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::Usage(format!("unable to render output: {err}")))?;
    println!("{rendered}");
    Ok(())
}

fn parse_table(raw: &str) -> Result<Table, String> {
    Table::parse(raw).ok_or_else(|| {
        let known: Vec<&str> = Table::ALL.iter().map(|table| table.slug()).collect();
        format!("unknown table '{raw}' (expected one of: {})", known.join(", "))
    })
}

async fn run_server(mut config: AppConfig, mut args: ServeArgs) -> Result<(), AppError> {
    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    let bank = args.question_bank.map(QuestionBank::from_path).transpose()?;
    let recordings = match args.recordings {
        Some(path) => Some(RecordedAssessments::from_csv(File::open(path)?)?.0),
        None => None,
    };
    let pipeline = build_pipeline(&config, bank, recordings)?;
    pipeline.initialize()?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let state = AppState {
        readiness: readiness_flag.clone(),
        metrics: prometheus_handle,
    };

    let app = Router::new()
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .with_state(state)
        .merge(selection_router(Arc::new(pipeline)))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        data_dir = %config.store.data_dir.display(),
        "cohort selection service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}

async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn readiness_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
