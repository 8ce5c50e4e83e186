mod config;
mod output;
mod pipeline;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use persona_core::credentials::{fingerprint, EnvCredentials, InjectedCredential};
use persona_core::{
    AnalysisError, AnalysisMode, AnalysisOutcome, AnalysisRequest, CredentialChain,
    CredentialProvider, Language, Session, SessionState, SubmitError, Ticket, VideoUpload,
};
use persona_llm::GeminiClient;
use persona_vision::{LoadPolicy, ModelExpressionDetector, ModelService};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::output::Report;
use crate::pipeline::{Analyzer, PipelineSettings, ProgressFn, Stage};

// --- Named constants ---

/// How often a running session re-reads the credential file.
const CREDENTIAL_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Declared type for videos piped on stdin without `--mime`.
const STDIN_VIDEO_MIME: &str = "video/mp4";

#[derive(Parser)]
#[command(name = "persona", version, about = "Big Five personality profile from a short video or free text")]
struct Cli {
    /// Output language (en, fa)
    #[arg(long, global = true)]
    lang: Option<Language>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Gemini API key, used when no key is set in the environment
    #[arg(long, global = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze facial expressions in a short video ("-" reads stdin)
    Video {
        path: PathBuf,
        /// Declared media type (inferred from the extension when omitted)
        #[arg(long)]
        mime: Option<String>,
    },
    /// Analyze a piece of self-descriptive text (stdin when omitted or "-")
    Text { text: Option<String> },
    /// Interactive session
    Session,
    /// Manage the stored API key
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },
    /// Manage the expression detection models
    Models {
        #[command(subcommand)]
        action: ModelsAction,
    },
}

#[derive(Subcommand)]
enum KeyAction {
    /// Store a key (read from stdin when omitted)
    Set { key: Option<String> },
    /// Delete the stored key
    Clear,
    /// Show which key would be used
    Show,
}

#[derive(Subcommand)]
enum ModelsAction {
    /// Download missing model files
    Fetch {
        /// Download every file again
        #[arg(long)]
        force: bool,
    },
    /// List model files and whether they are present
    Status,
}

/// Long-lived pieces shared by every command.
struct App {
    config: Config,
    http: reqwest::Client,
    credentials: Arc<CredentialChain>,
    models: Arc<ModelService>,
    analyzer: Analyzer,
    json: bool,
}

impl App {
    fn build(config: Config, cli_key: Option<String>, json: bool) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("persona/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(config.http_timeout())
            .build()
            .context("failed to build HTTP client")?;

        let credentials = Arc::new(CredentialChain::new(vec![
            Box::new(EnvCredentials::default()),
            Box::new(InjectedCredential::new(cli_key.or_else(|| config.api_key.clone()))),
            Box::new(config.credential_store()),
        ]));

        let models = Arc::new(ModelService::new(
            config.model_store(),
            http.clone(),
            config.model_auto_fetch,
        ));
        let detector = Arc::new(ModelExpressionDetector::new(
            Arc::clone(&models),
            LoadPolicy::RequireLoaded,
        ));
        let gemini = GeminiClient::new(
            &config.gemini_base_url,
            &config.gemini_model,
            config.http_timeout(),
        )
        .context("failed to build Gemini client")?;
        let analyzer = Analyzer::new(
            detector,
            Arc::new(gemini),
            PipelineSettings {
                fps: config.fps,
                max_duration_secs: config.max_duration_secs,
                description_frames: config.description_frames,
            },
        );

        Ok(Self {
            config,
            http,
            credentials,
            models,
            analyzer,
            json,
        })
    }

    fn credential_provider(&self) -> Arc<dyn CredentialProvider> {
        self.credentials.clone()
    }

    fn analyzer_for(&self, language: Language) -> Analyzer {
        self.analyzer.clone().with_progress(progress_printer(language))
    }

    async fn load_models(&self) -> Result<(), AnalysisError> {
        self.models
            .ensure_loaded()
            .await
            .map(|_| ())
            .map_err(AnalysisError::from)
    }

    fn print_outcome(
        &self,
        outcome: &AnalysisOutcome,
        ticket: Ticket,
        mode: AnalysisMode,
        language: Language,
    ) -> Result<()> {
        if self.json {
            let report = Report {
                request_id: ticket.id(),
                completed_at: chrono::Utc::now(),
                mode,
                language,
                outcome,
            };
            println!("{}", output::render_json(&report)?);
        } else {
            print!("{}", output::render_text(outcome, language));
        }
        Ok(())
    }

    fn print_error(&self, err: &AnalysisError, language: Language) -> Result<()> {
        if self.json {
            println!("{}", output::render_error_json(err, language)?);
        } else {
            eprintln!("{}", output::render_error(err, language));
        }
        Ok(())
    }
}

fn progress_printer(language: Language) -> ProgressFn {
    Arc::new(move |stage| match stage {
        Stage::AnalyzingFrame { index: 0, total } => {
            eprintln!("{} ({total})", language.message(stage.message_key()));
        }
        Stage::AnalyzingFrame { .. } => {}
        _ => eprintln!("{}", language.message(stage.message_key())),
    })
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    let language = cli.lang.unwrap_or(config.language);

    match cli.command {
        Commands::Key { action } => run_key(&config, action),
        Commands::Models { action } => {
            let app = App::build(config, cli.api_key, cli.json)?;
            run_models(&app, action).await
        }
        Commands::Video { path, mime } => {
            let upload = if path.as_os_str() == "-" {
                let mut bytes = Vec::new();
                tokio::io::stdin().read_to_end(&mut bytes).await?;
                VideoUpload::from_bytes(&bytes, mime.unwrap_or_else(|| STDIN_VIDEO_MIME.to_string()))
                    .context("failed to spool video from stdin")?
            } else {
                VideoUpload::from_path(path, mime)
            };
            let app = App::build(config, cli.api_key, cli.json)?;
            run_once(&app, AnalysisRequest::Video(upload), language).await
        }
        Commands::Text { text } => {
            let text = match text {
                Some(text) if text != "-" => text,
                _ => {
                    let mut text = String::new();
                    tokio::io::stdin().read_to_string(&mut text).await?;
                    text
                }
            };
            let app = App::build(config, cli.api_key, cli.json)?;
            run_once(&app, AnalysisRequest::Text(text), language).await
        }
        Commands::Session => {
            let app = App::build(config, cli.api_key, cli.json)?;
            run_session(app, language).await
        }
    }
}

/// Drive a single request through a fresh session.
async fn run_once(app: &App, request: AnalysisRequest, language: Language) -> Result<ExitCode> {
    let mode = request.mode();
    let mut session = Session::new(app.credential_provider(), mode, language);
    if session.needs_models() {
        eprintln!("{}", session.status_message());
        session.models_loaded(app.load_models().await);
    }

    let accepted = match session.submit(request) {
        Ok(accepted) => accepted,
        Err(SubmitError::Failed(err)) => {
            app.print_error(&err, language)?;
            return Ok(ExitCode::FAILURE);
        }
        Err(e) => {
            if let SessionState::Error(err) = session.state() {
                app.print_error(err, language)?;
            } else {
                eprintln!("{e}");
            }
            return Ok(ExitCode::FAILURE);
        }
    };
    tracing::info!(ticket = %accepted.ticket, %mode, "analysis started");

    let result = app
        .analyzer_for(language)
        .run(&accepted.request, &accepted.credential, language)
        .await;
    session.complete(accepted.ticket, result);

    match session.state() {
        SessionState::Done => {
            if let Some(outcome) = session.outcome() {
                app.print_outcome(outcome, accepted.ticket, mode, language)?;
            }
            Ok(ExitCode::SUCCESS)
        }
        SessionState::Error(err) => {
            app.print_error(err, language)?;
            Ok(ExitCode::FAILURE)
        }
        other => bail!("unexpected session state {}", other.name()),
    }
}

fn run_key(config: &Config, action: KeyAction) -> Result<ExitCode> {
    let store = config.credential_store();
    match action {
        KeyAction::Set { key } => {
            let key = match key {
                Some(key) => key,
                None => {
                    eprint!("API key: ");
                    let mut line = String::new();
                    std::io::stdin().read_line(&mut line)?;
                    line
                }
            };
            store.save(&key)?;
            println!("stored key {} in {}", fingerprint(&key), store.path().display());
        }
        KeyAction::Clear => {
            if store.clear()? {
                println!("removed {}", store.path().display());
            } else {
                println!("no stored key");
            }
        }
        KeyAction::Show => {
            let chain = CredentialChain::new(vec![
                Box::new(EnvCredentials::default()),
                Box::new(InjectedCredential::new(config.api_key.clone())),
                Box::new(store),
            ]);
            match chain.credential() {
                Some(key) => println!("key {}", fingerprint(&key)),
                None => {
                    println!("no key configured");
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_models(app: &App, action: ModelsAction) -> Result<ExitCode> {
    let store = app.config.model_store();
    match action {
        ModelsAction::Fetch { force } => {
            let written = store.fetch(&app.http, force).await?;
            if written.is_empty() {
                println!("all models present in {}", store.dir().display());
            }
            for path in written {
                println!("downloaded {}", path.display());
            }
        }
        ModelsAction::Status => {
            for status in store.status() {
                match status.bytes {
                    Some(bytes) => println!("{:<11} {bytes:>10}  {}", status.bundle.name, status.path.display()),
                    None => println!("{:<11} {:>10}  {}", status.bundle.name, "missing", status.path.display()),
                }
            }
            if !store.is_complete() {
                return Ok(ExitCode::FAILURE);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

type Completion = (Ticket, Result<AnalysisOutcome, AnalysisError>);

/// Channels feeding results back into the session loop.
struct Inbox {
    done: mpsc::UnboundedSender<Completion>,
    models: mpsc::UnboundedSender<Result<(), AnalysisError>>,
}

enum Flow {
    Continue,
    Quit,
}

const SESSION_HELP: &str = "\
commands:
  video <path>      analyze a video file
  text <words...>   analyze text
  mode video|text   switch input mode
  lang en|fa        switch output language
  key <api-key>     store an API key
  reset             clear the last result or error
  status            show the session state
  quit";

async fn run_session(app: App, language: Language) -> Result<ExitCode> {
    let app = Arc::new(app);
    let watcher = Arc::clone(&app.credentials)
        .spawn_file_watcher(app.config.credential_store(), CREDENTIAL_POLL_INTERVAL);
    let mut key_changes = app.credentials.subscribe();

    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    let (models_tx, mut models_rx) = mpsc::unbounded_channel();
    let inbox = Inbox {
        done: done_tx,
        models: models_tx,
    };

    let mut session = Session::new(app.credential_provider(), AnalysisMode::Video, language);
    start_model_load(&app, &session, &inbox);
    eprintln!("{SESSION_HELP}");
    eprintln!("{}", session.status_message());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if let Flow::Quit = handle_line(&app, &mut session, &inbox, line.trim())? {
                    break;
                }
            }
            Some((ticket, result)) = done_rx.recv() => {
                if session.complete(ticket, result) {
                    let language = session.language();
                    match (session.state(), session.outcome()) {
                        (SessionState::Done, Some(outcome)) => {
                            app.print_outcome(outcome, ticket, session.mode(), language)?;
                        }
                        (SessionState::Error(err), _) => app.print_error(err, language)?,
                        _ => {}
                    }
                    eprintln!("{}", session.status_message());
                }
            }
            Some(result) = models_rx.recv() => {
                session.models_loaded(result);
                eprintln!("{}", session.status_message());
            }
            Ok(()) = key_changes.changed() => {
                let present = key_changes.borrow_and_update().is_some();
                tracing::info!(present, "API key changed");
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    watcher.abort();
    Ok(ExitCode::SUCCESS)
}

fn start_model_load(app: &Arc<App>, session: &Session, inbox: &Inbox) {
    if !session.needs_models() {
        return;
    }
    let app = Arc::clone(app);
    let tx = inbox.models.clone();
    tokio::spawn(async move {
        let _ = tx.send(app.load_models().await);
    });
}

fn handle_line(app: &Arc<App>, session: &mut Session, inbox: &Inbox, line: &str) -> Result<Flow> {
    let (command, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();
    let language = session.language();

    match command {
        "" => {}
        "quit" | "exit" => return Ok(Flow::Quit),
        "help" => eprintln!("{SESSION_HELP}"),
        "status" => {
            eprintln!(
                "{} [mode={} lang={} models={} key={}]",
                session.status_message(),
                session.mode(),
                language,
                app.models.state_name(),
                if session.has_credential() { "set" } else { "missing" },
            );
        }
        "lang" => match rest.parse::<Language>() {
            Ok(next) => {
                session.set_language(next);
                eprintln!("{}", session.status_message());
            }
            Err(e) => eprintln!("{e}"),
        },
        "mode" => {
            let mode = match rest {
                "video" => AnalysisMode::Video,
                "text" => AnalysisMode::Text,
                _ => {
                    eprintln!("usage: mode video|text");
                    return Ok(Flow::Continue);
                }
            };
            match session.switch_mode(mode) {
                Ok(()) => {
                    start_model_load(app, session, inbox);
                    eprintln!("{}", session.status_message());
                }
                Err(e) => report_submit_error(&e, language),
            }
        }
        "reset" => {
            session.reset();
            start_model_load(app, session, inbox);
            eprintln!("{}", session.status_message());
        }
        "key" => {
            if rest.is_empty() {
                eprintln!("usage: key <api-key>");
            } else {
                let store = app.config.credential_store();
                match store.save(rest) {
                    Ok(()) => {
                        app.credentials.refresh();
                        eprintln!("stored key {}", fingerprint(rest));
                    }
                    Err(e) => eprintln!("{e}"),
                }
            }
        }
        "video" | "text" => {
            if rest.is_empty() {
                eprintln!("usage: {command} <{}>", if command == "video" { "path" } else { "words..." });
                return Ok(Flow::Continue);
            }
            let request = if command == "video" {
                AnalysisRequest::Video(VideoUpload::from_path(rest, None))
            } else {
                AnalysisRequest::Text(rest.to_string())
            };
            match session.submit(request) {
                Ok(accepted) => {
                    eprintln!("{}", session.status_message());
                    let analyzer = app.analyzer_for(language);
                    let tx = inbox.done.clone();
                    tokio::spawn(async move {
                        let result = analyzer
                            .run(&accepted.request, &accepted.credential, language)
                            .await;
                        let _ = tx.send((accepted.ticket, result));
                    });
                }
                Err(SubmitError::Failed(err)) => app.print_error(&err, language)?,
                Err(e) => {
                    report_submit_error(&e, language);
                    start_model_load(app, session, inbox);
                    eprintln!("{}", session.status_message());
                }
            }
        }
        other => eprintln!("unknown command {other:?} (try `help`)"),
    }
    Ok(Flow::Continue)
}

fn report_submit_error(err: &SubmitError, language: Language) {
    match err {
        SubmitError::Busy => eprintln!(
            "{}: {}",
            language.message("error.title"),
            language.message("error.busy")
        ),
        other => eprintln!("{other}"),
    }
}
