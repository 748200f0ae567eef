//! Speechcoach - terminal speech-practice coach
//!
//! Run with `speechcoach` or `speechcoach practice` for an interactive session.
//! Use `speechcoach analyze <file> --exercise <id>` to score an existing recording.

use clap::Parser;
use speechcoach::api::{ApiClient, AuthContext, LoginRedirect, UreqTransport};
use speechcoach::capture::{self, CaptureConstraints, CaptureController, Recording};
use speechcoach::config::{self, Config};
use speechcoach::exercise::{Exercise, ExerciseId, ExerciseType};
use speechcoach::provider::ExerciseProvider;
use speechcoach::session::{AnalysisTicket, PracticeSession};
use speechcoach::state::SessionState;
use speechcoach::submission::{AnalysisResult, SubmissionClient};
use speechcoach::view::{self, LoadState, Present};
use speechcoach::{ApiError, Cli, Commands, SessionError};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// Prints where to sign in; a terminal cannot open the login page itself
struct TerminalLoginRedirect;

impl LoginRedirect for TerminalLoginRedirect {
    fn redirect_to_login(&self, login_url: &str) {
        eprintln!(
            "\nYou are not signed in or your session has expired.\n\
             Sign in at {} and export the new token as SPEECHCOACH_TOKEN.",
            login_url
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("speechcoach={},warn", log_level))),
        )
        .with_target(false)
        .init();

    // Load configuration
    let mut config = config::load_config(cli.config.as_deref())?;

    // Apply CLI overrides
    if let Some(url) = cli.api_url {
        config.api.base_url = url;
    }
    if let Some(user) = cli.user {
        config.auth.user_id = user;
    }

    match cli.command.unwrap_or(Commands::Practice) {
        Commands::Practice => run_practice(&config).await?,

        Commands::Next => {
            let provider = ExerciseProvider::new(build_client(&config)?);
            let provided = provider.fetch_next_exercise().await?;
            for reason in &provided.skipped {
                println!("(skipped: {})", reason.user_message());
            }
            println!("Source: {}\n", provided.source);
            println!("{}", provided.exercise.present());
        }

        Commands::Active => {
            let provider = ExerciseProvider::new(build_client(&config)?);
            print_exercises(&provider.active_exercises().await?, "No active exercises.");
        }

        Commands::Plan => {
            let provider = ExerciseProvider::new(build_client(&config)?);
            print_exercises(
                &provider.generate_weekly_plan().await?,
                "The backend returned an empty plan.",
            );
        }

        Commands::Generate { kind } => {
            let kind: ExerciseType = kind.parse().map_err(anyhow::Error::msg)?;
            let provider = ExerciseProvider::new(build_client(&config)?);
            let exercise = provider.generate_exercise(kind).await?;
            println!("{}", exercise.present());
        }

        Commands::Analyze { file, exercise } => {
            analyze_file(&config, &file, &ExerciseId::from(exercise.as_str())).await?;
        }

        Commands::Complete { exercise_id, score } => {
            let provider = ExerciseProvider::new(build_client(&config)?);
            provider
                .complete_exercise(&ExerciseId::from(exercise_id.as_str()), score)
                .await?;
            println!("Exercise {} marked complete.", exercise_id);
        }

        Commands::Config { save } => show_config(&config, cli.config.as_deref(), save)?,
    }

    Ok(())
}

/// Build the authenticated backend client from config
fn build_client(config: &Config) -> anyhow::Result<ApiClient> {
    let transport = Arc::new(UreqTransport::new(&config.api)?);
    let auth = AuthContext::new(
        config.auth.user_id.clone(),
        config.api.login_url(),
        Arc::new(TerminalLoginRedirect),
    );

    match &config.auth.token {
        Some(token) => auth.sign_in(token.clone()),
        None => tracing::warn!("No access token configured; set SPEECHCOACH_TOKEN"),
    }

    Ok(ApiClient::new(transport, auth))
}

fn print_exercises(exercises: &[Exercise], empty: &str) {
    if exercises.is_empty() {
        println!("{}", empty);
        return;
    }
    for (i, exercise) in exercises.iter().enumerate() {
        println!("{}. [{}]\n{}\n", i + 1, exercise.id, exercise.present());
    }
}

/// Submit an existing WAV file
async fn analyze_file(config: &Config, path: &Path, exercise_id: &ExerciseId) -> anyhow::Result<()> {
    let spec = hound::WavReader::open(path)?.spec();
    println!(
        "Audio format: {} Hz, {} channel(s), {} bit",
        spec.sample_rate, spec.channels, spec.bits_per_sample
    );

    let recording = Recording::from_bytes(std::fs::read(path)?, capture::RECORDING_MIME_TYPE);
    let client = SubmissionClient::new(build_client(config)?);
    println!("{}", view::render::<AnalysisResult>(&LoadState::Loading));

    let result = client
        .analyze(&recording, exercise_id, &config.auth.user_id)
        .await;
    let state: LoadState<AnalysisResult> = match result {
        Ok(result) => LoadState::Ready(result),
        Err(e) if e.is_unauthenticated() => return Err(e.into()),
        Err(e) => LoadState::Error(e.user_message()),
    };
    println!("{}", view::render(&state));
    Ok(())
}

fn show_config(config: &Config, path: Option<&Path>, save: bool) -> anyhow::Result<()> {
    let path = path.map(Path::to_path_buf).or_else(Config::default_path);

    if save {
        let path = path
            .clone()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        let mut stored = config.clone();
        stored.auth.token = None;
        config::save_config(&stored, &path)?;
        println!("Saved configuration to {:?}\n", path);
    }

    println!("Current Configuration\n");
    println!("=====================\n");
    if let Some(path) = path {
        println!("# {:?}\n", path);
    }
    println!("{}", toml::to_string_pretty(&config.redacted())?);
    Ok(())
}

/// What the practice loop should do after handling input
enum Flow {
    Continue,
    Quit,
}

type AnalysisOutcome = (AnalysisTicket, Result<AnalysisResult, ApiError>);

/// Interactive practice session on stdin
async fn run_practice(config: &Config) -> anyhow::Result<()> {
    let capture = CaptureController::new(
        capture::create_media_devices(),
        CaptureConstraints::from_config(&config.audio),
    );
    let mut session = PracticeSession::new(build_client(config)?, capture);

    println!("{}", view::render::<Exercise>(&LoadState::Loading));
    if let Err(e) = session.load_next_exercise().await {
        return signed_out_or(e);
    }
    show(&session);
    print_help();

    let (analysis_tx, mut analysis_rx) = mpsc::channel::<AnalysisOutcome>(4);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tick = tokio::time::interval(Duration::from_millis(250));

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match handle_input(&mut session, line.trim(), &analysis_tx).await {
                    Ok(Flow::Continue) => show(&session),
                    Ok(Flow::Quit) => break,
                    Err(e) if e.is_unauthenticated() => break,
                    Err(e) => report(&session, &e),
                }
            }

            Some((ticket, outcome)) = analysis_rx.recv() => {
                match session.finish_analysis(ticket, outcome) {
                    Ok(true) => show(&session),
                    Ok(false) => {}
                    Err(e) if e.is_unauthenticated() => break,
                    Err(e) => report(&session, &e),
                }
            }

            _ = tick.tick() => {
                match session.check_capture().await {
                    Ok(true) => show(&session),
                    Ok(false) => {}
                    Err(e) => report(&session, &e),
                }
            }
        }
    }

    println!("Goodbye.");
    Ok(())
}

async fn handle_input(
    session: &mut PracticeSession,
    input: &str,
    analysis_tx: &mpsc::Sender<AnalysisOutcome>,
) -> Result<Flow, SessionError> {
    let (key, arg) = input
        .split_once(char::is_whitespace)
        .map(|(k, a)| (k, a.trim()))
        .unwrap_or((input, ""));

    match key {
        "" | "r" => {
            if session.state().is_recording() {
                session.stop_recording().await?;
            } else {
                session.start_recording().await?;
                println!("Recording... press r (or Enter) to stop.");
            }
        }
        "s" => {
            let request = session.begin_analysis()?;
            let client = session.submission().clone();
            let tx = analysis_tx.clone();
            tokio::spawn(async move {
                let outcome = client
                    .analyze(&request.recording, &request.exercise_id, &request.user_id)
                    .await;
                let _ = tx.send((request.ticket, outcome)).await;
            });
        }
        "p" => match session.recording() {
            Some(recording) => {
                println!("Playing back your recording...");
                if let Err(e) = speechcoach::playback::play_recording(recording).await {
                    eprintln!("! {}", e);
                }
            }
            None => return Err(SessionError::NothingToSubmit),
        },
        "x" => session.reset()?,
        "n" => {
            println!("{}", view::render::<Exercise>(&LoadState::Loading));
            session.load_next_exercise().await?;
        }
        "g" => {
            let kind = if arg.is_empty() {
                ExerciseType::default()
            } else {
                match arg.parse::<ExerciseType>() {
                    Ok(kind) => kind,
                    Err(e) => {
                        eprintln!("! {}", e);
                        return Ok(Flow::Continue);
                    }
                }
            };
            session.generate_exercise(kind).await?;
        }
        "c" => {
            session.complete_exercise().await?;
            println!("Exercise marked complete.");
        }
        "d" => session.dismiss_error(),
        "h" | "?" => print_help(),
        "q" => return Ok(Flow::Quit),
        other => eprintln!("Unknown command '{}'. Press h for help.", other),
    }

    Ok(Flow::Continue)
}

fn signed_out_or(e: SessionError) -> anyhow::Result<()> {
    if e.is_unauthenticated() {
        return Ok(());
    }
    Err(e.into())
}

fn report(session: &PracticeSession, error: &SessionError) {
    match view::error_banner(session.last_error()) {
        Some(banner) => eprintln!("{}", banner),
        None => eprintln!("! {}", error.user_message()),
    }
    println!("{}", view::status_line(session));
}

fn show(session: &PracticeSession) {
    println!();
    match session.state() {
        SessionState::Result => {
            println!("{}", view::render(&LoadState::from_option(session.analysis())));
        }
        SessionState::Analyzing { .. } => {
            println!("{}", view::render::<AnalysisResult>(&LoadState::Loading));
        }
        SessionState::Recording { .. } => {}
        _ => println!("{}", view::render(&view::exercise_state(session))),
    }
    if let Some(banner) = view::error_banner(session.last_error()) {
        eprintln!("{}", banner);
    }
    println!("{}", view::status_line(session));
}

fn print_help() {
    println!(
        r#"
Keys (type and press Enter):
  r / Enter   start or stop recording
  s           submit the recording for analysis
  p           play back the recording
  x           discard the recording and result
  n           next exercise
  g <type>    generate an exercise (sentence, story, conversation, tongue_twister)
  c           mark the exercise complete
  d           dismiss the error
  q           quit
"#
    );
}
