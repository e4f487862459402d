use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;
use url::Url;

use biokb_manifest::app::{App, FetchOptions, ProgressSinkKind};
use biokb_manifest::domain::{ManifestSource, SourceFormat};
use biokb_manifest::error::ManifestError;
use biokb_manifest::fetch::{ManifestClient, ManifestHttpClient, ProbeInfo};
use biokb_manifest::manifest::DEFAULT_MANIFEST_FILE;
use biokb_manifest::output::{JsonOutput, OutputMode};
use biokb_manifest::store::Store;
use biokb_manifest::tui::Tui;

#[derive(Parser)]
#[command(name = "biokb")]
#[command(about = "Manifest tooling for the bioimaging knowledge base")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Manage the knowledge-base manifest")]
    Manifest(ManifestArgs),
}

#[derive(Args)]
struct ManifestArgs {
    #[command(subcommand)]
    command: Option<ManifestCommand>,
}

#[derive(Subcommand)]
enum ManifestCommand {
    #[command(about = "Validate the manifest schema and invariants")]
    Validate(ValidateArgs),
    #[command(about = "List collections and channels")]
    List(ListArgs),
    #[command(about = "Show one collection or channel")]
    Info(InfoArgs),
    #[command(about = "Resolve a relative content link against a collection base_url")]
    Resolve(ResolveArgs),
    #[command(about = "Probe every source and base URL for reachability")]
    Check(ValidateArgs),
    #[command(about = "Fetch a remote manifest into the project store")]
    Fetch(FetchArgs),
    #[command(about = "Write a starter manifest")]
    Init(InitArgs),
    #[command(about = "Clear the project-local store")]
    Clear,
}

#[derive(Args, Clone)]
struct ValidateArgs {
    #[arg(long)]
    manifest: Option<String>,
}

#[derive(Args)]
struct ListArgs {
    #[arg(long)]
    manifest: Option<String>,

    #[arg(long)]
    format: Option<SourceFormat>,
}

#[derive(Args)]
struct InfoArgs {
    id: String,

    #[arg(long)]
    manifest: Option<String>,
}

#[derive(Args)]
struct ResolveArgs {
    id: String,
    link: String,

    #[arg(long)]
    manifest: Option<String>,
}

#[derive(Args)]
struct FetchArgs {
    url: String,

    #[arg(long)]
    force: bool,

    #[arg(long)]
    no_cache: bool,
}

#[derive(Args)]
struct InitArgs {
    path: Option<String>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<ManifestError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &ManifestError) -> u8 {
    match error {
        ManifestError::MissingManifest
        | ManifestError::ManifestRead(_)
        | ManifestError::ManifestParse(_)
        | ManifestError::ValidationFailed { .. }
        | ManifestError::CollectionNotFound(_)
        | ManifestError::AlreadyExists(_) => 2,
        ManifestError::Http(_)
        | ManifestError::HttpStatus { .. }
        | ManifestError::CheckFailed { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let store = Store::new().into_diagnostic()?;

    match cli.command {
        Some(Commands::Manifest(args)) => run_manifest(args, store, output_mode),
        None => {
            if std::path::Path::new(DEFAULT_MANIFEST_FILE).exists() {
                run_manifest_command(
                    ManifestCommand::Validate(ValidateArgs { manifest: None }),
                    store,
                    output_mode,
                )
            } else {
                Err(miette::Report::msg(
                    "command required (try `biokb manifest --help`)",
                ))
            }
        }
    }
}

fn run_manifest(args: ManifestArgs, store: Store, output_mode: OutputMode) -> miette::Result<()> {
    let command = args
        .command
        .unwrap_or(ManifestCommand::Validate(ValidateArgs { manifest: None }));
    run_manifest_command(command, store, output_mode)
}

fn run_manifest_command(
    command: ManifestCommand,
    store: Store,
    output_mode: OutputMode,
) -> miette::Result<()> {
    match command {
        ManifestCommand::Validate(args) => {
            let app = App::new(store, NopClient);
            run_validate(args, app, output_mode)
        }
        ManifestCommand::List(args) => {
            let app = App::new(store, NopClient);
            run_list(args, app, output_mode)
        }
        ManifestCommand::Info(args) => {
            let app = App::new(store, NopClient);
            run_info(args, app, output_mode)
        }
        ManifestCommand::Resolve(args) => {
            let app = App::new(store, NopClient);
            run_resolve(args, app, output_mode)
        }
        ManifestCommand::Check(args) => {
            let client = ManifestHttpClient::new().into_diagnostic()?;
            let app = App::new(store, client);
            run_check(args, app, output_mode)
        }
        ManifestCommand::Fetch(args) => {
            let client = ManifestHttpClient::new().into_diagnostic()?;
            let app = App::new(store, client);
            run_fetch(args, app, output_mode)
        }
        ManifestCommand::Init(args) => {
            let app = App::new(store, NopClient);
            let result = app.init(args.path.as_deref(), &JsonOutput).into_diagnostic()?;
            JsonOutput::print_init(&result).into_diagnostic()?;
            Ok(())
        }
        ManifestCommand::Clear => {
            let app = App::new(store, NopClient);
            match output_mode {
                OutputMode::NonInteractive => {
                    let result = app.clear(&JsonOutput).into_diagnostic()?;
                    JsonOutput::print_clear(&result).into_diagnostic()?;
                    Ok(())
                }
                OutputMode::Interactive => {
                    let mut tui = Tui::new(ProgressSinkKind::Fetch);
                    if !tui.confirm_clear()? {
                        return Ok(());
                    }
                    let result = tui.run(move |sink| app.clear(sink))?;
                    tui.finish_clear(&result)?;
                    Ok(())
                }
            }
        }
    }
}

#[derive(Clone, Copy)]
struct NopClient;

impl ManifestClient for NopClient {
    fn fetch_manifest(
        &self,
        _url: &Url,
        _destination: &std::path::Path,
    ) -> Result<Vec<u8>, ManifestError> {
        Err(ManifestError::Http("HTTP client not configured".to_string()))
    }

    fn probe(&self, _url: &Url) -> Result<ProbeInfo, ManifestError> {
        Err(ManifestError::Http("HTTP client not configured".to_string()))
    }
}

fn run_validate<C: ManifestClient + 'static>(
    args: ValidateArgs,
    app: App<C>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let result = match output_mode {
        OutputMode::NonInteractive => {
            let result = app
                .validate(args.manifest.as_deref(), &JsonOutput)
                .into_diagnostic()?;
            JsonOutput::print_validate(&result).into_diagnostic()?;
            result
        }
        OutputMode::Interactive => {
            let mut tui = Tui::new(ProgressSinkKind::Validate);
            let manifest = args.manifest.clone();
            let result = tui.run(move |sink| app.validate(manifest.as_deref(), sink))?;
            tui.finish_validate(&result)?;
            result
        }
    };

    if result.errors > 0 {
        return Err(miette::Report::new(ManifestError::ValidationFailed {
            errors: result.errors,
        }));
    }
    Ok(())
}

fn run_list<C: ManifestClient + 'static>(
    args: ListArgs,
    app: App<C>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    match output_mode {
        OutputMode::NonInteractive => {
            let result = app
                .list(args.manifest.as_deref(), args.format, &JsonOutput)
                .into_diagnostic()?;
            JsonOutput::print_list(&result).into_diagnostic()?;
            Ok(())
        }
        OutputMode::Interactive => {
            let mut tui = Tui::new(ProgressSinkKind::List);
            let manifest = args.manifest.clone();
            let format = args.format;
            let result = tui.run(move |sink| app.list(manifest.as_deref(), format, sink))?;
            tui.finish_list(&result)?;
            Ok(())
        }
    }
}

fn run_info<C: ManifestClient + 'static>(
    args: InfoArgs,
    app: App<C>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    match output_mode {
        OutputMode::NonInteractive => {
            let result = app
                .info(args.manifest.as_deref(), &args.id, &JsonOutput)
                .into_diagnostic()?;
            JsonOutput::print_info(&result).into_diagnostic()?;
            Ok(())
        }
        OutputMode::Interactive => {
            let mut tui = Tui::new(ProgressSinkKind::Info);
            let manifest = args.manifest.clone();
            let id = args.id.clone();
            let result = tui.run(move |sink| app.info(manifest.as_deref(), &id, sink))?;
            tui.finish_info(&result)?;
            Ok(())
        }
    }
}

fn run_resolve<C: ManifestClient + 'static>(
    args: ResolveArgs,
    app: App<C>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    // Link resolution is a one-line answer; a progress screen adds nothing.
    let result = app
        .resolve_link(args.manifest.as_deref(), &args.id, &args.link, &JsonOutput)
        .into_diagnostic()?;
    match output_mode {
        OutputMode::NonInteractive => {
            JsonOutput::print_resolve(&result).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            println!("{}", result.resolved);
        }
    }
    Ok(())
}

fn run_check<C: ManifestClient + 'static>(
    args: ValidateArgs,
    app: App<C>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let result = match output_mode {
        OutputMode::NonInteractive => {
            let result = app
                .check(args.manifest.as_deref(), &JsonOutput)
                .into_diagnostic()?;
            JsonOutput::print_check(&result).into_diagnostic()?;
            result
        }
        OutputMode::Interactive => {
            let mut tui = Tui::new(ProgressSinkKind::Check);
            let manifest = args.manifest.clone();
            let result = tui.run(move |sink| app.check(manifest.as_deref(), sink))?;
            tui.finish_check(&result)?;
            result
        }
    };

    if result.failures > 0 {
        return Err(miette::Report::new(ManifestError::CheckFailed {
            failures: result.failures,
        }));
    }
    Ok(())
}

fn run_fetch<C: ManifestClient + 'static>(
    args: FetchArgs,
    app: App<C>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let source: ManifestSource = args.url.parse().into_diagnostic()?;
    let url = match source {
        ManifestSource::Remote(url) => url,
        ManifestSource::Local(path) => {
            return Err(miette::Report::msg(format!(
                "fetch requires a remote URL; {path} is a local path (use --manifest instead)"
            )));
        }
    };
    let options = FetchOptions {
        force: args.force,
        no_cache: args.no_cache,
    };

    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.fetch(&url, options, &JsonOutput).into_diagnostic()?;
            JsonOutput::print_fetch(&result).into_diagnostic()?;
            Ok(())
        }
        OutputMode::Interactive => {
            let mut tui = Tui::new(ProgressSinkKind::Fetch);
            let result = tui.run(move |sink| app.fetch(&url, options, sink))?;
            tui.finish_fetch(&result)?;
            Ok(())
        }
    }
}
