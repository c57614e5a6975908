//! mcpm - MCP Manager CLI

use std::error::Error;
use std::io::{self, BufRead, Read, Write};
use std::path::Path;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use mcpm::catalog::{self, CatalogError};
use mcpm::import;
use mcpm::manager::{Endpoints, Manager, StartupReport};
use mcpm::prefs::PrefsSource;
use mcpm::registry::{AddOutcome, LoadOutcome, RegistryError};
use mcpm::restart;
use mcpm::tasks::{BackgroundTasks, TaskEvent};
use mcpm::update::{self, APP_VERSION};
use mcpm::{CatalogEntry, CatalogFields, CatalogSummary, LaunchSpec, Paths, ServerRow};
use simplelog::{ColorChoice, CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger, TermLogger, TerminalMode, WriteLogger};

type CliResult<T = ()> = Result<T, Box<dyn Error>>;

#[derive(Parser)]
#[command(name = "mcpm")]
#[command(version)]
#[command(about = "MCP Manager - manage Claude Desktop MCP servers and the server marketplace")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,

    /// Also write the log to this file
    #[arg(long, global = true, value_name = "FILE")]
    log_file: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show resolved paths (for debugging)
    Paths,

    /// List configured MCP servers
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Add a server and save
    Add(ServerArgs),

    /// Remove a server and save
    Remove {
        /// Server name
        name: String,
    },

    /// Import the first server of an mcpServers JSON fragment and save
    Import {
        /// JSON file, or - for stdin
        file: String,

        /// Replace an existing server with the same name
        #[arg(long)]
        force: bool,
    },

    /// Copy the config file into the backup directory
    Backup,

    /// Browse and manage the marketplace catalog
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },

    /// Check for a newer mcpm release and marketplace
    CheckUpdate,

    /// Restart Claude Desktop
    Restart,

    /// Show or change mcpm settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Interactive session (pause/resume, unsaved changes, background tasks)
    Shell,
}

#[derive(Args)]
struct ServerArgs {
    /// Environment variable (repeatable)
    #[arg(short, long = "env", value_name = "KEY=VALUE")]
    env: Vec<String>,

    /// Replace an existing server with the same name
    #[arg(long)]
    force: bool,

    /// Server name
    name: String,

    /// Command to run
    command: String,

    /// Command arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

#[derive(Args)]
struct EditArgs {
    /// New name for the server
    #[arg(long)]
    rename: Option<String>,

    /// Environment variable (repeatable)
    #[arg(short, long = "env", value_name = "KEY=VALUE")]
    env: Vec<String>,

    /// Allow renaming onto an existing server
    #[arg(long)]
    force: bool,

    /// Server to edit
    name: String,

    /// Command to run
    command: String,

    /// Command arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

#[derive(Subcommand)]
enum CatalogAction {
    /// List marketplace servers, optionally filtered by name or description
    List {
        search: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one marketplace server
    Show {
        name: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Add a marketplace server
    Add(CatalogEntryArgs),

    /// Edit the marketplace server with the given id
    Edit {
        id: i64,

        #[command(flatten)]
        entry: CatalogEntryArgs,
    },

    /// Remove a marketplace server by name
    Remove { name: String },

    /// Add a marketplace server to the Claude config
    Install {
        name: String,

        /// Replace an existing server with the same name
        #[arg(long)]
        force: bool,
    },

    /// Download the latest marketplace database
    Update,

    /// Show local and published marketplace versions
    Version,
}

#[derive(Args)]
struct CatalogEntryArgs {
    /// Fill name, command, args and env from an mcpServers JSON file (- for stdin)
    #[arg(long, value_name = "FILE")]
    from_json: Option<String>,

    #[arg(long)]
    name: Option<String>,

    #[arg(long)]
    command: Option<String>,

    /// Arguments as a JSON list
    #[arg(long, value_name = "JSON")]
    args: Option<String>,

    /// Environment variables as a JSON object
    #[arg(long, value_name = "JSON")]
    env: Option<String>,

    #[arg(long)]
    description: Option<String>,

    #[arg(long)]
    instructions: Option<String>,

    #[arg(long)]
    owner_name: Option<String>,

    #[arg(long)]
    owner_link: Option<String>,

    #[arg(long)]
    repo_link: Option<String>,
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Show preferences and the resolved paths
    Show,

    /// Use a custom Claude config file ("" restores the default)
    SetConfigPath {
        path: String,

        /// Discard unsaved changes (interactive session only)
        #[arg(long)]
        force: bool,
    },

    /// Add a Claude Desktop executable location
    AddExePath { path: String },

    /// Forget all custom executable locations
    ClearExePaths,

    /// Restore default settings
    Reset {
        /// Discard unsaved changes (interactive session only)
        #[arg(long)]
        force: bool,
    },
}

/// One line of the interactive session.
#[derive(Parser)]
#[command(no_binary_name = true, disable_version_flag = true)]
struct ShellLine {
    #[command(subcommand)]
    command: ShellCommand,
}

#[derive(Subcommand)]
enum ShellCommand {
    /// List servers with their status
    List {
        #[arg(long)]
        json: bool,
    },
    /// Add a server (Active)
    Add(ServerArgs),
    /// Replace a server's launch spec, optionally renaming it
    Edit(EditArgs),
    /// Remove a server
    Remove { name: String },
    /// Leave a server out of the saved config
    Pause { name: String },
    /// Include a paused server again
    Resume { name: String },
    /// Import the first server of an mcpServers JSON file
    Import {
        file: String,
        #[arg(long)]
        force: bool,
    },
    /// Write the active servers to the config file
    Save,
    /// Re-read the config file
    Reload {
        /// Discard unsaved changes
        #[arg(long)]
        force: bool,
    },
    /// Copy the config file into the backup directory
    Backup,
    /// Show config path, counts and marketplace version
    Status,
    /// Marketplace commands
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },
    /// Check for updates in the background
    CheckUpdate,
    /// Restart Claude Desktop in the background
    Restart,
    /// Settings commands
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Leave the session
    #[command(alias = "exit")]
    Quit {
        /// Quit even with unsaved changes
        #[arg(long)]
        force: bool,
    },
}

enum Flow {
    Continue,
    Quit,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.debug, cli.log_file.as_deref());

    if let Err(e) = run(cli.command) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(debug: bool, log_file: Option<&Path>) {
    let term_level = if debug { LevelFilter::Debug } else { LevelFilter::Warn };
    let file_level = if debug { LevelFilter::Debug } else { LevelFilter::Info };
    let config = ConfigBuilder::new().set_time_level(LevelFilter::Off).build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
    loggers.push(TermLogger::new(term_level, config, TerminalMode::Stderr, ColorChoice::Auto));

    if let Some(path) = log_file {
        match std::fs::OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => loggers.push(WriteLogger::new(file_level, simplelog::Config::default(), file)),
            Err(e) => eprintln!("Warning: cannot open log file {}: {}", path.display(), e),
        }
    }

    if CombinedLogger::init(loggers).is_err() {
        eprintln!("Warning: logging already initialized");
    }
}

fn run(command: Commands) -> CliResult {
    if let Commands::Shell = command {
        let (mgr, report) = Manager::open(Paths::resolve(), Endpoints::resolve());
        report_prefs(&mgr, &report);
        return run_shell(mgr, report);
    }

    let (mut mgr, report) = Manager::open(Paths::resolve(), Endpoints::resolve());
    report_prefs(&mgr, &report);
    if needs_loaded_config(&command) {
        if let Err(e) = report.load {
            return Err(format!("Cannot use {}: {}", report.config_path.display(), e).into());
        }
    }

    match command {
        Commands::Paths => print_paths(&mgr),
        Commands::List { json } => print_servers(&mgr.registry().snapshot(), json)?,
        Commands::Add(args) => {
            add_server(&mut mgr, args)?;
            save(&mut mgr)?;
        }
        Commands::Remove { name } => {
            if !mgr.registry_mut().remove(&name) {
                return Err(RegistryError::NotConfigured(name).into());
            }
            println!("Removed {}", name);
            save(&mut mgr)?;
        }
        Commands::Import { file, force } => {
            import_server(&mut mgr, &file, force)?;
            save(&mut mgr)?;
        }
        Commands::Backup => {
            let path = mgr.backup()?;
            println!("Backup created: {}", path.display());
        }
        Commands::Catalog { action } => {
            if run_catalog(&mut mgr, action, None)? {
                save(&mut mgr)?;
            }
        }
        Commands::CheckUpdate => check_updates(&mgr)?,
        Commands::Restart => {
            let plan = mgr.restart_plan()?;
            println!("Restarting Claude Desktop...");
            restart::execute(&plan)?;
            println!("Claude Desktop restarted");
        }
        Commands::Settings { action } => run_settings(&mut mgr, action)?,
        Commands::Shell => {}
    }
    Ok(())
}

/// Commands that read or rewrite the server list stop on an unreadable config
/// rather than saving over it. The rest work without one.
fn needs_loaded_config(command: &Commands) -> bool {
    match command {
        Commands::List { .. } | Commands::Add(_) | Commands::Remove { .. } | Commands::Import { .. } => true,
        Commands::Catalog { action } => matches!(action, CatalogAction::Install { .. }),
        _ => false,
    }
}

fn report_prefs(mgr: &Manager, report: &StartupReport) {
    match &report.prefs {
        Ok(PrefsSource::Created) => eprintln!("Created settings file {}", mgr.paths().preferences.display()),
        Ok(PrefsSource::Loaded) => {}
        Err(e) => eprintln!("Warning: {}; using default settings", e),
    }
}

fn save(mgr: &mut Manager) -> CliResult {
    let summary = mgr.save()?;
    println!(
        "Saved {} active servers ({} paused) to {}",
        summary.active,
        summary.paused,
        mgr.config_path().display()
    );
    if let Some(backup) = summary.backup {
        println!("Backup: {}", backup.display());
    }
    Ok(())
}

fn add_server(mgr: &mut Manager, args: ServerArgs) -> CliResult {
    let spec = LaunchSpec::new(args.command)
        .with_args(args.args)
        .with_env(parse_env(&args.env)?);
    match mgr.registry_mut().add(&args.name, spec, args.force) {
        Err(RegistryError::Conflict(name)) => {
            Err(format!("Server '{}' already exists (use --force to replace it)", name).into())
        }
        Err(e) => Err(e.into()),
        Ok(AddOutcome::Inserted) => {
            println!("Added {}", args.name);
            Ok(())
        }
        Ok(AddOutcome::Replaced) => {
            println!("Replaced {}", args.name);
            Ok(())
        }
    }
}

fn edit_server(mgr: &mut Manager, args: EditArgs) -> CliResult {
    let mut spec = LaunchSpec::new(args.command)
        .with_args(args.args)
        .with_env(parse_env(&args.env)?);
    if let Some(existing) = mgr.registry().get(&args.name) {
        spec.extra = existing.extra.clone();
    }
    let new_name = args.rename.unwrap_or_else(|| args.name.clone());
    mgr.registry_mut().edit(&args.name, &new_name, spec, args.force)?;
    println!("Updated {}", new_name);
    Ok(())
}

fn import_server(mgr: &mut Manager, file: &str, force: bool) -> CliResult {
    let text = read_input(file)?;
    let report = mgr.import_server(&text, force)?;
    if !report.ignored.is_empty() {
        println!(
            "Multiple servers found; imported only '{}' (ignored: {})",
            report.name,
            report.ignored.join(", ")
        );
    }
    println!("Imported {}", report.name);
    Ok(())
}

fn parse_env(pairs: &[String]) -> CliResult<Vec<(String, String)>> {
    pairs
        .iter()
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.to_string())),
            _ => Err(format!("Invalid environment variable '{}', expected KEY=VALUE", pair).into()),
        })
        .collect()
}

fn read_input(file: &str) -> CliResult<String> {
    if file == "-" {
        let mut text = String::new();
        io::stdin().read_to_string(&mut text)?;
        return Ok(text);
    }
    std::fs::read_to_string(file).map_err(|e| format!("Cannot read {}: {}", file, e).into())
}

/// Returns true when the registry changed and should be saved.
fn run_catalog(mgr: &mut Manager, action: CatalogAction, tasks: Option<&mut BackgroundTasks>) -> CliResult<bool> {
    match action {
        CatalogAction::List { search, json } => match mgr.catalog().list(search.as_deref()) {
            Err(CatalogError::Missing(path)) => {
                println!("No marketplace database at {}.", path.display());
                println!("Download it with: mcpm catalog update");
            }
            Err(e) => return Err(e.into()),
            Ok(rows) if json => println!("{}", serde_json::to_string_pretty(&rows)?),
            Ok(rows) if rows.is_empty() => println!("No servers found."),
            Ok(rows) => print_catalog_list(&rows),
        },
        CatalogAction::Show { name, json } => {
            let entry = mgr.catalog().get_details(&name)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entry)?);
            } else {
                print_catalog_entry(&entry);
            }
        }
        CatalogAction::Add(entry) => {
            let fields = catalog_fields(entry)?;
            let id = mgr.catalog().add(&fields)?;
            println!("Added '{}' to marketplace (id {})", fields.name.trim(), id);
            print_catalog_version(mgr);
        }
        CatalogAction::Edit { id, entry } => {
            let fields = catalog_fields(entry)?;
            mgr.catalog().edit(id, &fields)?;
            println!("Updated marketplace server {}", id);
            print_catalog_version(mgr);
        }
        CatalogAction::Remove { name } => {
            if mgr.catalog().remove(&name)? {
                println!("Removed '{}' from marketplace", name);
                print_catalog_version(mgr);
            } else {
                println!("No marketplace server named '{}'", name);
            }
        }
        CatalogAction::Install { name, force } => {
            match mgr.install_from_catalog(&name, force) {
                Err(mcpm::ManagerError::Registry(RegistryError::Conflict(n))) => {
                    return Err(format!("Server '{}' already exists (use --force to replace it)", n).into())
                }
                result => result?,
            };
            println!("Installed {}", name);
            return Ok(true);
        }
        CatalogAction::Update => {
            let url = mgr.endpoints().catalog_archive.clone();
            match tasks {
                Some(tasks) => {
                    tasks.download_catalog(mgr.catalog().clone(), url)?;
                    println!("Downloading marketplace database in the background...");
                }
                None => {
                    println!("Downloading marketplace database...");
                    let bytes = mgr.catalog().download_latest(&url)?;
                    println!("Downloaded {} bytes to {}", bytes, mgr.catalog().path().display());
                    print_catalog_version(mgr);
                }
            }
        }
        CatalogAction::Version => {
            let (local, _) = mgr.catalog_status();
            println!("Local:     {}", local.as_deref().unwrap_or("Not found"));
            match catalog::check_remote_version(&mgr.endpoints().catalog_version) {
                Ok(remote) => println!("Published: {}", remote),
                Err(e) => println!("Published: unavailable ({})", e),
            }
        }
    }
    Ok(false)
}

fn catalog_fields(args: CatalogEntryArgs) -> CliResult<CatalogFields> {
    let mut fields = CatalogFields::new("", "");
    if let Some(file) = &args.from_json {
        let text = read_input(file)?;
        import::catalog_fields_from_server_json(&text, &mut fields)?;
    }
    if let Some(name) = args.name {
        fields.name = name;
    }
    if let Some(command) = args.command {
        fields.command = command;
    }
    if let Some(a) = args.args {
        fields.args = a;
    }
    if let Some(e) = args.env {
        fields.env_vars = e;
    }
    fields.description = args.description;
    fields.instructions = args.instructions;
    fields.owner_name = args.owner_name;
    fields.owner_link = args.owner_link;
    fields.repo_link = args.repo_link;
    Ok(fields)
}

fn check_updates(mgr: &Manager) -> CliResult {
    let app = update::check_app_version(&mgr.endpoints().app_version)?;
    if app.update_available {
        println!("New version available: {} (current {})", app.remote, APP_VERSION);
        println!("Download: {}", mgr.endpoints().releases);
    } else {
        println!("mcpm {} is up to date", APP_VERSION);
    }

    let (local, _) = mgr.catalog_status();
    match update::check_catalog_version(local.as_deref(), &mgr.endpoints().catalog_version) {
        Ok(c) if c.update_available => println!(
            "Marketplace update available: {} (local {}). Run: mcpm catalog update",
            c.remote,
            c.local.as_deref().unwrap_or("not found")
        ),
        Ok(c) => println!("Marketplace {} is up to date", c.remote),
        Err(e) => eprintln!("Warning: could not check the marketplace version: {}", e),
    }
    Ok(())
}

fn run_settings(mgr: &mut Manager, action: SettingsAction) -> CliResult {
    match action {
        SettingsAction::Show => {
            println!("{}", serde_json::to_string_pretty(mgr.prefs().as_json())?);
            println!();
            print_paths(mgr);
        }
        SettingsAction::SetConfigPath { path, force } => {
            let outcome = mgr.switch_config_path(&path, force)?;
            println!("Using config file {}", mgr.config_path().display());
            print_load_outcome(outcome);
        }
        SettingsAction::AddExePath { path } => {
            mgr.add_executable_path(&path)?;
            println!("Executable paths: {}", mgr.prefs().executable_path_overrides().join(", "));
        }
        SettingsAction::ClearExePaths => {
            mgr.set_executable_paths(Vec::new())?;
            println!("Custom executable paths cleared");
        }
        SettingsAction::Reset { force } => {
            let outcome = mgr.reset_preferences(force)?;
            println!("Settings reset. Using config file {}", mgr.config_path().display());
            print_load_outcome(outcome);
        }
    }
    Ok(())
}

fn run_shell(mut mgr: Manager, report: StartupReport) -> CliResult {
    println!("mcpm {} - type 'help' for commands", APP_VERSION);
    println!("Config: {}", report.config_path.display());
    match report.load {
        Ok(outcome) => print_load_outcome(outcome),
        Err(e) => eprintln!("Error: {}", e),
    }
    match (&report.catalog_version, report.catalog_entries) {
        (Some(v), Some(n)) => println!("Marketplace: version {}, {} servers", v, n),
        (Some(v), None) => println!("Marketplace: version {}", v),
        _ => println!("Marketplace: not downloaded (run 'catalog update')"),
    }

    let mut tasks = BackgroundTasks::new();
    if let Err(e) = mgr.start_version_checks(&mut tasks) {
        log::warn!("Could not start version checks: {}", e);
    }

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        while let Some(event) = tasks.try_next() {
            report_event(&mgr, event);
        }

        print!("mcpm{}> ", if mgr.is_dirty() { "*" } else { "" });
        io::stdout().flush()?;

        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            if mgr.is_dirty() {
                eprintln!("Warning: leaving with unsaved changes");
            }
            println!();
            break;
        }

        let Some(words) = shlex::split(&line) else {
            eprintln!("Error: unbalanced quotes");
            continue;
        };
        if words.is_empty() {
            continue;
        }

        let parsed = match ShellLine::try_parse_from(words) {
            Ok(p) => p,
            Err(e) => {
                let _ = e.print();
                continue;
            }
        };

        match handle_shell(&mut mgr, &mut tasks, parsed.command) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => break,
            Err(e) => eprintln!("Error: {}", e),
        }
    }

    for event in tasks.wait_all(Duration::from_secs(2)) {
        report_event(&mgr, event);
    }
    Ok(())
}

fn handle_shell(mgr: &mut Manager, tasks: &mut BackgroundTasks, command: ShellCommand) -> CliResult<Flow> {
    match command {
        ShellCommand::List { json } => print_servers(&mgr.registry().snapshot(), json)?,
        ShellCommand::Add(args) => add_server(mgr, args)?,
        ShellCommand::Edit(args) => edit_server(mgr, args)?,
        ShellCommand::Remove { name } => {
            if mgr.registry_mut().remove(&name) {
                println!("Removed {}", name);
            } else {
                println!("No server named '{}'", name);
            }
        }
        ShellCommand::Pause { name } => {
            mgr.registry_mut().pause(&name)?;
            println!("Paused {} (save to apply)", name);
        }
        ShellCommand::Resume { name } => {
            mgr.registry_mut().resume(&name)?;
            println!("Resumed {} (save to apply)", name);
        }
        ShellCommand::Import { file, force } => import_server(mgr, &file, force)?,
        ShellCommand::Save => save(mgr)?,
        ShellCommand::Reload { force } => {
            if mgr.is_dirty() && !force {
                return Err("There are unsaved changes; save first or use 'reload --force'".into());
            }
            print_load_outcome(mgr.reload()?);
        }
        ShellCommand::Backup => {
            let path = mgr.backup()?;
            println!("Backup created: {}", path.display());
        }
        ShellCommand::Status => print_status(mgr),
        ShellCommand::Catalog { action } => {
            run_catalog(mgr, action, Some(tasks))?;
        }
        ShellCommand::CheckUpdate => {
            mgr.start_version_checks(tasks)?;
            println!("Checking for updates...");
        }
        ShellCommand::Restart => {
            if mgr.is_dirty() {
                println!("Note: unsaved changes are not visible to Claude Desktop until saved");
            }
            tasks.restart(mgr.restart_plan()?)?;
            println!("Restarting Claude Desktop...");
        }
        ShellCommand::Settings { action } => run_settings(mgr, action)?,
        ShellCommand::Quit { force } => {
            if mgr.is_dirty() && !force {
                return Err("There are unsaved changes; 'save' first or 'quit --force'".into());
            }
            return Ok(Flow::Quit);
        }
    }
    Ok(Flow::Continue)
}

fn report_event(mgr: &Manager, event: TaskEvent) {
    match event {
        TaskEvent::AppVersion(Ok(check)) if check.update_available => {
            println!("New version available: {} (current {})", check.remote, APP_VERSION);
            println!("Download: {}", mgr.endpoints().releases);
        }
        TaskEvent::AppVersion(Ok(_)) => log::info!("mcpm is up to date"),
        TaskEvent::AppVersion(Err(e)) => log::warn!("Could not check for updates: {}", e),
        TaskEvent::CatalogVersion(Ok(check)) if check.update_available => println!(
            "Marketplace update available: {} (local {}). Run 'catalog update'",
            check.remote,
            check.local.as_deref().unwrap_or("not found")
        ),
        TaskEvent::CatalogVersion(Ok(check)) => log::info!("Marketplace {} is up to date", check.remote),
        TaskEvent::CatalogVersion(Err(e)) => log::warn!("Could not check the marketplace version: {}", e),
        TaskEvent::CatalogDownloaded(Ok(bytes)) => {
            println!("Marketplace database updated ({} bytes)", bytes);
            print_catalog_version(mgr);
        }
        TaskEvent::CatalogDownloaded(Err(e)) => eprintln!("Error: Failed to download marketplace: {}", e),
        TaskEvent::Restarted(Ok(())) => println!("Claude Desktop restarted"),
        TaskEvent::Restarted(Err(e)) => eprintln!(
            "Error: Failed to restart Claude Desktop: {}\nYou may need to restart it manually or set its path with 'settings add-exe-path'.",
            e
        ),
    }
}

fn print_load_outcome(outcome: LoadOutcome) {
    match outcome {
        LoadOutcome::Loaded(n) => println!("Loaded {} servers", n),
        LoadOutcome::Missing => println!("Config file not found; it will be created on save"),
    }
}

fn print_catalog_version(mgr: &Manager) {
    match mgr.catalog().get_version() {
        Ok(v) => println!("Marketplace version: {}", v),
        Err(e) => log::warn!("Could not read marketplace version: {}", e),
    }
}

fn print_status(mgr: &Manager) {
    let reg = mgr.registry();
    let paused = reg.paused().len();
    let active = reg.active_entries().len();
    println!("Config:      {}", mgr.config_path().display());
    println!("Servers:     {} active, {} paused", active, paused);
    println!("Unsaved:     {}", if reg.is_dirty() { "yes" } else { "no" });
    let (version, count) = mgr.catalog_status();
    match version {
        Some(v) => println!("Marketplace: {} ({} servers)", v, count.unwrap_or(0)),
        None => println!("Marketplace: Not found"),
    }
}

fn print_paths(mgr: &Manager) {
    let paths = mgr.paths();
    println!("Claude config:    {}", mgr.config_path().display());
    println!("Config exists:    {}", mgr.config_path().exists());
    println!("Settings file:    {}", paths.preferences.display());
    println!("Backup dir:       {}", paths.backup_dir.display());
    println!("Marketplace DB:   {}", paths.catalog_db.display());
    println!("Executables:");
    for candidate in mgr.executable_candidates() {
        let marker = if candidate.exists() { "*" } else { " " };
        println!("  {} {}", marker, candidate.display());
    }
}

fn print_servers(rows: &[ServerRow], json: bool) -> CliResult {
    if json {
        println!("{}", serde_json::to_string_pretty(rows)?);
        return Ok(());
    }
    if rows.is_empty() {
        println!("No MCP servers configured.");
        return Ok(());
    }

    const INDENT: &str = "        ";
    for row in rows {
        println!("{}", row.name);
        println!("{}Status:  {}", INDENT, row.status);
        match &row.spec {
            None => println!("{}Command: (Paused) configuration lost", INDENT),
            Some(spec) => {
                println!("{}Command: {}", INDENT, spec.command);
                if !spec.args.is_empty() {
                    println!("{}Args:    {}", INDENT, spec.args.join(" "));
                }
                if !spec.env.is_empty() {
                    let keys: Vec<&str> = spec.env.keys().map(String::as_str).collect();
                    println!("{}Env:     {}", INDENT, keys.join(", "));
                }
            }
        }
        println!();
    }
    Ok(())
}

fn print_catalog_list(rows: &[CatalogSummary]) {
    const INDENT: &str = "        ";

    for s in rows {
        println!("{}", s.name);
        if let Some(owner) = s.owner_name.as_deref().filter(|x| !x.is_empty()) {
            println!("{}Owner:       {}", INDENT, owner);
        }
        if let Some(d) = s.description.as_deref().filter(|x| !x.is_empty()) {
            println!("{}Description: {}", INDENT, d.lines().next().unwrap_or("").trim());
        }
        println!();
    }
}

fn print_catalog_entry(entry: &CatalogEntry) {
    const INDENT: &str = "        ";

    println!("{}", entry.name);
    println!("{}Id:          {}", INDENT, entry.id);
    if let Some(d) = entry.description.as_deref().filter(|x| !x.is_empty()) {
        println!("{}Description:", INDENT);
        for line in d.lines().map(str::trim).filter(|l| !l.is_empty()) {
            println!("{}{}{}", INDENT, INDENT, line);
        }
    }
    if let Some(i) = entry.instructions.as_deref().filter(|x| !x.is_empty()) {
        println!("{}Instructions:", INDENT);
        for line in i.lines().map(str::trim).filter(|l| !l.is_empty()) {
            println!("{}{}{}", INDENT, INDENT, line);
        }
    }
    if let Some(o) = entry.owner_name.as_deref().filter(|x| !x.is_empty()) {
        println!("{}Owner:       {}", INDENT, o);
    }
    if let Some(l) = entry.owner_link.as_deref().filter(|x| !x.is_empty()) {
        println!("{}Owner link:  {}", INDENT, l);
    }
    if let Some(r) = entry.repo_link.as_deref().filter(|x| !x.is_empty()) {
        println!("{}Repository:  {}", INDENT, r);
    }
    println!("{}Command:     {}", INDENT, entry.command);
    println!("{}Args:        {}", INDENT, entry.args);
    println!("{}Env:         {}", INDENT, entry.env_vars);
    if let Some(d) = entry.date_added.as_deref() {
        println!("{}Added:       {}", INDENT, d);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::list(&["list"], true)]
    #[case::add(&["add", "fs", "npx"], true)]
    #[case::remove(&["remove", "fs"], true)]
    #[case::import(&["import", "-"], true)]
    #[case::catalog_install(&["catalog", "install", "fs"], true)]
    #[case::paths(&["paths"], false)]
    #[case::backup(&["backup"], false)]
    #[case::catalog_list(&["catalog", "list"], false)]
    #[case::catalog_update(&["catalog", "update"], false)]
    #[case::check_update(&["check-update"], false)]
    #[case::restart(&["restart"], false)]
    #[case::settings(&["settings", "show"], false)]
    fn only_server_list_commands_need_a_readable_config(#[case] args: &[&str], #[case] needed: bool) {
        let cli = Cli::try_parse_from(std::iter::once("mcpm").chain(args.iter().copied())).unwrap();
        assert_eq!(needs_loaded_config(&cli.command), needed);
    }
}
