use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};

use file_tree_sync::config::{AppConfig, GeneralConfig, LoggingConfig};
use file_tree_sync::edit::RenameEditor;
use file_tree_sync::engine::TreeService;
use file_tree_sync::error::{self, TreeError};
use file_tree_sync::fs::local::LocalStorage;
use file_tree_sync::fs::storage::EntryKind;
use file_tree_sync::fs::tree::Node;
use file_tree_sync::handler::{self, Command, Flow};
use file_tree_sync::logging;
use file_tree_sync::notify::{NotificationKind, Notifications, Notifier};

/// Browse and edit a directory tree through a handle-based storage API.
#[derive(Parser, Debug)]
#[command(name = "fts", version, about)]
struct Cli {
    /// Directory to operate on (defaults to general.default_path, then ".")
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// Explicit config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log filter directive, e.g. "debug" (FTS_LOG wins over this)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the whole tree
    Tree {
        /// Emit the forest as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create a folder under PARENT, optionally renaming it to NAME
    Mkdir {
        #[arg(default_value = "")]
        parent: String,
        name: Option<String>,
    },
    /// Create a file from the template under PARENT, optionally named NAME
    Touch {
        #[arg(default_value = "")]
        parent: String,
        name: Option<String>,
    },
    /// Delete a file or folder
    Rm {
        path: String,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Rename a file or folder in place
    Mv { path: String, name: String },
    /// Interactive shell, starting in the in-memory workspace
    Shell,
}

/// Ask a yes/no question on stderr and read the answer from stdin.
fn ask(question: &str) -> bool {
    eprint!("{} [y/N] ", question);
    let _ = io::stderr().flush();
    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim(), "y" | "Y" | "yes")
}

fn confirm_delete(node: &Node) -> bool {
    match node.kind() {
        EntryKind::Folder => ask(&format!(
            "Delete folder \"{}\" and everything in it?",
            node.name
        )),
        EntryKind::File => ask(&format!("Delete \"{}\"?", node.name)),
    }
}

fn print_notifications(rx: &mut Notifications) {
    for n in rx.drain() {
        let mark = match n.kind {
            NotificationKind::Success => "✓",
            NotificationKind::Error => "✗",
            NotificationKind::Info => "•",
        };
        eprintln!("{} {}", mark, n.message);
    }
}

fn root_path(cli_root: Option<PathBuf>, config: &AppConfig) -> PathBuf {
    cli_root
        .or_else(|| config.default_path().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."))
}

async fn run_shell(
    service: &TreeService<LocalStorage>,
    rx: &mut Notifications,
    confirm: bool,
) -> error::Result<()> {
    let mut editor = RenameEditor::new();
    let stdout = io::stdout();
    eprintln!("{}", handler::HELP);

    loop {
        eprint!("fts> ");
        io::stderr().flush()?;
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Ok(());
        }
        let command = match handler::parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(usage) => {
                eprintln!("{}", usage);
                continue;
            }
        };
        let ask_first = move |node: &Node| !confirm || confirm_delete(node);
        let mut out = stdout.lock();
        // failures were already reported as notifications
        let flow = handler::handle_command(service, &mut editor, command, ask_first, &mut out)
            .await
            .unwrap_or(Flow::Continue);
        drop(out);
        print_notifications(rx);
        if flow == Flow::Quit {
            return Ok(());
        }
    }
}

async fn run_once(
    service: &TreeService<LocalStorage>,
    rx: &mut Notifications,
    command: Commands,
    confirm: bool,
) -> error::Result<()> {
    service.connect().await?;
    rx.drain();

    if let Commands::Tree { json } = command {
        let snapshot = service.snapshot();
        if json {
            let text = serde_json::to_string_pretty(snapshot.roots.as_ref())
                .map_err(|e| TreeError::Storage(format!("Failed to encode tree: {}", e)))?;
            println!("{}", text);
        } else {
            println!("{}", snapshot.connected.as_deref().unwrap_or(&snapshot.root_id));
            print!("{}", file_tree_sync::view::render_text(&snapshot.flatten(true)));
        }
        return Ok(());
    }

    let command = match command {
        Commands::Mkdir { parent, name } => Command::Create {
            kind: EntryKind::Folder,
            parent,
            name,
        },
        Commands::Touch { parent, name } => Command::Create {
            kind: EntryKind::File,
            parent,
            name,
        },
        Commands::Rm { path, yes } => Command::Remove {
            path,
            yes: yes || !confirm,
        },
        Commands::Mv { path, name } => Command::Rename { path, name },
        Commands::Tree { .. } | Commands::Shell => return Ok(()),
    };

    let mut editor = RenameEditor::new();
    let result = handler::handle_command(
        service,
        &mut editor,
        command,
        confirm_delete,
        &mut io::stdout().lock(),
    )
    .await;
    print_notifications(rx);
    result.map(|_| ())
}

fn consent_prompt() -> Arc<dyn Fn(&Path) -> bool + Send + Sync> {
    Arc::new(|path: &Path| {
        ask(&format!(
            "Allow read/write access to {}?",
            path.display()
        ))
    })
}

#[tokio::main]
async fn main() -> error::Result<()> {
    let cli = Cli::parse();

    let overrides = AppConfig {
        general: GeneralConfig {
            default_path: cli.root.as_ref().map(|p| p.display().to_string()),
            ..Default::default()
        },
        logging: LoggingConfig {
            level: cli.log_level.clone(),
            ..Default::default()
        },
        ..Default::default()
    };
    let config = AppConfig::load(cli.config.as_deref(), Some(&overrides));
    logging::init(config.log_level(), config.log_format()?)?;

    let engine_config = config.engine_config()?;
    let (notifier, mut rx) =
        Notifier::channel(engine_config.notify_duration, engine_config.error_notify_duration);

    let root = root_path(cli.root, &config);
    let command = cli.command.unwrap_or(Commands::Shell);
    let interactive = matches!(command, Commands::Shell);

    let storage = if interactive {
        LocalStorage::new(&root).with_consent(consent_prompt())
    } else {
        LocalStorage::new(&root)
    };
    let service = TreeService::new(storage, engine_config, notifier);

    if interactive {
        run_shell(&service, &mut rx, config.confirm_delete()).await
    } else {
        let result = run_once(&service, &mut rx, command, config.confirm_delete()).await;
        print_notifications(&mut rx);
        result
    }
}
