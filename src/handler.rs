//! Text commands for the interactive shell and their dispatch onto the
//! tree service.

use std::io::Write;

use crate::edit::RenameEditor;
use crate::engine::{ConnectOutcome, DeleteOutcome, TreeService};
use crate::error::Result;
use crate::fs::storage::{EntryKind, StorageProvider};
use crate::fs::tree::Node;
use crate::view::render_text;

pub const HELP: &str = "\
commands:
  connect                 open the configured directory
  disconnect              return to the in-memory workspace
  ls [-a]                 show the tree (-a: expand every folder)
  open <path>             expand or collapse a folder
  mkdir [parent] [name]   create a folder (default name, then rename)
  touch [parent] [name]   create a file from the template
  rm <path>               delete a file or folder
  mv <path> <name>        rename in place
  refresh                 reload from storage
  help                    show this text
  quit                    leave the shell";

/// A parsed shell command. Paths are relative to the current root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Connect,
    Disconnect,
    List { expand_all: bool },
    Open { path: String },
    Create { kind: EntryKind, parent: String, name: Option<String> },
    Remove { path: String, yes: bool },
    Rename { path: String, name: String },
    Refresh,
    Help,
    Quit,
}

/// What the shell loop should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Parse one input line. Blank lines are `Ok(None)`; bad input is a usage
/// message.
pub fn parse_command(line: &str) -> std::result::Result<Option<Command>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let command = match (verb, args.as_slice()) {
        ("connect", []) => Command::Connect,
        ("disconnect", []) => Command::Disconnect,
        ("ls", []) => Command::List { expand_all: false },
        ("ls", ["-a"]) => Command::List { expand_all: true },
        ("open", [path]) => Command::Open {
            path: path.to_string(),
        },
        ("mkdir" | "touch", rest) if rest.len() <= 2 => Command::Create {
            kind: if verb == "mkdir" {
                EntryKind::Folder
            } else {
                EntryKind::File
            },
            parent: rest.first().map(|s| s.to_string()).unwrap_or_default(),
            name: rest.get(1).map(|s| s.to_string()),
        },
        ("rm", [path]) => Command::Remove {
            path: path.to_string(),
            yes: false,
        },
        ("rm", ["-y", path]) | ("rm", [path, "-y"]) => Command::Remove {
            path: path.to_string(),
            yes: true,
        },
        ("mv", [path, name]) => Command::Rename {
            path: path.to_string(),
            name: name.to_string(),
        },
        ("refresh", []) => Command::Refresh,
        ("help" | "?", _) => Command::Help,
        ("quit" | "exit" | "q", []) => Command::Quit,
        (verb, _) => return Err(format!("unknown or malformed command: {} (try help)", verb)),
    };
    Ok(Some(command))
}

/// Run `command`. Engine failures are returned after the service has
/// already notified them; `out` receives listings and results.
pub async fn handle_command<P, C>(
    service: &TreeService<P>,
    editor: &mut RenameEditor,
    command: Command,
    confirm: C,
    out: &mut dyn Write,
) -> Result<Flow>
where
    P: StorageProvider,
    C: FnOnce(&Node) -> bool,
{
    match command {
        Command::Connect => {
            if let ConnectOutcome::Connected(name) = service.connect().await? {
                writeln!(out, "connected to {}", name)?;
            }
        }
        Command::Disconnect => {
            editor.cancel(service).await?;
            service.disconnect().await?;
        }
        Command::List { expand_all } => {
            let snapshot = service.snapshot();
            let title = snapshot
                .connected
                .clone()
                .unwrap_or_else(|| format!("{} (virtual)", snapshot.root_id));
            writeln!(out, "{}", title)?;
            write!(out, "{}", render_text(&snapshot.flatten(expand_all)))?;
        }
        Command::Open { path } => {
            let id = service.resolve_path(&path);
            let expanded = service.toggle_expand(&id).await?;
            writeln!(out, "{} {}", if expanded { "expanded" } else { "collapsed" }, id)?;
        }
        Command::Create { kind, parent, name } => {
            let parent_id = if parent.is_empty() {
                String::new()
            } else {
                service.resolve_path(&parent)
            };
            let id = match kind {
                EntryKind::Folder => service.create_folder(&parent_id).await?,
                EntryKind::File => service.create_file(&parent_id).await?,
            };
            editor.begin(service, &id).await?;
            let id = match name {
                Some(name) => {
                    editor.buffer.set(&name);
                    editor.commit(service).await?.unwrap_or(id)
                }
                None => id,
            };
            writeln!(out, "created {}", id)?;
        }
        Command::Remove { path, yes } => {
            let id = service.resolve_path(&path);
            let outcome = if yes {
                service.delete_entry(&id, |_| true).await?
            } else {
                service.delete_entry(&id, confirm).await?
            };
            match outcome {
                DeleteOutcome::Deleted => writeln!(out, "deleted {}", id)?,
                DeleteOutcome::Declined => writeln!(out, "kept {}", id)?,
            }
        }
        Command::Rename { path, name } => {
            let id = service.resolve_path(&path);
            if editor.target() != Some(id.as_str()) {
                editor.begin(service, &id).await?;
            }
            editor.buffer.set(&name);
            if let Some(new_id) = editor.commit(service).await? {
                writeln!(out, "renamed to {}", new_id)?;
            }
        }
        Command::Refresh => service.refresh().await?,
        Command::Help => writeln!(out, "{}", HELP)?,
        Command::Quit => return Ok(Flow::Quit),
    }
    Ok(Flow::Continue)
}
