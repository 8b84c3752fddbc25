use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::interaction::StatusChoice;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "taskdeck",
    version,
    about = "Taskdeck: terminal client for a task-tracking API",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "rcfile", global = true)]
    pub rcfile: Option<PathBuf>,

    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Sign in and keep the session cookie.
    Signin(AuthArgs),
    /// Create an account, then sign in with it.
    Signup(AuthArgs),
    /// Forget the stored session.
    Signout,
    /// Navigate to a page, e.g. `/?search=report&page=2` or `/task/<id>`.
    Open {
        #[arg(default_value = "/")]
        href: String,
        #[arg(long)]
        json: bool,
    },
    /// Dashboard listing with filters given as flags.
    List(ListArgs),
    Show {
        id: String,
    },
    Add(AddArgs),
    Edit {
        id: String,
        #[command(flatten)]
        changes: EditArgs,
    },
    Done {
        id: String,
    },
    Delete {
        id: String,
    },
    /// Compute the next href a dashboard control would navigate to.
    Href {
        #[command(subcommand)]
        action: HrefAction,
    },
    /// Feed stdin lines to the search box as successive input values.
    TypeSearch {
        #[arg(default_value = "/")]
        href: String,
    },
}

#[derive(Args, Debug, Clone)]
pub struct AuthArgs {
    #[arg(short = 'u', long)]
    pub username: String,
    #[arg(short = 'p', long)]
    pub password: String,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    #[arg(long)]
    pub search: Option<String>,
    #[arg(
        long,
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<StatusChoice>())
    )]
    pub status: Option<StatusChoice>,
    /// First day of the deadline range (YYYY-MM-DD).
    #[arg(long)]
    pub from: Option<String>,
    /// Last day of the deadline range, inclusive.
    #[arg(long)]
    pub to: Option<String>,
    #[arg(long)]
    pub page: Option<u32>,
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    #[arg(long)]
    pub title: String,
    #[arg(long, default_value = "")]
    pub description: String,
    /// RFC 3339, `YYYY-MM-DD HH:MM` or `YYYY-MM-DD`, read in the configured zone.
    #[arg(long)]
    pub deadline: String,
}

#[derive(Args, Debug, Clone, Default)]
pub struct EditArgs {
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub deadline: Option<String>,
    #[arg(long)]
    pub completed: Option<bool>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum HrefAction {
    Set {
        href: String,
        key: String,
        value: String,
    },
    Remove {
        href: String,
        #[arg(required = true)]
        keys: Vec<String>,
    },
    Page {
        href: String,
        page: u32,
    },
    Status {
        href: String,
        #[arg(value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<StatusChoice>()))]
        choice: StatusChoice,
    },
    Dates {
        href: String,
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
    },
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls bare `rc.key=value` / `rc.key:value` words out of the argument list
/// before clap sees them.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = rest
                .split_once('=')
                .or_else(|| rest.split_once(':'))
                .map(|(k, v)| (format!("rc.{k}"), v.to_string()));

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(words: &[&str]) -> Vec<OsString> {
        words.iter().map(OsString::from).collect()
    }

    #[test]
    fn positional_rc_words_become_overrides() {
        let pre = preprocess_args(&args(&[
            "taskdeck",
            "rc.api.base_url=http://10.0.0.2:9000",
            "list",
            "rc.color:off",
        ]))
        .expect("preprocess");
        assert_eq!(pre.cleaned_args, args(&["taskdeck", "list"]));
        assert_eq!(
            pre.rc_overrides,
            vec![
                (
                    "rc.api.base_url".to_string(),
                    "http://10.0.0.2:9000".to_string()
                ),
                ("rc.color".to_string(), "off".to_string()),
            ]
        );
    }

    #[test]
    fn list_flags_parse() {
        let cli = GlobalCli::parse_from(args(&[
            "taskdeck",
            "--rc",
            "list.limit=5",
            "list",
            "--search",
            "report",
            "--status",
            "todo",
            "--to",
            "2024-06-01",
        ]));
        assert_eq!(cli.rc_overrides[0].key, "list.limit");
        match cli.command {
            Command::List(list) => {
                assert_eq!(list.search.as_deref(), Some("report"));
                assert_eq!(list.status, Some(StatusChoice::Todo));
                assert_eq!(list.to.as_deref(), Some("2024-06-01"));
                assert_eq!(list.page, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn keyval_requires_equals() {
        assert!("color".parse::<KeyVal>().is_err());
        let kv: KeyVal = " color = off ".parse().expect("keyval");
        assert_eq!((kv.key.as_str(), kv.value.as_str()), ("color", "off"));
    }
}
