use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow, bail};
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use taskdeck_shared::{Credentials, TaskCreate, TaskPatch};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, instrument, warn};

use crate::api;
use crate::cache::{TASKS_TAG, TagLedger};
use crate::cli::{AddArgs, AuthArgs, Command, EditArgs, HrefAction, ListArgs};
use crate::client::ApiClient;
use crate::config::Config;
use crate::datetime::{format_instant, parse_date, parse_deadline, resolve_timezone};
use crate::gate::{GateDecision, SessionGate};
use crate::interaction::{SearchBox, StatusChoice, date_range_changed, status_changed};
use crate::query::{FilterState, href, remove_params, set_param, split_href, with_page};
use crate::render::Renderer;
use crate::routes::{self, Route};
use crate::session::FileSessionStore;

/// Everything a command needs, built once per invocation.
#[derive(Debug)]
pub struct App {
    pub cfg: Config,
    pub store: Arc<FileSessionStore>,
    pub ledger: Arc<TagLedger>,
    pub client: ApiClient,
    pub gate: SessionGate,
    pub tz: Tz,
    pub renderer: Renderer,
}

impl App {
    #[instrument(skip(cfg))]
    pub fn open(cfg: Config, data_dir: &Path) -> anyhow::Result<Self> {
        let cookie = cfg.session_cookie_name();
        let store = Arc::new(
            FileSessionStore::open(data_dir, &cookie)
                .with_context(|| format!("failed to open session store at {}", data_dir.display()))?,
        );
        let ledger = Arc::new(TagLedger::default());
        let client = ApiClient::from_config(&cfg, store.clone(), ledger.clone())?;
        let gate = SessionGate::new(&cookie)?;
        let tz = resolve_timezone(&cfg);
        let renderer = Renderer::new(&cfg, tz)?;

        debug!(base_url = client.base_url(), tz = %tz.name(), "application ready");
        Ok(Self {
            cfg,
            store,
            ledger,
            client,
            gate,
            tz,
            renderer,
        })
    }
}

#[instrument(skip(app, command))]
pub async fn dispatch(app: &mut App, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Signin(auth) => cmd_signin(app, auth, false).await,
        Command::Signup(auth) => cmd_signin(app, auth, true).await,
        Command::Signout => cmd_signout(app),
        Command::Open { href, json } => cmd_open(app, &href, json).await,
        Command::List(list) => cmd_list(app, list).await,
        Command::Show { id } => cmd_open(app, &routes::task(&id), false).await,
        Command::Add(add) => cmd_add(app, add).await,
        Command::Edit { id, changes } => cmd_edit(app, &id, changes).await,
        Command::Done { id } => cmd_done(app, &id).await,
        Command::Delete { id } => cmd_delete(app, &id).await,
        Command::Href { action } => cmd_href(action),
        Command::TypeSearch { href } => cmd_type_search(app, &href).await,
    }
}

#[instrument(skip(app, auth), fields(username = %auth.username))]
async fn cmd_signin(app: &mut App, auth: AuthArgs, register: bool) -> anyhow::Result<()> {
    let creds = Credentials {
        username: auth.username,
        password: auth.password,
    };

    let outcome = if register {
        info!("command signup");
        api::signup(&app.client, &creds).await
    } else {
        info!("command signin");
        api::signin(&app.client, &creds).await
    };
    let signed_in = outcome.into_result().context(if register {
        "sign up failed"
    } else {
        "sign in failed"
    })?;

    app.store.save(&signed_in.session)?;
    println!(
        "Signed in as {} until {}.",
        signed_in.user.username,
        signed_in.session.expires_at.with_timezone(&app.tz).format("%Y-%m-%d %H:%M %Z")
    );
    Ok(())
}

fn cmd_signout(app: &mut App) -> anyhow::Result<()> {
    info!("command signout");
    app.store.clear()?;
    println!("Signed out.");
    Ok(())
}

/// Gate first, then whatever the route renders.
#[instrument(skip(app))]
async fn cmd_open(app: &mut App, target: &str, json: bool) -> anyhow::Result<()> {
    let (path, query) = split_href(target);
    let cookie = app.store.cookie_header();

    if let GateDecision::RedirectTo(to) = app.gate.decide_request(path, cookie.as_deref()) {
        println!("redirect -> {to}");
        return Ok(());
    }

    let now = Utc::now();
    match Route::resolve(path) {
        Route::Dashboard => {
            let filter = FilterState::from_query(query, app.cfg.list_limit()?);
            let dashboard = api::load_dashboard(&app.client, &filter, &app.tz).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&dashboard)?);
            } else {
                app.renderer.print_dashboard(&dashboard, &filter, now)?;
            }
        }
        Route::Task(id) | Route::EditTask(id) => match api::find_task(&app.client, &id).await {
            Some(task) if json => println!("{}", serde_json::to_string_pretty(&task)?),
            Some(task) => app.renderer.print_task_info(&task, now)?,
            None => println!("Task not found."),
        },
        Route::Signin => println!("Sign in with: taskdeck signin --username <name> --password <password>"),
        Route::Signup => println!("Register with: taskdeck signup --username <name> --password <password>"),
        Route::NewTask => {
            println!("Create with: taskdeck add --title <title> --deadline <when> [--description <text>]")
        }
        Route::NotFound => bail!("no page at {path}"),
    }

    Ok(())
}

#[instrument(skip(app, list))]
async fn cmd_list(app: &mut App, list: ListArgs) -> anyhow::Result<()> {
    let mut filter = FilterState {
        limit: app.cfg.list_limit()?,
        ..FilterState::default()
    };
    filter.search = list.search.unwrap_or_default();
    filter.completed = match list.status {
        Some(StatusChoice::Todo) => Some(false),
        Some(StatusChoice::Completed) => Some(true),
        Some(StatusChoice::All) | None => None,
    };
    filter.from_date = list.from.as_deref().map(parse_day).transpose()?;
    filter.to_date = list.to.as_deref().map(parse_day).transpose()?;
    filter.page = list.page.unwrap_or(1).max(1);

    let target = href(routes::DASHBOARD, &filter.to_query());
    debug!(%target, "list resolved to dashboard href");
    cmd_open(app, &target, list.json).await
}

#[instrument(skip(app, add), fields(title = %add.title))]
async fn cmd_add(app: &mut App, add: AddArgs) -> anyhow::Result<()> {
    let deadline = parse_deadline(&add.deadline, &app.tz)?;
    let task = TaskCreate {
        title: add.title,
        description: add.description,
        deadline: format_instant(&deadline),
    };

    let created = api::create_task(&app.client, &task)
        .await
        .into_result()
        .context("failed to create task")?;
    report_revalidation(app);
    println!("Created task {} ({}).", created.id, routes::task(&created.id));
    Ok(())
}

#[instrument(skip(app, changes))]
async fn cmd_edit(app: &mut App, id: &str, changes: EditArgs) -> anyhow::Result<()> {
    let deadline = changes
        .deadline
        .as_deref()
        .map(|raw| parse_deadline(raw, &app.tz).map(|dt| format_instant(&dt)))
        .transpose()?;
    let patch = TaskPatch {
        title: changes.title,
        description: changes.description,
        deadline,
        completed: changes.completed,
    };
    if patch.is_empty() {
        bail!("nothing to change; pass --title, --description, --deadline or --completed");
    }

    let updated = api::update_task(&app.client, id, &patch)
        .await
        .into_result()
        .with_context(|| format!("failed to update task {id}"))?;
    report_revalidation(app);
    println!("Updated task {}.", updated.id);
    Ok(())
}

#[instrument(skip(app))]
async fn cmd_done(app: &mut App, id: &str) -> anyhow::Result<()> {
    api::mark_task_done(&app.client, id)
        .await
        .into_result()
        .with_context(|| format!("failed to complete task {id}"))?;
    report_revalidation(app);
    println!("Completed task {id}.");
    Ok(())
}

#[instrument(skip(app))]
async fn cmd_delete(app: &mut App, id: &str) -> anyhow::Result<()> {
    api::delete_task(&app.client, id)
        .await
        .into_result()
        .with_context(|| format!("failed to delete task {id}"))?;
    report_revalidation(app);
    println!("Deleted task {id}.");
    Ok(())
}

fn report_revalidation(app: &App) {
    debug!(
        generation = app.ledger.generation(TASKS_TAG),
        "task listings revalidated"
    );
}

fn cmd_href(action: HrefAction) -> anyhow::Result<()> {
    let next = match action {
        HrefAction::Set { href: current, key, value } => {
            let (_, query) = split_href(&current);
            href(routes::DASHBOARD, &set_param(query, &key, &value))
        }
        HrefAction::Remove { href: current, keys } => {
            let (_, query) = split_href(&current);
            let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
            href(routes::DASHBOARD, &remove_params(query, &keys))
        }
        HrefAction::Page { href: current, page } => {
            let (_, query) = split_href(&current);
            href(routes::DASHBOARD, &with_page(query, page))
        }
        HrefAction::Status { href: current, choice } => {
            let (_, query) = split_href(&current);
            status_changed(query, choice)
        }
        HrefAction::Dates { href: current, from, to } => {
            let (_, query) = split_href(&current);
            let from = from.as_deref().map(parse_day).transpose()?;
            let to = to.as_deref().map(parse_day).transpose()?;
            date_range_changed(query, from, to)
        }
    };

    println!("{next}");
    Ok(())
}

/// Each stdin line is the whole content of the search box after one
/// keystroke. Emitted hrefs are printed as the quiet window lapses.
#[instrument(skip(app))]
async fn cmd_type_search(app: &mut App, current: &str) -> anyhow::Result<()> {
    let (_, query) = split_href(current);
    let window = app.cfg.debounce_window()?;
    let (mut search, mut rx) = SearchBox::new(query, window);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => match line.context("failed reading stdin")? {
                Some(text) => search.input(text.trim_end_matches('\r')),
                None => break,
            },
            Some(next) = rx.recv() => println!("{next}"),
        }
    }

    while search.is_pending() {
        match tokio::time::timeout(window + Duration::from_secs(1), rx.recv()).await {
            Ok(Some(next)) => println!("{next}"),
            Ok(None) => break,
            Err(_) => {
                warn!("debounced search never fired");
                break;
            }
        }
    }
    while let Ok(next) = rx.try_recv() {
        println!("{next}");
    }

    Ok(())
}

fn parse_day(raw: &str) -> anyhow::Result<NaiveDate> {
    parse_date(raw).ok_or_else(|| anyhow!("invalid date {raw}; expected YYYY-MM-DD"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_arguments_must_be_dates() {
        assert_eq!(
            parse_day("2024-06-01").expect("date"),
            NaiveDate::from_ymd_opt(2024, 6, 1).expect("valid")
        );
        assert!(parse_day("tomorrow").is_err());
    }

    #[test]
    fn href_actions_accept_full_hrefs() {
        assert!(
            cmd_href(HrefAction::Dates {
                href: "/?page=3".to_string(),
                from: Some("nope".to_string()),
                to: None,
            })
            .is_err()
        );
        assert!(
            cmd_href(HrefAction::Page {
                href: "/?search=x".to_string(),
                page: 2,
            })
            .is_ok()
        );
    }
}
