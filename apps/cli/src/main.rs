use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use client_core::{
    auth::read_claims, ApiClient, Autosave, ChecklistSession, ClientOptions, TextEdit,
};
use shared::{
    domain::{AnswerType, Character, CharacterId, Gender, ProjectId, SourceType, TextId},
    protocol::{CreateProjectRequest, ExportFormat, RegisterRequest, UpdateCharacterRequest},
};
use storage::Storage;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod render;

use config::{load_settings, Settings};

#[derive(Parser, Debug)]
#[command(name = "checklists", about = "Fill in character checklists from the terminal")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Overrides `api_url` from the config.
    #[arg(long, global = true)]
    api_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Register {
        email: String,
        username: String,
        #[arg(long)]
        password: String,
    },
    Login {
        email: String,
        #[arg(long)]
        password: String,
    },
    Logout,
    Whoami,
    ResetPassword {
        #[command(subcommand)]
        action: ResetAction,
    },
    Projects {
        #[command(subcommand)]
        action: ProjectAction,
    },
    /// Lists the texts uploaded to a project.
    Texts { project_id: i64 },
    Upload { project_id: i64, file: PathBuf },
    Characters { text_id: i64 },
    SetGender {
        character_id: i64,
        #[arg(value_enum)]
        gender: GenderArg,
    },
    Checklists,
    Progress {
        #[command(flatten)]
        target: SessionTarget,
    },
    /// Prints the current question; moves the saved cursor first when asked.
    Show {
        #[command(flatten)]
        target: SessionTarget,
        #[arg(long, conflicts_with_all = ["next", "prev"])]
        jump: Option<String>,
        #[arg(long, conflicts_with = "prev")]
        next: bool,
        #[arg(long)]
        prev: bool,
        /// List every question instead of the current one.
        #[arg(long)]
        outline: bool,
    },
    /// Option numbers for choice questions, free text otherwise. No values
    /// on a multiple-choice question clears it.
    Answer {
        #[command(flatten)]
        target: SessionTarget,
        external_id: String,
        values: Vec<String>,
        #[arg(long, default_value = "found_in_text")]
        source: String,
        #[arg(long)]
        comment: Option<String>,
    },
    Clear {
        #[command(flatten)]
        target: SessionTarget,
        external_id: String,
    },
    History {
        #[command(flatten)]
        target: SessionTarget,
        external_id: String,
    },
    /// Sends text drafts left behind by failed autosaves.
    SyncDrafts {
        #[command(flatten)]
        target: SessionTarget,
    },
    Analyze {
        character_id: i64,
        #[arg(long)]
        checklist: Option<String>,
    },
    Export {
        character_id: i64,
        #[arg(long, value_enum, default_value = "docx")]
        format: FormatArg,
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum ResetAction {
    Request { email: String },
    Confirm {
        token: String,
        #[arg(long)]
        new_password: String,
    },
}

#[derive(Subcommand, Debug)]
enum ProjectAction {
    List,
    Create {
        title: String,
        #[arg(long)]
        description: Option<String>,
    },
}

#[derive(Args, Debug)]
struct SessionTarget {
    slug: String,
    character_id: i64,
    /// Text the character belongs to.
    #[arg(long = "text")]
    text_id: i64,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum GenderArg {
    Male,
    Female,
    Unknown,
}

impl From<GenderArg> for Gender {
    fn from(value: GenderArg) -> Self {
        match value {
            GenderArg::Male => Gender::Male,
            GenderArg::Female => Gender::Female,
            GenderArg::Unknown => Gender::Unknown,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Docx,
    Pdf,
}

impl From<FormatArg> for ExportFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Docx => ExportFormat::Docx,
            FormatArg::Pdf => ExportFormat::Pdf,
        }
    }
}

impl Command {
    /// What the user tried to do, for the failure alert.
    fn action(&self) -> &'static str {
        match self {
            Command::Register { .. } => "зарегистрироваться",
            Command::Login { .. } => "войти",
            Command::Logout => "выйти",
            Command::Whoami => "загрузить профиль",
            Command::ResetPassword {
                action: ResetAction::Request { .. },
            } => "запросить сброс пароля",
            Command::ResetPassword {
                action: ResetAction::Confirm { .. },
            } => "сбросить пароль",
            Command::Projects {
                action: ProjectAction::List,
            } => "загрузить проекты",
            Command::Projects {
                action: ProjectAction::Create { .. },
            } => "создать проект",
            Command::Texts { .. } => "загрузить тексты",
            Command::Upload { .. } => "загрузить файл",
            Command::Characters { .. } => "загрузить персонажей",
            Command::SetGender { .. } => "обновить персонажа",
            Command::Checklists => "загрузить чек-листы",
            Command::Progress { .. } | Command::Show { .. } => "загрузить чек-лист",
            Command::Answer { .. } => "сохранить ответ",
            Command::Clear { .. } => "удалить ответ",
            Command::History { .. } => "загрузить историю ответов",
            Command::SyncDrafts { .. } => "отправить черновики",
            Command::Analyze { .. } => "выполнить анализ",
            Command::Export { .. } => "экспортировать персонажа",
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let mut settings = match load_settings(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("Не удалось прочитать настройки: {err:#}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(api_url) = &cli.api_url {
        settings.api_url = api_url.clone();
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let action = cli.command.action();
    match run(cli.command, settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("cli: command failed action={action} error={err:#}");
            eprintln!("Не удалось {action}: {err:#}");
            ExitCode::FAILURE
        }
    }
}

struct App {
    settings: Settings,
    store: Storage,
}

impl App {
    fn options(&self) -> ClientOptions {
        ClientOptions {
            request_timeout: self.settings.request_timeout(),
            stale_after: self.settings.stale_after(),
        }
    }

    fn anonymous(&self) -> Result<ApiClient> {
        Ok(ApiClient::new(&self.settings.api_url, self.options())?)
    }

    async fn signed_in(&self) -> Result<ApiClient> {
        let Some(session) = self.store.load_session().await? else {
            bail!("not signed in, run `checklists login` first");
        };
        if session.api_url != self.settings.api_url {
            warn!(
                "auth: stored session belongs to api_url={} but config points to {}",
                session.api_url, self.settings.api_url
            );
        }
        match read_claims(&session.access_token) {
            Ok(claims) if claims.is_expired_at(Utc::now()) => {
                warn!("auth: stored token expired user={}", claims.sub);
                eprintln!("Сессия истекла, войдите снова: checklists login {}", session.email);
            }
            Ok(_) => {}
            Err(err) => warn!("auth: could not read token claims error={err}"),
        }
        Ok(self.anonymous()?.with_token(session.access_token))
    }

    async fn character(&self, client: &ApiClient, target: &SessionTarget) -> Result<Character> {
        let character_id = CharacterId(target.character_id);
        client
            .list_characters(TextId(target.text_id))
            .await?
            .into_iter()
            .find(|character| character.id == character_id)
            .with_context(|| format!("character {character_id} is not part of text {}", target.text_id))
    }

    async fn session(&self, target: &SessionTarget) -> Result<ChecklistSession> {
        let client = self.signed_in().await?;
        let character = self.character(&client, target).await?;
        let session = ChecklistSession::load_with_store(
            Arc::new(client),
            self.store.clone(),
            &target.slug,
            character,
        )
        .await?;
        Ok(session)
    }
}

async fn run(command: Command, settings: Settings) -> Result<()> {
    let store = Storage::new(&settings.database_url).await?;
    let app = App { settings, store };

    match command {
        Command::Register {
            email,
            username,
            password,
        } => {
            let user = app
                .anonymous()?
                .register(&RegisterRequest {
                    email,
                    username,
                    password,
                })
                .await?;
            println!("registered user_id={} email={}", user.id, user.email);
        }
        Command::Login { email, password } => {
            let mut client = app.anonymous()?;
            let token = client.login(&email, &password).await?;
            app.store
                .save_session(&app.settings.api_url, &token.access_token, &email)
                .await?;
            info!("auth: signed in email={email}");
            println!("signed in as {email}");
        }
        Command::Logout => {
            if app.store.clear_session().await? {
                println!("signed out");
            } else {
                println!("no stored session");
            }
        }
        Command::Whoami => {
            let user = app.signed_in().await?.me().await?;
            println!("{} <{}> id={}", user.username, user.email, user.id);
        }
        Command::ResetPassword { action } => {
            let client = app.anonymous()?;
            match action {
                ResetAction::Request { email } => {
                    client.request_password_reset(&email).await?;
                    println!("reset instructions sent to {email}");
                }
                ResetAction::Confirm {
                    token,
                    new_password,
                } => {
                    client.confirm_password_reset(&token, &new_password).await?;
                    println!("password updated");
                }
            }
        }
        Command::Projects { action } => {
            let client = app.signed_in().await?;
            match action {
                ProjectAction::List => {
                    for project in client.list_projects().await? {
                        println!("{}\t{}", project.id, project.title);
                    }
                }
                ProjectAction::Create { title, description } => {
                    let project = client
                        .create_project(&CreateProjectRequest { title, description })
                        .await?;
                    println!("created project_id={}", project.id);
                }
            }
        }
        Command::Texts { project_id } => {
            let texts = app
                .signed_in()
                .await?
                .list_texts(ProjectId(project_id))
                .await?;
            for text in texts {
                println!("{}\t{}\t{:?}", text.id, text.filename, text.status);
            }
        }
        Command::Upload { project_id, file } => {
            let contents = fs::read(&file)
                .with_context(|| format!("failed to read '{}'", file.display()))?;
            let filename = file_name(&file)?;
            let text = app
                .signed_in()
                .await?
                .upload_text(ProjectId(project_id), &filename, contents)
                .await?;
            println!("uploaded text_id={} status={:?}", text.id, text.status);
        }
        Command::Characters { text_id } => {
            let characters = app
                .signed_in()
                .await?
                .list_characters(TextId(text_id))
                .await?;
            for character in characters {
                println!("{}\t{}\t{:?}", character.id, character.name, character.gender);
            }
        }
        Command::SetGender {
            character_id,
            gender,
        } => {
            let character = app
                .signed_in()
                .await?
                .update_character(
                    CharacterId(character_id),
                    &UpdateCharacterRequest {
                        gender: Some(gender.into()),
                        ..UpdateCharacterRequest::default()
                    },
                )
                .await?;
            println!("{} is now {:?}", character.name, character.gender);
        }
        Command::Checklists => {
            for summary in app.signed_in().await?.list_checklists().await? {
                println!(
                    "{}\t{}\t{} questions",
                    summary.slug, summary.title, summary.question_count
                );
            }
        }
        Command::Progress { target } => {
            let session = app.session(&target).await?;
            let progress = session.progress();
            println!("{}: {}", session.checklist().title, render::progress_line(&progress.overall));
            for section in &progress.sections {
                println!("  {}: {}", section.title, render::progress_line(&section.progress));
            }
        }
        Command::Show {
            target,
            jump,
            next,
            prev,
            outline,
        } => {
            let mut session = app.session(&target).await?;
            if let Some(external_id) = jump {
                session.jump_to(&external_id).await?;
            } else if next && session.next_question().await.is_none() {
                println!("already at the last question");
            } else if prev && session.previous_question().await.is_none() {
                println!("already at the first question");
            }
            if outline {
                println!("{}", render::outline(session.checklist(), session.navigator()));
            } else {
                print_current(&session);
            }
        }
        Command::Answer {
            target,
            external_id,
            values,
            source,
            comment,
        } => {
            let source_type = SourceType::parse(&source)
                .with_context(|| format!("unknown source type '{source}'"))?;
            let mut session = app.session(&target).await?;
            let question = session.jump_to(&external_id).await?.clone();
            match question.answer_type {
                AnswerType::Single => {
                    let [number] = values.as_slice() else {
                        bail!("a single-choice question takes exactly one option number");
                    };
                    let answer_id = render::pick_answers(&question, std::slice::from_ref(number))?[0];
                    session
                        .answer_single(question.id, answer_id, source_type, comment)
                        .await?;
                }
                AnswerType::Multiple => {
                    let answer_ids = render::pick_answers(&question, &values)?;
                    if session
                        .answer_multiple(question.id, answer_ids, source_type, comment)
                        .await?
                        .is_none()
                    {
                        println!("selection cleared");
                    }
                }
                AnswerType::Text => {
                    let session = save_text(&app, session, &question, values.join(" "), source_type, comment).await?;
                    print_current(&session);
                    return Ok(());
                }
            }
            print_current(&session);
        }
        Command::Clear {
            target,
            external_id,
        } => {
            let mut session = app.session(&target).await?;
            let question_id = session.jump_to(&external_id).await?.id;
            let cleared = session.delete_response(question_id).await?;
            println!("cleared version {} of {external_id}", cleared.version);
        }
        Command::History {
            target,
            external_id,
        } => {
            let mut session = app.session(&target).await?;
            let question_id = session.jump_to(&external_id).await?.id;
            let gender = session.character().gender;
            let question = session.question(question_id)?.clone();
            let history = session.load_history(question_id).await?;
            if history.is_empty() {
                println!("no earlier answers");
            }
            for response in history {
                println!(
                    "{}\t{}",
                    response.updated_at.format("%Y-%m-%d %H:%M"),
                    render::response_summary(&question, response, gender)
                );
            }
        }
        Command::SyncDrafts { target } => {
            let mut session = app.session(&target).await?;
            let character_id = session.character().id;
            let drafts = app.store.list_drafts(character_id).await?;
            let mut failed = 0;
            for draft in drafts {
                if session.checklist().question(draft.question_id).is_none() {
                    continue;
                }
                match session
                    .edit_text(draft.question_id, &draft.answer_text, draft.source_type, draft.comment.clone())
                    .await
                {
                    Ok(_) => {
                        app.store.remove_draft(draft.question_id, character_id).await?;
                        println!("sent draft for question {}", draft.question_id);
                    }
                    Err(err) => {
                        failed += 1;
                        warn!("cli: draft sync failed question={} error={err}", draft.question_id);
                    }
                }
            }
            if failed > 0 {
                bail!("{failed} draft(s) are still pending");
            }
        }
        Command::Analyze {
            character_id,
            checklist,
        } => {
            let analysis = app
                .signed_in()
                .await?
                .analyze_character(CharacterId(character_id), checklist.as_deref())
                .await?;
            println!("{}", analysis.content);
        }
        Command::Export {
            character_id,
            format,
            output,
        } => {
            let format = ExportFormat::from(format);
            let bytes = app
                .signed_in()
                .await?
                .export_character(CharacterId(character_id), format)
                .await?;
            let output = output.unwrap_or_else(|| {
                PathBuf::from(format!("character_{character_id}.{}", format.extension()))
            });
            fs::write(&output, &bytes)
                .with_context(|| format!("failed to write '{}'", output.display()))?;
            println!("exported {} bytes to {}", bytes.len(), output.display());
        }
    }

    Ok(())
}

/// Text answers go through the autosave task so the draft survives a
/// failed save.
async fn save_text(
    app: &App,
    session: ChecklistSession,
    question: &shared::checklist::Question,
    text: String,
    source_type: SourceType,
    comment: Option<String>,
) -> Result<ChecklistSession> {
    let character_id = session.character().id;
    let shared_session = Arc::new(Mutex::new(session));
    let autosave = Autosave::spawn(
        shared_session.clone(),
        Some(app.store.clone()),
        app.settings.autosave_debounce(),
    );
    autosave.edit(TextEdit {
        question_id: question.id,
        character_id,
        text,
        source_type,
        comment,
    })?;
    autosave.shutdown().await?;

    let pending = app
        .store
        .list_drafts(character_id)
        .await?
        .into_iter()
        .any(|draft| draft.question_id == question.id);

    let session = Arc::try_unwrap(shared_session)
        .map_err(|_| anyhow::anyhow!("autosave still holds the session"))?
        .into_inner();
    if pending {
        bail!(
            "the text was kept as a local draft, run `checklists sync-drafts {} {character_id} --text <id>` later",
            session.checklist().slug
        );
    }
    Ok(session)
}

fn print_current(session: &ChecklistSession) {
    match session.current_question() {
        Some(question) => println!(
            "{}",
            render::question_block(
                question,
                session.breadcrumb().as_ref(),
                session.navigator(),
                session.character().gender,
            )
        ),
        None => println!("this checklist has no questions"),
    }
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .with_context(|| format!("'{}' has no file name", path.display()))
}
