use std::sync::Arc;

use turtle_client::{
    ApiClient, ClientError, Dashboard, FileStorage, IngestionController, RecordingNavigator,
    RouteGuard, SaveOutcome, SessionStore, UploadBatch,
    forms::{InvestorForm, PasswordChange},
    guard::normalize_path,
    navigation::{ADMIN_PATH, HOME_PATH, LOGIN_PATH, Navigator},
};

use crate::{
    CashCommand, Command, InvestorArgs, InvestorCommand, UploadArgs,
    config::AppConfig,
    error::{AppError, Result},
    prompt, render,
};

/// One CLI invocation behaves like a single browsing context.
struct Console {
    api: ApiClient,
    navigator: Arc<RecordingNavigator>,
    guard: RouteGuard,
    history_limit: u32,
}

impl Console {
    fn open(settings: &AppConfig) -> Result<Self> {
        let session = SessionStore::open(Arc::new(FileStorage::new(&settings.session_file)))?;
        let navigator = Arc::new(RecordingNavigator::new(HOME_PATH));
        let api = ApiClient::builder()
            .base_url(&settings.base_url)
            .timeout(settings.timeout())
            .navigator(navigator.clone())
            .build(session.clone())?;
        let guard = RouteGuard::new(session, navigator.clone());
        Ok(Self {
            api,
            navigator,
            guard,
            history_limit: settings.history_limit,
        })
    }

    /// Visits `path` and fails if the guard sends us to the login page.
    fn enter(&self, path: &str) -> Result<()> {
        self.guard.visit(path);
        if normalize_path(&self.navigator.current_path()) == LOGIN_PATH {
            return Err(AppError::NotLoggedIn);
        }
        Ok(())
    }

    async fn enter_admin(&self) -> Result<()> {
        self.enter(ADMIN_PATH)?;
        if !self.api.me().await?.is_admin {
            return Err(AppError::NotAdmin);
        }
        Ok(())
    }
}

pub async fn run(settings: &AppConfig, command: Command) -> Result<()> {
    let console = Console::open(settings)?;

    match command {
        Command::Login { identifier } => {
            let password = prompt::password("Password: ")?;
            let login = console.api.login(&identifier, &password).await?;
            let role = if login.investor.is_admin {
                "admin"
            } else {
                "investor"
            };
            println!("Logged in as {} ({role}).", login.investor.name);
        }
        Command::Logout => {
            console.api.logout().await?;
            println!("Logged out.");
        }
        Command::Whoami => {
            console.enter(HOME_PATH)?;
            render::investor(&console.api.me().await?);
        }
        Command::ChangePassword => {
            console.enter(HOME_PATH)?;
            let form = PasswordChange {
                old_password: prompt::password("Current password: ")?,
                new_password: prompt::password("New password: ")?,
                confirm_password: prompt::password("Confirm new password: ")?,
            };
            console.api.change_password(&form).await?;
            println!("Password changed.");
        }
        Command::Nav => {
            console.enter(HOME_PATH)?;
            match console.api.fund_nav().await? {
                Some(summary) => render::summary(&summary),
                None => println!("No NAV recorded yet."),
            }
        }
        Command::History { limit } => {
            console.enter(HOME_PATH)?;
            let rows = console
                .api
                .fund_history(limit.unwrap_or(console.history_limit))
                .await?;
            render::history(&rows);
        }
        Command::Holdings { date } => {
            console.enter(HOME_PATH)?;
            match date {
                Some(date) => {
                    let rows = console.api.holdings_by_date(date).await?;
                    let total = rows.iter().map(|h| h.market_value).sum();
                    render::holdings(date, total, &rows);
                }
                None => match console.api.holdings_today().await? {
                    Some(snapshot) => {
                        render::holdings(snapshot.date, snapshot.total_value, &snapshot.holdings)
                    }
                    None => println!("No holdings recorded yet."),
                },
            }
        }
        Command::Cash(cash) => {
            console.enter(HOME_PATH)?;
            cash_command(&console, cash.command).await?;
        }
        Command::Investors(investors) => {
            console.enter_admin().await?;
            investor_command(&console, investors.command).await?;
        }
        Command::Upload(args) => {
            console.enter_admin().await?;
            upload(&console, args).await?;
        }
        Command::RefreshBroker => {
            console.enter_admin().await?;
            let summary = console.api.refresh_from_broker().await?;
            println!("Holdings refreshed from broker.");
            render::summary(&summary);
        }
        Command::Recalculate { date } => {
            console.enter_admin().await?;
            render::summary(&console.api.recalculate_nav(date).await?);
        }
        Command::Route { path } => {
            let redirected = console.guard.visit(&path);
            let landed = console.navigator.current_path();
            if redirected {
                println!("{path} -> {landed}");
            } else {
                println!("{path} (no redirect)");
            }
        }
    }

    Ok(())
}

async fn cash_command(console: &Console, command: CashCommand) -> Result<()> {
    let mut dashboard = Dashboard::new(console.api.clone(), console.history_limit);
    let report = dashboard.load().await;
    if let Some((_, err)) = report.failures.iter().find(|(section, _)| *section == "cash") {
        return Err(AppError::Terminal(err.user_message()));
    }

    match command {
        CashCommand::Show => {
            println!("Cash: {:.2}", dashboard.cash().value().committed());
        }
        CashCommand::Set { amount } => {
            if !dashboard.is_admin() {
                return Err(AppError::NotAdmin);
            }
            dashboard.cash_editor_mut().input(amount);
            match dashboard.save_cash().await? {
                SaveOutcome::Unchanged => println!("Cash unchanged."),
                SaveOutcome::Saved => {
                    println!("Cash: {:.2}", dashboard.cash().value().committed());
                    if let Some(summary) = dashboard.summary() {
                        render::summary(summary);
                    }
                }
            }
        }
    }
    Ok(())
}

async fn investor_command(console: &Console, command: InvestorCommand) -> Result<()> {
    match command {
        InvestorCommand::List => {
            let investors = console.api.investors().await?;
            let nav = console.api.fund_nav().await?.map(|s| s.nav);
            render::investors(&investors, nav);
        }
        InvestorCommand::Create(args) => {
            let mut form = investor_form(args);
            form.password = Some(new_password()?);
            let created = console.api.create_investor(&form).await?;
            println!("Created investor #{}.", created.id);
            render::investor(&created);
        }
        InvestorCommand::Update { id, fields } => {
            let updated = console
                .api
                .update_investor(id, &investor_form(fields))
                .await?;
            render::investor(&updated);
        }
        InvestorCommand::Delete { id, yes } => {
            if !yes && !prompt::confirm(&format!("Delete investor #{id}?"))? {
                println!("Nothing deleted.");
                return Ok(());
            }
            console.api.delete_investor(id).await?;
            println!("Deleted investor #{id}.");
        }
    }
    Ok(())
}

fn investor_form(args: InvestorArgs) -> InvestorForm {
    InvestorForm {
        name: args.name,
        identifier: args.identifier,
        initial_investment: args.initial_investment,
        shares: args.shares,
        is_admin: args.admin,
        password: None,
    }
}

fn new_password() -> Result<String> {
    for _ in 0..3 {
        let first = prompt::password("Password: ")?;
        if first.is_empty() {
            eprintln!("Password must not be empty.");
            continue;
        }
        if first == prompt::password("Confirm password: ")? {
            return Ok(first);
        }
        eprintln!("Passwords do not match. Try again.");
    }
    Err(AppError::Terminal("too many attempts".to_string()))
}

async fn upload(console: &Console, args: UploadArgs) -> Result<()> {
    let batch = UploadBatch::from_paths(&args.files, args.date)?;
    let mut ingestion = IngestionController::new(console.api.clone());

    let preview = ingestion.start_preview(&batch).await?;
    render::preview(preview);

    loop {
        let Some(pending) = ingestion.pending() else {
            return Err(ClientError::State("no preview pending").into());
        };
        if !args.yes
            && !prompt::confirm("Save these holdings? Existing holdings for that day are replaced.")?
        {
            pending.discard();
            println!("Preview discarded. Nothing was saved.");
            return Ok(());
        }
        match pending.confirm().await {
            Ok(summary) => {
                println!("Holdings saved.");
                render::summary(&summary);
                return Ok(());
            }
            Err(err) if err.is_retryable() && !args.yes => {
                eprintln!("{}", err.user_message());
            }
            Err(err) => return Err(err.into()),
        }
    }
}
