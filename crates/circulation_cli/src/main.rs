//! `circulation` operator CLI.
//!
//! # Responsibility
//! - Expose catalog, user, loan and notification operations of
//!   `circulation_core` against one store database file.
//! - Run a librarian or patron viewer in the foreground with `watch`.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use circulation_core::logging::{default_log_level, init_logging};
use circulation_core::service::notifications::AlertSink;
use circulation_core::{
    load_config, open_db, Availability, Book, CatalogFilter, CirculationConfig,
    CirculationService, Loan, NewBook, Notification, SqliteKvStore, StoreRepository,
    SystemClock, User, UserDirectory, UserRole, ViewerSession,
};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use rusqlite::Connection;
use std::path::PathBuf;
use std::process::ExitCode;
use uuid::Uuid;

type Repo<'conn> = StoreRepository<SqliteKvStore<'conn>>;
type Session<'conn> = ViewerSession<Repo<'conn>, SystemClock>;

#[derive(Parser)]
#[command(name = "circulation")]
#[command(about = "Library circulation desk", long_about = None)]
struct Cli {
    /// Store database shared by every viewer process
    #[arg(long, global = true, default_value = "circulation.sqlite3")]
    db: PathBuf,

    /// JSON config file; built-in defaults when absent
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Absolute directory for rolling log files; logging is off when absent
    #[arg(long, global = true)]
    log_dir: Option<String>,

    /// trace | debug | info | warn | error
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the core version
    Version,

    /// Catalog commands
    Books {
        #[command(subcommand)]
        cmd: BooksCmd,
    },

    /// User directory commands
    Users {
        #[command(subcommand)]
        cmd: UsersCmd,
    },

    /// Loan lifecycle commands
    Loans {
        #[command(subcommand)]
        cmd: LoansCmd,
    },

    /// Notification log of one viewer
    Notifications {
        #[command(subcommand)]
        cmd: NotificationsCmd,
    },

    /// Run a viewer in the foreground until Ctrl-C
    Watch {
        /// Defaults to the role of the watched user
        #[arg(long, value_enum)]
        role: Option<RoleArg>,

        /// User id; defaults to the signed-in user
        #[arg(long)]
        user: Option<Uuid>,
    },
}

#[derive(Subcommand)]
enum BooksCmd {
    Add {
        #[arg(long)]
        title: String,
        #[arg(long)]
        author: String,
        #[arg(long, default_value = "")]
        genre: String,
        #[arg(long, default_value = "")]
        cover: String,
        /// Defaults to 1
        #[arg(long)]
        copies: Option<u32>,
    },

    List {
        /// Substring of title or author
        #[arg(long, default_value = "")]
        search: String,
        #[arg(long, value_enum, default_value_t = AvailabilityArg::All)]
        availability: AvailabilityArg,
        #[arg(long, default_value = "")]
        genre: String,
        #[arg(long, default_value = "")]
        author: String,
    },

    Remove {
        #[arg(long)]
        book: Uuid,
    },
}

#[derive(Subcommand)]
enum UsersCmd {
    Add {
        #[arg(long)]
        name: String,
        #[arg(long, value_enum)]
        role: UserRoleArg,
        #[arg(long)]
        password: String,
    },

    List {
        /// Substring of the user name
        #[arg(long, default_value = "")]
        search: String,
        #[arg(long, value_enum)]
        role: Option<UserRoleArg>,
    },

    Passwd {
        #[arg(long)]
        user: Uuid,
        #[arg(long)]
        password: String,
    },

    Remove {
        #[arg(long)]
        user: Uuid,
    },

    /// Record the session user of this store
    SignIn {
        #[arg(long)]
        user: Uuid,
    },

    SignOut,
}

#[derive(Subcommand)]
enum LoansCmd {
    Request {
        #[arg(long)]
        user: Uuid,
        #[arg(long)]
        book: Uuid,
    },

    Approve {
        #[arg(long)]
        loan: Uuid,
    },

    Return {
        #[arg(long)]
        loan: Uuid,
    },

    /// Override a due date (YYYY-MM-DD)
    Due {
        #[arg(long)]
        loan: Uuid,
        #[arg(long)]
        date: NaiveDate,
    },

    List {
        /// Only loans of this borrower
        #[arg(long)]
        user: Option<Uuid>,
    },
}

#[derive(Subcommand)]
enum NotificationsCmd {
    List {
        #[arg(long, value_enum)]
        role: RoleArg,
        #[arg(long)]
        user: Option<Uuid>,
    },

    ReadAll {
        #[arg(long, value_enum)]
        role: RoleArg,
        #[arg(long)]
        user: Option<Uuid>,
    },

    Clear {
        #[arg(long, value_enum)]
        role: RoleArg,
        #[arg(long)]
        user: Option<Uuid>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum RoleArg {
    Librarian,
    Patron,
}

#[derive(Clone, Copy, ValueEnum)]
enum UserRoleArg {
    Patron,
    Staff,
    Librarian,
}

impl From<UserRoleArg> for UserRole {
    fn from(value: UserRoleArg) -> Self {
        match value {
            UserRoleArg::Patron => UserRole::Patron,
            UserRoleArg::Staff => UserRole::Staff,
            UserRoleArg::Librarian => UserRole::Librarian,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum AvailabilityArg {
    All,
    Available,
    Unavailable,
}

impl From<AvailabilityArg> for Availability {
    fn from(value: AvailabilityArg) -> Self {
        match value {
            AvailabilityArg::All => Availability::All,
            AvailabilityArg::Available => Availability::Available,
            AvailabilityArg::Unavailable => Availability::Unavailable,
        }
    }
}

/// Prints each new notification with a terminal bell.
struct TerminalAlertSink;

impl AlertSink for TerminalAlertSink {
    fn alert(&self, notification: &Notification) {
        println!("\x07{}", notification_line(notification));
    }
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    if let Some(log_dir) = cli.log_dir.as_deref() {
        let level = cli.log_level.as_deref().unwrap_or(default_log_level());
        init_logging(level, log_dir).map_err(anyhow::Error::msg)?;
    }

    if let Commands::Version = cli.cmd {
        println!("circulation_core version={}", circulation_core::core_version());
        return Ok(());
    }

    let config = match cli.config.as_deref() {
        Some(path) => load_config(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => CirculationConfig::default(),
    };
    let conn = open_db(&cli.db).with_context(|| format!("opening {}", cli.db.display()))?;

    match cli.cmd {
        Commands::Version => Ok(()),
        Commands::Books { cmd } => books(&conn, &config, cmd),
        Commands::Users { cmd } => users(&conn, &config, cmd),
        Commands::Loans { cmd } => loans(&conn, &config, cmd),
        Commands::Notifications { cmd } => notifications(&conn, &config, cmd),
        Commands::Watch { role, user } => watch(&conn, &config, role, user),
    }
}

fn repo(conn: &Connection) -> Repo<'_> {
    StoreRepository::new(SqliteKvStore::new(conn))
}

fn books(conn: &Connection, config: &CirculationConfig, cmd: BooksCmd) -> Result<()> {
    let service = CirculationService::new(repo(conn), SystemClock)
        .with_loan_period(config.loan_period_days);
    let ledger = service.ledger();
    match cmd {
        BooksCmd::Add {
            title,
            author,
            genre,
            cover,
            copies,
        } => {
            let book = ledger.add_book(NewBook {
                title,
                author,
                genre,
                cover,
                copies,
            })?;
            println!("{}", book_line(&book));
        }
        BooksCmd::List {
            search,
            availability,
            genre,
            author,
        } => {
            let filter = CatalogFilter {
                text: search,
                availability: availability.into(),
                genre,
                author,
            };
            for book in ledger.list_books(&filter)? {
                println!("{}", book_line(&book));
            }
        }
        BooksCmd::Remove { book } => {
            ledger.remove_book(book)?;
            println!("removed=true book_id={book}");
        }
    }
    Ok(())
}

fn users(conn: &Connection, config: &CirculationConfig, cmd: UsersCmd) -> Result<()> {
    let directory = UserDirectory::new(repo(conn)).with_min_password_len(config.min_password_len);
    match cmd {
        UsersCmd::Add {
            name,
            role,
            password,
        } => {
            let user = directory.add_user(&name, role.into(), &password)?;
            println!("{}", user_line(&user));
        }
        UsersCmd::List { search, role } => {
            for user in directory.search_users(&search, role.map(UserRole::from))? {
                println!("{}", user_line(&user));
            }
        }
        UsersCmd::Passwd { user, password } => {
            directory.change_password(user, &password)?;
            println!("password_changed=true user_id={user}");
        }
        UsersCmd::Remove { user } => {
            directory.remove_user(user)?;
            println!("removed=true user_id={user}");
        }
        UsersCmd::SignIn { user } => {
            let user = directory.sign_in(user)?;
            println!("signed_in=true {}", user_line(&user));
        }
        UsersCmd::SignOut => {
            directory.sign_out()?;
            println!("signed_out=true");
        }
    }
    Ok(())
}

fn loans(conn: &Connection, config: &CirculationConfig, cmd: LoansCmd) -> Result<()> {
    let directory = UserDirectory::new(repo(conn));
    match cmd {
        LoansCmd::Request { user, book } => {
            let borrower = directory.get_user(user)?;
            let session = patron_session(conn, config, borrower);
            let loan = session.request_loan(book)?;
            println!("{}", loan_line(&loan));
        }
        LoansCmd::Approve { loan } => {
            let mut desk = librarian_session(conn, config);
            let loan = desk.approve(loan)?;
            println!("{}", loan_line(&loan));
        }
        LoansCmd::Return { loan } => {
            let mut desk = librarian_session(conn, config);
            let loan = desk.mark_returned(loan)?;
            println!("{}", loan_line(&loan));
        }
        LoansCmd::Due { loan, date } => {
            let desk = librarian_session(conn, config);
            let loan = desk.set_due_date(loan, date)?;
            println!("{}", loan_line(&loan));
        }
        LoansCmd::List { user } => {
            let service = CirculationService::new(repo(conn), SystemClock);
            let loans = match user {
                Some(user_id) => service.loans_for(user_id)?,
                None => service.list_loans()?,
            };
            for loan in loans {
                println!("{}", loan_line(&loan));
            }
        }
    }
    Ok(())
}

fn notifications(
    conn: &Connection,
    config: &CirculationConfig,
    cmd: NotificationsCmd,
) -> Result<()> {
    match cmd {
        NotificationsCmd::List { role, user } => {
            let session = viewer_session(conn, config, role, user)?;
            for notification in session.notifications()? {
                println!("{}", notification_line(&notification));
            }
            println!("unread={}", session.unread_count()?);
        }
        NotificationsCmd::ReadAll { role, user } => {
            let session = viewer_session(conn, config, role, user)?;
            println!("marked_read={}", session.mark_all_read()?);
        }
        NotificationsCmd::Clear { role, user } => {
            let session = viewer_session(conn, config, role, user)?;
            println!("cleared={}", session.clear_all()?);
        }
    }
    Ok(())
}

fn watch(
    conn: &Connection,
    config: &CirculationConfig,
    role: Option<RoleArg>,
    user: Option<Uuid>,
) -> Result<()> {
    let session = match role {
        Some(role) => viewer_session(conn, config, role, user)?,
        None => {
            let viewer = resolve_user(conn, user)?;
            ViewerSession::for_user(repo(conn), SystemClock, config, viewer)
        }
    };
    let mut session = session.with_alert_sink(Box::new(TerminalAlertSink));
    let scheduler = session.scheduler();
    let cancel = scheduler.cancel_handle();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("starting runtime")?;
    let stats = runtime.block_on(async {
        let stop = async {
            if tokio::signal::ctrl_c().await.is_err() {
                eprintln!("error: cannot listen for Ctrl-C; stopping");
            }
            cancel.cancel();
        };
        let (stats, ()) = tokio::join!(session.run(&scheduler), stop);
        stats
    });

    info!(
        "event=watch_stop module=cli status=ok timer_passes={} change_passes={}",
        stats.timer_passes, stats.change_passes
    );
    println!(
        "stopped=true timer_passes={} change_passes={}",
        stats.timer_passes, stats.change_passes
    );
    Ok(())
}

fn librarian_session<'conn>(
    conn: &'conn Connection,
    config: &CirculationConfig,
) -> Session<'conn> {
    ViewerSession::librarian(repo(conn), SystemClock, config)
}

fn patron_session<'conn>(
    conn: &'conn Connection,
    config: &CirculationConfig,
    user: User,
) -> Session<'conn> {
    ViewerSession::patron(repo(conn), SystemClock, config, user)
}

fn viewer_session<'conn>(
    conn: &'conn Connection,
    config: &CirculationConfig,
    role: RoleArg,
    user: Option<Uuid>,
) -> Result<Session<'conn>> {
    match role {
        RoleArg::Librarian => Ok(librarian_session(conn, config)),
        RoleArg::Patron => Ok(patron_session(conn, config, resolve_user(conn, user)?)),
    }
}

/// `user` when given, otherwise the signed-in user of the store.
fn resolve_user(conn: &Connection, user: Option<Uuid>) -> Result<User> {
    let directory = UserDirectory::new(repo(conn));
    match user {
        Some(user_id) => Ok(directory.get_user(user_id)?),
        None => match directory.current_session()? {
            Some(user) => Ok(user),
            None => bail!("--user is required when nobody is signed in"),
        },
    }
}

fn book_line(book: &Book) -> String {
    format!(
        "book_id={} copies={} title={:?} author={:?} genre={:?}",
        book.id, book.available_copies, book.title, book.author, book.genre
    )
}

fn user_line(user: &User) -> String {
    format!(
        "user_id={} role={} name={:?}",
        user.id,
        user.role.as_str(),
        user.name
    )
}

fn loan_line(loan: &Loan) -> String {
    let due = loan
        .due_date
        .map_or_else(|| "-".to_string(), |date| date.to_string());
    format!(
        "loan_id={} status={} due={due} book={:?} borrower={:?}",
        loan.id, loan.status, loan.book.title, loan.borrower.name
    )
}

fn notification_line(notification: &Notification) -> String {
    let marker = if notification.read { " " } else { "*" };
    format!(
        "{marker} {} {} {}",
        notification.timestamp.format("%Y-%m-%d %H:%M"),
        notification.kind.as_str(),
        notification.text
    )
}

#[cfg(test)]
mod tests {
    use super::{Cli, Commands, LoansCmd, RoleArg};
    use clap::{CommandFactory, Parser};

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn due_date_parses_as_calendar_date() {
        let cli = Cli::try_parse_from([
            "circulation",
            "loans",
            "due",
            "--loan",
            "7f1d3a52-8a47-4a0e-9a57-3c1f1b7f4a10",
            "--date",
            "2026-06-08",
        ])
        .unwrap();
        let Commands::Loans {
            cmd: LoansCmd::Due { date, .. },
        } = cli.cmd
        else {
            panic!("expected loans due");
        };
        assert_eq!(date.to_string(), "2026-06-08");
    }

    #[test]
    fn watch_rejects_unknown_roles() {
        assert!(Cli::try_parse_from(["circulation", "watch", "--role", "janitor"]).is_err());
        let cli = Cli::try_parse_from([
            "circulation",
            "--db",
            "desk.sqlite3",
            "watch",
            "--role",
            "librarian",
        ])
        .unwrap();
        assert!(matches!(
            cli.cmd,
            Commands::Watch {
                role: Some(RoleArg::Librarian),
                user: None
            }
        ));
        assert_eq!(cli.db.to_str(), Some("desk.sqlite3"));
    }

    #[test]
    fn watch_role_defaults_to_the_watched_user() {
        let cli = Cli::try_parse_from([
            "circulation",
            "watch",
            "--user",
            "7f1d3a52-8a47-4a0e-9a57-3c1f1b7f4a10",
        ])
        .unwrap();
        assert!(matches!(
            cli.cmd,
            Commands::Watch {
                role: None,
                user: Some(_)
            }
        ));
    }
}
