use chrono::{Days, NaiveDate};
use circulation_core::db::{open_db, open_db_in_memory};
use circulation_core::{
    Book, CirculationConfig, CirculationError, CirculationRepository, CirculationService,
    FixedClock, NotificationKind, SqliteKvStore, StoreRepository, Trigger, User, UserRole,
    ValidationError, ViewerRole, ViewerSession,
};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::sleep;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 6, 1).unwrap()
}

fn clock() -> FixedClock {
    FixedClock::on(today())
}

fn seed_book<R: CirculationRepository>(repo: &R, copies: u32) -> Book {
    let book = Book::new("Quarto de Despejo", "Carolina Maria de Jesus", copies);
    repo.save_books(&[book.clone()]).unwrap();
    book
}

#[test]
fn desk_actions_are_announced_synchronously() {
    let conn = open_db_in_memory().unwrap();
    let repo = StoreRepository::new(SqliteKvStore::new(&conn));
    let config = CirculationConfig::default();
    let book = seed_book(&repo, 1);
    let patron = User::new("Bia", UserRole::Patron, "1234");

    let reader = ViewerSession::patron(repo, clock(), &config, patron.clone());
    let loan = reader.request_loan(book.id).unwrap();

    let mut desk = ViewerSession::librarian(repo, clock(), &config);
    assert_eq!(desk.role(), ViewerRole::Librarian);
    desk.approve(loan.id).unwrap();
    let log = desk.notifications().unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].kind, NotificationKind::InfoApproved);

    desk.mark_returned(loan.id).unwrap();
    assert_eq!(desk.notifications().unwrap()[0].kind, NotificationKind::InfoReturned);
    assert_eq!(desk.unread_count().unwrap(), 2);

    // The patron's own log is a separate audience.
    assert!(reader.notifications().unwrap().is_empty());
    assert_eq!(reader.loans().unwrap().len(), 1);
}

#[test]
fn session_for_user_follows_the_user_role() {
    let conn = open_db_in_memory().unwrap();
    let repo = StoreRepository::new(SqliteKvStore::new(&conn));
    let config = CirculationConfig::default();
    let librarian = User::new("Rachel", UserRole::Librarian, "1234");
    let staff = User::new("Otto", UserRole::Staff, "1234");

    let desk = ViewerSession::for_user(repo, clock(), &config, librarian);
    assert_eq!(desk.role(), ViewerRole::Librarian);
    assert!(desk.viewer().is_none());
    assert_eq!(desk.policy(), config.librarian);

    let reader = ViewerSession::for_user(repo, clock(), &config, staff.clone());
    assert_eq!(reader.role(), ViewerRole::Patron);
    assert_eq!(reader.viewer().map(|user| user.id), Some(staff.id));
    assert_eq!(reader.policy(), config.patron);
}

#[test]
fn rejected_action_announces_nothing() {
    let conn = open_db_in_memory().unwrap();
    let repo = StoreRepository::new(SqliteKvStore::new(&conn));
    let config = CirculationConfig::default();
    let book = seed_book(&repo, 1);
    let patron = User::new("Bia", UserRole::Patron, "1234");
    let loan = CirculationService::new(repo, clock())
        .request_loan(&patron, book.id)
        .unwrap();

    let mut desk = ViewerSession::librarian(repo, clock(), &config);
    assert!(matches!(
        desk.mark_returned(loan.id),
        Err(CirculationError::InvalidTransition { .. })
    ));
    assert!(desk.notifications().unwrap().is_empty());
}

#[test]
fn desk_session_cannot_request_without_a_borrower() {
    let conn = open_db_in_memory().unwrap();
    let repo = StoreRepository::new(SqliteKvStore::new(&conn));
    let book = seed_book(&repo, 1);
    let desk = ViewerSession::librarian(repo, clock(), &CirculationConfig::default());

    assert!(matches!(
        desk.request_loan(book.id),
        Err(CirculationError::Validation(ValidationError::MissingField("borrower")))
    ));
}

#[test]
fn reconcile_uses_the_role_window() {
    let conn = open_db_in_memory().unwrap();
    let repo = StoreRepository::new(SqliteKvStore::new(&conn));
    let config = CirculationConfig::default();
    let book = seed_book(&repo, 1);
    let patron = User::new("Bia", UserRole::Patron, "1234");
    let service = CirculationService::new(repo, clock());
    let loan = service.request_loan(&patron, book.id).unwrap();
    service.approve(loan.id).unwrap();
    service
        .set_due_date(loan.id, today().checked_add_days(Days::new(3)).unwrap())
        .unwrap();

    let mut desk = ViewerSession::librarian(repo, clock(), &config);
    let mut reader = ViewerSession::patron(repo, clock(), &config, patron);

    assert!(desk.reconcile(Trigger::Timer).unwrap().emitted.is_empty());
    let outcome = reader.reconcile(Trigger::Timer).unwrap();
    assert_eq!(outcome.emitted.len(), 1);
    assert_eq!(
        outcome.emitted[0].text,
        "Due soon (3 days): Quarto de Despejo"
    );
    assert_eq!(reader.unread_count().unwrap(), 1);
    assert_eq!(reader.mark_all_read().unwrap(), 1);
    assert_eq!(reader.clear_all().unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn run_polls_on_the_role_interval_without_duplicates() {
    let conn = open_db_in_memory().unwrap();
    let repo = StoreRepository::new(SqliteKvStore::new(&conn));
    let book = seed_book(&repo, 2);
    let patron = User::new("Bia", UserRole::Patron, "1234");
    CirculationService::new(repo, clock())
        .request_loan(&patron, book.id)
        .unwrap();

    let mut desk = ViewerSession::librarian(repo, clock(), &CirculationConfig::default());
    let scheduler = desk.scheduler();
    assert_eq!(scheduler.poll_interval(), Duration::from_secs(5));
    let cancel = scheduler.cancel_handle();

    let stop = async {
        sleep(Duration::from_secs(11)).await;
        cancel.cancel();
    };
    let (stats, ()) = tokio::join!(desk.run(&scheduler), stop);

    assert_eq!(stats.timer_passes, 3);
    assert_eq!(stats.change_passes, 0);
    let log = desk.notifications().unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].kind, NotificationKind::NewLoanRequest);
}

#[tokio::test(start_paused = true)]
async fn run_reacts_to_writes_from_another_process() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("circulation.sqlite3");
    let desk_conn = open_db(&path).unwrap();
    let patron_conn = open_db(&path).unwrap();
    let desk_repo = StoreRepository::new(SqliteKvStore::new(&desk_conn));
    let patron_repo = StoreRepository::new(SqliteKvStore::new(&patron_conn));
    let book = seed_book(&desk_repo, 1);
    let patron = User::new("Bia", UserRole::Patron, "1234");

    let mut desk = ViewerSession::librarian(desk_repo, clock(), &CirculationConfig::default());
    let scheduler = desk.scheduler();
    let cancel = scheduler.cancel_handle();

    let remote = async {
        sleep(Duration::from_millis(1_200)).await;
        CirculationService::new(patron_repo, clock())
            .request_loan(&patron, book.id)
            .unwrap();
        sleep(Duration::from_millis(1_000)).await;
        cancel.cancel();
    };
    let (stats, ()) = tokio::join!(desk.run(&scheduler), remote);

    // Startup pass, then one pass from the change check well before the
    // next 5s tick.
    assert_eq!(stats.timer_passes, 1);
    assert_eq!(stats.change_passes, 1);
    let log = desk.notifications().unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].kind, NotificationKind::NewLoanRequest);
}
