use chrono::{Days, NaiveDate};
use circulation_core::db::open_db_in_memory;
use circulation_core::{
    Book, CirculationError, CirculationRepository, CirculationService, EntityRef, FixedClock,
    Loan, LoanStatus, NewBook, Notification, RepoError, RepoResult, SqliteKvStore, StoreKey,
    StoreRepository, User, UserRole,
};
use std::cell::Cell;
use std::rc::Rc;
use uuid::Uuid;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 6, 1).unwrap()
}

fn days_from_today(days: u64) -> NaiveDate {
    today().checked_add_days(Days::new(days)).unwrap()
}

fn add_book<R: CirculationRepository + Clone>(
    service: &CirculationService<R, FixedClock>,
    copies: u32,
) -> Book {
    service
        .ledger()
        .add_book(NewBook {
            title: "Grande Sertão: Veredas".to_string(),
            author: "João Guimarães Rosa".to_string(),
            copies: Some(copies),
            ..NewBook::default()
        })
        .unwrap()
}

fn patron() -> User {
    User::new("Lia", UserRole::Patron, "secret")
}

/// Repository whose book writes fail while `failing` is set.
#[derive(Clone)]
struct FlakyShelf<R> {
    inner: R,
    failing: Rc<Cell<bool>>,
}

impl<R: CirculationRepository> CirculationRepository for FlakyShelf<R> {
    fn load_books(&self) -> RepoResult<Vec<Book>> {
        self.inner.load_books()
    }

    fn save_books(&self, books: &[Book]) -> RepoResult<()> {
        if self.failing.get() {
            let source = serde_json::from_str::<u32>("shelf").unwrap_err();
            return Err(RepoError::Encode {
                key: StoreKey::Books,
                source,
            });
        }
        self.inner.save_books(books)
    }

    fn load_users(&self) -> RepoResult<Vec<User>> {
        self.inner.load_users()
    }

    fn save_users(&self, users: &[User]) -> RepoResult<()> {
        self.inner.save_users(users)
    }

    fn load_loans(&self) -> RepoResult<Vec<Loan>> {
        self.inner.load_loans()
    }

    fn save_loans(&self, loans: &[Loan]) -> RepoResult<()> {
        self.inner.save_loans(loans)
    }

    fn load_notifications(&self) -> RepoResult<Vec<Notification>> {
        self.inner.load_notifications()
    }

    fn save_notifications(&self, notifications: &[Notification]) -> RepoResult<()> {
        self.inner.save_notifications(notifications)
    }

    fn load_session(&self) -> RepoResult<Option<User>> {
        self.inner.load_session()
    }

    fn save_session(&self, user: Option<&User>) -> RepoResult<()> {
        self.inner.save_session(user)
    }

    fn external_version(&self) -> RepoResult<u64> {
        self.inner.external_version()
    }
}

#[test]
fn request_leaves_stock_until_approval() {
    let conn = open_db_in_memory().unwrap();
    let repo = StoreRepository::new(SqliteKvStore::new(&conn));
    let service = CirculationService::new(repo, FixedClock::on(today()));
    let book = add_book(&service, 1);

    let loan = service.request_loan(&patron(), book.id).unwrap();
    assert_eq!(loan.status, LoanStatus::Pending);
    assert_eq!(loan.created_on, Some(today()));
    assert_eq!(loan.due_date, None);
    assert_eq!(service.ledger().get_book(book.id).unwrap().available_copies, 1);

    let approved = service.approve(loan.id).unwrap();
    assert_eq!(approved.status, LoanStatus::Active);
    assert_eq!(approved.due_date, Some(days_from_today(7)));
    assert_eq!(service.ledger().get_book(book.id).unwrap().available_copies, 0);
    assert_eq!(service.get_loan(loan.id).unwrap(), approved);
}

#[test]
fn approving_against_empty_shelf_clamps_at_zero() {
    let conn = open_db_in_memory().unwrap();
    let repo = StoreRepository::new(SqliteKvStore::new(&conn));
    let service = CirculationService::new(repo, FixedClock::on(today()));
    let book = add_book(&service, 1);

    // Both requests pass the stock check before either is approved.
    let first = service.request_loan(&patron(), book.id).unwrap();
    let second = service.request_loan(&patron(), book.id).unwrap();
    service.approve(first.id).unwrap();

    let approved = service.approve(second.id).unwrap();
    assert_eq!(approved.status, LoanStatus::Active);
    assert_eq!(service.ledger().get_book(book.id).unwrap().available_copies, 0);
}

#[test]
fn returning_a_pending_loan_is_an_invalid_transition() {
    let conn = open_db_in_memory().unwrap();
    let repo = StoreRepository::new(SqliteKvStore::new(&conn));
    let service = CirculationService::new(repo, FixedClock::on(today()));
    let book = add_book(&service, 2);
    let loan = service.request_loan(&patron(), book.id).unwrap();

    let err = service.mark_returned(loan.id).unwrap_err();
    assert!(matches!(
        err,
        CirculationError::InvalidTransition {
            from: LoanStatus::Pending,
            to: LoanStatus::Returned,
            ..
        }
    ));
    assert_eq!(err.to_string(), "loan is pending; it cannot become returned");
    assert_eq!(service.get_loan(loan.id).unwrap().status, LoanStatus::Pending);
    assert_eq!(service.ledger().get_book(book.id).unwrap().available_copies, 2);
}

#[test]
fn transitions_never_move_backwards() {
    let conn = open_db_in_memory().unwrap();
    let repo = StoreRepository::new(SqliteKvStore::new(&conn));
    let service = CirculationService::new(repo, FixedClock::on(today()));
    let book = add_book(&service, 1);
    let loan = service.request_loan(&patron(), book.id).unwrap();

    service.approve(loan.id).unwrap();
    let err = service.approve(loan.id).unwrap_err();
    assert!(matches!(err, CirculationError::InvalidTransition { .. }));
    assert_eq!(err.to_string(), "loan is active; it cannot become active");

    let returned = service.mark_returned(loan.id).unwrap();
    assert_eq!(returned.status, LoanStatus::Returned);
    assert!(returned.returned);
    assert_eq!(service.ledger().get_book(book.id).unwrap().available_copies, 1);

    assert!(matches!(
        service.approve(loan.id),
        Err(CirculationError::InvalidTransition { .. })
    ));
    assert!(matches!(
        service.mark_returned(loan.id),
        Err(CirculationError::InvalidTransition { .. })
    ));
    // A rejected return must not over-credit the shelf.
    assert_eq!(service.ledger().get_book(book.id).unwrap().available_copies, 1);

    for loan in service.list_loans().unwrap() {
        assert_eq!(loan.returned, loan.status == LoanStatus::Returned);
    }
}

#[test]
fn returned_loans_are_locked_against_due_date_changes() {
    let conn = open_db_in_memory().unwrap();
    let repo = StoreRepository::new(SqliteKvStore::new(&conn));
    let service = CirculationService::new(repo, FixedClock::on(today()));
    let book = add_book(&service, 1);
    let loan = service.request_loan(&patron(), book.id).unwrap();
    service.approve(loan.id).unwrap();
    service.mark_returned(loan.id).unwrap();

    let err = service.set_due_date(loan.id, days_from_today(30)).unwrap_err();
    assert!(matches!(err, CirculationError::Locked(id) if id == loan.id));
    assert_eq!(service.get_loan(loan.id).unwrap().due_date, Some(days_from_today(7)));
}

#[test]
fn preset_due_date_survives_approval() {
    let conn = open_db_in_memory().unwrap();
    let repo = StoreRepository::new(SqliteKvStore::new(&conn));
    let service = CirculationService::new(repo, FixedClock::on(today()));
    let book = add_book(&service, 1);
    let loan = service.request_loan(&patron(), book.id).unwrap();

    let past = today().pred_opt().unwrap();
    service.set_due_date(loan.id, past).unwrap();
    let approved = service.approve(loan.id).unwrap();
    assert_eq!(approved.due_date, Some(past));
}

#[test]
fn loan_period_is_configurable() {
    let conn = open_db_in_memory().unwrap();
    let repo = StoreRepository::new(SqliteKvStore::new(&conn));
    let service = CirculationService::new(repo, FixedClock::on(today())).with_loan_period(14);
    let book = add_book(&service, 1);
    let loan = service.request_loan(&patron(), book.id).unwrap();

    let approved = service.approve(loan.id).unwrap();
    assert_eq!(approved.due_date, Some(days_from_today(14)));
}

#[test]
fn request_against_empty_shelf_is_unavailable() {
    let conn = open_db_in_memory().unwrap();
    let repo = StoreRepository::new(SqliteKvStore::new(&conn));
    let service = CirculationService::new(repo, FixedClock::on(today()));
    let book = add_book(&service, 0);

    let err = service.request_loan(&patron(), book.id).unwrap_err();
    assert!(matches!(err, CirculationError::Unavailable(id) if id == book.id));
    assert!(service.list_loans().unwrap().is_empty());
}

#[test]
fn unknown_ids_are_not_found() {
    let conn = open_db_in_memory().unwrap();
    let repo = StoreRepository::new(SqliteKvStore::new(&conn));
    let service = CirculationService::new(repo, FixedClock::on(today()));
    let missing = Uuid::new_v4();

    assert!(matches!(
        service.approve(missing),
        Err(CirculationError::NotFound(EntityRef::Loan(id))) if id == missing
    ));
    assert!(matches!(
        service.set_due_date(missing, today()),
        Err(CirculationError::NotFound(EntityRef::Loan(_)))
    ));
    assert!(matches!(
        service.request_loan(&patron(), missing),
        Err(CirculationError::NotFound(EntityRef::Book(_)))
    ));
}

#[test]
fn approval_still_succeeds_when_book_was_removed() {
    let conn = open_db_in_memory().unwrap();
    let repo = StoreRepository::new(SqliteKvStore::new(&conn));
    let service = CirculationService::new(repo, FixedClock::on(today()));
    let book = add_book(&service, 1);
    let loan = service.request_loan(&patron(), book.id).unwrap();
    service.ledger().remove_book(book.id).unwrap();

    let approved = service.approve(loan.id).unwrap();
    assert_eq!(approved.status, LoanStatus::Active);
    assert_eq!(approved.book.title, "Grande Sertão: Veredas");
}

#[test]
fn failed_stock_write_keeps_the_transition() {
    let conn = open_db_in_memory().unwrap();
    let failing = Rc::new(Cell::new(false));
    let repo = FlakyShelf {
        inner: StoreRepository::new(SqliteKvStore::new(&conn)),
        failing: Rc::clone(&failing),
    };
    let service = CirculationService::new(repo, FixedClock::on(today()));
    let book = add_book(&service, 2);
    let loan = service.request_loan(&patron(), book.id).unwrap();

    failing.set(true);
    let approved = service.approve(loan.id).unwrap();
    assert_eq!(approved.status, LoanStatus::Active);
    assert_eq!(service.get_loan(loan.id).unwrap().status, LoanStatus::Active);
    assert_eq!(service.ledger().get_book(book.id).unwrap().available_copies, 2);

    let returned = service.mark_returned(loan.id).unwrap();
    assert_eq!(returned.status, LoanStatus::Returned);
    assert_eq!(service.ledger().get_book(book.id).unwrap().available_copies, 2);
}

#[test]
fn stock_never_goes_negative() {
    let conn = open_db_in_memory().unwrap();
    let repo = StoreRepository::new(SqliteKvStore::new(&conn));
    let service = CirculationService::new(repo, FixedClock::on(today()));
    let book = add_book(&service, 1);

    for _ in 0..3 {
        service.ledger().decrement(book.id).unwrap();
    }
    assert_eq!(service.ledger().get_book(book.id).unwrap().available_copies, 0);

    // Increments are unbounded and restore from the clamped value.
    service.ledger().increment(book.id).unwrap();
    service.ledger().increment(book.id).unwrap();
    assert_eq!(service.ledger().get_book(book.id).unwrap().available_copies, 2);
}

#[test]
fn loans_for_filters_by_borrower() {
    let conn = open_db_in_memory().unwrap();
    let repo = StoreRepository::new(SqliteKvStore::new(&conn));
    let service = CirculationService::new(repo, FixedClock::on(today()));
    let book = add_book(&service, 3);
    let lia = patron();
    let rui = User::new("Rui", UserRole::Staff, "secret");

    service.request_loan(&lia, book.id).unwrap();
    service.request_loan(&rui, book.id).unwrap();
    service.request_loan(&lia, book.id).unwrap();

    assert_eq!(service.loans_for(lia.id).unwrap().len(), 2);
    assert_eq!(service.loans_for(rui.id).unwrap().len(), 1);
    assert_eq!(service.list_loans().unwrap().len(), 3);
}
