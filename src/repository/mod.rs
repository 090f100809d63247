//! Repository layer for database operations

pub mod audit_logs;
pub mod books;
pub mod borrows;
pub mod categories;
pub mod fines;
pub mod reservations;
pub mod users;

use sqlx::{Pool, Postgres};

use crate::error::{AppError, AppResult};

/// Main repository struct holding database connection pool
#[derive(Clone)]
pub struct Repository {
    pub pool: Pool<Postgres>,
    pub users: users::UsersRepository,
    pub books: books::BooksRepository,
    pub categories: categories::CategoriesRepository,
    pub borrows: borrows::BorrowsRepository,
    pub reservations: reservations::ReservationsRepository,
    pub fines: fines::FinesRepository,
    pub audit_logs: audit_logs::AuditLogsRepository,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            users: users::UsersRepository::new(pool.clone()),
            books: books::BooksRepository::new(pool.clone()),
            categories: categories::CategoriesRepository::new(pool.clone()),
            borrows: borrows::BorrowsRepository::new(pool.clone()),
            reservations: reservations::ReservationsRepository::new(pool.clone()),
            fines: fines::FinesRepository::new(pool.clone()),
            audit_logs: audit_logs::AuditLogsRepository::new(pool.clone()),
            pool,
        }
    }
}

/// Row offset of a 1-based page. Pages whose offset does not fit in `i64` are rejected.
pub fn page_offset(page: Option<i64>, per_page: i64) -> AppResult<i64> {
    let page = page.unwrap_or(1).max(1);
    (page - 1)
        .checked_mul(per_page)
        .ok_or_else(|| AppError::BadRequest("Invalid page number.".to_string()))
}

/// Lowercased `LIKE` pattern matching `term` as a literal substring.
/// Pair with `ESCAPE '\'` in the query.
pub fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.to_lowercase().chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_start_at_page_one() {
        assert_eq!(page_offset(None, 12).unwrap(), 0);
        assert_eq!(page_offset(Some(0), 12).unwrap(), 0);
        assert_eq!(page_offset(Some(3), 12).unwrap(), 24);
    }

    #[test]
    fn huge_page_is_a_bad_request() {
        let err = page_offset(Some(i64::MAX), 12).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn wildcards_are_escaped() {
        assert_eq!(like_pattern("Dune"), "%dune%");
        assert_eq!(like_pattern("100%_off"), "%100\\%\\_off%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }
}
