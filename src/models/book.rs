//! Book (catalog item) model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{error::AppError, validation};

text_enum! {
    /// Shelf status of a book
    pub enum BookStatus {
        Available => "AVAILABLE",
        Borrowed => "BORROWED",
        Reserved => "RESERVED",
        Maintenance => "MAINTENANCE",
    }
}

/// Book model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub publisher: String,
    pub publication_year: Option<i32>,
    pub category_id: Option<i64>,
    pub pages: Option<i32>,
    pub language: String,
    pub total_copies: i32,
    pub available_copies: i32,
    pub status: BookStatus,
    pub description: String,
    pub cover_image: Option<String>,
    pub location: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Book {
    pub fn is_available(&self) -> bool {
        self.available_copies > 0
    }

    /// Take one copy off the shelf. Returns false when none is left.
    pub fn borrow(&mut self) -> bool {
        if self.available_copies > 0 {
            self.available_copies -= 1;
            if self.available_copies == 0 {
                self.status = BookStatus::Borrowed;
            }
            true
        } else {
            false
        }
    }

    /// Put one copy back. Returns false when every copy is already on the shelf.
    pub fn return_copy(&mut self) -> bool {
        if self.available_copies < self.total_copies {
            self.available_copies += 1;
            if self.status != BookStatus::Maintenance {
                self.status = BookStatus::Available;
            }
            true
        } else {
            false
        }
    }

    /// Copies a given member may take, given holds for other members
    pub fn lendable_copies(&self, held_for_others: i64) -> i64 {
        if self.status == BookStatus::Maintenance {
            return 0;
        }
        (i64::from(self.available_copies) - held_for_others).max(0)
    }

    pub fn repr(&self) -> String {
        format!("{} by {}", self.title, self.author)
    }
}

/// Book with its category name, for listings
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BookSummary {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub category_name: Option<String>,
    pub category_slug: Option<String>,
    pub total_copies: i32,
    pub available_copies: i32,
    pub status: BookStatus,
    pub cover_image: Option<String>,
    pub location: String,
    pub created_at: DateTime<Utc>,
}

/// Book detail view; membership flags are present for signed-in callers
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BookDetail {
    #[serde(flatten)]
    pub book: Book,
    pub category_name: Option<String>,
    pub is_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_borrowed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_reserved: Option<bool>,
}

/// Book query parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct BookQuery {
    /// Case-insensitive match on title, author or ISBN
    pub search: Option<String>,
    /// Category slug
    pub category: Option<String>,
    /// Only books with at least one copy on the shelf
    pub available: Option<bool>,
    pub page: Option<i64>,
}

/// Create book request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateBook {
    #[validate(length(min = 1, max = 255, message = "Title is required (max 255 characters)."))]
    pub title: String,
    #[validate(length(min = 1, max = 255, message = "Author is required (max 255 characters)."))]
    pub author: String,
    #[validate(custom(function = "validation::validate_isbn"))]
    pub isbn: String,
    #[validate(length(max = 255))]
    pub publisher: Option<String>,
    #[validate(range(min = 1000, max = 2100, message = "Publication year must be between 1000 and 2100."))]
    pub publication_year: Option<i32>,
    pub category_id: Option<i64>,
    #[validate(range(min = 0, message = "Pages cannot be negative."))]
    pub pages: Option<i32>,
    #[validate(length(min = 1, max = 50))]
    pub language: Option<String>,
    #[validate(range(min = 1, message = "A book needs at least one copy."))]
    pub total_copies: Option<i32>,
    pub description: Option<String>,
    #[validate(length(max = 50, message = "Location must be at most 50 characters."))]
    pub location: Option<String>,
}

/// Update book request; absent fields are left unchanged
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateBook {
    #[validate(length(min = 1, max = 255))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub author: Option<String>,
    #[validate(custom(function = "validation::validate_isbn"))]
    pub isbn: Option<String>,
    #[validate(length(max = 255))]
    pub publisher: Option<String>,
    #[validate(range(min = 1000, max = 2100, message = "Publication year must be between 1000 and 2100."))]
    pub publication_year: Option<i32>,
    pub category_id: Option<i64>,
    #[validate(range(min = 0))]
    pub pages: Option<i32>,
    #[validate(length(min = 1, max = 50))]
    pub language: Option<String>,
    #[validate(range(min = 1, message = "A book needs at least one copy."))]
    pub total_copies: Option<i32>,
    #[validate(range(min = 0))]
    pub available_copies: Option<i32>,
    pub status: Option<BookStatus>,
    pub description: Option<String>,
    #[validate(length(max = 50))]
    pub location: Option<String>,
}

impl UpdateBook {
    /// Apply the present fields onto an existing record.
    ///
    /// Copies on loan stay on loan: the stock may not shrink below them and
    /// the shelf count may not exceed the stock.
    pub fn apply_to(&self, book: &mut Book) -> Result<(), AppError> {
        if let Some(ref v) = self.title {
            book.title = v.clone();
        }
        if let Some(ref v) = self.author {
            book.author = v.clone();
        }
        if let Some(ref v) = self.isbn {
            book.isbn = v.clone();
        }
        if let Some(ref v) = self.publisher {
            book.publisher = v.clone();
        }
        if self.publication_year.is_some() {
            book.publication_year = self.publication_year;
        }
        if self.category_id.is_some() {
            book.category_id = self.category_id;
        }
        if self.pages.is_some() {
            book.pages = self.pages;
        }
        if let Some(ref v) = self.language {
            book.language = v.clone();
        }
        if let Some(total) = self.total_copies {
            let lent = book.total_copies - book.available_copies;
            if total < lent {
                return Err(AppError::Validation(format!(
                    "Total copies cannot be less than the {} copies currently on loan.",
                    lent
                )));
            }
            book.total_copies = total;
            book.available_copies = total - lent;
        }
        if let Some(available) = self.available_copies {
            book.available_copies = available;
        }
        if book.available_copies > book.total_copies {
            return Err(AppError::Validation(
                "Available copies cannot exceed total copies.".to_string(),
            ));
        }
        if let Some(status) = self.status {
            book.status = status;
        } else if book.status != BookStatus::Maintenance {
            book.status = if book.available_copies > 0 {
                BookStatus::Available
            } else {
                BookStatus::Borrowed
            };
        }
        if let Some(ref v) = self.description {
            book.description = v.clone();
        }
        if let Some(ref v) = self.location {
            book.location = v.clone();
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn sample_book(total: i32, available: i32) -> Book {
    let now = Utc::now();
    Book {
        id: 1,
        title: "The Rust Programming Language".to_string(),
        author: "Steve Klabnik".to_string(),
        isbn: "9781718503106".to_string(),
        publisher: String::new(),
        publication_year: Some(2023),
        category_id: None,
        pages: Some(560),
        language: "English".to_string(),
        total_copies: total,
        available_copies: available,
        status: if available > 0 { BookStatus::Available } else { BookStatus::Borrowed },
        description: String::new(),
        cover_image: None,
        location: "A-12".to_string(),
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn borrow_until_empty() {
        let mut book = sample_book(2, 2);
        assert!(book.borrow());
        assert_eq!(book.status, BookStatus::Available);
        assert!(book.borrow());
        assert_eq!(book.available_copies, 0);
        assert_eq!(book.status, BookStatus::Borrowed);
        assert!(!book.borrow());
        assert_eq!(book.available_copies, 0);
    }

    #[test]
    fn return_never_exceeds_total() {
        let mut book = sample_book(1, 0);
        assert!(book.return_copy());
        assert_eq!(book.available_copies, 1);
        assert_eq!(book.status, BookStatus::Available);
        assert!(!book.return_copy());
        assert_eq!(book.available_copies, 1);
    }

    #[test]
    fn holds_reduce_lendable_copies() {
        let book = sample_book(3, 2);
        assert_eq!(book.lendable_copies(0), 2);
        assert_eq!(book.lendable_copies(2), 0);
        assert_eq!(book.lendable_copies(5), 0);

        let mut repair = sample_book(3, 3);
        repair.status = BookStatus::Maintenance;
        assert_eq!(repair.lendable_copies(0), 0);
    }

    #[test]
    fn changing_stock_keeps_lent_copies() {
        let mut book = sample_book(3, 1);
        let update = UpdateBook {
            total_copies: Some(5),
            ..Default::default()
        };
        update.apply_to(&mut book).unwrap();
        assert_eq!(book.total_copies, 5);
        assert_eq!(book.available_copies, 3);
        assert_eq!(book.status, BookStatus::Available);
    }

    #[test]
    fn stock_cannot_drop_below_lent_copies() {
        // 3 copies, 2 on loan
        let mut book = sample_book(3, 1);
        let update = UpdateBook {
            total_copies: Some(1),
            ..Default::default()
        };
        let err = update.apply_to(&mut book).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(book.total_copies, 3);
        assert_eq!(book.available_copies, 1);

        let exact = UpdateBook {
            total_copies: Some(2),
            ..Default::default()
        };
        exact.apply_to(&mut book).unwrap();
        assert_eq!(book.available_copies, 0);
        assert_eq!(book.status, BookStatus::Borrowed);
    }

    #[test]
    fn shelf_count_cannot_exceed_stock() {
        let mut book = sample_book(2, 2);
        let update = UpdateBook {
            available_copies: Some(3),
            ..Default::default()
        };
        assert!(update.apply_to(&mut book).is_err());
    }
}
