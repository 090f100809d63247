//! Books repository for database operations

use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::book::{Book, BookQuery, BookStatus, BookSummary, CreateBook, UpdateBook},
};

use super::{like_pattern, page_offset};

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get book by ID
    pub async fn get_by_id(&self, id: i64) -> AppResult<Book> {
        sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Name of the book's category, if any
    pub async fn category_name(&self, book: &Book) -> AppResult<Option<String>> {
        let Some(category_id) = book.category_id else {
            return Ok(None);
        };
        let name = sqlx::query_scalar::<_, String>("SELECT name FROM categories WHERE id = $1")
            .bind(category_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(name)
    }

    /// Search books with pagination, newest first
    pub async fn search(&self, query: &BookQuery, per_page: i64) -> AppResult<(Vec<BookSummary>, i64)> {
        let offset = page_offset(query.page, per_page)?;

        let mut conditions = Vec::new();
        let mut params: Vec<String> = Vec::new();

        if let Some(ref search) = query.search {
            let search = search.trim();
            if !search.is_empty() {
                params.push(like_pattern(search));
                let n = params.len();
                conditions.push(format!(
                    "(LOWER(b.title) LIKE ${n} ESCAPE '\\' OR LOWER(b.author) LIKE ${n} ESCAPE '\\' \
                     OR LOWER(b.isbn) LIKE ${n} ESCAPE '\\')"
                ));
            }
        }

        if let Some(ref slug) = query.category {
            if !slug.is_empty() {
                params.push(slug.clone());
                conditions.push(format!("c.slug = ${}", params.len()));
            }
        }

        if query.available == Some(true) {
            conditions.push("b.available_copies > 0".to_string());
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_query = format!(
            "SELECT COUNT(*) FROM books b LEFT JOIN categories c ON b.category_id = c.id {}",
            where_clause
        );
        let mut count_builder = sqlx::query_scalar::<_, i64>(&count_query);
        for param in &params {
            count_builder = count_builder.bind(param);
        }
        let total = count_builder.fetch_one(&self.pool).await?;

        let select_query = format!(
            r#"
            SELECT b.id, b.title, b.author, b.isbn,
                   c.name AS category_name, c.slug AS category_slug,
                   b.total_copies, b.available_copies, b.status,
                   b.cover_image, b.location, b.created_at
            FROM books b
            LEFT JOIN categories c ON b.category_id = c.id
            {}
            ORDER BY b.created_at DESC, b.id DESC
            LIMIT {} OFFSET {}
            "#,
            where_clause, per_page, offset
        );

        let mut select_builder = sqlx::query_as::<_, BookSummary>(&select_query);
        for param in &params {
            select_builder = select_builder.bind(param);
        }
        let books = select_builder.fetch_all(&self.pool).await?;

        Ok((books, total))
    }

    /// Check if an ISBN is already catalogued
    pub async fn isbn_exists(&self, isbn: &str, exclude_id: Option<i64>) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM books WHERE isbn = $1 AND ($2::BIGINT IS NULL OR id != $2))",
        )
        .bind(isbn)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Create a new book with every copy on the shelf
    pub async fn create(&self, book: &CreateBook) -> AppResult<Book> {
        let copies = book.total_copies.unwrap_or(1);

        let created = sqlx::query_as::<_, Book>(
            r#"
            INSERT INTO books (
                title, author, isbn, publisher, publication_year, category_id, pages,
                language, total_copies, available_copies, status, description, location
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(book.title.trim())
        .bind(book.author.trim())
        .bind(&book.isbn)
        .bind(book.publisher.as_deref().unwrap_or_default())
        .bind(book.publication_year)
        .bind(book.category_id)
        .bind(book.pages)
        .bind(book.language.as_deref().unwrap_or("English"))
        .bind(copies)
        .bind(BookStatus::Available)
        .bind(book.description.as_deref().unwrap_or_default())
        .bind(book.location.as_deref().unwrap_or_default())
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    /// Apply an update to the locked row so concurrent borrows and returns
    /// cannot be overwritten
    pub async fn update(&self, id: i64, update: &UpdateBook) -> AppResult<Book> {
        let mut tx = self.pool.begin().await?;

        let mut book = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))?;

        update.apply_to(&mut book)?;

        let saved = sqlx::query_as::<_, Book>(
            r#"
            UPDATE books SET
                title = $2, author = $3, isbn = $4, publisher = $5, publication_year = $6,
                category_id = $7, pages = $8, language = $9, total_copies = $10,
                available_copies = $11, status = $12, description = $13, location = $14,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(book.id)
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.isbn)
        .bind(&book.publisher)
        .bind(book.publication_year)
        .bind(book.category_id)
        .bind(book.pages)
        .bind(&book.language)
        .bind(book.total_copies)
        .bind(book.available_copies)
        .bind(book.status)
        .bind(&book.description)
        .bind(&book.location)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(saved)
    }

    /// Store a new cover path, returning the previous one
    pub async fn set_cover(&self, id: i64, path: &str) -> AppResult<Option<String>> {
        let previous = self.get_by_id(id).await?.cover_image;

        sqlx::query("UPDATE books SET cover_image = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(path)
            .execute(&self.pool)
            .await?;

        Ok(previous)
    }

    /// Number of ACTIVE or OVERDUE borrow records for the book
    pub async fn open_borrows(&self, id: i64) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM borrow_records WHERE book_id = $1 AND status IN ('ACTIVE', 'OVERDUE')",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Delete a book
    pub async fn delete(&self, id: i64) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Book with id {} not found", id)));
        }

        Ok(())
    }
}
