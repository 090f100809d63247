//! Catalog management service: books and categories

use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        audit::{AuditAction, AuditEntry, ClientInfo},
        book::{Book, BookDetail, BookQuery, BookSummary, CreateBook, UpdateBook},
        category::{Category, CreateCategory},
        user::SessionClaims,
    },
    repository::Repository,
    services::{audit::AuditService, uploads, uploads::UploadService},
    validation,
};

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
    audit: AuditService,
    uploads: UploadService,
    per_page: i64,
}

impl CatalogService {
    pub fn new(repository: Repository, audit: AuditService, uploads: UploadService, per_page: i64) -> Self {
        Self {
            repository,
            audit,
            uploads,
            per_page,
        }
    }

    pub fn per_page(&self) -> i64 {
        self.per_page
    }

    /// Search books with filters
    pub async fn search_books(&self, query: &BookQuery) -> AppResult<(Vec<BookSummary>, i64)> {
        self.repository.books.search(query, self.per_page).await
    }

    /// Book detail; member flags are filled for signed-in callers
    pub async fn get_book(&self, id: i64, viewer: Option<&SessionClaims>) -> AppResult<BookDetail> {
        let book = self.repository.books.get_by_id(id).await?;
        let category_name = self.repository.books.category_name(&book).await?;

        let (has_borrowed, has_reserved) = match viewer {
            Some(claims) => (
                Some(self.repository.borrows.has_open(claims.user_id, id).await?),
                Some(self.repository.reservations.has_active(claims.user_id, id).await?),
            ),
            None => (None, None),
        };

        Ok(BookDetail {
            is_available: book.is_available(),
            book,
            category_name,
            has_borrowed,
            has_reserved,
        })
    }

    pub async fn create_book(&self, claims: &SessionClaims, book: CreateBook, client: &ClientInfo) -> AppResult<Book> {
        book.validate()?;

        if self.repository.books.isbn_exists(&book.isbn, None).await? {
            return Err(AppError::Conflict("A book with this ISBN already exists.".to_string()));
        }
        self.check_category(book.category_id).await?;

        let created = self.repository.books.create(&book).await?;

        self.audit
            .record(
                AuditEntry::new(Some(claims.user_id), AuditAction::Create, client)
                    .object("Book", created.id, created.repr())
                    .details(format!("Added book: {}", created.title)),
            )
            .await?;

        Ok(created)
    }

    pub async fn update_book(
        &self,
        claims: &SessionClaims,
        id: i64,
        update: UpdateBook,
        client: &ClientInfo,
    ) -> AppResult<Book> {
        update.validate()?;

        if let Some(ref isbn) = update.isbn {
            if self.repository.books.isbn_exists(isbn, Some(id)).await? {
                return Err(AppError::Conflict("A book with this ISBN already exists.".to_string()));
            }
        }
        self.check_category(update.category_id).await?;

        let saved = self.repository.books.update(id, &update).await?;

        self.audit
            .record(
                AuditEntry::new(Some(claims.user_id), AuditAction::Update, client)
                    .object("Book", saved.id, saved.repr())
                    .details(format!("Updated book: {}", saved.title)),
            )
            .await?;

        Ok(saved)
    }

    /// Delete a book that is not on loan
    pub async fn delete_book(&self, claims: &SessionClaims, id: i64, client: &ClientInfo) -> AppResult<()> {
        let book = self.repository.books.get_by_id(id).await?;

        if self.repository.books.open_borrows(id).await? > 0 {
            return Err(AppError::Conflict(
                "Cannot delete a book that is currently borrowed.".to_string(),
            ));
        }

        self.repository.books.delete(id).await?;
        if let Some(ref cover) = book.cover_image {
            self.uploads.remove(cover).await;
        }

        self.audit
            .record(
                AuditEntry::new(Some(claims.user_id), AuditAction::Delete, client)
                    .object("Book", book.id, book.repr())
                    .details(format!("Deleted book: {}", book.title)),
            )
            .await?;

        Ok(())
    }

    /// Replace a book's cover image
    pub async fn set_cover(
        &self,
        claims: &SessionClaims,
        id: i64,
        file_name: &str,
        data: &[u8],
        client: &ClientInfo,
    ) -> AppResult<Book> {
        // 404 before anything is written
        self.repository.books.get_by_id(id).await?;

        let stored = self.uploads.store_image(uploads::BOOK_COVERS, file_name, data).await?;

        let previous = match self.repository.books.set_cover(id, &stored).await {
            Ok(previous) => previous,
            Err(e) => {
                self.uploads.remove(&stored).await;
                return Err(e);
            }
        };
        if let Some(previous) = previous {
            self.uploads.remove(&previous).await;
        }

        let book = self.repository.books.get_by_id(id).await?;
        self.audit
            .record(
                AuditEntry::new(Some(claims.user_id), AuditAction::Update, client)
                    .object("Book", book.id, book.repr())
                    .details("Cover image updated"),
            )
            .await?;

        Ok(book)
    }

    pub async fn list_categories(&self) -> AppResult<Vec<Category>> {
        self.repository.categories.list().await
    }

    pub async fn create_category(
        &self,
        claims: &SessionClaims,
        category: CreateCategory,
        client: &ClientInfo,
    ) -> AppResult<Category> {
        category.validate()?;

        let name = category.name.trim();
        let slug = validation::slugify(name);
        if slug.is_empty() {
            return Err(AppError::Validation(
                "Category name must contain letters or digits.".to_string(),
            ));
        }
        if self.repository.categories.exists(name, &slug).await? {
            return Err(AppError::Conflict("A category with this name already exists.".to_string()));
        }

        let created = self
            .repository
            .categories
            .create(name, &slug, category.description.as_deref().unwrap_or_default())
            .await?;

        self.audit
            .record(
                AuditEntry::new(Some(claims.user_id), AuditAction::Create, client)
                    .object("Category", created.id, created.name.clone())
                    .details(format!("Added category: {}", created.name)),
            )
            .await?;

        Ok(created)
    }

    async fn check_category(&self, category_id: Option<i64>) -> AppResult<()> {
        if let Some(id) = category_id {
            if !self.repository.categories.id_exists(id).await? {
                return Err(AppError::Validation(format!("Category {} does not exist.", id)));
            }
        }
        Ok(())
    }
}
