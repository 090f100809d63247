//! OpenAPI documentation

use axum::Router;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{auth, books, categories, circulation, fines, health, users};
use crate::models;

/// Registers the bearer token and session cookie schemes
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi
            .components
            .get_or_insert_with(utoipa::openapi::Components::default);

        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
        components.add_security_scheme(
            "session_cookie",
            SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::with_description(
                "libris_session",
                "Session cookie set by POST /api/v1/auth/login. Unsafe methods also need X-CSRF-Token.",
            ))),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "Libris API",
        version = "1.0.0",
        description = "Library Management System REST API",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        auth::register,
        auth::login,
        auth::logout,
        auth::profile,
        auth::update_profile,
        auth::upload_profile_picture,
        auth::audit_log,
        // Users
        users::list_users,
        users::change_role,
        users::set_active,
        // Books
        books::list_books,
        books::get_book,
        books::create_book,
        books::update_book,
        books::delete_book,
        books::upload_cover,
        categories::list_categories,
        categories::create_category,
        // Circulation
        circulation::borrow_book,
        circulation::return_book,
        circulation::my_books,
        circulation::reserve_book,
        circulation::cancel_reservation,
        // Fines
        fines::list_fines,
        fines::pay_fine,
        fines::waive_fine,
    ),
    components(
        schemas(
            // Auth
            auth::LoginResponse,
            auth::ProfilePictureForm,
            models::user::RegisterUser,
            models::user::LoginRequest,
            models::user::UpdateProfile,
            models::audit::AuditLog,
            models::audit::AuditAction,
            // Users
            models::user::User,
            models::user::UserSummary,
            models::user::Role,
            models::user::UpdateRole,
            models::user::UpdateActive,
            // Books
            books::CoverImageForm,
            models::book::Book,
            models::book::BookSummary,
            models::book::BookDetail,
            models::book::BookStatus,
            models::book::CreateBook,
            models::book::UpdateBook,
            models::category::Category,
            models::category::CreateCategory,
            // Circulation
            models::borrow::BorrowRecord,
            models::borrow::BorrowStatus,
            models::borrow::BorrowDetails,
            models::borrow::BorrowReceipt,
            models::borrow::ReturnReceipt,
            models::borrow::MyBooks,
            models::reservation::Reservation,
            models::reservation::ReservationStatus,
            models::reservation::ReservationDetails,
            models::reservation::ReservationReceipt,
            // Fines
            models::fine::Fine,
            models::fine::FineStatus,
            models::fine::PayFine,
            models::fine::WaiveFine,
            // Health
            health::HealthResponse,
            health::ReadinessResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Registration, sessions and profile"),
        (name = "users", description = "User administration"),
        (name = "books", description = "Catalog management"),
        (name = "circulation", description = "Borrowing, returns and reservations"),
        (name = "fines", description = "Overdue fines")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_circulation_paths() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/books/{id}/borrow"));
        assert!(doc.paths.paths.contains_key("/borrows/{id}/return"));
        assert!(doc.paths.paths.contains_key("/auth/audit-log"));
    }

    #[test]
    fn security_schemes_are_registered() {
        let doc = ApiDoc::openapi();
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
        assert!(components.security_schemes.contains_key("session_cookie"));
    }

    #[test]
    fn uploads_document_their_multipart_form() {
        let doc = serde_json::to_value(ApiDoc::openapi()).unwrap();
        let schema_of = |path: &str| {
            doc.pointer(&format!(
                "/paths/{}/post/requestBody/content/multipart~1form-data/schema/$ref",
                path.replace('/', "~1")
            ))
            .cloned()
        };

        assert_eq!(
            schema_of("/auth/profile/picture"),
            Some(serde_json::json!("#/components/schemas/ProfilePictureForm"))
        );
        assert_eq!(
            schema_of("/books/{id}/cover"),
            Some(serde_json::json!("#/components/schemas/CoverImageForm"))
        );
        assert_eq!(
            doc.pointer("/components/schemas/CoverImageForm/properties/cover_image/format"),
            Some(&serde_json::json!("binary"))
        );
    }
}
