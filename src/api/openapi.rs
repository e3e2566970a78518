//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{equipment, health, loans, stats, users};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Lendit API",
        version = "0.3.0",
        description = "Equipment lending REST API",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Users
        users::register,
        users::list_users,
        users::get_user,
        users::approve_user,
        users::reject_user,
        users::disable_user,
        users::update_user,
        users::update_settings,
        users::delete_user,
        users::get_user_loans,
        users::get_user_dashboard,
        // Equipment
        equipment::list_equipment,
        equipment::get_equipment,
        equipment::create_equipment,
        equipment::update_equipment,
        equipment::delete_equipment,
        // Loans
        loans::create_loan,
        loans::get_loan,
        loans::return_loan,
        loans::list_overdue,
        // Stats
        stats::get_stats,
    ),
    components(
        schemas(
            // Users
            crate::models::user::User,
            crate::models::user::RegisterUser,
            crate::models::user::UpdateUser,
            crate::models::user::UpdateSettings,
            crate::models::enums::Role,
            crate::models::enums::UserStatus,
            // Equipment
            crate::models::equipment::Equipment,
            crate::models::equipment::CreateEquipment,
            crate::models::equipment::UpdateEquipment,
            crate::models::enums::EquipmentLabel,
            crate::models::enums::EquipmentStatus,
            // Loans
            crate::models::loan::BorrowRecord,
            crate::models::loan::CreateLoan,
            crate::models::loan::OverdueEntry,
            crate::models::enums::LoanStatus,
            crate::services::loans::ReturnOutcome,
            crate::error::LendingWarning,
            // Stats
            crate::models::report::ReportSummary,
            crate::models::report::OverdueRow,
            crate::models::report::UserDashboard,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "users", description = "Registration and account administration"),
        (name = "equipment", description = "Equipment catalog"),
        (name = "loans", description = "Borrowing and returns"),
        (name = "stats", description = "Reports")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_lending_paths() {
        let doc = ApiDoc::openapi();
        for path in [
            "/loans",
            "/loans/{id}/return",
            "/loans/overdue",
            "/users/{id}/approve",
            "/users/{id}/settings",
            "/users/{id}/dashboard",
            "/stats",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {}", path);
        }
    }
}
