use actix_web::web;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::entities::ClaimStatus;
use crate::handlers;
use crate::models::*;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::claim::check_eligibility,
        handlers::claim::claim,
        handlers::claim::claim_fixed,
        handlers::claim::register,
        handlers::claim::list_claims,
        handlers::prize::get_available_prizes,
    ),
    components(
        schemas(
            Identity,
            IdentityField,
            RegistrationRequest,
            EligibilityResult,
            ClaimSummary,
            PrizeSnapshot,
            AllocationResult,
            ClaimRecordResponse,
            ClaimRecordQuery,
            ClaimStatus,
            ApiError,
        )
    ),
    tags(
        (name = "claim", description = "活动领奖与参与资格"),
        (name = "prize", description = "门店奖品库存")
    ),
    info(
        title = "Prize Claim API",
        version = "0.1.0",
        description = "门店活动领奖服务"
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    )
)]
pub struct ApiDoc;

pub fn swagger_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
    );
}
