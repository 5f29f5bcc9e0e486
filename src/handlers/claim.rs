use crate::models::*;
use crate::services::ClaimService;
use actix_web::{HttpResponse, ResponseError, Result, web};

#[utoipa::path(
    post,
    path = "/campaigns/{campaign_id}/eligibility",
    tag = "claim",
    params(
        ("campaign_id" = String, Path, description = "活动ID")
    ),
    request_body = Identity,
    responses(
        (status = 200, description = "资格检查完成", body = EligibilityResult),
        (status = 400, description = "缺少身份信息")
    )
)]
/// 检查身份是否还可以参与活动
pub async fn check_eligibility(
    service: web::Data<ClaimService>,
    path: web::Path<String>,
    request: web::Json<Identity>,
) -> Result<HttpResponse> {
    let campaign_id = path.into_inner();
    match service.check_eligibility(&campaign_id, &request).await {
        Ok(result) => Ok(HttpResponse::Ok().json(ApiResponse::success(result))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/campaigns/{campaign_id}/stores/{store_id}/claims",
    tag = "claim",
    params(
        ("campaign_id" = String, Path, description = "活动ID"),
        ("store_id" = i64, Path, description = "门店ID")
    ),
    request_body = Identity,
    responses(
        (status = 200, description = "领奖成功", body = AllocationResult),
        (status = 400, description = "缺少身份信息或门店未启用"),
        (status = 404, description = "门店不存在"),
        (status = 409, description = "已参与 / 奖品已领完 / 库存竞争失败 (retryable)")
    )
)]
/// 随机领奖:
/// 1. 按身份优先级检查是否已参与
/// 2. 按剩余库存加权抽取奖品
/// 3. 排他锁扣减库存并写入台账
pub async fn claim(
    service: web::Data<ClaimService>,
    path: web::Path<(String, i64)>,
    request: web::Json<Identity>,
) -> Result<HttpResponse> {
    let (campaign_id, store_id) = path.into_inner();
    match service.claim(&campaign_id, store_id, &request).await {
        Ok(result) => Ok(HttpResponse::Ok().json(ApiResponse::success(result))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/campaigns/{campaign_id}/stores/{store_id}/prizes/{prize_id}/claims",
    tag = "claim",
    params(
        ("campaign_id" = String, Path, description = "活动ID"),
        ("store_id" = i64, Path, description = "门店ID"),
        ("prize_id" = i64, Path, description = "奖品ID")
    ),
    request_body = Identity,
    responses(
        (status = 200, description = "领奖成功", body = AllocationResult),
        (status = 404, description = "门店或奖品不存在"),
        (status = 409, description = "已参与 / 奖品已领完")
    )
)]
/// 领取指定奖品 (不抽奖)
pub async fn claim_fixed(
    service: web::Data<ClaimService>,
    path: web::Path<(String, i64, i64)>,
    request: web::Json<Identity>,
) -> Result<HttpResponse> {
    let (campaign_id, store_id, prize_id) = path.into_inner();
    match service
        .claim_fixed(&campaign_id, store_id, prize_id, &request)
        .await
    {
        Ok(result) => Ok(HttpResponse::Ok().json(ApiResponse::success(result))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/campaigns/{campaign_id}/registrations",
    tag = "claim",
    params(
        ("campaign_id" = String, Path, description = "活动ID")
    ),
    request_body = RegistrationRequest,
    responses(
        (status = 200, description = "登记成功", body = ClaimRecordResponse),
        (status = 409, description = "已参与")
    )
)]
/// 仅登记参与
pub async fn register(
    service: web::Data<ClaimService>,
    path: web::Path<String>,
    request: web::Json<RegistrationRequest>,
) -> Result<HttpResponse> {
    let campaign_id = path.into_inner();
    let request = request.into_inner();
    match service
        .register(&campaign_id, &request.identity, request.store_id)
        .await
    {
        Ok(record) => Ok(HttpResponse::Ok().json(ApiResponse::success(record))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/campaigns/{campaign_id}/claims",
    tag = "claim",
    params(
        ("campaign_id" = String, Path, description = "活动ID"),
        ("page" = Option<u32>, Query, description = "页码 (默认1)"),
        ("per_page" = Option<u32>, Query, description = "每页数量 (默认20)")
    ),
    responses(
        (status = 200, description = "获取台账成功")
    )
)]
/// 分页获取活动台账（倒序）
pub async fn list_claims(
    service: web::Data<ClaimService>,
    path: web::Path<String>,
    query: web::Query<ClaimRecordQuery>,
) -> Result<HttpResponse> {
    let campaign_id = path.into_inner();
    match service.list_claims(&campaign_id, &query.into_inner()).await {
        Ok(page) => Ok(HttpResponse::Ok().json(ApiResponse::success(page))),
        Err(e) => Ok(e.error_response()),
    }
}

/// 路由配置
pub fn claim_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/campaigns/{campaign_id}")
            .route("/eligibility", web::post().to(check_eligibility))
            .route("/registrations", web::post().to(register))
            .route("/claims", web::get().to(list_claims))
            .route("/stores/{store_id}/claims", web::post().to(claim))
            .route(
                "/stores/{store_id}/prizes/{prize_id}/claims",
                web::post().to(claim_fixed),
            ),
    );
}
