use crate::models::*;
use crate::services::ClaimService;
use actix_web::{HttpResponse, ResponseError, Result, web};

#[utoipa::path(
    get,
    path = "/stores/{store_id}/prizes",
    tag = "prize",
    params(
        ("store_id" = i64, Path, description = "门店ID")
    ),
    responses(
        (status = 200, description = "获取可领取奖品成功", body = [PrizeSnapshot]),
        (status = 400, description = "门店未启用"),
        (status = 404, description = "门店不存在"),
        (status = 409, description = "奖品已全部领完")
    )
)]
/// 门店当前有库存的奖品
pub async fn get_available_prizes(
    service: web::Data<ClaimService>,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    match service.list_available_prizes(path.into_inner()).await {
        Ok(list) => Ok(HttpResponse::Ok().json(ApiResponse::success(list))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn prize_config(cfg: &mut web::ServiceConfig) {
    cfg.route("/stores/{store_id}/prizes", web::get().to(get_available_prizes));
}
