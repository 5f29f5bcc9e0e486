use actix_cors::Cors;

/// 领奖页面由门店终端与活动页调用，只开放读取与提交
pub fn create_cors() -> Cors {
    Cors::default()
        .allow_any_origin()
        .allowed_methods(vec!["GET", "POST", "OPTIONS"])
        .allow_any_header()
        .max_age(3600)
}
