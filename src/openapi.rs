use utoipa::openapi::server::ServerBuilder;
use utoipa::{Modify, OpenApi};

/// 所有接口都挂载在根路径下，Swagger UI 直接以当前站点为 server。
struct RootServer;

impl Modify for RootServer {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let root = ServerBuilder::new()
            .url("/")
            .description(Some("当前服务"))
            .build();
        openapi.servers = Some(vec![root]);
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::features::health::handler::health_check,
        crate::features::health::handler::root,
        crate::features::health::handler::hello,
        crate::features::diagnostics::handler::test_database,
        crate::features::image::handler::generate_image,
    ),
    components(
        schemas(
            crate::error::ProblemDetails,
            crate::error::ProblemFieldError,
            crate::features::health::handler::HealthResponse,
            crate::features::health::handler::MessageResponse,
            crate::features::diagnostics::handler::DiagnosticsResponse,
            crate::features::image::GenerateRequest,
            crate::features::image::Seed,
            crate::features::image::GenerateResponse,
        )
    ),
    modifiers(&RootServer),
    tags(
        (name = "Health", description = "健康检查与问候：服务探活。"),
        (
            name = "Diagnostics",
            description = "诊断：探测可选的数据库协作方与相关环境变量。"
        ),
        (
            name = "Image",
            description = "图片生成：根据提示词程序化合成 PNG 占位图（base64 返回）。"
        ),
    ),
    info(
        title = "Prompt Art Backend API",
        version = env!("CARGO_PKG_VERSION"),
        description = "提示词占位图生成服务 API（Axum + utoipa）。相同 prompt/尺寸/seed 的生成结果逐字节一致。"
    )
)]
pub struct ApiDoc;
