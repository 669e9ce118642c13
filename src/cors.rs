use axum::http::{HeaderValue, Method, header};
use std::time::Duration;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer};

use crate::config::CorsConfig;

/// 根据配置构建 CORS 中间件。
///
/// 携带凭证时浏览器不接受 `*`，此时通配项改为回显请求中的 Origin/Method/Headers，
/// 效果上等价于“任意来源且允许凭证”。
pub fn build_cors_layer(cors: &CorsConfig) -> Option<CorsLayer> {
    if !cors.enabled {
        return None;
    }

    let (any_origin, origins) = parse_allowed_origins(&cors.allowed_origins);
    if !any_origin && origins.is_empty() {
        tracing::warn!("CORS 已启用但 allowed_origins 为空，已跳过启用");
        return None;
    }

    let (any_methods, methods) = parse_allowed_methods(&cors.allowed_methods);
    let (any_headers, headers) = parse_header_names("allowed_headers", &cors.allowed_headers);
    let (any_expose, expose_headers) = parse_header_names("expose_headers", &cors.expose_headers);
    let credentials = cors.allow_credentials;

    let mut layer = CorsLayer::new();

    layer = match (any_origin, credentials) {
        (true, true) => layer.allow_origin(AllowOrigin::mirror_request()),
        (true, false) => layer.allow_origin(Any),
        (false, _) => layer.allow_origin(origins),
    };

    if any_methods {
        layer = if credentials {
            layer.allow_methods(AllowMethods::mirror_request())
        } else {
            layer.allow_methods(Any)
        };
    } else if !methods.is_empty() {
        layer = layer.allow_methods(methods);
    }

    if any_headers {
        layer = if credentials {
            layer.allow_headers(AllowHeaders::mirror_request())
        } else {
            layer.allow_headers(Any)
        };
    } else if !headers.is_empty() {
        layer = layer.allow_headers(headers);
    }

    if any_expose && credentials {
        // 暴露头没有回显模式，只保留显式列出的部分
        tracing::warn!("CORS expose_headers 的 \"*\" 不能与 allow_credentials 同时使用，已忽略");
        if !expose_headers.is_empty() {
            layer = layer.expose_headers(expose_headers);
        }
    } else if any_expose {
        layer = layer.expose_headers(Any);
    } else if !expose_headers.is_empty() {
        layer = layer.expose_headers(expose_headers);
    }

    if credentials {
        layer = layer.allow_credentials(true);
    }

    if let Some(secs) = cors.max_age_secs
        && secs > 0
    {
        layer = layer.max_age(Duration::from_secs(secs));
    }

    Some(layer)
}

fn parse_allowed_origins(values: &[String]) -> (bool, Vec<HeaderValue>) {
    let mut any = false;
    let mut origins = Vec::new();
    for value in values.iter().map(|v| v.trim()).filter(|v| !v.is_empty()) {
        if value == "*" {
            any = true;
            continue;
        }
        match HeaderValue::from_str(value) {
            Ok(v) => origins.push(v),
            Err(_) => tracing::warn!("CORS allowed_origins 含无效值: {}", value),
        }
    }
    (any, origins)
}

fn parse_allowed_methods(values: &[String]) -> (bool, Vec<Method>) {
    let mut any = false;
    let mut methods = Vec::new();
    for value in values.iter().map(|v| v.trim()).filter(|v| !v.is_empty()) {
        if value == "*" {
            any = true;
            continue;
        }
        match Method::from_bytes(value.to_ascii_uppercase().as_bytes()) {
            Ok(m) => methods.push(m),
            Err(_) => tracing::warn!("CORS allowed_methods 含无效值: {}", value),
        }
    }
    (any, methods)
}

fn parse_header_names(label: &str, values: &[String]) -> (bool, Vec<header::HeaderName>) {
    let mut any = false;
    let mut headers = Vec::new();
    for value in values.iter().map(|v| v.trim()).filter(|v| !v.is_empty()) {
        if value == "*" {
            any = true;
            continue;
        }
        match header::HeaderName::from_bytes(value.to_ascii_lowercase().as_bytes()) {
            Ok(h) => headers.push(h),
            Err(_) => tracing::warn!("CORS {} 含无效值: {}", label, value),
        }
    }
    (any, headers)
}
