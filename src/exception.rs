// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 该模块定义了请求处理生命周期中可能抛出的各类异常，以及把异常统一翻译为
//! HTTP 错误响应的全局异常处理器。
//!
//! ## 设计意图
//! - **封闭的错误分类**：用一个枚举覆盖从报文解析、路由解析到业务层抛出的全部错误种类，
//!   异常处理器按变体查表映射状态码与响应体结构，不做任何动态类型判断。
//! - **不泄露内部细节**：未分类的错误一律映射为 500，并使用固定的通用文案；
//!   真实错误只进日志，绝不回显给客户端。
//! - **发送后静默**：响应头一旦写出，异常处理器只记录日志，不再尝试二次发送。

use crate::request::Request;
use crate::response::Response;
use crate::util::HtmlBuilder;

use log::error;
use serde_json::json;

use std::fmt;

/// 请求处理过程中发生的异常类型。
///
/// 该枚举通常作为 `Result` 的 `Err` 部分返回。前两个变体属于框架内部错误，
/// 其余变体由业务处理器抛出，经全局异常处理器转换为对应的 HTTP 响应。
#[derive(Debug, Clone, PartialEq)]
pub enum Exception {
    /// 请求行为空或无法读取，连接直接关闭，不产生任何响应。
    MalformedRequest,
    /// 注册的处理器签名不在支持的形态集合内。按"未匹配路由"处理，不影响服务器运行。
    UnsupportedHandlerShape,
    /// 业务校验失败，携带出错字段名。对应 `400 Bad Request`。
    Validation { field: String, message: String },
    /// 请求的业务资源不存在。对应 `404 Not Found`。
    NotFound(String),
    /// 请求未通过认证或授权。对应 `401 Unauthorized`。
    Unauthorized(String),
    /// 请求参数格式非法（如无法解析的数字）。对应 `400 Bad Request`。
    BadArgument(String),
    /// 响应头已经写出后又尝试发送。属于编程错误，对该请求致命，但不影响服务器。
    DoubleSend,
    /// 其他未分类的内部错误。对应 `500 Internal Server Error`。
    Internal(String),
}

use Exception::*;

impl fmt::Display for Exception {
    /// 根据错误类型写入人类可读的描述文本，主要用于日志记录。
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedRequest => write!(f, "Malformed request line"),
            UnsupportedHandlerShape => write!(f, "Unsupported handler shape"),
            Validation { field, message } => {
                write!(f, "Validation failed on field '{}': {}", field, message)
            }
            NotFound(message) => write!(f, "Not found: {}", message),
            Unauthorized(message) => write!(f, "Unauthorized: {}", message),
            BadArgument(message) => write!(f, "Bad argument: {}", message),
            DoubleSend => write!(f, "Response was already sent"),
            Internal(message) => write!(f, "Internal error: {}", message),
        }
    }
}

/// # 全局异常处理器
///
/// 在处理器或路由环节抛出异常且响应尚未发送时，由分发循环调用，
/// 按异常变体查表生成结构化的错误响应。
pub struct GlobalExceptionHandler;

impl GlobalExceptionHandler {
    pub fn new() -> Self {
        Self
    }

    /// 把异常转换为 HTTP 错误响应并发送。
    ///
    /// 响应体的格式跟随响应当前的 Content-Type 族：JSON 结构、HTML 页面或纯文本兜底。
    /// 若响应头已经写出，仅记录日志（客户端已经收到了部分或完整响应）。
    pub fn handle(&self, request: &Request, response: &mut Response, exception: &Exception) {
        error!(
            "处理请求 [{} {}] 时发生异常: {}",
            request.method(),
            request.path(),
            exception
        );

        if response.headers_sent() {
            error!("响应头已发送，异常无法回显给客户端，仅记录日志");
            return;
        }

        let (status, label, message, field): (u16, &str, String, Option<&str>) = match exception {
            Validation { field, message } => (400, "Validation Error", message.clone(), Some(field)),
            NotFound(message) => (404, "Not Found", message.clone(), None),
            Unauthorized(message) => (401, "Unauthorized", message.clone(), None),
            BadArgument(message) => (400, "Bad Request", message.clone(), None),
            // 未分类错误统一映射为 500，文案固定，真实错误只出现在上面的日志里
            _ => (
                500,
                "Internal Server Error",
                "An unexpected error occurred".to_string(),
                None,
            ),
        };

        let content_type = response.content_type().to_string();
        let result = if content_type.contains("json") {
            let mut body = json!({
                "error": label,
                "message": message,
                "status": status,
            });
            if let Some(field) = field {
                body["field"] = json!(field);
            }
            response.set_status(status).json(&body.to_string())
        } else if content_type.contains("html") {
            let page = HtmlBuilder::from_status_code(status, Some(&message)).build();
            response.set_status(status).html(&page)
        } else {
            response.set_status(status).text(&format!("Error: {}", message))
        };

        if let Err(e) = result {
            error!("发送错误响应失败: {}", e);
        }
    }
}

impl Default for GlobalExceptionHandler {
    fn default() -> Self {
        Self::new()
    }
}
