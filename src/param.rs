// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Web 框架协议参数与常量模块
//!
//! 该模块定义了 `shaneyale-webframework` 遵循的 HTTP 协议相关常量和数据结构，包括：
//! - 常见的 HTTP 状态码及其原因短语（Reason Phrase）。
//! - 路由表可识别的 HTTP 方法强类型枚举。
//! - 携带请求体的方法集合与查询串的固定解码表。

use lazy_static::lazy_static;
use std::collections::HashMap;

/// 服务器标识，用于 HTTP 响应头的 `Server` 字段
pub const SERVER_NAME: &str = "shaneyale-webframework/0.1";

/// HTTP 协议规定的换行符（Carriage Return Line Feed）
pub const CRLF: &str = "\r\n";

/// 携带请求体的方法集合。
///
/// 只有该集合内的方法才会按照 `Content-Length` 读取请求体；
/// 集合外的方法即使带有 `Content-Length` 头，请求体也一律为空。
pub const BODY_METHODS: &[&str] = &["POST", "PUT", "PATCH"];

/// 查询串取值的固定解码表。
///
/// 这是一张刻意不完备的兼容表：仅保证表内的百分号序列（以及 `+` 号）被替换，
/// 表外的序列原样透传，不做通用的百分号解码。
pub const QUERY_DECODE_TABLE: &[(&str, &str)] = &[
    ("%20", " "),
    ("%21", "!"),
    ("%40", "@"),
    ("%23", "#"),
    ("%24", "$"),
    ("%26", "&"),
    ("%3D", "="),
    ("+", " "),
];

lazy_static! {
    /// HTTP 状态码与其对应的标准原因短语映射表。
    ///
    /// 参考标准：[RFC 9110: HTTP Semantics](https://www.rfc-editor.org/rfc/rfc9110.html)。
    pub static ref STATUS_CODES: HashMap<u16, &'static str> = {
        let mut map = HashMap::new();
        // 2xx: 成功响应 (Successful)
        map.insert(200, "OK");
        map.insert(201, "Created");
        map.insert(202, "Accepted");
        map.insert(204, "No Content");

        // 3xx: 重定向 (Redirection)
        map.insert(301, "Moved Permanently");
        map.insert(302, "Found");
        map.insert(303, "See Other");
        map.insert(304, "Not Modified");
        map.insert(307, "Temporary Redirect");
        map.insert(308, "Permanent Redirect");

        // 4xx: 客户端错误 (Client Error)
        map.insert(400, "Bad Request");
        map.insert(401, "Unauthorized");
        map.insert(403, "Forbidden");
        map.insert(404, "Not Found");
        map.insert(405, "Method Not Allowed");
        map.insert(406, "Not Acceptable");
        map.insert(408, "Request Timeout");
        map.insert(409, "Conflict");
        map.insert(411, "Length Required");
        map.insert(413, "Content Too Large");
        map.insert(414, "URI Too Long");
        map.insert(415, "Unsupported Media Type");
        map.insert(422, "Unprocessable Content");

        // 5xx: 服务端错误 (Server Error)
        map.insert(500, "Internal Server Error");
        map.insert(501, "Not Implemented");
        map.insert(502, "Bad Gateway");
        map.insert(503, "Service Unavailable");
        map.insert(505, "HTTP Version Not Supported");
        map
    };
}

/// 路由表可识别的 HTTP 请求方法。
///
/// 解析器接受任意方法记号（统一转为大写字符串保存在 `Request` 中），
/// 路由表只对该枚举覆盖的方法建立路由分组；枚举外的方法在解析阶段不报错，
/// 在路由解析阶段按"未匹配"处理。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpRequestMethod {
    /// 获取资源
    Get,
    /// 提交数据或执行操作
    Post,
    /// 整体更新资源
    Put,
    /// 删除资源
    Delete,
}

impl HttpRequestMethod {
    /// 路由表支持的全部方法，按固定顺序排列。
    pub const KNOWN: [HttpRequestMethod; 4] = [
        HttpRequestMethod::Get,
        HttpRequestMethod::Post,
        HttpRequestMethod::Put,
        HttpRequestMethod::Delete,
    ];

    /// 从（已大写化的）方法记号构造枚举；未知方法返回 `None`。
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "GET" => Some(HttpRequestMethod::Get),
            "POST" => Some(HttpRequestMethod::Post),
            "PUT" => Some(HttpRequestMethod::Put),
            "DELETE" => Some(HttpRequestMethod::Delete),
            _ => None,
        }
    }
}

use std::fmt;

impl fmt::Display for HttpRequestMethod {
    /// 将枚举格式化为 HTTP 标准大写方法名
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpRequestMethod::Get => write!(f, "GET"),
            HttpRequestMethod::Post => write!(f, "POST"),
            HttpRequestMethod::Put => write!(f, "PUT"),
            HttpRequestMethod::Delete => write!(f, "DELETE"),
        }
    }
}
