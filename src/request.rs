// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 请求处理模块
//!
//! 该模块是框架的核心组件之一，负责把 TCP 流中的原始字节解析为强类型的
//! `Request` 结构体。它涵盖了：
//! 1. 请求行（Request-Line）的解析（方法、URI）。
//! 2. 查询串的拆分与固定解码表的应用。
//! 3. HTTP 标头（Headers）的逐行提取。
//! 4. 按 `Content-Length` 定长读取请求体（仅限携带请求体的方法）。

use crate::exception::Exception;
use crate::param::{BODY_METHODS, QUERY_DECODE_TABLE};

use log::error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use std::collections::HashMap;

/// 表示一个完整的 HTTP 请求。
///
/// 请求由处理该连接的 worker 独占持有，路径变量在路由解析成功后写入一次，
/// 此后在请求的剩余生命周期内保持不变。
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP 请求方法（统一大写化的记号，可能在路由表支持集合之外）
    method: String,
    /// 原始 URI（含查询串）
    uri: String,
    /// URI 中 `?` 之前的部分
    path: String,
    /// URI 中 `?` 之后的部分（无查询串则为空）
    query_string: String,
    /// 请求标头，同名标头后写覆盖先写，名称保持收到时的大小写
    headers: HashMap<String, String>,
    /// 查询参数，重复键后写覆盖先写
    query_params: HashMap<String, String>,
    /// 路径变量，路由解析前为空
    path_variables: HashMap<String, String>,
    /// 请求体（非携带体方法恒为空字符串）
    body: String,
}

impl Request {
    /// 从缓冲读取器解析一个 HTTP 请求。
    ///
    /// # 逻辑步骤
    /// 1. 读取请求行并拆分出方法与 URI；空行或不可读视为非法请求。
    /// 2. 在第一个 `?` 处拆分路径与查询串，并解析查询参数。
    /// 3. 逐行读取标头直到空行；没有 `": "` 分隔符的行被静默跳过。
    /// 4. 仅当方法属于携带请求体的集合时，按 `Content-Length` 定长读取请求体。
    ///
    /// # 错误处理
    /// 解析失败返回 `Exception::MalformedRequest`，调用方应直接关闭连接，
    /// 此时还不存在可以附加错误响应的请求对象。
    pub async fn parse<R>(reader: &mut R) -> Result<Self, Exception>
    where
        R: AsyncBufRead + Unpin,
    {
        // 1. 请求行 (e.g., "GET /api/users?limit=5 HTTP/1.1")
        let mut request_line = String::new();
        match reader.read_line(&mut request_line).await {
            Ok(0) => return Err(Exception::MalformedRequest),
            Ok(_) => {}
            Err(e) => {
                error!("读取HTTP请求行失败: {}", e);
                return Err(Exception::MalformedRequest);
            }
        }
        let request_line = request_line.trim_end_matches(['\r', '\n']);
        if request_line.is_empty() {
            return Err(Exception::MalformedRequest);
        }

        let parts: Vec<&str> = request_line.split(' ').collect();
        let method = parts[0].to_uppercase();
        let uri = if parts.len() > 1 {
            parts[1].to_string()
        } else {
            "/".to_string()
        };

        // 2. 在第一个'?'处拆分路径与查询串
        let (path, query_string) = match uri.find('?') {
            Some(index) => (uri[..index].to_string(), uri[index + 1..].to_string()),
            None => (uri.clone(), String::new()),
        };
        let query_params = parse_query_params(&query_string);

        // 3. 逐行解析标头，直到空行
        let mut headers = HashMap::new();
        loop {
            let mut line = String::new();
            match reader.read_line(&mut line).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    error!("读取HTTP标头失败: {}", e);
                    return Err(Exception::MalformedRequest);
                }
            }
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                break;
            }
            match line.split_once(": ") {
                Some((name, value)) => {
                    headers.insert(name.trim().to_string(), value.trim().to_string());
                }
                // 没有分隔符的标头行静默跳过
                None => continue,
            }
        }

        // 4. 仅携带请求体的方法读取请求体
        let body = if BODY_METHODS.contains(&method.as_str()) {
            read_body(reader, &headers).await?
        } else {
            String::new()
        };

        Ok(Self {
            method,
            uri,
            path,
            query_string,
            headers,
            query_params,
            path_variables: HashMap::new(),
            body,
        })
    }
}

/// 按 `Content-Length` 定长读取请求体。
///
/// 循环读取直到满足长度或流提前结束；短读按已读内容原样返回，不报错。
/// `Content-Length` 无法解析为数字视为非法请求。
async fn read_body<R>(
    reader: &mut R,
    headers: &HashMap<String, String>,
) -> Result<String, Exception>
where
    R: AsyncBufRead + Unpin,
{
    let content_length: usize = match headers.get("Content-Length") {
        Some(value) => match value.parse() {
            Ok(n) => n,
            Err(_) => {
                error!("Content-Length标头无法解析为数字: {}", value);
                return Err(Exception::MalformedRequest);
            }
        },
        None => 0,
    };
    if content_length == 0 {
        return Ok(String::new());
    }

    let mut buffer = vec![0u8; content_length];
    let mut total_read = 0;
    while total_read < content_length {
        match reader.read(&mut buffer[total_read..]).await {
            Ok(0) => break,
            Ok(n) => total_read += n,
            Err(e) => {
                error!("读取请求体失败: {}", e);
                return Err(Exception::MalformedRequest);
            }
        }
    }
    buffer.truncate(total_read);

    match String::from_utf8(buffer) {
        Ok(body) => Ok(body),
        Err(_) => {
            error!("请求体不是合法的UTF-8字符串");
            Err(Exception::MalformedRequest)
        }
    }
}

/// 把查询串解析为键值对。
///
/// 规则：先按 `&` 拆分，再在每对的第一个 `=` 处拆分；没有 `=` 的对映射为空字符串。
/// 仅对取值应用固定解码表，键原样保留。
fn parse_query_params(query_string: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    if query_string.is_empty() {
        return params;
    }
    for pair in query_string.split('&') {
        match pair.find('=') {
            Some(index) => {
                let key = &pair[..index];
                let value = &pair[index + 1..];
                params.insert(key.to_string(), decode_query_value(value));
            }
            None => {
                params.insert(pair.to_string(), String::new());
            }
        }
    }
    params
}

/// 应用固定的、刻意不完备的解码表。
///
/// 表外的百分号序列原样透传，这是兼容性取舍而非完整的百分号解码。
fn decode_query_value(value: &str) -> String {
    let mut decoded = value.to_string();
    for (from, to) in QUERY_DECODE_TABLE {
        decoded = decoded.replace(from, to);
    }
    decoded
}

// --- Getter 访问器实现 ---

impl Request {
    /// 获取请求方法（大写记号）
    pub fn method(&self) -> &str {
        &self.method
    }

    /// 获取原始 URI（含查询串）
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// 获取请求路径（不含查询串）
    pub fn path(&self) -> &str {
        &self.path
    }

    /// 获取原始查询串
    pub fn query_string(&self) -> &str {
        &self.query_string
    }

    /// 获取指定查询参数
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query_params.get(name).map(|v| v.as_str())
    }

    /// 获取指定查询参数，缺失时返回默认值
    pub fn query_param_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.query_param(name).unwrap_or(default)
    }

    /// 获取全部查询参数
    pub fn query_params(&self) -> &HashMap<String, String> {
        &self.query_params
    }

    /// 获取指定标头（名称大小写敏感，以收到时为准）
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(|v| v.as_str())
    }

    /// 获取全部标头
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// 获取指定路径变量（路由解析成功后才有值）
    pub fn path_variable(&self, name: &str) -> Option<&str> {
        self.path_variables.get(name).map(|v| v.as_str())
    }

    /// 获取全部路径变量
    pub fn path_variables(&self) -> &HashMap<String, String> {
        &self.path_variables
    }

    /// 写入一个路径变量。由路由表在匹配成功后调用，此后不应再修改。
    pub fn set_path_variable(&mut self, name: &str, value: &str) {
        self.path_variables
            .insert(name.to_string(), value.to_string());
    }

    /// 获取请求体
    pub fn body(&self) -> &str {
        &self.body
    }

    /// 获取 Content-Type，缺失时按二进制流处理
    pub fn content_type(&self) -> &str {
        self.header("Content-Type")
            .unwrap_or("application/octet-stream")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    async fn parse(raw: &[u8]) -> Result<Request, Exception> {
        let mut reader = BufReader::new(raw);
        Request::parse(&mut reader).await
    }

    /// 验证常规 GET 请求的解析，包括路径与标头
    #[tokio::test]
    async fn test_parse_get_request() {
        let raw = b"GET /api/users HTTP/1.1\r\nHost: localhost:8080\r\nAccept: application/json\r\n\r\n";
        let request = parse(raw).await.unwrap();

        assert_eq!(request.method(), "GET");
        assert_eq!(request.path(), "/api/users");
        assert_eq!(request.query_string(), "");
        assert_eq!(request.header("Host"), Some("localhost:8080"));
        assert_eq!(request.header("Accept"), Some("application/json"));
        assert_eq!(request.body(), "");
    }

    /// 验证查询串的拆分与参数解析
    #[tokio::test]
    async fn test_parse_query_string() {
        let raw = b"GET /api/users?limit=2&offset=10 HTTP/1.1\r\n\r\n";
        let request = parse(raw).await.unwrap();

        assert_eq!(request.path(), "/api/users");
        assert_eq!(request.query_string(), "limit=2&offset=10");
        assert_eq!(request.query_param("limit"), Some("2"));
        assert_eq!(request.query_param("offset"), Some("10"));
        assert_eq!(request.query_param("missing"), None);
        assert_eq!(request.query_param_or("missing", "5"), "5");
    }

    /// 验证固定解码表：表内序列解码，表外序列透传
    #[tokio::test]
    async fn test_query_decode_table() {
        let raw = b"GET /search?city=New%20York&q=a+b&raw=%41 HTTP/1.1\r\n\r\n";
        let request = parse(raw).await.unwrap();

        assert_eq!(request.query_param("city"), Some("New York"));
        assert_eq!(request.query_param("q"), Some("a b"));
        // %41不在固定解码表内，保持原样
        assert_eq!(request.query_param("raw"), Some("%41"));
    }

    /// 验证没有'='的参数对映射为空字符串
    #[tokio::test]
    async fn test_query_pair_without_equals() {
        let raw = b"GET /flags?debug&verbose=1 HTTP/1.1\r\n\r\n";
        let request = parse(raw).await.unwrap();

        assert_eq!(request.query_param("debug"), Some(""));
        assert_eq!(request.query_param("verbose"), Some("1"));
    }

    /// 验证重复查询键后写覆盖先写
    #[tokio::test]
    async fn test_duplicate_query_keys_overwrite() {
        let raw = b"GET /items?id=1&id=2 HTTP/1.1\r\n\r\n";
        let request = parse(raw).await.unwrap();

        assert_eq!(request.query_param("id"), Some("2"));
    }

    /// 验证请求方法被大写化
    #[tokio::test]
    async fn test_method_is_uppercased() {
        let raw = b"get / HTTP/1.1\r\n\r\n";
        let request = parse(raw).await.unwrap();

        assert_eq!(request.method(), "GET");
    }

    /// 验证同名标头后写覆盖先写，且名称保持大小写
    #[tokio::test]
    async fn test_header_last_write_wins() {
        let raw = b"GET / HTTP/1.1\r\nX-Tag: one\r\nX-Tag: two\r\n\r\n";
        let request = parse(raw).await.unwrap();

        assert_eq!(request.header("X-Tag"), Some("two"));
        assert_eq!(request.header("x-tag"), None);
    }

    /// 验证没有分隔符的标头行被静默跳过
    #[tokio::test]
    async fn test_malformed_header_line_skipped() {
        let raw = b"GET / HTTP/1.1\r\nGarbageLineWithoutColon\r\nHost: localhost\r\n\r\n";
        let request = parse(raw).await.unwrap();

        assert_eq!(request.header("Host"), Some("localhost"));
        assert_eq!(request.headers().len(), 1);
    }

    /// 验证 POST 请求按 Content-Length 读取请求体
    #[tokio::test]
    async fn test_post_body_read() {
        let raw = b"POST /api/users HTTP/1.1\r\nContent-Length: 16\r\n\r\n{\"name\": \"John\"}";
        let request = parse(raw).await.unwrap();

        assert_eq!(request.method(), "POST");
        assert_eq!(request.body(), "{\"name\": \"John\"}");
    }

    /// 验证流提前结束时短读的请求体按已读内容返回
    #[tokio::test]
    async fn test_short_body_returned_as_is() {
        let raw = b"POST /api/users HTTP/1.1\r\nContent-Length: 100\r\n\r\npartial";
        let request = parse(raw).await.unwrap();

        assert_eq!(request.body(), "partial");
    }

    /// 验证非携带体方法忽略 Content-Length
    #[tokio::test]
    async fn test_non_body_method_ignores_content_length() {
        let raw = b"GET / HTTP/1.1\r\nContent-Length: 7\r\n\r\nignored";
        let request = parse(raw).await.unwrap();

        assert_eq!(request.body(), "");
    }

    /// 验证缺失 Content-Length 时请求体为空
    #[tokio::test]
    async fn test_body_empty_without_content_length() {
        let raw = b"POST /api/users HTTP/1.1\r\n\r\n";
        let request = parse(raw).await.unwrap();

        assert_eq!(request.body(), "");
    }

    /// 确保空输入被判定为非法请求
    #[tokio::test]
    async fn test_empty_input_is_malformed() {
        let result = parse(b"").await;
        assert_eq!(result.unwrap_err(), Exception::MalformedRequest);
    }

    /// 确保空请求行被判定为非法请求
    #[tokio::test]
    async fn test_blank_request_line_is_malformed() {
        let result = parse(b"\r\n\r\n").await;
        assert_eq!(result.unwrap_err(), Exception::MalformedRequest);
    }

    /// 确保无法解析的 Content-Length 被判定为非法请求
    #[tokio::test]
    async fn test_bad_content_length_is_malformed() {
        let raw = b"POST / HTTP/1.1\r\nContent-Length: abc\r\n\r\n";
        let result = parse(raw).await;
        assert_eq!(result.unwrap_err(), Exception::MalformedRequest);
    }

    /// 验证路径变量的写入与读取
    #[tokio::test]
    async fn test_path_variables() {
        let raw = b"GET /api/users/42 HTTP/1.1\r\n\r\n";
        let mut request = parse(raw).await.unwrap();

        assert!(request.path_variables().is_empty());
        request.set_path_variable("id", "42");
        assert_eq!(request.path_variable("id"), Some("42"));
    }

    /// 验证缺失 Content-Type 时按二进制流处理
    #[tokio::test]
    async fn test_content_type_default() {
        let raw = b"GET / HTTP/1.1\r\n\r\n";
        let request = parse(raw).await.unwrap();

        assert_eq!(request.content_type(), "application/octet-stream");
    }
}
