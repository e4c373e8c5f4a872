use crate::exception::Exception;
use crate::param::{CRLF, SERVER_NAME, STATUS_CODES};
use crate::util::HtmlBuilder;

use bytes::Bytes;
use chrono::prelude::*;
use log::debug;
use serde_json::json;

use std::collections::HashMap;

/// HTTP 响应构建器。
///
/// 状态码、原因短语、Content-Type 与标头在发送前可自由修改；`send` 只允许调用一次，
/// 一次性完成序列化并设置 `headers_sent` 标志，此后任何发送尝试都会得到
/// `Exception::DoubleSend`，且已序列化的字节不会被破坏。
#[derive(Debug, Clone)]
pub struct Response {
    status_code: u16,
    information: String,
    content_type: String,
    headers: HashMap<String, String>,
    headers_sent: bool,
    wire: Option<Bytes>,
}

impl Response {
    pub fn new() -> Self {
        let mut headers = HashMap::new();
        // 默认标头：无keep-alive，每个响应后连接即关闭
        headers.insert("Connection".to_string(), "close".to_string());
        headers.insert("Server".to_string(), SERVER_NAME.to_string());
        headers.insert("Date".to_string(), format_date(&Utc::now()));
        Self {
            status_code: 200,
            information: "OK".to_string(),
            content_type: "application/json".to_string(),
            headers,
            headers_sent: false,
            wire: None,
        }
    }

    /// 设置状态码，原因短语从状态码表推导；未知状态码的原因短语为 "Unknown"。
    pub fn set_status(&mut self, code: u16) -> &mut Self {
        self.status_code = code;
        self.information = match STATUS_CODES.get(&code) {
            Some(&information) => information.to_string(),
            None => "Unknown".to_string(),
        };
        self
    }

    /// 显式覆盖原因短语。
    pub fn set_status_message(&mut self, message: &str) -> &mut Self {
        self.information = message.to_string();
        self
    }

    pub fn set_content_type(&mut self, content_type: &str) -> &mut Self {
        self.content_type = content_type.to_string();
        self
    }

    pub fn set_header(&mut self, name: &str, value: &str) -> &mut Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    /// 序列化并"发送"响应。整个响应只允许发送一次。
    ///
    /// 报文顺序：状态行、Content-Type、Content-Length（按字节长度计算）、
    /// 全部显式标头、空行、响应体。序列化结果存入内部缓冲，由持有连接的
    /// worker 在分发结束后一次性写入套接字并立即刷新。
    pub fn send(&mut self, body: &str) -> Result<(), Exception> {
        if self.headers_sent {
            return Err(Exception::DoubleSend);
        }
        self.headers_sent = true;

        let mut wire = Vec::with_capacity(256 + body.len());
        wire.extend_from_slice(
            format!(
                "HTTP/1.1 {} {}{}",
                self.status_code, self.information, CRLF
            )
            .as_bytes(),
        );
        wire.extend_from_slice(format!("Content-Type: {}{}", self.content_type, CRLF).as_bytes());
        wire.extend_from_slice(format!("Content-Length: {}{}", body.len(), CRLF).as_bytes());
        for (name, value) in &self.headers {
            wire.extend_from_slice(format!("{}: {}{}", name, value, CRLF).as_bytes());
        }
        wire.extend_from_slice(CRLF.as_bytes());
        wire.extend_from_slice(body.as_bytes());

        debug!(
            "响应序列化完成: {} {}, {} bytes",
            self.status_code,
            self.information,
            wire.len()
        );
        self.wire = Some(Bytes::from(wire));
        Ok(())
    }

    /// 以 `application/json` 发送响应体。
    pub fn json(&mut self, body: &str) -> Result<(), Exception> {
        self.set_content_type("application/json");
        self.send(body)
    }

    /// 以 `text/html` 发送响应体。
    pub fn html(&mut self, body: &str) -> Result<(), Exception> {
        self.set_content_type("text/html; charset=UTF-8");
        self.send(body)
    }

    /// 以 `text/plain` 发送响应体。
    pub fn text(&mut self, body: &str) -> Result<(), Exception> {
        self.set_content_type("text/plain; charset=UTF-8");
        self.send(body)
    }

    /// 发送 302 重定向：空响应体加 `Location` 标头。
    pub fn redirect(&mut self, location: &str) -> Result<(), Exception> {
        self.set_status(302);
        self.set_header("Location", location);
        self.send("")
    }

    /// 按当前 Content-Type 族格式化错误响应体并发送。
    pub fn send_error(&mut self, status_code: u16, error_message: &str) -> Result<(), Exception> {
        self.set_status(status_code);
        let body = if self.content_type.contains("json") {
            json!({"error": error_message, "status": status_code}).to_string()
        } else if self.content_type.contains("html") {
            HtmlBuilder::from_status_code(status_code, Some(error_message)).build()
        } else {
            format!("Error: {}", error_message)
        };
        self.send(&body)
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

// --- Getter 访问器实现 ---

impl Response {
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn information(&self) -> &str {
        &self.information
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn headers_sent(&self) -> bool {
        self.headers_sent
    }

    /// 序列化后的完整报文字节；`send` 之前为 `None`。
    pub fn as_bytes(&self) -> Option<&[u8]> {
        self.wire.as_ref().map(|wire| wire.as_ref())
    }
}

fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc2822()
}
