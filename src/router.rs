// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 路由表模块
//!
//! 该模块负责把注册的路径模板编译为匹配器，并在请求到来时解析出对应的处理器。
//!
//! ## 模板语法与匹配规则
//! - 路径模板中的 `{name}` 段表示路径变量，匹配一个或多个非 `/` 字符；
//!   变量段之间与前后的字面量按原文精确匹配（正则元字符会被转义）。
//! - 编译后的匹配器在首尾锚定，必须整体匹配请求路径。
//! - 同方法下按注册顺序匹配，返回第一个命中的条目——对于互相重叠的模板，
//!   先注册者胜出是契约的一部分，不是实现巧合。
//! - 由于变量分组要求至少一个字符，空路径段永远不会命中。
//!
//! ## 处理器形态
//! 处理器在注册时就固定为封闭集合中的一种形态：`(request, response)`、
//! 仅 `(response)`、或无参返回字符串（该字符串按原始 JSON 响应体发送）。
//! 调用时按形态分派，不做任何运行期签名探测。

use crate::exception::Exception;
use crate::param::HttpRequestMethod;
use crate::request::Request;
use crate::response::Response;

use lazy_static::lazy_static;
use log::{debug, error, info, warn};
use regex::Regex;

use std::collections::HashMap;

type FullHandler = Box<dyn Fn(&Request, &mut Response) -> Result<(), Exception> + Send + Sync>;
type ResponseOnlyHandler = Box<dyn Fn(&mut Response) -> Result<(), Exception> + Send + Sync>;
type NiladicHandler = Box<dyn Fn() -> Result<String, Exception> + Send + Sync>;

/// 业务处理器的封闭形态集合，注册时确定，调用时按变体分派。
pub enum Handler {
    /// 完整形态：同时接收请求与响应
    Full(FullHandler),
    /// 仅接收响应
    ResponseOnly(ResponseOnlyHandler),
    /// 无参；返回的字符串按原始 JSON 响应体发送
    Niladic(NiladicHandler),
}

impl Handler {
    pub fn full<F>(handler: F) -> Self
    where
        F: Fn(&Request, &mut Response) -> Result<(), Exception> + Send + Sync + 'static,
    {
        Handler::Full(Box::new(handler))
    }

    pub fn response_only<F>(handler: F) -> Self
    where
        F: Fn(&mut Response) -> Result<(), Exception> + Send + Sync + 'static,
    {
        Handler::ResponseOnly(Box::new(handler))
    }

    pub fn niladic<F>(handler: F) -> Self
    where
        F: Fn() -> Result<String, Exception> + Send + Sync + 'static,
    {
        Handler::Niladic(Box::new(handler))
    }
}

/// 一条已编译的路由：原始模板、锚定的匹配器、按分组顺序排列的变量名与处理器。
struct RouteEntry {
    pattern: String,
    regex: Regex,
    variable_names: Vec<String>,
    handler: Handler,
}

lazy_static! {
    /// 模板中路径变量段的提取模式
    static ref PATH_VARIABLE: Regex = Regex::new(r"\{([^/]+)\}").unwrap();
}

/// 按方法分组的路由表。
///
/// 由启动阶段的单线程构建，服务开始接收连接后必须保持只读。
pub struct Router {
    routes: HashMap<HttpRequestMethod, Vec<RouteEntry>>,
}

impl Router {
    pub fn new() -> Self {
        let mut routes = HashMap::new();
        for method in HttpRequestMethod::KNOWN {
            routes.insert(method, Vec::new());
        }
        Self { routes }
    }

    /// 注册一条路由。模板在此时编译，每个方法内保持注册顺序（追加写入）。
    ///
    /// 方法不在支持集合内时记录错误并忽略该条注册，不会中断启动。
    pub fn register(&mut self, method: &str, pattern: &str, handler: Handler) {
        let token = method.to_uppercase();
        let method = match HttpRequestMethod::from_token(&token) {
            Some(method) => method,
            None => {
                error!("无法注册路由 {} {}: 方法不在支持集合内", token, pattern);
                return;
            }
        };

        let (regex, variable_names) = compile_pattern(pattern);
        info!("注册路由: {} {}", method, pattern);
        self.routes.entry(method).or_default().push(RouteEntry {
            pattern: pattern.to_string(),
            regex,
            variable_names,
            handler,
        });
    }

    /// 解析并执行请求对应的处理器。
    ///
    /// 命中时先把各捕获分组按位置绑定到记录的变量名、写入请求的路径变量表，
    /// 再按处理器形态调用；返回 `Ok(true)`。
    /// 未命中（包括方法不在支持集合内）返回 `Ok(false)`，由调用方决定如何响应。
    /// 处理器抛出的异常原样上抛，由调用方交给全局异常处理器。
    pub fn resolve(
        &self,
        request: &mut Request,
        response: &mut Response,
    ) -> Result<bool, Exception> {
        let method = match HttpRequestMethod::from_token(request.method()) {
            Some(method) => method,
            None => {
                warn!("不支持的HTTP方法: {}", request.method());
                return Ok(false);
            }
        };
        let entries = match self.routes.get(&method) {
            Some(entries) => entries,
            None => return Ok(false),
        };

        for entry in entries {
            let matched = {
                if let Some(captures) = entry.regex.captures(request.path()) {
                    let mut vars = Vec::new();
                    for (index, name) in entry.variable_names.iter().enumerate() {
                        if let Some(value) = captures.get(index + 1) {
                            vars.push((name.clone(), value.as_str().to_string()));
                        }
                    }
                    Some(vars)
                } else {
                    None
                }
            };
            if let Some(vars) = matched {
                for (name, value) in vars {
                    request.set_path_variable(&name, &value);
                }
                debug!(
                    "路由命中: {} {} -> {}",
                    method,
                    request.path(),
                    entry.pattern
                );
                return invoke_handler(entry, request, response).map(|_| true);
            }
        }

        debug!("未找到匹配路由: {} {}", method, request.path());
        Ok(false)
    }

    /// 以 `"METHOD pattern"` 形式列出全部已注册路由，按方法分组、组内保持注册顺序。
    pub fn registered_routes(&self) -> Vec<String> {
        let mut list = Vec::new();
        for method in HttpRequestMethod::KNOWN {
            if let Some(entries) = self.routes.get(&method) {
                for entry in entries {
                    list.push(format!("{} {}", method, entry.pattern));
                }
            }
        }
        list
    }

    pub fn route_count(&self) -> usize {
        self.routes.values().map(|entries| entries.len()).sum()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

/// 按处理器形态分派调用。
fn invoke_handler(
    entry: &RouteEntry,
    request: &Request,
    response: &mut Response,
) -> Result<(), Exception> {
    match &entry.handler {
        Handler::Full(handler) => handler(request, response),
        Handler::ResponseOnly(handler) => handler(response),
        Handler::Niladic(handler) => {
            let body = handler()?;
            response.json(&body)
        }
    }
}

/// 把路径模板编译为锚定的正则与按分组顺序排列的变量名列表。
fn compile_pattern(pattern: &str) -> (Regex, Vec<String>) {
    let mut variable_names = Vec::new();
    let mut regex_source = String::from("^");
    let mut last_end = 0;

    for captures in PATH_VARIABLE.captures_iter(pattern) {
        let whole = captures.get(0).unwrap();
        regex_source.push_str(&regex::escape(&pattern[last_end..whole.start()]));
        regex_source.push_str("([^/]+)");
        variable_names.push(captures[1].to_string());
        last_end = whole.end();
    }
    regex_source.push_str(&regex::escape(&pattern[last_end..]));
    regex_source.push('$');

    // 转义字面量加固定分组拼出的模式必定合法
    let regex = Regex::new(&regex_source).unwrap();
    (regex, variable_names)
}
