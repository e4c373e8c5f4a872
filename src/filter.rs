// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 过滤器管线模块
//!
//! 该模块实现包裹每次请求分发的前置/后置/完成后三段钩子管线。
//!
//! ## 执行规则
//! - 前置钩子按 `order` 升序执行；第一个返回 `false` 的钩子会短路后续前置钩子，
//!   并让调用方跳过路由、处理器与后置钩子。
//! - 后置钩子与完成后钩子按注册的逆序执行，模拟嵌套作用域的展开。
//! - 钩子返回错误只记录日志，按成功处理，绝不中断主请求路径。
//! - 完成后钩子对每个同时产生了请求与响应对象的请求都必须执行，包括被短路的请求。
//!
//! 过滤器所需的每请求数据（计时等）通过显式传递的 `RequestContext` 携带，
//! 不使用任何线程内的隐式状态：worker 会被不相关的请求复用。

use crate::exception::Exception;
use crate::request::Request;
use crate::response::Response;

use log::{debug, error, info};

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// 随单个请求流经整条管线的上下文。
///
/// 由处理连接的 worker 创建并独占持有，请求结束即丢弃。
pub struct RequestContext {
    id: u128,
    started_at: Instant,
    attributes: HashMap<String, String>,
}

impl RequestContext {
    pub fn new(id: u128) -> Self {
        Self {
            id,
            started_at: Instant::now(),
            attributes: HashMap::new(),
        }
    }

    /// 请求的全局唯一序号，用于日志追踪
    pub fn id(&self) -> u128 {
        self.id
    }

    /// 从请求开始处理到现在的耗时
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn set_attribute(&mut self, name: &str, value: &str) {
        self.attributes
            .insert(name.to_string(), value.to_string());
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|v| v.as_str())
    }
}

/// 请求分发的横切钩子。
///
/// 三个钩子都可以返回错误，错误由 `FilterChain` 兜住并记录，不会影响请求处理。
pub trait Filter: Send + Sync {
    /// 前置钩子。返回 `Ok(false)` 短路本次请求（跳过路由、处理器与后置钩子）。
    fn pre_handle(
        &self,
        request: &Request,
        response: &mut Response,
        ctx: &mut RequestContext,
    ) -> Result<bool, Exception>;

    /// 后置钩子，处理器成功返回后按逆序执行。
    fn post_handle(
        &self,
        _request: &Request,
        _response: &mut Response,
        _ctx: &mut RequestContext,
    ) -> Result<(), Exception> {
        Ok(())
    }

    /// 完成后钩子，无论请求成功、失败还是被短路都会按逆序执行。
    fn after_completion(
        &self,
        _request: &Request,
        _response: &mut Response,
        _ctx: &mut RequestContext,
        _exception: Option<&Exception>,
    ) -> Result<(), Exception> {
        Ok(())
    }

    /// 排序权重，数值越小前置优先级越高。
    fn order(&self) -> i32 {
        0
    }

    /// 过滤器名称，仅用于日志。
    fn name(&self) -> &str {
        "filter"
    }
}

/// 有序的过滤器集合。
///
/// 仅在服务器启动前的单线程阶段可变；每次插入后按 `order` 稳定重排，
/// 服务开始接收连接后必须保持冻结。
pub struct FilterChain {
    filters: Vec<Box<dyn Filter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
        }
    }

    pub fn add_filter(&mut self, filter: Box<dyn Filter>) {
        info!(
            "注册过滤器: {} (order {})",
            filter.name(),
            filter.order()
        );
        self.filters.push(filter);
        // 稳定排序：order相同的过滤器保持注册顺序
        self.filters.sort_by_key(|filter| filter.order());
    }

    /// 按升序执行前置钩子。
    ///
    /// 返回 `false` 表示某个钩子短路了本次请求；钩子报错按成功处理并继续。
    pub fn apply_pre_handle(
        &self,
        request: &Request,
        response: &mut Response,
        ctx: &mut RequestContext,
    ) -> bool {
        for filter in &self.filters {
            match filter.pre_handle(request, response, ctx) {
                Ok(true) => {}
                Ok(false) => {
                    debug!(
                        "[ID{}]请求被过滤器{}短路",
                        ctx.id(),
                        filter.name()
                    );
                    return false;
                }
                Err(e) => {
                    error!(
                        "[ID{}]过滤器{}的前置钩子出错: {}",
                        ctx.id(),
                        filter.name(),
                        e
                    );
                }
            }
        }
        true
    }

    /// 按逆序执行后置钩子。钩子报错只记录日志。
    pub fn apply_post_handle(
        &self,
        request: &Request,
        response: &mut Response,
        ctx: &mut RequestContext,
    ) {
        for filter in self.filters.iter().rev() {
            if let Err(e) = filter.post_handle(request, response, ctx) {
                error!(
                    "[ID{}]过滤器{}的后置钩子出错: {}",
                    ctx.id(),
                    filter.name(),
                    e
                );
            }
        }
    }

    /// 按逆序执行完成后钩子。钩子报错只记录日志。
    pub fn apply_after_completion(
        &self,
        request: &Request,
        response: &mut Response,
        ctx: &mut RequestContext,
        exception: Option<&Exception>,
    ) {
        for filter in self.filters.iter().rev() {
            if let Err(e) = filter.after_completion(request, response, ctx, exception) {
                error!(
                    "[ID{}]过滤器{}的完成后钩子出错: {}",
                    ctx.id(),
                    filter.name(),
                    e
                );
            }
        }
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl Default for FilterChain {
    fn default() -> Self {
        Self::new()
    }
}

/// 记录每次请求概况与耗时的内置过滤器。
pub struct LoggingFilter;

impl Filter for LoggingFilter {
    fn pre_handle(
        &self,
        request: &Request,
        _response: &mut Response,
        ctx: &mut RequestContext,
    ) -> Result<bool, Exception> {
        info!(
            "[ID{}]收到请求: {} {}",
            ctx.id(),
            request.method(),
            request.path()
        );
        if !request.query_params().is_empty() {
            debug!("[ID{}]查询参数: {:?}", ctx.id(), request.query_params());
        }
        Ok(true)
    }

    fn after_completion(
        &self,
        request: &Request,
        response: &mut Response,
        ctx: &mut RequestContext,
        exception: Option<&Exception>,
    ) -> Result<(), Exception> {
        match exception {
            Some(e) => info!(
                "[ID{}]{} {} -> {} ({}ms)，异常: {}",
                ctx.id(),
                request.method(),
                request.path(),
                response.status_code(),
                ctx.elapsed().as_millis(),
                e
            ),
            None => info!(
                "[ID{}]{} {} -> {} ({}ms)",
                ctx.id(),
                request.method(),
                request.path(),
                response.status_code(),
                ctx.elapsed().as_millis()
            ),
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "LoggingFilter"
    }
}
