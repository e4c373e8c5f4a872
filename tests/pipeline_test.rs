// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 请求生命周期集成测试
//!
//! 不经过套接字，直接驱动 解析 -> 前置过滤 -> 路由 -> 处理器 -> 后置过滤 ->
//! 异常映射 的完整分发状态机，验证各组件协同工作时的端到端行为。

use webframework::exception::{Exception, GlobalExceptionHandler};
use webframework::filter::{Filter, FilterChain, RequestContext};
use webframework::request::Request;
use webframework::response::Response;
use webframework::router::{Handler, Router};
use webframework::server::dispatch;

use std::sync::{Arc, Mutex};
use tokio::io::BufReader;

async fn parse(raw: &[u8]) -> Request {
    let mut reader = BufReader::new(raw);
    Request::parse(&mut reader).await.unwrap()
}

fn response_text(response: &Response) -> String {
    String::from_utf8_lossy(response.as_bytes().expect("response not sent")).to_string()
}

/// 搭建一份与演示装配层同构的最小用户API路由表
fn demo_router() -> Router {
    let mut router = Router::new();

    router.register(
        "GET",
        "/api/users/{id}",
        Handler::full(|request, response| {
            let id: u64 = request
                .path_variable("id")
                .unwrap_or("")
                .parse()
                .map_err(|_| Exception::Validation {
                    field: "id".to_string(),
                    message: "User ID must be a valid number".to_string(),
                })?;
            if id == 1 {
                response.json("{\"success\": true, \"data\": {\"id\": 1, \"name\": \"John Doe\"}}")
            } else {
                Err(Exception::NotFound(format!(
                    "User not found with id: {}",
                    id
                )))
            }
        }),
    );

    router.register(
        "POST",
        "/api/users",
        Handler::full(|request, response| {
            if !request.body().contains("email") {
                return Err(Exception::Validation {
                    field: "email".to_string(),
                    message: "Valid email is required".to_string(),
                });
            }
            response.set_status(201).json("{\"success\": true}")
        }),
    );

    router
}

fn run(
    router: &Router,
    filter_chain: &FilterChain,
    request: &mut Request,
    response: &mut Response,
) -> Option<Exception> {
    let exception_handler = GlobalExceptionHandler::new();
    let mut ctx = RequestContext::new(0);
    dispatch(
        router,
        filter_chain,
        &exception_handler,
        request,
        response,
        &mut ctx,
    )
}

/// 已注册处理器正常返回：200加处理器产出的响应体
#[tokio::test]
async fn test_get_existing_user_returns_200() {
    let router = demo_router();
    let filter_chain = FilterChain::new();

    let mut request = parse(b"GET /api/users/1 HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
    let mut response = Response::new();
    let occurred = run(&router, &filter_chain, &mut request, &mut response);

    assert!(occurred.is_none());
    assert_eq!(response.status_code(), 200);
    let text = response_text(&response);
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(text.contains("\"id\": 1"));
    assert!(text.contains("Connection: close\r\n"));
}

/// 处理器抛出NotFound：404加结构化错误体
#[tokio::test]
async fn test_missing_user_maps_to_404() {
    let router = demo_router();
    let filter_chain = FilterChain::new();

    let mut request = parse(b"GET /api/users/999 HTTP/1.1\r\n\r\n").await;
    let mut response = Response::new();
    let occurred = run(&router, &filter_chain, &mut request, &mut response);

    assert!(matches!(occurred, Some(Exception::NotFound(_))));
    assert_eq!(response.status_code(), 404);
    let text = response_text(&response);
    assert!(text.contains("\"error\":\"Not Found\""));
    assert!(text.contains("User not found with id: 999"));
}

/// 校验失败：400并携带出错字段
#[tokio::test]
async fn test_validation_error_maps_to_400_with_field() {
    let router = demo_router();
    let filter_chain = FilterChain::new();

    let raw = b"POST /api/users HTTP/1.1\r\nContent-Length: 24\r\n\r\n{\"name\": \"Invalid User\"}";
    let mut request = parse(raw).await;
    let mut response = Response::new();
    let occurred = run(&router, &filter_chain, &mut request, &mut response);

    assert!(matches!(occurred, Some(Exception::Validation { .. })));
    assert_eq!(response.status_code(), 400);
    let text = response_text(&response);
    assert!(text.contains("\"field\":\"email\""));
    assert!(text.contains("\"status\":400"));
}

/// 未注册路径：通用404，不经过异常映射（响应体是"未找到处理器"的形状）
#[tokio::test]
async fn test_unregistered_path_gets_generic_404() {
    let router = demo_router();
    let filter_chain = FilterChain::new();

    let mut request = parse(b"GET /nonexistent HTTP/1.1\r\n\r\n").await;
    let mut response = Response::new();
    let occurred = run(&router, &filter_chain, &mut request, &mut response);

    assert!(occurred.is_none());
    assert_eq!(response.status_code(), 404);
    assert!(response_text(&response).contains("No handler found for GET /nonexistent"));
}

/// 路径变量非数字：经异常映射得到400
#[tokio::test]
async fn test_non_numeric_id_maps_to_400() {
    let router = demo_router();
    let filter_chain = FilterChain::new();

    let mut request = parse(b"GET /api/users/abc HTTP/1.1\r\n\r\n").await;
    let mut response = Response::new();
    let occurred = run(&router, &filter_chain, &mut request, &mut response);

    assert!(matches!(occurred, Some(Exception::Validation { .. })));
    assert_eq!(response.status_code(), 400);
    assert!(response_text(&response).contains("\"field\":\"id\""));
}

/// 把钩子调用顺序记到账本里的过滤器
struct LedgerFilter {
    label: &'static str,
    order: i32,
    pass: bool,
    ledger: Arc<Mutex<Vec<String>>>,
}

impl Filter for LedgerFilter {
    fn pre_handle(
        &self,
        _request: &Request,
        response: &mut Response,
        _ctx: &mut RequestContext,
    ) -> Result<bool, Exception> {
        self.ledger
            .lock()
            .unwrap()
            .push(format!("{}:pre", self.label));
        if !self.pass {
            response.set_status(403).json("{\"error\": \"Forbidden\"}")?;
        }
        Ok(self.pass)
    }

    fn post_handle(
        &self,
        _request: &Request,
        _response: &mut Response,
        _ctx: &mut RequestContext,
    ) -> Result<(), Exception> {
        self.ledger
            .lock()
            .unwrap()
            .push(format!("{}:post", self.label));
        Ok(())
    }

    fn after_completion(
        &self,
        _request: &Request,
        _response: &mut Response,
        _ctx: &mut RequestContext,
        _exception: Option<&Exception>,
    ) -> Result<(), Exception> {
        self.ledger
            .lock()
            .unwrap()
            .push(format!("{}:after", self.label));
        Ok(())
    }

    fn order(&self) -> i32 {
        self.order
    }

    fn name(&self) -> &str {
        self.label
    }
}

/// 短路属性：前置钩子返回false后处理器与后置钩子都不执行，
/// 完成后钩子仍按逆序全部执行
#[tokio::test]
async fn test_short_circuit_skips_handler_but_runs_after_completion() {
    let ledger = Arc::new(Mutex::new(Vec::new()));
    let router = demo_router();
    let mut filter_chain = FilterChain::new();
    filter_chain.add_filter(Box::new(LedgerFilter {
        label: "auth",
        order: 1,
        pass: false,
        ledger: Arc::clone(&ledger),
    }));
    filter_chain.add_filter(Box::new(LedgerFilter {
        label: "metrics",
        order: 2,
        pass: true,
        ledger: Arc::clone(&ledger),
    }));

    let mut request = parse(b"GET /api/users/1 HTTP/1.1\r\n\r\n").await;
    let mut response = Response::new();
    let occurred = run(&router, &filter_chain, &mut request, &mut response);

    assert!(occurred.is_none());
    assert_eq!(response.status_code(), 403);
    assert_eq!(
        *ledger.lock().unwrap(),
        vec!["auth:pre", "metrics:after", "auth:after"]
    );
}

/// 正常请求时后置与完成后钩子按逆序执行
#[tokio::test]
async fn test_filters_wrap_successful_dispatch() {
    let ledger = Arc::new(Mutex::new(Vec::new()));
    let router = demo_router();
    let mut filter_chain = FilterChain::new();
    filter_chain.add_filter(Box::new(LedgerFilter {
        label: "a",
        order: 1,
        pass: true,
        ledger: Arc::clone(&ledger),
    }));
    filter_chain.add_filter(Box::new(LedgerFilter {
        label: "b",
        order: 2,
        pass: true,
        ledger: Arc::clone(&ledger),
    }));

    let mut request = parse(b"GET /api/users/1 HTTP/1.1\r\n\r\n").await;
    let mut response = Response::new();
    let occurred = run(&router, &filter_chain, &mut request, &mut response);

    assert!(occurred.is_none());
    assert_eq!(
        *ledger.lock().unwrap(),
        vec![
            "a:pre", "b:pre", "b:post", "a:post", "b:after", "a:after"
        ]
    );
}

/// 处理器异常时后置钩子不执行，完成后钩子能看到异常
#[tokio::test]
async fn test_exception_skips_post_hooks() {
    let ledger = Arc::new(Mutex::new(Vec::new()));
    let router = demo_router();
    let mut filter_chain = FilterChain::new();
    filter_chain.add_filter(Box::new(LedgerFilter {
        label: "a",
        order: 1,
        pass: true,
        ledger: Arc::clone(&ledger),
    }));

    let mut request = parse(b"GET /api/users/999 HTTP/1.1\r\n\r\n").await;
    let mut response = Response::new();
    let occurred = run(&router, &filter_chain, &mut request, &mut response);

    assert!(occurred.is_some());
    assert_eq!(*ledger.lock().unwrap(), vec!["a:pre", "a:after"]);
}

/// 查询参数穿过完整解析后仍应用固定解码表
#[tokio::test]
async fn test_query_decoding_through_full_parse() {
    let mut router = Router::new();
    router.register(
        "GET",
        "/echo",
        Handler::full(|request, response| {
            let city = request.query_param("city").unwrap_or("").to_string();
            response.json(&format!("{{\"city\": \"{}\"}}", city))
        }),
    );
    let filter_chain = FilterChain::new();

    let mut request = parse(b"GET /echo?city=New%20York HTTP/1.1\r\n\r\n").await;
    let mut response = Response::new();
    run(&router, &filter_chain, &mut request, &mut response);

    assert!(response_text(&response).contains("\"city\": \"New York\""));
}
