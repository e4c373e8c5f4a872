// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 服务器编排模块
//!
//! 该模块实现连接接收循环与单连接的完整处理状态机：
//!
//! ```text
//! Accepted -> Parsed -> PreFiltered -> Routed -> Handled -> PostFiltered -> Sent -> Closed
//! ```
//!
//! - 接收循环运行在独立任务上，每个连接交给一个 worker 任务从头到尾同步走完
//!   状态机，处理完毕后无条件关闭连接（不支持keep-alive）。
//! - 解析失败的连接直接进入 Closed，不产生任何响应字节。
//! - 从 Parsed 之后的任何阶段抛出异常都会经由全局异常处理器进入 Errored，
//!   再进入 Closed。
//! - 路由表与过滤器链在 `run` 被调用时冻结：`run` 按值消费服务器本身，
//!   服务期间的并发注册在类型层面就不可能发生。

use crate::config::Config;
use crate::exception::{Exception, GlobalExceptionHandler};
use crate::filter::{Filter, FilterChain, RequestContext};
use crate::request::Request;
use crate::response::Response;
use crate::router::{Handler, Router};

use log::{debug, error, info, warn};
use serde_json::json;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::{timeout, Duration};

use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::{Arc, Mutex};

/// # Web 服务器
///
/// 持有配置、路由表、过滤器链与全局异常处理器。
/// 注册接口（`register_route` / `add_filter`）只在启动前的单线程阶段可用，
/// `run` 启动后全部共享结构转为只读。
pub struct WebServer {
    config: Config,
    router: Router,
    filter_chain: FilterChain,
    exception_handler: GlobalExceptionHandler,
}

impl WebServer {
    pub fn from_config(config: Config) -> Self {
        Self {
            config,
            router: Router::new(),
            filter_chain: FilterChain::new(),
            exception_handler: GlobalExceptionHandler::new(),
        }
    }

    /// 注册一条路由。必须在 `run` 之前完成。
    pub fn register_route(&mut self, method: &str, pattern: &str, handler: Handler) {
        self.router.register(method, pattern, handler);
    }

    /// 注册一个过滤器。必须在 `run` 之前完成。
    pub fn add_filter(&mut self, filter: Box<dyn Filter>) {
        self.filter_chain.add_filter(filter);
    }

    /// 列出已注册路由，供管理控制台展示。
    pub fn registered_routes(&self) -> Vec<String> {
        self.router.registered_routes()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 主接收循环。
    ///
    /// 绑定监听端口后持续接收连接并分发给 worker 任务；`shutdown` 变为 `true`
    /// 时停止接收、释放监听套接字，并等待在途连接全部完成后返回。
    pub async fn run(
        self,
        mut shutdown: watch::Receiver<bool>,
        active_connection: Arc<Mutex<u32>>,
    ) {
        let address = match self.config.local() {
            true => Ipv4Addr::new(127, 0, 0, 1),
            false => Ipv4Addr::new(0, 0, 0, 0),
        };
        let socket = SocketAddrV4::new(address, self.config.port());
        let listener = match TcpListener::bind(socket).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("无法绑定端口：{}，错误：{}", self.config.port(), e);
                panic!("无法绑定端口：{}，错误：{}", self.config.port(), e);
            }
        };
        info!(
            "端口{}绑定完成，共{}条路由，{}个过滤器",
            self.config.port(),
            self.router.route_count(),
            self.filter_chain.len()
        );

        // 自此冻结：路由表、过滤器链与异常处理器在worker间只读共享
        let router = Arc::new(self.router);
        let filter_chain = Arc::new(self.filter_chain);
        let exception_handler = Arc::new(self.exception_handler);
        let read_timeout_secs = self.config.read_timeout_secs();

        let mut id: u128 = 0;
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("接收到停机信号，停止接收新连接");
                        break;
                    }
                }
                accepted = listener.accept() => {
                    let (stream, addr) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            error!("接受连接失败: {}", e);
                            continue;
                        }
                    };
                    debug!("[ID{}]新的连接：{}", id, addr);

                    let router = Arc::clone(&router);
                    let filter_chain = Arc::clone(&filter_chain);
                    let exception_handler = Arc::clone(&exception_handler);
                    let active_connection = Arc::clone(&active_connection);

                    tokio::spawn(async move {
                        {
                            let mut lock = active_connection.lock().unwrap();
                            *lock += 1;
                        }

                        handle_connection(
                            stream,
                            id,
                            router,
                            filter_chain,
                            exception_handler,
                            read_timeout_secs,
                        )
                        .await;

                        {
                            let mut lock = active_connection.lock().unwrap();
                            *lock -= 1;
                        }
                    });
                    id += 1;
                }
            }
        }

        // 释放监听套接字，等待在途worker完成
        drop(listener);
        loop {
            let active = *active_connection.lock().unwrap();
            if active == 0 {
                break;
            }
            debug!("等待{}个在途连接完成", active);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        info!("服务器已停止");
    }
}

/// # 连接处理器
///
/// 单个连接的完整生命周期：读取解析请求、执行分发状态机、写出响应字节、
/// 关闭连接。解析失败不写任何字节。
async fn handle_connection(
    stream: TcpStream,
    id: u128,
    router: Arc<Router>,
    filter_chain: Arc<FilterChain>,
    exception_handler: Arc<GlobalExceptionHandler>,
    read_timeout_secs: u64,
) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    // 解析阶段。读超时按解析失败处理（连接直接关闭）
    let parse_result = if read_timeout_secs > 0 {
        match timeout(
            Duration::from_secs(read_timeout_secs),
            Request::parse(&mut reader),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                warn!("[ID{}]读取请求超时，连接关闭", id);
                return;
            }
        }
    } else {
        Request::parse(&mut reader).await
    };
    let mut request = match parse_result {
        Ok(request) => request,
        Err(e) => {
            error!("[ID{}]解析HTTP请求失败: {}，连接关闭", id, e);
            return;
        }
    };
    debug!(
        "[ID{}]成功解析HTTP请求: {} {}",
        id,
        request.method(),
        request.path()
    );

    let mut response = Response::new();
    let mut ctx = RequestContext::new(id);

    dispatch(
        &router,
        &filter_chain,
        &exception_handler,
        &mut request,
        &mut response,
        &mut ctx,
    );

    // 发送阶段：send已完成序列化，这里一次性写入套接字并立即刷新
    if let Some(bytes) = response.as_bytes() {
        if let Err(e) = write_half.write_all(bytes).await {
            error!("[ID{}]写入响应失败: {}", id, e);
            return;
        }
        let _ = write_half.flush().await;
    }
    debug!("[ID{}]连接关闭", id);
}

/// # 分发状态机
///
/// 对一个已解析的请求执行 前置过滤 -> 路由 -> 处理器 -> 后置过滤，
/// 未匹配路由发送通用 404（不经过异常处理器），处理器异常在响应未发送时
/// 交给全局异常处理器；无论以何种方式结束，完成后钩子都会执行。
///
/// 返回请求期间发生的异常（如有），供调用方记录。
pub fn dispatch(
    router: &Router,
    filter_chain: &FilterChain,
    exception_handler: &GlobalExceptionHandler,
    request: &mut Request,
    response: &mut Response,
    ctx: &mut RequestContext,
) -> Option<Exception> {
    let mut occurred: Option<Exception> = None;

    'handling: {
        if !filter_chain.apply_pre_handle(request, response, ctx) {
            // 短路：跳过路由、处理器与后置钩子
            break 'handling;
        }

        match router.resolve(request, response) {
            Ok(true) => {}
            Ok(false) => {
                let body = json!({
                    "error": "Not Found",
                    "message": format!(
                        "No handler found for {} {}",
                        request.method(),
                        request.path()
                    ),
                    "status": 404,
                });
                if let Err(e) = response.set_status(404).json(&body.to_string()) {
                    warn!("[ID{}]发送404响应失败: {}", ctx.id(), e);
                    occurred = Some(e);
                    break 'handling;
                }
            }
            Err(e) => {
                error!("[ID{}]处理请求时发生异常: {}", ctx.id(), e);
                if !response.headers_sent() {
                    exception_handler.handle(request, response, &e);
                }
                occurred = Some(e);
                break 'handling;
            }
        }

        filter_chain.apply_post_handle(request, response, ctx);
    }

    filter_chain.apply_after_completion(request, response, ctx, occurred.as_ref());
    occurred
}
